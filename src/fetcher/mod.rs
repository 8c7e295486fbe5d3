//! Page acquisition: a headless browser for rendered listings and a plain
//! HTTP client for product detail pages.

mod browser;
mod http;

pub use browser::BrowserFetcher;
pub use http::HttpPageClient;

/// Query parameter the storefront uses to address listing pages
pub const PAGE_PARAM: &str = "PAGEN_1";

/// Resolves a site-relative path against the storefront origin.
pub fn absolute_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }

    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Builds the URL of one listing page; page 1 is the bare category URL.
pub fn category_page_url(base_url: &str, path: &str, page: u32) -> String {
    let url = absolute_url(base_url, path);
    if page <= 1 {
        return url;
    }

    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{PAGE_PARAM}={page}")
}
