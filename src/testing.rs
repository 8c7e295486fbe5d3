//! In-memory doubles of the pipeline capabilities and HTML fixtures

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{FetchInitError, NavigationError, StoreError};
use crate::models::StoredProduct;
use crate::traits::{PageFetcher, ProductPageSource, ProductStore};

/// Serves canned pages; anything not scripted fails to load
#[derive(Default)]
pub struct ScriptedFetcher {
    main_page: Option<String>,
    pages: HashMap<(String, u32), String>,
    fail_start: bool,
    cancel_after: Option<(String, u32, CancellationToken)>,
    calls: Mutex<Vec<(String, u32)>>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn main_page(mut self, html: impl Into<String>) -> Self {
        self.main_page = Some(html.into());
        self
    }

    pub fn page(mut self, path: &str, page: u32, html: impl Into<String>) -> Self {
        self.pages.insert((path.to_string(), page), html.into());
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Cancels `token` once the given page has been served.
    pub fn cancel_after(mut self, path: &str, page: u32, token: CancellationToken) -> Self {
        self.cancel_after = Some((path.to_string(), page, token));
        self
    }

    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn start(&self) -> Result<(), FetchInitError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(FetchInitError {
                reason: "no chrome binary".to_string(),
            });
        }
        Ok(())
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    async fn fetch_main_page(&self, cancel: &CancellationToken) -> Result<String, NavigationError> {
        if cancel.is_cancelled() {
            return Err(NavigationError::Cancelled { url: "/".to_string() });
        }
        self.main_page.clone().ok_or_else(|| NavigationError::Browser {
            url: "/".to_string(),
            reason: "net::ERR_CONNECTION_RESET".to_string(),
        })
    }

    async fn fetch_category_page(
        &self,
        cancel: &CancellationToken,
        path: &str,
        page: u32,
    ) -> Result<String, NavigationError> {
        if cancel.is_cancelled() {
            return Err(NavigationError::Cancelled { url: path.to_string() });
        }
        self.calls.lock().unwrap().push((path.to_string(), page));

        let html = self
            .pages
            .get(&(path.to_string(), page))
            .cloned()
            .ok_or_else(|| NavigationError::Timeout {
                url: format!("{path}?PAGEN_1={page}"),
                timeout: std::time::Duration::from_secs(30),
            })?;

        if let Some((cancel_path, cancel_page, token)) = &self.cancel_after
            && cancel_path == path
            && *cancel_page == page
        {
            token.cancel();
        }

        Ok(html)
    }
}

/// Serves product detail pages keyed by path
#[derive(Default)]
pub struct ScriptedDetails {
    pages: HashMap<String, String>,
}

impl ScriptedDetails {
    pub fn page(mut self, path: &str, html: impl Into<String>) -> Self {
        self.pages.insert(path.to_string(), html.into());
        self
    }
}

#[async_trait]
impl ProductPageSource for ScriptedDetails {
    async fn fetch_product_page(
        &self,
        _cancel: &CancellationToken,
        path: &str,
    ) -> Result<String, NavigationError> {
        self.pages.get(path).cloned().ok_or(NavigationError::Status {
            url: path.to_string(),
            status: 404,
        })
    }
}

/// Records every product batch; optionally rejects batches containing an id
#[derive(Default)]
pub struct RecordingProductStore {
    pub batches: Mutex<Vec<Vec<StoredProduct>>>,
    reject_id: Option<String>,
}

impl RecordingProductStore {
    pub fn rejecting(external_id: &str) -> Self {
        Self {
            reject_id: Some(external_id.to_string()),
            ..Self::default()
        }
    }

    pub fn products(&self) -> Vec<StoredProduct> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }
}

#[async_trait]
impl ProductStore for RecordingProductStore {
    async fn upsert_products(&self, products: &[StoredProduct]) -> Result<(), StoreError> {
        if let Some(id) = &self.reject_id
            && products.iter().any(|p| &p.external_id == id)
        {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.batches.lock().unwrap().push(products.to_vec());
        Ok(())
    }
}

/// Storefront landing page with one second-level leaf per link
pub fn landing_page(links: &[(&str, &str)]) -> String {
    let items: String = links
        .iter()
        .map(|(name, href)| {
            format!(r#"<li><div class="bli_pos_second"><a href="{href}">{name}</a></div></li>"#)
        })
        .collect();

    format!(
        r#"<html><body><ul class="catalog_menu"><li><ul class="catalog_menu_sub_second">{items}</ul></li></ul></body></html>"#
    )
}

/// Category listing page; each card is `(external_id, name, displayed price)`
pub fn listing_page(cards: &[(&str, &str, &str)], total_pages: u32) -> String {
    let body: String = cards
        .iter()
        .map(|(id, name, price)| {
            let slug = name.to_lowercase().replace(' ', "-");
            format!(
                r#"<div class="blocks_product">
                    <button class="favorite_product" data-elid="{id}"></button>
                    <div class="blocks_product_fix_w">
                        <a href="/product/{slug}/"><img src="/img/{slug}.jpg" title="{name}"></a>
                        <p class="bp_text_price">{price}</p>
                        <h2 class="bp_text_info"><a href="/product/{slug}/">{name}</a></h2>
                    </div>
                </div>"#
            )
        })
        .collect();

    let pagination = if total_pages > 1 {
        let links: String = (1..=total_pages)
            .map(|n| {
                let class = if n == 1 { r#" class="active""# } else { "" };
                format!(r#"<li><a href="?PAGEN_1={n}"{class}>{n}</a></li>"#)
            })
            .collect();
        format!(r#"<div class="pagination_catalog"><ul class="pagination">{links}</ul></div>"#)
    } else {
        String::new()
    };

    format!(
        r#"<html><body>
            <div class="search_all_produkt"><span>{count}</span></div>
            <div class="wrap_list_prod">{body}</div>
            {pagination}
        </body></html>"#,
        count = total_pages * 24,
    )
}
