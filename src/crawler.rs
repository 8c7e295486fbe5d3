use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{NavigationError, PageError, PersistenceError};
use crate::models::{Category, Product, StoredProduct};
use crate::parser;
use crate::traits::{PageFetcher, ProductPageSource, ProductStore};

/// Outcome of one category crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub total_pages: u32,
    pub pages_saved: u32,
    pub pages_failed: u32,
    pub products_saved: usize,
    pub cancelled: bool,
}

impl CrawlSummary {
    fn record(&mut self, page: u32, result: Result<usize, PageError>) {
        match result {
            Ok(saved) => {
                self.pages_saved += 1;
                self.products_saved += saved;
            }
            Err(e) => {
                self.pages_failed += 1;
                warn!(page, error = %e, "page skipped");
            }
        }
    }
}

/// Walks the paginated listing of a single category.
///
/// Page 1 fixes the number of pages, so failing to load it ends the crawl.
/// Every later page is fetched, parsed and persisted on its own: a failure
/// there is logged and the crawl moves to the next page number.
pub struct CategoryCrawler {
    fetcher: Arc<dyn PageFetcher>,
    products: Arc<dyn ProductStore>,
    details: Option<Arc<dyn ProductPageSource>>,
    markdown: i64,
}

impl CategoryCrawler {
    pub fn new(fetcher: Arc<dyn PageFetcher>, products: Arc<dyn ProductStore>, markdown: i64) -> Self {
        Self {
            fetcher,
            products,
            details: None,
            markdown,
        }
    }

    /// Enables description enrichment through the given detail page source.
    pub fn with_descriptions(mut self, details: Arc<dyn ProductPageSource>) -> Self {
        self.details = Some(details);
        self
    }

    pub async fn crawl(
        &self,
        cancel: &CancellationToken,
        category: &Category,
        category_id: i64,
    ) -> Result<CrawlSummary, NavigationError> {
        info!(url = %category.url, "scraping category");

        let html = self
            .fetcher
            .fetch_category_page(cancel, &category.url, 1)
            .await?;

        let pagination = parser::parse_pagination(&html);
        let mut summary = CrawlSummary {
            total_pages: pagination.total_pages,
            ..CrawlSummary::default()
        };

        match parser::parse_total_products(&html) {
            Ok(total_products) => info!(
                total_pages = pagination.total_pages,
                total_products, "category pagination"
            ),
            Err(e) => warn!(
                total_pages = pagination.total_pages,
                error = %e,
                "category pagination, product count unreadable"
            ),
        }

        summary.record(1, self.process_page(cancel, &html, category_id).await);

        for page in 2..=pagination.total_pages {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let result = match self
                .fetcher
                .fetch_category_page(cancel, &category.url, page)
                .await
            {
                Ok(html) => self.process_page(cancel, &html, category_id).await,
                Err(e) if e.is_cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                Err(e) => Err(e.into()),
            };

            summary.record(page, result);
        }

        Ok(summary)
    }

    /// Parses one listing page and persists its valid products as a batch.
    ///
    /// Returns the number of products written; a page with nothing to write
    /// is not an error.
    pub async fn process_page(
        &self,
        cancel: &CancellationToken,
        html: &str,
        category_id: i64,
    ) -> Result<usize, PageError> {
        let parsed: Vec<Product> = parser::parse_products(html)
            .into_iter()
            .filter(|product| !product.external_id.is_empty())
            .collect();

        if parsed.is_empty() {
            return Ok(0);
        }

        let parsed = self.enrich(cancel, parsed).await;

        let products: Vec<StoredProduct> = parsed
            .into_iter()
            .map(|product| StoredProduct::from_parsed(product, category_id, self.markdown))
            .collect();

        info!(count = products.len(), "upserting products");

        self.products
            .upsert_products(&products)
            .await
            .map_err(|source| PersistenceError {
                count: products.len(),
                source,
            })?;

        Ok(products.len())
    }

    async fn enrich(&self, cancel: &CancellationToken, mut products: Vec<Product>) -> Vec<Product> {
        let Some(details) = &self.details else {
            return products;
        };

        for product in &mut products {
            if cancel.is_cancelled() {
                break;
            }

            match details.fetch_product_page(cancel, &product.product_url).await {
                Ok(html) => product.description = parser::parse_product_description(&html),
                Err(e) if e.is_cancelled() => break,
                Err(e) => debug!(url = %product.product_url, error = %e, "description unavailable"),
            }
        }

        products
    }
}
