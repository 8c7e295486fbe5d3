//! Capabilities the harvesting pipeline consumes

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{FetchInitError, NavigationError, StoreError};
use crate::models::{Category, PersistedCategory, StoredProduct};

/// Source of fully rendered storefront pages
///
/// One session spans a scrape cycle: `start` before any fetch, `stop` once
/// every fetch has returned. Fetches may run concurrently against a started
/// session, each on its own tab.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Launch or connect the rendering engine
    async fn start(&self) -> Result<(), FetchInitError>;

    /// Release the session. Safe to call repeatedly or after a failed `start`.
    async fn stop(&self);

    /// Fetch the storefront landing page
    async fn fetch_main_page(&self, cancel: &CancellationToken) -> Result<String, NavigationError>;

    /// Fetch one page of a category listing; pages above 1 are addressed
    /// through the pagination query parameter
    async fn fetch_category_page(
        &self,
        cancel: &CancellationToken,
        path: &str,
        page: u32,
    ) -> Result<String, NavigationError>;
}

/// Source of raw product detail pages
#[async_trait]
pub trait ProductPageSource: Send + Sync {
    async fn fetch_product_page(
        &self,
        cancel: &CancellationToken,
        path: &str,
    ) -> Result<String, NavigationError>;
}

/// Persistence contract for categories, keyed by slug
#[async_trait]
pub trait CategoryStore: Send + Sync {
    /// Insert or update all categories in one batch. Empty input is a no-op.
    async fn upsert_categories(&self, categories: &[Category]) -> Result<(), StoreError>;

    async fn get_all_categories(&self) -> Result<Vec<PersistedCategory>, StoreError>;
}

/// Persistence contract for products, keyed by external id
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Insert or update all products in one batch. Empty input is a no-op.
    async fn upsert_products(&self, products: &[StoredProduct]) -> Result<(), StoreError>;
}
