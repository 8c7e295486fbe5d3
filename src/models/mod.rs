//! Data models for storefront categories and product listings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed per-item reduction applied to every scraped price before storage.
pub const DEFAULT_MARKDOWN: i64 = 1000;

/// A leaf category link parsed from the storefront navigation menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    /// Site-relative path, e.g. `/phones/apple/`
    pub url: String,
    pub slug: String,
}

impl Category {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        let slug = slug_from_url(&url);
        Self {
            name: name.into(),
            url,
            slug,
        }
    }
}

/// Derives the natural key of a category from its path.
///
/// Leading and trailing `/` are stripped and any query string is dropped,
/// so `/phones/apple/` becomes `phones/apple` and `/phones/?x=1` becomes `phones`.
pub fn slug_from_url(url: &str) -> String {
    let path = url.split_once('?').map_or(url, |(path, _)| path);
    path.trim_matches('/').to_string()
}

/// A category row as read back from storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PersistedCategory {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A product card parsed from a category listing page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub external_id: String,
    pub sku: String,
    pub name: String,
    /// Price in whole rubles
    pub price: i64,
    pub image_url: String,
    pub product_url: String,
    pub brand: String,
    pub category_label: String,
    /// Filled only when description enrichment is enabled
    pub description: String,
}

/// A product ready to be written through the product store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredProduct {
    pub external_id: String,
    pub sku: String,
    pub name: String,
    pub original_price: i64,
    pub price: i64,
    pub image_url: String,
    pub product_url: String,
    pub brand: String,
    pub description: String,
    pub category_id: i64,
}

impl StoredProduct {
    pub fn from_parsed(product: Product, category_id: i64, markdown: i64) -> Self {
        Self {
            price: apply_markdown(product.price, markdown),
            original_price: product.price,
            external_id: product.external_id,
            sku: product.sku,
            name: product.name,
            image_url: product.image_url,
            product_url: product.product_url,
            brand: product.brand,
            description: product.description,
            category_id,
        }
    }
}

/// Store-facing price: the original price minus the markdown, floored at zero.
pub fn apply_markdown(original_price: i64, markdown: i64) -> i64 {
    (original_price - markdown).max(0)
}

/// Position within a paginated category listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationInfo {
    pub current_page: u32,
    pub total_pages: u32,
}

impl Default for PaginationInfo {
    fn default() -> Self {
        Self {
            current_page: 1,
            total_pages: 1,
        }
    }
}
