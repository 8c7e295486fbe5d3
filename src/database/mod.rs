use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::{Category, PersistedCategory, StoredProduct};
use crate::traits::{CategoryStore, ProductStore};

/// SQLite-backed category and product store
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the database at `url` and applies migrations.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        info!(url, "database connected");
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        info!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl CategoryStore for Database {
    async fn upsert_categories(&self, categories: &[Category]) -> Result<(), StoreError> {
        if categories.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let mut query: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("INSERT INTO categories (name, slug, url, created_at, updated_at) ");

        query.push_values(categories, |mut row, category| {
            row.push_bind(&category.name)
                .push_bind(&category.slug)
                .push_bind(&category.url)
                .push_bind(now)
                .push_bind(now);
        });

        query.push(
            " ON CONFLICT (slug) DO UPDATE SET \
             name = excluded.name, \
             url = excluded.url, \
             updated_at = excluded.updated_at",
        );

        query.build().execute(&self.pool).await?;

        debug!(count = categories.len(), "categories upserted");
        Ok(())
    }

    async fn get_all_categories(&self) -> Result<Vec<PersistedCategory>, StoreError> {
        let categories = sqlx::query_as::<_, PersistedCategory>(
            "SELECT id, name, slug, url, created_at, updated_at FROM categories ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }
}

#[async_trait]
impl ProductStore for Database {
    async fn upsert_products(&self, products: &[StoredProduct]) -> Result<(), StoreError> {
        if products.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let mut query: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "INSERT INTO products (external_id, sku, name, original_price, price, image_url, \
             product_url, brand, description, category_id, created_at, updated_at) ",
        );

        query.push_values(products, |mut row, product| {
            row.push_bind(&product.external_id)
                .push_bind(&product.sku)
                .push_bind(&product.name)
                .push_bind(product.original_price)
                .push_bind(product.price)
                .push_bind(&product.image_url)
                .push_bind(&product.product_url)
                .push_bind(&product.brand)
                .push_bind(&product.description)
                .push_bind(product.category_id)
                .push_bind(now)
                .push_bind(now);
        });

        // An empty description means "not fetched", never "removed".
        query.push(
            " ON CONFLICT (external_id) DO UPDATE SET \
             sku = excluded.sku, \
             name = excluded.name, \
             original_price = excluded.original_price, \
             price = excluded.price, \
             image_url = excluded.image_url, \
             product_url = excluded.product_url, \
             brand = excluded.brand, \
             description = CASE WHEN excluded.description <> '' \
                 THEN excluded.description ELSE products.description END, \
             category_id = excluded.category_id, \
             updated_at = excluded.updated_at",
        );

        query.build().execute(&self.pool).await?;

        debug!(count = products.len(), "products upserted");
        Ok(())
    }
}
