use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::info;

use crate::error::ReconcileError;
use crate::models::Category;
use crate::traits::CategoryStore;

/// Maps category slugs to their persisted identifiers for one cycle
pub type SlugMap = HashMap<String, i64>;

/// Drops categories whose slug was already seen, keeping the first.
pub fn dedup_by_slug(categories: &[Category]) -> Vec<Category> {
    let mut seen = HashSet::with_capacity(categories.len());
    categories
        .iter()
        .filter(|category| seen.insert(category.slug.as_str()))
        .cloned()
        .collect()
}

/// Persists parsed categories and resolves their stable identifiers.
///
/// The store does not report generated identifiers from an upsert, so the
/// full category set is read back after every write.
pub struct CategoryReconciler {
    store: Arc<dyn CategoryStore>,
}

impl CategoryReconciler {
    pub fn new(store: Arc<dyn CategoryStore>) -> Self {
        Self { store }
    }

    pub async fn reconcile(&self, categories: &[Category]) -> Result<SlugMap, ReconcileError> {
        let unique = dedup_by_slug(categories);

        self.store
            .upsert_categories(&unique)
            .await
            .map_err(|source| ReconcileError::Upsert {
                count: unique.len(),
                source,
            })?;

        let persisted = self
            .store
            .get_all_categories()
            .await
            .map_err(|source| ReconcileError::ReadBack { source })?;

        let slug_to_id: SlugMap = persisted
            .into_iter()
            .map(|category| (category.slug, category.id))
            .collect();

        info!(
            parsed = categories.len(),
            upserted = unique.len(),
            persisted = slug_to_id.len(),
            "categories reconciled"
        );

        Ok(slug_to_id)
    }
}
