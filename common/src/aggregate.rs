//! Keeps each category's cached `product_count` in line with the number of
//! published products that reference it.
//!
//! Recounts after a product write are best-effort: the product mutation is
//! already committed, so a failed recount is logged and swallowed. A stale
//! count heals on the next product write against the same category or on an
//! explicit [`AggregateSynchronizer::reconcile_all`].

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CatalogError, CatalogResult};
use crate::identity::{CategoryId, ProductId};
use crate::product::Product;
use crate::store::{CategoryFilter, CategoryStore, ProductStore};

/// Outcome of a full recount pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub checked: u64,
    pub corrected: u64,
}

pub struct AggregateSynchronizer {
    categories: Arc<dyn CategoryStore>,
    products: Arc<dyn ProductStore>,
}

impl AggregateSynchronizer {
    pub fn new(categories: Arc<dyn CategoryStore>, products: Arc<dyn ProductStore>) -> Self {
        Self {
            categories,
            products,
        }
    }

    /// Count published products in `category`, skipping `excluding`, and
    /// write the count onto the category.
    pub async fn recount(
        &self,
        category: &CategoryId,
        excluding: Option<&ProductId>,
    ) -> CatalogResult<u64> {
        let count = self.products.count_published(category, excluding).await?;
        let found = self
            .categories
            .set_product_count(category, count, Utc::now())
            .await?;
        if !found {
            return Err(CatalogError::CategoryNotFound(category.clone()));
        }
        debug!("Category {} now has {} published product(s)", category, count);
        Ok(count)
    }

    /// Run after a product was written. `previous_category` is the category
    /// the product belonged to before this write, when it changed.
    pub async fn on_product_persisted(
        &self,
        product: &Product,
        previous_category: Option<&CategoryId>,
    ) {
        if let Some(category) = &product.category {
            self.recount_best_effort(category, None).await;
        }
        if let Some(previous) = previous_category {
            if product.category.as_ref() != Some(previous) {
                self.recount_best_effort(previous, None).await;
            }
        }
    }

    /// Run before a product is deleted; the product itself is excluded from
    /// the count.
    pub async fn on_product_removed(&self, product: &Product) {
        if let Some(category) = &product.category {
            self.recount_best_effort(category, Some(&product.id)).await;
        }
    }

    async fn recount_best_effort(&self, category: &CategoryId, excluding: Option<&ProductId>) {
        if let Err(e) = self.recount(category, excluding).await {
            warn!("Product count sync for category {} failed: {}", category, e);
        }
    }

    /// Recount every category and rewrite the ones whose cached count drifted.
    pub async fn reconcile_all(&self) -> CatalogResult<ReconcileReport> {
        let mut report = ReconcileReport::default();
        for category in self.categories.list(&CategoryFilter::all()).await? {
            report.checked += 1;
            let actual = self.products.count_published(&category.id, None).await?;
            if actual == category.stats.product_count {
                continue;
            }
            debug!(
                "Correcting product count of {}: cached {}, actual {}",
                category.id, category.stats.product_count, actual
            );
            if self
                .categories
                .set_product_count(&category.id, actual, Utc::now())
                .await?
            {
                report.corrected += 1;
            }
        }
        info!(
            "Reconciled product counts: {} checked, {} corrected",
            report.checked, report.corrected
        );
        Ok(report)
    }
}
