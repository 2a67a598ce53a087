//! Document-store ports consumed by the hierarchy maintainer, the aggregate
//! synchronizer and the catalog service.
//!
//! Implementations live in [`crate::memory_store`] and, behind the `postgres`
//! feature, [`crate::postgres`]. Both are injected as trait objects so the
//! services never name a concrete backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::category::{Category, CategoryStatus};
use crate::error::StoreResult;
use crate::identity::{CategoryId, ProductId};
use crate::product::{Product, ProductStatus, ProductVisibility};

pub const DEFAULT_PAGE_LIMIT: usize = 20;
pub const MAX_PAGE_LIMIT: usize = 100;

/// Clamp a requested page size into `1..=MAX_PAGE_LIMIT`.
pub fn page_limit(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT)
}

/// Which parents a category listing should match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ParentFilter {
    #[default]
    Any,
    Root,
    Under(CategoryId),
}

/// Filter for [`CategoryStore::list`]. Results are sorted by level, display
/// order, then name.
#[derive(Debug, Clone, Default)]
pub struct CategoryFilter {
    pub parent: ParentFilter,
    pub level: Option<u8>,
    pub status: Option<CategoryStatus>,
    /// Only categories whose cached product count is zero.
    pub empty_only: bool,
    pub skip: usize,
    /// `None` means no limit.
    pub limit: Option<usize>,
}

impl CategoryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, category: &Category) -> bool {
        let parent_ok = match &self.parent {
            ParentFilter::Any => true,
            ParentFilter::Root => category.parent.is_none(),
            ParentFilter::Under(id) => category.parent.as_ref() == Some(id),
        };
        parent_ok
            && self.level.map_or(true, |l| category.level == l)
            && self.status.map_or(true, |s| category.status == s)
            && (!self.empty_only || category.stats.product_count == 0)
    }
}

/// Filter for [`ProductStore::list`]. Results are newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductFilter {
    #[serde(default)]
    pub category: Option<CategoryId>,
    #[serde(default)]
    pub status: Option<ProductStatus>,
    #[serde(default)]
    pub visibility: Option<ProductVisibility>,
    #[serde(default)]
    pub skip: usize,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        self.category
            .as_ref()
            .map_or(true, |c| product.category.as_ref() == Some(c))
            && self.status.map_or(true, |s| product.status == s)
            && self.visibility.map_or(true, |v| product.visibility == v)
    }
}

/// Sort order shared by category listings.
pub fn category_sort_key(category: &Category) -> (u8, i32, String) {
    (category.level, category.display_order, category.name.clone())
}

/// Persistence port for categories.
#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn get(&self, id: &CategoryId) -> StoreResult<Option<Category>>;

    async fn find_by_slug(&self, slug: &str) -> StoreResult<Option<Category>>;

    /// Direct children, sorted by display order then name.
    async fn children(&self, parent: &CategoryId) -> StoreResult<Vec<Category>>;

    async fn list(&self, filter: &CategoryFilter) -> StoreResult<Vec<Category>>;

    /// Fails with [`StoreError::Duplicate`](crate::error::StoreError::Duplicate)
    /// when the id or slug is taken.
    async fn insert(&self, category: &Category) -> StoreResult<()>;

    /// Overwrite an existing document. Returns `false` if it no longer exists.
    async fn replace(&self, category: &Category) -> StoreResult<bool>;

    /// Field-level write of the denormalized hierarchy.
    async fn set_hierarchy(
        &self,
        id: &CategoryId,
        ancestors: &[CategoryId],
        level: u8,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Field-level write of the cached product count.
    async fn set_product_count(
        &self,
        id: &CategoryId,
        count: u64,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn delete(&self, id: &CategoryId) -> StoreResult<bool>;
}

/// Persistence port for products.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn get(&self, id: &ProductId) -> StoreResult<Option<Product>>;

    async fn find_by_slug(&self, slug: &str) -> StoreResult<Option<Product>>;

    async fn find_by_sku(&self, sku: &str) -> StoreResult<Option<Product>>;

    async fn list(&self, filter: &ProductFilter) -> StoreResult<Vec<Product>>;

    /// Number of published products whose `category` is `category`,
    /// ignoring `excluding` when given.
    async fn count_published(
        &self,
        category: &CategoryId,
        excluding: Option<&ProductId>,
    ) -> StoreResult<u64>;

    async fn insert(&self, product: &Product) -> StoreResult<()>;

    async fn replace(&self, product: &Product) -> StoreResult<bool>;

    async fn delete(&self, id: &ProductId) -> StoreResult<bool>;

    /// Clear `category` where it equals `category` and drop it from
    /// `subcategories`. Returns the number of products touched.
    async fn detach_category(&self, category: &CategoryId) -> StoreResult<u64>;
}
