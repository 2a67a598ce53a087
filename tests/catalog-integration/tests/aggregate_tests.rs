use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mbaal_catalog_integration::harness::TestHarness;
use mbaal_catalog_integration::make_dummy_product;
use mbaal_common::error::{StoreError, StoreResult};
use mbaal_common::product::{ProductPatch, ProductStatus};
use mbaal_common::{Category, CategoryFilter, CategoryId, CategoryStore, MemoryStore};

/// Publishing a product counts it; archiving it uncounts it.
#[tokio::test]
async fn publish_then_archive() {
    let h = TestHarness::setup().await;
    assert_eq!(h.cached_count(&h.grains).await, 0);

    let product = h.add_product("Millet", &h.grains, ProductStatus::Published).await;
    assert_eq!(h.cached_count(&h.grains).await, 1);

    h.catalog
        .update_product(&product.id, ProductPatch::status(ProductStatus::Archived))
        .await
        .unwrap();
    assert_eq!(h.cached_count(&h.grains).await, 0);
    h.assert_counts_consistent().await;
}

/// Drafts are not counted until published, and `published_at` is stamped once.
#[tokio::test]
async fn drafts_do_not_count() {
    let h = TestHarness::setup().await;
    let draft = h.add_product("Sorghum", &h.grains, ProductStatus::Draft).await;
    assert_eq!(h.cached_count(&h.grains).await, 0);
    assert!(draft.published_at.is_none());

    let published = h
        .catalog
        .update_product(&draft.id, ProductPatch::status(ProductStatus::Published))
        .await
        .unwrap();
    let first_publish = published.published_at;
    assert!(first_publish.is_some());
    assert_eq!(h.cached_count(&h.grains).await, 1);

    h.catalog
        .update_product(&draft.id, ProductPatch::status(ProductStatus::Suspended))
        .await
        .unwrap();
    let republished = h
        .catalog
        .update_product(&draft.id, ProductPatch::status(ProductStatus::Published))
        .await
        .unwrap();
    assert_eq!(republished.published_at, first_publish);
}

/// Moving a published product recounts both the old and the new category.
#[tokio::test]
async fn moving_product_recounts_both_categories() {
    let h = TestHarness::setup().await;
    let product = h.add_product("Basmati", &h.grains, ProductStatus::Published).await;
    h.add_product("Millet", &h.grains, ProductStatus::Published).await;
    assert_eq!(h.cached_count(&h.grains).await, 2);

    h.catalog
        .update_product(&product.id, ProductPatch::move_to(&h.rice.id))
        .await
        .unwrap();
    assert_eq!(h.cached_count(&h.grains).await, 1);
    assert_eq!(h.cached_count(&h.rice).await, 1);
    h.assert_counts_consistent().await;
}

/// Deleting a product recounts its category without it.
#[tokio::test]
async fn delete_product_recounts() {
    let h = TestHarness::setup().await;
    let a = h.add_product("Millet", &h.grains, ProductStatus::Published).await;
    h.add_product("Teff", &h.grains, ProductStatus::Published).await;

    h.catalog.delete_product(&a.id).await.unwrap();
    assert_eq!(h.cached_count(&h.grains).await, 1);
    h.assert_counts_consistent().await;
}

/// Counts are per category, not per subtree.
#[tokio::test]
async fn counts_are_not_rolled_up() {
    let h = TestHarness::setup().await;
    h.add_product("Jasmine", &h.rice, ProductStatus::Published).await;
    assert_eq!(h.cached_count(&h.rice).await, 1);
    assert_eq!(h.cached_count(&h.grains).await, 0);
    assert_eq!(h.cached_count(&h.food).await, 0);
}

/// Product write errors leave counts untouched.
#[tokio::test]
async fn rejected_product_does_not_count() {
    let h = TestHarness::setup().await;
    h.add_product("Millet", &h.grains, ProductStatus::Published).await;

    let mut dup = make_dummy_product("Millet", &h.grains.id, ProductStatus::Published, &h.suffix);
    dup.sku = Some("UNIQUE-1".into());
    let err = h.catalog.create_product(dup).await.unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(h.cached_count(&h.grains).await, 1);
}

/// Delegates to a [`MemoryStore`] but can be told to fail count writes.
struct FlakyCountStore {
    inner: Arc<MemoryStore>,
    fail_counts: AtomicBool,
}

#[async_trait]
impl CategoryStore for FlakyCountStore {
    async fn get(&self, id: &CategoryId) -> StoreResult<Option<Category>> {
        CategoryStore::get(self.inner.as_ref(), id).await
    }
    async fn find_by_slug(&self, slug: &str) -> StoreResult<Option<Category>> {
        CategoryStore::find_by_slug(self.inner.as_ref(), slug).await
    }
    async fn children(&self, parent: &CategoryId) -> StoreResult<Vec<Category>> {
        self.inner.children(parent).await
    }
    async fn list(&self, filter: &CategoryFilter) -> StoreResult<Vec<Category>> {
        CategoryStore::list(self.inner.as_ref(), filter).await
    }
    async fn insert(&self, category: &Category) -> StoreResult<()> {
        CategoryStore::insert(self.inner.as_ref(), category).await
    }
    async fn replace(&self, category: &Category) -> StoreResult<bool> {
        CategoryStore::replace(self.inner.as_ref(), category).await
    }
    async fn set_hierarchy(
        &self,
        id: &CategoryId,
        ancestors: &[CategoryId],
        level: u8,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.inner.set_hierarchy(id, ancestors, level, at).await
    }
    async fn set_product_count(
        &self,
        id: &CategoryId,
        count: u64,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        if self.fail_counts.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("count write refused".into()));
        }
        self.inner.set_product_count(id, count, at).await
    }
    async fn delete(&self, id: &CategoryId) -> StoreResult<bool> {
        CategoryStore::delete(self.inner.as_ref(), id).await
    }
}

/// A failed recount does not fail the product write; the stale count is
/// repaired by the next successful write or by reconciliation.
#[tokio::test]
async fn sync_failure_is_swallowed_and_repairable() {
    let memory = Arc::new(MemoryStore::new());
    let flaky = Arc::new(FlakyCountStore {
        inner: memory.clone(),
        fail_counts: AtomicBool::new(false),
    });
    let h = TestHarness::setup_on(flaky.clone(), memory.clone()).await;

    flaky.fail_counts.store(true, Ordering::SeqCst);
    let product = h.add_product("Millet", &h.grains, ProductStatus::Published).await;
    assert!(h.catalog.product(&product.id).await.is_ok());
    assert_eq!(h.cached_count(&h.grains).await, 0, "count left stale");
    assert_eq!(h.live_count(&h.grains).await, 1);

    flaky.fail_counts.store(false, Ordering::SeqCst);
    let report = h.catalog.reconcile_counts().await.unwrap();
    assert_eq!(report.checked, 4);
    assert_eq!(report.corrected, 1);
    h.assert_counts_consistent().await;
}

/// Reconciliation rewrites only drifted counts.
#[tokio::test]
async fn reconcile_is_idempotent() {
    let h = TestHarness::setup().await;
    h.add_product("Millet", &h.grains, ProductStatus::Published).await;
    h.categories
        .set_product_count(&h.food.id, 42, Utc::now())
        .await
        .unwrap();

    let report = h.catalog.reconcile_counts().await.unwrap();
    assert_eq!(report.corrected, 1);
    assert_eq!(h.cached_count(&h.food).await, 0);

    let again = h.catalog.reconcile_counts().await.unwrap();
    assert_eq!(again.corrected, 0);
}
