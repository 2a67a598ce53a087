#![cfg(feature = "postgres-tests")]

//! Runs the fixture scenarios against a real PostgreSQL database.
//! Requires `DATABASE_URL`; every harness uses its own slug suffix so the
//! suite can share one database.

use std::sync::Arc;

use mbaal_catalog_integration::harness::TestHarness;
use mbaal_common::postgres::PgStore;
use mbaal_common::product::{ProductPatch, ProductStatus};
use mbaal_common::{CatalogError, CategoryPatch};

async fn pg_harness() -> TestHarness {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres-tests");
    let store = Arc::new(PgStore::connect(&url, 4).await.expect("connect to PostgreSQL"));
    TestHarness::setup_on(store.clone(), store).await
}

#[tokio::test]
async fn pg_move_cascades() {
    let h = pg_harness().await;
    h.catalog
        .update_category(&h.grains.id, CategoryPatch::move_to(Some(&h.imports.id)))
        .await
        .unwrap();

    let rice = h.refetch(&h.rice).await;
    assert_eq!(rice.ancestors, vec![h.imports.id.clone(), h.grains.id.clone()]);
    assert_eq!(rice.level, 2);
    h.assert_hierarchy_consistent().await;
}

#[tokio::test]
async fn pg_duplicate_slug_is_rejected() {
    let h = pg_harness().await;
    let err = h
        .catalog
        .create_category(mbaal_catalog_integration::make_dummy_category(
            "Food", None, &h.suffix,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::DuplicateSlug(_)), "got {err:?}");
}

#[tokio::test]
async fn pg_counts_follow_product_writes() {
    let h = pg_harness().await;
    let product = h.add_product("Millet", &h.grains, ProductStatus::Published).await;
    assert_eq!(h.cached_count(&h.grains).await, 1);

    h.catalog
        .update_product(&product.id, ProductPatch::move_to(&h.rice.id))
        .await
        .unwrap();
    assert_eq!(h.cached_count(&h.grains).await, 0);
    assert_eq!(h.cached_count(&h.rice).await, 1);

    h.catalog.delete_product(&product.id).await.unwrap();
    h.assert_counts_consistent().await;
}

#[tokio::test]
async fn pg_delete_detaches_products() {
    let h = pg_harness().await;
    let product = h.add_product("Jasmine", &h.rice, ProductStatus::Published).await;

    let deletion = h.catalog.delete_category(&h.food.id).await.unwrap();
    assert_eq!(deletion.removed.len(), 3);
    assert_eq!(deletion.products_detached, 1);
    assert_eq!(h.catalog.product(&product.id).await.unwrap().category, None);
}
