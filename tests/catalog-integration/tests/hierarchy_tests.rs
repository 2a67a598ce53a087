use mbaal_catalog_integration::harness::TestHarness;
use mbaal_catalog_integration::make_dummy_category;
use mbaal_common::category::CategoryStatus;
use mbaal_common::product::ProductStatus;
use mbaal_common::{CatalogError, CategoryId, CategoryInput, CategoryPatch};

/// The fixture itself satisfies the ancestor/level invariants.
#[tokio::test]
async fn fixture_hierarchy_is_consistent() {
    let h = TestHarness::setup().await;
    assert_eq!(h.food.level, 0);
    assert_eq!(h.grains.ancestors, vec![h.food.id.clone()]);
    assert_eq!(h.rice.ancestors, vec![h.food.id.clone(), h.grains.id.clone()]);
    assert_eq!(h.rice.level, 2);
    h.assert_hierarchy_consistent().await;
}

/// Moving Grains under Imports rewrites Grains and, transitively, Rice.
#[tokio::test]
async fn moving_subtree_cascades_to_grandchildren() {
    let h = TestHarness::setup().await;

    let grains = h
        .catalog
        .update_category(&h.grains.id, CategoryPatch::move_to(Some(&h.imports.id)))
        .await
        .unwrap();
    assert_eq!(grains.ancestors, vec![h.imports.id.clone()]);
    assert_eq!(grains.level, 1);

    let rice = h.refetch(&h.rice).await;
    assert_eq!(rice.ancestors, vec![h.imports.id.clone(), h.grains.id.clone()]);
    assert_eq!(rice.level, 2);
    assert_eq!(
        h.catalog.full_path(&rice.id).await.unwrap(),
        "Imports > Grains > Rice"
    );
    h.assert_hierarchy_consistent().await;
}

/// Setting a root's parent to null again changes nothing.
#[tokio::test]
async fn root_stays_root() {
    let h = TestHarness::setup().await;
    let food = h
        .catalog
        .update_category(&h.food.id, CategoryPatch::move_to(None))
        .await
        .unwrap();
    assert!(food.is_root());
    assert_eq!(food.level, 0);
    assert_eq!(h.refetch(&h.rice).await.level, 2);
}

/// Renaming an interior node keeps every descendant consistent.
#[tokio::test]
async fn rename_keeps_descendants_consistent() {
    let h = TestHarness::setup().await;
    let basmati = h.add_category("Basmati", Some(&h.rice)).await;

    h.catalog
        .update_category(&h.food.id, CategoryPatch::rename("Foodstuffs"))
        .await
        .unwrap();

    let basmati = h.refetch(&basmati).await;
    assert_eq!(basmati.ancestors[0], h.food.id);
    assert_eq!(basmati.level, 3);
    assert_eq!(
        h.catalog.full_path(&basmati.id).await.unwrap(),
        "Foodstuffs > Grains > Rice > Basmati"
    );
    h.assert_hierarchy_consistent().await;
}

/// A parent at level 3 accepts a child at level 4; a parent at level 4 does not.
#[tokio::test]
async fn depth_limit_on_create() {
    let h = TestHarness::setup().await;
    let l3 = h.add_category("Basmati", Some(&h.rice)).await;
    assert_eq!(l3.level, 3);

    let l4 = h.add_category("Premium", Some(&l3)).await;
    assert_eq!(l4.level, 4);

    let err = h
        .catalog
        .create_category(make_dummy_category("Too Deep", Some(&l4.id), &h.suffix))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::MaxDepthExceeded(_)), "got {err:?}");
    assert!(err.is_client_error());
}

/// A category cannot be created as its own parent.
#[tokio::test]
async fn self_parent_on_create() {
    let h = TestHarness::setup().await;
    let input = make_dummy_category("Sub", Some(&CategoryId::from("sub-self")), &h.suffix);
    let input = CategoryInput {
        id: Some(CategoryId::from("sub-self")),
        ..input
    };
    let err = h.catalog.create_category(input).await.unwrap_err();
    assert!(matches!(err, CatalogError::SelfParent(_)), "got {err:?}");
    assert!(h.catalog.category(&CategoryId::from("sub-self")).await.is_err());
}

/// Moving a category under one of its own descendants is rejected and
/// leaves the tree untouched.
#[tokio::test]
async fn transitive_cycle_rejected() {
    let h = TestHarness::setup().await;
    let err = h
        .catalog
        .update_category(&h.food.id, CategoryPatch::move_to(Some(&h.rice.id)))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::CyclicParent { .. }), "got {err:?}");
    assert!(h.refetch(&h.food).await.is_root());
    h.assert_hierarchy_consistent().await;
}

/// A move that would push a descendant past level 4 is rejected.
#[tokio::test]
async fn deep_subtree_cannot_move_down() {
    let h = TestHarness::setup().await;
    let basmati = h.add_category("Basmati", Some(&h.rice)).await;
    let regional = h.add_category("Regional", Some(&h.imports)).await;

    // Food's subtree has height 3; under Regional (level 1) its deepest node
    // would land on level 5.
    let err = h
        .catalog
        .update_category(&h.food.id, CategoryPatch::move_to(Some(&regional.id)))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::MaxDepthExceeded(_)), "got {err:?}");

    // Grains' subtree (height 2) fits under Regional: Basmati ends at level 4.
    h.catalog
        .update_category(&h.grains.id, CategoryPatch::move_to(Some(&regional.id)))
        .await
        .unwrap();
    assert_eq!(h.refetch(&basmati).await.level, 4);
    h.assert_hierarchy_consistent().await;
}

/// Deleting a category removes its subtree and detaches, but keeps, products.
#[tokio::test]
async fn delete_cascades_and_detaches_products() {
    let h = TestHarness::setup().await;
    let in_grains = h.add_product("Millet", &h.grains, ProductStatus::Published).await;
    let in_rice = h.add_product("Jasmine", &h.rice, ProductStatus::Draft).await;
    let in_imports = h.add_product("Saffron", &h.imports, ProductStatus::Published).await;

    let deletion = h.catalog.delete_category(&h.food.id).await.unwrap();
    assert_eq!(
        deletion.removed,
        vec![h.rice.id.clone(), h.grains.id.clone(), h.food.id.clone()]
    );
    assert_eq!(deletion.products_detached, 2);

    for removed in [&h.food, &h.grains, &h.rice] {
        let err = h.catalog.category(&removed.id).await.unwrap_err();
        assert!(err.is_not_found());
    }
    assert_eq!(h.catalog.product(&in_grains.id).await.unwrap().category, None);
    assert_eq!(h.catalog.product(&in_rice.id).await.unwrap().category, None);
    assert_eq!(
        h.catalog.product(&in_imports.id).await.unwrap().category,
        Some(h.imports.id.clone())
    );
}

/// Products that merely list a deleted category as a subcategory lose the link.
#[tokio::test]
async fn delete_removes_subcategory_links() {
    let h = TestHarness::setup().await;
    let mut input = mbaal_catalog_integration::make_dummy_product(
        "Spiced Rice",
        &h.imports.id,
        ProductStatus::Published,
        &h.suffix,
    );
    input.subcategories = vec![h.rice.id.clone()];
    let product = h.catalog.create_product(input).await.unwrap();

    h.catalog.delete_category(&h.rice.id).await.unwrap();
    let product = h.catalog.product(&product.id).await.unwrap();
    assert_eq!(product.category, Some(h.imports.id.clone()));
    assert!(product.subcategories.is_empty());
}

/// The tree view nests active categories by parent.
#[tokio::test]
async fn tree_and_stats() {
    let h = TestHarness::setup().await;
    h.add_product("Millet", &h.grains, ProductStatus::Published).await;
    let archived = h.add_category("Old Stock", Some(&h.imports)).await;
    h.catalog
        .update_category(
            &archived.id,
            CategoryPatch {
                status: Some(CategoryStatus::Archived),
                ..CategoryPatch::default()
            },
        )
        .await
        .unwrap();

    let tree = h.catalog.tree().await.unwrap();
    let food = tree.iter().find(|n| n.id == h.food.id).unwrap();
    assert_eq!(food.children.len(), 1);
    assert_eq!(food.children[0].children[0].id, h.rice.id);
    let imports = tree.iter().find(|n| n.id == h.imports.id).unwrap();
    assert!(imports.children.is_empty());

    let stats = h.catalog.category_stats().await.unwrap();
    assert_eq!(stats.total_categories, 4);
    assert_eq!(stats.total_products, 1);
    assert_eq!(stats.categories_with_products, 1);
    assert_eq!(stats.main_categories, 2);
    assert_eq!(stats.subcategories, 2);

    let empty = h.catalog.empty_categories().await.unwrap();
    assert_eq!(empty.len(), 3);
    assert!(empty.iter().all(|c| c.id != h.grains.id));
}

/// Breadcrumbs list ancestors root-first and end with the category.
#[tokio::test]
async fn breadcrumbs_and_children() {
    let h = TestHarness::setup().await;
    let crumbs = h.catalog.breadcrumbs(&h.rice.id).await.unwrap();
    let names: Vec<&str> = crumbs.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Food", "Grains", "Rice"]);

    let children = h.catalog.children(&h.food.id).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, h.grains.id);

    let descendants = h.catalog.descendants(&h.food.id).await.unwrap();
    assert_eq!(descendants.len(), 2);

    let by_slug = h
        .catalog
        .category_by_slug(&format!("rice-{}", h.suffix))
        .await
        .unwrap();
    assert_eq!(by_slug.id, h.rice.id);
}
