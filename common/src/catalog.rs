//! Catalog service: validated category and product operations.
//!
//! Every mutation runs its side effects explicitly and in a fixed order:
//! hierarchy recomputation before a category write, descendant cascade after
//! it, product-count sync after a product write and before a product delete.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregate::{AggregateSynchronizer, ReconcileReport};
use crate::category::{
    Category, CategoryInput, CategoryPatch, CategoryStatus, CategoryTotals, CategoryTreeNode,
    CATEGORY_DESCRIPTION_MAX, CATEGORY_NAME_MAX,
};
use crate::error::{CatalogError, CatalogResult, StoreError};
use crate::hierarchy::HierarchyMaintainer;
use crate::identity::{CategoryId, ProductId};
use crate::product::{
    Inventory, Product, ProductInput, ProductPatch, DEFAULT_LOW_STOCK_THRESHOLD,
    PRODUCT_DESCRIPTION_MAX, PRODUCT_NAME_MAX,
};
use crate::slug::{generate_sku, normalize_sku, optional_text, required_text, resolve_slug};
use crate::store::{CategoryFilter, CategoryStore, ProductFilter, ProductStore};

/// Generated SKUs are retried this many times before giving up on a collision.
const SKU_ATTEMPTS: usize = 5;

/// Separator used by [`join_path`].
pub const PATH_SEPARATOR: &str = " > ";

/// Join breadcrumb names into a display path such as `Food > Grains > Rice`.
pub fn join_path(breadcrumbs: &[Category]) -> String {
    breadcrumbs
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(PATH_SEPARATOR)
}

/// What a cascading category delete removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDeletion {
    /// Removed ids, deepest first.
    pub removed: Vec<CategoryId>,
    pub products_detached: u64,
}

pub struct Catalog {
    categories: Arc<dyn CategoryStore>,
    products: Arc<dyn ProductStore>,
    hierarchy: HierarchyMaintainer,
    aggregates: AggregateSynchronizer,
}

impl Catalog {
    pub fn new(categories: Arc<dyn CategoryStore>, products: Arc<dyn ProductStore>) -> Self {
        Self {
            hierarchy: HierarchyMaintainer::new(categories.clone()),
            aggregates: AggregateSynchronizer::new(categories.clone(), products.clone()),
            categories,
            products,
        }
    }

    // ─── Categories ─────────────────────────────────────────────────────────

    pub async fn create_category(&self, input: CategoryInput) -> CatalogResult<Category> {
        let name = required_text("name", &input.name, CATEGORY_NAME_MAX)?;
        let description = optional_text(
            "description",
            input.description.as_deref(),
            CATEGORY_DESCRIPTION_MAX,
        )?;
        let slug = resolve_slug(input.slug.as_deref(), &name)?;
        if self.categories.find_by_slug(&slug).await?.is_some() {
            return Err(CatalogError::DuplicateSlug(slug));
        }
        if let Some(id) = &input.id {
            if self.categories.get(id).await?.is_some() {
                return Err(CatalogError::DuplicateId(id.to_string()));
            }
        }
        if let Some(parent) = &input.parent {
            self.hierarchy
                .validate_parent_for_new(input.id.as_ref(), parent)
                .await?;
        }

        let now = Utc::now();
        let id = input.id.unwrap_or_else(CategoryId::generate);
        let mut category = Category::new(id, name, slug, now);
        category.description = description;
        category.parent = input.parent;
        category.display_order = input.display_order.unwrap_or_default();
        category.status = input.status.unwrap_or_default();
        category.visibility = input.visibility.unwrap_or_default();
        self.hierarchy.recompute_self(&mut category).await?;

        self.categories
            .insert(&category)
            .await
            .map_err(|e| duplicate_category(e, &category))?;
        info!(
            "Created category {} '{}' at level {}",
            category.id, category.name, category.level
        );
        Ok(category)
    }

    pub async fn update_category(
        &self,
        id: &CategoryId,
        patch: CategoryPatch,
    ) -> CatalogResult<Category> {
        let current = self.category(id).await?;
        let mut next = current.clone();

        if let Some(name) = &patch.name {
            next.name = required_text("name", name, CATEGORY_NAME_MAX)?;
        }
        if let Some(slug) = &patch.slug {
            next.slug = resolve_slug(Some(slug), &next.name)?;
            if next.slug != current.slug {
                if let Some(other) = self.categories.find_by_slug(&next.slug).await? {
                    if other.id != current.id {
                        return Err(CatalogError::DuplicateSlug(next.slug));
                    }
                }
            }
        }
        if let Some(description) = &patch.description {
            next.description = optional_text(
                "description",
                description.as_deref(),
                CATEGORY_DESCRIPTION_MAX,
            )?;
        }
        if let Some(order) = patch.display_order {
            next.display_order = order;
        }
        if let Some(status) = patch.status {
            next.status = status;
        }
        if let Some(visibility) = patch.visibility {
            next.visibility = visibility;
        }

        let mut parent_changed = false;
        if let Some(new_parent) = patch.parent {
            if new_parent != current.parent {
                if let Some(parent_id) = &new_parent {
                    self.hierarchy.validate_new_parent(&current, parent_id).await?;
                }
                next.parent = new_parent;
                self.hierarchy.recompute_self(&mut next).await?;
                parent_changed = true;
            }
        }
        let name_changed = next.name != current.name;
        next.updated_at = Utc::now();

        let found = self
            .categories
            .replace(&next)
            .await
            .map_err(|e| duplicate_category(e, &next))?;
        if !found {
            return Err(CatalogError::CategoryNotFound(id.clone()));
        }
        info!("Updated category {} '{}'", next.id, next.name);

        if parent_changed || name_changed {
            self.hierarchy.cascade_to_children(&next).await?;
        }
        Ok(next)
    }

    /// Delete `id` and its whole subtree, deepest first. Products pointing at
    /// a removed category keep existing with the reference cleared.
    pub async fn delete_category(&self, id: &CategoryId) -> CatalogResult<CategoryDeletion> {
        let subtree = self.hierarchy.collect_subtree(id).await?;
        if subtree.is_empty() {
            return Err(CatalogError::CategoryNotFound(id.clone()));
        }

        let mut deletion = CategoryDeletion {
            removed: Vec::with_capacity(subtree.len()),
            products_detached: 0,
        };
        for category in subtree.into_iter().rev() {
            deletion.products_detached += self.products.detach_category(&category.id).await?;
            if self.categories.delete(&category.id).await? {
                deletion.removed.push(category.id);
            }
        }
        info!(
            "Deleted category {} with {} categor(ies) removed and {} product(s) detached",
            id,
            deletion.removed.len(),
            deletion.products_detached
        );
        Ok(deletion)
    }

    pub async fn category(&self, id: &CategoryId) -> CatalogResult<Category> {
        self.categories
            .get(id)
            .await?
            .ok_or_else(|| CatalogError::CategoryNotFound(id.clone()))
    }

    pub async fn category_by_slug(&self, slug: &str) -> CatalogResult<Category> {
        self.categories
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| CatalogError::CategoryNotFound(CategoryId::from(slug)))
    }

    pub async fn categories(&self, filter: &CategoryFilter) -> CatalogResult<Vec<Category>> {
        Ok(self.categories.list(filter).await?)
    }

    pub async fn children(&self, id: &CategoryId) -> CatalogResult<Vec<Category>> {
        self.category(id).await?;
        Ok(self.categories.children(id).await?)
    }

    /// All transitive descendants of `id`, parents before children.
    pub async fn descendants(&self, id: &CategoryId) -> CatalogResult<Vec<Category>> {
        let mut subtree = self.hierarchy.collect_subtree(id).await?;
        if subtree.is_empty() {
            return Err(CatalogError::CategoryNotFound(id.clone()));
        }
        subtree.remove(0);
        Ok(subtree)
    }

    /// Ancestors root-first, followed by the category itself. Ancestors that
    /// no longer exist are skipped.
    pub async fn breadcrumbs(&self, id: &CategoryId) -> CatalogResult<Vec<Category>> {
        let category = self.category(id).await?;
        let mut trail = Vec::with_capacity(category.ancestors.len() + 1);
        for ancestor in &category.ancestors {
            if let Some(found) = self.categories.get(ancestor).await? {
                trail.push(found);
            }
        }
        trail.push(category);
        Ok(trail)
    }

    /// Display path such as `Food > Grains > Rice`.
    pub async fn full_path(&self, id: &CategoryId) -> CatalogResult<String> {
        Ok(join_path(&self.breadcrumbs(id).await?))
    }

    /// Nested view of all active categories.
    pub async fn tree(&self) -> CatalogResult<Vec<CategoryTreeNode>> {
        let active = self
            .categories
            .list(&CategoryFilter {
                status: Some(CategoryStatus::Active),
                ..CategoryFilter::all()
            })
            .await?;
        Ok(HierarchyMaintainer::build_tree(active))
    }

    /// Active categories without any published product.
    pub async fn empty_categories(&self) -> CatalogResult<Vec<Category>> {
        Ok(self
            .categories
            .list(&CategoryFilter {
                status: Some(CategoryStatus::Active),
                empty_only: true,
                ..CategoryFilter::all()
            })
            .await?)
    }

    pub async fn category_stats(&self) -> CatalogResult<CategoryTotals> {
        let all = self.categories.list(&CategoryFilter::all()).await?;
        Ok(CategoryTotals::from_categories(&all))
    }

    // ─── Products ───────────────────────────────────────────────────────────

    pub async fn create_product(&self, input: ProductInput) -> CatalogResult<Product> {
        let name = required_text("name", &input.name, PRODUCT_NAME_MAX)?;
        let description =
            required_text("description", &input.description, PRODUCT_DESCRIPTION_MAX)?;
        let slug = resolve_slug(input.slug.as_deref(), &name)?;
        if self.products.find_by_slug(&slug).await?.is_some() {
            return Err(CatalogError::DuplicateSlug(slug));
        }
        self.require_category(&input.category).await?;
        for sub in &input.subcategories {
            self.require_category(sub).await?;
        }
        input.pricing.validate()?;
        let sku = self.claimable_sku(input.sku.as_deref(), &input.category).await?;

        let now = Utc::now();
        let mut product = Product {
            id: input.id.unwrap_or_else(ProductId::generate),
            name,
            slug,
            sku,
            description,
            category: Some(input.category),
            subcategories: input.subcategories,
            tags: normalize_tags(input.tags),
            pricing: input.pricing,
            inventory: Inventory::new(
                input.stock_quantity,
                input
                    .low_stock_threshold
                    .unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD),
            ),
            status: input.status,
            visibility: input.visibility,
            published_at: None,
            created_at: now,
            updated_at: now,
        };
        product.apply_lifecycle(now);

        self.products
            .insert(&product)
            .await
            .map_err(|e| duplicate_product(e, &product))?;
        info!("Created product {} '{}' ({})", product.id, product.name, product.sku);

        self.aggregates.on_product_persisted(&product, None).await;
        Ok(product)
    }

    pub async fn update_product(
        &self,
        id: &ProductId,
        patch: ProductPatch,
    ) -> CatalogResult<Product> {
        let current = self.product(id).await?;
        let mut next = current.clone();

        if let Some(name) = &patch.name {
            next.name = required_text("name", name, PRODUCT_NAME_MAX)?;
        }
        if let Some(slug) = &patch.slug {
            next.slug = resolve_slug(Some(slug), &next.name)?;
            if next.slug != current.slug {
                if let Some(other) = self.products.find_by_slug(&next.slug).await? {
                    if other.id != current.id {
                        return Err(CatalogError::DuplicateSlug(next.slug));
                    }
                }
            }
        }
        if let Some(sku) = &patch.sku {
            let sku = required_text("sku", sku, PRODUCT_NAME_MAX)?.to_uppercase();
            if sku != current.sku {
                if let Some(other) = self.products.find_by_sku(&sku).await? {
                    if other.id != current.id {
                        return Err(CatalogError::DuplicateSku(sku));
                    }
                }
            }
            next.sku = sku;
        }
        if let Some(description) = &patch.description {
            next.description = required_text("description", description, PRODUCT_DESCRIPTION_MAX)?;
        }
        if let Some(category) = patch.category {
            self.require_category(&category).await?;
            next.category = Some(category);
        }
        if let Some(subcategories) = patch.subcategories {
            for sub in &subcategories {
                self.require_category(sub).await?;
            }
            next.subcategories = subcategories;
        }
        if let Some(tags) = patch.tags {
            next.tags = normalize_tags(tags);
        }
        if let Some(pricing) = patch.pricing {
            pricing.validate()?;
            next.pricing = pricing;
        }
        if let Some(quantity) = patch.stock_quantity {
            next.inventory.stock_quantity = quantity;
        }
        if let Some(threshold) = patch.low_stock_threshold {
            next.inventory.low_stock_threshold = threshold;
        }
        if let Some(status) = patch.status {
            next.status = status;
        }
        if let Some(visibility) = patch.visibility {
            next.visibility = visibility;
        }
        next.apply_lifecycle(Utc::now());

        let found = self
            .products
            .replace(&next)
            .await
            .map_err(|e| duplicate_product(e, &next))?;
        if !found {
            return Err(CatalogError::ProductNotFound(id.clone()));
        }
        info!("Updated product {} '{}'", next.id, next.name);

        let previous = current.category.filter(|c| next.category.as_ref() != Some(c));
        self.aggregates
            .on_product_persisted(&next, previous.as_ref())
            .await;
        Ok(next)
    }

    /// Remove a product, recounting its category first.
    pub async fn delete_product(&self, id: &ProductId) -> CatalogResult<Product> {
        let product = self.product(id).await?;
        self.aggregates.on_product_removed(&product).await;
        if !self.products.delete(id).await? {
            return Err(CatalogError::ProductNotFound(id.clone()));
        }
        info!("Deleted product {} '{}'", product.id, product.name);
        Ok(product)
    }

    pub async fn product(&self, id: &ProductId) -> CatalogResult<Product> {
        self.products
            .get(id)
            .await?
            .ok_or_else(|| CatalogError::ProductNotFound(id.clone()))
    }

    pub async fn product_by_slug(&self, slug: &str) -> CatalogResult<Product> {
        self.products
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| CatalogError::ProductNotFound(ProductId::from(slug)))
    }

    pub async fn products(&self, filter: &ProductFilter) -> CatalogResult<Vec<Product>> {
        Ok(self.products.list(filter).await?)
    }

    /// Recount every category's published products, rewriting drifted counts.
    pub async fn reconcile_counts(&self) -> CatalogResult<ReconcileReport> {
        self.aggregates.reconcile_all().await
    }

    // ─── Helpers ────────────────────────────────────────────────────────────

    async fn require_category(&self, id: &CategoryId) -> CatalogResult<()> {
        match self.categories.get(id).await? {
            Some(_) => Ok(()),
            None => Err(CatalogError::CategoryNotFound(id.clone())),
        }
    }

    async fn claimable_sku(
        &self,
        explicit: Option<&str>,
        category: &CategoryId,
    ) -> CatalogResult<String> {
        if let Some(sku) = normalize_sku(explicit) {
            if self.products.find_by_sku(&sku).await?.is_some() {
                return Err(CatalogError::DuplicateSku(sku));
            }
            return Ok(sku);
        }
        let mut last = String::new();
        for _ in 0..SKU_ATTEMPTS {
            last = generate_sku(Some(category));
            if self.products.find_by_sku(&last).await?.is_none() {
                return Ok(last);
            }
        }
        Err(CatalogError::DuplicateSku(last))
    }
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Memory store keys read `category id '..'`; Postgres reports `*_pkey`.
fn is_id_key(key: &str) -> bool {
    key.contains(" id '") || key.ends_with("_pkey")
}

fn is_sku_key(key: &str) -> bool {
    key.contains("sku '") || key.ends_with("_sku_key")
}

fn duplicate_category(err: StoreError, category: &Category) -> CatalogError {
    match err {
        StoreError::Duplicate(key) if is_id_key(&key) => {
            CatalogError::DuplicateId(category.id.to_string())
        }
        StoreError::Duplicate(_) => CatalogError::DuplicateSlug(category.slug.clone()),
        other => CatalogError::Store(other),
    }
}

fn duplicate_product(err: StoreError, product: &Product) -> CatalogError {
    match err {
        StoreError::Duplicate(key) if is_id_key(&key) => {
            CatalogError::DuplicateId(product.id.to_string())
        }
        StoreError::Duplicate(key) if is_sku_key(&key) => {
            CatalogError::DuplicateSku(product.sku.clone())
        }
        StoreError::Duplicate(_) => CatalogError::DuplicateSlug(product.slug.clone()),
        other => CatalogError::Store(other),
    }
}
