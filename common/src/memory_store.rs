//! In-process document store backed by concurrent maps.
//!
//! Used by the server when no database URL is configured and by every test
//! suite. Slug and SKU uniqueness is enforced through secondary index maps,
//! always locked after the primary map.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::category::Category;
use crate::error::{StoreError, StoreResult};
use crate::identity::{CategoryId, ProductId};
use crate::product::Product;
use crate::store::{category_sort_key, CategoryFilter, CategoryStore, ProductFilter, ProductStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    categories: DashMap<CategoryId, Category>,
    category_slugs: DashMap<String, CategoryId>,
    products: DashMap<ProductId, Product>,
    product_slugs: DashMap<String, ProductId>,
    product_skus: DashMap<String, ProductId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }
}

/// Claim `key` in a unique index for `owner`. Re-claiming by the same owner is a no-op.
fn claim<K: Clone + Eq + std::hash::Hash>(
    index: &DashMap<String, K>,
    key: &str,
    owner: &K,
    what: &str,
) -> StoreResult<()> {
    match index.entry(key.to_string()) {
        Entry::Occupied(existing) if existing.get() != owner => {
            Err(StoreError::Duplicate(format!("{what} '{key}'")))
        }
        Entry::Occupied(_) => Ok(()),
        Entry::Vacant(slot) => {
            slot.insert(owner.clone());
            Ok(())
        }
    }
}

fn paginate<T>(items: Vec<T>, skip: usize, limit: Option<usize>) -> Vec<T> {
    let iter = items.into_iter().skip(skip);
    match limit {
        Some(limit) => iter.take(limit).collect(),
        None => iter.collect(),
    }
}

#[async_trait]
impl CategoryStore for MemoryStore {
    async fn get(&self, id: &CategoryId) -> StoreResult<Option<Category>> {
        Ok(self.categories.get(id).map(|c| c.value().clone()))
    }

    async fn find_by_slug(&self, slug: &str) -> StoreResult<Option<Category>> {
        let Some(id) = self.category_slugs.get(slug).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        Ok(self.categories.get(&id).map(|c| c.value().clone()))
    }

    async fn children(&self, parent: &CategoryId) -> StoreResult<Vec<Category>> {
        let mut children: Vec<Category> = self
            .categories
            .iter()
            .filter(|e| e.value().parent.as_ref() == Some(parent))
            .map(|e| e.value().clone())
            .collect();
        children.sort_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(children)
    }

    async fn list(&self, filter: &CategoryFilter) -> StoreResult<Vec<Category>> {
        let mut found: Vec<Category> = self
            .categories
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        found.sort_by_key(category_sort_key);
        Ok(paginate(found, filter.skip, filter.limit))
    }

    async fn insert(&self, category: &Category) -> StoreResult<()> {
        match self.categories.entry(category.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!("category id '{}'", category.id))),
            Entry::Vacant(slot) => {
                claim(&self.category_slugs, &category.slug, &category.id, "category slug")?;
                slot.insert(category.clone());
                Ok(())
            }
        }
    }

    async fn replace(&self, category: &Category) -> StoreResult<bool> {
        let Some(mut current) = self.categories.get_mut(&category.id) else {
            return Ok(false);
        };
        if current.slug != category.slug {
            claim(&self.category_slugs, &category.slug, &category.id, "category slug")?;
            self.category_slugs.remove(&current.slug);
        }
        *current = category.clone();
        Ok(true)
    }

    async fn set_hierarchy(
        &self,
        id: &CategoryId,
        ancestors: &[CategoryId],
        level: u8,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let Some(mut category) = self.categories.get_mut(id) else {
            return Ok(false);
        };
        category.ancestors = ancestors.to_vec();
        category.level = level;
        category.updated_at = at;
        Ok(true)
    }

    async fn set_product_count(
        &self,
        id: &CategoryId,
        count: u64,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let Some(mut category) = self.categories.get_mut(id) else {
            return Ok(false);
        };
        category.stats.product_count = count;
        category.stats.last_updated = at;
        Ok(true)
    }

    async fn delete(&self, id: &CategoryId) -> StoreResult<bool> {
        match self.categories.remove(id) {
            Some((_, removed)) => {
                self.category_slugs.remove(&removed.slug);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn get(&self, id: &ProductId) -> StoreResult<Option<Product>> {
        Ok(self.products.get(id).map(|p| p.value().clone()))
    }

    async fn find_by_slug(&self, slug: &str) -> StoreResult<Option<Product>> {
        let Some(id) = self.product_slugs.get(slug).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        Ok(self.products.get(&id).map(|p| p.value().clone()))
    }

    async fn find_by_sku(&self, sku: &str) -> StoreResult<Option<Product>> {
        let Some(id) = self.product_skus.get(sku).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        Ok(self.products.get(&id).map(|p| p.value().clone()))
    }

    async fn list(&self, filter: &ProductFilter) -> StoreResult<Vec<Product>> {
        let mut found: Vec<Product> = self
            .products
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        found.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(paginate(found, filter.skip, filter.limit))
    }

    async fn count_published(
        &self,
        category: &CategoryId,
        excluding: Option<&ProductId>,
    ) -> StoreResult<u64> {
        let count = self
            .products
            .iter()
            .filter(|e| {
                let p = e.value();
                p.is_published()
                    && p.category.as_ref() == Some(category)
                    && excluding.map_or(true, |x| &p.id != x)
            })
            .count();
        Ok(count as u64)
    }

    async fn insert(&self, product: &Product) -> StoreResult<()> {
        match self.products.entry(product.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!("product id '{}'", product.id))),
            Entry::Vacant(slot) => {
                claim(&self.product_slugs, &product.slug, &product.id, "product slug")?;
                if let Err(e) = claim(&self.product_skus, &product.sku, &product.id, "product sku") {
                    self.product_slugs.remove(&product.slug);
                    return Err(e);
                }
                slot.insert(product.clone());
                Ok(())
            }
        }
    }

    async fn replace(&self, product: &Product) -> StoreResult<bool> {
        let Some(mut current) = self.products.get_mut(&product.id) else {
            return Ok(false);
        };
        if current.slug != product.slug {
            claim(&self.product_slugs, &product.slug, &product.id, "product slug")?;
        }
        if current.sku != product.sku {
            if let Err(e) = claim(&self.product_skus, &product.sku, &product.id, "product sku") {
                if current.slug != product.slug {
                    self.product_slugs.remove(&product.slug);
                }
                return Err(e);
            }
            self.product_skus.remove(&current.sku);
        }
        if current.slug != product.slug {
            self.product_slugs.remove(&current.slug);
        }
        *current = product.clone();
        Ok(true)
    }

    async fn delete(&self, id: &ProductId) -> StoreResult<bool> {
        match self.products.remove(id) {
            Some((_, removed)) => {
                self.product_slugs.remove(&removed.slug);
                self.product_skus.remove(&removed.sku);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn detach_category(&self, category: &CategoryId) -> StoreResult<u64> {
        let now = Utc::now();
        let mut touched = 0;
        for mut entry in self.products.iter_mut() {
            let product = entry.value_mut();
            let owned = product.category.as_ref() == Some(category);
            let listed = product.subcategories.contains(category);
            if !owned && !listed {
                continue;
            }
            if owned {
                product.category = None;
            }
            product.subcategories.retain(|c| c != category);
            product.updated_at = now;
            touched += 1;
        }
        Ok(touched)
    }
}
