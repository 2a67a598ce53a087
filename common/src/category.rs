use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::CategoryId;
use crate::serde_helpers::double_option;

/// Deepest level a category may occupy (root = 0).
pub const MAX_CATEGORY_LEVEL: u8 = 4;
/// A parent at this level or above cannot accept children.
pub const MAX_PARENT_LEVEL: u8 = MAX_CATEGORY_LEVEL - 1;

pub const CATEGORY_NAME_MAX: usize = 100;
pub const CATEGORY_DESCRIPTION_MAX: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryStatus {
    #[default]
    Active,
    Inactive,
    Archived,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryVisibility {
    #[default]
    Public,
    Private,
    PartnersOnly,
}

/// Denormalized aggregates cached on a category.
///
/// Only the aggregate synchronizer writes these; user input never does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    /// Number of published products whose `category` is this category.
    pub product_count: u64,
    pub last_updated: DateTime<Utc>,
}

/// A node in the product taxonomy tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    pub parent: Option<CategoryId>,
    /// Ids from the root down to the immediate parent.
    #[serde(default)]
    pub ancestors: Vec<CategoryId>,
    /// Depth in the tree; always `ancestors.len()`.
    #[serde(default)]
    pub level: u8,
    #[serde(default)]
    pub display_order: i32,
    #[serde(default)]
    pub status: CategoryStatus,
    #[serde(default)]
    pub visibility: CategoryVisibility,
    pub stats: CategoryStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    /// A fresh root category with an empty product count.
    pub fn new(id: CategoryId, name: String, slug: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            slug,
            description: None,
            parent: None,
            ancestors: Vec::new(),
            level: 0,
            display_order: 0,
            status: CategoryStatus::default(),
            visibility: CategoryVisibility::default(),
            stats: CategoryStats {
                product_count: 0,
                last_updated: now,
            },
            created_at: now,
            updated_at: now,
        }
    }

    /// Hang this category under `parent`, inheriting its ancestor chain.
    pub fn place_under(&mut self, parent: &Category) {
        let mut ancestors = Vec::with_capacity(parent.ancestors.len() + 1);
        ancestors.extend(parent.ancestors.iter().cloned());
        ancestors.push(parent.id.clone());
        self.parent = Some(parent.id.clone());
        self.level = parent.level + 1;
        self.ancestors = ancestors;
    }

    pub fn place_at_root(&mut self) {
        self.parent = None;
        self.ancestors.clear();
        self.level = 0;
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Whether `id` appears anywhere above this category.
    pub fn descends_from(&self, id: &CategoryId) -> bool {
        self.ancestors.contains(id)
    }

    pub fn has_products(&self) -> bool {
        self.stats.product_count > 0
    }
}

/// Payload for creating a category.
///
/// Hierarchy fields and cached statistics are not accepted here; unknown
/// fields such as `ancestors` or `stats` are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryInput {
    /// Caller-assigned id, mostly for imports. Generated when absent.
    #[serde(default)]
    pub id: Option<CategoryId>,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent: Option<CategoryId>,
    #[serde(default)]
    pub display_order: Option<i32>,
    #[serde(default)]
    pub status: Option<CategoryStatus>,
    #[serde(default)]
    pub visibility: Option<CategoryVisibility>,
}

impl CategoryInput {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent: &CategoryId) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(CategoryId::from(id));
        self
    }
}

/// Partial update for a category. `parent: null` moves the category to the root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent: Option<Option<CategoryId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_order: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CategoryStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<CategoryVisibility>,
}

impl CategoryPatch {
    pub fn move_to(parent: Option<&CategoryId>) -> Self {
        Self {
            parent: Some(parent.cloned()),
            ..Self::default()
        }
    }

    pub fn rename(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }
}

/// Nested view of the taxonomy for menus and admin screens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTreeNode {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub level: u8,
    pub product_count: u64,
    pub children: Vec<CategoryTreeNode>,
}

/// Catalog-wide figures derived from the cached product counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub total_categories: u64,
    pub total_products: u64,
    pub categories_with_products: u64,
    pub main_categories: u64,
    pub subcategories: u64,
    pub average_products_per_category: f64,
}

impl CategoryTotals {
    /// Fold over active categories; others are skipped.
    pub fn from_categories<'a>(categories: impl IntoIterator<Item = &'a Category>) -> Self {
        let mut totals = Self::default();
        for category in categories {
            if category.status != CategoryStatus::Active {
                continue;
            }
            totals.total_categories += 1;
            totals.total_products += category.stats.product_count;
            if category.has_products() {
                totals.categories_with_products += 1;
            }
            if category.level == 0 {
                totals.main_categories += 1;
            } else {
                totals.subcategories += 1;
            }
        }
        if totals.total_categories > 0 {
            totals.average_products_per_category =
                totals.total_products as f64 / totals.total_categories as f64;
        }
        totals
    }
}
