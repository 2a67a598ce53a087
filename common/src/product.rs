use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};
use crate::identity::{CategoryId, ProductId};

pub const PRODUCT_NAME_MAX: usize = 200;
pub const PRODUCT_DESCRIPTION_MAX: usize = 2000;
pub const DEFAULT_LOW_STOCK_THRESHOLD: u32 = 10;

/// Product lifecycle: draft → pending_review → published → archived/suspended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Draft,
    PendingReview,
    Published,
    Archived,
    Suspended,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductVisibility {
    #[default]
    Public,
    Private,
    PartnersOnly,
    WholesaleOnly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    #[default]
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    pub fn derive(quantity: u32, low_stock_threshold: u32) -> Self {
        if quantity == 0 {
            StockStatus::OutOfStock
        } else if quantity <= low_stock_threshold {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Xaf,
    Eur,
    Usd,
    Gbp,
}

/// Volume price tier: `price` applies from `min_quantity` up to `max_quantity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkPrice {
    pub min_quantity: u32,
    #[serde(default)]
    pub max_quantity: Option<u32>,
    pub price: u64,
    #[serde(default)]
    pub discount_percent: Option<u8>,
}

fn default_moq() -> u32 {
    1
}

fn default_unit() -> String {
    "kg".to_string()
}

/// Prices are in the smallest unit of `currency`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub base_price: u64,
    #[serde(default)]
    pub sale_price: Option<u64>,
    #[serde(default)]
    pub currency: Currency,
    #[serde(default)]
    pub bulk_pricing: Vec<BulkPrice>,
    /// Minimum order quantity.
    #[serde(default = "default_moq")]
    pub moq: u32,
    #[serde(default = "default_unit")]
    pub unit: String,
}

impl Pricing {
    pub fn fixed(base_price: u64) -> Self {
        Self {
            base_price,
            sale_price: None,
            currency: Currency::default(),
            bulk_pricing: Vec::new(),
            moq: default_moq(),
            unit: default_unit(),
        }
    }

    pub fn validate(&self) -> CatalogResult<()> {
        if let Some(sale) = self.sale_price {
            if sale >= self.base_price {
                return Err(CatalogError::InvalidPrice(
                    "sale price must be less than base price".into(),
                ));
            }
        }
        for tier in &self.bulk_pricing {
            if tier.min_quantity == 0 {
                return Err(CatalogError::InvalidPrice(
                    "bulk pricing min quantity must be at least 1".into(),
                ));
            }
            if tier.max_quantity.is_some_and(|max| tier.min_quantity > max) {
                return Err(CatalogError::InvalidPrice(
                    "bulk pricing min quantity cannot be greater than max quantity".into(),
                ));
            }
            if tier.discount_percent.is_some_and(|d| d > 100) {
                return Err(CatalogError::InvalidPrice(
                    "bulk pricing discount cannot exceed 100%".into(),
                ));
            }
        }
        if self.moq == 0 {
            return Err(CatalogError::Validation(
                "minimum order quantity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub stock_quantity: u32,
    /// Derived from quantity and threshold on every save.
    pub stock_status: StockStatus,
    pub low_stock_threshold: u32,
}

impl Inventory {
    pub fn new(stock_quantity: u32, low_stock_threshold: u32) -> Self {
        Self {
            stock_quantity,
            stock_status: StockStatus::derive(stock_quantity, low_stock_threshold),
            low_stock_threshold,
        }
    }

    pub fn refresh_stock_status(&mut self) {
        self.stock_status = StockStatus::derive(self.stock_quantity, self.low_stock_threshold);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    pub sku: String,
    pub description: String,
    /// Owning category. Cleared (not deleted) when the category is removed.
    pub category: Option<CategoryId>,
    #[serde(default)]
    pub subcategories: Vec<CategoryId>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub pricing: Pricing,
    pub inventory: Inventory,
    #[serde(default)]
    pub status: ProductStatus,
    #[serde(default)]
    pub visibility: ProductVisibility,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Derived fields refreshed before every write: stock status, and the
    /// first-publish timestamp.
    pub fn apply_lifecycle(&mut self, now: DateTime<Utc>) {
        self.inventory.refresh_stock_status();
        if self.status == ProductStatus::Published && self.published_at.is_none() {
            self.published_at = Some(now);
        }
        self.updated_at = now;
    }

    /// Counts toward its category's `product_count`.
    pub fn is_published(&self) -> bool {
        self.status == ProductStatus::Published
    }
}

/// Payload for creating a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductInput {
    #[serde(default)]
    pub id: Option<ProductId>,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    pub description: String,
    pub category: CategoryId,
    #[serde(default)]
    pub subcategories: Vec<CategoryId>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub pricing: Pricing,
    #[serde(default)]
    pub stock_quantity: u32,
    #[serde(default)]
    pub low_stock_threshold: Option<u32>,
    #[serde(default)]
    pub status: ProductStatus,
    #[serde(default)]
    pub visibility: ProductVisibility,
}

impl ProductInput {
    pub fn new(name: &str, category: &CategoryId, base_price: u64) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            slug: None,
            sku: None,
            description: format!("{name} for export"),
            category: category.clone(),
            subcategories: Vec::new(),
            tags: Vec::new(),
            pricing: Pricing::fixed(base_price),
            stock_quantity: 100,
            low_stock_threshold: None,
            status: ProductStatus::Draft,
            visibility: ProductVisibility::Public,
        }
    }

    pub fn published(mut self) -> Self {
        self.status = ProductStatus::Published;
        self
    }
}

/// Partial update for a product. `pricing` replaces the whole pricing block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategories: Option<Vec<CategoryId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_stock_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProductStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<ProductVisibility>,
}

impl ProductPatch {
    pub fn status(status: ProductStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn move_to(category: &CategoryId) -> Self {
        Self {
            category: Some(category.clone()),
            ..Self::default()
        }
    }
}
