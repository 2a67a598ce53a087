use thiserror::Error;

use crate::identity::{CategoryId, ProductId};

/// Failures raised by a document store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique key (id, slug or SKU) is already taken.
    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Caller-facing error taxonomy for catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("slug '{0}' already exists")]
    DuplicateSlug(String),

    #[error("SKU '{0}' already exists")]
    DuplicateSku(String),

    #[error("id '{0}' is already in use")]
    DuplicateId(String),

    #[error("category {0} cannot be its own parent")]
    SelfParent(CategoryId),

    #[error("category {category} cannot move under its own descendant {parent}")]
    CyclicParent {
        category: CategoryId,
        parent: CategoryId,
    },

    #[error("parent category {0} not found")]
    ParentNotFound(CategoryId),

    #[error("maximum category depth exceeded: {0}")]
    MaxDepthExceeded(String),

    #[error("category {0} not found")]
    CategoryNotFound(CategoryId),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("invalid price: {0}")]
    InvalidPrice(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

impl CatalogError {
    /// True for errors caused by the request itself (4xx-class); false for
    /// unexpected store failures.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, CatalogError::Store(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CatalogError::CategoryNotFound(_)
                | CatalogError::ParentNotFound(_)
                | CatalogError::ProductNotFound(_)
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            CatalogError::DuplicateSlug(_)
                | CatalogError::DuplicateSku(_)
                | CatalogError::DuplicateId(_)
        )
    }
}
