pub mod aggregate;
pub mod catalog;
pub mod category;
pub mod error;
pub mod hierarchy;
pub mod identity;
pub mod memory_store;
pub mod product;
mod serde_helpers;
pub mod slug;
pub mod store;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use aggregate::{AggregateSynchronizer, ReconcileReport};
pub use catalog::{Catalog, CategoryDeletion};
pub use category::{Category, CategoryInput, CategoryPatch, CategoryTreeNode};
pub use error::{CatalogError, CatalogResult, StoreError, StoreResult};
pub use hierarchy::HierarchyMaintainer;
pub use identity::{CategoryId, ProductId};
pub use memory_store::MemoryStore;
pub use product::{Product, ProductInput, ProductPatch};
pub use store::{CategoryFilter, CategoryStore, ParentFilter, ProductFilter, ProductStore};
