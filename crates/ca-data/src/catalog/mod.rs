//! Catalog Domain
//!
//! The `Products` table and the audited context that exposes it.

pub mod context;
pub mod product;

pub use context::CatalogContext;
pub use product::Product;
