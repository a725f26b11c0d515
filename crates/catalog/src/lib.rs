//! Catalog domain module.
//!
//! Products, their variants, and the print providers that produce them. The
//! fulfillment core only reads these records; catalog management lives
//! elsewhere.

pub mod product;
pub mod provider;

pub use product::{Product, ProductStatus, ProductVariant};
pub use provider::PrintProvider;
