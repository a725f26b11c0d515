//! `printforge-core` — shared domain building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::DomainError;
pub use id::{
    FulfillmentJobId, OrderId, OrderItemId, PrintProviderId, ProductId, StoreId, VariantId,
};
