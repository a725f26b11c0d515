//! Orders domain module.
//!
//! This crate contains business rules for customer orders and their line
//! items, implemented purely as deterministic domain logic (no IO, no HTTP,
//! no storage).

pub mod order;

pub use order::{
    ItemFulfillmentStatus, Order, OrderItem, OrderStatus, all_items_in_fulfillment,
};
