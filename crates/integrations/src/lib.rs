//! Marketplace integrations (Shopify, WooCommerce).
//!
//! Each platform implements [`MarketplaceAdapter`]; [`create_adapter`] picks
//! one by [`Platform`]. Platforms without an adapter yield
//! [`IntegrationError::Unsupported`].

pub mod adapter;
pub mod error;
pub mod platform;
pub mod shopify;
pub mod signature;
pub mod woocommerce;

pub use adapter::{
    FulfillmentReceipt, MarketplaceAdapter, NormalizedItem, NormalizedOrder, OrderFilter,
    ProductUpdate, RemoteStatusUpdate, ShippingAddress, WebhookRegistration,
};
pub use error::IntegrationError;
pub use platform::{AdapterConfig, Platform, create_adapter};
pub use shopify::ShopifyAdapter;
pub use woocommerce::WooCommerceAdapter;
