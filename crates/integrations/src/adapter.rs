//! Marketplace adapter abstraction and the normalized shapes it speaks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use printforge_catalog::{Product, ProductVariant};

use crate::error::IntegrationError;
use crate::platform::Platform;

/// Shipping destination as reported by a marketplace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
}

impl ShippingAddress {
    /// "First Last", or whichever half is present.
    pub fn full_name(&self) -> Option<String> {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(name), None) | (None, Some(name)) => Some(name.to_string()),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub external_item_id: Option<String>,
    pub product_name: Option<String>,
    pub variant_name: Option<String>,
    pub sku: Option<String>,
    pub quantity: u32,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
}

/// Platform-independent view of an incoming order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedOrder {
    pub platform: Platform,
    pub external_order_id: String,
    pub order_number: Option<u64>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub shipping_address: ShippingAddress,
    pub items: Vec<NormalizedItem>,
}

impl NormalizedOrder {
    pub fn total(&self) -> u64 {
        self.items
            .iter()
            .map(|i| i.unit_price.saturating_mul(u64::from(i.quantity)))
            .sum()
    }
}

/// Partial product update pushed to a marketplace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProductUpdate {
    pub title: Option<String>,
    pub price: Option<u64>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub since: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

/// Status pushed back to the marketplace once an order moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStatusUpdate {
    pub status: String,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
}

impl RemoteStatusUpdate {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            tracking_number: None,
            tracking_url: None,
        }
    }

    pub fn with_tracking(mut self, number: impl Into<String>, url: impl Into<String>) -> Self {
        self.tracking_number = Some(number.into());
        self.tracking_url = Some(url.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillmentReceipt {
    /// Marketplace-side fulfillment record, where the platform has one.
    pub fulfillment_id: Option<String>,
    pub status: String,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRegistration {
    pub id: String,
    pub topic: String,
    pub address: String,
}

/// One implementation per marketplace platform.
#[async_trait]
pub trait MarketplaceAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Publish a product; returns the marketplace's product id.
    async fn sync_product(
        &self,
        product: &Product,
        variants: &[ProductVariant],
    ) -> Result<String, IntegrationError>;

    async fn update_product(
        &self,
        external_product_id: &str,
        update: &ProductUpdate,
    ) -> Result<(), IntegrationError>;

    async fn delete_product(&self, external_product_id: &str) -> Result<(), IntegrationError>;

    async fn fetch_orders(&self, filter: &OrderFilter) -> Result<Vec<NormalizedOrder>, IntegrationError>;

    async fn update_order_status(
        &self,
        external_order_id: &str,
        update: &RemoteStatusUpdate,
    ) -> Result<FulfillmentReceipt, IntegrationError>;

    async fn register_webhook(
        &self,
        topic: &str,
        callback_url: &str,
    ) -> Result<WebhookRegistration, IntegrationError>;

    /// Check the signature header against the raw request body.
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool;

    /// Normalize an order webhook body.
    fn parse_webhook(&self, payload: &serde_json::Value) -> Result<NormalizedOrder, IntegrationError>;
}

/// Marketplace ids arrive as numbers or strings depending on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum ExternalId {
    Number(u64),
    Text(String),
}

impl std::fmt::Display for ExternalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExternalId::Number(n) => write!(f, "{n}"),
            ExternalId::Text(s) => f.write_str(s),
        }
    }
}

/// Decimal price string ("24.99") to cents. Digits past the second decimal
/// round half up.
pub(crate) fn price_to_cents(price: &str) -> Result<u64, IntegrationError> {
    let invalid = || IntegrationError::InvalidPayload(format!("invalid price: {price:?}"));

    let trimmed = price.trim();
    let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
        return Err(invalid());
    }

    let units: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let mut digits = fraction.bytes().map(|b| u64::from(b - b'0'));
    let tenths = digits.next().unwrap_or(0);
    let hundredths = digits.next().unwrap_or(0);
    let round_up = digits.next().is_some_and(|d| d >= 5);

    units
        .checked_mul(100)
        .and_then(|cents| cents.checked_add(tenths * 10 + hundredths + u64::from(round_up)))
        .ok_or_else(invalid)
}

/// Cents to a marketplace decimal string.
pub(crate) fn cents_to_price(cents: u64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

pub(crate) fn mock_id(prefix: &str) -> String {
    let simple = uuid::Uuid::now_v7().simple().to_string();
    format!("{prefix}_{}", &simple[simple.len() - 16..])
}
