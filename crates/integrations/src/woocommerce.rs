//! WooCommerce adapter. Store calls are simulated locally.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use printforge_catalog::{Product, ProductVariant};

use crate::adapter::{
    ExternalId, FulfillmentReceipt, MarketplaceAdapter, NormalizedItem, NormalizedOrder,
    OrderFilter, ProductUpdate, RemoteStatusUpdate, ShippingAddress, WebhookRegistration,
    mock_id, price_to_cents,
};
use crate::error::IntegrationError;
use crate::platform::{AdapterConfig, Platform};
use crate::signature;

pub const SIGNATURE_HEADER: &str = "X-WC-Webhook-Signature";

#[derive(Debug, Deserialize)]
struct OrderPayload {
    id: ExternalId,
    number: Option<String>,
    billing: Option<ContactPayload>,
    shipping: Option<ContactPayload>,
    #[serde(default)]
    line_items: Vec<LineItemPayload>,
}

#[derive(Debug, Default, Deserialize)]
struct ContactPayload {
    first_name: Option<String>,
    last_name: Option<String>,
    address_1: Option<String>,
    address_2: Option<String>,
    city: Option<String>,
    state: Option<String>,
    postcode: Option<String>,
    country: Option<String>,
    email: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LineItemPayload {
    id: Option<ExternalId>,
    name: Option<String>,
    sku: Option<String>,
    quantity: u32,
    price: PricePayload,
}

/// WooCommerce reports line prices either as a number or a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PricePayload {
    Number(f64),
    Text(String),
}

impl PricePayload {
    fn cents(&self) -> Result<u64, IntegrationError> {
        match self {
            PricePayload::Number(n) => price_to_cents(&n.to_string()),
            PricePayload::Text(s) => price_to_cents(s),
        }
    }
}

pub struct WooCommerceAdapter {
    config: AdapterConfig,
}

impl WooCommerceAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MarketplaceAdapter for WooCommerceAdapter {
    fn platform(&self) -> Platform {
        Platform::WooCommerce
    }

    async fn sync_product(
        &self,
        product: &Product,
        variants: &[ProductVariant],
    ) -> Result<String, IntegrationError> {
        let external_id = mock_id("woo");
        info!(
            site = %self.config.store_url,
            product = %product.name,
            variants = variants.len(),
            external_id = %external_id,
            "Product synced to WooCommerce"
        );
        Ok(external_id)
    }

    async fn update_product(
        &self,
        external_product_id: &str,
        update: &ProductUpdate,
    ) -> Result<(), IntegrationError> {
        info!(external_id = external_product_id, ?update, "Updating WooCommerce product");
        Ok(())
    }

    async fn delete_product(&self, external_product_id: &str) -> Result<(), IntegrationError> {
        info!(external_id = external_product_id, "Deleting WooCommerce product");
        Ok(())
    }

    async fn fetch_orders(&self, filter: &OrderFilter) -> Result<Vec<NormalizedOrder>, IntegrationError> {
        // Orders arrive by webhook only.
        debug!(?filter, "Fetching WooCommerce orders");
        Ok(Vec::new())
    }

    async fn update_order_status(
        &self,
        external_order_id: &str,
        update: &RemoteStatusUpdate,
    ) -> Result<FulfillmentReceipt, IntegrationError> {
        info!(external_order_id, status = %update.status, "Updating WooCommerce order");
        Ok(FulfillmentReceipt {
            fulfillment_id: None,
            status: update.status.clone(),
            tracking_number: update.tracking_number.clone(),
            tracking_url: update.tracking_url.clone(),
        })
    }

    async fn register_webhook(
        &self,
        topic: &str,
        callback_url: &str,
    ) -> Result<WebhookRegistration, IntegrationError> {
        info!(topic, callback_url, "Registering WooCommerce webhook");
        Ok(WebhookRegistration {
            id: mock_id("webhook"),
            topic: topic.to_string(),
            address: callback_url.to_string(),
        })
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        let Some(secret) = self.config.webhook_secret.as_deref() else {
            warn!("WooCommerce webhook received but no webhook secret is configured");
            return false;
        };
        signature::verify(secret.as_bytes(), payload, signature)
    }

    fn parse_webhook(&self, payload: &serde_json::Value) -> Result<NormalizedOrder, IntegrationError> {
        let order = OrderPayload::deserialize(payload)
            .map_err(|e| IntegrationError::InvalidPayload(e.to_string()))?;

        let billing = order.billing.unwrap_or_default();
        let shipping = order.shipping.unwrap_or_default();
        let customer_name = ShippingAddress {
            first_name: billing.first_name,
            last_name: billing.last_name,
            ..Default::default()
        }
        .full_name();

        let shipping_address = ShippingAddress {
            first_name: shipping.first_name,
            last_name: shipping.last_name,
            address1: shipping.address_1,
            address2: shipping.address_2,
            city: shipping.city,
            state: shipping.state,
            zip: shipping.postcode,
            country: shipping.country,
            phone: billing.phone,
        };

        let items = order
            .line_items
            .into_iter()
            .map(|item| {
                Ok(NormalizedItem {
                    external_item_id: item.id.map(|id| id.to_string()),
                    product_name: item.name,
                    variant_name: None,
                    sku: item.sku,
                    quantity: item.quantity,
                    unit_price: item.price.cents()?,
                })
            })
            .collect::<Result<Vec<_>, IntegrationError>>()?;

        Ok(NormalizedOrder {
            platform: Platform::WooCommerce,
            external_order_id: order.id.to_string(),
            order_number: order.number.and_then(|n| n.parse().ok()),
            customer_email: billing.email,
            customer_name,
            shipping_address,
            items,
        })
    }
}
