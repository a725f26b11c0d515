//! Shopify adapter.
//!
//! Product and order calls are simulated locally; webhook verification and
//! parsing follow Shopify's real formats.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use printforge_catalog::{Product, ProductVariant};

use crate::adapter::{
    ExternalId, FulfillmentReceipt, MarketplaceAdapter, NormalizedItem, NormalizedOrder,
    OrderFilter, ProductUpdate, RemoteStatusUpdate, ShippingAddress, WebhookRegistration,
    cents_to_price, mock_id, price_to_cents,
};
use crate::error::IntegrationError;
use crate::platform::{AdapterConfig, Platform};
use crate::signature;

pub const API_VERSION: &str = "2024-01";

/// Header carrying the webhook body signature.
pub const SIGNATURE_HEADER: &str = "X-Shopify-Hmac-Sha256";

#[derive(Debug, Deserialize)]
struct OrderPayload {
    id: ExternalId,
    order_number: Option<u64>,
    email: Option<String>,
    shipping_address: Option<AddressPayload>,
    #[serde(default)]
    line_items: Vec<LineItemPayload>,
}

#[derive(Debug, Deserialize)]
struct AddressPayload {
    first_name: Option<String>,
    last_name: Option<String>,
    address1: Option<String>,
    address2: Option<String>,
    city: Option<String>,
    province: Option<String>,
    zip: Option<String>,
    country_code: Option<String>,
    country: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LineItemPayload {
    id: Option<ExternalId>,
    title: Option<String>,
    variant_title: Option<String>,
    sku: Option<String>,
    quantity: u32,
    price: String,
}

#[derive(Debug, Serialize)]
struct ListingPayload<'a> {
    title: &'a str,
    vendor: &'static str,
    product_type: &'a str,
    variants: Vec<ListingVariant<'a>>,
}

#[derive(Debug, Serialize)]
struct ListingVariant<'a> {
    title: String,
    price: String,
    sku: &'a str,
    inventory_quantity: u32,
}

pub struct ShopifyAdapter {
    config: AdapterConfig,
}

impl ShopifyAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        Self { config }
    }

    fn listing<'a>(product: &'a Product, variants: &'a [ProductVariant]) -> ListingPayload<'a> {
        ListingPayload {
            title: &product.name,
            vendor: "PrintForge",
            product_type: &product.product_type,
            variants: variants
                .iter()
                .map(|v| ListingVariant {
                    title: v.title(),
                    price: cents_to_price(v.unit_price(product)),
                    sku: &v.sku,
                    inventory_quantity: if v.in_stock { 100 } else { 0 },
                })
                .collect(),
        }
    }

    fn sample_order() -> serde_json::Value {
        serde_json::json!({
            "id": chrono::Utc::now().timestamp_millis(),
            "order_number": 1001,
            "email": "customer@example.com",
            "financial_status": "paid",
            "line_items": [{
                "id": 1,
                "title": "Classic T-Shirt",
                "variant_title": "M / Black",
                "sku": "TEE-M-BLK",
                "quantity": 1,
                "price": "24.99"
            }],
            "shipping_address": {
                "first_name": "John",
                "last_name": "Doe",
                "address1": "123 Main St",
                "city": "New York",
                "province": "NY",
                "zip": "10001",
                "country_code": "US",
                "phone": "555-1234"
            }
        })
    }
}

#[async_trait]
impl MarketplaceAdapter for ShopifyAdapter {
    fn platform(&self) -> Platform {
        Platform::Shopify
    }

    async fn sync_product(
        &self,
        product: &Product,
        variants: &[ProductVariant],
    ) -> Result<String, IntegrationError> {
        let listing = Self::listing(product, variants);
        let body = serde_json::to_string(&listing)
            .map_err(|e| IntegrationError::InvalidPayload(e.to_string()))?;
        debug!(shop = %self.config.store_url, api_version = API_VERSION, %body, "Shopify product payload");

        let external_id = mock_id("shopify");
        info!(product = %product.name, external_id = %external_id, "Product synced to Shopify");
        Ok(external_id)
    }

    async fn update_product(
        &self,
        external_product_id: &str,
        update: &ProductUpdate,
    ) -> Result<(), IntegrationError> {
        info!(external_id = external_product_id, ?update, "Updating Shopify product");
        Ok(())
    }

    async fn delete_product(&self, external_product_id: &str) -> Result<(), IntegrationError> {
        info!(external_id = external_product_id, "Deleting Shopify product");
        Ok(())
    }

    async fn fetch_orders(&self, filter: &OrderFilter) -> Result<Vec<NormalizedOrder>, IntegrationError> {
        debug!(?filter, "Fetching Shopify orders");
        Ok(vec![self.parse_webhook(&Self::sample_order())?])
    }

    async fn update_order_status(
        &self,
        external_order_id: &str,
        update: &RemoteStatusUpdate,
    ) -> Result<FulfillmentReceipt, IntegrationError> {
        info!(external_order_id, status = %update.status, "Creating Shopify fulfillment");
        Ok(FulfillmentReceipt {
            fulfillment_id: Some(mock_id("fulfillment")),
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
        info!(topic, callback_url, "Registering Shopify webhook");
        Ok(WebhookRegistration {
            id: mock_id("webhook"),
            topic: topic.to_string(),
            address: callback_url.to_string(),
        })
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        let Some(secret) = self.config.webhook_secret.as_deref() else {
            warn!("Shopify webhook received but no webhook secret is configured");
            return false;
        };
        signature::verify(secret.as_bytes(), payload, signature)
    }

    fn parse_webhook(&self, payload: &serde_json::Value) -> Result<NormalizedOrder, IntegrationError> {
        let order = OrderPayload::deserialize(payload)
            .map_err(|e| IntegrationError::InvalidPayload(e.to_string()))?;

        let shipping_address = order
            .shipping_address
            .map(|a| ShippingAddress {
                first_name: a.first_name,
                last_name: a.last_name,
                address1: a.address1,
                address2: a.address2,
                city: a.city,
                state: a.province,
                zip: a.zip,
                country: a.country_code.or(a.country),
                phone: a.phone,
            })
            .unwrap_or_default();

        let items = order
            .line_items
            .into_iter()
            .map(|item| {
                Ok(NormalizedItem {
                    external_item_id: item.id.map(|id| id.to_string()),
                    product_name: item.title,
                    variant_name: item.variant_title,
                    sku: item.sku,
                    quantity: item.quantity,
                    unit_price: price_to_cents(&item.price)?,
                })
            })
            .collect::<Result<Vec<_>, IntegrationError>>()?;

        Ok(NormalizedOrder {
            platform: Platform::Shopify,
            external_order_id: order.id.to_string(),
            order_number: order.order_number,
            customer_email: order.email,
            customer_name: shipping_address.full_name(),
            shipping_address,
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> ShopifyAdapter {
        ShopifyAdapter::new(AdapterConfig::new("demo.myshopify.com").with_webhook_secret("hush"))
    }

    #[test]
    fn parses_order_webhook() {
        let payload = serde_json::json!({
            "id": 820982911946154508u64,
            "order_number": 1234,
            "email": "jon@example.com",
            "shipping_address": {
                "first_name": "Jon",
                "last_name": "Snow",
                "address1": "1 Wall St",
                "city": "Winterfell",
                "province": "North",
                "zip": "00001",
                "country_code": "GB"
            },
            "line_items": [
                {"id": 466157049, "title": "Mug", "variant_title": "11oz / White", "sku": "MUG-11-WHT", "quantity": 2, "price": "12.50"},
                {"id": "gid-2", "title": "Tee", "quantity": 1, "price": "24.99"}
            ]
        });

        let order = adapter().parse_webhook(&payload).unwrap();
        assert_eq!(order.external_order_id, "820982911946154508");
        assert_eq!(order.order_number, Some(1234));
        assert_eq!(order.customer_name.as_deref(), Some("Jon Snow"));
        assert_eq!(order.shipping_address.state.as_deref(), Some("North"));
        assert_eq!(order.shipping_address.country.as_deref(), Some("GB"));
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].unit_price, 1250);
        assert_eq!(order.items[0].external_item_id.as_deref(), Some("466157049"));
        assert_eq!(order.items[1].external_item_id.as_deref(), Some("gid-2"));
        assert_eq!(order.total(), 2 * 1250 + 2499);
    }

    #[test]
    fn rejects_payload_without_id() {
        let err = adapter()
            .parse_webhook(&serde_json::json!({"line_items": []}))
            .unwrap_err();
        assert!(matches!(err, IntegrationError::InvalidPayload(_)));
    }

    #[test]
    fn rejects_unparseable_price() {
        let payload = serde_json::json!({
            "id": 1,
            "line_items": [{"quantity": 1, "price": "n/a"}]
        });
        assert!(adapter().parse_webhook(&payload).is_err());
    }

    #[test]
    fn verifies_signed_bodies() {
        let body = br#"{"id":1}"#;
        let header = signature::sign(b"hush", body);
        assert!(adapter().verify_webhook_signature(body, &header));
        assert!(!adapter().verify_webhook_signature(br#"{"id":2}"#, &header));

        let unsigned = ShopifyAdapter::new(AdapterConfig::new("demo.myshopify.com"));
        assert!(!unsigned.verify_webhook_signature(body, &header));
    }

    #[test]
    fn listing_prices_variants() {
        let product = Product::new("Tee", "t-shirt", 2000);
        let variants = vec![
            ProductVariant::new(product.id, "TEE-S", "S", "Black"),
            ProductVariant::new(product.id, "TEE-XL", "XL", "Black").with_price_modifier(250),
        ];
        let listing = ShopifyAdapter::listing(&product, &variants);
        assert_eq!(listing.variants[0].price, "20.00");
        assert_eq!(listing.variants[1].price, "22.50");
        assert_eq!(listing.variants[1].title, "XL / Black");
    }

    #[tokio::test]
    async fn simulated_calls_succeed() {
        let shopify = adapter();
        let product = Product::new("Tee", "t-shirt", 2000);
        let id = shopify.sync_product(&product, &[]).await.unwrap();
        assert!(id.starts_with("shopify_"));

        let orders = shopify.fetch_orders(&OrderFilter::default()).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].items[0].sku.as_deref(), Some("TEE-M-BLK"));

        let receipt = shopify
            .update_order_status("1001", &RemoteStatusUpdate::new("shipped").with_tracking("1Z999", "https://track.example/1Z999"))
            .await
            .unwrap();
        assert!(receipt.fulfillment_id.is_some());
        assert_eq!(receipt.tracking_number.as_deref(), Some("1Z999"));
    }
}
