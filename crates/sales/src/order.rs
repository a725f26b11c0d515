use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use printforge_core::{
    Entity, OrderId, OrderItemId, PrintProviderId, ProductId, StoreId, VariantId,
};

/// Order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Failed,
}

/// Fulfillment status of a single order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemFulfillmentStatus {
    Pending,
    Created,
    Queued,
    Processing,
    Shipped,
    Fulfilled,
    Failed,
    Cancelled,
}

impl ItemFulfillmentStatus {
    /// Whether a provider has taken the item on (or already shipped it).
    pub fn is_in_fulfillment(&self) -> bool {
        matches!(
            self,
            ItemFulfillmentStatus::Processing
                | ItemFulfillmentStatus::Shipped
                | ItemFulfillmentStatus::Fulfilled
        )
    }
}

/// Customer order placed against a merchant store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub store_id: Option<StoreId>,
    /// Reference in the originating marketplace (e.g. Shopify order id).
    pub external_order_id: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            store_id: None,
            external_order_id: None,
            status: OrderStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn for_store(mut self, store_id: StoreId, external_order_id: impl Into<String>) -> Self {
        self.store_id = Some(store_id);
        self.external_order_id = Some(external_order_id.into());
        self
    }

    /// Whether the order should move to `Processing` given its items.
    ///
    /// All-or-nothing: every item must be in fulfillment, and only a
    /// `Created` order is eligible. An order without items never advances.
    pub fn ready_for_processing(&self, items: &[OrderItem]) -> bool {
        self.status == OrderStatus::Created
            && items.iter().all(|item| item.order_id == self.id)
            && all_items_in_fulfillment(items)
    }
}

impl Default for Order {
    fn default() -> Self {
        Self::new()
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// `true` iff the slice is non-empty and every item is in fulfillment.
pub fn all_items_in_fulfillment(items: &[OrderItem]) -> bool {
    !items.is_empty() && items.iter().all(|i| i.fulfillment_status.is_in_fulfillment())
}

/// Order line: one product variant, printed by one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_variant_id: VariantId,
    pub quantity: u32,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
    pub fulfillment_status: ItemFulfillmentStatus,
    pub print_provider_id: Option<PrintProviderId>,
    pub updated_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn new(
        order_id: OrderId,
        product_id: ProductId,
        product_variant_id: VariantId,
        quantity: u32,
        unit_price: u64,
    ) -> Self {
        Self {
            id: OrderItemId::new(),
            order_id,
            product_id,
            product_variant_id,
            quantity,
            unit_price,
            fulfillment_status: ItemFulfillmentStatus::Pending,
            print_provider_id: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: ItemFulfillmentStatus) -> Self {
        self.fulfillment_status = status;
        self
    }

    pub fn total_price(&self) -> u64 {
        self.unit_price.saturating_mul(u64::from(self.quantity))
    }
}

impl Entity for OrderItem {
    type Id = OrderItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
