//! Stores owned by other parts of the system that the queue reads or nudges.
//!
//! Orders and order items belong to sales; products, variants and providers
//! to the catalog. The queue only ever performs the narrow writes exposed
//! here.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use printforge_catalog::{PrintProvider, Product, ProductVariant};
use printforge_core::{OrderId, OrderItemId, PrintProviderId, ProductId, VariantId};
use printforge_sales::{ItemFulfillmentStatus, Order, OrderItem, OrderStatus};

#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),
    #[error("order item not found: {0}")]
    OrderItemNotFound(OrderItemId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Fields the queue may set on an order item after dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemStatusUpdate {
    pub fulfillment_status: ItemFulfillmentStatus,
    pub print_provider_id: Option<PrintProviderId>,
}

impl ItemStatusUpdate {
    pub fn dispatched_to(provider_id: PrintProviderId) -> Self {
        Self {
            fulfillment_status: ItemFulfillmentStatus::Processing,
            print_provider_id: Some(provider_id),
        }
    }
}

#[async_trait]
pub trait OrderItemStore: Send + Sync {
    async fn get_item(&self, id: OrderItemId) -> Result<Option<OrderItem>, CollaboratorError>;

    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<OrderItem>, CollaboratorError>;

    async fn update_status(
        &self,
        id: OrderItemId,
        update: ItemStatusUpdate,
    ) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, CollaboratorError>;

    /// Conditional advance: moves the order to `to` only while it is in `from`.
    ///
    /// Returns `Ok(false)` when the order had already left `from`.
    async fn advance_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, CollaboratorError>;
}

/// Read-only catalog lookups used for routing.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_variant(&self, id: VariantId) -> Result<Option<ProductVariant>, CollaboratorError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, CollaboratorError>;

    async fn get_provider(
        &self,
        id: PrintProviderId,
    ) -> Result<Option<PrintProvider>, CollaboratorError>;
}

fn poisoned() -> CollaboratorError {
    CollaboratorError::Storage("lock poisoned".to_string())
}

#[derive(Debug, Default)]
struct Book {
    orders: HashMap<OrderId, Order>,
    items: HashMap<OrderItemId, OrderItem>,
}

/// In-memory orders and order items for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryOrderBook {
    book: RwLock<Book>,
}

impl InMemoryOrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn insert_order(&self, order: Order) -> Result<(), CollaboratorError> {
        let mut book = self.book.write().map_err(|_| poisoned())?;
        book.orders.insert(order.id, order);
        Ok(())
    }

    pub fn insert_item(&self, item: OrderItem) -> Result<(), CollaboratorError> {
        let mut book = self.book.write().map_err(|_| poisoned())?;
        book.items.insert(item.id, item);
        Ok(())
    }

    /// Overwrite an item's status, as an external component would.
    pub fn set_item_status(
        &self,
        id: OrderItemId,
        status: ItemFulfillmentStatus,
    ) -> Result<(), CollaboratorError> {
        let mut book = self.book.write().map_err(|_| poisoned())?;
        let item = book
            .items
            .get_mut(&id)
            .ok_or(CollaboratorError::OrderItemNotFound(id))?;
        item.fulfillment_status = status;
        item.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl OrderItemStore for InMemoryOrderBook {
    async fn get_item(&self, id: OrderItemId) -> Result<Option<OrderItem>, CollaboratorError> {
        let book = self.book.read().map_err(|_| poisoned())?;
        Ok(book.items.get(&id).cloned())
    }

    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<OrderItem>, CollaboratorError> {
        let book = self.book.read().map_err(|_| poisoned())?;
        let mut items: Vec<_> = book
            .items
            .values()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.id);
        Ok(items)
    }

    async fn update_status(
        &self,
        id: OrderItemId,
        update: ItemStatusUpdate,
    ) -> Result<(), CollaboratorError> {
        let mut book = self.book.write().map_err(|_| poisoned())?;
        let item = book
            .items
            .get_mut(&id)
            .ok_or(CollaboratorError::OrderItemNotFound(id))?;
        item.fulfillment_status = update.fulfillment_status;
        if update.print_provider_id.is_some() {
            item.print_provider_id = update.print_provider_id;
        }
        item.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderBook {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, CollaboratorError> {
        let book = self.book.read().map_err(|_| poisoned())?;
        Ok(book.orders.get(&id).cloned())
    }

    async fn advance_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, CollaboratorError> {
        let mut book = self.book.write().map_err(|_| poisoned())?;
        let order = book
            .orders
            .get_mut(&id)
            .ok_or(CollaboratorError::OrderNotFound(id))?;
        if order.status != from {
            return Ok(false);
        }
        order.status = to;
        order.updated_at = Utc::now();
        Ok(true)
    }
}

#[derive(Debug, Default)]
struct Shelves {
    variants: HashMap<VariantId, ProductVariant>,
    products: HashMap<ProductId, Product>,
    providers: HashMap<PrintProviderId, PrintProvider>,
}

/// In-memory catalog for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    shelves: RwLock<Shelves>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn insert_variant(&self, variant: ProductVariant) -> Result<(), CollaboratorError> {
        let mut shelves = self.shelves.write().map_err(|_| poisoned())?;
        shelves.variants.insert(variant.id, variant);
        Ok(())
    }

    pub fn insert_product(&self, product: Product) -> Result<(), CollaboratorError> {
        let mut shelves = self.shelves.write().map_err(|_| poisoned())?;
        shelves.products.insert(product.id, product);
        Ok(())
    }

    pub fn insert_provider(&self, provider: PrintProvider) -> Result<(), CollaboratorError> {
        let mut shelves = self.shelves.write().map_err(|_| poisoned())?;
        shelves.providers.insert(provider.id, provider);
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn get_variant(&self, id: VariantId) -> Result<Option<ProductVariant>, CollaboratorError> {
        let shelves = self.shelves.read().map_err(|_| poisoned())?;
        Ok(shelves.variants.get(&id).cloned())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, CollaboratorError> {
        let shelves = self.shelves.read().map_err(|_| poisoned())?;
        Ok(shelves.products.get(&id).cloned())
    }

    async fn get_provider(
        &self,
        id: PrintProviderId,
    ) -> Result<Option<PrintProvider>, CollaboratorError> {
        let shelves = self.shelves.read().map_err(|_| poisoned())?;
        Ok(shelves.providers.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn advance_is_conditional_on_current_status() {
        let book = InMemoryOrderBook::new();
        let order = Order::new();
        let id = order.id;
        book.insert_order(order).unwrap();

        assert!(book
            .advance_status(id, OrderStatus::Created, OrderStatus::Processing)
            .await
            .unwrap());
        assert!(!book
            .advance_status(id, OrderStatus::Created, OrderStatus::Processing)
            .await
            .unwrap());
        assert_eq!(
            book.get_order(id).await.unwrap().unwrap().status,
            OrderStatus::Processing
        );
    }

    #[tokio::test]
    async fn update_status_attaches_provider() {
        let book = InMemoryOrderBook::new();
        let order = Order::new();
        let item = OrderItem::new(order.id, ProductId::new(), VariantId::new(), 1, 1999);
        let item_id = item.id;
        book.insert_item(item).unwrap();

        let provider = PrintProviderId::new();
        book.update_status(item_id, ItemStatusUpdate::dispatched_to(provider))
            .await
            .unwrap();

        let stored = book.get_item(item_id).await.unwrap().unwrap();
        assert_eq!(stored.fulfillment_status, ItemFulfillmentStatus::Processing);
        assert_eq!(stored.print_provider_id, Some(provider));
    }

    #[tokio::test]
    async fn list_for_order_filters_by_order() {
        let book = InMemoryOrderBook::new();
        let mine = Order::new();
        let other = Order::new();
        for order_id in [mine.id, mine.id, other.id] {
            book.insert_item(OrderItem::new(order_id, ProductId::new(), VariantId::new(), 1, 500))
                .unwrap();
        }

        assert_eq!(book.list_for_order(mine.id).await.unwrap().len(), 2);
        assert_eq!(book.list_for_order(other.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_item_update_is_an_error() {
        let book = InMemoryOrderBook::new();
        let result = book
            .update_status(OrderItemId::new(), ItemStatusUpdate::dispatched_to(PrintProviderId::new()))
            .await;
        assert!(matches!(result, Err(CollaboratorError::OrderItemNotFound(_))));
    }
}
