//! Order status derived from its items.

use std::sync::Arc;

use tracing::{debug, info};

use printforge_core::OrderId;
use printforge_sales::OrderStatus;

use crate::collaborators::{CollaboratorError, OrderItemStore, OrderStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropagationOutcome {
    /// `created -> processing` was applied by this call.
    Advanced,
    /// Still `created`; `remaining` items are not yet in fulfillment.
    Waiting { remaining: usize },
    /// The order is past `created`, nothing to do.
    Unchanged { status: OrderStatus },
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PropagationError {
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),
    #[error(transparent)]
    Lookup(#[from] CollaboratorError),
}

pub struct StatusPropagator {
    orders: Arc<dyn OrderStore>,
    items: Arc<dyn OrderItemStore>,
}

impl StatusPropagator {
    pub fn new(orders: Arc<dyn OrderStore>, items: Arc<dyn OrderItemStore>) -> Self {
        Self { orders, items }
    }

    /// Advance the order once every item is in fulfillment. Never moves an
    /// order backwards and is safe to repeat.
    pub async fn propagate(&self, order_id: OrderId) -> Result<PropagationOutcome, PropagationError> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or(PropagationError::OrderNotFound(order_id))?;

        if order.status != OrderStatus::Created {
            return Ok(PropagationOutcome::Unchanged {
                status: order.status,
            });
        }

        let items = self.items.list_for_order(order_id).await?;
        if !order.ready_for_processing(&items) {
            let remaining = items
                .iter()
                .filter(|i| !i.fulfillment_status.is_in_fulfillment())
                .count();
            debug!(order_id = %order_id, remaining, "Order still waiting on items");
            return Ok(PropagationOutcome::Waiting { remaining });
        }

        let advanced = self
            .orders
            .advance_status(order_id, OrderStatus::Created, OrderStatus::Processing)
            .await?;

        if advanced {
            info!(order_id = %order_id, items = items.len(), "Order advanced to processing");
            Ok(PropagationOutcome::Advanced)
        } else {
            // Someone else moved it between the read and the write.
            let status = self
                .orders
                .get_order(order_id)
                .await?
                .map(|o| o.status)
                .unwrap_or(OrderStatus::Processing);
            Ok(PropagationOutcome::Unchanged { status })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryOrderBook;
    use printforge_core::{ProductId, VariantId};
    use printforge_sales::{ItemFulfillmentStatus, Order, OrderItem};

    fn setup(statuses: &[ItemFulfillmentStatus]) -> (Arc<InMemoryOrderBook>, StatusPropagator, OrderId) {
        let book = InMemoryOrderBook::arc();
        let order = Order::new();
        let order_id = order.id;
        book.insert_order(order).unwrap();
        for status in statuses {
            book.insert_item(
                OrderItem::new(order_id, ProductId::new(), VariantId::new(), 1, 1500)
                    .with_status(*status),
            )
            .unwrap();
        }
        let propagator = StatusPropagator::new(book.clone(), book.clone());
        (book, propagator, order_id)
    }

    #[tokio::test]
    async fn partial_order_stays_created() {
        let (book, propagator, order_id) = setup(&[
            ItemFulfillmentStatus::Processing,
            ItemFulfillmentStatus::Created,
        ]);

        let outcome = propagator.propagate(order_id).await.unwrap();
        assert_eq!(outcome, PropagationOutcome::Waiting { remaining: 1 });
        let order = book.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Created);
    }

    #[tokio::test]
    async fn complete_order_advances_once() {
        let (book, propagator, order_id) = setup(&[
            ItemFulfillmentStatus::Processing,
            ItemFulfillmentStatus::Shipped,
        ]);

        assert_eq!(
            propagator.propagate(order_id).await.unwrap(),
            PropagationOutcome::Advanced
        );
        assert_eq!(
            propagator.propagate(order_id).await.unwrap(),
            PropagationOutcome::Unchanged {
                status: OrderStatus::Processing
            }
        );
        let order = book.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn order_without_items_waits() {
        let (_book, propagator, order_id) = setup(&[]);
        assert_eq!(
            propagator.propagate(order_id).await.unwrap(),
            PropagationOutcome::Waiting { remaining: 0 }
        );
    }

    #[tokio::test]
    async fn unknown_order_is_an_error() {
        let (_book, propagator, _) = setup(&[]);
        assert!(matches!(
            propagator.propagate(OrderId::new()).await,
            Err(PropagationError::OrderNotFound(_))
        ));
    }
}
