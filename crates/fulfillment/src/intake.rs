//! Job creation when an order is placed.

use std::sync::Arc;

use tracing::info;

use printforge_core::{FulfillmentJobId, OrderId, OrderItemId};
use printforge_sales::OrderItem;

use crate::store::{JobStore, JobStoreError};
use crate::types::FulfillmentJob;

#[derive(Debug, Clone, thiserror::Error)]
pub enum IntakeError {
    #[error("order item {item} belongs to order {actual}, not {expected}")]
    ForeignItem {
        item: OrderItemId,
        expected: OrderId,
        actual: OrderId,
    },
    #[error(transparent)]
    Store(#[from] JobStoreError),
}

pub struct JobIntake {
    store: Arc<dyn JobStore>,
}

impl JobIntake {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Create one pending job per order item, in item order.
    ///
    /// All items are checked before anything is written.
    pub async fn enqueue_order(
        &self,
        order_id: OrderId,
        items: &[OrderItem],
    ) -> Result<Vec<FulfillmentJobId>, IntakeError> {
        if let Some(item) = items.iter().find(|i| i.order_id != order_id) {
            return Err(IntakeError::ForeignItem {
                item: item.id,
                expected: order_id,
                actual: item.order_id,
            });
        }

        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            ids.push(self.store.create(FulfillmentJob::new(order_id, item.id)).await?);
        }

        info!(order_id = %order_id, jobs = ids.len(), "Queued fulfillment jobs");
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryJobStore;
    use crate::types::JobStatus;
    use printforge_core::{ProductId, VariantId};
    use printforge_sales::Order;

    fn item(order_id: OrderId) -> OrderItem {
        OrderItem::new(order_id, ProductId::new(), VariantId::new(), 2, 2499)
    }

    #[tokio::test]
    async fn one_pending_job_per_item() {
        let store = InMemoryJobStore::arc();
        let intake = JobIntake::new(store.clone());
        let order = Order::new();
        let items = vec![item(order.id), item(order.id)];

        let ids = intake.enqueue_order(order.id, &items).await.unwrap();
        assert_eq!(ids.len(), 2);

        let jobs = store.find_by_order(order.id).await.unwrap();
        assert!(jobs.iter().all(|j| j.status == JobStatus::Pending && j.attempts == 0));
    }

    #[tokio::test]
    async fn enqueueing_twice_is_rejected() {
        let store = InMemoryJobStore::arc();
        let intake = JobIntake::new(store);
        let order = Order::new();
        let items = vec![item(order.id)];

        intake.enqueue_order(order.id, &items).await.unwrap();
        assert!(matches!(
            intake.enqueue_order(order.id, &items).await,
            Err(IntakeError::Store(JobStoreError::DuplicateOrderItem(_)))
        ));
    }

    #[tokio::test]
    async fn foreign_items_are_rejected_before_writing() {
        let store = InMemoryJobStore::arc();
        let intake = JobIntake::new(store.clone());
        let order = Order::new();
        let items = vec![item(order.id), item(OrderId::new())];

        assert!(matches!(
            intake.enqueue_order(order.id, &items).await,
            Err(IntakeError::ForeignItem { .. })
        ));
        assert_eq!(store.stats().await.unwrap().total(), 0);
    }
}
