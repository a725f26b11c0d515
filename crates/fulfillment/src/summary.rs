//! Read-side view of an order's fulfillment.

use printforge_core::OrderId;
use printforge_sales::{Order, OrderItem};

use crate::collaborators::{CollaboratorError, OrderItemStore, OrderStore};
use crate::store::{JobStats, JobStore, JobStoreError};
use crate::types::{FulfillmentJob, JobStatus};

#[derive(Debug, Clone, thiserror::Error)]
pub enum SummaryError {
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),
    #[error(transparent)]
    Lookup(#[from] CollaboratorError),
    #[error(transparent)]
    Store(#[from] JobStoreError),
}

/// An order together with its items and jobs.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FulfillmentSummary {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub jobs: Vec<FulfillmentJob>,
}

impl FulfillmentSummary {
    pub async fn load(
        order_id: OrderId,
        orders: &dyn OrderStore,
        items: &dyn OrderItemStore,
        jobs: &dyn JobStore,
    ) -> Result<Self, SummaryError> {
        let order = orders
            .get_order(order_id)
            .await?
            .ok_or(SummaryError::OrderNotFound(order_id))?;
        let items = items.list_for_order(order_id).await?;
        let jobs = jobs.find_by_order(order_id).await?;
        Ok(Self { order, items, jobs })
    }

    pub fn job_counts(&self) -> JobStats {
        self.jobs.iter().collect()
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }

    /// Every job reached a terminal state.
    pub fn is_settled(&self) -> bool {
        !self.jobs.is_empty() && self.jobs.iter().all(|j| j.status.is_terminal())
    }
}
