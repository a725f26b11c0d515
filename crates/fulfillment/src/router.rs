//! Provider routing: order item -> variant -> product -> print provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use printforge_catalog::{PrintProvider, Product, ProductVariant};
use printforge_core::{OrderItemId, PrintProviderId, ProductId, VariantId};
use printforge_sales::OrderItem;

use crate::collaborators::{CatalogStore, CollaboratorError, OrderItemStore};
use crate::types::FulfillmentJob;

/// Everything a provider needs to print one order line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub order_item: OrderItem,
    pub variant: ProductVariant,
    pub product: Product,
    pub provider: PrintProvider,
}

/// Provider acknowledgement of a submitted print order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSubmission {
    pub provider_order_id: String,
    pub status: String,
    pub estimated_ship_date: DateTime<Utc>,
}

/// Rejection reported by a provider client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct SubmissionError(pub String);

impl SubmissionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// External print provider API.
///
/// A call either returns an acknowledgement or an error; retries are the
/// caller's business.
#[async_trait]
pub trait PrintProviderClient: Send + Sync {
    async fn submit(
        &self,
        route: &ResolvedRoute,
        job: &FulfillmentJob,
    ) -> Result<ProviderSubmission, SubmissionError>;
}

/// Every way an attempt can fail. The `Display` text becomes the job's
/// `error_message`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RoutingError {
    #[error("Order item not found: {0}")]
    OrderItemNotFound(OrderItemId),
    #[error("Product variant not found: {0}")]
    VariantNotFound(VariantId),
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),
    #[error("Product {0} has no print provider assigned")]
    ProviderUnassigned(ProductId),
    #[error("Print provider not found: {0}")]
    ProviderNotFound(PrintProviderId),
    #[error("Provider submission failed: {0}")]
    Submission(#[from] SubmissionError),
    #[error("Provider submission timed out after {0:?}")]
    Timeout(Duration),
    #[error("Lookup failed: {0}")]
    Lookup(#[from] CollaboratorError),
}

/// Successful dispatch of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub provider_id: PrintProviderId,
    pub provider_name: String,
    pub submission: ProviderSubmission,
}

pub struct ProviderRouter {
    items: Arc<dyn OrderItemStore>,
    catalog: Arc<dyn CatalogStore>,
    client: Arc<dyn PrintProviderClient>,
    timeout: Duration,
}

impl ProviderRouter {
    pub fn new(
        items: Arc<dyn OrderItemStore>,
        catalog: Arc<dyn CatalogStore>,
        client: Arc<dyn PrintProviderClient>,
        timeout: Duration,
    ) -> Self {
        Self {
            items,
            catalog,
            client,
            timeout,
        }
    }

    /// Walk the reference chain for an order item.
    pub async fn resolve(&self, order_item_id: OrderItemId) -> Result<ResolvedRoute, RoutingError> {
        let order_item = self
            .items
            .get_item(order_item_id)
            .await?
            .ok_or(RoutingError::OrderItemNotFound(order_item_id))?;

        let variant = self
            .catalog
            .get_variant(order_item.product_variant_id)
            .await?
            .ok_or(RoutingError::VariantNotFound(order_item.product_variant_id))?;

        let product = self
            .catalog
            .get_product(variant.product_id)
            .await?
            .ok_or(RoutingError::ProductNotFound(variant.product_id))?;

        let provider_id = product
            .print_provider_id
            .ok_or(RoutingError::ProviderUnassigned(product.id))?;

        let provider = self
            .catalog
            .get_provider(provider_id)
            .await?
            .ok_or(RoutingError::ProviderNotFound(provider_id))?;

        Ok(ResolvedRoute {
            order_item,
            variant,
            product,
            provider,
        })
    }

    /// Submit with the configured deadline; expiry counts as a failure.
    pub async fn submit(
        &self,
        route: &ResolvedRoute,
        job: &FulfillmentJob,
    ) -> Result<ProviderSubmission, RoutingError> {
        match tokio::time::timeout(self.timeout, self.client.submit(route, job)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(RoutingError::Timeout(self.timeout)),
        }
    }

    /// Resolve then submit.
    pub async fn route(&self, job: &FulfillmentJob) -> Result<Dispatch, RoutingError> {
        let route = self.resolve(job.order_item_id).await?;
        debug!(
            job_id = %job.id,
            provider = %route.provider.name,
            sku = %route.variant.sku,
            "Submitting to print provider"
        );
        let submission = self.submit(&route, job).await?;
        Ok(Dispatch {
            provider_id: route.provider.id,
            provider_name: route.provider.name,
            submission,
        })
    }
}

/// Stand-in provider that accepts every order.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPrintProvider {
    latency: Duration,
}

impl SimulatedPrintProvider {
    pub const SHIPPING_DAYS: i64 = 3;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl PrintProviderClient for SimulatedPrintProvider {
    async fn submit(
        &self,
        route: &ResolvedRoute,
        _job: &FulfillmentJob,
    ) -> Result<ProviderSubmission, SubmissionError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let now = Utc::now();
        Ok(ProviderSubmission {
            provider_order_id: format!(
                "{}_{}",
                route.provider.name.to_lowercase(),
                now.timestamp_millis()
            ),
            status: "accepted".to_string(),
            estimated_ship_date: now + chrono::Duration::days(Self::SHIPPING_DAYS),
        })
    }
}
