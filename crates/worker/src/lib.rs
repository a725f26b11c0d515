//! Fulfillment worker wiring.
//!
//! Builds the stores, the provider router and the queue processor once per
//! process. Everything is in-memory; a real deployment swaps the store
//! implementations behind the same traits.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use printforge_catalog::{PrintProvider, Product, ProductVariant};
use printforge_core::{OrderId, StoreId};
use printforge_fulfillment::{
    FulfillmentSummary, InMemoryCatalog, InMemoryJobStore, InMemoryOrderBook, JobIntake,
    ProviderRouter, QueueConfig, QueueProcessor, RecoveryController, SimulatedPrintProvider,
    StatusPropagator,
};
use printforge_integrations::{
    AdapterConfig, MarketplaceAdapter, NormalizedOrder, OrderFilter, Platform, create_adapter,
};
use printforge_sales::{ItemFulfillmentStatus, Order, OrderItem};

/// Seeds a demo catalog and one marketplace order when set to `1`/`true`.
pub const ENV_SEED_DEMO: &str = "FULFILLMENT_SEED_DEMO";
/// Simulated provider latency in milliseconds.
pub const ENV_PROVIDER_LATENCY_MS: &str = "FULFILLMENT_PROVIDER_LATENCY_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub queue: QueueConfig,
    pub seed_demo: bool,
    pub provider_latency: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            seed_demo: false,
            provider_latency: Duration::from_secs(1),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let queue = QueueConfig::from_env().context("invalid fulfillment queue configuration")?;

        let seed_demo = std::env::var(ENV_SEED_DEMO)
            .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let provider_latency = match std::env::var(ENV_PROVIDER_LATENCY_MS) {
            Ok(raw) => Duration::from_millis(
                raw.trim()
                    .parse()
                    .with_context(|| format!("{ENV_PROVIDER_LATENCY_MS} must be an integer"))?,
            ),
            Err(_) => WorkerConfig::default().provider_latency,
        };

        Ok(Self {
            queue,
            seed_demo,
            provider_latency,
        })
    }
}

/// Process-wide service graph.
pub struct Services {
    pub jobs: Arc<InMemoryJobStore>,
    pub book: Arc<InMemoryOrderBook>,
    pub catalog: Arc<InMemoryCatalog>,
    pub intake: JobIntake,
    pub recovery: RecoveryController,
    pub processor: QueueProcessor,
}

impl Services {
    pub fn in_memory(config: &WorkerConfig) -> Self {
        let jobs = InMemoryJobStore::arc();
        let book = InMemoryOrderBook::arc();
        let catalog = InMemoryCatalog::arc();

        let client =
            Arc::new(SimulatedPrintProvider::new().with_latency(config.provider_latency));
        let router = ProviderRouter::new(
            book.clone(),
            catalog.clone(),
            client,
            config.queue.provider_timeout,
        );
        let propagator = StatusPropagator::new(book.clone(), book.clone());
        let processor = QueueProcessor::new(
            config.queue.clone(),
            jobs.clone(),
            router,
            book.clone(),
            propagator,
        );

        Self {
            intake: JobIntake::new(jobs.clone()),
            recovery: RecoveryController::new(jobs.clone(), config.queue.retry.clone()),
            jobs,
            book,
            catalog,
            processor,
        }
    }

    /// Load a one-product catalog and import the orders a demo Shopify store
    /// reports, queueing a job per line.
    pub async fn seed_demo(&self) -> anyhow::Result<Vec<OrderId>> {
        let provider = PrintProvider::new("Printful")
            .supporting("t-shirt")
            .supporting("mug");
        let product = Product::new("Classic T-Shirt", "t-shirt", 2499)
            .activated()
            .with_provider(provider.id);
        let variants = [("TEE-M-BLK", "M", "Black"), ("TEE-L-WHT", "L", "White")]
            .map(|(sku, size, color)| ProductVariant::new(product.id, sku, size, color));

        self.catalog.insert_provider(provider)?;
        for variant in &variants {
            self.catalog.insert_variant(variant.clone())?;
        }
        self.catalog.insert_product(product.clone())?;

        let shopify = create_adapter(
            Platform::Shopify,
            AdapterConfig::new("demo.myshopify.com").with_webhook_secret("demo"),
        )?;
        let remote_orders = shopify.fetch_orders(&OrderFilter::default()).await?;

        let mut placed = Vec::with_capacity(remote_orders.len());
        for remote in &remote_orders {
            placed.push(self.import(remote, &product, &variants).await?);
        }
        info!(orders = placed.len(), "Seeded demo orders");
        Ok(placed)
    }

    async fn import(
        &self,
        remote: &NormalizedOrder,
        product: &Product,
        variants: &[ProductVariant],
    ) -> anyhow::Result<OrderId> {
        let order = Order::new().for_store(StoreId::new(), remote.external_order_id.clone());
        let order_id = order.id;

        let mut items = Vec::with_capacity(remote.items.len());
        for line in &remote.items {
            let Some(variant) = variants
                .iter()
                .find(|v| line.sku.as_deref() == Some(v.sku.as_str()))
            else {
                warn!(sku = ?line.sku, "No variant for marketplace line, skipping");
                continue;
            };
            items.push(
                OrderItem::new(order_id, product.id, variant.id, line.quantity, line.unit_price)
                    .with_status(ItemFulfillmentStatus::Created),
            );
        }

        self.book.insert_order(order)?;
        for item in &items {
            self.book.insert_item(item.clone())?;
        }
        self.intake.enqueue_order(order_id, &items).await?;
        Ok(order_id)
    }

    pub async fn summary(&self, order_id: OrderId) -> anyhow::Result<FulfillmentSummary> {
        Ok(FulfillmentSummary::load(
            order_id,
            &*self.book,
            &*self.book,
            &*self.jobs,
        )
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printforge_fulfillment::{JobStatus, JobStore, SweepReport};
    use printforge_sales::OrderStatus;

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            provider_latency: Duration::ZERO,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn demo_order_is_fulfilled_by_one_sweep() {
        let services = Services::in_memory(&fast_config());
        let orders = services.seed_demo().await.unwrap();
        assert_eq!(orders.len(), 1);

        let before = services.summary(orders[0]).await.unwrap();
        assert_eq!(before.count(JobStatus::Pending), 1);

        let report = services.processor.sweep().await.unwrap();
        assert!(matches!(report, SweepReport::Swept(s) if s.completed == 1));

        let after = services.summary(orders[0]).await.unwrap();
        assert_eq!(after.order.status, OrderStatus::Processing);
        assert!(after.is_settled());
        assert!(after.jobs[0]
            .provider_order_id
            .as_deref()
            .is_some_and(|id| id.starts_with("printful_")));
        assert_eq!(services.jobs.stats().await.unwrap().completed, 1);
    }

    #[tokio::test]
    async fn nothing_to_recover_on_a_fresh_worker() {
        let services = Services::in_memory(&fast_config());
        let report = services.recovery.reset_failed().await.unwrap();
        assert_eq!(report.reset_count(), 0);
    }
}
