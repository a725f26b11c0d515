//! Queue processor: the periodic poll-claim-dispatch loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::collaborators::{ItemStatusUpdate, OrderItemStore};
use crate::config::{MIN_INTERVAL, QueueConfig};
use crate::propagator::StatusPropagator;
use crate::router::{Dispatch, ProviderRouter, RoutingError};
use crate::store::{EligibleQuery, JobPatch, JobStore, JobStoreError};
use crate::types::{FulfillmentJob, Transition, next_transition};

/// Processor runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ProcessorStats {
    pub sweeps_run: u64,
    pub sweeps_skipped: u64,
    pub sweeps_failed: u64,
    pub jobs_completed: u64,
    pub jobs_retried: u64,
    pub jobs_failed: u64,
}

/// What a single sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Jobs returned by the eligibility query
    pub selected: usize,
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
    /// Claimed by someone else between query and claim
    pub lost_claims: usize,
    /// Store errors while recording an outcome
    pub errors: usize,
}

impl SweepSummary {
    fn record(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Completed => self.completed += 1,
            JobOutcome::Retried => self.retried += 1,
            JobOutcome::Failed => self.failed += 1,
            JobOutcome::LostClaim => self.lost_claims += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepReport {
    /// Another sweep held the guard; nothing was read or written.
    Skipped,
    Swept(SweepSummary),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SweepError {
    #[error("failed to query eligible jobs: {0}")]
    Query(#[from] JobStoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    Completed,
    Retried,
    Failed,
    LostClaim,
}

/// Holds the in-flight flag for as long as it lives.
struct SweepGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SweepGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

struct Shared {
    config: QueueConfig,
    store: Arc<dyn JobStore>,
    router: ProviderRouter,
    items: Arc<dyn OrderItemStore>,
    propagator: StatusPropagator,
    is_processing: AtomicBool,
    stats: Mutex<ProcessorStats>,
}

struct TimerHandle {
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

/// Background fulfillment processor.
///
/// Owns its own timer and in-flight flag; construct one per process and
/// drive it with [`start`](Self::start) / [`stop`](Self::stop).
pub struct QueueProcessor {
    shared: Arc<Shared>,
    timer: Mutex<Option<TimerHandle>>,
}

impl QueueProcessor {
    pub fn new(
        config: QueueConfig,
        store: Arc<dyn JobStore>,
        router: ProviderRouter,
        items: Arc<dyn OrderItemStore>,
        propagator: StatusPropagator,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                store,
                router,
                items,
                propagator,
                is_processing: AtomicBool::new(false),
                stats: Mutex::new(ProcessorStats::default()),
            }),
            timer: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    /// Spawn the timer loop. The first sweep runs immediately.
    ///
    /// Returns `false` (and does nothing) when already running. Must be
    /// called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if timer.as_ref().is_some_and(|t| !t.join.is_finished()) {
            warn!("Fulfillment queue processor already running");
            return false;
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let shared = self.shared.clone();
        let join = tokio::spawn(run_loop(shared, shutdown_rx));
        *timer = Some(TimerHandle {
            shutdown: shutdown_tx,
            join,
        });

        info!(
            interval_ms = self.shared.config.interval.as_millis() as u64,
            batch_size = self.shared.config.batch_size,
            max_attempts = self.shared.config.max_attempts(),
            "Fulfillment queue processor started"
        );
        true
    }

    /// Stop the timer, waiting for an in-flight sweep to finish.
    ///
    /// Returns `false` when it was not running.
    pub async fn stop(&self) -> bool {
        let handle = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return false;
        };

        let _ = handle.shutdown.send(());
        if let Err(e) = handle.join.await {
            error!(error = %e, "Fulfillment queue task ended abnormally");
        }
        info!("Fulfillment queue processor stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.join.is_finished())
    }

    pub fn is_processing(&self) -> bool {
        self.shared.is_processing.load(Ordering::Acquire)
    }

    /// Run a single sweep now, outside the timer.
    pub async fn sweep(&self) -> Result<SweepReport, SweepError> {
        self.shared.sweep().await
    }

    pub fn stats(&self) -> ProcessorStats {
        self.shared
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for QueueProcessor {
    fn drop(&mut self) {
        let handle = self
            .timer
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.shutdown.send(());
        }
    }
}

async fn run_loop(shared: Arc<Shared>, mut shutdown: oneshot::Receiver<()>) {
    // The field is public, so a zero can still arrive without the builder.
    let mut ticker = tokio::time::interval(shared.config.interval.max(MIN_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                // Errors are already logged and counted; the timer keeps going.
                let _ = shared.sweep().await;
            }
        }
    }
}

impl Shared {
    fn with_stats(&self, f: impl FnOnce(&mut ProcessorStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut stats);
    }

    async fn sweep(&self) -> Result<SweepReport, SweepError> {
        let Some(_guard) = SweepGuard::acquire(&self.is_processing) else {
            debug!("Fulfillment sweep already in progress, skipping");
            self.with_stats(|s| s.sweeps_skipped += 1);
            return Ok(SweepReport::Skipped);
        };

        let query = EligibleQuery::pending(
            self.config.max_attempts(),
            self.config.batch_size,
            Utc::now(),
        );
        let jobs = match self.store.find_eligible(&query).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "Error processing fulfillment queue");
                self.with_stats(|s| s.sweeps_failed += 1);
                return Err(SweepError::Query(e));
            }
        };

        let mut summary = SweepSummary {
            selected: jobs.len(),
            ..Default::default()
        };

        if !jobs.is_empty() {
            info!(count = jobs.len(), "Processing fulfillment jobs");
        }

        for job in jobs {
            let job_id = job.id;
            match self.process_job(job).await {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    summary.errors += 1;
                    error!(job_id = %job_id, error = %e, "Failed to record fulfillment job outcome");
                }
            }
        }

        self.with_stats(|s| {
            s.sweeps_run += 1;
            s.jobs_completed += summary.completed as u64;
            s.jobs_retried += summary.retried as u64;
            s.jobs_failed += summary.failed as u64;
        });

        Ok(SweepReport::Swept(summary))
    }

    async fn process_job(&self, job: FulfillmentJob) -> Result<JobOutcome, JobStoreError> {
        let max_attempts = self.config.max_attempts();
        let Some(claimed) = self.store.claim(job.id, max_attempts, Utc::now()).await? else {
            debug!(job_id = %job.id, "Fulfillment job claimed elsewhere, skipping");
            return Ok(JobOutcome::LostClaim);
        };

        debug!(
            job_id = %claimed.id,
            order_id = %claimed.order_id,
            attempt = claimed.attempts,
            "Claimed fulfillment job"
        );

        let result = self.router.route(&claimed).await;
        let now = Utc::now();
        let transition = next_transition(&self.config.retry, claimed.attempts, result, now);
        debug!(
            job_id = %claimed.id,
            next_status = ?transition.target_status(),
            "Fulfillment attempt finished"
        );
        match transition {
            Transition::Complete(dispatch) => self.record_success(&claimed, dispatch, now).await,
            Transition::Retry { error, not_before } => {
                self.record_retry(&claimed, &error, not_before, now).await
            }
            Transition::Exhaust(error) => self.record_exhausted(&claimed, &error, now).await,
        }
    }

    /// Write an attempt's outcome, retrying once. If both writes fail the
    /// job stays `processing`.
    async fn write_outcome(
        &self,
        job: &FulfillmentJob,
        patch: &JobPatch,
    ) -> Result<(), JobStoreError> {
        if let Err(e) = self.store.update_by_id(job.id, patch).await {
            warn!(job_id = %job.id, error = %e, "Retrying fulfillment job outcome write");
            self.store.update_by_id(job.id, patch).await?;
        }
        Ok(())
    }

    async fn record_success(
        &self,
        job: &FulfillmentJob,
        dispatch: Dispatch,
        now: DateTime<Utc>,
    ) -> Result<JobOutcome, JobStoreError> {
        let patch = JobPatch::complete(
            dispatch.provider_id,
            dispatch.submission.provider_order_id.clone(),
            dispatch.submission.estimated_ship_date,
            now,
        );
        if let Err(e) = self.write_outcome(job, &patch).await {
            error!(
                job_id = %job.id,
                provider_order_id = %dispatch.submission.provider_order_id,
                error = %e,
                "Provider accepted the order but the job could not be completed"
            );
            return Err(e);
        }

        info!(
            job_id = %job.id,
            provider = %dispatch.provider_name,
            provider_order_id = %dispatch.submission.provider_order_id,
            attempt = job.attempts,
            "Fulfillment job completed"
        );

        let update = ItemStatusUpdate::dispatched_to(dispatch.provider_id);
        if let Err(e) = self.items.update_status(job.order_item_id, update).await {
            error!(
                job_id = %job.id,
                order_item_id = %job.order_item_id,
                error = %e,
                "Failed to mark order item as processing"
            );
            return Ok(JobOutcome::Completed);
        }

        match self.propagator.propagate(job.order_id).await {
            Ok(outcome) => debug!(order_id = %job.order_id, ?outcome, "Order status propagated"),
            Err(e) => warn!(order_id = %job.order_id, error = %e, "Order status propagation failed"),
        }

        Ok(JobOutcome::Completed)
    }

    async fn record_retry(
        &self,
        job: &FulfillmentJob,
        err: &RoutingError,
        not_before: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<JobOutcome, JobStoreError> {
        let message = err.to_string();
        self.write_outcome(job, &JobPatch::retry(message.clone(), not_before, now))
            .await?;
        warn!(
            job_id = %job.id,
            attempt = job.attempts,
            max_attempts = self.config.max_attempts(),
            error = %message,
            "Fulfillment job failed, will retry"
        );
        Ok(JobOutcome::Retried)
    }

    async fn record_exhausted(
        &self,
        job: &FulfillmentJob,
        err: &RoutingError,
        now: DateTime<Utc>,
    ) -> Result<JobOutcome, JobStoreError> {
        let message = err.to_string();
        self.write_outcome(job, &JobPatch::fail(message.clone(), now))
            .await?;
        error!(
            job_id = %job.id,
            order_id = %job.order_id,
            attempt = job.attempts,
            error = %message,
            "Fulfillment job failed permanently"
        );
        Ok(JobOutcome::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{InMemoryCatalog, InMemoryOrderBook};
    use crate::router::SimulatedPrintProvider;
    use crate::store::InMemoryJobStore;
    use std::time::Duration;

    fn processor(store: Arc<InMemoryJobStore>, interval: Duration) -> QueueProcessor {
        processor_with(store, QueueConfig::default().with_interval(interval))
    }

    fn processor_with(store: Arc<InMemoryJobStore>, config: QueueConfig) -> QueueProcessor {
        let book = InMemoryOrderBook::arc();
        let catalog = InMemoryCatalog::arc();
        let router = ProviderRouter::new(
            book.clone(),
            catalog,
            Arc::new(SimulatedPrintProvider::new()),
            Duration::from_secs(1),
        );
        let propagator = StatusPropagator::new(book.clone(), book.clone());
        QueueProcessor::new(
            config,
            store,
            router,
            book,
            propagator,
        )
    }

    #[test]
    fn guard_is_exclusive_and_released_on_drop() {
        let flag = AtomicBool::new(false);
        let guard = SweepGuard::acquire(&flag).unwrap();
        assert!(SweepGuard::acquire(&flag).is_none());
        drop(guard);
        assert!(!flag.load(Ordering::Acquire));
        assert!(SweepGuard::acquire(&flag).is_some());
    }

    #[tokio::test]
    async fn empty_sweep_is_a_noop() {
        let p = processor(InMemoryJobStore::arc(), Duration::from_secs(30));
        let report = p.sweep().await.unwrap();
        assert_eq!(report, SweepReport::Swept(SweepSummary::default()));
        assert_eq!(p.stats().sweeps_run, 1);
        assert!(!p.is_processing());
    }

    #[tokio::test]
    async fn start_is_idempotent_and_stop_clears_timer() {
        let p = processor(InMemoryJobStore::arc(), Duration::from_secs(30));

        assert!(p.start());
        assert!(!p.start());
        assert!(p.is_running());

        assert!(p.stop().await);
        assert!(!p.is_running());
        assert!(!p.stop().await);

        // Can be started again after a stop
        assert!(p.start());
        assert!(p.stop().await);
    }

    #[tokio::test(start_paused = true)]
    async fn runs_immediately_then_on_interval() {
        let p = processor(InMemoryJobStore::arc(), Duration::from_secs(30));
        p.start();

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(p.stats().sweeps_run, 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(p.stats().sweeps_run, 2);

        p.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_timer_keeps_sweeping() {
        let config = QueueConfig {
            interval: Duration::ZERO,
            ..QueueConfig::default()
        };
        let p = processor_with(InMemoryJobStore::arc(), config);
        assert!(p.start());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(p.stats().sweeps_run > 1);
        assert!(p.stop().await);
    }
}
