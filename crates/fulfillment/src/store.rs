//! Job storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use printforge_core::{FulfillmentJobId, OrderId, OrderItemId, PrintProviderId};

use super::types::{FulfillmentJob, JobStatus};

/// Selection used by a sweep: `pending AND attempts < bound AND ready`,
/// oldest `created_at` first, at most `limit` rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibleQuery {
    pub attempts_less_than: u32,
    pub limit: usize,
    /// Jobs whose `next_retry_at` lies after this instant are skipped.
    pub ready_at: DateTime<Utc>,
}

impl EligibleQuery {
    pub fn pending(max_attempts: u32, limit: usize, now: DateTime<Utc>) -> Self {
        Self {
            attempts_less_than: max_attempts,
            limit,
            ready_at: now,
        }
    }

    pub fn matches(&self, job: &FulfillmentJob) -> bool {
        job.is_eligible(self.attempts_less_than, self.ready_at)
    }
}

/// Guard for a conditional update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precondition {
    pub status: JobStatus,
    pub attempts_less_than: Option<u32>,
}

impl Precondition {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status,
            attempts_less_than: None,
        }
    }

    pub fn status_below(status: JobStatus, attempts_less_than: u32) -> Self {
        Self {
            status,
            attempts_less_than: Some(attempts_less_than),
        }
    }

    pub fn holds(&self, job: &FulfillmentJob) -> bool {
        job.status == self.status && self.attempts_less_than.is_none_or(|max| job.attempts < max)
    }
}

/// Single-document patch.
///
/// `None` leaves a field untouched; for nullable fields `Some(None)` clears it.
/// `updated_at` is always refreshed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub increment_attempts: bool,
    pub print_provider_id: Option<PrintProviderId>,
    pub provider_order_id: Option<Option<String>>,
    pub estimated_ship_date: Option<Option<DateTime<Utc>>>,
    pub error_message: Option<Option<String>>,
    pub next_retry_at: Option<Option<DateTime<Utc>>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl JobPatch {
    /// `pending -> processing`, recording the attempt before any provider call.
    pub fn claim(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Processing),
            increment_attempts: true,
            last_attempt_at: Some(now),
            next_retry_at: Some(None),
            ..Default::default()
        }
    }

    pub fn complete(
        provider_id: PrintProviderId,
        provider_order_id: String,
        estimated_ship_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            print_provider_id: Some(provider_id),
            provider_order_id: Some(Some(provider_order_id)),
            estimated_ship_date: Some(Some(estimated_ship_date)),
            error_message: Some(None),
            completed_at: Some(now),
            ..Default::default()
        }
    }

    pub fn retry(
        error: impl Into<String>,
        not_before: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            status: Some(JobStatus::Pending),
            error_message: Some(Some(error.into())),
            next_retry_at: Some(not_before),
            last_attempt_at: Some(now),
            ..Default::default()
        }
    }

    pub fn fail(error: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error_message: Some(Some(error.into())),
            last_attempt_at: Some(now),
            failed_at: Some(now),
            ..Default::default()
        }
    }

    /// Manual recovery: `failed -> pending`, error cleared, attempts kept.
    pub fn reset() -> Self {
        Self {
            status: Some(JobStatus::Pending),
            error_message: Some(None),
            next_retry_at: Some(None),
            ..Default::default()
        }
    }

    pub fn apply_to(&self, job: &mut FulfillmentJob, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if self.increment_attempts {
            job.attempts = job.attempts.saturating_add(1);
        }
        if let Some(provider_id) = self.print_provider_id {
            job.print_provider_id = Some(provider_id);
        }
        if let Some(provider_order_id) = &self.provider_order_id {
            job.provider_order_id = provider_order_id.clone();
        }
        if let Some(eta) = self.estimated_ship_date {
            job.estimated_ship_date = eta;
        }
        if let Some(error) = &self.error_message {
            job.error_message = error.clone();
        }
        if let Some(next_retry_at) = self.next_retry_at {
            job.next_retry_at = next_retry_at;
        }
        if let Some(at) = self.last_attempt_at {
            job.last_attempt_at = Some(at);
        }
        if let Some(at) = self.completed_at {
            job.completed_at = Some(at);
        }
        if let Some(at) = self.failed_at {
            job.failed_at = Some(at);
        }
        job.updated_at = now;
    }
}

/// Job store abstraction.
///
/// Every mutation is an atomic single-document update.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job.
    async fn create(&self, job: FulfillmentJob) -> Result<FulfillmentJobId, JobStoreError>;

    /// Get a job by ID.
    async fn get(&self, id: FulfillmentJobId) -> Result<Option<FulfillmentJob>, JobStoreError>;

    /// Jobs matching `query`, ordered by `created_at` ascending.
    async fn find_eligible(
        &self,
        query: &EligibleQuery,
    ) -> Result<Vec<FulfillmentJob>, JobStoreError>;

    /// Jobs in `status` (optionally below an attempt bound), oldest first.
    async fn find_by_status(
        &self,
        status: JobStatus,
        attempts_less_than: Option<u32>,
    ) -> Result<Vec<FulfillmentJob>, JobStoreError>;

    /// All jobs belonging to an order, oldest first.
    async fn find_by_order(&self, order_id: OrderId) -> Result<Vec<FulfillmentJob>, JobStoreError>;

    /// Unconditional patch.
    async fn update_by_id(
        &self,
        id: FulfillmentJobId,
        patch: &JobPatch,
    ) -> Result<FulfillmentJob, JobStoreError>;

    /// Compare-and-set: apply `patch` only if `precondition` holds at write time.
    ///
    /// Returns `Ok(None)` when the precondition no longer holds.
    async fn update_if(
        &self,
        id: FulfillmentJobId,
        precondition: Precondition,
        patch: &JobPatch,
    ) -> Result<Option<FulfillmentJob>, JobStoreError>;

    /// Atomically claim a pending job. Exactly one concurrent caller wins.
    async fn claim(
        &self,
        id: FulfillmentJobId,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<FulfillmentJob>, JobStoreError> {
        self.update_if(
            id,
            Precondition::status_below(JobStatus::Pending, max_attempts),
            &JobPatch::claim(now),
        )
        .await
    }

    /// Get job statistics.
    async fn stats(&self) -> Result<JobStats, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(FulfillmentJobId),
    #[error("job already exists: {0}")]
    AlreadyExists(FulfillmentJobId),
    #[error("order item {0} already has a fulfillment job")]
    DuplicateOrderItem(OrderItemId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Job statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobStats {
    pub fn record(&mut self, status: JobStatus) {
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Processing => self.processing += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }
}

impl<'a> FromIterator<&'a FulfillmentJob> for JobStats {
    fn from_iter<T: IntoIterator<Item = &'a FulfillmentJob>>(iter: T) -> Self {
        let mut stats = JobStats::default();
        for job in iter {
            stats.record(job.status);
        }
        stats
    }
}

fn poisoned() -> JobStoreError {
    JobStoreError::Storage("job store lock poisoned".to_string())
}

fn oldest_first(mut jobs: Vec<FulfillmentJob>) -> Vec<FulfillmentJob> {
    jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    jobs
}

/// In-memory job store for tests/dev.
#[derive(Debug)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<FulfillmentJobId, FulfillmentJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Snapshot of every job, oldest first.
    pub fn all(&self) -> Vec<FulfillmentJob> {
        match self.jobs.read() {
            Ok(jobs) => oldest_first(jobs.values().cloned().collect()),
            Err(_) => Vec::new(),
        }
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: FulfillmentJob) -> Result<FulfillmentJobId, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        if jobs.values().any(|j| j.order_item_id == job.order_item_id) {
            return Err(JobStoreError::DuplicateOrderItem(job.order_item_id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    async fn get(&self, id: FulfillmentJobId) -> Result<Option<FulfillmentJob>, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        Ok(jobs.get(&id).cloned())
    }

    async fn find_eligible(
        &self,
        query: &EligibleQuery,
    ) -> Result<Vec<FulfillmentJob>, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        let mut result = oldest_first(jobs.values().filter(|j| query.matches(j)).cloned().collect());
        result.truncate(query.limit);
        Ok(result)
    }

    async fn find_by_status(
        &self,
        status: JobStatus,
        attempts_less_than: Option<u32>,
    ) -> Result<Vec<FulfillmentJob>, JobStoreError> {
        let precondition = Precondition {
            status,
            attempts_less_than,
        };
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        Ok(oldest_first(
            jobs.values().filter(|j| precondition.holds(j)).cloned().collect(),
        ))
    }

    async fn find_by_order(&self, order_id: OrderId) -> Result<Vec<FulfillmentJob>, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        Ok(oldest_first(
            jobs.values().filter(|j| j.order_id == order_id).cloned().collect(),
        ))
    }

    async fn update_by_id(
        &self,
        id: FulfillmentJobId,
        patch: &JobPatch,
    ) -> Result<FulfillmentJob, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        let job = jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        patch.apply_to(job, Utc::now());
        Ok(job.clone())
    }

    async fn update_if(
        &self,
        id: FulfillmentJobId,
        precondition: Precondition,
        patch: &JobPatch,
    ) -> Result<Option<FulfillmentJob>, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        let job = jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        if !precondition.holds(job) {
            return Ok(None);
        }
        patch.apply_to(job, Utc::now());
        Ok(Some(job.clone()))
    }

    async fn stats(&self) -> Result<JobStats, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        Ok(jobs.values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_created(seconds_ago: i64) -> FulfillmentJob {
        FulfillmentJob::new(OrderId::new(), OrderItemId::new())
            .created_at(Utc::now() - chrono::Duration::seconds(seconds_ago))
    }

    #[tokio::test]
    async fn create_and_claim() {
        let store = InMemoryJobStore::new();
        let job_id = store.create(job_created(0)).await.unwrap();

        let claimed = store.claim(job_id, 3, Utc::now()).await.unwrap().unwrap();
        assert_eq!(claimed.id, job_id);
        assert_eq!(claimed.status, JobStatus::Processing);
        assert_eq!(claimed.attempts, 1);
        assert!(claimed.last_attempt_at.is_some());

        // Already claimed
        assert!(store.claim(job_id, 3, Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_refuses_job_at_attempt_cap() {
        let store = InMemoryJobStore::new();
        let mut job = job_created(0);
        job.attempts = 3;
        let job_id = store.create(job).await.unwrap();

        assert!(store.claim(job_id, 3, Utc::now()).await.unwrap().is_none());
        let stored = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.attempts, 3);
    }

    #[tokio::test]
    async fn one_job_per_order_item() {
        let store = InMemoryJobStore::new();
        let first = job_created(0);
        let duplicate = FulfillmentJob::new(first.order_id, first.order_item_id);
        store.create(first).await.unwrap();

        assert!(matches!(
            store.create(duplicate).await,
            Err(JobStoreError::DuplicateOrderItem(_))
        ));
    }

    #[tokio::test]
    async fn find_eligible_is_fifo_and_limited() {
        let store = InMemoryJobStore::new();
        let newest = store.create(job_created(10)).await.unwrap();
        let oldest = store.create(job_created(30)).await.unwrap();
        let middle = store.create(job_created(20)).await.unwrap();

        let query = EligibleQuery::pending(3, 2, Utc::now());
        let found: Vec<_> = store
            .find_eligible(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(found, vec![oldest, middle]);
        assert!(!found.contains(&newest));
    }

    #[tokio::test]
    async fn find_eligible_skips_backoff_and_exhausted_jobs() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();

        let mut waiting = job_created(30);
        waiting.attempts = 1;
        waiting.next_retry_at = Some(now + chrono::Duration::seconds(60));
        store.create(waiting).await.unwrap();

        let mut exhausted = job_created(20);
        exhausted.attempts = 3;
        store.create(exhausted).await.unwrap();

        let mut failed = job_created(15);
        failed.attempts = 1;
        failed.status = JobStatus::Failed;
        store.create(failed).await.unwrap();

        let ready = store.create(job_created(10)).await.unwrap();

        let found = store
            .find_eligible(&EligibleQuery::pending(3, 10, now))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, ready);
    }

    #[tokio::test]
    async fn patch_clears_nullable_fields() {
        let store = InMemoryJobStore::new();
        let job_id = store.create(job_created(0)).await.unwrap();
        let now = Utc::now();

        store
            .update_by_id(job_id, &JobPatch::fail("provider down", now))
            .await
            .unwrap();
        let failed = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(failed.error_message.as_deref(), Some("provider down"));
        assert_eq!(failed.failed_at, Some(now));

        let reset = store
            .update_if(job_id, Precondition::status(JobStatus::Failed), &JobPatch::reset())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reset.status, JobStatus::Pending);
        assert_eq!(reset.error_message, None);
    }

    #[tokio::test]
    async fn update_unknown_job_is_not_found() {
        let store = InMemoryJobStore::new();
        let id = FulfillmentJobId::new();
        assert!(matches!(
            store.update_by_id(id, &JobPatch::reset()).await,
            Err(JobStoreError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn stats_tracking() {
        let store = InMemoryJobStore::new();
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(store.create(job_created(i)).await.unwrap());
        }

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.pending, 5);

        store.claim(ids[0], 3, Utc::now()).await.unwrap();
        store.claim(ids[1], 3, Utc::now()).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.pending, 3);
        assert_eq!(stats.processing, 2);
        assert_eq!(stats.total(), 5);
    }
}
