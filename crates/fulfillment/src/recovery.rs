//! Manual recovery of failed jobs.
//!
//! Automatic retries live in the processor. This is the administrative
//! escape hatch: failed jobs that still have attempts left go back to
//! `pending` with their error cleared, while the attempt counter is left
//! alone. A job that used every attempt stays failed.

use std::sync::Arc;

use tracing::{info, warn};

use printforge_core::FulfillmentJobId;

use crate::store::{JobPatch, JobStore, JobStoreError, Precondition};
use crate::types::{FulfillmentJob, JobStatus, RetryPolicy};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub reset: Vec<FulfillmentJobId>,
    /// Changed state between the query and the reset
    pub skipped: usize,
}

impl RecoveryReport {
    pub fn reset_count(&self) -> usize {
        self.reset.len()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RecoveryError {
    #[error("job not found: {0}")]
    NotFound(FulfillmentJobId),
    #[error("job {id} is {status:?}, only failed jobs can be requeued")]
    NotFailed { id: FulfillmentJobId, status: JobStatus },
    #[error("job {id} has used all {attempts} attempts")]
    AttemptsExhausted { id: FulfillmentJobId, attempts: u32 },
    #[error(transparent)]
    Store(#[from] JobStoreError),
}

pub struct RecoveryController {
    store: Arc<dyn JobStore>,
    policy: RetryPolicy,
}

impl RecoveryController {
    pub fn new(store: Arc<dyn JobStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    fn reset_precondition(&self) -> Precondition {
        Precondition::status_below(JobStatus::Failed, self.policy.max_attempts)
    }

    /// Re-admit every failed job below the attempt cap.
    pub async fn reset_failed(&self) -> Result<RecoveryReport, JobStoreError> {
        let candidates = self
            .store
            .find_by_status(JobStatus::Failed, Some(self.policy.max_attempts))
            .await?;

        let mut report = RecoveryReport::default();
        for job in candidates {
            match self
                .store
                .update_if(job.id, self.reset_precondition(), &JobPatch::reset())
                .await?
            {
                Some(reset) => report.reset.push(reset.id),
                None => report.skipped += 1,
            }
        }

        info!(
            reset = report.reset_count(),
            skipped = report.skipped,
            "Reset failed fulfillment jobs to pending"
        );
        Ok(report)
    }

    /// Re-admit one failed job.
    pub async fn requeue(&self, id: FulfillmentJobId) -> Result<FulfillmentJob, RecoveryError> {
        let job = self
            .store
            .get(id)
            .await?
            .ok_or(RecoveryError::NotFound(id))?;
        check_requeueable(&job, self.policy.max_attempts)?;

        match self
            .store
            .update_if(id, self.reset_precondition(), &JobPatch::reset())
            .await?
        {
            Some(reset) => {
                info!(job_id = %id, attempts = reset.attempts, "Requeued fulfillment job");
                Ok(reset)
            }
            None => {
                // Lost a race; report against the state that won.
                let current = self
                    .store
                    .get(id)
                    .await?
                    .ok_or(RecoveryError::NotFound(id))?;
                warn!(job_id = %id, status = ?current.status, "Job changed before requeue");
                check_requeueable(&current, self.policy.max_attempts)?;
                Err(RecoveryError::NotFailed {
                    id,
                    status: current.status,
                })
            }
        }
    }
}

fn check_requeueable(job: &FulfillmentJob, max_attempts: u32) -> Result<(), RecoveryError> {
    if job.status != JobStatus::Failed {
        return Err(RecoveryError::NotFailed {
            id: job.id,
            status: job.status,
        });
    }
    if job.attempts >= max_attempts {
        return Err(RecoveryError::AttemptsExhausted {
            id: job.id,
            attempts: job.attempts,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryJobStore;
    use chrono::Utc;
    use printforge_core::{OrderId, OrderItemId};

    async fn failed_job(store: &InMemoryJobStore, attempts: u32) -> FulfillmentJobId {
        let mut job = FulfillmentJob::new(OrderId::new(), OrderItemId::new());
        job.attempts = attempts;
        let id = store.create(job).await.unwrap();
        store
            .update_by_id(id, &JobPatch::fail("provider rejected order", Utc::now()))
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn reset_skips_jobs_at_the_cap() {
        let store = InMemoryJobStore::arc();
        let recoverable = failed_job(&store, 2).await;
        let exhausted = failed_job(&store, 3).await;
        let controller = RecoveryController::new(store.clone(), RetryPolicy::default());

        let report = controller.reset_failed().await.unwrap();
        assert_eq!(report.reset, vec![recoverable]);

        let job = store.get(recoverable).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 2);
        assert_eq!(job.error_message, None);

        let job = store.get(exhausted).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.is_some());
    }

    #[tokio::test]
    async fn reset_with_nothing_failed_is_empty() {
        let store = InMemoryJobStore::arc();
        store
            .create(FulfillmentJob::new(OrderId::new(), OrderItemId::new()))
            .await
            .unwrap();
        let controller = RecoveryController::new(store, RetryPolicy::default());
        assert_eq!(controller.reset_failed().await.unwrap(), RecoveryReport::default());
    }

    #[tokio::test]
    async fn requeue_single_job() {
        let store = InMemoryJobStore::arc();
        let id = failed_job(&store, 1).await;
        let controller = RecoveryController::new(store, RetryPolicy::default());

        let job = controller.requeue(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 1);

        assert!(matches!(
            controller.requeue(id).await,
            Err(RecoveryError::NotFailed { status: JobStatus::Pending, .. })
        ));
    }

    #[tokio::test]
    async fn requeue_refuses_exhausted_and_unknown_jobs() {
        let store = InMemoryJobStore::arc();
        let id = failed_job(&store, 3).await;
        let controller = RecoveryController::new(store, RetryPolicy::default());

        assert!(matches!(
            controller.requeue(id).await,
            Err(RecoveryError::AttemptsExhausted { attempts: 3, .. })
        ));
        assert!(matches!(
            controller.requeue(FulfillmentJobId::new()).await,
            Err(RecoveryError::NotFound(_))
        ));
    }
}
