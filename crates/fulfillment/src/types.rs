//! Core job types and policies.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use printforge_core::{Entity, FulfillmentJobId, OrderId, OrderItemId, PrintProviderId};

/// Job execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting to be claimed by a sweep
    Pending,
    /// Claimed; a provider submission is in flight
    Processing,
    /// Provider accepted the print order
    Completed,
    /// Attempts exhausted; only manual recovery moves it again
    Failed,
}

impl JobStatus {
    /// No automatic transition leaves these states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Linear backoff: base * attempt
    Linear,
    /// Exponential backoff: base * 2^(attempt - 1)
    #[default]
    Exponential,
}

/// Retry policy configuration.
///
/// With a zero `base_delay` a failed job is eligible again on the very next
/// sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of processing attempts, the first one included
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    /// Backoff strategy
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::from_secs(300),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    /// Create a policy that retries on the next sweep.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Create a policy with exponential backoff.
    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Calculate delay after a given failed attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.base_delay.is_zero() {
            return Duration::ZERO;
        }

        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
            BackoffStrategy::Exponential => {
                let factor = 1u32 << (attempt - 1).min(16);
                self.base_delay.saturating_mul(factor)
            }
        };

        delay.min(self.max_delay)
    }

    /// Check if another attempt is allowed after `attempts` have been made.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Where a processed job goes next, carrying the attempt's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition<T, E> {
    /// `processing -> completed`
    Complete(T),
    /// `processing -> pending`, optionally not before `not_before`
    Retry {
        error: E,
        not_before: Option<DateTime<Utc>>,
    },
    /// `processing -> failed`
    Exhaust(E),
}

impl<T, E> Transition<T, E> {
    pub fn target_status(&self) -> JobStatus {
        match self {
            Transition::Complete(_) => JobStatus::Completed,
            Transition::Retry { .. } => JobStatus::Pending,
            Transition::Exhaust(_) => JobStatus::Failed,
        }
    }
}

/// Decide the next state of a job from the result of its latest attempt.
///
/// `attempts` is the counter *after* the claim incremented it.
pub fn next_transition<T, E>(
    policy: &RetryPolicy,
    attempts: u32,
    outcome: Result<T, E>,
    now: DateTime<Utc>,
) -> Transition<T, E> {
    match outcome {
        Ok(value) => Transition::Complete(value),
        Err(error) if policy.should_retry(attempts) => {
            let delay = policy.delay_for_attempt(attempts);
            let not_before = if delay.is_zero() {
                None
            } else {
                chrono::Duration::from_std(delay).ok().map(|d| now + d)
            };
            Transition::Retry { error, not_before }
        }
        Err(error) => Transition::Exhaust(error),
    }
}

/// Unit of work: get one order line printed by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentJob {
    pub id: FulfillmentJobId,
    pub order_id: OrderId,
    pub order_item_id: OrderItemId,
    pub status: JobStatus,
    /// Processing attempts made so far (starts at 0)
    pub attempts: u32,
    /// Set once the job has been dispatched to a provider
    pub print_provider_id: Option<PrintProviderId>,
    /// External reference; present iff `status == Completed`
    pub provider_order_id: Option<String>,
    pub estimated_ship_date: Option<DateTime<Utc>>,
    /// Last failure reason
    pub error_message: Option<String>,
    /// Earliest time a retry may be claimed (backoff)
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl FulfillmentJob {
    /// Create a new pending job for an order line.
    pub fn new(order_id: OrderId, order_item_id: OrderItemId) -> Self {
        let now = Utc::now();
        Self {
            id: FulfillmentJobId::new(),
            order_id,
            order_item_id,
            status: JobStatus::Pending,
            attempts: 0,
            print_provider_id: None,
            provider_order_id: None,
            estimated_ship_date: None,
            error_message: None,
            next_retry_at: None,
            created_at: now,
            last_attempt_at: None,
            completed_at: None,
            failed_at: None,
            updated_at: now,
        }
    }

    /// Override the creation time (imports, deterministic tests).
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self.updated_at = at;
        self
    }

    /// Whether a sweep at `now` may claim this job.
    pub fn is_eligible(&self, max_attempts: u32, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending
            && self.attempts < max_attempts
            && self.next_retry_at.is_none_or(|at| at <= now)
    }
}

impl Entity for FulfillmentJob {
    type Id = FulfillmentJobId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
