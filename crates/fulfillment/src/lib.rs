//! Fulfillment queue: turns placed orders into provider print orders.
//!
//! ## Flow
//!
//! 1. `JobIntake` creates one `pending` job per order item
//! 2. `QueueProcessor` sweeps on a timer, claims eligible jobs oldest first
//! 3. `ProviderRouter` resolves item -> variant -> product -> provider and submits
//! 4. On success the item moves to `processing` and `StatusPropagator`
//!    advances the order once all of its items have
//! 5. On failure the job is retried until `RetryPolicy::max_attempts`, then
//!    parked as `failed` for `RecoveryController`
//!
//! ## Components
//!
//! - `JobStore`: persistence with atomic conditional updates
//! - `collaborators`: order, order item and catalog stores owned elsewhere
//! - `next_transition`: pure attempt accounting

pub mod collaborators;
pub mod config;
pub mod intake;
pub mod processor;
pub mod propagator;
pub mod recovery;
pub mod router;
pub mod store;
pub mod summary;
pub mod types;

pub use collaborators::{
    CatalogStore, CollaboratorError, InMemoryCatalog, InMemoryOrderBook, ItemStatusUpdate,
    OrderItemStore, OrderStore,
};
pub use config::{ConfigError, QueueConfig};
pub use intake::{IntakeError, JobIntake};
pub use processor::{ProcessorStats, QueueProcessor, SweepError, SweepReport, SweepSummary};
pub use propagator::{PropagationError, PropagationOutcome, StatusPropagator};
pub use recovery::{RecoveryController, RecoveryError, RecoveryReport};
pub use router::{
    Dispatch, PrintProviderClient, ProviderRouter, ProviderSubmission, ResolvedRoute,
    RoutingError, SimulatedPrintProvider, SubmissionError,
};
pub use store::{
    EligibleQuery, InMemoryJobStore, JobPatch, JobStats, JobStore, JobStoreError, Precondition,
};
pub use summary::{FulfillmentSummary, SummaryError};
pub use types::{
    BackoffStrategy, FulfillmentJob, JobStatus, RetryPolicy, Transition,
    next_transition,
};
