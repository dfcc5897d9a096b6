//! Job storage: the single shared mutable structure in the system.
//!
//! The [`JobStore`] trait provides atomic operations for the job lifecycle.
//! Two interchangeable implementations exist: [`InMemoryJobStore`] for
//! ephemeral single-process deployments, and `PostgresJobStore` (behind the
//! `postgres` feature) when jobs must survive a restart. The queue is generic
//! over the trait, so the choice is made once at startup.

use async_trait::async_trait;

use crate::error::Result;
use crate::job::{JobId, JobOutcome, JobPayload, JobRecord, WebhookTarget};

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::InMemoryJobStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresJobStore;

/// Storage contract for job records.
///
/// Implementations must make every mutation atomic with respect to
/// concurrent callers; in particular `claim_next` hands each pending record
/// to at most one claimant.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new `Pending` record.
    ///
    /// Fails with [`Error::DuplicateId`](crate::Error::DuplicateId) if `id`
    /// already exists.
    async fn create(
        &self,
        id: JobId,
        payload: JobPayload,
        webhook: Option<WebhookTarget>,
    ) -> Result<JobRecord>;

    /// Atomically select one `Pending` record, transition it to `Processing`,
    /// and return it. Returns `None` when no pending record exists.
    async fn claim_next(&self) -> Result<Option<JobRecord>>;

    /// Transition a `Processing` record to its terminal state, recording the
    /// result or error and the completion timestamp. Returns the terminal
    /// snapshot.
    ///
    /// Fails with [`Error::InvalidTransition`](crate::Error::InvalidTransition)
    /// if the record does not exist or is not currently `Processing`.
    async fn finalize(&self, id: JobId, outcome: JobOutcome) -> Result<JobRecord>;

    /// Read-only snapshot of a record.
    async fn get(&self, id: JobId) -> Result<Option<JobRecord>>;
}
