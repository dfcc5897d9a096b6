//! Error types for the job queue and webhook subsystems.

use thiserror::Error;

use crate::backend::BackendError;
use crate::job::JobId;

#[derive(Error, Debug)]
pub enum Error {
    /// A job with this id already exists. Fatal to the submission that raised it.
    #[error("job {0} already exists")]
    DuplicateId(JobId),

    /// A finalize was attempted on a record that is not currently processing
    /// (or does not exist at all, in which case `from` is "missing").
    ///
    /// This indicates a queue bug, not a caller error: only the worker that
    /// claimed a job may finalize it, and only once.
    #[error("job {id} cannot be finalized from {from}")]
    InvalidTransition { id: JobId, from: String },

    /// Query for a job id that was never created.
    #[error("job {0} not found")]
    NotFound(JobId),

    /// The external analysis backend failed or returned a malformed payload.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Durable store error.
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Unexpected error with full context chain.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Type alias for fallible operations in this crate.
pub type Result<T> = std::result::Result<T, Error>;
