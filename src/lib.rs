//! Asynchronous document-analysis job queue with signed webhook delivery.
//!
//! A caller submits a document for risk analysis and gets a job id back
//! immediately. A bounded pool of workers claims pending jobs, calls the
//! external analysis backend with retries, and records the terminal outcome.
//! Subscribers are notified of that outcome via HMAC-signed HTTP callbacks.
//!
//! ```text
//! submit ──► JobStore (pending) ──► worker claims ──► analysis backend
//!                                        │
//!                            finalize (completed | failed)
//!                                        │
//!                              WebhookDispatcher ──► subscriber
//! ```
//!
//! The store is pluggable: [`store::InMemoryJobStore`] for single-process
//! deployments, `store::PostgresJobStore` (behind the `postgres` feature)
//! when jobs must survive a restart.
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use aegis_jobs::{
//!     backend::HttpAnalysisBackend,
//!     config::{BackendConfig, QueueConfig, WebhookConfig},
//!     job::JobPayload,
//!     queue::JobQueue,
//!     store::InMemoryJobStore,
//!     webhook::WebhookDispatcher,
//! };
//!
//! let queue = Arc::new(JobQueue::new(
//!     Arc::new(InMemoryJobStore::new()),
//!     Arc::new(HttpAnalysisBackend::new(&BackendConfig::default())),
//!     Arc::new(WebhookDispatcher::new(WebhookConfig::default())),
//!     QueueConfig::default(),
//! ));
//! let handle = queue.clone().run();
//!
//! let job_id = queue
//!     .submit(JobPayload::new("contract.pdf", document_bytes), None)
//!     .await?;
//!
//! // ... poll queue.status(job_id) until terminal ...
//!
//! queue.shutdown();
//! handle.await?;
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod job;
pub mod queue;
pub mod store;
pub mod webhook;

pub use backend::{AnalysisBackend, BackendError, HttpAnalysisBackend, MockAnalysisBackend};
pub use config::{BackendConfig, QueueConfig, WebhookConfig};
pub use error::{Error, Result};
pub use job::{
    AnalysisResult, JobId, JobOutcome, JobPayload, JobRecord, JobStatus, RiskCategory, RiskLevel,
    WebhookTarget,
};
pub use queue::JobQueue;
pub use store::{InMemoryJobStore, JobStore};
#[cfg(feature = "postgres")]
pub use store::PostgresJobStore;
pub use webhook::{WebhookDispatcher, WebhookEvent, WebhookEventType};
