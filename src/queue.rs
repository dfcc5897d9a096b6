//! The job queue: accepts submissions and drives a bounded pool of workers
//! that claim, execute, and finalize jobs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::backend::AnalysisBackend;
use crate::config::QueueConfig;
use crate::error::{Error, Result};
use crate::job::{JobId, JobOutcome, JobPayload, JobRecord, WebhookTarget};
use crate::store::JobStore;
use crate::webhook::{WebhookDispatcher, WebhookEvent};

/// Producer/consumer queue over a [`JobStore`].
///
/// Submission never blocks on execution: `submit` writes a pending record and
/// returns. A fixed number of worker slots continuously claim pending
/// records, run the analysis backend with bounded exponential-backoff
/// retries, finalize the store, and hand terminal events to the webhook
/// dispatcher.
pub struct JobQueue<S, B> {
    store: Arc<S>,
    backend: Arc<B>,
    dispatcher: Arc<WebhookDispatcher>,
    config: QueueConfig,
    shutdown: CancellationToken,
    jobs_in_flight: Arc<AtomicUsize>,
    webhook_tasks: TaskTracker,
}

impl<S, B> JobQueue<S, B>
where
    S: JobStore + 'static,
    B: AnalysisBackend + 'static,
{
    pub fn new(
        store: Arc<S>,
        backend: Arc<B>,
        dispatcher: Arc<WebhookDispatcher>,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            backend,
            dispatcher,
            config,
            shutdown: CancellationToken::new(),
            jobs_in_flight: Arc::new(AtomicUsize::new(0)),
            webhook_tasks: TaskTracker::new(),
        }
    }

    /// The underlying store, for status queries alongside a running queue.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Number of jobs currently being executed by worker slots.
    pub fn jobs_in_flight(&self) -> usize {
        self.jobs_in_flight.load(Ordering::Relaxed)
    }

    /// Create a pending job and make it visible for claiming.
    ///
    /// Returns the fresh job id immediately; execution happens on the worker
    /// pool. Safe to call concurrently from any number of request handlers.
    pub async fn submit(
        &self,
        payload: JobPayload,
        webhook: Option<WebhookTarget>,
    ) -> Result<JobId> {
        let id = JobId::new();
        self.store.create(id, payload, webhook).await?;
        tracing::info!(job_id = %id, "Job submitted");
        Ok(id)
    }

    /// Snapshot a job's record, failing with `NotFound` for unknown ids.
    pub async fn status(&self, id: JobId) -> Result<JobRecord> {
        self.store.get(id).await?.ok_or(Error::NotFound(id))
    }

    /// Spawn the worker pool.
    ///
    /// The returned handle resolves once every slot has exited and any
    /// webhook deliveries still in flight have finished, which happens after
    /// [`shutdown`](Self::shutdown) is called and in-flight jobs have
    /// finished.
    pub fn run(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(workers = self.config.worker_count, "Job queue starting");

            let mut join_set = JoinSet::new();
            for slot in 0..self.config.worker_count {
                let queue = self.clone();
                join_set.spawn(async move { queue.worker_loop(slot).await });
            }

            while let Some(result) = join_set.join_next().await {
                if let Err(join_error) = result {
                    tracing::error!(error = %join_error, "Worker slot panicked");
                }
            }

            // Workers are done, so no new deliveries will be spawned; let the
            // ones still in flight finish before the handle resolves.
            self.webhook_tasks.close();
            self.webhook_tasks.wait().await;
            tracing::info!("Job queue stopped");
        })
    }

    /// Stop accepting new claims. In-flight jobs run to completion.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn worker_loop(&self, slot: usize) {
        tracing::debug!(slot, "Worker slot started");

        while !self.shutdown.is_cancelled() {
            match self.store.claim_next().await {
                Ok(Some(record)) => self.execute(record).await,
                Ok(None) => {
                    // Nothing pending; idle until the next poll or shutdown.
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.claim_interval) => {}
                        _ = self.shutdown.cancelled() => {}
                    }
                }
                Err(e) => {
                    tracing::error!(slot, error = %e, "Failed to claim next job");
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.claim_interval) => {}
                        _ = self.shutdown.cancelled() => {}
                    }
                }
            }
        }

        tracing::debug!(slot, "Worker slot exiting");
    }

    /// Run one claimed job to its terminal state.
    async fn execute(&self, record: JobRecord) {
        self.jobs_in_flight.fetch_add(1, Ordering::Relaxed);
        let in_flight = self.jobs_in_flight.clone();
        let _guard = scopeguard::guard((), move |_| {
            in_flight.fetch_sub(1, Ordering::Relaxed);
        });

        let id = record.id;
        tracing::info!(job_id = %id, filename = %record.payload.filename, "Processing job");

        let mut last_error = String::new();
        let mut outcome = None;

        for attempt in 0..self.config.max_attempts {
            match self.backend.analyze(&record.payload).await {
                Ok(result) => {
                    outcome = Some(JobOutcome::Completed(result));
                    break;
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(job_id = %id, attempt, error = %e, "Analysis attempt failed");

                    if attempt + 1 < self.config.max_attempts {
                        // Exponential backoff: base * 2^attempt, clamped so a
                        // large attempt count can neither overflow nor stall
                        // the slot for hours.
                        let backoff = self
                            .config
                            .retry_base_delay
                            .saturating_mul(2u32.saturating_pow(attempt))
                            .min(self.config.max_retry_delay);
                        tracing::debug!(
                            job_id = %id,
                            attempt = attempt + 1,
                            backoff_ms = backoff.as_millis() as u64,
                            "Backing off before retrying analysis"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        let outcome = outcome.unwrap_or_else(|| {
            tracing::warn!(
                job_id = %id,
                max_attempts = self.config.max_attempts,
                "Analysis attempts exhausted, failing job"
            );
            JobOutcome::Failed(last_error)
        });

        match self.store.finalize(id, outcome).await {
            Ok(finalized) => {
                tracing::info!(job_id = %id, status = %finalized.status, "Job finalized");
                self.notify(finalized);
            }
            Err(e @ Error::InvalidTransition { .. }) => {
                // Only the claiming worker finalizes, exactly once, so this
                // cannot happen unless the queue itself is broken.
                tracing::error!(job_id = %id, error = %e, "Finalize rejected: queue invariant violated");
                debug_assert!(false, "finalize rejected: {e}");
            }
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "Failed to finalize job");
            }
        }
    }

    /// Hand a terminal record to the webhook dispatcher, if a subscriber was
    /// registered. Delivery runs on its own tracked task and its outcome
    /// never touches the store; shutdown waits for deliveries already in
    /// flight.
    fn notify(&self, record: JobRecord) {
        let Some(target) = record.webhook.clone() else {
            return;
        };

        let dispatcher = self.dispatcher.clone();
        self.webhook_tasks.spawn(async move {
            let event = WebhookEvent::job_terminal(&record);
            dispatcher
                .deliver(&target.url, &event, target.secret.as_deref())
                .await;
        });
    }
}
