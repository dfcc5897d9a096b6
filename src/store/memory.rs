//! In-memory job store: a mutex-guarded map plus a FIFO claim queue.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::job::{JobId, JobOutcome, JobPayload, JobRecord, JobStatus, WebhookTarget};

use super::JobStore;

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, JobRecord>,
    /// Ids awaiting a claimant, oldest first. Entries are lazily skipped if
    /// the job has already left `Pending` by the time they surface.
    pending: VecDeque<JobId>,
}

/// Ephemeral [`JobStore`] backed by process memory.
///
/// All operations take one short-lived lock, which is what makes `claim_next`
/// atomic: a pending id is popped and flipped to `Processing` before any
/// other claimant can observe it.
#[derive(Default)]
pub struct InMemoryJobStore {
    inner: Mutex<Inner>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(
        &self,
        id: JobId,
        payload: JobPayload,
        webhook: Option<WebhookTarget>,
    ) -> Result<JobRecord> {
        let mut inner = self.inner.lock();
        if inner.jobs.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }

        let record = JobRecord {
            id,
            status: JobStatus::Pending,
            payload,
            result: None,
            error: None,
            webhook,
            created_at: Utc::now(),
            completed_at: None,
        };
        inner.jobs.insert(id, record.clone());
        inner.pending.push_back(id);
        Ok(record)
    }

    async fn claim_next(&self) -> Result<Option<JobRecord>> {
        let mut inner = self.inner.lock();
        while let Some(id) = inner.pending.pop_front() {
            if let Some(record) = inner.jobs.get_mut(&id) {
                if record.status == JobStatus::Pending {
                    record.status = JobStatus::Processing;
                    return Ok(Some(record.clone()));
                }
            }
        }
        Ok(None)
    }

    async fn finalize(&self, id: JobId, outcome: JobOutcome) -> Result<JobRecord> {
        let mut inner = self.inner.lock();
        let record = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| Error::InvalidTransition {
                id,
                from: "missing".to_string(),
            })?;

        if record.status != JobStatus::Processing {
            return Err(Error::InvalidTransition {
                id,
                from: record.status.to_string(),
            });
        }

        match outcome {
            JobOutcome::Completed(result) => {
                record.status = JobStatus::Completed;
                record.result = Some(result);
            }
            JobOutcome::Failed(error) => {
                record.status = JobStatus::Failed;
                record.error = Some(error);
            }
        }
        record.completed_at = Some(Utc::now());
        Ok(record.clone())
    }

    async fn get(&self, id: JobId) -> Result<Option<JobRecord>> {
        Ok(self.inner.lock().jobs.get(&id).cloned())
    }
}
