//! PostgreSQL-backed job store for deployments where jobs must survive a
//! restart.
//!
//! Claiming uses `FOR UPDATE SKIP LOCKED`, so any number of worker processes
//! can poll the same table and each pending row is handed to exactly one of
//! them.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::error::{Error, Result};
use crate::job::{
    JobId, JobOutcome, JobPayload, JobRecord, JobStatus, WebhookTarget,
};

use super::JobStore;

const JOB_COLUMNS: &str = "id, status, filename, content, options, webhook_url, \
     webhook_secret, result, error, created_at, completed_at";

/// Durable [`JobStore`] over a PostgreSQL pool.
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the jobs table and claim index if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id UUID PRIMARY KEY,
                status TEXT NOT NULL,
                filename TEXT NOT NULL,
                content BYTEA NOT NULL,
                options JSONB NOT NULL DEFAULT '{}'::jsonb,
                webhook_url TEXT,
                webhook_secret TEXT,
                result JSONB,
                error TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS jobs_pending_idx \
             ON jobs (created_at) WHERE status = 'pending'",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<JobRecord> {
        let status: String = row.try_get("status").map_err(Error::Database)?;
        let status: JobStatus = status
            .parse()
            .map_err(|e: String| Error::Other(anyhow!(e)))?;

        let content: Vec<u8> = row.try_get("content").map_err(Error::Database)?;
        let options: serde_json::Value = row.try_get("options").map_err(Error::Database)?;

        let webhook_url: Option<String> = row.try_get("webhook_url").map_err(Error::Database)?;
        let webhook_secret: Option<String> =
            row.try_get("webhook_secret").map_err(Error::Database)?;
        let webhook = webhook_url.map(|url| WebhookTarget {
            url,
            secret: webhook_secret,
        });

        let result: Option<serde_json::Value> = row.try_get("result").map_err(Error::Database)?;
        let result = result.map(serde_json::from_value).transpose()?;

        Ok(JobRecord {
            id: JobId::from(row.try_get::<uuid::Uuid, _>("id").map_err(Error::Database)?),
            status,
            payload: JobPayload {
                filename: row.try_get("filename").map_err(Error::Database)?,
                content: content.into(),
                options,
            },
            result,
            error: row.try_get("error").map_err(Error::Database)?,
            webhook,
            created_at: row
                .try_get::<DateTime<Utc>, _>("created_at")
                .map_err(Error::Database)?,
            completed_at: row
                .try_get::<Option<DateTime<Utc>>, _>("completed_at")
                .map_err(Error::Database)?,
        })
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn create(
        &self,
        id: JobId,
        payload: JobPayload,
        webhook: Option<WebhookTarget>,
    ) -> Result<JobRecord> {
        let created_at = Utc::now();
        let (webhook_url, webhook_secret) = match &webhook {
            Some(target) => (Some(target.url.clone()), target.secret.clone()),
            None => (None, None),
        };

        let inserted = sqlx::query(
            "INSERT INTO jobs (id, status, filename, content, options, \
             webhook_url, webhook_secret, created_at) \
             VALUES ($1, 'pending', $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(id.as_uuid())
        .bind(&payload.filename)
        .bind(payload.content.as_ref())
        .bind(&payload.options)
        .bind(&webhook_url)
        .bind(&webhook_secret)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(Error::DuplicateId(id));
        }

        Ok(JobRecord {
            id,
            status: JobStatus::Pending,
            payload,
            result: None,
            error: None,
            webhook,
            created_at,
            completed_at: None,
        })
    }

    async fn claim_next(&self) -> Result<Option<JobRecord>> {
        let row = sqlx::query(&format!(
            "UPDATE jobs SET status = 'processing' \
             WHERE id = ( \
                 SELECT id FROM jobs WHERE status = 'pending' \
                 ORDER BY created_at \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {JOB_COLUMNS}"
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn finalize(&self, id: JobId, outcome: JobOutcome) -> Result<JobRecord> {
        let (status, result, error) = match outcome {
            JobOutcome::Completed(result) => (
                JobStatus::Completed,
                Some(serde_json::to_value(result)?),
                None,
            ),
            JobOutcome::Failed(error) => (JobStatus::Failed, None, Some(error)),
        };

        let row = sqlx::query(&format!(
            "UPDATE jobs SET status = $2, result = $3, error = $4, completed_at = $5 \
             WHERE id = $1 AND status = 'processing' \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(status.to_string())
        .bind(&result)
        .bind(&error)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::record_from_row(&row),
            None => {
                // Distinguish a missing record from a wrong-state one, purely
                // for the error message.
                let current: Option<String> =
                    sqlx::query_scalar("SELECT status FROM jobs WHERE id = $1")
                        .bind(id.as_uuid())
                        .fetch_optional(&self.pool)
                        .await?;
                Err(Error::InvalidTransition {
                    id,
                    from: current.unwrap_or_else(|| "missing".to_string()),
                })
            }
        }
    }

    async fn get(&self, id: JobId) -> Result<Option<JobRecord>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::record_from_row).transpose()
    }
}
