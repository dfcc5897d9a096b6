//! Job records and the document-analysis result shapes they carry.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a job, assigned at submission and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for JobId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job_{}", self.0.simple())
    }
}

/// Lifecycle state of a job.
///
/// Transitions are monotonic: `Pending -> Processing -> {Completed | Failed}`.
/// There is no transition out of a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether the job has reached `Completed` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown job status: {}", s)),
        }
    }
}

/// Risk severity reported by the analysis backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Critical,
    Warning,
    Normal,
}

/// Risk category reported by the analysis backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskCategory {
    Legal,
    Financial,
    Compliance,
    Operational,
    None,
}

impl Default for RiskCategory {
    fn default() -> Self {
        Self::None
    }
}

/// The opaque input a job carries: document bytes plus submission metadata.
///
/// `content` is [`Bytes`] so claimed records and read snapshots share the
/// underlying buffer instead of copying the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub filename: String,
    pub content: Bytes,
    /// Analysis options (include_chunks, include_embeddings, ...), passed
    /// through to the backend untouched.
    #[serde(default)]
    pub options: serde_json::Value,
}

impl JobPayload {
    pub fn new(filename: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
            options: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }
}

/// Subscriber to notify when the job reaches a terminal state.
///
/// Read-only after job creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookTarget {
    pub url: String,
    pub secret: Option<String>,
}

/// Structured output of a completed analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub document_id: String,
    pub filename: String,
    pub risk_level: RiskLevel,
    pub risk_category: RiskCategory,
    /// Confidence in the risk assessment, 0-100.
    pub risk_confidence: u8,
    pub risk_explanation: String,
    pub recommendations: Vec<String>,
    pub num_pages: u32,
    pub num_chunks: u32,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Terminal outcome handed to [`JobStore::finalize`](crate::store::JobStore::finalize).
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed(AnalysisResult),
    Failed(String),
}

/// A tracked job, from submission to terminal outcome.
///
/// Exactly one of `result`/`error` is set once the job reaches a terminal
/// state, and only then.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub payload: JobPayload,
    pub result: Option<AnalysisResult>,
    pub error: Option<String>,
    pub webhook: Option<WebhookTarget>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
