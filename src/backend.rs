//! The external analysis backend: the service that actually inspects a
//! document and assigns it a risk assessment.
//!
//! The queue only ever talks to the backend through the [`AnalysisBackend`]
//! trait, so tests can swap in [`MockAnalysisBackend`] and the production
//! wiring uses [`HttpAnalysisBackend`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use thiserror::Error;

use crate::config::BackendConfig;
use crate::job::{AnalysisResult, JobPayload, RiskCategory, RiskLevel};

/// Failure raised by a single backend call. The queue's execution retry
/// policy observes these; after retries exhaust, `to_string()` becomes the
/// job's terminal error.
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    /// The backend answered with anything other than 200.
    #[error("analysis backend returned HTTP {code}: {detail}")]
    Status { code: u16, detail: String },

    /// The call never produced a response (connect failure, timeout, ...).
    #[error("analysis backend unreachable: {0}")]
    Transport(String),

    /// The backend answered 200 but the body did not parse.
    #[error("analysis backend returned a malformed body: {0}")]
    MalformedResponse(String),
}

/// A document-analysis backend.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Submit the document for analysis and map the backend's answer into an
    /// [`AnalysisResult`].
    async fn analyze(&self, payload: &JobPayload) -> Result<AnalysisResult, BackendError>;
}

/// Shape of the backend's upload response.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    document: DocumentEnvelope,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentEnvelope {
    id: String,
    filename: String,
    risk_level: RiskLevel,
    #[serde(default)]
    risk_category: RiskCategory,
    #[serde(default)]
    risk_confidence: u8,
    #[serde(default)]
    risk_explanation: String,
    #[serde(default)]
    recommendations: Vec<String>,
    num_pages: u32,
    num_chunks: u32,
}

impl From<DocumentEnvelope> for AnalysisResult {
    fn from(doc: DocumentEnvelope) -> Self {
        AnalysisResult {
            document_id: doc.id,
            filename: doc.filename,
            risk_level: doc.risk_level,
            risk_category: doc.risk_category,
            risk_confidence: doc.risk_confidence,
            risk_explanation: doc.risk_explanation,
            recommendations: doc.recommendations,
            num_pages: doc.num_pages,
            num_chunks: doc.num_chunks,
            metadata: serde_json::Value::Object(Default::default()),
        }
    }
}

/// Reqwest-backed implementation that uploads the document as multipart
/// form data to `{base_url}/upload`.
pub struct HttpAnalysisBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAnalysisBackend {
    pub fn new(config: &BackendConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create analysis backend HTTP client");

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AnalysisBackend for HttpAnalysisBackend {
    async fn analyze(&self, payload: &JobPayload) -> Result<AnalysisResult, BackendError> {
        let part = reqwest::multipart::Part::bytes(payload.content.to_vec())
            .file_name(payload.filename.clone())
            .mime_str("application/pdf")
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        // Only 200 counts as an analysis; other 2xx answers mean the backend
        // did something else with the upload.
        if status.as_u16() != 200 {
            let detail = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                code: status.as_u16(),
                detail,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let parsed: UploadResponse = serde_json::from_str(&body)
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;

        Ok(parsed.document.into())
    }
}

/// Scripted backend for tests: pops queued responses in order, then falls
/// back to a fixed response if one was set.
#[derive(Clone, Default)]
pub struct MockAnalysisBackend {
    responses: Arc<Mutex<VecDeque<Result<AnalysisResult, BackendError>>>>,
    fallback: Arc<Mutex<Option<Result<AnalysisResult, BackendError>>>>,
    calls: Arc<AtomicUsize>,
}

impl MockAnalysisBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response to be returned by the next unanswered `analyze` call.
    pub fn push_response(&self, response: Result<AnalysisResult, BackendError>) {
        self.responses.lock().push_back(response);
    }

    /// Response returned once the scripted queue is exhausted.
    pub fn set_fallback(&self, response: Result<AnalysisResult, BackendError>) {
        *self.fallback.lock() = Some(response);
    }

    /// Number of `analyze` calls observed so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisBackend for MockAnalysisBackend {
    async fn analyze(&self, _payload: &JobPayload) -> Result<AnalysisResult, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(response) = self.responses.lock().pop_front() {
            return response;
        }
        if let Some(response) = self.fallback.lock().clone() {
            return response;
        }
        Err(BackendError::Transport(
            "no scripted response remaining".to_string(),
        ))
    }
}

/// A minimal completed result for exercising the queue in tests.
pub fn sample_result(document_id: &str, filename: &str) -> AnalysisResult {
    AnalysisResult {
        document_id: document_id.to_string(),
        filename: filename.to_string(),
        risk_level: RiskLevel::Normal,
        risk_category: RiskCategory::None,
        risk_confidence: 80,
        risk_explanation: "No significant risk indicators found".to_string(),
        recommendations: vec![],
        num_pages: 1,
        num_chunks: 1,
        metadata: serde_json::Value::Object(Default::default()),
    }
}
