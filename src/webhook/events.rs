//! Webhook event types and payload builders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{AnalysisResult, JobRecord, JobStatus};

/// Events emitted when a job reaches a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEventType {
    #[serde(rename = "analysis.completed")]
    AnalysisCompleted,
    #[serde(rename = "analysis.failed")]
    AnalysisFailed,
}

impl std::fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AnalysisCompleted => write!(f, "analysis.completed"),
            Self::AnalysisFailed => write!(f, "analysis.failed"),
        }
    }
}

impl std::str::FromStr for WebhookEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analysis.completed" => Ok(Self::AnalysisCompleted),
            "analysis.failed" => Ok(Self::AnalysisFailed),
            _ => Err(format!("Unknown event type: {}", s)),
        }
    }
}

/// Terminal job data carried in the webhook payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEventData {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Complete webhook payload: `{event, data, timestamp}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event: WebhookEventType,
    pub data: JobEventData,
    pub timestamp: DateTime<Utc>,
}

impl WebhookEvent {
    /// Build the event for a job that has reached a terminal state.
    ///
    /// The record must be terminal; a `Completed` record yields
    /// `analysis.completed` with its result, anything else yields
    /// `analysis.failed` with its error.
    pub fn job_terminal(record: &JobRecord) -> Self {
        let event = match record.status {
            JobStatus::Completed => WebhookEventType::AnalysisCompleted,
            _ => WebhookEventType::AnalysisFailed,
        };

        Self {
            event,
            data: JobEventData {
                job_id: record.id.to_string(),
                status: record.status,
                result: record.result.clone(),
                error: record.error.clone(),
            },
            timestamp: Utc::now(),
        }
    }

    pub fn event_name(&self) -> String {
        self.event.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sample_result;
    use crate::job::{JobId, JobPayload};

    fn terminal_record(status: JobStatus) -> JobRecord {
        JobRecord {
            id: JobId::new(),
            status,
            payload: JobPayload::new("doc.pdf", b"%PDF".to_vec()),
            result: (status == JobStatus::Completed).then(|| sample_result("doc_1", "doc.pdf")),
            error: (status == JobStatus::Failed).then(|| "backend down".to_string()),
            webhook: None,
            created_at: Utc::now(),
            completed_at: Some(Utc::now()),
        }
    }

    #[test]
    fn event_type_round_trips_through_str() {
        assert_eq!(
            "analysis.completed".parse::<WebhookEventType>().unwrap(),
            WebhookEventType::AnalysisCompleted
        );
        assert!("analysis.exploded".parse::<WebhookEventType>().is_err());
    }

    #[test]
    fn completed_record_builds_completed_event() {
        let record = terminal_record(JobStatus::Completed);
        let event = WebhookEvent::job_terminal(&record);

        assert_eq!(event.event, WebhookEventType::AnalysisCompleted);
        assert_eq!(event.data.job_id, record.id.to_string());
        assert!(event.data.result.is_some());
        assert!(event.data.error.is_none());

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"analysis.completed""#));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn failed_record_builds_failed_event() {
        let record = terminal_record(JobStatus::Failed);
        let event = WebhookEvent::job_terminal(&record);

        assert_eq!(event.event, WebhookEventType::AnalysisFailed);
        assert_eq!(event.data.error.as_deref(), Some("backend down"));
        assert!(event.data.result.is_none());
    }
}
