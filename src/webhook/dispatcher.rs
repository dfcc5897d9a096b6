//! Webhook delivery with bounded, linearly backed-off retries.
//!
//! Delivery is fire-and-forget from the queue's perspective: by the time an
//! event is dispatched the job has already been finalized, so a failed
//! delivery is logged and dropped, never surfaced to the submitter.

use crate::config::WebhookConfig;
use crate::webhook::events::WebhookEvent;
use crate::webhook::signing;

/// Header carrying the event name.
pub const EVENT_HEADER: &str = "X-Aegis-Event";
/// Header carrying the `sha256=<hex>` payload signature.
pub const SIGNATURE_HEADER: &str = "X-Aegis-Signature";

/// Delivers signed webhook events to subscriber URLs.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookDispatcher {
    pub fn new(config: WebhookConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create webhook HTTP client");

        Self { client, config }
    }

    /// POST the event to `url`, retrying on non-success status and transport
    /// errors alike.
    ///
    /// The payload is serialized canonically and signed once; every attempt
    /// sends identical bytes. Backoff between attempts is linear:
    /// `retry_base_delay * attempt_number`. Returns `true` iff some attempt
    /// got a 200, 201 or 202 back before the attempt budget ran out.
    #[tracing::instrument(skip(self, event, secret), fields(event = %event.event, url = %url))]
    pub async fn deliver(&self, url: &str, event: &WebhookEvent, secret: Option<&str>) -> bool {
        let payload = match serde_json::to_value(event) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize webhook payload");
                return false;
            }
        };
        let body = signing::canonical_json(&payload);
        let event_name = event.event_name();
        let signature = secret
            .map(|secret| format!("{}{}", signing::SIGNATURE_PREFIX, signing::sign(&payload, secret)));

        for attempt in 0..self.config.max_attempts {
            if attempt > 0 {
                let backoff = self.config.retry_base_delay * attempt;
                tracing::debug!(attempt, backoff_ms = backoff.as_millis() as u64, "Backing off before retry");
                tokio::time::sleep(backoff).await;
            }

            match self.attempt(url, &event_name, &body, signature.as_deref()).await {
                Ok(status) if matches!(status, 200 | 201 | 202) => {
                    tracing::debug!(attempt, status, "Webhook delivered");
                    return true;
                }
                Ok(status) => {
                    tracing::warn!(attempt, status, "Webhook endpoint returned non-success status");
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Webhook delivery attempt failed");
                }
            }
        }

        tracing::warn!(
            max_attempts = self.config.max_attempts,
            "Webhook delivery exhausted all attempts, dropping event"
        );
        false
    }

    async fn attempt(
        &self,
        url: &str,
        event_name: &str,
        body: &str,
        signature: Option<&str>,
    ) -> Result<u16, reqwest::Error> {
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header(EVENT_HEADER, event_name)
            .body(body.to_string());

        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request.send().await?;
        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;
    use crate::webhook::events::{JobEventData, WebhookEventType};
    use chrono::Utc;
    use std::time::Duration;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Dispatcher with a short backoff and timeout, for tests.
    fn test_dispatcher() -> WebhookDispatcher {
        WebhookDispatcher::new(WebhookConfig {
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(25),
            timeout: Duration::from_secs(5),
        })
    }

    fn completed_event() -> WebhookEvent {
        WebhookEvent {
            event: WebhookEventType::AnalysisCompleted,
            data: JobEventData {
                job_id: "job_0af1".to_string(),
                status: JobStatus::Completed,
                result: None,
                error: None,
            },
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn delivers_on_first_attempt_with_verifiable_signature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header(EVENT_HEADER, "analysis.completed"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let delivered = test_dispatcher()
            .deliver(&server.uri(), &completed_event(), Some("topsecret"))
            .await;
        assert!(delivered);

        // The receiver can recompute the signature from the body it got.
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        let signature = request.headers[SIGNATURE_HEADER].to_str().unwrap().to_string();
        assert!(signature.starts_with("sha256="));
        let payload: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        assert!(signing::verify(&payload, &signature, "topsecret"));
    }

    #[tokio::test]
    async fn omits_signature_header_without_a_secret() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        assert!(
            test_dispatcher()
                .deliver(&server.uri(), &completed_event(), None)
                .await
        );

        let requests = server.received_requests().await.unwrap();
        assert!(!requests[0].headers.contains_key(SIGNATURE_HEADER));
    }

    #[tokio::test]
    async fn retries_with_increasing_linear_backoff_until_success() {
        let server = MockServer::start().await;
        // First two attempts fail, third succeeds.
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let started = tokio::time::Instant::now();
        let delivered = test_dispatcher()
            .deliver(&server.uri(), &completed_event(), None)
            .await;
        let elapsed = started.elapsed();

        assert!(delivered);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
        // Linear backoff: 25ms after the first failure, 50ms after the second.
        assert!(
            elapsed >= Duration::from_millis(75),
            "expected >= 75ms of backoff, got {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn gives_up_after_exactly_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let delivered = test_dispatcher()
            .deliver(&server.uri(), &completed_event(), None)
            .await;

        assert!(!delivered);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn transport_errors_are_retried_then_dropped() {
        // Nothing is listening on this port.
        let delivered = test_dispatcher()
            .deliver("http://127.0.0.1:1", &completed_event(), None)
            .await;
        assert!(!delivered);
    }

    #[tokio::test]
    async fn non_success_2xx_statuses_are_not_accepted() {
        let server = MockServer::start().await;
        // 204 is a 2xx but not in the accepted set.
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(3)
            .mount(&server)
            .await;

        assert!(
            !test_dispatcher()
                .deliver(&server.uri(), &completed_event(), None)
                .await
        );
    }
}
