//! End-to-end flows: submit a job against a mocked analysis backend and
//! assert the terminal store state plus the webhook the subscriber receives.

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use aegis_jobs::webhook::{signing, EVENT_HEADER, SIGNATURE_HEADER};
use aegis_jobs::{
    BackendConfig, HttpAnalysisBackend, InMemoryJobStore, JobId, JobPayload, JobQueue, JobRecord,
    JobStatus, QueueConfig, WebhookConfig, WebhookDispatcher, WebhookTarget,
};

type TestQueue = JobQueue<InMemoryJobStore, HttpAnalysisBackend>;

fn build_queue(backend_url: String) -> Arc<TestQueue> {
    let backend = HttpAnalysisBackend::new(&BackendConfig {
        base_url: backend_url,
        timeout: Duration::from_secs(5),
    });
    let dispatcher = WebhookDispatcher::new(WebhookConfig {
        max_attempts: 3,
        retry_base_delay: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
    });
    Arc::new(JobQueue::new(
        Arc::new(InMemoryJobStore::new()),
        Arc::new(backend),
        Arc::new(dispatcher),
        QueueConfig {
            worker_count: 2,
            claim_interval: Duration::from_millis(10),
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(10),
            max_retry_delay: Duration::from_millis(20),
        },
    ))
}

async fn wait_for_terminal(queue: &TestQueue, id: JobId) -> JobRecord {
    let started = tokio::time::Instant::now();
    while started.elapsed() < Duration::from_secs(5) {
        let record = queue.status(id).await.unwrap();
        if record.status.is_terminal() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not reach a terminal state in time");
}

async fn wait_for_requests(server: &MockServer, count: usize) -> Vec<wiremock::Request> {
    let started = tokio::time::Instant::now();
    while started.elapsed() < Duration::from_secs(5) {
        let requests = server.received_requests().await.unwrap();
        if requests.len() >= count {
            return requests;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("subscriber did not receive {count} request(s) in time");
}

fn document_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "document": {
            "id": "doc_e2e",
            "filename": "contract.pdf",
            "riskLevel": "Warning",
            "riskCategory": "Financial",
            "riskConfidence": 77,
            "riskExplanation": "Ambiguous payment terms",
            "recommendations": ["Clarify net terms"],
            "numPages": 4,
            "numChunks": 16
        }
    }))
}

#[tokio::test]
async fn completed_job_notifies_subscriber_with_signed_event() {
    let backend_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(document_response())
        .expect(1)
        .mount(&backend_server)
        .await;

    let subscriber = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&subscriber)
        .await;

    let queue = build_queue(backend_server.uri());
    let handle = queue.clone().run();

    let id = queue
        .submit(
            JobPayload::new("contract.pdf", b"%PDF-1.4 e2e".to_vec()),
            Some(WebhookTarget {
                url: subscriber.uri(),
                secret: Some("subscriber-secret".to_string()),
            }),
        )
        .await
        .unwrap();

    let record = wait_for_terminal(&queue, id).await;
    assert_eq!(record.status, JobStatus::Completed);
    let result = record.result.expect("completed job must carry a result");
    assert_eq!(result.document_id, "doc_e2e");
    assert_eq!(result.num_chunks, 16);
    assert!(record.error.is_none());
    assert!(record.completed_at.is_some());
    assert_eq!(record.created_at, queue.status(id).await.unwrap().created_at);

    // Exactly one webhook POST, with the completed event and a valid signature.
    let requests = wait_for_requests(&subscriber, 1).await;
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(
        request.headers[EVENT_HEADER].to_str().unwrap(),
        "analysis.completed"
    );

    let payload: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(payload["event"], "analysis.completed");
    assert_eq!(payload["data"]["job_id"], id.to_string());
    assert_eq!(payload["data"]["status"], "completed");
    assert_eq!(payload["data"]["result"]["document_id"], "doc_e2e");
    assert!(payload["timestamp"].is_string());

    let signature = request.headers[SIGNATURE_HEADER].to_str().unwrap();
    assert!(signing::verify(&payload, signature, "subscriber-secret"));

    queue.shutdown();
    handle.await.unwrap();
}

#[tokio::test]
async fn failing_backend_exhausts_retries_and_sends_failed_event() {
    let backend_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(500).set_body_string("analysis pipeline crashed"))
        .expect(3)
        .mount(&backend_server)
        .await;

    let subscriber = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&subscriber)
        .await;

    let queue = build_queue(backend_server.uri());
    let handle = queue.clone().run();

    let id = queue
        .submit(
            JobPayload::new("contract.pdf", b"%PDF-1.4 e2e".to_vec()),
            Some(WebhookTarget {
                url: subscriber.uri(),
                secret: None,
            }),
        )
        .await
        .unwrap();

    let record = wait_for_terminal(&queue, id).await;
    assert_eq!(record.status, JobStatus::Failed);
    assert!(record.result.is_none());
    let error = record.error.expect("failed job must carry an error");
    assert!(error.contains("500"), "error should name the status: {error}");

    // All three execution attempts hit the backend before the job failed.
    assert_eq!(backend_server.received_requests().await.unwrap().len(), 3);

    let requests = wait_for_requests(&subscriber, 1).await;
    let request = &requests[0];
    assert_eq!(
        request.headers[EVENT_HEADER].to_str().unwrap(),
        "analysis.failed"
    );
    assert!(!request.headers.contains_key(SIGNATURE_HEADER));

    let payload: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(payload["event"], "analysis.failed");
    assert_eq!(payload["data"]["status"], "failed");
    assert!(payload["data"]["error"].as_str().unwrap().contains("500"));
    assert!(payload["data"].get("result").is_none());

    queue.shutdown();
    handle.await.unwrap();
}

#[tokio::test]
async fn webhook_failure_does_not_disturb_the_finalized_job() {
    let backend_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(document_response())
        .mount(&backend_server)
        .await;

    // Subscriber rejects every delivery attempt.
    let subscriber = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(410))
        .expect(3)
        .mount(&subscriber)
        .await;

    let queue = build_queue(backend_server.uri());
    let handle = queue.clone().run();

    let id = queue
        .submit(
            JobPayload::new("contract.pdf", b"%PDF-1.4 e2e".to_vec()),
            Some(WebhookTarget {
                url: subscriber.uri(),
                secret: None,
            }),
        )
        .await
        .unwrap();

    let record = wait_for_terminal(&queue, id).await;
    assert_eq!(record.status, JobStatus::Completed);

    // Let the delivery retries run out, then confirm the job is untouched.
    wait_for_requests(&subscriber, 3).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let record = queue.status(id).await.unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert!(record.result.is_some() && record.error.is_none());

    queue.shutdown();
    handle.await.unwrap();
}

#[tokio::test]
async fn jobs_without_a_webhook_complete_quietly() {
    let backend_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(document_response())
        .expect(1)
        .mount(&backend_server)
        .await;

    let queue = build_queue(backend_server.uri());
    let handle = queue.clone().run();

    let id = queue
        .submit(JobPayload::new("contract.pdf", b"%PDF-1.4 e2e".to_vec()), None)
        .await
        .unwrap();

    let record = wait_for_terminal(&queue, id).await;
    assert_eq!(record.status, JobStatus::Completed);

    queue.shutdown();
    handle.await.unwrap();
}
