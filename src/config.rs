//! Configuration for the queue, the analysis backend client, and webhook
//! delivery. Values only; how they are loaded is the embedding service's
//! concern.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the job queue's worker pool and execution retry policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueConfig {
    /// Number of concurrent worker slots (default: 5)
    pub worker_count: usize,
    /// How long an idle worker sleeps between claim attempts (default: 1s)
    #[serde(with = "humantime_serde")]
    pub claim_interval: Duration,
    /// Maximum execution attempts per job before it is marked failed
    /// (default: 3)
    pub max_attempts: u32,
    /// Base delay for execution retries; doubles with each attempt
    /// (default: 2s)
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
    /// Upper bound on a single execution retry delay (default: 60s)
    #[serde(with = "humantime_serde")]
    pub max_retry_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            worker_count: 5,
            claim_interval: Duration::from_secs(1),
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(2),
            max_retry_delay: Duration::from_secs(60),
        }
    }
}

/// Configuration for the external analysis backend client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL of the analysis backend (default: http://localhost:3001)
    pub base_url: String,
    /// Timeout for a single upload/analysis call. Analysis of a large
    /// document is slow, so this is generous (default: 300s).
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001".to_string(),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Configuration for webhook delivery.
///
/// The retry backoff here is linear (`retry_base_delay * attempt_number`),
/// unlike the queue's exponential execution backoff. The two policies are
/// tuned independently.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebhookConfig {
    /// Maximum delivery attempts per event (default: 3)
    pub max_attempts: u32,
    /// Base delay between delivery attempts (default: 5s)
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
    /// HTTP timeout for a single delivery attempt (default: 30s)
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(5),
            timeout: Duration::from_secs(30),
        }
    }
}
