//! Delivery worker: sends one event to one target with retry and timeout.
//!
//! The retry state machine reacts to transport-level failure only. A
//! completed network exchange is a success whatever HTTP status the target
//! returned; the status code is recorded but never consumes a retry. Each
//! attempt is bounded by the target's own timeout and retries are separated
//! by a fixed delay, so a worker never blocks past
//! `retry_count * (timeout_ms + inter_retry_delay)`.

use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use wr_common::{DeliveryResult, DeliveryTarget, WebhookEvent, SIGNATURE_HEADER};

/// Fixed delay between attempts. No exponential backoff.
pub const DEFAULT_INTER_RETRY_DELAY: Duration = Duration::from_millis(1_000);

/// Configuration for the HTTP delivery worker.
#[derive(Debug, Clone)]
pub struct HttpDelivererConfig {
    /// Delay between failed attempts (constant across attempts).
    pub inter_retry_delay: Duration,
    /// Connection timeout for the shared client.
    pub connect_timeout: Duration,
}

impl Default for HttpDelivererConfig {
    fn default() -> Self {
        Self {
            inter_retry_delay: DEFAULT_INTER_RETRY_DELAY,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Trait for per-target delivery.
#[async_trait]
pub trait Deliverer: Send + Sync {
    async fn deliver(&self, target: &DeliveryTarget, event: &WebhookEvent) -> DeliveryResult;
}

/// HTTP-based delivery worker over a shared connection pool.
pub struct HttpDeliverer {
    client: Client,
    config: HttpDelivererConfig,
}

impl HttpDeliverer {
    pub fn new() -> Self {
        Self::with_config(HttpDelivererConfig::default())
    }

    pub fn with_config(config: HttpDelivererConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(10)
            .build()
            .expect("Failed to build HTTP client");

        Self { client, config }
    }

    /// One attempt: POST the event to the target, bounded by the target's
    /// timeout. Returns the HTTP status on a completed exchange, or the
    /// transport error message otherwise.
    async fn attempt_once(
        &self,
        target: &DeliveryTarget,
        event: &WebhookEvent,
    ) -> std::result::Result<u16, String> {
        let mut request = self
            .client
            .post(&target.url)
            .timeout(Duration::from_millis(target.timeout_ms))
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, event.signature_value());

        for (name, value) in &target.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        match request.body(event.body.clone()).send().await {
            Ok(response) => Ok(response.status().as_u16()),
            Err(e) => {
                if e.is_timeout() {
                    Err("Request timeout".to_string())
                } else if e.is_connect() {
                    Err(format!("Connection error: {}", e))
                } else {
                    Err(format!("Request failed: {}", e))
                }
            }
        }
    }
}

impl Default for HttpDeliverer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Deliverer for HttpDeliverer {
    async fn deliver(&self, target: &DeliveryTarget, event: &WebhookEvent) -> DeliveryResult {
        // A target configured with retry_count 0 still gets one attempt.
        let max_attempts = target.retry_count.max(1);
        let mut last_error = String::new();
        let mut elapsed_ms = 0u64;

        for attempt in 1..=max_attempts {
            let started = Instant::now();
            let attempt_result = self.attempt_once(target, event).await;
            elapsed_ms = started.elapsed().as_millis() as u64;

            match attempt_result {
                Ok(status_code) => {
                    info!(
                        target = %target.url,
                        status_code,
                        attempt,
                        "Delivery completed"
                    );
                    return DeliveryResult::success(target.clone(), status_code, attempt, elapsed_ms);
                }
                Err(error) => {
                    warn!(
                        target = %target.url,
                        attempt,
                        max_attempts,
                        error = %error,
                        "Delivery attempt failed"
                    );
                    last_error = error;

                    if attempt < max_attempts {
                        debug!(
                            target = %target.url,
                            delay_ms = self.config.inter_retry_delay.as_millis() as u64,
                            "Waiting before retry"
                        );
                        tokio::time::sleep(self.config.inter_retry_delay).await;
                    }
                }
            }
        }

        DeliveryResult::failure(target.clone(), last_error, max_attempts, elapsed_ms)
    }
}
