//! Fan-out dispatcher: resolves the target list for an inbound event and
//! runs one delivery worker per target concurrently.
//!
//! The dispatcher is infallible by design. Registry unavailability degrades
//! to a primary-only dispatch, worker panics are captured as failure results,
//! and the summary is only built once every worker has settled.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use wr_common::{
    DeliveryResult, DeliveryTarget, DispatchSummary, WebhookEvent, DEFAULT_TARGET_RETRY_COUNT,
    DEFAULT_TARGET_TIMEOUT_MS,
};
use wr_store::EndpointRegistry;

use crate::deliverer::Deliverer;
use crate::dispatch_metrics;

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Base URL of the main system; the primary target URL is this base plus
    /// the tenant path segment.
    pub primary_base_url: String,
    /// Upper bound on the registry lookup so a slow registry cannot stall
    /// dispatch.
    pub registry_timeout: Duration,
    /// Timeout applied to primary-target attempts.
    pub primary_timeout_ms: u64,
    /// Attempt budget for the primary target.
    pub primary_retry_count: u32,
}

impl DispatcherConfig {
    pub fn new(primary_base_url: impl Into<String>) -> Self {
        Self {
            primary_base_url: primary_base_url.into(),
            registry_timeout: Duration::from_millis(2_000),
            primary_timeout_ms: DEFAULT_TARGET_TIMEOUT_MS,
            primary_retry_count: DEFAULT_TARGET_RETRY_COUNT,
        }
    }
}

/// Runs the fan-out for one inbound event.
pub struct Dispatcher {
    deliverer: Arc<dyn Deliverer>,
    registry: Arc<dyn EndpointRegistry>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        deliverer: Arc<dyn Deliverer>,
        registry: Arc<dyn EndpointRegistry>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            deliverer,
            registry,
            config,
        }
    }

    /// Deliver the event to the primary target plus every enabled secondary
    /// target, concurrently, and aggregate the settled results in target
    /// order (index 0 is always the primary).
    pub async fn dispatch(&self, event: &WebhookEvent) -> DispatchSummary {
        let targets = self.resolve_targets(event).await;
        debug!(
            tenant_id = %event.tenant_id,
            targets = targets.len(),
            "Dispatching webhook event"
        );

        let handles: Vec<_> = targets
            .iter()
            .map(|target| {
                let deliverer = Arc::clone(&self.deliverer);
                let target = target.clone();
                let event = event.clone();
                tokio::spawn(async move { deliverer.deliver(&target, &event).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (handle, target) in handles.into_iter().zip(targets.into_iter()) {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!(
                        target = %target.url,
                        error = %e,
                        "Delivery worker did not run to completion"
                    );
                    results.push(DeliveryResult::failure(
                        target,
                        format!("Delivery worker failed: {}", e),
                        0,
                        0,
                    ));
                }
            }
        }

        for result in &results {
            dispatch_metrics::record_delivery(result);
        }
        dispatch_metrics::record_dispatch(&event.tenant_id, results.len());

        let summary = DispatchSummary::from_results(results);
        info!(
            tenant_id = %event.tenant_id,
            total = summary.total,
            success = summary.success_count,
            failure = summary.failure_count,
            "Dispatch settled"
        );
        summary
    }

    /// Synthesize the primary target for a tenant.
    fn primary_target(&self, tenant_id: &str) -> DeliveryTarget {
        let url = format!(
            "{}/api/line-webhook/{}",
            self.config.primary_base_url.trim_end_matches('/'),
            tenant_id
        );
        let mut target = DeliveryTarget::primary(url);
        target.timeout_ms = self.config.primary_timeout_ms;
        target.retry_count = self.config.primary_retry_count;
        target
    }

    /// Primary target first, then registry-sourced secondaries. Registry
    /// failure or timeout must not block delivery to the primary.
    async fn resolve_targets(&self, event: &WebhookEvent) -> Vec<DeliveryTarget> {
        let mut targets = vec![self.primary_target(&event.tenant_id)];

        let lookup = tokio::time::timeout(
            self.config.registry_timeout,
            self.registry.list_enabled_targets(&event.tenant_id),
        )
        .await;

        match lookup {
            Ok(Ok(secondary)) => targets.extend(secondary),
            Ok(Err(e)) => {
                warn!(
                    tenant_id = %event.tenant_id,
                    error = %e,
                    "Registry lookup failed, delivering to primary only"
                );
            }
            Err(_) => {
                warn!(
                    tenant_id = %event.tenant_id,
                    timeout_ms = self.config.registry_timeout.as_millis() as u64,
                    "Registry lookup timed out, delivering to primary only"
                );
            }
        }

        targets
    }
}
