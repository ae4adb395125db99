//! Result/log correlator: maps settled delivery results back to registry
//! endpoints and persists best-effort audit records.
//!
//! Records are written from a detached task, launched only after the
//! caller-facing acknowledgment has been determined. Store failures are
//! reported and swallowed; they can never reach the response path.

use std::sync::Arc;
use tracing::{debug, warn};

use wr_common::{DeliveryRecord, DispatchSummary, WebhookEvent};
use wr_store::DeliveryLogStore;

use crate::dispatch_metrics;

pub struct LogCorrelator {
    store: Arc<dyn DeliveryLogStore>,
}

impl LogCorrelator {
    pub fn new(store: Arc<dyn DeliveryLogStore>) -> Self {
        Self { store }
    }

    /// Build the audit records for one dispatch. Only registry-sourced
    /// targets produce records; the primary has no registry identity and is
    /// deliberately excluded.
    pub fn records_for(event: &WebhookEvent, summary: &DispatchSummary) -> Vec<DeliveryRecord> {
        summary
            .results
            .iter()
            .filter_map(|result| {
                result.target.endpoint_id.map(|endpoint_id| DeliveryRecord {
                    tenant_id: event.tenant_id.clone(),
                    endpoint_id,
                    outcome: result.outcome,
                    status_code: result.status_code,
                    error_message: result.error_message.clone(),
                    request_body: String::from_utf8_lossy(&event.body).into_owned(),
                    response_time_ms: result.response_time_ms,
                })
            })
            .collect()
    }

    /// Persist the summary's audit records in a fire-and-forget task.
    pub fn record_detached(&self, event: &WebhookEvent, summary: &DispatchSummary) {
        let records = Self::records_for(event, summary);
        if records.is_empty() {
            return;
        }

        let store = Arc::clone(&self.store);
        let tenant_id = event.tenant_id.clone();
        tokio::spawn(async move {
            let count = records.len();
            for record in records {
                if let Err(e) = store.append(record).await {
                    dispatch_metrics::record_audit_append_failure();
                    warn!(
                        tenant_id = %tenant_id,
                        error = %e,
                        "Failed to append delivery log"
                    );
                }
            }
            debug!(tenant_id = %tenant_id, count, "Delivery log write finished");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use uuid::Uuid;
    use wr_common::{DeliveryResult, DeliveryTarget};

    fn secondary_target() -> DeliveryTarget {
        DeliveryTarget {
            endpoint_id: Some(Uuid::new_v4()),
            url: "http://secondary.example.com/hook".to_string(),
            name: Some("secondary".to_string()),
            priority: 50,
            enabled: true,
            headers: Vec::new(),
            timeout_ms: 5_000,
            retry_count: 3,
        }
    }

    #[test]
    fn primary_result_is_never_persisted() {
        let event = WebhookEvent::new("t1", None, Bytes::from_static(b"{\"k\":1}"));
        let primary = DeliveryTarget::primary("http://main.example.com/api/line-webhook/t1");
        let secondary = secondary_target();
        let secondary_id = secondary.endpoint_id;

        let summary = DispatchSummary::from_results(vec![
            DeliveryResult::success(primary, 200, 1, 10),
            DeliveryResult::failure(secondary, "Request timeout".to_string(), 3, 5_000),
        ]);

        let records = LogCorrelator::records_for(&event, &summary);
        assert_eq!(records.len(), 1);
        assert_eq!(Some(records[0].endpoint_id), secondary_id);
        assert_eq!(records[0].request_body, "{\"k\":1}");
        assert_eq!(records[0].error_message.as_deref(), Some("Request timeout"));
    }

    #[test]
    fn primary_only_dispatch_produces_no_records() {
        let event = WebhookEvent::new("t1", None, Bytes::from_static(b"{}"));
        let primary = DeliveryTarget::primary("http://main.example.com/api/line-webhook/t1");
        let summary =
            DispatchSummary::from_results(vec![DeliveryResult::success(primary, 200, 1, 10)]);

        assert!(LogCorrelator::records_for(&event, &summary).is_empty());
    }
}
