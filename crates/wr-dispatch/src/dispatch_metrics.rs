//! Metrics for the fan-out dispatcher.
//!
//! Prometheus-compatible counters and histograms covering dispatch fan-out,
//! per-target delivery outcomes, and audit persistence failures.

use metrics::{counter, histogram};
use wr_common::DeliveryResult;

/// Record one settled dispatch.
pub fn record_dispatch(tenant_id: &str, total: usize) {
    counter!(
        "wr_dispatches_total",
        "tenant" => tenant_id.to_string()
    )
    .increment(1);
    histogram!("wr_dispatch_fanout_targets").record(total as f64);
}

/// Record one settled per-target delivery.
pub fn record_delivery(result: &DeliveryResult) {
    let kind = if result.target.is_primary() { "primary" } else { "secondary" };
    counter!(
        "wr_deliveries_total",
        "outcome" => result.outcome.as_str(),
        "target_kind" => kind
    )
    .increment(1);
    histogram!(
        "wr_delivery_duration_ms",
        "target_kind" => kind
    )
    .record(result.response_time_ms as f64);
}

/// Record a failed audit-log append (best-effort path).
pub fn record_audit_append_failure() {
    counter!("wr_audit_append_failures_total").increment(1);
}
