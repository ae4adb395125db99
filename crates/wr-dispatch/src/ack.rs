//! Ack policy: the response returned to the inbound platform.
//!
//! The inbound platform retries indefinitely on anything but a prompt
//! success response, and such retries would duplicate fan-out traffic. The
//! acknowledgment is therefore always a success payload served with HTTP
//! 200, whatever happened downstream; aggregate counts ride along as
//! metadata and error detail is only attached in development mode.

use serde::Serialize;
use utoipa::ToSchema;

use wr_common::DispatchSummary;

/// Aggregate delivery counts attached to the acknowledgment.
#[derive(Debug, Clone, Copy, Default, Serialize, ToSchema)]
pub struct AckCounts {
    pub total: usize,
    pub success: usize,
    pub failure: usize,
}

/// The fixed-success acknowledgment body.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AckResponse {
    /// Always "ok".
    pub status: String,
    /// Always true.
    pub proxied: bool,
    pub results: AckCounts,
    /// Present only when dispatch failed internally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error detail, attached only in development mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AckResponse {
    pub fn ok(summary: &DispatchSummary) -> Self {
        Self {
            status: "ok".to_string(),
            proxied: true,
            results: AckCounts {
                total: summary.total,
                success: summary.success_count,
                failure: summary.failure_count,
            },
            error: None,
            message: None,
        }
    }

    pub fn internal_error(detail: String, dev_mode: bool) -> Self {
        Self {
            status: "ok".to_string(),
            proxied: true,
            results: AckCounts::default(),
            error: Some("Internal processing error".to_string()),
            message: dev_mode.then_some(detail),
        }
    }
}
