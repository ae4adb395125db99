use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod logging;

// ============================================================================
// Core Event Types
// ============================================================================

/// Signature header forwarded verbatim from the inbound platform to every
/// delivery target (empty string when the caller sent none).
pub const SIGNATURE_HEADER: &str = "X-Line-Signature";

/// One inbound webhook call on behalf of a tenant.
///
/// Immutable once received; lives for the duration of a single dispatch.
/// The body is the re-serialized JSON payload, held as `Bytes` so per-worker
/// clones only bump a refcount.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub tenant_id: String,
    pub signature: Option<String>,
    pub body: Bytes,
}

impl WebhookEvent {
    pub fn new(tenant_id: impl Into<String>, signature: Option<String>, body: Bytes) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            signature,
            body,
        }
    }

    /// The signature value placed on outbound requests: the inbound header
    /// verbatim, or an empty string when the caller sent none.
    pub fn signature_value(&self) -> &str {
        self.signature.as_deref().unwrap_or("")
    }
}

// ============================================================================
// Delivery Target
// ============================================================================

/// A single delivery destination for one dispatch.
///
/// Secondary targets come from the endpoint registry and carry their registry
/// identity in `endpoint_id`; the primary target is synthesized from static
/// configuration and has `endpoint_id = None`, `name = None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryTarget {
    /// Registry identity. `None` marks the synthesized primary target, whose
    /// results are never persisted to the audit log.
    pub endpoint_id: Option<Uuid>,
    pub url: String,
    pub name: Option<String>,
    pub priority: i32,
    pub enabled: bool,
    /// Extra headers applied to the outbound request for this target.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    pub timeout_ms: u64,
    pub retry_count: u32,
}

pub const DEFAULT_TARGET_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_TARGET_RETRY_COUNT: u32 = 3;
pub const DEFAULT_ENDPOINT_PRIORITY: i32 = 50;

impl DeliveryTarget {
    /// Synthesize the always-present primary target for a tenant.
    pub fn primary(url: impl Into<String>) -> Self {
        Self {
            endpoint_id: None,
            url: url.into(),
            name: None,
            priority: i32::MAX,
            enabled: true,
            headers: Vec::new(),
            timeout_ms: DEFAULT_TARGET_TIMEOUT_MS,
            retry_count: DEFAULT_TARGET_RETRY_COUNT,
        }
    }

    pub fn is_primary(&self) -> bool {
        self.endpoint_id.is_none()
    }
}

// ============================================================================
// Delivery Results
// ============================================================================

/// Terminal outcome of one delivery.
///
/// `Success` means the network exchange completed without a transport error
/// or timeout, regardless of the HTTP status code the target returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOutcome {
    Success,
    Failure,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Success => "success",
            DeliveryOutcome::Failure => "failure",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "success" => Some(DeliveryOutcome::Success),
            "failure" => Some(DeliveryOutcome::Failure),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of delivering one event to one target, produced exactly once per
/// target and order-correlated with the dispatch target list.
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    pub target: DeliveryTarget,
    pub outcome: DeliveryOutcome,
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
    pub attempts: u32,
    /// Elapsed time of the settling attempt.
    pub response_time_ms: u64,
}

impl DeliveryResult {
    pub fn success(target: DeliveryTarget, status_code: u16, attempts: u32, response_time_ms: u64) -> Self {
        Self {
            target,
            outcome: DeliveryOutcome::Success,
            status_code: Some(status_code),
            error_message: None,
            attempts,
            response_time_ms,
        }
    }

    pub fn failure(
        target: DeliveryTarget,
        error_message: String,
        attempts: u32,
        response_time_ms: u64,
    ) -> Self {
        Self {
            target,
            outcome: DeliveryOutcome::Failure,
            status_code: None,
            error_message: Some(error_message),
            attempts,
            response_time_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == DeliveryOutcome::Success
    }
}

/// Aggregate view over one dispatch, built once every worker has settled.
///
/// Invariant: `success_count + failure_count == total == results.len()`, and
/// `results[i]` corresponds to the i-th target of the dispatch (index 0 is
/// always the primary).
#[derive(Debug, Clone)]
pub struct DispatchSummary {
    pub total: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<DeliveryResult>,
}

impl DispatchSummary {
    pub fn from_results(results: Vec<DeliveryResult>) -> Self {
        let success_count = results.iter().filter(|r| r.is_success()).count();
        Self {
            total: results.len(),
            success_count,
            failure_count: results.len() - success_count,
            results,
        }
    }

}

// ============================================================================
// Audit Records
// ============================================================================

/// Best-effort audit record for one secondary-target delivery.
///
/// Only registry-sourced targets produce records; the primary target has no
/// registry identity and is deliberately excluded from persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub tenant_id: String,
    pub endpoint_id: Uuid,
    pub outcome: DeliveryOutcome,
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
    pub request_body: String,
    pub response_time_ms: u64,
}
