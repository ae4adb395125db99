use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use wr_store::{EndpointRecord, LogEntry, LogStats};

/// Query params for endpoint listing.
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct TenantQuery {
    /// Tenant whose endpoints to list
    pub tenant_id: String,
}

/// Query params for the delivery log endpoint.
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct LogsQuery {
    /// Tenant whose logs to fetch
    pub tenant_id: String,
    /// Page size (default 100)
    pub limit: Option<u32>,
    /// Page offset (default 0)
    pub offset: Option<u32>,
    /// Outcome filter: "success" or "failure"
    pub status: Option<String>,
}

/// Endpoint listing response
#[derive(Debug, Serialize, ToSchema)]
pub struct EndpointListResponse {
    pub endpoints: Vec<EndpointRecord>,
}

/// Single-endpoint response
#[derive(Debug, Serialize, ToSchema)]
pub struct EndpointResponse {
    pub endpoint: EndpointRecord,
}

/// Endpoint deletion response
#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteResponse {
    pub message: String,
}

/// Paging metadata for log queries
#[derive(Debug, Serialize, ToSchema)]
pub struct LogPagination {
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

/// Delivery log response
#[derive(Debug, Serialize, ToSchema)]
pub struct LogsResponse {
    pub logs: Vec<LogEntry>,
    pub stats: LogStats,
    pub pagination: LogPagination,
}
