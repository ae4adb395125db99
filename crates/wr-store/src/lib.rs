//! Storage collaborators for the webhook relay.
//!
//! The dispatcher core consumes two narrow interfaces: the endpoint registry
//! (tenant-configured secondary targets) and the delivery log store
//! (best-effort audit records). Both are defined here as traits with an
//! in-memory implementation for development and tests, and a PostgreSQL
//! implementation for production.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

use wr_common::{
    DeliveryOutcome, DeliveryRecord, DeliveryTarget, DEFAULT_ENDPOINT_PRIORITY,
    DEFAULT_TARGET_RETRY_COUNT, DEFAULT_TARGET_TIMEOUT_MS,
};

pub mod error;
pub mod memory;
pub mod postgres;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;

// ============================================================================
// Registry Types
// ============================================================================

/// A tenant-configured endpoint as stored in the registry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EndpointRecord {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub url: String,
    pub priority: i32,
    pub enabled: bool,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub timeout_ms: u64,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl EndpointRecord {
    /// Project this registry row into a delivery target carrying its
    /// registry identity.
    pub fn to_target(&self) -> DeliveryTarget {
        DeliveryTarget {
            endpoint_id: Some(self.id),
            url: self.url.clone(),
            name: Some(self.name.clone()),
            priority: self.priority,
            enabled: self.enabled,
            headers: self.headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            timeout_ms: self.timeout_ms,
            retry_count: self.retry_count,
        }
    }
}

/// Payload for creating an endpoint. Optional fields take registry defaults.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewEndpoint {
    pub tenant_id: String,
    pub name: String,
    pub url: String,
    pub priority: Option<i32>,
    pub enabled: Option<bool>,
    pub headers: Option<HashMap<String, String>>,
    pub timeout_ms: Option<u64>,
    pub retry_count: Option<u32>,
}

impl NewEndpoint {
    pub fn into_record(self) -> EndpointRecord {
        EndpointRecord {
            id: Uuid::new_v4(),
            tenant_id: self.tenant_id,
            name: self.name,
            url: self.url,
            priority: self.priority.unwrap_or(DEFAULT_ENDPOINT_PRIORITY),
            enabled: self.enabled.unwrap_or(true),
            headers: self.headers.unwrap_or_default(),
            timeout_ms: self.timeout_ms.unwrap_or(DEFAULT_TARGET_TIMEOUT_MS),
            retry_count: self.retry_count.unwrap_or(DEFAULT_TARGET_RETRY_COUNT),
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

/// Partial update for an endpoint; unset fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct EndpointUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub priority: Option<i32>,
    pub enabled: Option<bool>,
    pub headers: Option<HashMap<String, String>>,
    pub timeout_ms: Option<u64>,
    pub retry_count: Option<u32>,
}

impl EndpointUpdate {
    pub fn apply(&self, record: &mut EndpointRecord) {
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(url) = &self.url {
            record.url = url.clone();
        }
        if let Some(priority) = self.priority {
            record.priority = priority;
        }
        if let Some(enabled) = self.enabled {
            record.enabled = enabled;
        }
        if let Some(headers) = &self.headers {
            record.headers = headers.clone();
        }
        if let Some(timeout_ms) = self.timeout_ms {
            record.timeout_ms = timeout_ms;
        }
        if let Some(retry_count) = self.retry_count {
            record.retry_count = retry_count;
        }
        record.updated_at = Some(Utc::now());
    }
}

/// Registry of tenant-configured delivery endpoints.
///
/// `list_enabled_targets` is the narrow interface the dispatcher consumes:
/// enabled endpoints only, ordered by priority descending with creation time
/// ascending as the tie-break. The remaining methods back the admin API.
#[async_trait]
pub trait EndpointRegistry: Send + Sync {
    async fn list_enabled_targets(&self, tenant_id: &str) -> Result<Vec<DeliveryTarget>>;

    async fn list_endpoints(&self, tenant_id: &str) -> Result<Vec<EndpointRecord>>;

    async fn create_endpoint(&self, new: NewEndpoint) -> Result<EndpointRecord>;

    async fn update_endpoint(&self, id: Uuid, update: EndpointUpdate) -> Result<EndpointRecord>;

    async fn delete_endpoint(&self, id: Uuid) -> Result<()>;
}

// ============================================================================
// Delivery Log Types
// ============================================================================

/// One persisted delivery log row, as returned by queries.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LogEntry {
    pub id: Uuid,
    pub tenant_id: String,
    pub endpoint_id: Uuid,
    /// Resolved from the registry at query time; endpoints deleted since the
    /// delivery resolve to `None`.
    pub endpoint_name: Option<String>,
    pub outcome: DeliveryOutcome,
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
    pub response_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Filter and paging for log queries.
#[derive(Debug, Clone)]
pub struct LogQuery {
    pub tenant_id: String,
    pub limit: u32,
    pub offset: u32,
    pub outcome: Option<DeliveryOutcome>,
}

pub const DEFAULT_LOG_QUERY_LIMIT: u32 = 100;

impl LogQuery {
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            limit: DEFAULT_LOG_QUERY_LIMIT,
            offset: 0,
            outcome: None,
        }
    }
}

/// Aggregate counts over every log row matching the query filter.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema)]
pub struct LogStats {
    pub total: u64,
    pub success: u64,
    pub failure: u64,
}

/// One page of log rows, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LogPage {
    pub entries: Vec<LogEntry>,
    pub stats: LogStats,
    pub limit: u32,
    pub offset: u32,
}

/// Append-only store for delivery audit records.
///
/// Appends are strictly best-effort from the dispatcher's point of view;
/// callers are expected to report and swallow failures.
#[async_trait]
pub trait DeliveryLogStore: Send + Sync {
    async fn append(&self, record: DeliveryRecord) -> Result<()>;

    async fn query(&self, query: LogQuery) -> Result<LogPage>;
}
