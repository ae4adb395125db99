//! PostgreSQL store implementation.
//!
//! Timestamps are stored as BIGINT epoch millis and endpoint headers as a
//! JSON TEXT column. `ensure_schema` creates the tables on startup so the
//! server can run against an empty database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use wr_common::{DeliveryOutcome, DeliveryRecord, DeliveryTarget};

use crate::error::{Result, StoreError};
use crate::{
    DeliveryLogStore, EndpointRecord, EndpointRegistry, EndpointUpdate, LogEntry, LogPage,
    LogQuery, LogStats, NewEndpoint,
};

const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS wr_endpoints (
        id UUID PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        name TEXT NOT NULL,
        url TEXT NOT NULL,
        priority INT NOT NULL,
        enabled BOOLEAN NOT NULL,
        headers TEXT NOT NULL,
        timeout_ms BIGINT NOT NULL,
        retry_count INT NOT NULL,
        created_at BIGINT NOT NULL,
        updated_at BIGINT
    )",
    "CREATE INDEX IF NOT EXISTS idx_wr_endpoints_tenant ON wr_endpoints (tenant_id, priority DESC, created_at ASC)",
    "CREATE TABLE IF NOT EXISTS wr_delivery_logs (
        id UUID PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        endpoint_id UUID NOT NULL,
        outcome TEXT NOT NULL,
        status_code INT,
        error_message TEXT,
        request_body TEXT NOT NULL,
        response_time_ms BIGINT NOT NULL,
        created_at BIGINT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_wr_delivery_logs_tenant ON wr_delivery_logs (tenant_id, created_at DESC)",
];

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA_STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("delivery store schema ensured");
        Ok(())
    }

    fn parse_endpoint_row(row: &sqlx::postgres::PgRow) -> Result<EndpointRecord> {
        let headers_json: String = row.get("headers");
        let headers: HashMap<String, String> = serde_json::from_str(&headers_json)?;

        let created_at = millis_to_datetime(row.get("created_at"))?;
        let updated_at = row
            .try_get::<Option<i64>, _>("updated_at")?
            .and_then(DateTime::from_timestamp_millis);

        Ok(EndpointRecord {
            id: row.get("id"),
            tenant_id: row.get("tenant_id"),
            name: row.get("name"),
            url: row.get("url"),
            priority: row.get("priority"),
            enabled: row.get("enabled"),
            headers,
            timeout_ms: row.get::<i64, _>("timeout_ms") as u64,
            retry_count: row.get::<i32, _>("retry_count") as u32,
            created_at,
            updated_at,
        })
    }

    fn parse_log_row(row: &sqlx::postgres::PgRow) -> Result<LogEntry> {
        let outcome_str: String = row.get("outcome");
        let outcome = DeliveryOutcome::from_str_opt(&outcome_str)
            .ok_or_else(|| StoreError::Database(format!("unknown outcome value: {}", outcome_str)))?;

        Ok(LogEntry {
            id: row.get("id"),
            tenant_id: row.get("tenant_id"),
            endpoint_id: row.get("endpoint_id"),
            endpoint_name: row.try_get("endpoint_name").ok(),
            outcome,
            status_code: row.try_get::<Option<i32>, _>("status_code")?.map(|c| c as u16),
            error_message: row.try_get("error_message").ok().flatten(),
            response_time_ms: row.get::<i64, _>("response_time_ms") as u64,
            created_at: millis_to_datetime(row.get("created_at"))?,
        })
    }

    async fn fetch_endpoints(&self, tenant_id: &str, enabled_only: bool) -> Result<Vec<EndpointRecord>> {
        let query = if enabled_only {
            "SELECT id, tenant_id, name, url, priority, enabled, headers, timeout_ms, retry_count, created_at, updated_at \
             FROM wr_endpoints WHERE tenant_id = $1 AND enabled = TRUE \
             ORDER BY priority DESC, created_at ASC"
        } else {
            "SELECT id, tenant_id, name, url, priority, enabled, headers, timeout_ms, retry_count, created_at, updated_at \
             FROM wr_endpoints WHERE tenant_id = $1 \
             ORDER BY priority DESC, created_at ASC"
        };

        let rows = sqlx::query(query).bind(tenant_id).fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(Self::parse_endpoint_row(row)?);
        }
        Ok(records)
    }
}

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Database(format!("invalid timestamp: {}", millis)))
}

#[async_trait]
impl EndpointRegistry for PostgresStore {
    async fn list_enabled_targets(&self, tenant_id: &str) -> Result<Vec<DeliveryTarget>> {
        let records = self.fetch_endpoints(tenant_id, true).await?;
        Ok(records.iter().map(EndpointRecord::to_target).collect())
    }

    async fn list_endpoints(&self, tenant_id: &str) -> Result<Vec<EndpointRecord>> {
        self.fetch_endpoints(tenant_id, false).await
    }

    async fn create_endpoint(&self, new: NewEndpoint) -> Result<EndpointRecord> {
        let record = new.into_record();
        let headers_json = serde_json::to_string(&record.headers)?;

        sqlx::query(
            "INSERT INTO wr_endpoints \
             (id, tenant_id, name, url, priority, enabled, headers, timeout_ms, retry_count, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(record.id)
        .bind(&record.tenant_id)
        .bind(&record.name)
        .bind(&record.url)
        .bind(record.priority)
        .bind(record.enabled)
        .bind(&headers_json)
        .bind(record.timeout_ms as i64)
        .bind(record.retry_count as i32)
        .bind(record.created_at.timestamp_millis())
        .bind(record.updated_at.map(|t| t.timestamp_millis()))
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn update_endpoint(&self, id: Uuid, update: EndpointUpdate) -> Result<EndpointRecord> {
        let row = sqlx::query(
            "SELECT id, tenant_id, name, url, priority, enabled, headers, timeout_ms, retry_count, created_at, updated_at \
             FROM wr_endpoints WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(id))?;

        let mut record = Self::parse_endpoint_row(&row)?;
        update.apply(&mut record);
        let headers_json = serde_json::to_string(&record.headers)?;

        sqlx::query(
            "UPDATE wr_endpoints SET name = $1, url = $2, priority = $3, enabled = $4, \
             headers = $5, timeout_ms = $6, retry_count = $7, updated_at = $8 WHERE id = $9",
        )
        .bind(&record.name)
        .bind(&record.url)
        .bind(record.priority)
        .bind(record.enabled)
        .bind(&headers_json)
        .bind(record.timeout_ms as i64)
        .bind(record.retry_count as i32)
        .bind(record.updated_at.map(|t| t.timestamp_millis()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn delete_endpoint(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM wr_endpoints WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl DeliveryLogStore for PostgresStore {
    async fn append(&self, record: DeliveryRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO wr_delivery_logs \
             (id, tenant_id, endpoint_id, outcome, status_code, error_message, request_body, response_time_ms, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(Uuid::new_v4())
        .bind(&record.tenant_id)
        .bind(record.endpoint_id)
        .bind(record.outcome.as_str())
        .bind(record.status_code.map(|c| c as i32))
        .bind(&record.error_message)
        .bind(&record.request_body)
        .bind(record.response_time_ms as i64)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(&self, query: LogQuery) -> Result<LogPage> {
        let (rows, stats_row) = if let Some(outcome) = query.outcome {
            let rows = sqlx::query(
                "SELECT l.id, l.tenant_id, l.endpoint_id, e.name AS endpoint_name, l.outcome, \
                        l.status_code, l.error_message, l.response_time_ms, l.created_at \
                 FROM wr_delivery_logs l \
                 LEFT JOIN wr_endpoints e ON e.id = l.endpoint_id \
                 WHERE l.tenant_id = $1 AND l.outcome = $2 \
                 ORDER BY l.created_at DESC LIMIT $3 OFFSET $4",
            )
            .bind(&query.tenant_id)
            .bind(outcome.as_str())
            .bind(query.limit as i64)
            .bind(query.offset as i64)
            .fetch_all(&self.pool)
            .await?;

            let stats = sqlx::query(
                "SELECT COUNT(*) AS total, \
                        COUNT(*) FILTER (WHERE outcome = 'success') AS success \
                 FROM wr_delivery_logs WHERE tenant_id = $1 AND outcome = $2",
            )
            .bind(&query.tenant_id)
            .bind(outcome.as_str())
            .fetch_one(&self.pool)
            .await?;

            (rows, stats)
        } else {
            let rows = sqlx::query(
                "SELECT l.id, l.tenant_id, l.endpoint_id, e.name AS endpoint_name, l.outcome, \
                        l.status_code, l.error_message, l.response_time_ms, l.created_at \
                 FROM wr_delivery_logs l \
                 LEFT JOIN wr_endpoints e ON e.id = l.endpoint_id \
                 WHERE l.tenant_id = $1 \
                 ORDER BY l.created_at DESC LIMIT $2 OFFSET $3",
            )
            .bind(&query.tenant_id)
            .bind(query.limit as i64)
            .bind(query.offset as i64)
            .fetch_all(&self.pool)
            .await?;

            let stats = sqlx::query(
                "SELECT COUNT(*) AS total, \
                        COUNT(*) FILTER (WHERE outcome = 'success') AS success \
                 FROM wr_delivery_logs WHERE tenant_id = $1",
            )
            .bind(&query.tenant_id)
            .fetch_one(&self.pool)
            .await?;

            (rows, stats)
        };

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push(Self::parse_log_row(row)?);
        }

        let total = stats_row.get::<i64, _>("total") as u64;
        let success = stats_row.get::<i64, _>("success") as u64;

        Ok(LogPage {
            entries,
            stats: LogStats {
                total,
                success,
                failure: total - success,
            },
            limit: query.limit,
            offset: query.offset,
        })
    }
}
