//! In-memory store implementation.
//!
//! Used in development mode when no database is configured, and by tests.
//! A single struct backs both collaborator traits so log queries can resolve
//! endpoint names the same way the SQL implementation does with a join.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use wr_common::{DeliveryRecord, DeliveryTarget};

use crate::error::{Result, StoreError};
use crate::{
    DeliveryLogStore, EndpointRecord, EndpointRegistry, EndpointUpdate, LogEntry, LogPage,
    LogQuery, LogStats, NewEndpoint,
};

#[derive(Default)]
pub struct MemoryStore {
    endpoints: DashMap<Uuid, EndpointRecord>,
    logs: RwLock<Vec<LogEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an endpoint directly, bypassing defaulting. Test helper.
    pub fn insert_endpoint(&self, record: EndpointRecord) {
        self.endpoints.insert(record.id, record);
    }

    fn sorted_for_tenant(&self, tenant_id: &str) -> Vec<EndpointRecord> {
        let mut records: Vec<EndpointRecord> = self
            .endpoints
            .iter()
            .filter(|entry| entry.value().tenant_id == tenant_id)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        records
    }
}

#[async_trait]
impl EndpointRegistry for MemoryStore {
    async fn list_enabled_targets(&self, tenant_id: &str) -> Result<Vec<DeliveryTarget>> {
        Ok(self
            .sorted_for_tenant(tenant_id)
            .iter()
            .filter(|r| r.enabled)
            .map(EndpointRecord::to_target)
            .collect())
    }

    async fn list_endpoints(&self, tenant_id: &str) -> Result<Vec<EndpointRecord>> {
        Ok(self.sorted_for_tenant(tenant_id))
    }

    async fn create_endpoint(&self, new: NewEndpoint) -> Result<EndpointRecord> {
        let record = new.into_record();
        self.endpoints.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_endpoint(&self, id: Uuid, update: EndpointUpdate) -> Result<EndpointRecord> {
        let mut entry = self.endpoints.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        update.apply(entry.value_mut());
        Ok(entry.value().clone())
    }

    async fn delete_endpoint(&self, id: Uuid) -> Result<()> {
        self.endpoints.remove(&id).ok_or(StoreError::NotFound(id))?;
        Ok(())
    }
}

#[async_trait]
impl DeliveryLogStore for MemoryStore {
    async fn append(&self, record: DeliveryRecord) -> Result<()> {
        let endpoint_name = self
            .endpoints
            .get(&record.endpoint_id)
            .map(|e| e.name.clone());

        self.logs.write().push(LogEntry {
            id: Uuid::new_v4(),
            tenant_id: record.tenant_id,
            endpoint_id: record.endpoint_id,
            endpoint_name,
            outcome: record.outcome,
            status_code: record.status_code,
            error_message: record.error_message,
            response_time_ms: record.response_time_ms,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn query(&self, query: LogQuery) -> Result<LogPage> {
        let logs = self.logs.read();
        let mut matching: Vec<LogEntry> = logs
            .iter()
            .filter(|l| l.tenant_id == query.tenant_id)
            .filter(|l| query.outcome.map_or(true, |o| l.outcome == o))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let stats = LogStats {
            total: matching.len() as u64,
            success: matching.iter().filter(|l| l.outcome == wr_common::DeliveryOutcome::Success).count() as u64,
            failure: matching.iter().filter(|l| l.outcome == wr_common::DeliveryOutcome::Failure).count() as u64,
        };

        let entries = matching
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect();

        Ok(LogPage {
            entries,
            stats,
            limit: query.limit,
            offset: query.offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use wr_common::DeliveryOutcome;

    fn new_endpoint(tenant: &str, name: &str, priority: i32) -> NewEndpoint {
        NewEndpoint {
            tenant_id: tenant.to_string(),
            name: name.to_string(),
            url: format!("http://{}.example.com/hook", name),
            priority: Some(priority),
            enabled: None,
            headers: None,
            timeout_ms: None,
            retry_count: None,
        }
    }

    #[tokio::test]
    async fn targets_ordered_by_priority_then_creation() {
        let store = MemoryStore::new();

        let low = new_endpoint("t1", "low", 10).into_record();
        let mut high_old = new_endpoint("t1", "high-old", 90).into_record();
        let mut high_new = new_endpoint("t1", "high-new", 90).into_record();
        high_old.created_at = Utc::now() - Duration::seconds(60);
        high_new.created_at = Utc::now();
        store.insert_endpoint(low);
        store.insert_endpoint(high_old);
        store.insert_endpoint(high_new);

        let targets = store.list_enabled_targets("t1").await.unwrap();
        let names: Vec<_> = targets.iter().map(|t| t.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["high-old", "high-new", "low"]);
    }

    #[tokio::test]
    async fn disabled_endpoints_are_excluded_from_targets() {
        let store = MemoryStore::new();
        let created = store.create_endpoint(new_endpoint("t1", "a", 50)).await.unwrap();
        store
            .update_endpoint(
                created.id,
                EndpointUpdate {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(store.list_enabled_targets("t1").await.unwrap().is_empty());
        assert_eq!(store.list_endpoints("t1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let store = MemoryStore::new();
        store.create_endpoint(new_endpoint("t1", "a", 50)).await.unwrap();
        store.create_endpoint(new_endpoint("t2", "b", 50)).await.unwrap();

        assert_eq!(store.list_enabled_targets("t1").await.unwrap().len(), 1);
        assert_eq!(store.list_enabled_targets("t2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_of_unknown_endpoint_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_endpoint(Uuid::new_v4(), EndpointUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn log_query_filters_and_counts() {
        let store = MemoryStore::new();
        let endpoint = store.create_endpoint(new_endpoint("t1", "a", 50)).await.unwrap();

        for (outcome, status) in [
            (DeliveryOutcome::Success, Some(200)),
            (DeliveryOutcome::Success, Some(500)),
            (DeliveryOutcome::Failure, None),
        ] {
            store
                .append(DeliveryRecord {
                    tenant_id: "t1".to_string(),
                    endpoint_id: endpoint.id,
                    outcome,
                    status_code: status,
                    error_message: None,
                    request_body: "{}".to_string(),
                    response_time_ms: 5,
                })
                .await
                .unwrap();
        }

        let page = store.query(LogQuery::for_tenant("t1")).await.unwrap();
        assert_eq!(page.stats.total, 3);
        assert_eq!(page.stats.success, 2);
        assert_eq!(page.stats.failure, 1);
        assert_eq!(page.entries[0].endpoint_name.as_deref(), Some("a"));

        let failures = store
            .query(LogQuery {
                outcome: Some(DeliveryOutcome::Failure),
                ..LogQuery::for_tenant("t1")
            })
            .await
            .unwrap();
        assert_eq!(failures.entries.len(), 1);
        assert_eq!(failures.stats.total, 1);
    }
}
