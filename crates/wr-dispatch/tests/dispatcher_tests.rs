//! Dispatcher fan-out integration tests
//!
//! Tests the complete dispatch flow against wiremock targets:
//! target resolution, concurrent fan-out, partial-failure isolation,
//! aggregation invariants, registry fallback, and audit correlation.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bytes::Bytes;
use wr_common::{DeliveryOutcome, DeliveryRecord, DeliveryResult, DeliveryTarget, WebhookEvent};
use wr_dispatch::{
    Deliverer, Dispatcher, DispatcherConfig, HttpDeliverer, HttpDelivererConfig, LogCorrelator,
};
use wr_store::{
    DeliveryLogStore, EndpointRegistry, LogPage, LogQuery, MemoryStore, NewEndpoint, StoreError,
};

fn fast_deliverer() -> Arc<HttpDeliverer> {
    Arc::new(HttpDeliverer::with_config(HttpDelivererConfig {
        inter_retry_delay: Duration::from_millis(10),
        ..Default::default()
    }))
}

fn dispatcher_config(primary_base_url: &str) -> DispatcherConfig {
    let mut config = DispatcherConfig::new(primary_base_url);
    config.registry_timeout = Duration::from_millis(500);
    config.primary_retry_count = 1;
    config
}

fn test_event(tenant_id: &str) -> WebhookEvent {
    WebhookEvent::new(
        tenant_id,
        Some("sig".to_string()),
        Bytes::from_static(b"{\"events\":[]}"),
    )
}

fn new_endpoint(tenant: &str, name: &str, url: &str, priority: i32) -> NewEndpoint {
    NewEndpoint {
        tenant_id: tenant.to_string(),
        name: name.to_string(),
        url: url.to_string(),
        priority: Some(priority),
        enabled: None,
        headers: None,
        timeout_ms: Some(1_000),
        retry_count: Some(2),
    }
}

async fn mount_ok(server: &MockServer, route: &str) {
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_primary_is_always_present_and_first() {
    let primary = MockServer::start().await;
    mount_ok(&primary, "/api/line-webhook/t1").await;

    let registry = Arc::new(MemoryStore::new());
    let dispatcher = Dispatcher::new(
        fast_deliverer(),
        registry,
        dispatcher_config(&primary.uri()),
    );

    let summary = dispatcher.dispatch(&test_event("t1")).await;

    assert_eq!(summary.total, 1);
    assert_eq!(summary.success_count, 1);
    assert!(summary.results[0].target.is_primary());
    assert_eq!(summary.results[0].status_code, Some(200));
}

#[tokio::test]
async fn test_fanout_preserves_target_order() {
    let primary = MockServer::start().await;
    mount_ok(&primary, "/api/line-webhook/t1").await;
    let secondary = MockServer::start().await;
    mount_ok(&secondary, "/high").await;
    mount_ok(&secondary, "/low").await;

    let registry = Arc::new(MemoryStore::new());
    registry
        .create_endpoint(new_endpoint("t1", "low", &format!("{}/low", secondary.uri()), 10))
        .await
        .unwrap();
    registry
        .create_endpoint(new_endpoint("t1", "high", &format!("{}/high", secondary.uri()), 90))
        .await
        .unwrap();

    let dispatcher = Dispatcher::new(
        fast_deliverer(),
        registry,
        dispatcher_config(&primary.uri()),
    );

    let summary = dispatcher.dispatch(&test_event("t1")).await;

    assert_eq!(summary.total, 3);
    assert!(summary.results[0].target.is_primary());
    assert_eq!(summary.results[1].target.name.as_deref(), Some("high"));
    assert_eq!(summary.results[2].target.name.as_deref(), Some("low"));
}

#[tokio::test]
async fn test_partial_failure_is_isolated() {
    let primary = MockServer::start().await;
    mount_ok(&primary, "/api/line-webhook/t1").await;
    let healthy = MockServer::start().await;
    mount_ok(&healthy, "/hook").await;

    let registry = Arc::new(MemoryStore::new());
    registry
        .create_endpoint(new_endpoint("t1", "healthy", &format!("{}/hook", healthy.uri()), 90))
        .await
        .unwrap();
    // Nothing listens on this port; every attempt is a transport error.
    registry
        .create_endpoint(new_endpoint("t1", "dead", "http://127.0.0.1:59998/hook", 10))
        .await
        .unwrap();

    let dispatcher = Dispatcher::new(
        fast_deliverer(),
        registry,
        dispatcher_config(&primary.uri()),
    );

    let summary = dispatcher.dispatch(&test_event("t1")).await;

    assert_eq!(summary.total, 3);
    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.failure_count, 1);
    assert_eq!(summary.success_count + summary.failure_count, summary.total);

    let healthy_result = &summary.results[1];
    assert_eq!(healthy_result.outcome, DeliveryOutcome::Success);
    assert_eq!(healthy_result.attempts, 1);

    let dead_result = &summary.results[2];
    assert_eq!(dead_result.outcome, DeliveryOutcome::Failure);
    assert_eq!(dead_result.attempts, 2);
    assert!(dead_result.error_message.is_some());
}

#[tokio::test]
async fn test_downstream_500_aggregates_as_success() {
    let primary = MockServer::start().await;
    mount_ok(&primary, "/api/line-webhook/t1").await;
    let broken = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&broken)
        .await;

    let registry = Arc::new(MemoryStore::new());
    registry
        .create_endpoint(new_endpoint("t1", "broken", &format!("{}/hook", broken.uri()), 50))
        .await
        .unwrap();

    let dispatcher = Dispatcher::new(
        fast_deliverer(),
        registry,
        dispatcher_config(&primary.uri()),
    );

    let summary = dispatcher.dispatch(&test_event("t1")).await;

    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.results[1].outcome, DeliveryOutcome::Success);
    assert_eq!(summary.results[1].status_code, Some(500));
    assert_eq!(summary.results[1].attempts, 1);
}

struct FailingRegistry;

#[async_trait]
impl EndpointRegistry for FailingRegistry {
    async fn list_enabled_targets(&self, _tenant_id: &str) -> wr_store::Result<Vec<DeliveryTarget>> {
        Err(StoreError::Database("registry unavailable".to_string()))
    }

    async fn list_endpoints(&self, _tenant_id: &str) -> wr_store::Result<Vec<wr_store::EndpointRecord>> {
        Err(StoreError::Database("registry unavailable".to_string()))
    }

    async fn create_endpoint(&self, _new: NewEndpoint) -> wr_store::Result<wr_store::EndpointRecord> {
        Err(StoreError::Database("registry unavailable".to_string()))
    }

    async fn update_endpoint(
        &self,
        id: uuid::Uuid,
        _update: wr_store::EndpointUpdate,
    ) -> wr_store::Result<wr_store::EndpointRecord> {
        Err(StoreError::NotFound(id))
    }

    async fn delete_endpoint(&self, id: uuid::Uuid) -> wr_store::Result<()> {
        Err(StoreError::NotFound(id))
    }
}

#[tokio::test]
async fn test_registry_failure_does_not_block_primary() {
    let primary = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/line-webhook/t1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&primary)
        .await;

    let dispatcher = Dispatcher::new(
        fast_deliverer(),
        Arc::new(FailingRegistry),
        dispatcher_config(&primary.uri()),
    );

    let summary = dispatcher.dispatch(&test_event("t1")).await;

    assert_eq!(summary.total, 1);
    assert_eq!(summary.success_count, 1);
    assert!(summary.results[0].target.is_primary());
}

struct SlowRegistry;

#[async_trait]
impl EndpointRegistry for SlowRegistry {
    async fn list_enabled_targets(&self, _tenant_id: &str) -> wr_store::Result<Vec<DeliveryTarget>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Vec::new())
    }

    async fn list_endpoints(&self, _tenant_id: &str) -> wr_store::Result<Vec<wr_store::EndpointRecord>> {
        Ok(Vec::new())
    }

    async fn create_endpoint(&self, _new: NewEndpoint) -> wr_store::Result<wr_store::EndpointRecord> {
        Err(StoreError::Database("read-only".to_string()))
    }

    async fn update_endpoint(
        &self,
        id: uuid::Uuid,
        _update: wr_store::EndpointUpdate,
    ) -> wr_store::Result<wr_store::EndpointRecord> {
        Err(StoreError::NotFound(id))
    }

    async fn delete_endpoint(&self, id: uuid::Uuid) -> wr_store::Result<()> {
        Err(StoreError::NotFound(id))
    }
}

#[tokio::test]
async fn test_slow_registry_cannot_stall_dispatch() {
    let primary = MockServer::start().await;
    mount_ok(&primary, "/api/line-webhook/t1").await;

    let mut config = dispatcher_config(&primary.uri());
    config.registry_timeout = Duration::from_millis(50);

    let dispatcher = Dispatcher::new(fast_deliverer(), Arc::new(SlowRegistry), config);

    let started = std::time::Instant::now();
    let summary = dispatcher.dispatch(&test_event("t1")).await;

    assert_eq!(summary.total, 1);
    assert!(started.elapsed() < Duration::from_secs(2));
}

/// Deliverer that panics for one URL, to exercise worker isolation.
struct PanickingDeliverer {
    poison_url: String,
    inner: Arc<HttpDeliverer>,
}

#[async_trait]
impl Deliverer for PanickingDeliverer {
    async fn deliver(&self, target: &DeliveryTarget, event: &WebhookEvent) -> DeliveryResult {
        if target.url == self.poison_url {
            panic!("worker blew up");
        }
        self.inner.deliver(target, event).await
    }
}

#[tokio::test]
async fn test_worker_panic_is_captured_as_failure() {
    let primary = MockServer::start().await;
    mount_ok(&primary, "/api/line-webhook/t1").await;

    let poison_url = "http://127.0.0.1:59997/hook".to_string();
    let registry = Arc::new(MemoryStore::new());
    registry
        .create_endpoint(new_endpoint("t1", "poison", &poison_url, 50))
        .await
        .unwrap();

    let deliverer = Arc::new(PanickingDeliverer {
        poison_url,
        inner: fast_deliverer(),
    });
    let dispatcher = Dispatcher::new(deliverer, registry, dispatcher_config(&primary.uri()));

    let summary = dispatcher.dispatch(&test_event("t1")).await;

    assert_eq!(summary.total, 2);
    assert_eq!(summary.success_count, 1);
    assert_eq!(summary.results[1].outcome, DeliveryOutcome::Failure);
    assert!(summary.results[1]
        .error_message
        .as_deref()
        .unwrap()
        .contains("Delivery worker failed"));
}

/// Log store that records appended records for assertions.
#[derive(Default)]
struct RecordingLogStore {
    records: parking_lot::Mutex<Vec<DeliveryRecord>>,
}

#[async_trait]
impl DeliveryLogStore for RecordingLogStore {
    async fn append(&self, record: DeliveryRecord) -> wr_store::Result<()> {
        self.records.lock().push(record);
        Ok(())
    }

    async fn query(&self, query: LogQuery) -> wr_store::Result<LogPage> {
        Ok(LogPage {
            entries: Vec::new(),
            stats: Default::default(),
            limit: query.limit,
            offset: query.offset,
        })
    }
}

#[tokio::test]
async fn test_audit_records_exclude_the_primary() {
    let primary = MockServer::start().await;
    mount_ok(&primary, "/api/line-webhook/t1").await;
    let secondary = MockServer::start().await;
    mount_ok(&secondary, "/hook").await;

    let registry = Arc::new(MemoryStore::new());
    let created = registry
        .create_endpoint(new_endpoint("t1", "logged", &format!("{}/hook", secondary.uri()), 50))
        .await
        .unwrap();

    let dispatcher = Dispatcher::new(
        fast_deliverer(),
        registry,
        dispatcher_config(&primary.uri()),
    );
    let log_store = Arc::new(RecordingLogStore::default());
    let correlator = LogCorrelator::new(log_store.clone());

    let event = test_event("t1");
    let summary = dispatcher.dispatch(&event).await;
    assert_eq!(summary.total, 2);

    correlator.record_detached(&event, &summary);

    // The write is detached; give it a moment to land.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let records = log_store.records.lock();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].endpoint_id, created.id);
    assert_eq!(records[0].tenant_id, "t1");
    assert_eq!(records[0].outcome, DeliveryOutcome::Success);
    assert_eq!(records[0].request_body, "{\"events\":[]}");
}
