//! Webhook Relay HTTP API
//!
//! Endpoints for:
//! - Webhook ingestion and fan-out (`POST /api/webhook/{tenant_id}`)
//! - Endpoint registry management (API-key protected)
//! - Delivery log queries (API-key protected)
//! - Health and Kubernetes probes
//! - Prometheus metrics

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use wr_common::{WebhookEvent, SIGNATURE_HEADER};
use wr_store::{
    DeliveryLogStore, EndpointRegistry, EndpointUpdate, LogQuery, NewEndpoint, StoreError,
    DEFAULT_LOG_QUERY_LIMIT,
};

use crate::ack::{AckCounts, AckResponse};
use crate::correlator::LogCorrelator;
use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;

pub mod auth;
pub mod model;

pub use auth::AuthConfig;
use auth::require_api_key;
use model::{
    DeleteResponse, EndpointListResponse, EndpointResponse, LogPagination, LogsQuery,
    LogsResponse, TenantQuery,
};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub correlator: Arc<LogCorrelator>,
    pub registry: Arc<dyn EndpointRegistry>,
    pub log_store: Arc<dyn DeliveryLogStore>,
    pub auth: AuthConfig,
    pub dev_mode: bool,
    /// Which store backend the server was started with ("postgres"/"memory").
    pub store_backend: &'static str,
    pub metrics_handle: Option<PrometheusHandle>,
    pub started_at: Instant,
}

/// Service health response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status: UP
    pub status: String,
    pub service: String,
    pub version: String,
    pub uptime_secs: u64,
    pub store_backend: String,
    pub dev_mode: bool,
}

/// Kubernetes probe response
#[derive(Serialize, ToSchema)]
pub struct ProbeResponse {
    /// Probe status: LIVE, READY
    pub status: String,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Webhook Relay API",
        version = "0.1.0",
        description = "Multi-tenant webhook fan-out relay: ingestion, endpoint registry, delivery logs"
    ),
    paths(
        receive_webhook,
        list_endpoints,
        create_endpoint,
        update_endpoint,
        delete_endpoint,
        query_logs,
        health_handler,
        liveness_probe,
        readiness_probe,
        metrics_handler,
    ),
    components(schemas(
        AckResponse,
        AckCounts,
        EndpointListResponse,
        EndpointResponse,
        DeleteResponse,
        LogsResponse,
        LogPagination,
        HealthResponse,
        ProbeResponse,
        wr_store::EndpointRecord,
        wr_store::NewEndpoint,
        wr_store::EndpointUpdate,
        wr_store::LogEntry,
        wr_store::LogStats,
    )),
    tags(
        (name = "webhook", description = "Webhook ingestion and fan-out"),
        (name = "endpoints", description = "Endpoint registry management"),
        (name = "logs", description = "Delivery log queries"),
        (name = "health", description = "Health check endpoints"),
        (name = "monitoring", description = "Metrics endpoints"),
    )
)]
pub struct ApiDoc;

/// Create the full router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/api/endpoints", get(list_endpoints).post(create_endpoint))
        .route("/api/endpoints/{id}", put(update_endpoint).delete(delete_endpoint))
        .route("/api/logs", get(query_logs))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        // Webhook ingestion (unauthenticated by design)
        .route("/api/webhook/{tenant_id}", axum::routing::post(receive_webhook))
        // Admin surface
        .merge(admin)
        // Health and probes
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_probe))
        .route("/health/ready", get(readiness_probe))
        // Prometheus metrics
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// ============================================================================
// Error mapping for the admin surface
// ============================================================================

struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            StoreError::NotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            StoreError::Invalid(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            _ => {
                error!(error = %self.0, "Store operation failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };
        (status, Json(json!({"error": message}))).into_response()
    }
}

// ============================================================================
// Webhook Ingestion
// ============================================================================

/// Receive one webhook call for a tenant and fan it out.
///
/// The response is always HTTP 200 with a success acknowledgment: the
/// emitting platform retries on anything else, and those retries would
/// duplicate fan-out traffic.
#[utoipa::path(
    post,
    path = "/api/webhook/{tenant_id}",
    tag = "webhook",
    params(
        ("tenant_id" = String, Path, description = "Tenant identifier")
    ),
    request_body(content = Vec<u8>, content_type = "application/json", description = "Raw webhook payload"),
    responses(
        (status = 200, description = "Acknowledgment with aggregate delivery counts", body = AckResponse)
    )
)]
async fn receive_webhook(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<AckResponse> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    info!(
        tenant_id = %tenant_id,
        has_signature = signature.is_some(),
        body_bytes = body.len(),
        "Webhook received"
    );

    let ack = match handle_webhook(&state, tenant_id, signature, body).await {
        Ok(ack) => ack,
        Err(e) => {
            error!(error = %e, "Webhook processing error");
            AckResponse::internal_error(e.to_string(), state.dev_mode)
        }
    };

    Json(ack)
}

async fn handle_webhook(
    state: &AppState,
    tenant_id: String,
    signature: Option<String>,
    body: Bytes,
) -> Result<AckResponse, DispatchError> {
    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| DispatchError::InvalidPayload(e.to_string()))?;
    let body = Bytes::from(serde_json::to_vec(&payload)?);

    let event = WebhookEvent::new(tenant_id, signature, body);
    let summary = state.dispatcher.dispatch(&event).await;

    // The ack exists before any log write starts; persistence can no longer
    // influence the response.
    let ack = AckResponse::ok(&summary);
    state.correlator.record_detached(&event, &summary);
    Ok(ack)
}

// ============================================================================
// Endpoint Registry
// ============================================================================

/// List a tenant's endpoints (enabled and disabled).
#[utoipa::path(
    get,
    path = "/api/endpoints",
    tag = "endpoints",
    params(TenantQuery),
    responses(
        (status = 200, description = "Endpoint list", body = EndpointListResponse),
        (status = 401, description = "Missing or invalid API key")
    )
)]
async fn list_endpoints(
    State(state): State<AppState>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<EndpointListResponse>, ApiError> {
    let endpoints = state.registry.list_endpoints(&query.tenant_id).await?;
    Ok(Json(EndpointListResponse { endpoints }))
}

/// Create an endpoint.
#[utoipa::path(
    post,
    path = "/api/endpoints",
    tag = "endpoints",
    request_body = NewEndpoint,
    responses(
        (status = 201, description = "Endpoint created", body = EndpointResponse),
        (status = 401, description = "Missing or invalid API key")
    )
)]
async fn create_endpoint(
    State(state): State<AppState>,
    Json(new): Json<NewEndpoint>,
) -> Result<(StatusCode, Json<EndpointResponse>), ApiError> {
    if new.url.is_empty() {
        return Err(StoreError::Invalid("url is required".to_string()).into());
    }
    let endpoint = state.registry.create_endpoint(new).await?;
    info!(endpoint_id = %endpoint.id, tenant_id = %endpoint.tenant_id, "Endpoint created");
    Ok((StatusCode::CREATED, Json(EndpointResponse { endpoint })))
}

/// Update an endpoint.
#[utoipa::path(
    put,
    path = "/api/endpoints/{id}",
    tag = "endpoints",
    params(
        ("id" = Uuid, Path, description = "Endpoint identifier")
    ),
    request_body = EndpointUpdate,
    responses(
        (status = 200, description = "Endpoint updated", body = EndpointResponse),
        (status = 404, description = "Unknown endpoint"),
        (status = 401, description = "Missing or invalid API key")
    )
)]
async fn update_endpoint(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<EndpointUpdate>,
) -> Result<Json<EndpointResponse>, ApiError> {
    let endpoint = state.registry.update_endpoint(id, update).await?;
    info!(endpoint_id = %id, "Endpoint updated");
    Ok(Json(EndpointResponse { endpoint }))
}

/// Delete an endpoint.
#[utoipa::path(
    delete,
    path = "/api/endpoints/{id}",
    tag = "endpoints",
    params(
        ("id" = Uuid, Path, description = "Endpoint identifier")
    ),
    responses(
        (status = 200, description = "Endpoint deleted", body = DeleteResponse),
        (status = 404, description = "Unknown endpoint"),
        (status = 401, description = "Missing or invalid API key")
    )
)]
async fn delete_endpoint(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.registry.delete_endpoint(id).await?;
    info!(endpoint_id = %id, "Endpoint deleted");
    Ok(Json(DeleteResponse {
        message: "Endpoint deleted successfully".to_string(),
    }))
}

// ============================================================================
// Delivery Logs
// ============================================================================

/// Query a tenant's delivery logs, newest first.
#[utoipa::path(
    get,
    path = "/api/logs",
    tag = "logs",
    params(LogsQuery),
    responses(
        (status = 200, description = "Delivery logs with aggregate stats", body = LogsResponse),
        (status = 400, description = "Invalid outcome filter"),
        (status = 401, description = "Missing or invalid API key")
    )
)]
async fn query_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, ApiError> {
    let outcome = match &query.status {
        Some(status) => Some(
            wr_common::DeliveryOutcome::from_str_opt(status).ok_or_else(|| {
                StoreError::Invalid(format!("unknown status filter: {}", status))
            })?,
        ),
        None => None,
    };

    let page = state
        .log_store
        .query(LogQuery {
            tenant_id: query.tenant_id,
            limit: query.limit.unwrap_or(DEFAULT_LOG_QUERY_LIMIT),
            offset: query.offset.unwrap_or(0),
            outcome,
        })
        .await?;

    Ok(Json(LogsResponse {
        pagination: LogPagination {
            total: page.stats.total,
            limit: page.limit,
            offset: page.offset,
        },
        logs: page.entries,
        stats: page.stats,
    }))
}

// ============================================================================
// Health & Metrics
// ============================================================================

/// Service health.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Health status", body = HealthResponse)
    )
)]
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "UP".to_string(),
        service: "webhook-relay".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        store_backend: state.store_backend.to_string(),
        dev_mode: state.dev_mode,
    })
}

/// Kubernetes liveness probe.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Liveness", body = ProbeResponse)
    )
)]
async fn liveness_probe() -> Json<ProbeResponse> {
    Json(ProbeResponse {
        status: "LIVE".to_string(),
    })
}

/// Kubernetes readiness probe.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Readiness", body = ProbeResponse)
    )
)]
async fn readiness_probe() -> Json<ProbeResponse> {
    Json(ProbeResponse {
        status: "READY".to_string(),
    })
}

/// Prometheus metrics endpoint.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "monitoring",
    responses(
        (status = 200, description = "Prometheus metrics", content_type = "text/plain")
    )
)]
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let output = match &state.metrics_handle {
        Some(handle) => handle.render(),
        None => {
            warn!("Metrics requested but no recorder is installed");
            String::new()
        }
    };

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        output,
    )
        .into_response()
}
