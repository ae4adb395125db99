//! Webhook Relay Dispatcher
//!
//! Core fan-out machinery for the webhook relay:
//! - Dispatcher: builds the target list and runs delivery workers concurrently
//! - HttpDeliverer: per-target delivery with bounded retries and timeouts
//! - LogCorrelator: best-effort audit records for registry-sourced targets
//! - Ack policy: the fixed-success acknowledgment returned to the caller
//! - API: axum HTTP surface (ingestion, registry admin, logs, health)

pub mod ack;
pub mod api;
pub mod correlator;
pub mod deliverer;
pub mod dispatch_metrics;
pub mod dispatcher;
pub mod error;

pub use ack::{AckCounts, AckResponse};
pub use api::{create_router, AppState, AuthConfig};
pub use correlator::LogCorrelator;
pub use deliverer::{Deliverer, HttpDeliverer, HttpDelivererConfig, DEFAULT_INTER_RETRY_DELAY};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::DispatchError;

pub type Result<T> = std::result::Result<T, DispatchError>;
