//! The hub's HTTP and WebSocket surfaces (C6).

pub mod http;
pub mod ws;

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

use crate::HubState;

/// Builds the hub's combined HTTP + WebSocket router.
pub fn routes(state: HubState, metrics_handle: PrometheusHandle) -> Router {
    http::routes(metrics_handle)
        .route("/ws", get(ws::upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
