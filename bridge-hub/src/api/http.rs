//! The hub's read-only/admin HTTP control surface.
//!
//! A flat `Router` assembled from `axum::routing::{get, post}` handlers
//! taking `State<HubState>`, covering liveness/readiness, the component
//! registry, message/DLQ/circuit/rate-limit introspection, Supervisor
//! ("doctor") child lifecycle, and the report/screenshot store.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bridge_core::DeadLetter;
use bridge_types::report::{ReportSubmission, ScreenshotSubmission};
use bridge_types::{ComponentName, Message};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::HubState;
use crate::connection::{ConnectionLifecycle, ConnectionSnapshot, KickReason};
use crate::memory::MemoryPressure;

/// Builds the hub's HTTP router. Left without its state attached so
/// [`crate::api::routes`] can merge it alongside the WebSocket route before
/// calling `with_state` once. `metrics_handle` renders the text-exposition
/// format for `/metrics` directly, bypassing `State<HubState>` since the
/// Prometheus recorder is process-global rather than part of the hub's own
/// state.
pub fn routes(metrics_handle: PrometheusHandle) -> Router<HubState> {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/live", get(live))
        .route("/components", get(components))
        .route("/messages", get(messages))
        .route("/dlq", get(dlq))
        .route("/circuits", get(circuits))
        .route("/rate-limits", get(rate_limits))
        .route("/metrics", get(move || async move { metrics_handle.render() }))
        .route("/debug/state", get(debug_state))
        .route("/admin/kick/{id}", post(admin_kick))
        .route("/admin/circuit/reset/{name}", post(admin_circuit_reset))
        .route("/doctors", get(list_doctors).post(spawn_doctor))
        .route("/doctors/{id}", get(get_doctor))
        .route("/doctors/{id}/kill", post(kill_doctor))
        .route("/doctors/kill-all", post(kill_all_doctors))
        .route("/reports", get(list_reports).post(submit_report))
        .route("/reports/plan/{id}", get(reports_for_plan))
        .route("/reports/summary/{id}", get(report_summary))
        .route("/screenshots", post(submit_screenshot))
}

async fn health() -> &'static str {
    "ok"
}

/// Readiness is false while draining or under critical memory pressure.
async fn ready(State(state): State<HubState>) -> Response {
    let not_ready = state.connections.is_draining() || state.memory.current_pressure() == MemoryPressure::Critical;
    if not_ready {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "ready": false }))).into_response()
    } else {
        Json(json!({ "ready": true })).into_response()
    }
}

async fn live() -> &'static str {
    "ok"
}

fn lifecycle_label(lifecycle: ConnectionLifecycle) -> &'static str {
    match lifecycle {
        ConnectionLifecycle::Accepted => "accepted",
        ConnectionLifecycle::Registered => "registered",
        ConnectionLifecycle::Active => "active",
        ConnectionLifecycle::Stale => "stale",
    }
}

fn connection_json(snapshot: &ConnectionSnapshot) -> Value {
    json!({
        "id": snapshot.id,
        "lifecycle": lifecycle_label(snapshot.lifecycle),
        "component": snapshot.component.as_ref().map(ComponentName::as_str),
        "version": snapshot.version,
        "healthScore": snapshot.health_score,
        "errorCount": snapshot.error_count,
        "messagesSent": snapshot.messages_sent,
        "connectedSecsAgo": snapshot.connected_at.elapsed().as_secs_f64(),
        "lastActivitySecsAgo": snapshot.last_activity.elapsed().as_secs_f64(),
    })
}

async fn components(State(state): State<HubState>) -> Json<Value> {
    let snapshots: Vec<Value> = state.connections.snapshot_all().iter().map(connection_json).collect();
    Json(json!({ "components": snapshots }))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

async fn messages(State(state): State<HubState>, Query(query): Query<LimitQuery>) -> Json<Value> {
    let limit = query.limit.unwrap_or(100);
    Json(json!({ "messages": state.log.recent(limit) }))
}

fn dead_letter_json(letter: &DeadLetter<Uuid, ComponentName, Message>) -> Value {
    json!({
        "messageId": letter.message_id,
        "target": letter.target.as_str(),
        "reason": letter.reason,
        "attempts": letter.attempts,
        "enqueuedSecsAgo": letter.enqueued_at.elapsed().as_secs_f64(),
    })
}

async fn dlq(State(state): State<HubState>) -> Json<Value> {
    let letters: Vec<Value> = state.dlq.snapshot().iter().map(dead_letter_json).collect();
    Json(json!({
        "letters": letters,
        "overflowDropped": state.dlq.overflow_dropped(),
    }))
}

async fn circuits(State(state): State<HubState>) -> Json<Value> {
    let breakers: Vec<Value> = state
        .breakers
        .snapshot()
        .into_iter()
        .map(|(name, stats)| {
            json!({
                "target": name.as_str(),
                "state": stats.state.to_string(),
                "consecutiveFailures": stats.consecutive_failures,
                "totalRequests": stats.total_requests,
                "totalFailures": stats.total_failures,
            })
        })
        .collect();
    Json(json!({ "circuits": breakers }))
}

async fn rate_limits(State(state): State<HubState>) -> Json<Value> {
    Json(json!({
        "trackedKeys": state.rate_limiter.tracked_keys(),
        "refillPerSec": state.config.rate_limit_refill_per_sec,
        "burst": state.config.rate_limit_burst,
    }))
}

async fn debug_state(State(state): State<HubState>) -> Json<Value> {
    Json(json!({
        "connections": state.connections.connection_count(),
        "draining": state.connections.is_draining(),
        "memoryRssMb": state.memory.last_rss_mb(),
        "memoryPressure": format!("{:?}", state.memory.current_pressure()),
        "dlqDepth": state.dlq.len(),
        "doctorsActive": state.doctors.list().len(),
        "errorRateLastMinute": state.error_window.count(),
    }))
}

async fn admin_kick(State(state): State<HubState>, Path(id): Path<Uuid>) -> StatusCode {
    match state.connections.kick(id, KickReason::Admin) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

async fn admin_circuit_reset(State(state): State<HubState>, Path(name): Path<String>) -> Response {
    match ComponentName::parse(name) {
        Ok(name) if state.breakers.reset(&name) => StatusCode::NO_CONTENT.into_response(),
        Ok(_) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => (StatusCode::BAD_REQUEST, Json(json!({ "error": err.to_string() }))).into_response(),
    }
}

async fn list_doctors(State(state): State<HubState>) -> Json<Value> {
    Json(json!({ "doctors": state.doctors.list() }))
}

#[derive(Debug, Deserialize, Default)]
struct SpawnDoctorBody {
    specialization: Option<String>,
}

async fn spawn_doctor(State(state): State<HubState>, body: Option<Json<SpawnDoctorBody>>) -> Response {
    let specialization = body.and_then(|Json(b)| b.specialization);
    match state.doctors.spawn(specialization) {
        Ok((id, _died_rx)) => (StatusCode::ACCEPTED, Json(json!({ "id": id }))).into_response(),
        Err(err) => (StatusCode::CONFLICT, Json(json!({ "error": err.to_string() }))).into_response(),
    }
}

async fn get_doctor(State(state): State<HubState>, Path(id): Path<Uuid>) -> Response {
    match state.doctors.get(id) {
        Some(record) => Json(json!({ "doctor": record })).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Debug, Deserialize, Default)]
struct KillBody {
    #[serde(default = "default_grace_secs")]
    grace_secs: u64,
}

fn default_grace_secs() -> u64 {
    5
}

async fn kill_doctor(State(state): State<HubState>, Path(id): Path<Uuid>, body: Option<Json<KillBody>>) -> StatusCode {
    let grace = Duration::from_secs(body.map(|Json(b)| b.grace_secs).unwrap_or_else(default_grace_secs));
    state.doctors.kill(id, grace, "requested via http");
    StatusCode::ACCEPTED
}

async fn kill_all_doctors(State(state): State<HubState>, body: Option<Json<KillBody>>) -> StatusCode {
    let grace = Duration::from_secs(body.map(|Json(b)| b.grace_secs).unwrap_or_else(default_grace_secs));
    state.doctors.kill_all(grace);
    StatusCode::ACCEPTED
}

async fn list_reports(State(state): State<HubState>, Query(query): Query<LimitQuery>) -> Json<Value> {
    let limit = query.limit.unwrap_or(100);
    Json(json!({ "reports": state.reports.recent(limit) }))
}

async fn submit_report(State(state): State<HubState>, Json(submission): Json<ReportSubmission>) -> Response {
    let id = state.reports.submit(submission.plan_id, submission.step_index, submission.kind, submission.detail);
    (StatusCode::CREATED, Json(json!({ "id": id }))).into_response()
}

async fn reports_for_plan(State(state): State<HubState>, Path(plan_id): Path<String>) -> Json<Value> {
    Json(json!({ "reports": state.reports.for_plan(&plan_id) }))
}

async fn report_summary(State(state): State<HubState>, Path(plan_id): Path<String>) -> Response {
    match state.reports.summary(&plan_id) {
        Some(summary) => Json(summary).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn submit_screenshot(State(state): State<HubState>, Json(submission): Json<ScreenshotSubmission>) -> Response {
    match state
        .reports
        .submit_screenshot(submission.plan_id, submission.step_index, &submission.data_base64)
        .await
    {
        Ok((id, path)) => {
            (StatusCode::CREATED, Json(json!({ "id": id, "path": path.display().to_string() }))).into_response()
        }
        Err(err) => (StatusCode::BAD_REQUEST, Json(json!({ "error": err.to_string() }))).into_response(),
    }
}
