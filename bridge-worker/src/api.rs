//! The worker face's own HTTP control surface: health, status, the tool
//! catalog, ad-hoc step/tool execution, Frank/sibling lifecycle management,
//! and the escalation ("lightning") surface.
//!
//! A flat `Router` assembled from `axum::routing::{get, post}` handlers
//! taking `State<IgorState>`, since the worker face's surface has no
//! WebSocket endpoint of its own to split out into a submodule.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bridge_types::component::ComponentId;
use bridge_types::plan::{Plan, Step};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::IgorState;

/// Builds the worker face's HTTP router. `metrics_handle` renders the text
/// exposition format for `/metrics` directly, bypassing `State<IgorState>`
/// since the Prometheus recorder is process-global rather than part of the
/// worker face's own state.
pub fn routes(state: IgorState, metrics_handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/metrics", get(move || async move { metrics_handle.render() }))
        .route("/tools", get(list_tools))
        .route("/toolbag", get(list_toolbag))
        .route("/tools/{name}/execute", post(execute_tool))
        .route("/franks", get(list_franks).post(spawn_frank))
        .route("/franks/{id}/kill", post(kill_frank))
        .route("/franks/{id}/execute", post(execute_on_frank))
        .route("/igors", get(list_igors).post(spawn_igor))
        .route("/igors/{id}/kill", post(kill_igor))
        .route("/execute", post(execute_step))
        .route("/plan", post(submit_plan))
        .route("/queue", get(queue_status).post(submit_plan))
        .route("/circuit", get(circuit_status))
        .route("/circuit/reset", post(reset_circuit))
        .route("/lightning", get(lightning_status))
        .route("/lightning/strike", post(lightning_strike))
        .route("/lightning/powerdown", post(lightning_powerdown))
        .route("/lightning/think", post(lightning_think))
        .route("/lightning/history", get(lightning_history))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn status(State(state): State<IgorState>) -> Json<Value> {
    Json(json!({
        "component": state.component_name.as_str(),
        "version": state.config.version,
        "lightning": state.lightning.status(),
        "executorCircuit": state.plan_engine.executor_circuit_state().to_string(),
        "franksActive": state.frank_pool.list().len(),
        "siblingsActive": state.sibling_pool.list().len(),
    }))
}

async fn list_tools(State(state): State<IgorState>) -> Json<Value> {
    Json(json!({ "tools": state.tools.get().unwrap_or_default() }))
}

/// Returns only the `frank_`-prefixed tool-bag verbs of the cached catalog,
/// the subset a submitted plan's `toolBag` curates from.
async fn list_toolbag(State(state): State<IgorState>) -> Json<Value> {
    let toolbag: Vec<_> = state.tools.get().unwrap_or_default().into_iter().filter(|tool| Step::is_tool_bag_verb(&tool.name)).collect();
    Json(json!({ "toolBag": toolbag }))
}

#[derive(Debug, Deserialize, Default)]
struct ExecuteBody {
    #[serde(default)]
    params: Value,
}

async fn execute_tool(State(state): State<IgorState>, Path(name): Path<String>, body: Option<Json<ExecuteBody>>) -> Response {
    let params = body.map(|Json(b)| b.params).unwrap_or(Value::Null);
    result_response(state.plan_engine.invoke_tool(&name, params).await)
}

async fn list_franks(State(state): State<IgorState>) -> Json<Value> {
    Json(json!({ "franks": state.frank_pool.list() }))
}

async fn spawn_frank(State(state): State<IgorState>) -> Response {
    match state.frank_pool.spawn() {
        Ok((id, _died_rx)) => (StatusCode::ACCEPTED, Json(json!({ "id": id }))).into_response(),
        Err(err) => (StatusCode::CONFLICT, Json(json!({ "error": err.to_string() }))).into_response(),
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

async fn kill_frank(State(state): State<IgorState>, Path(id): Path<Uuid>, body: Option<Json<KillBody>>) -> Response {
    let grace = Duration::from_secs(body.map(|Json(b)| b.grace_secs).unwrap_or_else(default_grace_secs));
    state.frank_pool.kill(id, grace);
    StatusCode::ACCEPTED.into_response()
}

async fn execute_on_frank(State(state): State<IgorState>, Path(id): Path<Uuid>, body: Option<Json<ExecuteBody>>) -> Response {
    let Some(record) = state.frank_pool.get(id) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "no such frank" }))).into_response();
    };
    let Ok(target) = ComponentId::parse(record.component_name) else {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "frank has an invalid component name" }))).into_response();
    };
    let params = body.map(|Json(b)| b.params).unwrap_or(Value::Null);
    let payload = json!({ "tool": "execute_intent", "params": params });
    let timeout = state.config.default_step_timeout;
    result_response(state.plan_engine.send_request_to(target, bridge_types::wire::TOOL_INVOKE, payload, timeout).await)
}

async fn list_igors(State(state): State<IgorState>) -> Json<Value> {
    Json(json!({ "igors": state.sibling_pool.list() }))
}

#[derive(Debug, Deserialize, Default)]
struct SpawnIgorBody {
    route: Option<String>,
}

async fn spawn_igor(State(state): State<IgorState>, body: Option<Json<SpawnIgorBody>>) -> Response {
    let route = body.and_then(|Json(b)| b.route);
    match state.sibling_pool.spawn(route) {
        Ok((id, _died_rx)) => (StatusCode::ACCEPTED, Json(json!({ "id": id }))).into_response(),
        Err(err) => (StatusCode::CONFLICT, Json(json!({ "error": err.to_string() }))).into_response(),
    }
}

async fn kill_igor(State(state): State<IgorState>, Path(id): Path<Uuid>, body: Option<Json<KillBody>>) -> Response {
    let grace = Duration::from_secs(body.map(|Json(b)| b.grace_secs).unwrap_or_else(default_grace_secs));
    state.sibling_pool.kill(id, grace);
    StatusCode::ACCEPTED.into_response()
}

async fn execute_step(State(state): State<IgorState>, Json(step): Json<Step>) -> Response {
    result_response(state.plan_engine.execute_ad_hoc(step).await)
}

async fn submit_plan(State(state): State<IgorState>, Json(plan): Json<Plan>) -> Response {
    let reply_to = ComponentId::parse(format!("{}-http", state.component_name)).unwrap_or(ComponentId::Broadcast);
    let engine = state.plan_engine.clone();
    tokio::spawn(async move { engine.execute(plan, reply_to).await });
    StatusCode::ACCEPTED.into_response()
}

#[derive(Debug, Deserialize)]
struct QueueQuery {
    #[allow(dead_code)]
    limit: Option<usize>,
}

async fn queue_status(State(state): State<IgorState>, Query(_query): Query<QueueQuery>) -> Json<Value> {
    Json(json!({
        "maxFranks": state.config.max_franks,
        "queueSize": state.config.queue_size,
        "franksRegistered": state.frank_pool.list().len(),
    }))
}

async fn circuit_status(State(state): State<IgorState>) -> Json<Value> {
    Json(json!({ "state": state.plan_engine.executor_circuit_state().to_string() }))
}

async fn reset_circuit(State(state): State<IgorState>) -> StatusCode {
    state.plan_engine.reset_executor_circuit();
    StatusCode::NO_CONTENT
}

async fn lightning_status(State(state): State<IgorState>) -> Json<Value> {
    Json(serde_json::to_value(state.lightning.status()).unwrap_or_default())
}

#[derive(Debug, Deserialize, Default)]
struct StrikeBody {
    reason: Option<String>,
}

async fn lightning_strike(State(state): State<IgorState>, body: Option<Json<StrikeBody>>) -> Json<Value> {
    let reason = body.and_then(|Json(b)| b.reason).unwrap_or_else(|| "requested via http".to_string());
    state.lightning.strike(reason);
    Json(json!({ "mode": state.lightning.mode() }))
}

async fn lightning_powerdown(State(state): State<IgorState>) -> Json<Value> {
    state.lightning.power_down();
    Json(json!({ "mode": state.lightning.mode() }))
}

#[derive(Debug, Deserialize, Default)]
struct ThinkBody {
    #[serde(default)]
    prompt: String,
}

async fn lightning_think(State(state): State<IgorState>, body: Option<Json<ThinkBody>>) -> Json<Value> {
    let prompt = body.map(|Json(b)| b.prompt).unwrap_or_default();
    let thought = state.think(prompt);
    Json(json!({ "thought": thought }))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn lightning_history(State(state): State<IgorState>, Query(query): Query<HistoryQuery>) -> Json<Value> {
    let limit = query.limit.unwrap_or(50);
    Json(json!({ "history": state.lightning.history(limit) }))
}

fn result_response(result: Result<Value, String>) -> Response {
    match result {
        Ok(payload) => Json(json!({ "result": payload })).into_response(),
        Err(err) => (StatusCode::BAD_GATEWAY, Json(json!({ "error": err }))).into_response(),
    }
}
