//! Router (C7): validate → dedupe → breaker → deliver or DLQ.
//!
//! A fixed nine-step pipeline runs in order: parse, dedupe, rate limit,
//! verify signature, resolve target, admit through the target's circuit
//! breaker, enqueue for delivery (or dead-letter on failure), log, record
//! metrics. Every suspension point here (parsing, HMAC verification,
//! rate-limiter admission, breaker admission, enqueueing onto a send queue)
//! is non-blocking — the only blocking work (socket writes, process
//! spawn/kill, screenshot writes) happens on dedicated background tasks
//! this function never awaits.

use std::time::Instant;

use bridge_types::report::{ReportSubmission, ScreenshotSubmission};
use bridge_types::{ComponentId, ComponentName, Message};
use serde_json::Value;
use uuid::Uuid;

use crate::HubState;
use crate::connection::KickReason;
use crate::errors::RouterError;
use crate::memory::MemoryPressure;

/// Processes one inbound UTF-8 JSON frame received on `conn_id`.
///
/// Every outcome (success, dedupe drop, schema error, ...) is handled
/// internally — replies are enqueued directly onto the relevant
/// connections' send queues via [`crate::connection::ConnectionManager`].
/// This function never propagates an error to its caller: an unhandled
/// panic inside it would crash the whole connection's read loop, so
/// callers additionally wrap the call in [`std::panic::AssertUnwindSafe`]
/// (see `api::ws`) to keep one connection's failure from taking down the
/// rest of the hub.
pub async fn handle_frame(state: &HubState, conn_id: Uuid, raw: &[u8]) {
    let started = Instant::now();

    // 1. Rate limit.
    if !state.rate_limiter.allow(conn_id) {
        metrics::counter!(crate::metrics::METRICS_ID_MESSAGES_RATE_LIMITED).increment(1);
        let retry_after_secs = state.rate_limiter.retry_after_secs(&conn_id);
        reply_error(state, conn_id, RouterError::RateLimited { retry_after_secs }, None);
        return;
    }

    // 2. Load shed.
    let pressure = state.memory.pressure_for(state.memory.last_rss_mb());
    if pressure != MemoryPressure::Normal && raw.len() > 1024 {
        metrics::counter!(crate::metrics::METRICS_ID_MESSAGES_LOAD_SHED).increment(1);
        reply_error(state, conn_id, RouterError::LoadShed, None);
        return;
    }

    // 3. Size check.
    if raw.len() > state.config.max_message_size {
        state.connections.record_error(conn_id);
        reply_error(
            state,
            conn_id,
            RouterError::OversizeFrame { actual: raw.len(), max: state.config.max_message_size },
            None,
        );
        return;
    }

    // 4. Parse.
    let mut message: Message = match serde_json::from_slice(raw) {
        Ok(message) => message,
        Err(err) => {
            state.error_window.increment();
            metrics::counter!(crate::metrics::METRICS_ID_MESSAGES_ERROR).increment(1);
            reply_error(state, conn_id, RouterError::Malformed(err), None);
            return;
        }
    };

    state.connections.record_activity(conn_id);

    // 5. Schema check: `source`/`target` syntax is already enforced by
    // `ComponentName`/`ComponentId`'s `Deserialize` impls; fill a missing
    // correlation id with the message's own id.
    if message.correlation_id.is_none() {
        message.correlation_id = Some(message.id);
    }

    // 6. Signature.
    if state.config.signing_required {
        let Some(secret) = &state.signing_secret else {
            tracing::error!("signing_required is set but no signing_secret was configured");
            reply_error(state, conn_id, RouterError::SignatureInvalid, message.correlation_id);
            return;
        };
        if !matches!(bridge_types::signing::verify(&message, secret), Ok(true)) {
            metrics::counter!(crate::metrics::METRICS_ID_MESSAGES_ERROR).increment(1);
            reply_error(state, conn_id, RouterError::SignatureInvalid, message.correlation_id);
            return;
        }
    }

    // 7. Dedupe.
    if state.seen_cache.is_duplicate(message.id) {
        metrics::counter!(crate::metrics::METRICS_ID_MESSAGES_DUPLICATE).increment(1);
        return;
    }

    state.log.push(message.clone());

    // 8. Control types, handled inline; 9. routing otherwise.
    if bridge_types::wire::is_hub_control_type(message.message_type.as_str()) {
        handle_control(state, conn_id, message).await;
    } else {
        route(state, conn_id, message).await;
    }

    metrics::histogram!(crate::metrics::METRICS_ID_ROUTING_DURATION)
        .record(started.elapsed().as_secs_f64() * 1000.0);
}

async fn route(state: &HubState, sender_conn_id: Uuid, message: Message) {
    if message.target.is_broadcast() {
        route_broadcast(state, Some(sender_conn_id), message).await;
    } else {
        route_point_to_point(state, message).await;
    }
}

/// Fans `message` out to every registered component except the one bound to
/// `exclude_conn_id` (or every registered component, if `None` — used for
/// hub-originated broadcasts like `version.announce`/`doctor.died`).
async fn route_broadcast(state: &HubState, exclude_conn_id: Option<Uuid>, message: Message) {
    let sender_name = exclude_conn_id.and_then(|conn_id| {
        state
            .connections
            .snapshot_all()
            .into_iter()
            .find(|conn| conn.id == conn_id)
            .and_then(|conn| conn.component)
    });
    let targets = match &sender_name {
        Some(sender_name) => state.connections.registered_components_except(sender_name),
        None => state.connections.registered_components_except(&hub_component_name()),
    };
    for target in targets {
        let Some(target_conn_id) = state.connections.resolve(&target) else {
            continue;
        };
        if state.connections.send(target_conn_id, message.clone()) {
            metrics::counter!(crate::metrics::METRICS_ID_MESSAGES_ROUTED).increment(1);
        } else {
            state.dlq.enqueue(message.id, target, message.clone(), "Target not connected");
        }
    }
}

async fn route_point_to_point(state: &HubState, message: Message) {
    let Some(target_name) = message.target.as_name().cloned() else {
        return;
    };
    let breaker = state.breakers.get_or_create(&target_name);
    if !breaker.allow_request() {
        metrics::counter!(crate::metrics::METRICS_ID_MESSAGES_CIRCUIT_OPEN).increment(1);
        state.dlq.enqueue(message.id, target_name, message, "Circuit breaker open");
        return;
    }

    let Some(target_conn_id) = state.connections.resolve(&target_name) else {
        breaker.on_failure();
        state.error_window.increment();
        state.dlq.enqueue(message.id, target_name, message, "Target not connected");
        return;
    };

    if state.connections.send(target_conn_id, message.clone()) {
        breaker.on_success();
        metrics::counter!(crate::metrics::METRICS_ID_MESSAGES_ROUTED).increment(1);
    } else {
        breaker.on_failure();
        state.error_window.increment();
        state.dlq.enqueue(message.id, target_name, message, "Send queue full");
    }
}

/// Handles the control-plane message types the hub processes itself rather
/// than routing to a target: registration, heartbeat, Supervisor ("doctor")
/// lifecycle requests, and report/screenshot submission.
async fn handle_control(state: &HubState, conn_id: Uuid, message: Message) {
    match message.message_type.as_str() {
        bridge_types::wire::COMPONENT_REGISTER => handle_register(state, conn_id, message).await,
        bridge_types::wire::HEARTBEAT => handle_heartbeat(state, conn_id, message),
        bridge_types::wire::DOCTOR_SPAWN => handle_doctor_spawn(state, conn_id, message).await,
        bridge_types::wire::DOCTOR_READY => handle_doctor_ready(state, message),
        bridge_types::wire::DOCTOR_KILL => handle_doctor_kill(state, conn_id, message),
        bridge_types::wire::DOCTOR_STATUS => handle_doctor_status(state, conn_id, message),
        bridge_types::wire::DOCTOR_LIST => handle_doctor_list(state, conn_id, message),
        bridge_types::wire::REPORT_SUBMIT => handle_report_submit(state, conn_id, message),
        bridge_types::wire::SCREENSHOT_SUBMIT => handle_screenshot_submit(state, conn_id, message).await,
        other => {
            tracing::warn!(message_type = other, "unhandled control message type");
        }
    }
}

async fn handle_register(state: &HubState, conn_id: Uuid, message: Message) {
    let component = message.source.clone();
    let version = message.version.clone();

    if !bridge_types::version::is_compatible(&version, &state.config.min_compatible_version) {
        reply_error(state, conn_id, RouterError::Schema("incompatible version".into()), message.correlation_id);
        state.connections.kick(conn_id, KickReason::IncompatibleVersion);
        return;
    }

    if let Some(kicked_id) = state.connections.register(conn_id, component.clone(), version.clone()) {
        state.connections.kick(kicked_id, KickReason::DuplicateRegistration);
    }

    let announce = Message::new(
        hub_component_name(),
        ComponentId::Broadcast,
        bridge_types::wire::VERSION_ANNOUNCE,
        serde_json::json!({ "component": component.as_str(), "version": version }),
        crate::HUB_IDENTITY,
    );
    route_broadcast(state, Some(conn_id), announce).await;
}

fn handle_heartbeat(state: &HubState, conn_id: Uuid, message: Message) {
    let reply = Message::new(
        hub_component_name(),
        ComponentId::Named(message.source.clone()),
        bridge_types::wire::HEARTBEAT,
        serde_json::json!({ "received": message.id }),
        crate::HUB_IDENTITY,
    );
    state.connections.send(conn_id, reply);
}

async fn handle_doctor_spawn(state: &HubState, conn_id: Uuid, message: Message) {
    let specialization = message.payload.get("specialization").and_then(Value::as_str).map(String::from);
    match state.doctors.spawn(specialization) {
        Ok((id, died_rx)) => {
            let record = state.doctors.get(id);
            reply_to(state, conn_id, &message, bridge_types::wire::DOCTOR_STATUS, serde_json::json!({ "doctor": record }));
            spawn_death_watcher(state.clone(), died_rx);
        }
        Err(err) => reply_error(state, conn_id, RouterError::Schema(err.to_string()), message.correlation_id),
    }
}

fn spawn_death_watcher(state: HubState, died_rx: tokio::sync::oneshot::Receiver<crate::doctor::DoctorDied>) {
    tokio::spawn(async move {
        if let Ok(died) = died_rx.await {
            let announce = Message::new(
                hub_component_name(),
                ComponentId::Broadcast,
                bridge_types::wire::DOCTOR_DIED,
                serde_json::json!({
                    "id": died.id,
                    "exitCode": died.exit_code,
                    "workerFaceChildren": died.worker_face_children,
                }),
                crate::HUB_IDENTITY,
            );
            route_broadcast(&state, None, announce).await;
        }
    });
}

fn handle_doctor_ready(state: &HubState, message: Message) {
    if let Some(id) = parse_uuid_field(&message.payload, "id") {
        state.doctors.mark_ready(id);
    }
}

fn handle_doctor_kill(state: &HubState, conn_id: Uuid, message: Message) {
    let Some(id) = parse_uuid_field(&message.payload, "id") else {
        reply_error(state, conn_id, RouterError::Schema("missing doctor id".into()), message.correlation_id);
        return;
    };
    let grace_secs = message.payload.get("graceSecs").and_then(Value::as_u64).unwrap_or(5);
    state.doctors.kill(id, std::time::Duration::from_secs(grace_secs), "requested");
}

fn handle_doctor_status(state: &HubState, conn_id: Uuid, message: Message) {
    let Some(id) = parse_uuid_field(&message.payload, "id") else {
        reply_error(state, conn_id, RouterError::Schema("missing doctor id".into()), message.correlation_id);
        return;
    };
    let record = state.doctors.get(id);
    reply_to(state, conn_id, &message, bridge_types::wire::DOCTOR_STATUS, serde_json::json!({ "doctor": record }));
}

fn handle_doctor_list(state: &HubState, conn_id: Uuid, message: Message) {
    let doctors = state.doctors.list();
    reply_to(state, conn_id, &message, bridge_types::wire::DOCTOR_LIST, serde_json::json!({ "doctors": doctors }));
}

fn handle_report_submit(state: &HubState, conn_id: Uuid, message: Message) {
    match serde_json::from_value::<ReportSubmission>(message.payload.clone()) {
        Ok(submission) => {
            let id = state.reports.submit(submission.plan_id, submission.step_index, submission.kind, submission.detail);
            reply_to(state, conn_id, &message, bridge_types::wire::REPORT_SUBMIT, serde_json::json!({ "id": id }));
        }
        Err(err) => reply_error(state, conn_id, RouterError::Schema(err.to_string()), message.correlation_id),
    }
}

async fn handle_screenshot_submit(state: &HubState, conn_id: Uuid, message: Message) {
    match serde_json::from_value::<ScreenshotSubmission>(message.payload.clone()) {
        Ok(submission) => {
            match state.reports.submit_screenshot(submission.plan_id, submission.step_index, &submission.data_base64).await {
                Ok((id, path)) => reply_to(
                    state,
                    conn_id,
                    &message,
                    bridge_types::wire::SCREENSHOT_SUBMIT,
                    serde_json::json!({ "id": id, "path": path.display().to_string() }),
                ),
                Err(err) => reply_error(state, conn_id, RouterError::Schema(err.to_string()), message.correlation_id),
            }
        }
        Err(err) => reply_error(state, conn_id, RouterError::Schema(err.to_string()), message.correlation_id),
    }
}

fn parse_uuid_field(payload: &Value, field: &str) -> Option<Uuid> {
    payload.get(field).and_then(Value::as_str).and_then(|raw| Uuid::parse_str(raw).ok())
}

/// Sends a reply frame to `conn_id`, echoing `request`'s correlation id.
fn reply_to(state: &HubState, conn_id: Uuid, request: &Message, message_type: &str, payload: Value) {
    let mut reply = Message::new(
        hub_component_name(),
        ComponentId::Named(request.source.clone()),
        message_type,
        payload,
        crate::HUB_IDENTITY,
    );
    reply.correlation_id = request.correlation_id;
    state.connections.send(conn_id, reply);
}

/// Sends a structured `error` frame back to `conn_id`, echoing
/// `correlation_id` when known.
fn reply_error(state: &HubState, conn_id: Uuid, error: RouterError, correlation_id: Option<Uuid>) {
    let frame = error.into_error_message(hub_component_name(), correlation_id);
    state.connections.send(conn_id, frame);
}

fn hub_component_name() -> ComponentName {
    ComponentName::parse(crate::HUB_IDENTITY).expect("HUB_IDENTITY is a valid component name")
}
