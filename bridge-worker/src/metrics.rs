//! Metrics definitions for the worker face.

/// Current connection state to the hub (1 = connected, 0 = not).
pub const METRICS_ID_HUB_CONNECTED: &str = "bridge.igor.hub.connected";
/// Number of times the hub connection has been retried.
pub const METRICS_ID_HUB_RECONNECTS: &str = "bridge.igor.hub.reconnects";
/// Plans accepted for execution.
pub const METRICS_ID_PLANS_ACCEPTED: &str = "bridge.igor.plans.accepted";
/// Plans rejected outright.
pub const METRICS_ID_PLANS_REJECTED: &str = "bridge.igor.plans.rejected";
/// Plans that completed, labeled by outcome via the accompanying gauge.
pub const METRICS_ID_PLANS_COMPLETED: &str = "bridge.igor.plans.completed";
/// Steps that completed successfully.
pub const METRICS_ID_STEPS_COMPLETED: &str = "bridge.igor.steps.completed";
/// Steps that failed (including ones that go on to retry).
pub const METRICS_ID_STEPS_FAILED: &str = "bridge.igor.steps.failed";
/// Step retries attempted after a backoff delay.
pub const METRICS_ID_STEPS_RETRIED: &str = "bridge.igor.steps.retried";
/// Current escalation mode (0 = dumb, 1 = claude).
pub const METRICS_ID_LIGHTNING_MODE: &str = "bridge.igor.lightning.mode";
/// Times the escalation state machine has struck into assisted-reasoning
/// mode, whether automatically or by explicit request.
pub const METRICS_ID_LIGHTNING_STRIKES: &str = "bridge.igor.lightning.strikes";
/// Current state of the executor circuit breaker (0 closed, 0.5 half-open,
/// 1 open).
pub const METRICS_ID_EXECUTOR_CIRCUIT_STATE: &str = "bridge.igor.executor.circuit_state";
/// Frank executor processes currently tracked.
pub const METRICS_ID_FRANKS_ACTIVE: &str = "bridge.igor.franks.active";
/// Sibling worker faces currently tracked.
pub const METRICS_ID_SIBLINGS_ACTIVE: &str = "bridge.igor.siblings.active";
/// Depth of the Frank task queue.
pub const METRICS_ID_QUEUE_DEPTH: &str = "bridge.igor.queue.depth";

/// Describes every metric used by the worker face.
pub fn describe_metrics() {
    metrics::describe_gauge!(METRICS_ID_HUB_CONNECTED, metrics::Unit::Count, "1 while connected to the hub");
    metrics::describe_counter!(METRICS_ID_HUB_RECONNECTS, metrics::Unit::Count, "Hub connection attempts after the first");
    metrics::describe_counter!(METRICS_ID_PLANS_ACCEPTED, metrics::Unit::Count, "Plans accepted for execution");
    metrics::describe_counter!(METRICS_ID_PLANS_REJECTED, metrics::Unit::Count, "Plans rejected outright");
    metrics::describe_counter!(METRICS_ID_PLANS_COMPLETED, metrics::Unit::Count, "Plans that finished executing");
    metrics::describe_counter!(METRICS_ID_STEPS_COMPLETED, metrics::Unit::Count, "Steps that completed successfully");
    metrics::describe_counter!(METRICS_ID_STEPS_FAILED, metrics::Unit::Count, "Steps that failed at least one attempt");
    metrics::describe_counter!(METRICS_ID_STEPS_RETRIED, metrics::Unit::Count, "Step retries attempted after backoff");
    metrics::describe_gauge!(METRICS_ID_LIGHTNING_MODE, metrics::Unit::Count, "0 = dumb, 1 = claude");
    metrics::describe_counter!(METRICS_ID_LIGHTNING_STRIKES, metrics::Unit::Count, "Escalations into assisted-reasoning mode");
    metrics::describe_gauge!(METRICS_ID_EXECUTOR_CIRCUIT_STATE, metrics::Unit::Count, "Executor breaker state");
    metrics::describe_gauge!(METRICS_ID_FRANKS_ACTIVE, metrics::Unit::Count, "Frank executor processes currently tracked");
    metrics::describe_gauge!(METRICS_ID_SIBLINGS_ACTIVE, metrics::Unit::Count, "Sibling worker faces currently tracked");
    metrics::describe_gauge!(METRICS_ID_QUEUE_DEPTH, metrics::Unit::Count, "Depth of the Frank task queue");
}
