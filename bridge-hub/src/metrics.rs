//! Metrics definitions for the bridge hub.
//!
//! Defines every metric key the hub emits and a [`describe_metrics`] helper
//! to attach metadata to each using the `metrics` crate's facade.

/// Messages successfully routed point-to-point or via broadcast fan-out.
pub const METRICS_ID_MESSAGES_ROUTED: &str = "bridge.hub.messages.routed";
/// Messages dropped because the same id was already observed within the TTL.
pub const METRICS_ID_MESSAGES_DUPLICATE: &str = "bridge.hub.messages.duplicate";
/// Messages dropped because the target's circuit breaker was open.
pub const METRICS_ID_MESSAGES_CIRCUIT_OPEN: &str = "bridge.hub.messages.circuit_open";
/// Messages rejected by the per-connection rate limiter.
pub const METRICS_ID_MESSAGES_RATE_LIMITED: &str = "bridge.hub.messages.rate_limited";
/// Messages dropped by load shedding under memory pressure.
pub const METRICS_ID_MESSAGES_LOAD_SHED: &str = "bridge.hub.messages.load_shed";
/// Messages that failed schema or signature validation.
pub const METRICS_ID_MESSAGES_ERROR: &str = "bridge.hub.messages.error";
/// Currently registered components.
pub const METRICS_ID_COMPONENTS_REGISTERED: &str = "bridge.hub.components.registered";
/// Currently accepted connections (any lifecycle state).
pub const METRICS_ID_CONNECTIONS_ACTIVE: &str = "bridge.hub.connections.active";
/// Connections kicked for any reason (health floor, stale, duplicate
/// registration, version incompatibility, admin request).
pub const METRICS_ID_CONNECTIONS_KICKED: &str = "bridge.hub.connections.kicked";
/// Current depth of the dead-letter queue.
pub const METRICS_ID_DLQ_DEPTH: &str = "bridge.hub.dlq.depth";
/// Letters dropped from the DLQ due to capacity overflow.
pub const METRICS_ID_DLQ_OVERFLOW: &str = "bridge.hub.dlq.overflow";
/// Letters that reached `max_attempts` and were reported as permanently
/// failed.
pub const METRICS_ID_DLQ_PERMANENT_FAILURES: &str = "bridge.hub.dlq.permanent_failures";
/// Duration of the router's end-to-end admission-to-delivery path.
pub const METRICS_ID_ROUTING_DURATION: &str = "bridge.hub.routing.duration";
/// Supervisor children currently tracked.
pub const METRICS_ID_DOCTORS_ACTIVE: &str = "bridge.hub.doctors.active";
/// Supervisor children that have exited.
pub const METRICS_ID_DOCTORS_EXITED: &str = "bridge.hub.doctors.exited";
/// Reports appended to the report store.
pub const METRICS_ID_REPORTS_SUBMITTED: &str = "bridge.hub.reports.submitted";
/// Screenshots written to the filesystem sink.
pub const METRICS_ID_SCREENSHOTS_SUBMITTED: &str = "bridge.hub.screenshots.submitted";
/// Current resident-set size, in megabytes, as last sampled.
pub const METRICS_ID_MEMORY_RSS_MB: &str = "bridge.hub.memory.rss_mb";

/// Describes every metric used by the hub, setting its unit and help text.
pub fn describe_metrics() {
    metrics::describe_counter!(
        METRICS_ID_MESSAGES_ROUTED,
        metrics::Unit::Count,
        "Messages successfully delivered to a target or broadcast recipient"
    );
    metrics::describe_counter!(
        METRICS_ID_MESSAGES_DUPLICATE,
        metrics::Unit::Count,
        "Messages dropped as duplicates of a recently seen id"
    );
    metrics::describe_counter!(
        METRICS_ID_MESSAGES_CIRCUIT_OPEN,
        metrics::Unit::Count,
        "Messages dropped because the target's circuit breaker was open"
    );
    metrics::describe_counter!(
        METRICS_ID_MESSAGES_RATE_LIMITED,
        metrics::Unit::Count,
        "Messages rejected by the per-connection rate limiter"
    );
    metrics::describe_counter!(
        METRICS_ID_MESSAGES_LOAD_SHED,
        metrics::Unit::Count,
        "Messages dropped by load shedding under memory pressure"
    );
    metrics::describe_counter!(
        METRICS_ID_MESSAGES_ERROR,
        metrics::Unit::Count,
        "Messages that failed schema, parse, or signature validation"
    );
    metrics::describe_gauge!(
        METRICS_ID_COMPONENTS_REGISTERED,
        metrics::Unit::Count,
        "Number of components currently registered"
    );
    metrics::describe_gauge!(
        METRICS_ID_CONNECTIONS_ACTIVE,
        metrics::Unit::Count,
        "Number of connections currently accepted"
    );
    metrics::describe_counter!(
        METRICS_ID_CONNECTIONS_KICKED,
        metrics::Unit::Count,
        "Connections kicked for any reason"
    );
    metrics::describe_gauge!(
        METRICS_ID_DLQ_DEPTH,
        metrics::Unit::Count,
        "Current depth of the dead-letter queue"
    );
    metrics::describe_counter!(
        METRICS_ID_DLQ_OVERFLOW,
        metrics::Unit::Count,
        "Dead letters dropped due to capacity overflow"
    );
    metrics::describe_counter!(
        METRICS_ID_DLQ_PERMANENT_FAILURES,
        metrics::Unit::Count,
        "Dead letters that exhausted their attempt budget"
    );
    metrics::describe_histogram!(
        METRICS_ID_ROUTING_DURATION,
        metrics::Unit::Milliseconds,
        "Duration from frame admission to delivery or terminal drop"
    );
    metrics::describe_gauge!(
        METRICS_ID_DOCTORS_ACTIVE,
        metrics::Unit::Count,
        "Number of Supervisor children currently tracked"
    );
    metrics::describe_counter!(
        METRICS_ID_DOCTORS_EXITED,
        metrics::Unit::Count,
        "Number of Supervisor children that have exited"
    );
    metrics::describe_counter!(
        METRICS_ID_REPORTS_SUBMITTED,
        metrics::Unit::Count,
        "Reports appended to the report store"
    );
    metrics::describe_counter!(
        METRICS_ID_SCREENSHOTS_SUBMITTED,
        metrics::Unit::Count,
        "Screenshots written to the filesystem sink"
    );
    metrics::describe_gauge!(
        METRICS_ID_MEMORY_RSS_MB,
        metrics::Unit::Megabytes,
        "Last-sampled resident-set size"
    );
}
