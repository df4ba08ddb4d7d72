//! Configuration types and CLI/environment parsing for the bridge hub.
//!
//! Configured via environment variables or command-line arguments using
//! `clap`, mirroring the `BRIDGE_*` environment prefix fixed by the external
//! interface contract.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// The bridge hub's full runtime configuration.
#[derive(Parser, Debug, Clone)]
pub struct HubConfig {
    /// Address the hub listens on for WebSocket and HTTP control traffic.
    #[clap(long, env = "BRIDGE_LISTEN_ADDR", default_value = "0.0.0.0:7700")]
    pub listen_addr: SocketAddr,

    /// Shared secret required of `Authorization: Bearer <token>` (or the
    /// deprecated `?token=` query parameter). If unset, authentication is
    /// disabled.
    #[clap(long, env = "BRIDGE_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Whether inbound messages must carry a verifying HMAC signature.
    #[clap(long, env = "BRIDGE_SIGNING_REQUIRED", default_value = "false")]
    pub signing_required: bool,

    /// HMAC secret used to verify signed messages. Required if
    /// `signing_required` is set.
    #[clap(long, env = "BRIDGE_SIGNING_SECRET")]
    pub signing_secret: Option<String>,

    /// Interval at which the hub expects `heartbeat` frames before treating
    /// a connection's activity as stale.
    #[clap(
        long,
        env = "BRIDGE_HEARTBEAT_INTERVAL",
        default_value = "30s",
        value_parser = humantime::parse_duration
    )]
    pub heartbeat_interval: Duration,

    /// Multiplier applied to `heartbeat_interval` to determine the
    /// stale-connection threshold.
    #[clap(long, env = "BRIDGE_STALE_THRESHOLD_MULTIPLIER", default_value = "3")]
    pub stale_threshold_multiplier: u32,

    /// Maximum accepted WebSocket frame size, in bytes.
    #[clap(long, env = "BRIDGE_MAX_MESSAGE_SIZE", default_value = "1048576")]
    pub max_message_size: usize,

    /// Maximum number of simultaneously accepted connections.
    #[clap(long, env = "BRIDGE_MAX_CONNECTIONS", default_value = "1024")]
    pub max_connections: usize,

    /// Capacity of the circular message log.
    #[clap(long, env = "BRIDGE_LOG_SIZE", default_value = "1000")]
    pub log_size: usize,

    /// Capacity of the seen-id dedupe cache.
    #[clap(long, env = "BRIDGE_SEEN_CACHE_SIZE", default_value = "10000")]
    pub seen_cache_size: usize,

    /// TTL of entries in the seen-id dedupe cache.
    #[clap(
        long,
        env = "BRIDGE_SEEN_CACHE_TTL",
        default_value = "5min",
        value_parser = humantime::parse_duration
    )]
    pub seen_cache_ttl: Duration,

    /// Capacity of the dead-letter queue.
    #[clap(long, env = "BRIDGE_DLQ_SIZE", default_value = "1000")]
    pub dlq_size: usize,

    /// Number of delivery attempts before a dead letter is considered
    /// permanently failed.
    #[clap(long, env = "BRIDGE_DLQ_MAX_ATTEMPTS", default_value = "3")]
    pub dlq_max_attempts: u32,

    /// Hard deadline for a graceful drain.
    #[clap(
        long,
        env = "BRIDGE_DRAIN_TIMEOUT",
        default_value = "10s",
        value_parser = humantime::parse_duration
    )]
    pub drain_timeout: Duration,

    /// RSS, in megabytes, above which the hub sheds large frames
    /// ("warning" pressure).
    #[clap(long, env = "BRIDGE_MEMORY_WARNING_MB", default_value = "512")]
    pub memory_warning_mb: u64,

    /// RSS, in megabytes, above which the hub refuses new connections
    /// ("critical" pressure).
    #[clap(long, env = "BRIDGE_MEMORY_CRITICAL_MB", default_value = "896")]
    pub memory_critical_mb: u64,

    /// Per-connection rate-limiter token refill rate, tokens/sec.
    #[clap(long, env = "BRIDGE_RATE_LIMIT_REFILL", default_value = "20")]
    pub rate_limit_refill_per_sec: f64,

    /// Per-connection rate-limiter burst capacity.
    #[clap(long, env = "BRIDGE_RATE_LIMIT_BURST", default_value = "40")]
    pub rate_limit_burst: f64,

    /// Minimum component version (an ISO date prefix, e.g. `2026-01-01`)
    /// the hub will accept at registration.
    #[clap(long, env = "BRIDGE_MIN_COMPATIBLE_VERSION", default_value = "2020-01-01")]
    pub min_compatible_version: String,

    /// Maximum number of Supervisor ("doctor") children the hub may spawn.
    #[clap(long, env = "BRIDGE_MAX_DOCTORS", default_value = "8")]
    pub max_doctors: usize,

    /// Base TCP port handed out to spawned Supervisor children, incrementing
    /// per spawn.
    #[clap(long, env = "BRIDGE_DOCTOR_BASE_PORT", default_value = "7800")]
    pub doctor_base_port: u16,

    /// Directory screenshots are written to.
    #[clap(long, env = "BRIDGE_SCREENSHOTS_DIR", default_value = "./screenshots")]
    pub screenshots_dir: PathBuf,

    /// Capacity of the in-memory report ring.
    #[clap(long, env = "BRIDGE_REPORT_LOG_SIZE", default_value = "1000")]
    pub report_log_size: usize,

    /// Failure threshold before a per-target circuit breaker opens.
    #[clap(long, env = "BRIDGE_BREAKER_FAILURE_THRESHOLD", default_value = "5")]
    pub breaker_failure_threshold: u32,

    /// Cool-down before an open breaker allows a half-open probe.
    #[clap(
        long,
        env = "BRIDGE_BREAKER_RESET_TIMEOUT",
        default_value = "30s",
        value_parser = humantime::parse_duration
    )]
    pub breaker_reset_timeout: Duration,

    /// Bound of each connection's outbound send queue.
    #[clap(long, env = "BRIDGE_SEND_QUEUE_SIZE", default_value = "256")]
    pub send_queue_size: usize,

    /// Initial and floor health score for a freshly registered connection.
    #[clap(long, env = "BRIDGE_HEALTH_SCORE_INITIAL", default_value = "100")]
    pub health_score_initial: i32,

    /// Health score floor; at or below this a connection is kicked.
    #[clap(long, env = "BRIDGE_HEALTH_SCORE_FLOOR", default_value = "0")]
    pub health_score_floor: i32,
}
