//! Configuration types and CLI/environment parsing for the worker face.
//!
//! Configured via environment variables or command-line arguments using
//! `clap`, mirroring the `IGOR_*` environment prefix fixed by the external
//! interface contract.

use std::time::Duration;

use clap::Parser;

/// The worker face's full runtime configuration.
#[derive(Parser, Debug, Clone)]
pub struct IgorConfig {
    /// WebSocket URL of the hub this worker face connects to.
    #[clap(long, env = "IGOR_HUB_URL", default_value = "ws://127.0.0.1:7700")]
    pub hub_url: String,

    /// This worker face's component name, used as `source` on every frame it
    /// sends and as the name it registers under.
    #[clap(long, env = "IGOR_COMPONENT_NAME", default_value = "igor")]
    pub component_name: String,

    /// Software version string announced at registration (an ISO date
    /// prefix, optionally suffixed with a build tag).
    #[clap(long, env = "IGOR_VERSION", default_value = "2026-01-01")]
    pub version: String,

    /// Shared secret sent as `Authorization: Bearer <token>` when connecting
    /// to the hub. If unset, no bearer token is sent.
    #[clap(long, env = "IGOR_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// HMAC secret used to sign outbound messages. Required if the hub has
    /// signing enabled.
    #[clap(long, env = "IGOR_SIGNING_SECRET")]
    pub signing_secret: Option<String>,

    /// Interval at which a `heartbeat` frame is sent to the hub.
    #[clap(long, env = "IGOR_HEARTBEAT_INTERVAL", default_value = "30s", value_parser = humantime::parse_duration)]
    pub heartbeat_interval: Duration,

    /// Minimum delay before the first hub reconnect attempt.
    #[clap(long, env = "IGOR_RECONNECT_BASE", default_value = "1s", value_parser = humantime::parse_duration)]
    pub reconnect_base: Duration,

    /// Maximum delay between hub reconnect attempts.
    #[clap(long, env = "IGOR_RECONNECT_MAX", default_value = "30s", value_parser = humantime::parse_duration)]
    pub reconnect_max: Duration,

    /// Bound of the outbound-to-hub send queue.
    #[clap(long, env = "IGOR_SEND_QUEUE_SIZE", default_value = "256")]
    pub send_queue_size: usize,

    /// How long a correlated request to the executor may remain pending
    /// before it is swept as timed out. The sweeper runs at `2x` this
    /// value.
    #[clap(long, env = "IGOR_REQUEST_TIMEOUT", default_value = "15s", value_parser = humantime::parse_duration)]
    pub request_timeout: Duration,

    /// Default per-step timeout used when a submitted step doesn't specify
    /// one.
    #[clap(long, env = "IGOR_STEP_TIMEOUT", default_value = "20s", value_parser = humantime::parse_duration)]
    pub default_step_timeout: Duration,

    /// Failure threshold before the executor circuit breaker opens.
    #[clap(long, env = "IGOR_EXECUTOR_BREAKER_FAILURE_THRESHOLD", default_value = "5")]
    pub executor_breaker_failure_threshold: u32,

    /// Cool-down before an open executor breaker allows a half-open probe.
    #[clap(long, env = "IGOR_EXECUTOR_BREAKER_RESET_TIMEOUT", default_value = "30s", value_parser = humantime::parse_duration)]
    pub executor_breaker_reset_timeout: Duration,

    /// Consecutive step failures before the escalation state machine
    /// auto-strikes into assisted-reasoning (`claude`) mode.
    #[clap(long, env = "IGOR_LIGHTNING_AUTO_THRESHOLD", default_value = "3")]
    pub lightning_auto_threshold: u32,

    /// Capacity of the bounded assisted-reasoning thinking-history log.
    #[clap(long, env = "IGOR_LIGHTNING_HISTORY_SIZE", default_value = "100")]
    pub lightning_history_size: usize,

    /// TTL of the cached dynamic tool catalog fetched from the executor.
    #[clap(long, env = "IGOR_TOOL_CACHE_TTL", default_value = "30s", value_parser = humantime::parse_duration)]
    pub tool_cache_ttl: Duration,

    /// File the experience-memory store appends JSON-lines records to and
    /// replays from on startup.
    #[clap(long, env = "IGOR_EXPERIENCE_LOG_PATH", default_value = "./experience.jsonl")]
    pub experience_log_path: std::path::PathBuf,

    /// Binary spawned for a transient executor ("Frank") process.
    #[clap(long, env = "IGOR_FRANK_BINARY", default_value = "frank")]
    pub frank_binary: String,

    /// Base TCP port handed out to spawned Frank processes, incrementing per
    /// spawn.
    #[clap(long, env = "IGOR_FRANK_BASE_PORT", default_value = "7900")]
    pub frank_base_port: u16,

    /// Maximum number of Frank executor processes this worker face may run
    /// concurrently.
    #[clap(long, env = "IGOR_MAX_FRANKS", default_value = "4")]
    pub max_franks: usize,

    /// Binary spawned for a route-specialized sibling worker face.
    #[clap(long, env = "IGOR_SELF_BINARY", default_value = "igor")]
    pub self_binary: String,

    /// Base TCP port handed out to spawned sibling worker faces.
    #[clap(long, env = "IGOR_SIBLING_BASE_PORT", default_value = "7950")]
    pub sibling_base_port: u16,

    /// Maximum number of sibling worker faces this process may spawn.
    #[clap(long, env = "IGOR_MAX_SIBLINGS", default_value = "4")]
    pub max_siblings: usize,

    /// Address the worker face's own HTTP control surface listens on.
    #[clap(long, env = "IGOR_LISTEN_ADDR", default_value = "0.0.0.0:7890")]
    pub listen_addr: std::net::SocketAddr,

    /// Capacity of the Frank task queue drained as executors free up.
    #[clap(long, env = "IGOR_QUEUE_SIZE", default_value = "256")]
    pub queue_size: usize,
}
