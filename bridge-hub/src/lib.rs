//! The central message routing and supervision hub of the bridge cluster.
//!
//! Accepts authenticated WebSocket connections, registers components,
//! deduplicates and routes messages (with per-target circuit breaking, a
//! bounded dead-letter queue, and memory-pressure load shedding), spawns and
//! supervises Supervisor ("doctor") child processes, and maintains an
//! append-only report/screenshot store. See `router` for the inbound frame
//! pipeline and `api` for the WebSocket/HTTP surfaces.

#![deny(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bridge_core::{CircularLog, DeadLetterQueue, RateLimiter, SeenCache, SlidingWindowCounter};
use bridge_types::{ComponentName, Message};
use uuid::Uuid;

pub mod api;
pub mod breakers;
pub mod config;
pub mod connection;
pub mod doctor;
pub mod errors;
pub mod memory;
pub mod metrics;
pub mod reports;
pub mod router;

use breakers::BreakerRegistry;
use config::HubConfig;
use connection::{ConnectionManager, ConnectionManagerConfig};
use doctor::DoctorSupervisor;
use memory::MemorySampler;
use reports::ReportStore;

/// The hub's own component identity, used as the `source` of frames it
/// originates itself (errors, heartbeat echoes, `version.announce`,
/// `doctor.died`).
pub const HUB_IDENTITY: &str = "bridge";

/// All shared, process-wide state the router and HTTP/WS surfaces read and
/// mutate. Cheap to clone (every field is itself an `Arc`-backed handle).
#[derive(Clone)]
pub struct HubState {
    /// Static configuration this hub instance was started with.
    pub config: Arc<HubConfig>,
    /// The authoritative connection/component registry.
    pub connections: ConnectionManager,
    /// Bounded TTL dedupe cache over message ids.
    pub seen_cache: Arc<SeenCache<Uuid>>,
    /// Bounded dead-letter queue for undeliverable messages.
    pub dlq: Arc<DeadLetterQueue<Uuid, ComponentName, Message>>,
    /// Per-target circuit breakers.
    pub breakers: BreakerRegistry,
    /// Per-connection token-bucket rate limiter.
    pub rate_limiter: Arc<RateLimiter<Uuid>>,
    /// Circular log of delivered (post-dedupe) messages.
    pub log: Arc<CircularLog<Message>>,
    /// Process-wide sliding-window error-rate counter.
    pub error_window: Arc<SlidingWindowCounter>,
    /// RSS-based memory-pressure sampler.
    pub memory: Arc<MemorySampler>,
    /// Supervisor ("doctor") child process manager.
    pub doctors: DoctorSupervisor,
    /// Append-only report/screenshot store.
    pub reports: ReportStore,
    /// HMAC secret for signature verification, if signing is required.
    pub signing_secret: Option<Arc<[u8]>>,
}

impl HubState {
    /// Builds the hub's shared state from `config`.
    pub fn new(config: HubConfig) -> Self {
        let connections = ConnectionManager::new(ConnectionManagerConfig {
            send_queue_size: config.send_queue_size,
            health_score_initial: config.health_score_initial,
            health_score_floor: config.health_score_floor,
            stale_threshold: config.heartbeat_interval * config.stale_threshold_multiplier,
        });
        let signing_secret = config
            .signing_secret
            .as_ref()
            .map(|secret| Arc::from(secret.as_bytes().to_vec().into_boxed_slice()));
        let doctor_binary = std::env::var("BRIDGE_DOCTOR_BINARY").unwrap_or_else(|_| "doctor".to_string());
        let hub_url = format!("ws://{}", config.listen_addr);
        let screenshots_dir: PathBuf = config.screenshots_dir.clone();

        Self {
            breakers: BreakerRegistry::new(config.breaker_failure_threshold, config.breaker_reset_timeout),
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit_refill_per_sec, config.rate_limit_burst)),
            seen_cache: Arc::new(SeenCache::new(config.seen_cache_size, config.seen_cache_ttl)),
            dlq: Arc::new(DeadLetterQueue::new(config.dlq_size, config.dlq_max_attempts, |letter| {
                metrics::counter!(crate::metrics::METRICS_ID_DLQ_PERMANENT_FAILURES).increment(1);
                tracing::warn!(
                    target = %letter.target,
                    attempts = letter.attempts,
                    reason = %letter.reason,
                    "dead letter permanently failed"
                );
            })),
            log: Arc::new(CircularLog::new(config.log_size)),
            error_window: Arc::new(SlidingWindowCounter::new(Duration::from_secs(60), 12)),
            memory: Arc::new(MemorySampler::new(config.memory_warning_mb, config.memory_critical_mb)),
            doctors: DoctorSupervisor::new(doctor_binary, config.doctor_base_port, config.max_doctors, hub_url),
            reports: ReportStore::new(config.report_log_size, screenshots_dir),
            connections,
            signing_secret,
            config: Arc::new(config),
        }
    }

    /// Spawns the background maintenance loop: connection staleness sweep,
    /// seen-cache TTL sweep, and rate-limiter bucket reaping, all driven off
    /// a single ticker rather than a proliferation of independent timers.
    pub fn spawn_maintenance(&self, cancellation_token: tokio_util::sync::CancellationToken) {
        let state = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(10));
            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => break,
                    _ = interval.tick() => {
                        state.seen_cache.sweep();
                        state.rate_limiter.reap_idle(Duration::from_secs(300));
                        for kicked in state.connections.sweep() {
                            tracing::info!(connection = %kicked, "kicked stale/unhealthy connection");
                        }
                        state.memory.sample_rss_mb();
                    }
                }
            }
        });
    }
}
