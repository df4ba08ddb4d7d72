//! Connection manager (C5): the authoritative table of live connections.
//!
//! A small `Clone`-derived struct wrapping `Arc<parking_lot::Mutex<...>>>`,
//! exposing a narrow method surface rather than leaking the lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bridge_types::{ComponentName, Message};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Where a connection currently sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLifecycle {
    /// The WebSocket handshake completed but no `component.register` has
    /// been processed yet.
    Accepted,
    /// A `component.register` has bound this connection to a component id.
    Registered,
    /// Registered and recently active.
    Active,
    /// Registered but quiet beyond the stale threshold.
    Stale,
}

/// A snapshot of one connection's bookkeeping, safe to hand out to read-only
/// debug/metrics endpoints.
#[derive(Debug, Clone)]
pub struct ConnectionSnapshot {
    /// The connection's id.
    pub id: Uuid,
    /// Current lifecycle state.
    pub lifecycle: ConnectionLifecycle,
    /// The registered component name, if any.
    pub component: Option<ComponentName>,
    /// The component's announced version, if registered.
    pub version: Option<String>,
    /// Current health score.
    pub health_score: i32,
    /// Total errors recorded against this connection.
    pub error_count: u64,
    /// Total messages successfully sent to this connection.
    pub messages_sent: u64,
    /// When the connection was accepted.
    pub connected_at: Instant,
    /// When the connection was last active (message received or sent).
    pub last_activity: Instant,
}

struct ConnectionRecord {
    sender: mpsc::Sender<Message>,
    lifecycle: ConnectionLifecycle,
    component: Option<ComponentName>,
    version: Option<String>,
    health_score: i32,
    error_count: u64,
    messages_sent: u64,
    connected_at: Instant,
    last_activity: Instant,
}

/// Tunables the manager needs to maintain health scores and staleness.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionManagerConfig {
    /// Bound on each connection's outbound send queue.
    pub send_queue_size: usize,
    /// Score assigned to a freshly accepted connection.
    pub health_score_initial: i32,
    /// Score at or below which a connection is kicked.
    pub health_score_floor: i32,
    /// Connections idle longer than this are kicked as stale.
    pub stale_threshold: Duration,
}

/// The authoritative table of live connections and the component registry
/// bound to it: at most one live connection per component name.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    connections: RwLock<HashMap<Uuid, ConnectionRecord>>,
    components: RwLock<HashMap<ComponentName, Uuid>>,
    config: ConnectionManagerConfig,
    draining: std::sync::atomic::AtomicBool,
}

/// Why a connection was kicked, surfaced to callers that need to log or
/// notify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KickReason {
    /// Health score fell to or below the configured floor.
    HealthFloor,
    /// No activity observed within the stale threshold.
    Stale,
    /// A newer connection registered the same component id.
    DuplicateRegistration,
    /// An administrator requested the kick via the HTTP control surface.
    Admin,
    /// The component's announced version was too old.
    IncompatibleVersion,
    /// The peer closed the socket or the read loop hit a transport error.
    Disconnected,
}

impl ConnectionManager {
    /// Creates an empty manager.
    pub fn new(config: ConnectionManagerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                connections: RwLock::new(HashMap::new()),
                components: RwLock::new(HashMap::new()),
                config,
                draining: std::sync::atomic::AtomicBool::new(false),
            }),
        }
    }

    /// Registers a freshly accepted socket, returning the id to use for
    /// subsequent calls and the receiving half of its outbound queue (the
    /// caller spawns a dedicated writer task draining it to the socket).
    pub fn accept(&self) -> (Uuid, mpsc::Receiver<Message>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.inner.config.send_queue_size);
        let now = Instant::now();
        self.inner.connections.write().insert(
            id,
            ConnectionRecord {
                sender: tx,
                lifecycle: ConnectionLifecycle::Accepted,
                component: None,
                version: None,
                health_score: self.inner.config.health_score_initial,
                error_count: 0,
                messages_sent: 0,
                connected_at: now,
                last_activity: now,
            },
        );
        metrics::gauge!(crate::metrics::METRICS_ID_CONNECTIONS_ACTIVE)
            .set(self.inner.connections.read().len() as f64);
        (id, rx)
    }

    /// Binds `id` to `component`, kicking any prior connection for the same
    /// component id. Returns the kicked connection's id, if any.
    pub fn register(&self, id: Uuid, component: ComponentName, version: String) -> Option<Uuid> {
        let previous = {
            let mut components = self.inner.components.write();
            components.insert(component.clone(), id)
        };
        if let Some(mut connections) = self.inner.connections.try_write() {
            if let Some(record) = connections.get_mut(&id) {
                record.lifecycle = ConnectionLifecycle::Active;
                record.component = Some(component);
                record.version = Some(version);
            }
        }
        metrics::gauge!(crate::metrics::METRICS_ID_COMPONENTS_REGISTERED)
            .set(self.inner.components.read().len() as f64);
        match previous {
            Some(previous_id) if previous_id != id => Some(previous_id),
            _ => None,
        }
    }

    /// Enqueues `frame` for delivery on `id`. Returns `false` (and records an
    /// error against the connection) if the connection is unknown or its
    /// queue is full. Never blocks the caller.
    pub fn send(&self, id: Uuid, frame: Message) -> bool {
        let sender = {
            let connections = self.inner.connections.read();
            connections.get(&id).map(|record| record.sender.clone())
        };
        let Some(sender) = sender else {
            return false;
        };
        match sender.try_send(frame) {
            Ok(()) => {
                let mut connections = self.inner.connections.write();
                if let Some(record) = connections.get_mut(&id) {
                    record.messages_sent += 1;
                    record.last_activity = Instant::now();
                }
                true
            }
            Err(_) => {
                self.record_error(id);
                false
            }
        }
    }

    /// Resolves a component name to its currently registered connection id.
    pub fn resolve(&self, component: &ComponentName) -> Option<Uuid> {
        self.inner.components.read().get(component).copied()
    }

    /// Returns every registered component name other than `except`, for
    /// broadcast fan-out.
    pub fn registered_components_except(&self, except: &ComponentName) -> Vec<ComponentName> {
        self.inner
            .components
            .read()
            .keys()
            .filter(|name| *name != except)
            .cloned()
            .collect()
    }

    /// Marks activity (a frame was received from this connection).
    pub fn record_activity(&self, id: Uuid) {
        let mut connections = self.inner.connections.write();
        if let Some(record) = connections.get_mut(&id) {
            record.last_activity = Instant::now();
        }
    }

    /// Drains the connection's health score toward its ceiling on a
    /// successful operation.
    pub fn record_success(&self, id: Uuid) {
        let mut connections = self.inner.connections.write();
        if let Some(record) = connections.get_mut(&id) {
            record.health_score = (record.health_score + 1).min(self.inner.config.health_score_initial);
        }
    }

    /// Decrements the connection's health score on an error, returning
    /// `true` if the connection should now be kicked for falling to or below
    /// the configured floor.
    pub fn record_error(&self, id: Uuid) -> bool {
        let mut connections = self.inner.connections.write();
        let Some(record) = connections.get_mut(&id) else {
            return false;
        };
        record.error_count += 1;
        record.health_score -= 10;
        record.health_score <= self.inner.config.health_score_floor
    }

    /// Removes the connection's record and any component registration
    /// pointing at it. Closing the socket itself is the caller's
    /// responsibility (dropping the sender closes the writer task's
    /// channel, which should close the socket).
    pub fn kick(&self, id: Uuid, _reason: KickReason) -> Option<ComponentName> {
        let removed_component = {
            let mut connections = self.inner.connections.write();
            connections.remove(&id).and_then(|record| record.component)
        };
        if let Some(component) = &removed_component {
            let mut components = self.inner.components.write();
            if components.get(component) == Some(&id) {
                components.remove(component);
            }
        }
        metrics::counter!(crate::metrics::METRICS_ID_CONNECTIONS_KICKED).increment(1);
        metrics::gauge!(crate::metrics::METRICS_ID_CONNECTIONS_ACTIVE)
            .set(self.inner.connections.read().len() as f64);
        metrics::gauge!(crate::metrics::METRICS_ID_COMPONENTS_REGISTERED)
            .set(self.inner.components.read().len() as f64);
        removed_component
    }

    /// Sweeps every connection for staleness or a health score at/below the
    /// floor, kicking each offender. Returns the kicked connection ids.
    pub fn sweep(&self) -> Vec<Uuid> {
        let now = Instant::now();
        let offenders: Vec<Uuid> = {
            let connections = self.inner.connections.read();
            connections
                .iter()
                .filter(|(_, record)| {
                    record.health_score <= self.inner.config.health_score_floor
                        || now.duration_since(record.last_activity) > self.inner.config.stale_threshold
                })
                .map(|(id, _)| *id)
                .collect()
        };
        for id in &offenders {
            self.kick(*id, KickReason::Stale);
        }
        offenders
    }

    /// Begins draining: stop accepting new connections (enforced by the
    /// caller's `verifyClient` check against [`ConnectionManager::is_draining`])
    /// and wait for outbound queues to empty, up to `timeout`.
    pub async fn drain(&self, timeout: Duration) {
        self.inner.draining.store(true, std::sync::atomic::Ordering::SeqCst);
        let deadline = Instant::now() + timeout;
        loop {
            let all_idle = {
                let connections = self.inner.connections.read();
                connections.values().all(|record| record.sender.capacity() == record.sender.max_capacity())
            };
            if all_idle || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let stragglers: Vec<Uuid> = self.inner.connections.read().keys().copied().collect();
        for id in stragglers {
            self.kick(id, KickReason::Admin);
        }
    }

    /// Returns `true` if the hub is currently draining.
    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Returns the number of currently accepted connections.
    pub fn connection_count(&self) -> usize {
        self.inner.connections.read().len()
    }

    /// Returns a read-only snapshot of every connection, for debug/metrics
    /// endpoints.
    pub fn snapshot_all(&self) -> Vec<ConnectionSnapshot> {
        self.inner
            .connections
            .read()
            .iter()
            .map(|(id, record)| ConnectionSnapshot {
                id: *id,
                lifecycle: record.lifecycle,
                component: record.component.clone(),
                version: record.version.clone(),
                health_score: record.health_score,
                error_count: record.error_count,
                messages_sent: record.messages_sent,
                connected_at: record.connected_at,
                last_activity: record.last_activity,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(ConnectionManagerConfig {
            send_queue_size: 4,
            health_score_initial: 100,
            health_score_floor: 0,
            stale_threshold: Duration::from_millis(50),
        })
    }

    fn sample_message() -> Message {
        Message::new(
            ComponentName::parse("bridge").unwrap(),
            bridge_types::ComponentId::Broadcast,
            "heartbeat",
            serde_json::json!({}),
            "2026-01-01",
        )
    }

    #[test]
    fn register_tracks_component_and_kicks_duplicate() {
        let manager = manager();
        let (first, _rx1) = manager.accept();
        manager.register(first, ComponentName::parse("doctor").unwrap(), "2026-01-01".into());
        let (second, _rx2) = manager.accept();
        let kicked = manager.register(second, ComponentName::parse("doctor").unwrap(), "2026-01-01".into());
        assert_eq!(kicked, Some(first));
        assert_eq!(manager.resolve(&ComponentName::parse("doctor").unwrap()), Some(second));
    }

    #[test]
    fn send_to_unknown_connection_returns_false() {
        let manager = manager();
        assert!(!manager.send(Uuid::new_v4(), sample_message()));
    }

    #[test]
    fn send_enqueues_and_counts() {
        let manager = manager();
        let (id, mut rx) = manager.accept();
        assert!(manager.send(id, sample_message()));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn full_queue_drops_and_records_error() {
        let manager = manager();
        let (id, _rx) = manager.accept();
        for _ in 0..4 {
            assert!(manager.send(id, sample_message()));
        }
        assert!(!manager.send(id, sample_message()), "queue should be full");
    }

    #[test]
    fn kick_removes_component_registration() {
        let manager = manager();
        let (id, _rx) = manager.accept();
        manager.register(id, ComponentName::parse("doctor").unwrap(), "2026-01-01".into());
        manager.kick(id, KickReason::Admin);
        assert!(manager.resolve(&ComponentName::parse("doctor").unwrap()).is_none());
    }

    #[test]
    fn repeated_errors_cross_floor() {
        let manager = manager();
        let (id, _rx) = manager.accept();
        let mut crossed = false;
        for _ in 0..15 {
            crossed = manager.record_error(id);
        }
        assert!(crossed);
    }
}
