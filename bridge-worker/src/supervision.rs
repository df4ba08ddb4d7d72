//! Executor ("Frank") and sibling worker-face ("Igor") process supervision
//! (C11).
//!
//! Grounded directly on `bridge-hub::doctor::DoctorSupervisor`: the same
//! spawn/track/kill/exit-watcher shape, forwarding each child's stdio lines
//! to the structured log prefixed with its id. [`FrankPool`] additionally
//! gates concurrent executor usage behind a bounded queue, since a plan's
//! steps compete for a fixed number of Frank processes rather than each
//! getting a dedicated one.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use bridge_types::ComponentId;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Lifecycle of a tracked child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildStatus {
    /// Process started, not yet registered with the hub.
    Spawning,
    /// Registered and idle.
    Idle,
    /// Currently leased out to a step.
    Busy,
    /// Exiting; record about to be removed.
    Dying,
}

/// A tracked Frank executor process.
#[derive(Debug, Clone, Serialize)]
pub struct FrankRecord {
    /// The process's generated id.
    pub id: Uuid,
    /// This Frank's registered component name (`frank-<id>`).
    pub component_name: String,
    /// The reserved TCP port handed to the process.
    pub port: u16,
    /// Current lifecycle status.
    pub status: ChildStatus,
    /// Steps this Frank has executed successfully.
    pub tasks_completed: u64,
    /// Steps this Frank has failed.
    pub tasks_failed: u64,
    #[serde(skip)]
    spawned_at: Instant,
}

/// A tracked sibling worker face, route-specialized via `--route`.
#[derive(Debug, Clone, Serialize)]
pub struct SiblingRecord {
    /// The process's generated id.
    pub id: Uuid,
    /// The sibling's registered component name.
    pub component_name: String,
    /// The reserved TCP port handed to the process.
    pub port: u16,
    /// The route specialization passed at spawn time, if any.
    pub route: Option<String>,
    /// Current lifecycle status.
    pub status: ChildStatus,
}

struct TrackedChild<R> {
    record: R,
    handle: Child,
}

/// Event emitted when a tracked child's process exits.
#[derive(Debug, Clone)]
pub struct ChildDied {
    /// The dead child's id.
    pub id: Uuid,
    /// Process exit code, if the OS reported one.
    pub exit_code: Option<i32>,
}

/// Errors spawning a new child process.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    /// The cluster is already at capacity.
    #[error("at capacity ({0})")]
    AtCapacity(usize),
    /// The OS failed to spawn the child process.
    #[error("spawn failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors acquiring a leased Frank for a step.
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    /// The bounded task queue is already full.
    #[error("frank task queue is full")]
    QueueFull,
    /// No Frank has registered yet, so there is nothing to lease even once a
    /// permit is available.
    #[error("no frank executors are registered")]
    NoneRegistered,
}

/// Spawns, tracks, and tears down Frank executor processes, and gates
/// concurrent use of them behind a bounded task queue.
#[derive(Clone)]
pub struct FrankPool {
    children: Arc<RwLock<HashMap<Uuid, TrackedChild<FrankRecord>>>>,
    next_port: Arc<AtomicU16>,
    max_franks: usize,
    frank_binary: Arc<str>,
    hub_url: Arc<str>,
    semaphore: Arc<Semaphore>,
    queue_size: usize,
    queue_depth: Arc<AtomicUsize>,
    round_robin: Arc<AtomicUsize>,
}

impl FrankPool {
    /// Creates a pool that spawns up to `max_franks` `frank_binary`
    /// processes, reserving ports starting at `base_port`, and queues up to
    /// `queue_size` callers waiting for a lease beyond that.
    pub fn new(frank_binary: impl Into<Arc<str>>, base_port: u16, max_franks: usize, queue_size: usize, hub_url: impl Into<Arc<str>>) -> Self {
        Self {
            children: Arc::new(RwLock::new(HashMap::new())),
            next_port: Arc::new(AtomicU16::new(base_port)),
            max_franks,
            frank_binary: frank_binary.into(),
            hub_url: hub_url.into(),
            semaphore: Arc::new(Semaphore::new(max_franks.max(1))),
            queue_size,
            queue_depth: Arc::new(AtomicUsize::new(0)),
            round_robin: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Spawns a new Frank process, forwarding its stdio to the structured
    /// log. The returned [`ChildDied`] receiver fires exactly once when the
    /// process exits.
    pub fn spawn(&self) -> Result<(Uuid, tokio::sync::oneshot::Receiver<ChildDied>), SpawnError> {
        if self.children.read().len() >= self.max_franks {
            return Err(SpawnError::AtCapacity(self.max_franks));
        }
        let id = Uuid::new_v4();
        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        let component_name = format!("frank-{id}");

        let mut command = Command::new(self.frank_binary.as_ref());
        command
            .arg("--port")
            .arg(port.to_string())
            .arg("--hub-url")
            .arg(self.hub_url.as_ref())
            .arg("--component-name")
            .arg(&component_name)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = command.spawn()?;
        let now = Instant::now();
        forward_stdio(&mut child, id);

        let (died_tx, died_rx) = tokio::sync::oneshot::channel();
        self.spawn_exit_watcher(id, died_tx);

        self.children.write().insert(
            id,
            TrackedChild {
                record: FrankRecord {
                    id,
                    component_name,
                    port,
                    status: ChildStatus::Spawning,
                    tasks_completed: 0,
                    tasks_failed: 0,
                    spawned_at: now,
                },
                handle: child,
            },
        );
        metrics::gauge!(crate::metrics::METRICS_ID_FRANKS_ACTIVE).set(self.children.read().len() as f64);
        Ok((id, died_rx))
    }

    fn spawn_exit_watcher(&self, id: Uuid, died_tx: tokio::sync::oneshot::Sender<ChildDied>) {
        let children = self.children.clone();
        tokio::spawn(async move {
            loop {
                let exit_code = {
                    let mut guard = children.write();
                    let Some(tracked) = guard.get_mut(&id) else {
                        return;
                    };
                    match tracked.handle.try_wait() {
                        Ok(Some(status)) => Some(status.code()),
                        Ok(None) => None,
                        Err(_) => Some(None),
                    }
                };
                match exit_code {
                    Some(exit_code) => {
                        children.write().remove(&id);
                        metrics::gauge!(crate::metrics::METRICS_ID_FRANKS_ACTIVE).set(children.read().len() as f64);
                        let _ = died_tx.send(ChildDied { id, exit_code });
                        return;
                    }
                    None => tokio::time::sleep(Duration::from_millis(250)).await,
                }
            }
        });
    }

    /// Marks a Frank registered and idle (spawning -> idle), called on its
    /// `component.register`.
    pub fn mark_ready(&self, id: Uuid) {
        if let Some(tracked) = self.children.write().get_mut(&id) {
            tracked.record.status = ChildStatus::Idle;
        }
    }

    /// As [`FrankPool::mark_ready`], but looked up by the component name the
    /// hub announced rather than this pool's internal id.
    pub fn mark_ready_by_name(&self, component_name: &str) {
        if let Some(tracked) = self.children.write().values_mut().find(|t| t.record.component_name == component_name) {
            tracked.record.status = ChildStatus::Idle;
        }
    }

    /// Requests termination of the child after `grace`.
    pub fn kill(&self, id: Uuid, grace: Duration) {
        let children = self.children.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let mut guard = children.write();
            if let Some(tracked) = guard.get_mut(&id) {
                tracked.record.status = ChildStatus::Dying;
                let _ = tracked.handle.start_kill();
            }
        });
    }

    /// Kills every tracked Frank.
    pub fn kill_all(&self, grace: Duration) {
        let ids: Vec<Uuid> = self.children.read().keys().copied().collect();
        for id in ids {
            self.kill(id, grace);
        }
    }

    /// Returns a snapshot of every tracked Frank.
    pub fn list(&self) -> Vec<FrankRecord> {
        self.children.read().values().map(|tracked| tracked.record.clone()).collect()
    }

    /// Returns one tracked Frank's record.
    pub fn get(&self, id: Uuid) -> Option<FrankRecord> {
        self.children.read().get(&id).map(|tracked| tracked.record.clone())
    }

    /// Acquires a lease on an available Frank, queuing behind the bounded
    /// task queue if every Frank is currently busy. Picks the next Frank in
    /// round-robin order among every registered (not necessarily idle; a
    /// permit already bounds concurrency) child.
    pub async fn acquire(&self) -> Result<FrankLease, AcquireError> {
        let waiting = self.queue_depth.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::gauge!(crate::metrics::METRICS_ID_QUEUE_DEPTH).set(waiting as f64);
        if waiting > self.queue_size {
            self.queue_depth.fetch_sub(1, Ordering::SeqCst);
            return Err(AcquireError::QueueFull);
        }

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore is never closed");
        self.queue_depth.fetch_sub(1, Ordering::SeqCst);
        metrics::gauge!(crate::metrics::METRICS_ID_QUEUE_DEPTH).set(self.queue_depth.load(Ordering::SeqCst) as f64);

        let component = {
            let guard = self.children.read();
            if guard.is_empty() {
                drop(guard);
                drop(permit);
                return Err(AcquireError::NoneRegistered);
            }
            let mut names: Vec<&str> = guard.values().map(|t| t.record.component_name.as_str()).collect();
            names.sort_unstable();
            let index = self.round_robin.fetch_add(1, Ordering::SeqCst) % names.len();
            names[index].to_string()
        };

        Ok(FrankLease {
            component: ComponentId::parse(component).expect("frank component names are always valid"),
            _permit: permit,
        })
    }
}

/// A leased Frank, releasing its concurrency permit back to the pool when
/// dropped.
pub struct FrankLease {
    component: ComponentId,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl FrankLease {
    /// The leased Frank's component id, usable as a message target.
    pub fn component(&self) -> &ComponentId {
        &self.component
    }
}

/// Spawns, tracks, and tears down route-specialized sibling worker-face
/// processes.
#[derive(Clone)]
pub struct SiblingPool {
    children: Arc<RwLock<HashMap<Uuid, TrackedChild<SiblingRecord>>>>,
    next_port: Arc<AtomicU16>,
    max_siblings: usize,
    self_binary: Arc<str>,
    hub_url: Arc<str>,
}

impl SiblingPool {
    /// Creates a pool that spawns up to `max_siblings` `self_binary`
    /// processes, reserving ports starting at `base_port`.
    pub fn new(self_binary: impl Into<Arc<str>>, base_port: u16, max_siblings: usize, hub_url: impl Into<Arc<str>>) -> Self {
        Self {
            children: Arc::new(RwLock::new(HashMap::new())),
            next_port: Arc::new(AtomicU16::new(base_port)),
            max_siblings,
            self_binary: self_binary.into(),
            hub_url: hub_url.into(),
        }
    }

    /// Spawns a new sibling, optionally specialized to `route`.
    pub fn spawn(&self, route: Option<String>) -> Result<(Uuid, tokio::sync::oneshot::Receiver<ChildDied>), SpawnError> {
        if self.children.read().len() >= self.max_siblings {
            return Err(SpawnError::AtCapacity(self.max_siblings));
        }
        let id = Uuid::new_v4();
        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        let component_name = format!("igor-{id}");

        let mut command = Command::new(self.self_binary.as_ref());
        command
            .arg("--listen-addr")
            .arg(format!("0.0.0.0:{port}"))
            .arg("--hub-url")
            .arg(self.hub_url.as_ref())
            .arg("--component-name")
            .arg(&component_name)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        if let Some(route) = &route {
            command.arg("--route").arg(route);
        }

        let mut child = command.spawn()?;
        forward_stdio(&mut child, id);

        let (died_tx, died_rx) = tokio::sync::oneshot::channel();
        let children = self.children.clone();
        tokio::spawn(async move {
            loop {
                let exit_code = {
                    let mut guard = children.write();
                    let Some(tracked) = guard.get_mut(&id) else {
                        return;
                    };
                    match tracked.handle.try_wait() {
                        Ok(Some(status)) => Some(status.code()),
                        Ok(None) => None,
                        Err(_) => Some(None),
                    }
                };
                match exit_code {
                    Some(exit_code) => {
                        children.write().remove(&id);
                        metrics::gauge!(crate::metrics::METRICS_ID_SIBLINGS_ACTIVE).set(children.read().len() as f64);
                        let _ = died_tx.send(ChildDied { id, exit_code });
                        return;
                    }
                    None => tokio::time::sleep(Duration::from_millis(250)).await,
                }
            }
        });

        self.children.write().insert(
            id,
            TrackedChild {
                record: SiblingRecord { id, component_name, port, route, status: ChildStatus::Spawning },
                handle: child,
            },
        );
        metrics::gauge!(crate::metrics::METRICS_ID_SIBLINGS_ACTIVE).set(self.children.read().len() as f64);
        Ok((id, died_rx))
    }

    /// Marks a sibling registered and idle.
    pub fn mark_ready(&self, id: Uuid) {
        if let Some(tracked) = self.children.write().get_mut(&id) {
            tracked.record.status = ChildStatus::Idle;
        }
    }

    /// As [`SiblingPool::mark_ready`], but looked up by the component name
    /// the hub announced rather than this pool's internal id.
    pub fn mark_ready_by_name(&self, component_name: &str) {
        if let Some(tracked) = self.children.write().values_mut().find(|t| t.record.component_name == component_name) {
            tracked.record.status = ChildStatus::Idle;
        }
    }

    /// Requests termination of the sibling after `grace`.
    pub fn kill(&self, id: Uuid, grace: Duration) {
        let children = self.children.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let mut guard = children.write();
            if let Some(tracked) = guard.get_mut(&id) {
                tracked.record.status = ChildStatus::Dying;
                let _ = tracked.handle.start_kill();
            }
        });
    }

    /// Returns a snapshot of every tracked sibling.
    pub fn list(&self) -> Vec<SiblingRecord> {
        self.children.read().values().map(|tracked| tracked.record.clone()).collect()
    }
}

fn forward_stdio(child: &mut Child, id: Uuid) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, id, false));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, id, true));
    }
}

async fn forward_lines(stream: impl tokio::io::AsyncRead + Unpin, id: Uuid, is_stderr: bool) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_stderr {
            tracing::warn!(child = %id, "{line}");
        } else {
            tracing::info!(child = %id, "{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_full_is_distinguishable_from_none_registered() {
        // Pure construction/accessor sanity; process-spawning paths aren't
        // exercised without a real `frank` binary on PATH.
        let pool = FrankPool::new("frank", 7900, 2, 1, "ws://127.0.0.1:7700");
        assert_eq!(pool.list().len(), 0);
    }
}
