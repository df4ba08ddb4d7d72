//! Supervisor ("doctor") child process management (C8).
//!
//! A line-oriented async reader forwards each child's stdout/stderr to the
//! structured log, prefixed with the child id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bridge_types::ComponentName;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use uuid::Uuid;

/// A Supervisor child's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DoctorStatus {
    /// Process started, not yet ready.
    Spawning,
    /// Ready and idle.
    Idle,
    /// Actively handling a plan.
    Busy,
    /// Exiting; record about to be removed.
    Dying,
}

/// A tracked Supervisor child.
#[derive(Debug, Clone, Serialize)]
pub struct DoctorRecord {
    /// The child's generated id.
    pub id: Uuid,
    /// The reserved TCP port handed to the child.
    pub port: u16,
    /// Optional specialization label passed at spawn time.
    pub specialization: Option<String>,
    /// Current lifecycle status.
    pub status: DoctorStatus,
    /// Plans completed successfully.
    pub plans_completed: u64,
    /// Plans that failed.
    pub plans_failed: u64,
    /// Worker-face children this Supervisor has itself spawned.
    pub worker_face_children: Vec<ComponentName>,
    #[serde(skip)]
    spawned_at: Instant,
    #[serde(skip)]
    last_activity: Instant,
}

struct TrackedChild {
    record: DoctorRecord,
    handle: Child,
}

/// Event emitted when a tracked doctor's process exits.
#[derive(Debug, Clone)]
pub struct DoctorDied {
    /// The dead child's id.
    pub id: Uuid,
    /// Process exit code, if the OS reported one.
    pub exit_code: Option<i32>,
    /// The worker-face children the dead Supervisor had spawned.
    pub worker_face_children: Vec<ComponentName>,
}

/// Spawns, tracks, and tears down Supervisor child processes.
#[derive(Clone)]
pub struct DoctorSupervisor {
    children: Arc<RwLock<HashMap<Uuid, TrackedChild>>>,
    next_port: Arc<std::sync::atomic::AtomicU16>,
    max_doctors: usize,
    hub_url: String,
    doctor_binary: Arc<str>,
}

/// Errors spawning a new Supervisor child.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    /// The cluster is already at `MAX_DOCTORS`.
    #[error("at max doctors ({0})")]
    AtCapacity(usize),
    /// The OS failed to spawn the child process.
    #[error("spawn failed: {0}")]
    Io(#[from] std::io::Error),
}

impl DoctorSupervisor {
    /// Creates a supervisor that spawns `doctor_binary`, reserving ports
    /// starting at `base_port` and allowing up to `max_doctors` children.
    pub fn new(doctor_binary: impl Into<Arc<str>>, base_port: u16, max_doctors: usize, hub_url: impl Into<String>) -> Self {
        Self {
            children: Arc::new(RwLock::new(HashMap::new())),
            next_port: Arc::new(std::sync::atomic::AtomicU16::new(base_port)),
            max_doctors,
            hub_url: hub_url.into(),
            doctor_binary: doctor_binary.into(),
        }
    }

    /// Spawns a new Supervisor child, forwarding its stdio to the structured
    /// log and returning its tracked record. The returned [`DoctorDied`]
    /// receiver fires exactly once when the process exits.
    pub fn spawn(
        &self,
        specialization: Option<String>,
    ) -> Result<(Uuid, tokio::sync::oneshot::Receiver<DoctorDied>), SpawnError> {
        if self.children.read().len() >= self.max_doctors {
            return Err(SpawnError::AtCapacity(self.max_doctors));
        }
        let id = Uuid::new_v4();
        let port = self.next_port.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let mut command = Command::new(self.doctor_binary.as_ref());
        command
            .arg("--port")
            .arg(port.to_string())
            .arg("--hub-url")
            .arg(&self.hub_url)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        if let Some(spec) = &specialization {
            command.arg("--specialization").arg(spec);
        }

        let mut child = command.spawn()?;
        let now = Instant::now();
        forward_stdio(&mut child, id);

        let (died_tx, died_rx) = tokio::sync::oneshot::channel();
        self.spawn_exit_watcher(id, died_tx);

        self.children.write().insert(
            id,
            TrackedChild {
                record: DoctorRecord {
                    id,
                    port,
                    specialization,
                    status: DoctorStatus::Spawning,
                    plans_completed: 0,
                    plans_failed: 0,
                    worker_face_children: Vec::new(),
                    spawned_at: now,
                    last_activity: now,
                },
                handle: child,
            },
        );
        metrics::gauge!(crate::metrics::METRICS_ID_DOCTORS_ACTIVE).set(self.children.read().len() as f64);
        Ok((id, died_rx))
    }

    fn spawn_exit_watcher(&self, id: Uuid, died_tx: tokio::sync::oneshot::Sender<DoctorDied>) {
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
                        let removed = children.write().remove(&id);
                        metrics::gauge!(crate::metrics::METRICS_ID_DOCTORS_ACTIVE)
                            .set(children.read().len() as f64);
                        metrics::counter!(crate::metrics::METRICS_ID_DOCTORS_EXITED).increment(1);
                        let worker_face_children = removed.map(|r| r.record.worker_face_children).unwrap_or_default();
                        let _ = died_tx.send(DoctorDied {
                            id,
                            exit_code,
                            worker_face_children,
                        });
                        return;
                    }
                    None => tokio::time::sleep(Duration::from_millis(250)).await,
                }
            }
        });
    }

    /// Requests termination of the child. A grace period is honored before
    /// the kill is forced, but never blocks the caller.
    ///
    /// Tokio's portable `Child::kill` has no notion of a soft SIGTERM
    /// distinct from a hard kill, so `grace` here governs how long we wait
    /// before forcing it rather than a two-signal escalation.
    pub fn kill(&self, id: Uuid, grace: Duration, _reason: impl Into<String>) {
        let children = self.children.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let mut guard = children.write();
            if let Some(tracked) = guard.get_mut(&id) {
                tracked.record.status = DoctorStatus::Dying;
                let _ = tracked.handle.start_kill();
            }
        });
    }

    /// Kills every tracked child.
    pub fn kill_all(&self, grace: Duration) {
        let ids: Vec<Uuid> = self.children.read().keys().copied().collect();
        for id in ids {
            self.kill(id, grace, "kill-all");
        }
    }

    /// Returns a snapshot of every tracked child.
    pub fn list(&self) -> Vec<DoctorRecord> {
        self.children.read().values().map(|tracked| tracked.record.clone()).collect()
    }

    /// Returns one tracked child's record.
    pub fn get(&self, id: Uuid) -> Option<DoctorRecord> {
        self.children.read().get(&id).map(|tracked| tracked.record.clone())
    }

    /// Marks a child ready (spawning -> idle), called on `doctor.ready`.
    pub fn mark_ready(&self, id: Uuid) {
        if let Some(tracked) = self.children.write().get_mut(&id) {
            tracked.record.status = DoctorStatus::Idle;
            tracked.record.last_activity = Instant::now();
        }
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
            tracing::warn!(doctor = %id, "{line}");
        } else {
            tracing::info!(doctor = %id, "{line}");
        }
    }
}
