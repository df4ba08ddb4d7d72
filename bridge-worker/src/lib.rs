//! Worker-face ("Igor") crate root.
//!
//! Ties together the reconnecting hub connection, the plan/step execution
//! engine, escalation state, the tool cache, experience memory, and
//! Frank/sibling process supervision into one process, and dispatches
//! inbound hub frames to whichever subsystem owns them.
//!
//! Grounded on `bridge_hub::HubState`: a single `Clone`-able state struct,
//! built once at startup from configuration, handed to every background
//! task and HTTP handler rather than threaded through as loose arguments.

#![deny(missing_docs)]

pub mod api;
pub mod backoff;
pub mod config;
pub mod experience;
pub mod hub_client;
pub mod lightning;
pub mod metrics;
pub mod plan;
pub mod supervision;
pub mod tools;
pub mod verify;

use std::sync::Arc;

use bridge_types::component::{ComponentId, ComponentName, ComponentNameError};
use bridge_types::message::Message;
use bridge_types::plan::{Plan, ToolDescriptor};
use bridge_types::wire;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use config::IgorConfig;
use experience::{ExperienceError, ExperienceStore};
use hub_client::HubClient;
use lightning::LightningState;
use plan::PlanEngine;
use supervision::{ChildDied, FrankPool, SiblingPool};
use tools::ToolCache;

/// The hub's own component identity, used as the `target` of frames this
/// worker face addresses to the hub itself (registration, heartbeat).
const HUB_IDENTITY: &str = "bridge";

/// Errors constructing [`IgorState`].
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The configured component name failed validation.
    #[error("invalid component name: {0}")]
    InvalidComponentName(#[from] ComponentNameError),
    /// The experience log could not be loaded.
    #[error(transparent)]
    Experience(#[from] ExperienceError),
}

/// All shared, process-wide state the message-dispatch loop and HTTP control
/// surface read and mutate. Cheap to clone (every field is itself an
/// `Arc`-backed handle).
#[derive(Clone)]
pub struct IgorState {
    /// Static configuration this worker face was started with.
    pub config: Arc<IgorConfig>,
    /// This worker face's own component name.
    pub component_name: ComponentName,
    /// Handle to the hub connection's outbound queue.
    pub hub: HubClient,
    /// Plan/step execution engine.
    pub plan_engine: PlanEngine,
    /// Escalation ("lightning") state machine.
    pub lightning: LightningState,
    /// TTL-cached dynamic tool catalog.
    pub tools: Arc<ToolCache>,
    /// Durable selector success/failure memory.
    pub experience: ExperienceStore,
    /// Transient Frank executor processes.
    pub frank_pool: FrankPool,
    /// Route-specialized sibling worker faces.
    pub sibling_pool: SiblingPool,
}

impl IgorState {
    /// Builds every subsystem from `config` (loading the experience log from
    /// disk) and spawns the hub reconnect loop. Returns the state plus the
    /// inbound queue of frames read from the hub, which the caller drives
    /// via [`IgorState::spawn_dispatch_loop`].
    pub async fn new(config: IgorConfig, cancellation: CancellationToken) -> Result<(Self, mpsc::Receiver<Message>), StartupError> {
        let config = Arc::new(config);
        let component_name = ComponentName::parse(config.component_name.clone())?;
        let experience = ExperienceStore::load(&config.experience_log_path).await?;
        let tools = Arc::new(ToolCache::new(config.tool_cache_ttl));
        let lightning = LightningState::new(config.lightning_auto_threshold, config.lightning_history_size);
        let frank_pool =
            FrankPool::new(config.frank_binary.clone(), config.frank_base_port, config.max_franks, config.queue_size, config.hub_url.clone());
        let sibling_pool =
            SiblingPool::new(config.self_binary.clone(), config.sibling_base_port, config.max_siblings, config.hub_url.clone());

        let registration_name = component_name.clone();
        let registration_version = config.version.clone();
        let (hub, inbound_rx) = hub_client::spawn(
            config.clone(),
            move || {
                Message::new(
                    registration_name.clone(),
                    hub_target(),
                    wire::COMPONENT_REGISTER,
                    json!({}),
                    registration_version.clone(),
                )
            },
            cancellation,
        );

        let plan_engine = PlanEngine::new(
            hub.clone(),
            frank_pool.clone(),
            lightning.clone(),
            tools.clone(),
            experience.clone(),
            component_name.clone(),
            config.version.clone(),
            config.default_step_timeout,
            config.request_timeout,
            config.executor_breaker_failure_threshold,
            config.executor_breaker_reset_timeout,
        );

        Ok((
            Self { config, component_name, hub, plan_engine, lightning, tools, experience, frank_pool, sibling_pool },
            inbound_rx,
        ))
    }

    /// Spawns the periodic `heartbeat` emitted to the hub.
    pub fn spawn_heartbeat(&self, cancellation: CancellationToken) {
        let state = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(state.config.heartbeat_interval);
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => return,
                    _ = interval.tick() => state.emit(hub_target(), wire::HEARTBEAT, json!({}), None),
                }
            }
        });
    }

    /// Spawns the periodic dynamic tool catalog refresh, run at the same
    /// cadence as the cache's own TTL.
    pub fn spawn_tool_refresh(&self, cancellation: CancellationToken) {
        let state = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(state.config.tool_cache_ttl);
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => return,
                    _ = interval.tick() => {
                        if let Err(err) = state.plan_engine.refresh_tools().await {
                            tracing::debug!(error = %err, "tool catalog refresh failed");
                        }
                    }
                }
            }
        });
    }

    /// Drains `inbound`, dispatching every frame from the hub to the right
    /// subsystem. Each frame is handled on its own task so a long-running
    /// plan never blocks frames meant for another component.
    pub fn spawn_dispatch_loop(&self, mut inbound: mpsc::Receiver<Message>, cancellation: CancellationToken) {
        let state = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => return,
                    received = inbound.recv() => {
                        let Some(message) = received else { return };
                        let state = state.clone();
                        tokio::spawn(async move { state.handle_message(message).await });
                    }
                }
            }
        });
    }

    async fn handle_message(&self, message: Message) {
        let message_type = message.message_type.as_str();
        match message_type {
            wire::PLAN_SUBMIT => self.handle_plan_submit(message).await,
            wire::IGOR_SPAWN => self.handle_spawn(&message).await,
            wire::IGOR_STRIKE => self.handle_strike(&message).await,
            wire::IGOR_POWERDOWN => self.handle_powerdown(&message).await,
            wire::IGOR_THINK => self.handle_think(&message).await,
            wire::IGOR_LIGHTNING_STATUS => self.handle_lightning_status(&message).await,
            wire::VERSION_ANNOUNCE => self.handle_version_announce(&message),
            wire::TOOL_INJECT => self.handle_tool_inject(&message),
            wire::HEARTBEAT => {}
            other if is_executor_response(other) => {
                if !self.plan_engine.handle_executor_response(&message) {
                    tracing::debug!(message_type = other, "unmatched executor response");
                }
            }
            other => tracing::warn!(message_type = other, "unhandled message type"),
        }
    }

    async fn handle_plan_submit(&self, message: Message) {
        let reply_to = ComponentId::Named(message.source.clone());
        match serde_json::from_value::<Plan>(message.payload) {
            Ok(mut plan) => {
                if plan.correlation_id.is_none() {
                    plan.correlation_id = message.correlation_id;
                }
                self.plan_engine.execute(plan, reply_to).await;
            }
            Err(err) => {
                self.emit(reply_to, wire::PLAN_REJECTED, json!({"reason": format!("malformed plan: {err}")}), message.correlation_id);
            }
        }
    }

    async fn handle_spawn(&self, message: &Message) {
        let route = message.payload.get("route").and_then(Value::as_str).map(str::to_string);
        match self.sibling_pool.spawn(route) {
            Ok((id, died_rx)) => {
                let record = self.sibling_pool.list().into_iter().find(|record| record.id == id);
                self.reply(message, wire::IGOR_SPAWNED, json!({"sibling": record}));
                self.spawn_exit_broadcaster(died_rx);
            }
            Err(err) => self.reply(message, wire::IGOR_SPAWN_FAILED, json!({"reason": err.to_string()})),
        }
    }

    fn spawn_exit_broadcaster(&self, died_rx: oneshot::Receiver<ChildDied>) {
        let state = self.clone();
        tokio::spawn(async move {
            if let Ok(died) = died_rx.await {
                state.emit(ComponentId::Broadcast, wire::IGOR_EXITED, json!({"id": died.id, "exitCode": died.exit_code}), None);
            }
        });
    }

    async fn handle_strike(&self, message: &Message) {
        let reason = message.payload.get("reason").and_then(Value::as_str).unwrap_or("requested").to_string();
        self.lightning.strike(reason);
        self.reply(message, wire::IGOR_STRUCK, json!({"mode": self.lightning.mode()}));
    }

    async fn handle_powerdown(&self, message: &Message) {
        self.lightning.power_down();
        self.reply(message, wire::IGOR_POWEREDDOWN, json!({"mode": self.lightning.mode()}));
    }

    async fn handle_think(&self, message: &Message) {
        let prompt = message.payload.get("prompt").and_then(Value::as_str).unwrap_or_default().to_string();
        let thought = self.think(prompt);
        self.reply(message, wire::IGOR_THOUGHT, json!({"thought": thought}));
    }

    /// Records an assisted-reasoning exchange and returns the resulting
    /// thought. There is no external reasoning endpoint wired up here — the
    /// prompt is reflected back as the thought, which is enough to exercise
    /// the escalation/history machinery end to end; a real integration would
    /// replace this with a call out to whatever reasoning service is
    /// configured.
    pub fn think(&self, prompt: String) -> String {
        let thought = format!("considered: {prompt}");
        self.lightning.record_thought(prompt, thought.clone());
        thought
    }

    async fn handle_lightning_status(&self, message: &Message) {
        let status = serde_json::to_value(self.lightning.status()).unwrap_or_default();
        self.reply(message, wire::IGOR_LIGHTNING_STATUS_RESPONSE, status);
    }

    fn handle_version_announce(&self, message: &Message) {
        let Some(component) = message.payload.get("component").and_then(Value::as_str) else {
            return;
        };
        if component.starts_with("frank-") {
            self.frank_pool.mark_ready_by_name(component);
        } else if component.starts_with("igor-") {
            self.sibling_pool.mark_ready_by_name(component);
        }
    }

    fn handle_tool_inject(&self, message: &Message) {
        let raw = message.payload.get("tool").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<ToolDescriptor>(raw) {
            Ok(tool) => self.tools.inject(tool),
            Err(err) => tracing::warn!(error = %err, "rejected malformed tool.inject payload"),
        }
    }

    fn reply(&self, request: &Message, message_type: &str, payload: Value) {
        self.emit(ComponentId::Named(request.source.clone()), message_type, payload, request.correlation_id);
    }

    fn emit(&self, target: ComponentId, message_type: &str, payload: Value, correlation_id: Option<Uuid>) {
        let mut message = Message::new(self.component_name.clone(), target, message_type, payload, self.config.version.clone());
        message.correlation_id = correlation_id;
        if !self.hub.send(message) {
            tracing::warn!(message_type, "dropped outbound message, hub send queue full");
        }
    }
}

fn hub_target() -> ComponentId {
    ComponentId::parse(HUB_IDENTITY).expect("HUB_IDENTITY is a valid component name")
}

/// Returns `true` if `message_type` is a correlated response from an
/// executor that [`plan::PlanEngine::handle_executor_response`] should try
/// to resolve, rather than a control frame this crate root dispatches
/// inline.
fn is_executor_response(message_type: &str) -> bool {
    message_type.starts_with(wire::BROWSER_PREFIX)
        || matches!(message_type, wire::TOOL_INVOKED | wire::TOOL_ERROR | wire::TOOL_LISTED)
        || message_type.ends_with(".error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_executor_responses() {
        assert!(is_executor_response("browser.navigated"));
        assert!(is_executor_response("browser.error"));
        assert!(is_executor_response(wire::TOOL_INVOKED));
        assert!(!is_executor_response(wire::PLAN_SUBMIT));
        assert!(!is_executor_response(wire::HEARTBEAT));
    }
}
