//! Plan/step execution engine (C10): validates a submitted [`Plan`], walks
//! its steps sequentially, retries a failed step
//! with backoff (substituting a tool from the cache when the failure
//! pattern suggests one), and reports progress back to the submitter.
//!
//! Step dispatch to the executor is request/response over the hub
//! connection rather than a direct socket: every dispatched step sends a
//! [`Message`] carrying a correlation id and awaits the matching reply via
//! a pending-response table, the same correlated-exchange shape
//! `oprf-client`'s session map uses to match a session id back to its
//! eventual response.

use std::sync::Arc;
use std::time::Duration;

use bridge_core::{CircuitBreaker, CircuitState};
use bridge_types::component::{ComponentId, ComponentName};
use bridge_types::message::{Message, MessageType};
use bridge_types::plan::{Plan, Step, ToolDescriptor};
use bridge_types::wire;
use dashmap::DashMap;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::experience::ExperienceStore;
use crate::hub_client::HubClient;
use crate::lightning::LightningState;
use crate::supervision::FrankPool;
use crate::tools::{FailurePattern, ToolCache};
use crate::{backoff, verify};

/// Validates a submitted plan against the recognized-action invariant.
/// Returns the rejection reason on the first violation found.
fn validate_plan(plan: &Plan) -> Result<(), String> {
    if plan.steps.is_empty() {
        return Err("plan has no steps".to_string());
    }
    for (index, step) in plan.steps.iter().enumerate() {
        let action = step.action.as_str();
        if !(Step::is_known_verb(action) || Step::is_tool_bag_verb(action)) {
            return Err(format!("step {index} has unrecognized action {action:?}"));
        }
    }
    Ok(())
}

fn is_error_response(message: &Message) -> bool {
    let message_type = message.message_type.as_str();
    message_type.ends_with(".error") || message_type == wire::ERROR
}

fn extract_error_text(message: &Message) -> String {
    message
        .payload
        .get("error")
        .or_else(|| message.payload.get("message"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| "executor reported an error".to_string())
}

/// Drives plan execution for one worker face. Cheap to clone; every clone
/// shares the same pending-response table, Frank pool, and escalation
/// state.
#[derive(Clone)]
pub struct PlanEngine {
    hub: HubClient,
    frank_pool: FrankPool,
    executor_breaker: Arc<CircuitBreaker>,
    lightning: LightningState,
    tools: Arc<ToolCache>,
    experience: ExperienceStore,
    pending: Arc<DashMap<Uuid, oneshot::Sender<Message>>>,
    component_name: ComponentName,
    version: String,
    default_step_timeout: Duration,
    request_timeout: Duration,
}

impl PlanEngine {
    /// Creates an engine that dispatches to `frank_pool`'s leased Frank
    /// processes and reports escalation state through `lightning`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hub: HubClient,
        frank_pool: FrankPool,
        lightning: LightningState,
        tools: Arc<ToolCache>,
        experience: ExperienceStore,
        component_name: ComponentName,
        version: String,
        default_step_timeout: Duration,
        request_timeout: Duration,
        executor_breaker_failure_threshold: u32,
        executor_breaker_reset_timeout: Duration,
    ) -> Self {
        let executor_breaker = CircuitBreaker::with_callback(
            executor_breaker_failure_threshold,
            executor_breaker_reset_timeout,
            |state| {
                let value = match state {
                    CircuitState::Closed => 0.0,
                    CircuitState::HalfOpen => 0.5,
                    CircuitState::Open => 1.0,
                };
                metrics::gauge!(crate::metrics::METRICS_ID_EXECUTOR_CIRCUIT_STATE).set(value);
            },
        );
        Self {
            hub,
            frank_pool,
            executor_breaker: Arc::new(executor_breaker),
            lightning,
            tools,
            experience,
            pending: Arc::new(DashMap::new()),
            component_name,
            version,
            default_step_timeout,
            request_timeout,
        }
    }

    /// Resolves a pending correlated request with an executor response.
    /// Returns `true` if `message` matched an outstanding request.
    pub fn handle_executor_response(&self, message: &Message) -> bool {
        let correlation_id = message.effective_correlation_id();
        if let Some((_, sender)) = self.pending.remove(&correlation_id) {
            let _ = sender.send(message.clone());
            true
        } else {
            false
        }
    }

    /// Returns the executor circuit breaker's current state.
    pub fn executor_circuit_state(&self) -> CircuitState {
        self.executor_breaker.state()
    }

    /// Forces the executor circuit breaker closed.
    pub fn reset_executor_circuit(&self) {
        self.executor_breaker.reset();
    }

    /// Fetches the executor's dynamic tool catalog from a leased Frank and
    /// replaces the cached one with it.
    pub async fn refresh_tools(&self) -> Result<(), String> {
        let response = self.send_request(wire::TOOL_LIST, json!({}), self.request_timeout).await?;
        let tools: Vec<ToolDescriptor> =
            serde_json::from_value(response.payload.get("tools").cloned().unwrap_or(json!([]))).map_err(|err| err.to_string())?;
        self.tools.store(tools);
        Ok(())
    }

    /// Invokes a named tool outside of any plan, leasing a Frank
    /// round-robin (`POST /tools/:name/execute`).
    pub async fn invoke_tool(&self, name: &str, params: Value) -> Result<Value, String> {
        let payload = json!({"tool": name, "params": params});
        let response = self.send_request(wire::TOOL_INVOKE, payload, self.request_timeout).await?;
        Ok(response.payload)
    }

    /// Executes a single ad-hoc step outside of any plan (`POST /execute`).
    pub async fn execute_ad_hoc(&self, step: Step) -> Result<Value, String> {
        let timeout = step.timeout.unwrap_or(self.default_step_timeout);
        self.dispatch_step(&step, timeout).await
    }

    /// Validates, then executes, a submitted plan, reporting
    /// `plan.accepted`/`plan.rejected`/`step.*`/`plan.completed` back to
    /// `reply_to`.
    pub async fn execute(&self, plan: Plan, reply_to: ComponentId) {
        if let Err(reason) = validate_plan(&plan) {
            metrics::counter!(crate::metrics::METRICS_ID_PLANS_REJECTED).increment(1);
            self.emit(reply_to, wire::PLAN_REJECTED, json!({"planId": plan.id, "reason": reason}), plan.correlation_id);
            return;
        }

        metrics::counter!(crate::metrics::METRICS_ID_PLANS_ACCEPTED).increment(1);
        self.emit(reply_to.clone(), wire::PLAN_ACCEPTED, json!({"planId": plan.id}), plan.correlation_id);

        let mut failed = false;
        for (index, step) in plan.steps.iter().enumerate() {
            if self.execute_step(&plan, &reply_to, index, step).await.is_err() {
                failed = true;
                break;
            }
        }

        let status = if failed { "failed" } else { "completed" };
        metrics::counter!(crate::metrics::METRICS_ID_PLANS_COMPLETED, "status" => status).increment(1);
        self.emit(reply_to, wire::PLAN_COMPLETED, json!({"planId": plan.id, "status": status}), plan.correlation_id);
    }

    async fn execute_step(&self, plan: &Plan, reply_to: &ComponentId, index: usize, step: &Step) -> Result<(), ()> {
        let timeout = step.timeout.unwrap_or(self.default_step_timeout);
        let max_attempts = step.retries + 1;
        let mut attempt_action = step.action.clone();

        for attempt in 0..max_attempts {
            if !self.executor_breaker.allow_request() {
                self.emit_step_failed(plan, reply_to, index, "executor circuit breaker open");
                return Err(());
            }
            self.emit_step_started(plan, reply_to, index);

            let mut attempt_step = step.clone();
            attempt_step.action = attempt_action.clone();
            match self.dispatch_step(&attempt_step, timeout).await {
                Ok(result) => {
                    self.executor_breaker.on_success();
                    self.lightning.record_success();
                    self.record_selector_outcome(step, true).await;
                    metrics::counter!(crate::metrics::METRICS_ID_STEPS_COMPLETED).increment(1);
                    self.emit(
                        reply_to.clone(),
                        wire::STEP_COMPLETED,
                        json!({"planId": plan.id, "stepIndex": index, "result": result}),
                        plan.correlation_id,
                    );
                    return Ok(());
                }
                Err(error_text) => {
                    self.executor_breaker.on_failure();
                    self.lightning.record_failure();
                    self.record_selector_outcome(step, false).await;
                    self.emit_step_failed(plan, reply_to, index, &error_text);

                    if attempt + 1 >= max_attempts {
                        return Err(());
                    }

                    let pattern = FailurePattern::classify(&error_text);
                    if Step::is_tool_bag_verb(&attempt_action)
                        && let Some(substitute) = self.tools.find_substitute(pattern)
                    {
                        tracing::info!(from = %attempt_action, to = %substitute.name, "retrying step with substitute tool");
                        attempt_action = substitute.name;
                    }

                    let delay = backoff::delay_for_attempt(attempt);
                    metrics::counter!(crate::metrics::METRICS_ID_STEPS_RETRIED).increment(1);
                    self.emit(
                        reply_to.clone(),
                        wire::STEP_RETRYING,
                        json!({"planId": plan.id, "stepIndex": index, "delayMs": delay.as_millis() as u64}),
                        plan.correlation_id,
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
        Err(())
    }

    async fn record_selector_outcome(&self, step: &Step, success: bool) {
        let Some(selector) = step.params.get("selector").and_then(|v| v.as_str()) else {
            return;
        };
        let url = step.params.get("url").and_then(|v| v.as_str()).unwrap_or_default();
        let result = if success {
            self.experience.record_selector_success(selector, &step.action, url).await
        } else {
            self.experience.record_selector_failure(selector, &step.action, url).await
        };
        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to persist experience record");
        }
    }

    async fn dispatch_step(&self, step: &Step, timeout: Duration) -> Result<Value, String> {
        match step.action.as_str() {
            "wait" => {
                let ms = step.params.get("ms").and_then(|v| v.as_u64()).unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(json!({}))
            }
            "verify" => self.dispatch_verify(step, timeout).await,
            action if Step::is_tool_bag_verb(action) || action == "execute_intent" => {
                self.dispatch_tool(step, timeout).await
            }
            action => self.dispatch_browser(action, step, timeout).await,
        }
    }

    async fn dispatch_verify(&self, step: &Step, timeout: Duration) -> Result<Value, String> {
        let predicate = step.params.get("predicate").and_then(|v| v.as_str()).unwrap_or_default();
        let response = self.send_request("browser.get_text", json!({}), timeout).await?;
        let text = response.payload.get("text").and_then(|v| v.as_str()).unwrap_or_default();
        match verify::classify(predicate, text) {
            verify::VerifyOutcome::Pass => Ok(json!({"verified": true})),
            verify::VerifyOutcome::Fail(reason) => Err(reason),
        }
    }

    async fn dispatch_tool(&self, step: &Step, timeout: Duration) -> Result<Value, String> {
        let payload = json!({"tool": step.action, "params": step.params});
        let response = self.send_request(wire::TOOL_INVOKE, payload, timeout).await?;
        Ok(response.payload)
    }

    async fn dispatch_browser(&self, action: &str, step: &Step, timeout: Duration) -> Result<Value, String> {
        let message_type = format!("{}{action}", wire::BROWSER_PREFIX);
        let response = self.send_request(message_type, json!(step.params), timeout).await?;
        Ok(response.payload)
    }

    async fn send_request(&self, message_type: impl Into<MessageType>, payload: Value, timeout: Duration) -> Result<Message, String> {
        let lease = self.frank_pool.acquire().await.map_err(|err| err.to_string())?;
        self.correlate_and_send(lease.component().clone(), message_type, payload, timeout).await
    }

    /// As [`PlanEngine::send_request`], but addressed to a specific
    /// component rather than leased round-robin from the Frank pool — used
    /// by the worker face's own control surface to target one already-known
    /// Frank or sibling directly.
    pub async fn send_request_to(&self, target: ComponentId, message_type: impl Into<MessageType>, payload: Value, timeout: Duration) -> Result<Value, String> {
        self.correlate_and_send(target, message_type, payload, timeout).await.map(|response| response.payload)
    }

    async fn correlate_and_send(&self, target: ComponentId, message_type: impl Into<MessageType>, payload: Value, timeout: Duration) -> Result<Message, String> {
        let deadline = timeout.min(self.request_timeout).max(Duration::from_millis(1));

        let mut message = Message::new(self.component_name.clone(), target, message_type, payload, self.version.clone());
        let correlation_id = message.effective_correlation_id();
        message.correlation_id = Some(correlation_id);

        let (tx, rx) = oneshot::channel();
        self.pending.insert(correlation_id, tx);

        if !self.hub.send(message) {
            self.pending.remove(&correlation_id);
            return Err("failed to enqueue request to hub".to_string());
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(response)) if is_error_response(&response) => Err(extract_error_text(&response)),
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err("response channel closed before a reply arrived".to_string()),
            Err(_) => {
                self.pending.remove(&correlation_id);
                Err("request to executor timed out".to_string())
            }
        }
    }

    fn emit(&self, target: ComponentId, message_type: &str, payload: Value, correlation_id: Option<Uuid>) {
        let mut message = Message::new(self.component_name.clone(), target, message_type, payload, self.version.clone());
        message.correlation_id = correlation_id;
        if !self.hub.send(message) {
            tracing::warn!(message_type, "dropped outbound message, hub send queue full");
        }
    }

    fn emit_step_started(&self, plan: &Plan, reply_to: &ComponentId, index: usize) {
        self.emit(reply_to.clone(), wire::STEP_STARTED, json!({"planId": plan.id, "stepIndex": index}), plan.correlation_id);
    }

    fn emit_step_failed(&self, plan: &Plan, reply_to: &ComponentId, index: usize, reason: &str) {
        metrics::counter!(crate::metrics::METRICS_ID_STEPS_FAILED).increment(1);
        self.emit(
            reply_to.clone(),
            wire::STEP_FAILED,
            json!({"planId": plan.id, "stepIndex": index, "reason": reason}),
            plan.correlation_id,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_types::component::ComponentName;
    use bridge_types::message::MessageType;

    #[test]
    fn rejects_empty_plans() {
        let plan = Plan { id: "p1".into(), steps: vec![], tool_bag: vec![], correlation_id: None };
        assert_eq!(validate_plan(&plan), Err("plan has no steps".to_string()));
    }

    #[test]
    fn rejects_unrecognized_actions() {
        let plan = Plan {
            id: "p1".into(),
            steps: vec![Step { action: "teleport".into(), params: Default::default(), timeout: None, retries: 0 }],
            tool_bag: vec![],
            correlation_id: None,
        };
        assert!(validate_plan(&plan).is_err());
    }

    #[test]
    fn accepts_known_and_tool_bag_actions() {
        let plan = Plan {
            id: "p1".into(),
            steps: vec![
                Step { action: "navigate".into(), params: Default::default(), timeout: None, retries: 0 },
                Step { action: "frank_scroll_to".into(), params: Default::default(), timeout: None, retries: 0 },
            ],
            tool_bag: vec![],
            correlation_id: None,
        };
        assert!(validate_plan(&plan).is_ok());
    }

    #[test]
    fn error_response_detection() {
        let ok = Message::new(
            ComponentName::parse("frank-1").unwrap(),
            ComponentId::parse("igor").unwrap(),
            MessageType::new("browser.navigated"),
            json!({}),
            "v1",
        );
        let err = Message::new(
            ComponentName::parse("frank-1").unwrap(),
            ComponentId::parse("igor").unwrap(),
            MessageType::new("browser.error"),
            json!({"error": "boom"}),
            "v1",
        );
        assert!(!is_error_response(&ok));
        assert!(is_error_response(&err));
        assert_eq!(extract_error_text(&err), "boom");
    }
}
