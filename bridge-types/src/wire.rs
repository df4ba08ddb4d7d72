//! The dot-notation message-type vocabulary shared by every component.
//!
//! The router is type-agnostic except for the control types handled inline
//! by the hub; those are data-driven constants here rather than scattered
//! string literals, the same way the tool bag / `execute_intent` dispatch
//! keeps its verb table data-driven instead of a chain of string compares.

/// Registers a component on a connection. Handled inline by the hub.
pub const COMPONENT_REGISTER: &str = "component.register";
/// Echoes `{received: msg.id}` back to the sender. Handled inline.
pub const HEARTBEAT: &str = "heartbeat";
/// Broadcast after a successful `component.register`.
pub const VERSION_ANNOUNCE: &str = "version.announce";

/// Request the hub spawn a new Supervisor ("doctor") child.
pub const DOCTOR_SPAWN: &str = "doctor.spawn";
/// A spawned Supervisor child reports readiness.
pub const DOCTOR_READY: &str = "doctor.ready";
/// Request the hub kill a Supervisor child.
pub const DOCTOR_KILL: &str = "doctor.kill";
/// Request the status of a single Supervisor child.
pub const DOCTOR_STATUS: &str = "doctor.status";
/// Request the list of all Supervisor children.
pub const DOCTOR_LIST: &str = "doctor.list";
/// Broadcast when a Supervisor child's process exits.
pub const DOCTOR_DIED: &str = "doctor.died";

/// Append a report to the report store.
pub const REPORT_SUBMIT: &str = "report.submit";
/// Append a screenshot to the report store.
pub const SCREENSHOT_SUBMIT: &str = "screenshot.submit";

/// Structured error frame sent back to a connection.
pub const ERROR: &str = "error";

/// Submit a new plan to a worker face.
pub const PLAN_SUBMIT: &str = "plan.submit";
/// A worker face accepted a submitted plan.
pub const PLAN_ACCEPTED: &str = "plan.accepted";
/// A worker face rejected a submitted plan outright.
pub const PLAN_REJECTED: &str = "plan.rejected";
/// A worker face finished executing a plan (success or failure).
pub const PLAN_COMPLETED: &str = "plan.completed";

/// A worker face began executing a step.
pub const STEP_STARTED: &str = "step.started";
/// A step finished successfully.
pub const STEP_COMPLETED: &str = "step.completed";
/// A step failed (possibly retryable).
pub const STEP_FAILED: &str = "step.failed";
/// A failed, retryable step is about to retry after a backoff delay.
pub const STEP_RETRYING: &str = "step.retrying";

/// Prefix for every executor ("Frankenstein") request/response message type,
/// e.g. `browser.launched`, `browser.navigated`, `browser.error`.
pub const BROWSER_PREFIX: &str = "browser.";

/// List the executor's dynamic tool catalog.
pub const TOOL_LIST: &str = "tool.list";
/// Response to [`TOOL_LIST`].
pub const TOOL_LISTED: &str = "tool.listed";
/// Invoke a named tool (including any `frank_`-prefixed tool-bag verb).
pub const TOOL_INVOKE: &str = "tool.invoke";
/// Response to a successful [`TOOL_INVOKE`].
pub const TOOL_INVOKED: &str = "tool.invoked";
/// Response to a failed [`TOOL_INVOKE`].
pub const TOOL_ERROR: &str = "tool.error";
/// Inject a tool definition into a worker face's tool bag.
pub const TOOL_INJECT: &str = "tool.inject";

/// Request a worker face spawn a route-specialized sibling.
pub const IGOR_SPAWN: &str = "igor.spawn";
/// A sibling worker face reports it has spawned.
pub const IGOR_SPAWNED: &str = "igor.spawned";
/// A sibling worker face failed to spawn.
pub const IGOR_SPAWN_FAILED: &str = "igor.spawn.failed";
/// Broadcast when a sibling worker face's process exits.
pub const IGOR_EXITED: &str = "igor.exited";
/// Explicit request to escalate into assisted-reasoning mode.
pub const IGOR_STRIKE: &str = "igor.strike";
/// Acknowledges an [`IGOR_STRIKE`].
pub const IGOR_STRUCK: &str = "igor.struck";
/// Request a return to mechanical execution mode.
pub const IGOR_POWERDOWN: &str = "igor.powerdown";
/// Acknowledges an [`IGOR_POWERDOWN`].
pub const IGOR_POWEREDDOWN: &str = "igor.powereddown";
/// Request the assisted-reasoning endpoint be invoked.
pub const IGOR_THINK: &str = "igor.think";
/// The assisted-reasoning endpoint's response.
pub const IGOR_THOUGHT: &str = "igor.thought";
/// Status of the escalation state machine.
pub const IGOR_LIGHTNING_STATUS: &str = "igor.lightning.status";
/// Response to [`IGOR_LIGHTNING_STATUS`].
pub const IGOR_LIGHTNING_STATUS_RESPONSE: &str = "igor.lightning.status.response";

/// Returns `true` if `message_type` is one of the control types the hub
/// handles inline (never routed to a target connection).
pub fn is_hub_control_type(message_type: &str) -> bool {
    matches!(
        message_type,
        COMPONENT_REGISTER
            | HEARTBEAT
            | DOCTOR_SPAWN
            | DOCTOR_READY
            | DOCTOR_KILL
            | DOCTOR_STATUS
            | DOCTOR_LIST
            | REPORT_SUBMIT
            | SCREENSHOT_SUBMIT
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_control_types() {
        assert!(is_hub_control_type(COMPONENT_REGISTER));
        assert!(is_hub_control_type(HEARTBEAT));
        assert!(!is_hub_control_type(PLAN_SUBMIT));
        assert!(!is_hub_control_type("browser.navigate"));
    }
}
