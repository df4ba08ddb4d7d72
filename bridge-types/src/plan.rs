//! `Plan`/`Step` payload shapes submitted to a worker face via
//! `plan.submit`.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a submitted [`Plan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Received but not yet validated.
    Submitted,
    /// Validated and queued for execution.
    Accepted,
    /// Currently walking steps.
    Executing,
    /// Every step succeeded.
    Completed,
    /// A step exhausted its retry budget.
    Failed,
    /// Rejected outright (see [`crate::wire::PLAN_REJECTED`]).
    Rejected,
}

/// A single capability descriptor in a plan's curated tool bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// The tool's invocation name (e.g. a `frank_`-prefixed verb).
    pub name: String,
    /// Free-form description surfaced to `execute_intent` parsing.
    #[serde(default)]
    pub description: String,
}

/// An ordered sequence of [`Step`]s submitted as a unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan id, unique per submission.
    pub id: String,
    /// Steps executed strictly sequentially.
    pub steps: Vec<Step>,
    /// Optional curated tool bag scoping what the worker face may do.
    #[serde(default)]
    pub tool_bag: Vec<ToolDescriptor>,
    /// Correlation id tying every message derived from this run together.
    #[serde(default)]
    pub correlation_id: Option<Uuid>,
}

/// The smallest retriable unit of work, identified by an action verb.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// The action verb (e.g. `navigate`, `click`, `execute_intent`, or a
    /// `frank_`-prefixed tool-bag verb).
    pub action: String,
    /// Verb-specific parameters.
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
    /// Per-step timeout; falls back to a cluster-wide default when absent.
    #[serde(default, with = "humantime_serde::option")]
    pub timeout: Option<Duration>,
    /// Maximum number of retries after the first attempt fails.
    #[serde(default)]
    pub retries: u32,
}

impl Step {
    /// Returns `true` if `action` is one of the natively understood verbs
    /// dispatched straight to the executor.
    pub fn is_known_verb(action: &str) -> bool {
        matches!(
            action,
            "launch"
                | "navigate"
                | "click"
                | "type"
                | "select"
                | "screenshot"
                | "close"
                | "wait"
                | "verify"
                | "execute_intent"
        )
    }

    /// Returns `true` if `action` is a generic tool-bag verb (any verb
    /// prefixed `frank_`) dispatched via `tool.invoke`.
    pub fn is_tool_bag_verb(action: &str) -> bool {
        action.starts_with("frank_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_known_and_tool_bag_verbs() {
        assert!(Step::is_known_verb("navigate"));
        assert!(!Step::is_known_verb("frank_custom_click"));
        assert!(Step::is_tool_bag_verb("frank_custom_click"));
        assert!(!Step::is_tool_bag_verb("navigate"));
    }

    #[test]
    fn deserializes_minimal_step() {
        let step: Step = serde_json::from_value(serde_json::json!({
            "action": "wait",
            "params": {"ms": 10}
        }))
        .unwrap();
        assert_eq!(step.action, "wait");
        assert_eq!(step.retries, 0);
        assert!(step.timeout.is_none());
    }
}
