//! Report/screenshot submission payload shapes.

use serde::{Deserialize, Serialize};

/// A `report.submit` payload: an append-only record describing a plan or
/// step outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSubmission {
    /// The plan this report belongs to.
    pub plan_id: String,
    /// Index of the step this report describes, if step-scoped.
    #[serde(default)]
    pub step_index: Option<usize>,
    /// Free-form report kind (e.g. `"step_result"`, `"screenshot"`).
    pub kind: String,
    /// Arbitrary structured detail.
    #[serde(default)]
    pub detail: serde_json::Value,
}

/// A `screenshot.submit` payload: base64-encoded image bytes plus the
/// coordinates needed to build the deterministic file name
/// `${planId}_step${index}_${ts}.png`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotSubmission {
    /// The plan this screenshot belongs to.
    pub plan_id: String,
    /// Index of the step that produced the screenshot.
    pub step_index: usize,
    /// Base64-encoded PNG bytes.
    pub data_base64: String,
}

/// The pass/fail decision and aggregate counters returned by a per-plan
/// summary query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSummary {
    /// The plan these counters summarize.
    pub plan_id: String,
    /// Number of steps that reported at least one outcome.
    pub step_count: usize,
    /// Total duration across all reported steps, in milliseconds.
    pub total_duration_ms: u64,
    /// Overall pass/fail decision for the plan.
    pub passed: bool,
}
