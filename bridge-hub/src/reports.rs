//! Report store (C9): an append-only in-memory ring of reports, a plan-id
//! index, and a filesystem sink for screenshots.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use bridge_types::report::PlanSummary;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// One appended report record.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRecord {
    /// This report's own id.
    pub id: Uuid,
    /// The plan it belongs to.
    pub plan_id: String,
    /// The step index it refers to, if any.
    pub step_index: Option<usize>,
    /// A free-form kind tag (e.g. `"step_completed"`, `"screenshot"`).
    pub kind: String,
    /// Arbitrary structured detail.
    pub detail: Value,
    /// Milliseconds since the epoch when this report was appended.
    pub recorded_at_ms: u64,
}

struct Inner {
    ring: Vec<ReportRecord>,
    capacity: usize,
    by_plan: HashMap<String, Vec<Uuid>>,
}

/// The hub's append-only report store.
#[derive(Clone)]
pub struct ReportStore {
    inner: Arc<RwLock<Inner>>,
    screenshots_dir: PathBuf,
}

impl ReportStore {
    /// Creates an empty store bounded to `capacity` reports, writing
    /// screenshots under `screenshots_dir`.
    pub fn new(capacity: usize, screenshots_dir: PathBuf) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                ring: Vec::with_capacity(capacity),
                capacity,
                by_plan: HashMap::new(),
            })),
            screenshots_dir,
        }
    }

    /// Appends a report, evicting the oldest if at capacity.
    pub fn submit(&self, plan_id: String, step_index: Option<usize>, kind: String, detail: Value) -> Uuid {
        let id = Uuid::new_v4();
        let record = ReportRecord {
            id,
            plan_id: plan_id.clone(),
            step_index,
            kind,
            detail,
            recorded_at_ms: now_millis(),
        };
        let mut inner = self.inner.write();
        if inner.ring.len() == inner.capacity {
            let evicted = inner.ring.remove(0);
            if let Some(ids) = inner.by_plan.get_mut(&evicted.plan_id) {
                ids.retain(|existing| *existing != evicted.id);
            }
        }
        inner.ring.push(record);
        inner.by_plan.entry(plan_id).or_default().push(id);
        metrics::counter!(crate::metrics::METRICS_ID_REPORTS_SUBMITTED).increment(1);
        id
    }

    /// Decodes `data_base64`, writes it to
    /// `{screenshots_dir}/{plan_id}_step{step_index}_{ts}.png`, and appends a
    /// synthetic `screenshot` report referencing the file path. Returns the
    /// report id and the path written.
    pub async fn submit_screenshot(
        &self,
        plan_id: String,
        step_index: usize,
        data_base64: &str,
    ) -> Result<(Uuid, PathBuf), ScreenshotError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data_base64)
            .map_err(ScreenshotError::InvalidBase64)?;
        let ts = now_millis();
        let filename = format!("{plan_id}_step{step_index}_{ts}.png");
        tokio::fs::create_dir_all(&self.screenshots_dir).await?;
        let path = self.screenshots_dir.join(&filename);
        tokio::fs::write(&path, &bytes).await?;
        metrics::counter!(crate::metrics::METRICS_ID_SCREENSHOTS_SUBMITTED).increment(1);
        let id = self.submit(
            plan_id,
            Some(step_index),
            "screenshot".to_string(),
            serde_json::json!({ "path": path.display().to_string(), "bytes": bytes.len() }),
        );
        Ok((id, path))
    }

    /// Returns the most recent `limit` reports, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ReportRecord> {
        let inner = self.inner.read();
        inner.ring.iter().rev().take(limit).cloned().collect()
    }

    /// Returns every report id'd against `plan_id`, oldest first.
    pub fn for_plan(&self, plan_id: &str) -> Vec<ReportRecord> {
        let inner = self.inner.read();
        let Some(ids) = inner.by_plan.get(plan_id) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| inner.ring.iter().find(|record| record.id == *id).cloned())
            .collect()
    }

    /// Aggregates step counts, total duration, and a pass/fail decision for
    /// `plan_id`. `pass` is `true` iff no report for the plan carries
    /// `detail.success == false`.
    pub fn summary(&self, plan_id: &str) -> Option<PlanSummary> {
        let reports = self.for_plan(plan_id);
        if reports.is_empty() {
            return None;
        }
        let step_count = reports
            .iter()
            .filter_map(|r| r.step_index)
            .map(|i| i + 1)
            .max()
            .unwrap_or(0);
        let first_ts = reports.iter().map(|r| r.recorded_at_ms).min().unwrap_or(0);
        let last_ts = reports.iter().map(|r| r.recorded_at_ms).max().unwrap_or(0);
        let passed = !reports
            .iter()
            .any(|r| r.detail.get("success").and_then(Value::as_bool) == Some(false));
        Some(PlanSummary {
            plan_id: plan_id.to_string(),
            step_count,
            total_duration_ms: last_ts.saturating_sub(first_ts),
            passed,
        })
    }
}

/// Errors submitting a screenshot.
#[derive(Debug, thiserror::Error)]
pub enum ScreenshotError {
    /// The payload was not valid base64.
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(base64::DecodeError),
    /// Writing the decoded bytes to disk failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_then_recent_and_for_plan() {
        let store = ReportStore::new(10, PathBuf::from("/tmp/bridge-test-screenshots"));
        store.submit("p1".into(), Some(0), "step_completed".into(), serde_json::json!({"success": true}));
        store.submit("p1".into(), Some(1), "step_completed".into(), serde_json::json!({"success": true}));
        store.submit("p2".into(), None, "plan_completed".into(), serde_json::json!({"success": false}));
        assert_eq!(store.recent(10).len(), 3);
        assert_eq!(store.for_plan("p1").len(), 2);
    }

    #[test]
    fn overflow_evicts_oldest_and_cleans_index() {
        let store = ReportStore::new(2, PathBuf::from("/tmp/bridge-test-screenshots"));
        store.submit("p1".into(), Some(0), "a".into(), serde_json::json!({}));
        store.submit("p1".into(), Some(1), "b".into(), serde_json::json!({}));
        store.submit("p1".into(), Some(2), "c".into(), serde_json::json!({}));
        assert_eq!(store.recent(10).len(), 2);
        assert_eq!(store.for_plan("p1").len(), 2);
    }

    #[test]
    fn summary_reports_pass_false_on_any_failure() {
        let store = ReportStore::new(10, PathBuf::from("/tmp/bridge-test-screenshots"));
        store.submit("p1".into(), Some(0), "step_completed".into(), serde_json::json!({"success": true}));
        store.submit("p1".into(), Some(1), "step_failed".into(), serde_json::json!({"success": false}));
        let summary = store.summary("p1").unwrap();
        assert!(!summary.passed);
        assert_eq!(summary.step_count, 2);
    }

    #[test]
    fn summary_of_unknown_plan_is_none() {
        let store = ReportStore::new(10, PathBuf::from("/tmp/bridge-test-screenshots"));
        assert!(store.summary("nope").is_none());
    }
}
