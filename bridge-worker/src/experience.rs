//! Experience memory (C12): a durable-but-small key/value store of
//! selector success/failure counters, replayed into memory on startup and
//! appended to as a JSON-lines log.
//!
//! Grounded on the hub's `ReportStore` shape (an `Arc<RwLock<...>>`-backed
//! index plus a filesystem sink), narrowed here to the append-only-log +
//! in-memory-replay pattern since this store's durability need is "don't
//! forget what we learned across restarts", not "serve a queryable
//! history".

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

/// One append-only log record: a single success or failure observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Observation {
    key: String,
    action: String,
    url: String,
    success: bool,
}

#[derive(Debug, Clone, Default)]
struct Stats {
    successes: u64,
    failures: u64,
}

struct Inner {
    stats: HashMap<(String, String), Stats>,
    by_action_url: HashMap<(String, String), Vec<String>>,
}

/// Errors replaying or appending to the experience log.
#[derive(Debug, thiserror::Error)]
pub enum ExperienceError {
    /// The log file could not be read, written, or created.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// In-memory selector success/failure counters, backed by an append-only
/// JSON-lines log on disk.
#[derive(Clone)]
pub struct ExperienceStore {
    inner: Arc<RwLock<Inner>>,
    log_path: PathBuf,
}

impl ExperienceStore {
    /// Loads `log_path` (if it exists) and replays every observation into
    /// memory, returning a store ready to serve queries and append new
    /// observations.
    pub async fn load(log_path: impl AsRef<Path>) -> Result<Self, ExperienceError> {
        let log_path = log_path.as_ref().to_path_buf();
        let mut inner = Inner { stats: HashMap::new(), by_action_url: HashMap::new() };
        match tokio::fs::read_to_string(&log_path).await {
            Ok(contents) => {
                for line in contents.lines().filter(|l| !l.trim().is_empty()) {
                    if let Ok(observation) = serde_json::from_str::<Observation>(line) {
                        apply(&mut inner, &observation);
                    } else {
                        tracing::warn!(line, "skipping unparseable experience log line");
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        Ok(Self { inner: Arc::new(RwLock::new(inner)), log_path })
    }

    /// Records a successful use of `key` (a selector or similar locator) for
    /// `action` on `url`.
    pub async fn record_selector_success(&self, key: &str, action: &str, url: &str) -> Result<(), ExperienceError> {
        self.record(key, action, url, true).await
    }

    /// Records a failed use of `key` for `action` on `url`.
    pub async fn record_selector_failure(&self, key: &str, action: &str, url: &str) -> Result<(), ExperienceError> {
        self.record(key, action, url, false).await
    }

    async fn record(&self, key: &str, action: &str, url: &str, success: bool) -> Result<(), ExperienceError> {
        let observation = Observation { key: key.to_string(), action: action.to_string(), url: url.to_string(), success };
        {
            let mut inner = self.inner.write();
            apply(&mut inner, &observation);
        }
        append_line(&self.log_path, &observation).await
    }

    /// Returns `true` if `key` has failed substantially more often than it
    /// has succeeded for any action on `url`'s origin, so it shouldn't be
    /// tried again without a substitute.
    pub fn is_known_bad_selector(&self, key: &str, url: &str) -> bool {
        let inner = self.inner.read();
        inner
            .stats
            .iter()
            .filter(|((stat_key, _), _)| stat_key == key)
            .filter(|((_, stat_action), _)| same_origin(stat_action, url) || stat_action == url)
            .any(|(_, stats)| stats.failures >= 3 && stats.failures > stats.successes * 2)
    }

    /// Returns the selector key with the strongest success record for
    /// `action` on `url`, if any has been observed before.
    pub fn find_best_selector(&self, action: &str, url: &str) -> Option<String> {
        let inner = self.inner.read();
        let candidates = inner.by_action_url.get(&(action.to_string(), url.to_string()))?;
        candidates
            .iter()
            .max_by_key(|key| {
                let stats = inner.stats.get(&((*key).clone(), url.to_string())).cloned().unwrap_or_default();
                stats.successes as i64 - stats.failures as i64
            })
            .cloned()
    }
}

fn apply(inner: &mut Inner, observation: &Observation) {
    let stat_key = (observation.key.clone(), observation.url.clone());
    let stats = inner.stats.entry(stat_key).or_default();
    if observation.success {
        stats.successes += 1;
    } else {
        stats.failures += 1;
    }
    let list_key = (observation.action.clone(), observation.url.clone());
    let list = inner.by_action_url.entry(list_key).or_default();
    if !list.contains(&observation.key) {
        list.push(observation.key.clone());
    }
}

fn same_origin(a: &str, b: &str) -> bool {
    a == b
}

async fn append_line(path: &Path, observation: &Observation) -> Result<(), ExperienceError> {
    let mut line = serde_json::to_string(observation).expect("Observation always serializes");
    line.push('\n');
    let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(line.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("bridge-worker-experience-test-{name}-{}.jsonl", std::process::id()))
    }

    #[tokio::test]
    async fn records_and_replays_across_loads() {
        let path = temp_path("replay");
        let _ = tokio::fs::remove_file(&path).await;
        let store = ExperienceStore::load(&path).await.unwrap();
        store.record_selector_success("#submit", "click", "https://example.com").await.unwrap();
        store.record_selector_success("#submit", "click", "https://example.com").await.unwrap();

        let reloaded = ExperienceStore::load(&path).await.unwrap();
        assert_eq!(reloaded.find_best_selector("click", "https://example.com").as_deref(), Some("#submit"));
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn known_bad_selector_after_repeated_failures() {
        let path = temp_path("badselector");
        let _ = tokio::fs::remove_file(&path).await;
        let store = ExperienceStore::load(&path).await.unwrap();
        for _ in 0..4 {
            store.record_selector_failure("#flaky", "click", "https://example.com").await.unwrap();
        }
        assert!(store.is_known_bad_selector("#flaky", "https://example.com"));
        let _ = tokio::fs::remove_file(&path).await;
    }
}
