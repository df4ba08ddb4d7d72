//! Helper-tool integration: a TTL-cached dynamic tool catalog fetched from
//! the executor, and failure-pattern-keyed candidate selection for
//! retrying a failed step with a substitute tool.

use std::time::{Duration, Instant};

use bridge_types::plan::ToolDescriptor;
use parking_lot::Mutex;

/// The failure patterns a step's error can be classified into, each mapped
/// to the tool-name substrings worth trying as a substitute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePattern {
    /// The targeted element/selector wasn't found.
    SelectorNotFound,
    /// The action exceeded its timeout.
    Timeout,
    /// An unexpected popup/dialog intercepted the action.
    Popup,
    /// The action targeted a dropdown/select control that didn't respond
    /// as expected.
    Dropdown,
    /// Doesn't match any recognized pattern.
    Unknown,
}

impl FailurePattern {
    /// Classifies a step error message into a [`FailurePattern`].
    pub fn classify(error: &str) -> Self {
        let lower = error.to_lowercase();
        if lower.contains("selector") && (lower.contains("not found") || lower.contains("no element")) {
            FailurePattern::SelectorNotFound
        } else if lower.contains("timeout") || lower.contains("timed out") {
            FailurePattern::Timeout
        } else if lower.contains("popup") || lower.contains("dialog") || lower.contains("modal") {
            FailurePattern::Popup
        } else if lower.contains("dropdown") || lower.contains("select") {
            FailurePattern::Dropdown
        } else {
            FailurePattern::Unknown
        }
    }

    /// Tool-name substrings worth matching against the cached catalog when
    /// retrying a step that failed with this pattern.
    pub fn candidate_keywords(self) -> &'static [&'static str] {
        match self {
            FailurePattern::SelectorNotFound => &["selector", "find", "locate"],
            FailurePattern::Timeout => &["wait", "retry", "poll"],
            FailurePattern::Popup => &["dismiss", "popup", "dialog"],
            FailurePattern::Dropdown => &["dropdown", "select", "option"],
            FailurePattern::Unknown => &[],
        }
    }
}

struct Cached {
    fetched_at: Instant,
    tools: Vec<ToolDescriptor>,
}

/// TTL-cached view of the executor's dynamic tool catalog.
pub struct ToolCache {
    ttl: Duration,
    cached: Mutex<Option<Cached>>,
}

impl ToolCache {
    /// Creates an empty cache with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, cached: Mutex::new(None) }
    }

    /// Returns the cached catalog if still fresh, else `None` (the caller
    /// is expected to fetch and call [`ToolCache::store`]).
    pub fn get(&self) -> Option<Vec<ToolDescriptor>> {
        let cached = self.cached.lock();
        match cached.as_ref() {
            Some(entry) if entry.fetched_at.elapsed() < self.ttl => Some(entry.tools.clone()),
            _ => None,
        }
    }

    /// Replaces the cached catalog with a freshly fetched one.
    pub fn store(&self, tools: Vec<ToolDescriptor>) {
        *self.cached.lock() = Some(Cached { fetched_at: Instant::now(), tools });
    }

    /// Adds or replaces a single tool definition in the cached catalog,
    /// regardless of TTL staleness (`tool.inject`).
    pub fn inject(&self, tool: ToolDescriptor) {
        let mut cached = self.cached.lock();
        let mut tools = cached.as_ref().map(|entry| entry.tools.clone()).unwrap_or_default();
        tools.retain(|existing| existing.name != tool.name);
        tools.push(tool);
        *cached = Some(Cached { fetched_at: Instant::now(), tools });
    }

    /// Finds the best-matching tool for `pattern` among the cached catalog
    /// (or an empty slice if nothing is cached), by keyword substring match
    /// against each tool's name.
    pub fn find_substitute(&self, pattern: FailurePattern) -> Option<ToolDescriptor> {
        let keywords = pattern.candidate_keywords();
        if keywords.is_empty() {
            return None;
        }
        let tools = self.get().unwrap_or_default();
        tools.into_iter().find(|tool| {
            let name_lower = tool.name.to_lowercase();
            keywords.iter().any(|kw| name_lower.contains(kw))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_selector_not_found() {
        assert_eq!(FailurePattern::classify("selector not found: #submit"), FailurePattern::SelectorNotFound);
    }

    #[test]
    fn classifies_timeout() {
        assert_eq!(FailurePattern::classify("action timed out after 5000ms"), FailurePattern::Timeout);
    }

    #[test]
    fn cache_expires_after_ttl() {
        let cache = ToolCache::new(Duration::from_millis(10));
        cache.store(vec![ToolDescriptor { name: "frank_find_by_text".into(), description: String::new() }]);
        assert!(cache.get().is_some());
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get().is_none());
    }

    #[test]
    fn inject_survives_ttl_expiry_of_the_rest_of_the_catalog() {
        let cache = ToolCache::new(Duration::from_millis(10));
        cache.store(vec![ToolDescriptor { name: "frank_click".into(), description: String::new() }]);
        std::thread::sleep(Duration::from_millis(20));
        cache.inject(ToolDescriptor { name: "frank_custom_tool".into(), description: "injected".into() });
        let tools = cache.get().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "frank_custom_tool");
    }

    #[test]
    fn finds_substitute_by_keyword() {
        let cache = ToolCache::new(Duration::from_secs(30));
        cache.store(vec![
            ToolDescriptor { name: "frank_click".into(), description: String::new() },
            ToolDescriptor { name: "frank_find_selector".into(), description: String::new() },
        ]);
        let tool = cache.find_substitute(FailurePattern::SelectorNotFound).unwrap();
        assert_eq!(tool.name, "frank_find_selector");
    }
}
