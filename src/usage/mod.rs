//! Durable per-tool usage statistics, key/value memory and the lesson log.
//!
//! Every mutation is persisted before the call returns. A failed save is
//! logged and the in-memory state carries on; [`UsageStore::is_durable`]
//! reports whether the last write made it to disk.

mod backend;
mod record;

pub use backend::{JsonFileBackend, MemoryBackend, StateBackend};
pub use record::{LessonRecord, UsageRecord};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::rules::RulesDocument;

const STATE_VERSION: u32 = 1;

/// Everything the store persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageState {
    pub version: u32,
    pub memory: BTreeMap<String, Value>,
    pub usage: BTreeMap<String, UsageRecord>,
    pub lessons: Vec<LessonRecord>,
}

impl Default for UsageState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            memory: BTreeMap::new(),
            usage: BTreeMap::new(),
            lessons: Vec::new(),
        }
    }
}

pub struct UsageStore {
    state: UsageState,
    backend: Box<dyn StateBackend>,
    rules: Option<RulesDocument>,
    durable: bool,
    revision: u64,
}

impl UsageStore {
    /// Load state from `backend`, falling back to an empty state on any error.
    pub fn open(backend: Box<dyn StateBackend>, rules: Option<RulesDocument>) -> Self {
        let (state, durable) = match backend.load() {
            Ok(Some(state)) => {
                info!(
                    "Loaded usage state: {} tools, {} lessons, {} memory keys",
                    state.usage.len(),
                    state.lessons.len(),
                    state.memory.len()
                );
                (state, true)
            }
            Ok(None) => {
                debug!("No usage state yet, starting empty");
                (UsageState::default(), true)
            }
            Err(e) => {
                warn!("Failed to load usage state, starting empty: {:#}", e);
                (UsageState::default(), false)
            }
        };

        Self {
            state,
            backend,
            rules,
            durable,
            revision: 0,
        }
    }

    /// Store with no disk persistence and no rules document
    pub fn in_memory() -> Self {
        Self::open(Box::new(MemoryBackend::new()), None)
    }

    pub fn rules(&self) -> Option<&RulesDocument> {
        self.rules.as_ref()
    }

    /// Whether the last persistence attempt succeeded
    pub fn is_durable(&self) -> bool {
        self.durable
    }

    /// Incremented on every mutation
    pub fn revision(&self) -> u64 {
        self.revision
    }

    // Usage statistics

    pub fn record_outcome(&mut self, tool_name: &str, success: bool, latency_ms: f64) {
        self.state
            .usage
            .entry(tool_name.to_string())
            .or_default()
            .record(success, latency_ms, Utc::now());
        self.commit();
    }

    pub fn stats(&self, tool_name: &str) -> Option<&UsageRecord> {
        self.state.usage.get(tool_name)
    }

    pub fn all_stats(&self) -> &BTreeMap<String, UsageRecord> {
        &self.state.usage
    }

    /// Clear one tool's record, or all of them. Returns how many were removed.
    pub fn reset_stats(&mut self, tool_name: Option<&str>) -> usize {
        let removed = match tool_name {
            Some(name) => usize::from(self.state.usage.remove(name).is_some()),
            None => {
                let n = self.state.usage.len();
                self.state.usage.clear();
                n
            }
        };
        if removed > 0 {
            self.commit();
        }
        removed
    }

    // Lessons

    /// Append a lesson unless one with the same text exists.
    ///
    /// A new lesson is also appended to the rules document; failures there are
    /// logged only.
    pub fn learn_lesson(&mut self, text: &str, category: &str) -> bool {
        if self.state.lessons.iter().any(|l| l.text == text) {
            debug!("Lesson already known: {}", text);
            return false;
        }

        self.state.lessons.push(LessonRecord {
            text: text.to_string(),
            category: category.to_string(),
            timestamp: Utc::now(),
            applied: false,
        });
        self.commit();

        if let Some(rules) = &self.rules {
            if let Err(e) = rules.append_lesson(category, text) {
                warn!("Failed to add lesson to {}: {:#}", rules.path().display(), e);
            }
        }

        true
    }

    pub fn lessons(&self, category: Option<&str>) -> Vec<&LessonRecord> {
        self.state
            .lessons
            .iter()
            .filter(|l| category.map_or(true, |c| l.category == c))
            .collect()
    }

    pub fn mark_applied(&mut self, text: &str) -> bool {
        let Some(lesson) = self.state.lessons.iter_mut().find(|l| l.text == text) else {
            return false;
        };
        if !lesson.applied {
            lesson.applied = true;
            self.commit();
        }
        true
    }

    // Memory

    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.memory.get(key).cloned()
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.state.memory.insert(key.to_string(), value);
        self.commit();
    }

    pub fn delete(&mut self, key: &str) -> bool {
        let existed = self.state.memory.remove(key).is_some();
        if existed {
            self.commit();
        }
        existed
    }

    pub fn keys(&self) -> Vec<&str> {
        self.state.memory.keys().map(String::as_str).collect()
    }

    fn commit(&mut self) {
        self.revision += 1;
        match self.backend.save(&self.state) {
            Ok(()) => self.durable = true,
            Err(e) => {
                warn!("Failed to persist usage state (kept in memory): {:#}", e);
                self.durable = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file_store(temp: &TempDir) -> UsageStore {
        UsageStore::open(
            Box::new(JsonFileBackend::new(temp.path().join("usage.json"))),
            None,
        )
    }

    #[test]
    fn test_record_outcome_persists() {
        let temp = TempDir::new().unwrap();
        {
            let mut store = file_store(&temp);
            store.record_outcome("echo", true, 12.0);
            store.record_outcome("echo", false, 18.0);
            assert!(store.is_durable());
        }

        let store = file_store(&temp);
        let record = store.stats("echo").unwrap();
        assert_eq!(record.calls, 2);
        assert_eq!(record.successes, 1);
        assert!((record.average_latency_ms - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_learn_lesson_deduplicates() {
        let mut store = UsageStore::in_memory();

        assert!(store.learn_lesson("X", "cat"));
        assert!(!store.learn_lesson("X", "cat"));
        assert!(!store.learn_lesson("X", "other"));

        let lessons = store.lessons(None);
        assert_eq!(lessons.len(), 1);
        assert_eq!(lessons[0].text, "X");
    }

    #[test]
    fn test_lessons_filter_and_mark_applied() {
        let mut store = UsageStore::in_memory();
        store.learn_lesson("use rg", "tooling");
        store.learn_lesson("write tests", "testing");

        assert_eq!(store.lessons(Some("testing")).len(), 1);
        assert!(store.mark_applied("use rg"));
        assert!(!store.mark_applied("unknown"));
        assert!(store.lessons(Some("tooling"))[0].applied);
    }

    #[test]
    fn test_memory_roundtrip() {
        let mut store = UsageStore::in_memory();
        store.set("b", serde_json::json!(2));
        store.set("a", serde_json::json!({"x": 1}));

        assert_eq!(store.get("b"), Some(serde_json::json!(2)));
        assert_eq!(store.keys(), vec!["a", "b"]);
        assert!(store.delete("a"));
        assert!(!store.delete("a"));
        assert_eq!(store.get("a"), None);
    }

    #[test]
    fn test_save_failure_keeps_memory_state() {
        let temp = TempDir::new().unwrap();
        // A directory where the file should be makes every save fail
        let path = temp.path().join("usage.json");
        std::fs::create_dir_all(&path).unwrap();

        let mut store = UsageStore::open(Box::new(JsonFileBackend::new(&path)), None);
        store.record_outcome("echo", true, 1.0);

        assert!(!store.is_durable());
        assert_eq!(store.stats("echo").unwrap().calls, 1);
    }

    #[test]
    fn test_malformed_state_starts_empty() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("usage.json"), "[1, 2").unwrap();

        let mut store = file_store(&temp);
        assert!(store.all_stats().is_empty());

        store.record_outcome("echo", true, 1.0);
        assert!(store.is_durable());
    }

    #[test]
    fn test_revision_and_reset() {
        let mut store = UsageStore::in_memory();
        store.record_outcome("a", true, 1.0);
        store.record_outcome("b", true, 1.0);
        assert_eq!(store.revision(), 2);

        assert_eq!(store.reset_stats(Some("a")), 1);
        assert_eq!(store.reset_stats(Some("a")), 0);
        assert_eq!(store.reset_stats(None), 1);
        assert_eq!(store.revision(), 4);
    }
}
