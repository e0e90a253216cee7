//! Self-improvement analysis over recorded tool usage.
//!
//! Suggestions are derived from the usage records on demand and never stored
//! as the source of truth; the last result is cached per store revision.

mod report;

pub use report::render_report;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AnalyzerConfig;
use crate::usage::{UsageRecord, UsageStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub tool_name: String,
    pub text: String,
    pub priority: Priority,
    pub reason: String,
}

impl Suggestion {
    /// Bullet line used in the rules document
    pub fn to_bullet(&self) -> String {
        format!(
            "- [{}] {}: {} ({})",
            self.priority, self.tool_name, self.text, self.reason
        )
    }
}

/// Evaluate every record against the thresholds.
///
/// Tools are visited in name order; per tool the rules run as reliability,
/// performance, discoverability.
pub fn suggest(
    records: &BTreeMap<String, UsageRecord>,
    settings: &AnalyzerConfig,
) -> Vec<Suggestion> {
    let distinct_tools = records.len();
    let mut suggestions = Vec::new();

    for (name, record) in records {
        if record.calls > settings.min_calls && record.success_rate < settings.success_threshold {
            suggestions.push(Suggestion {
                tool_name: name.clone(),
                text: "Improve error handling and input validation".to_string(),
                priority: Priority::High,
                reason: format!(
                    "success rate {:.0}% over {} calls",
                    record.success_rate * 100.0,
                    record.calls
                ),
            });
        }

        if record.calls > settings.min_calls
            && record.average_latency_ms > settings.latency_threshold_ms
        {
            suggestions.push(Suggestion {
                tool_name: name.clone(),
                text: "Optimize performance or cache results".to_string(),
                priority: Priority::Medium,
                reason: format!("average latency {:.0}ms", record.average_latency_ms),
            });
        }

        if record.calls < settings.rare_calls && distinct_tools > settings.min_distinct_tools {
            suggestions.push(Suggestion {
                tool_name: name.clone(),
                text: "Improve the description so the tool is easier to discover".to_string(),
                priority: Priority::Low,
                reason: format!("only {} calls", record.calls),
            });
        }
    }

    suggestions
}

/// Highest priority first; equal priorities keep their original order.
pub fn rank(mut suggestions: Vec<Suggestion>, limit: usize) -> Vec<Suggestion> {
    suggestions.sort_by(|a, b| b.priority.cmp(&a.priority));
    suggestions.truncate(limit);
    suggestions
}

pub struct Analyzer {
    settings: AnalyzerConfig,
    cache: Mutex<Option<(u64, Vec<Suggestion>)>>,
}

impl Analyzer {
    pub fn new(settings: AnalyzerConfig) -> Self {
        Self {
            settings,
            cache: Mutex::new(None),
        }
    }

    pub fn analyze(&self, store: &UsageStore) -> Vec<Suggestion> {
        let revision = store.revision();

        if let Ok(cache) = self.cache.lock() {
            if let Some((cached_rev, suggestions)) = cache.as_ref() {
                if *cached_rev == revision {
                    return suggestions.clone();
                }
            }
        }

        let suggestions = suggest(store.all_stats(), &self.settings);
        debug!("Analyzed usage: {} suggestions", suggestions.len());

        if let Ok(mut cache) = self.cache.lock() {
            *cache = Some((revision, suggestions.clone()));
        }
        suggestions
    }

    pub fn top_suggestions(&self, store: &UsageStore, limit: usize) -> Vec<Suggestion> {
        rank(self.analyze(store), limit)
    }

    pub fn generate_report(&self, store: &UsageStore) -> String {
        render_report(store.all_stats(), &self.analyze(store))
    }

    /// Write the top suggestions into the store's rules document, replacing any
    /// block written before. Returns how many were written.
    pub fn update_external_rules(&self, store: &UsageStore) -> Result<usize> {
        let rules = store
            .rules()
            .context("No rules document configured")?;

        let top = self.top_suggestions(store, self.settings.top_suggestions);
        let lines: Vec<String> = top.iter().map(Suggestion::to_bullet).collect();
        rules.write_suggestions(&lines)?;

        info!(
            "Wrote {} suggestions to {}",
            lines.len(),
            rules.path().display()
        );
        Ok(lines.len())
    }
}

/// Push suggestions to the rules document every `every`, until the runtime
/// shuts down. The first update happens after one full interval.
pub fn spawn_periodic_updates(
    analyzer: Arc<Analyzer>,
    usage: Arc<tokio::sync::Mutex<UsageStore>>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let store = usage.lock().await;
            if let Err(e) = analyzer.update_external_rules(&store) {
                warn!("Periodic rules update failed: {:#}", e);
            }
        }
    })
}
