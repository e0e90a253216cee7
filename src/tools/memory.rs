use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{str_arg, tool, ToolContext};
use crate::mcp::protocol::{Tool, ToolResult};
use crate::mcp::registry::{RegistryError, ToolHandler, ToolRegistry};
use crate::usage::UsageStore;

const DEFAULT_CATEGORY: &str = "general";

pub fn register(registry: &mut ToolRegistry, ctx: &Arc<ToolContext>) -> Result<(), RegistryError> {
    let usage = &ctx.usage;
    registry.register(Arc::new(MemorySet { usage: usage.clone() }))?;
    registry.register(Arc::new(MemoryGet { usage: usage.clone() }))?;
    registry.register(Arc::new(MemoryDelete { usage: usage.clone() }))?;
    registry.register(Arc::new(MemoryList { usage: usage.clone() }))?;
    registry.register(Arc::new(LearnLesson { usage: usage.clone() }))?;
    registry.register(Arc::new(ListLessons { usage: usage.clone() }))?;
    registry.register(Arc::new(MarkLessonApplied { usage: usage.clone() }))?;
    registry.register(Arc::new(UsageStats { usage: usage.clone() }))?;
    Ok(())
}

fn key_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "key": { "type": "string" } },
        "required": ["key"]
    })
}

fn durability_note(store: &UsageStore) -> &'static str {
    if store.is_durable() {
        ""
    } else {
        " (not persisted, kept in memory)"
    }
}

pub struct MemorySet {
    usage: Arc<Mutex<UsageStore>>,
}

#[async_trait]
impl ToolHandler for MemorySet {
    fn descriptor(&self) -> Tool {
        tool(
            "memory_set",
            "Store a JSON value under a key. Survives restarts.",
            json!({
                "type": "object",
                "properties": {
                    "key": { "type": "string" },
                    "value": { "description": "Any JSON value" }
                },
                "required": ["key", "value"]
            }),
        )
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult> {
        let (Some(key), Some(value)) = (str_arg(&args, "key"), args.get("value")) else {
            return Ok(ToolResult::error("Missing required parameters: key, value"));
        };

        let mut store = self.usage.lock().await;
        store.set(key, value.clone());
        Ok(ToolResult::text(format!("Stored {}{}", key, durability_note(&store))))
    }
}

pub struct MemoryGet {
    usage: Arc<Mutex<UsageStore>>,
}

#[async_trait]
impl ToolHandler for MemoryGet {
    fn descriptor(&self) -> Tool {
        tool("memory_get", "Read the JSON value stored under a key.", key_schema())
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult> {
        let Some(key) = str_arg(&args, "key") else {
            return Ok(ToolResult::error("Missing required parameter: key"));
        };

        let store = self.usage.lock().await;
        match store.get(key) {
            Some(value) => Ok(ToolResult::text(serde_json::to_string_pretty(&value)?)),
            None => Ok(ToolResult::error(format!("No value stored for key: {}", key))),
        }
    }
}

pub struct MemoryDelete {
    usage: Arc<Mutex<UsageStore>>,
}

#[async_trait]
impl ToolHandler for MemoryDelete {
    fn descriptor(&self) -> Tool {
        tool("memory_delete", "Remove a stored key.", key_schema())
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult> {
        let Some(key) = str_arg(&args, "key") else {
            return Ok(ToolResult::error("Missing required parameter: key"));
        };

        let mut store = self.usage.lock().await;
        if store.delete(key) {
            Ok(ToolResult::text(format!("Deleted {}", key)))
        } else {
            Ok(ToolResult::text(format!("{} was not set", key)))
        }
    }
}

pub struct MemoryList {
    usage: Arc<Mutex<UsageStore>>,
}

#[async_trait]
impl ToolHandler for MemoryList {
    fn descriptor(&self) -> Tool {
        tool(
            "memory_list",
            "List stored keys in sorted order.",
            json!({ "type": "object", "properties": {} }),
        )
    }

    async fn invoke(&self, _args: Value) -> Result<ToolResult> {
        let store = self.usage.lock().await;
        let keys = store.keys();
        if keys.is_empty() {
            return Ok(ToolResult::text("No keys stored."));
        }
        Ok(ToolResult::text(keys.join("\n")))
    }
}

pub struct LearnLesson {
    usage: Arc<Mutex<UsageStore>>,
}

#[async_trait]
impl ToolHandler for LearnLesson {
    fn descriptor(&self) -> Tool {
        tool(
            "learn_lesson",
            "Record a lesson learned. New lessons are also appended to the rules document.",
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "category": { "type": "string", "default": DEFAULT_CATEGORY }
                },
                "required": ["text"]
            }),
        )
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult> {
        let Some(text) = str_arg(&args, "text").map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(ToolResult::error("Missing required parameter: text"));
        };
        let category = str_arg(&args, "category").unwrap_or(DEFAULT_CATEGORY);

        let mut store = self.usage.lock().await;
        if store.learn_lesson(text, category) {
            Ok(ToolResult::text(format!(
                "Learned [{}] {}{}",
                category,
                text,
                durability_note(&store)
            )))
        } else {
            Ok(ToolResult::text(format!("Already known: {}", text)))
        }
    }
}

pub struct ListLessons {
    usage: Arc<Mutex<UsageStore>>,
}

#[async_trait]
impl ToolHandler for ListLessons {
    fn descriptor(&self) -> Tool {
        tool(
            "list_lessons",
            "List recorded lessons, optionally filtered by category.",
            json!({
                "type": "object",
                "properties": { "category": { "type": "string" } }
            }),
        )
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult> {
        let store = self.usage.lock().await;
        let lessons = store.lessons(str_arg(&args, "category"));

        if lessons.is_empty() {
            return Ok(ToolResult::text("No lessons recorded."));
        }

        let lines: Vec<String> = lessons
            .iter()
            .map(|l| {
                format!(
                    "- [{}] {} ({}{})",
                    l.category,
                    l.text,
                    l.timestamp.format("%Y-%m-%d"),
                    if l.applied { ", applied" } else { "" }
                )
            })
            .collect();
        Ok(ToolResult::text(lines.join("\n")))
    }
}

pub struct MarkLessonApplied {
    usage: Arc<Mutex<UsageStore>>,
}

#[async_trait]
impl ToolHandler for MarkLessonApplied {
    fn descriptor(&self) -> Tool {
        tool(
            "mark_lesson_applied",
            "Mark a recorded lesson as applied. The text must match the lesson exactly.",
            json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            }),
        )
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult> {
        let Some(text) = str_arg(&args, "text").map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(ToolResult::error("Missing required parameter: text"));
        };

        let mut store = self.usage.lock().await;
        if store.mark_applied(text) {
            Ok(ToolResult::text(format!("Applied: {}{}", text, durability_note(&store))))
        } else {
            Ok(ToolResult::error(format!("No lesson recorded with text: {}", text)))
        }
    }
}

pub struct UsageStats {
    usage: Arc<Mutex<UsageStore>>,
}

#[async_trait]
impl ToolHandler for UsageStats {
    fn descriptor(&self) -> Tool {
        tool(
            "usage_stats",
            "Usage statistics as JSON, for one tool or all of them.",
            json!({
                "type": "object",
                "properties": { "tool": { "type": "string" } }
            }),
        )
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult> {
        let store = self.usage.lock().await;

        let json = match str_arg(&args, "tool") {
            Some(name) => match store.stats(name) {
                Some(record) => serde_json::to_string_pretty(record)?,
                None => return Ok(ToolResult::error(format!("No usage recorded for {}", name))),
            },
            None => serde_json::to_string_pretty(store.all_stats())?,
        };
        Ok(ToolResult::text(json))
    }
}
