use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::protocol::{Tool, ToolResult};

/// A named, schema-described unit of functionality.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Name, description and input schema. The name is the dispatch key.
    fn descriptor(&self) -> Tool;

    /// Run the tool. `Err` becomes an error result; it never reaches the
    /// protocol layer.
    async fn invoke(&self, args: Value) -> Result<ToolResult>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("tool '{0}' is registered more than once")]
    Duplicate(String),
}

struct Entry {
    tool: Tool,
    handler: Arc<dyn ToolHandler>,
}

/// Tool name to handler mapping, built once at startup.
///
/// Listing order is registration order.
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) -> Result<(), RegistryError> {
        let tool = handler.descriptor();
        if self.index.contains_key(&tool.name) {
            return Err(RegistryError::Duplicate(tool.name));
        }

        self.index.insert(tool.name.clone(), self.entries.len());
        self.entries.push(Entry { tool, handler });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.index
            .get(name)
            .map(|&i| Arc::clone(&self.entries[i].handler))
    }

    pub fn list(&self) -> Vec<Tool> {
        self.entries.iter().map(|e| e.tool.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
