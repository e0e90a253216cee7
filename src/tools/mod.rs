//! Built-in tool groups.
//!
//! Each group contributes handlers through an explicit `register` call; a name
//! registered twice aborts startup.

pub mod basic;
pub mod file;
pub mod improve;
pub mod memory;
pub mod shell;

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::improve::Analyzer;
use crate::mcp::protocol::Tool;
use crate::mcp::registry::{RegistryError, ToolRegistry};
use crate::usage::UsageStore;

/// Shared dependencies available to all tool handlers
pub struct ToolContext {
    pub config: Arc<Config>,
    pub usage: Arc<Mutex<UsageStore>>,
    pub analyzer: Arc<Analyzer>,
}

pub fn register_all(
    registry: &mut ToolRegistry,
    ctx: &Arc<ToolContext>,
) -> Result<(), RegistryError> {
    basic::register(registry)?;
    file::register(registry, ctx)?;
    if ctx.config.settings.shell.enabled {
        shell::register(registry, ctx)?;
    }
    memory::register(registry, ctx)?;
    improve::register(registry, ctx)?;
    Ok(())
}

fn tool(name: &str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn u64_arg(args: &Value, key: &str) -> Option<u64> {
    args.get(key).and_then(Value::as_u64)
}

fn bool_arg(args: &Value, key: &str) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(false)
}
