use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{str_arg, tool};
use crate::mcp::protocol::{Tool, ToolResult};
use crate::mcp::registry::{RegistryError, ToolHandler, ToolRegistry};

pub fn register(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    registry.register(Arc::new(HelloWorld))?;
    registry.register(Arc::new(Echo))?;
    registry.register(Arc::new(CurrentTime))?;
    Ok(())
}

pub struct HelloWorld;

#[async_trait]
impl ToolHandler for HelloWorld {
    fn descriptor(&self) -> Tool {
        tool(
            "hello_world",
            "Greet someone by name. Useful to check the server is alive.",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Who to greet", "default": "World" }
                }
            }),
        )
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult> {
        let name = str_arg(&args, "name").unwrap_or("World");
        Ok(ToolResult::text(format!("Hello, {}!", name)))
    }
}

pub struct Echo;

#[async_trait]
impl ToolHandler for Echo {
    fn descriptor(&self) -> Tool {
        tool(
            "echo",
            "Return the given text unchanged.",
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            }),
        )
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult> {
        match str_arg(&args, "text") {
            Some(text) => Ok(ToolResult::text(text)),
            None => Ok(ToolResult::error("Missing required parameter: text")),
        }
    }
}

pub struct CurrentTime;

#[async_trait]
impl ToolHandler for CurrentTime {
    fn descriptor(&self) -> Tool {
        tool(
            "current_time",
            "Current date and time in UTC (RFC 3339).",
            json!({ "type": "object", "properties": {} }),
        )
    }

    async fn invoke(&self, _args: Value) -> Result<ToolResult> {
        Ok(ToolResult::text(chrono::Utc::now().to_rfc3339()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hello_world() {
        let result = HelloWorld.invoke(json!({"name": "Ada"})).await.unwrap();
        assert_eq!(result, ToolResult::text("Hello, Ada!"));

        let result = HelloWorld.invoke(json!({})).await.unwrap();
        assert_eq!(result.text_content(), "Hello, World!");
    }

    #[tokio::test]
    async fn test_echo_requires_text() {
        assert!(Echo.invoke(json!({})).await.unwrap().is_error());
        assert_eq!(Echo.invoke(json!({"text": "hi"})).await.unwrap().text_content(), "hi");
    }

    #[tokio::test]
    async fn test_current_time_parses() {
        let text = CurrentTime.invoke(json!({})).await.unwrap().text_content();
        assert!(chrono::DateTime::parse_from_rfc3339(&text).is_ok());
    }
}
