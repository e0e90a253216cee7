use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{tool, ToolContext};
use crate::mcp::protocol::{Tool, ToolResult};
use crate::mcp::registry::{RegistryError, ToolHandler, ToolRegistry};

pub fn register(registry: &mut ToolRegistry, ctx: &Arc<ToolContext>) -> Result<(), RegistryError> {
    registry.register(Arc::new(AnalyzeUsage { ctx: ctx.clone() }))?;
    registry.register(Arc::new(UsageReport { ctx: ctx.clone() }))?;
    registry.register(Arc::new(UpdateRules { ctx: ctx.clone() }))?;
    Ok(())
}

fn no_args() -> Value {
    json!({ "type": "object", "properties": {} })
}

pub struct AnalyzeUsage {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for AnalyzeUsage {
    fn descriptor(&self) -> Tool {
        tool(
            "analyze_usage",
            "Suggestions derived from recorded tool usage, as a JSON list.",
            no_args(),
        )
    }

    async fn invoke(&self, _args: Value) -> Result<ToolResult> {
        let store = self.ctx.usage.lock().await;
        let suggestions = self.ctx.analyzer.analyze(&store);
        Ok(ToolResult::text(serde_json::to_string_pretty(&suggestions)?))
    }
}

pub struct UsageReport {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for UsageReport {
    fn descriptor(&self) -> Tool {
        tool(
            "usage_report",
            "Human-readable usage table with improvement suggestions.",
            no_args(),
        )
    }

    async fn invoke(&self, _args: Value) -> Result<ToolResult> {
        let store = self.ctx.usage.lock().await;
        Ok(ToolResult::text(self.ctx.analyzer.generate_report(&store)))
    }
}

pub struct UpdateRules {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for UpdateRules {
    fn descriptor(&self) -> Tool {
        tool(
            "update_rules",
            "Write the top suggestions into the rules document, replacing the previous block.",
            no_args(),
        )
    }

    async fn invoke(&self, _args: Value) -> Result<ToolResult> {
        let store = self.ctx.usage.lock().await;
        let written = self.ctx.analyzer.update_external_rules(&store)?;

        let path = self.ctx.config.rules_path();
        Ok(ToolResult::text(format!(
            "Wrote {} suggestion(s) to {}",
            written,
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::setup_ctx;

    #[tokio::test]
    async fn test_analyze_usage_flags_flaky_tool() {
        let (ctx, _temp) = setup_ctx();
        {
            let mut store = ctx.usage.lock().await;
            for i in 0..6 {
                store.record_outcome("flaky", i < 3, 10.0);
            }
        }

        let analyze = AnalyzeUsage { ctx: ctx.clone() };
        let list: Value =
            serde_json::from_str(&analyze.invoke(json!({})).await.unwrap().text_content()).unwrap();

        assert_eq!(list[0]["toolName"], "flaky");
        assert_eq!(list[0]["priority"], "high");
    }

    #[tokio::test]
    async fn test_usage_report_empty() {
        let (ctx, _temp) = setup_ctx();
        let report = UsageReport { ctx: ctx.clone() };

        let text = report.invoke(json!({})).await.unwrap().text_content();
        assert!(text.contains("No suggestions."));
    }

    #[tokio::test]
    async fn test_update_rules_replaces_block() {
        let (ctx, _temp) = setup_ctx();
        {
            let mut store = ctx.usage.lock().await;
            for _ in 0..6 {
                store.record_outcome("slow", true, 5000.0);
            }
        }
        let update = UpdateRules { ctx: ctx.clone() };

        update.invoke(json!({})).await.unwrap();
        let text = update.invoke(json!({})).await.unwrap().text_content();
        assert!(text.starts_with("Wrote 1 suggestion(s)"));

        let doc = std::fs::read_to_string(ctx.config.rules_path()).unwrap();
        assert_eq!(doc.matches("- [medium] slow:").count(), 1);
    }
}
