use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

use super::{str_arg, tool, ToolContext};
use crate::config::Config;
use crate::mcp::protocol::{Tool, ToolResult};
use crate::mcp::registry::{RegistryError, ToolHandler, ToolRegistry};

pub fn register(registry: &mut ToolRegistry, ctx: &Arc<ToolContext>) -> Result<(), RegistryError> {
    registry.register(Arc::new(RunCommand {
        config: ctx.config.clone(),
    }))
}

pub struct RunCommand {
    config: Arc<Config>,
}

#[async_trait]
impl ToolHandler for RunCommand {
    fn descriptor(&self) -> Tool {
        tool(
            "run_command",
            "Run a shell command with sh -c in the project root (or cwd). \
             A non-zero exit status is reported as an error.",
            json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string" },
                    "cwd": {
                        "type": "string",
                        "description": "Working directory, relative to the project root"
                    }
                },
                "required": ["command"]
            }),
        )
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult> {
        let Some(command) = str_arg(&args, "command") else {
            return Ok(ToolResult::error("Missing required parameter: command"));
        };
        let cwd = self.config.resolve(str_arg(&args, "cwd").unwrap_or("."));

        debug!("run_command in {}: {}", cwd.display(), command);

        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&cwd)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to spawn sh in {}", cwd.display()))?;

        let combined = combine_output(&output.stdout, &output.stderr);

        if output.status.success() {
            return Ok(ToolResult::text(combined));
        }

        let status = match output.status.code() {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        Ok(ToolResult::error(format!("Command failed ({})\n{}", status, combined)))
    }
}

fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);

    if stderr.is_empty() {
        stdout.to_string()
    } else if stdout.is_empty() {
        stderr.to_string()
    } else {
        format!("{}\n--- stderr ---\n{}", stdout, stderr)
    }
}
