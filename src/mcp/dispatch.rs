use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::protocol::ToolResult;
use super::registry::{ToolHandler, ToolRegistry};
use crate::usage::UsageStore;

/// Resolves tool names, runs handlers and records every outcome.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    usage: Arc<Mutex<UsageStore>>,
    timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        usage: Arc<Mutex<UsageStore>>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            usage,
            timeout,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run `name` with `args`. Never fails: handler errors, panics, timeouts
    /// and unknown names all come back as error results, and every attempt is
    /// recorded in the usage store.
    pub async fn dispatch(&self, name: &str, args: Value) -> ToolResult {
        let started = Instant::now();

        let result = match self.registry.get(name) {
            Some(handler) => self.invoke(name, handler, args).await,
            None => {
                warn!("Unknown tool: {}", name);
                ToolResult::error(format!("Unknown tool: {}", name))
            }
        };

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        let success = !result.is_error();
        debug!(
            "Tool {} finished in {:.1}ms (success: {})",
            name, latency_ms, success
        );

        self.usage
            .lock()
            .await
            .record_outcome(name, success, latency_ms);

        result
    }

    async fn invoke(&self, name: &str, handler: Arc<dyn ToolHandler>, args: Value) -> ToolResult {
        let mut task = tokio::spawn(async move { handler.invoke(args).await });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    task.abort();
                    warn!("Tool {} timed out after {:?}", name, limit);
                    return ToolResult::error(format!("Tool timed out after {:?}", limit));
                }
            },
            None => task.await,
        };

        match joined {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!("Tool {} failed: {:#}", name, e);
                ToolResult::error(format!("{:#}", e))
            }
            Err(e) if e.is_panic() => {
                warn!("Tool {} panicked", name);
                ToolResult::error(format!("Tool panicked: {}", panic_message(e.into_panic())))
            }
            Err(e) => ToolResult::error(format!("Tool was cancelled: {}", e)),
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
