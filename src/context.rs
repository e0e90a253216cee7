use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::Config;
use crate::improve::Analyzer;
use crate::mcp::registry::ToolRegistry;
use crate::rules::RulesDocument;
use crate::tools::{self, ToolContext};
use crate::usage::{JsonFileBackend, StateBackend, UsageStore};

/// Everything the server needs, built once at startup and shared explicitly.
pub struct AppContext {
    pub tools: Arc<ToolContext>,
    pub registry: Arc<ToolRegistry>,
}

impl AppContext {
    /// Open the usage store under the data directory and register every
    /// built-in tool.
    ///
    /// An unusable data directory is logged; the store then runs in memory and
    /// reports itself as not durable.
    pub fn new(config: Config) -> Result<Self> {
        if let Err(e) = config.ensure_dirs() {
            warn!("Usage state will not be persisted: {:#}", e);
        }
        let backend = JsonFileBackend::new(&config.usage_path);
        Self::with_backend(config, Box::new(backend))
    }

    pub fn with_backend(config: Config, backend: Box<dyn StateBackend>) -> Result<Self> {
        let rules = RulesDocument::new(config.rules_path(), &config.settings.rules);
        let store = UsageStore::open(backend, Some(rules));
        let analyzer = Analyzer::new(config.settings.analyzer.clone());

        let tools = Arc::new(ToolContext {
            config: Arc::new(config),
            usage: Arc::new(Mutex::new(store)),
            analyzer: Arc::new(analyzer),
        });

        let mut registry = ToolRegistry::new();
        tools::register_all(&mut registry, &tools).context("Failed to register built-in tools")?;
        info!("Registered {} tools", registry.len());

        Ok(Self {
            tools,
            registry: Arc::new(registry),
        })
    }

    pub fn config(&self) -> &Config {
        &self.tools.config
    }

    pub fn usage(&self) -> &Arc<Mutex<UsageStore>> {
        &self.tools.usage
    }

    pub fn analyzer(&self) -> &Arc<Analyzer> {
        &self.tools.analyzer
    }
}
