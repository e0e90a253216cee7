//! Registers MCP servers in an IDE configuration file (`~/.cursor/mcp.json`).
//!
//! Entries live under `mcpServers`; everything else in the file, including
//! entries this module did not write, is preserved.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{error, info, warn};

const SERVERS_KEY: &str = "mcpServers";
const COMPLIANCE_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// `~/.cursor/mcp.json`
pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".cursor").join("mcp.json"))
}

/// One launchable server entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerEntry {
    pub command: String,
    pub args: Vec<String>,
    #[serde(rename = "type")]
    pub transport: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl ServerEntry {
    pub fn stdio(
        command: impl Into<String>,
        args: Vec<String>,
        env: BTreeMap<String, String>,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            transport: "stdio".to_string(),
            env,
        }
    }
}

/// The IDE configuration document
#[derive(Debug)]
pub struct McpConfig {
    path: PathBuf,
    servers: Map<String, Value>,
    /// Top-level keys other than `mcpServers`
    rest: Map<String, Value>,
}

impl McpConfig {
    /// Read the file; a missing file yields an empty `mcpServers` table.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let mut rest = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            match serde_json::from_str::<Value>(&text)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?
            {
                Value::Object(map) => map,
                _ => bail!("{} is not a JSON object", path.display()),
            }
        } else {
            Map::new()
        };

        let servers = match rest.remove(SERVERS_KEY) {
            Some(Value::Object(map)) => map,
            Some(_) => {
                warn!("{} in {} is not an object, replacing it", SERVERS_KEY, path.display());
                Map::new()
            }
            None => Map::new(),
        };

        Ok(Self { path, servers, rest })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn server(&self, name: &str) -> Option<&Value> {
        self.servers.get(name)
    }

    pub fn server_names(&self) -> Vec<String> {
        self.servers.keys().cloned().collect()
    }

    pub fn insert(&mut self, name: &str, entry: &ServerEntry) -> Result<()> {
        let value = serde_json::to_value(entry)?;
        self.servers.insert(name.to_string(), value);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.servers.remove(name).is_some()
    }

    /// Write as 2-space pretty JSON, creating parent directories.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut doc = self.rest.clone();
        doc.insert(SERVERS_KEY.to_string(), Value::Object(self.servers.clone()));
        let text = serde_json::to_string_pretty(&doc)?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        info!("Updated {}", self.path.display());
        Ok(())
    }
}

/// Parse `KEY=VALUE` pairs; malformed entries are logged and dropped.
pub fn parse_env_pairs(pairs: &[String]) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    for pair in pairs {
        match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                env.insert(key.to_string(), value.to_string());
            }
            _ => warn!("Ignoring invalid environment variable format: {}", pair),
        }
    }
    env
}

/// Whether a package document looks like an MCP server.
pub fn is_mcp_compliant(package: &Value) -> bool {
    let has_mcp_dependency = package
        .get("dependencies")
        .and_then(Value::as_object)
        .is_some_and(|deps| deps.keys().any(|d| d.starts_with("@modelcontextprotocol/")));

    let mentions_protocol = package.to_string().contains("modelcontextprotocol");

    let declares_tools = package
        .get("capabilities")
        .and_then(Value::as_object)
        .is_some_and(|caps| caps.contains_key("tools"));

    has_mcp_dependency || mentions_protocol || declares_tools
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Environment {
    pub node: bool,
    pub npm: bool,
}

async fn tool_available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Probe for `node` and `npm` on PATH.
pub async fn check_environment() -> Environment {
    let env = Environment {
        node: tool_available("node").await,
        npm: tool_available("npm").await,
    };
    if !env.node {
        warn!("Node.js is not available");
    }
    if !env.npm {
        warn!("npm is not available");
    }
    env
}

async fn npm_view(package: &str) -> Result<Value> {
    let output = Command::new("npm")
        .args(["view", package, "--json"])
        .output()
        .await
        .context("Failed to run npm view")?;

    if !output.status.success() {
        bail!(
            "npm view {} failed: {}",
            package,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    serde_json::from_slice(&output.stdout).context("npm view returned invalid JSON")
}

/// Fetch the registry document for `package` and check compliance, retrying
/// failed lookups.
async fn check_published_package(package: &str) -> Result<bool> {
    let mut last_error = None;

    for attempt in 1..=COMPLIANCE_ATTEMPTS {
        info!(
            "Checking MCP compliance for {} (attempt {}/{})",
            package, attempt, COMPLIANCE_ATTEMPTS
        );
        match npm_view(package).await {
            Ok(info) => return Ok(is_mcp_compliant(&info)),
            Err(e) => {
                error!("Attempt {}/{} failed: {:#}", attempt, COMPLIANCE_ATTEMPTS, e);
                last_error = Some(e);
                if attempt < COMPLIANCE_ATTEMPTS {
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| anyhow::anyhow!("no attempts made"))
        .context(format!("Could not check {}", package)))
}

fn read_package_json(dir: &Path) -> Result<Value> {
    let path = dir.join("package.json");
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("package.json not found in {}", dir.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Invalid package.json in {}", dir.display()))
}

/// Edits one IDE configuration file.
pub struct Installer {
    config_path: PathBuf,
}

impl Installer {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    fn update(&self, f: impl FnOnce(&mut McpConfig) -> Result<()>) -> Result<()> {
        let mut config = McpConfig::load(&self.config_path)?;
        f(&mut config)?;
        config.save()
    }

    /// Register a published npm package, launched through `npx -y`.
    pub async fn install_package(
        &self,
        package: &str,
        args: &[String],
        env: BTreeMap<String, String>,
    ) -> Result<()> {
        let environment = check_environment().await;
        if !environment.node || !environment.npm {
            bail!("Node.js and npm are required");
        }

        if !check_published_package(package).await? {
            bail!("Package {} is not MCP-compliant", package);
        }

        let mut launch = vec!["-y".to_string(), package.to_string()];
        launch.extend_from_slice(args);
        let entry = ServerEntry::stdio("npx", launch, env);

        self.update(|config| config.insert(package, &entry))?;
        info!("Installed MCP server {}", package);
        Ok(())
    }

    /// Register a local Node package, launched as `node <path>/index.js`.
    /// Returns the entry name.
    pub fn install_local(
        &self,
        path: &Path,
        args: &[String],
        env: BTreeMap<String, String>,
    ) -> Result<String> {
        if !path.exists() {
            bail!("Path does not exist: {}", path.display());
        }

        let package = read_package_json(path)?;
        if !is_mcp_compliant(&package) {
            bail!("Local package at {} is not MCP-compliant", path.display());
        }

        let name = match package.get("name").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .context("Cannot derive a server name from the path")?,
        };

        let mut launch = vec![path.join("index.js").to_string_lossy().to_string()];
        launch.extend_from_slice(args);
        let entry = ServerEntry::stdio("node", launch, env);

        self.update(|config| config.insert(&name, &entry))?;
        info!("Installed local MCP server {}", name);
        Ok(name)
    }

    /// Register this executable's `serve` command under `name`.
    pub fn register_self(&self, name: &str) -> Result<()> {
        let exe = std::env::current_exe().context("Failed to locate current executable")?;
        let entry = ServerEntry::stdio(
            exe.to_string_lossy(),
            vec!["serve".to_string()],
            BTreeMap::new(),
        );
        self.update(|config| config.insert(name, &entry))?;
        info!("Registered {} as {}", exe.display(), name);
        Ok(())
    }

    /// Returns whether the entry existed.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let mut existed = false;
        self.update(|config| {
            existed = config.remove(name);
            Ok(())
        })?;
        if existed {
            info!("Removed MCP server {}", name);
        } else {
            warn!("No MCP server named {}", name);
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_compliance_indicators() {
        assert!(is_mcp_compliant(&json!({
            "dependencies": { "@modelcontextprotocol/sdk": "^1.0.0" }
        })));
        assert!(is_mcp_compliant(&json!({
            "description": "A modelcontextprotocol server"
        })));
        assert!(is_mcp_compliant(&json!({
            "capabilities": { "tools": {} }
        })));
        assert!(!is_mcp_compliant(&json!({
            "name": "left-pad",
            "dependencies": { "lodash": "4" },
            "capabilities": { "resources": {} }
        })));
    }

    #[test]
    fn test_parse_env_pairs() {
        let env = parse_env_pairs(&[
            "API_KEY=abc".to_string(),
            "URL=http://x?a=b".to_string(),
            "broken".to_string(),
            "=nokey".to_string(),
        ]);

        assert_eq!(env.len(), 2);
        assert_eq!(env["API_KEY"], "abc");
        assert_eq!(env["URL"], "http://x?a=b");
    }

    #[test]
    fn test_missing_config_starts_empty() {
        let temp = TempDir::new().unwrap();
        let config = McpConfig::load(temp.path().join("nested/mcp.json")).unwrap();

        assert!(config.server_names().is_empty());
        config.save().unwrap();

        let text = std::fs::read_to_string(temp.path().join("nested/mcp.json")).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), json!({"mcpServers": {}}));
    }

    #[test]
    fn test_save_preserves_foreign_entries() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mcp.json");
        std::fs::write(
            &path,
            r#"{"theme":"dark","mcpServers":{"other":{"url":"http://localhost:1"}}}"#,
        )
        .unwrap();

        let mut config = McpConfig::load(&path).unwrap();
        config
            .insert("mine", &ServerEntry::stdio("node", vec!["a.js".into()], BTreeMap::new()))
            .unwrap();
        config.save().unwrap();

        let doc: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["theme"], "dark");
        assert_eq!(doc["mcpServers"]["other"]["url"], "http://localhost:1");
        assert_eq!(
            doc["mcpServers"]["mine"],
            json!({"command": "node", "args": ["a.js"], "type": "stdio"})
        );
    }

    #[test]
    fn test_install_local() {
        let temp = TempDir::new().unwrap();
        let pkg = temp.path().join("weather");
        std::fs::create_dir(&pkg).unwrap();
        std::fs::write(
            pkg.join("package.json"),
            r#"{"name":"weather-mcp","dependencies":{"@modelcontextprotocol/sdk":"1"}}"#,
        )
        .unwrap();

        let config_path = temp.path().join("mcp.json");
        let installer = Installer::new(&config_path);
        let env = parse_env_pairs(&["TOKEN=t".to_string()]);

        let name = installer.install_local(&pkg, &["--verbose".to_string()], env).unwrap();
        assert_eq!(name, "weather-mcp");

        let config = McpConfig::load(&config_path).unwrap();
        let entry = config.server("weather-mcp").unwrap();
        assert_eq!(entry["command"], "node");
        assert_eq!(entry["args"][0], pkg.join("index.js").to_string_lossy().to_string());
        assert_eq!(entry["args"][1], "--verbose");
        assert_eq!(entry["env"]["TOKEN"], "t");
    }

    #[test]
    fn test_install_local_rejects_non_compliant() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("package.json"), r#"{"name":"plain"}"#).unwrap();

        let installer = Installer::new(temp.path().join("mcp.json"));
        assert!(installer.install_local(temp.path(), &[], BTreeMap::new()).is_err());
        assert!(installer
            .install_local(&temp.path().join("missing"), &[], BTreeMap::new())
            .is_err());
    }

    #[test]
    fn test_register_and_remove() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("mcp.json");
        let installer = Installer::new(&config_path);

        installer.register_self("toolforge").unwrap();
        let config = McpConfig::load(&config_path).unwrap();
        assert_eq!(config.server("toolforge").unwrap()["args"], json!(["serve"]));

        assert!(installer.remove("toolforge").unwrap());
        assert!(!installer.remove("toolforge").unwrap());
        assert!(McpConfig::load(&config_path).unwrap().server_names().is_empty());
    }
}
