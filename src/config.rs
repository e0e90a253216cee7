use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Runtime-resolved paths and settings
#[derive(Debug, Clone)]
pub struct Config {
    /// Detected project root directory
    pub project_root: PathBuf,
    /// Project-local directory: {project_root}/.toolforge/
    pub data_dir: PathBuf,
    /// Usage store: {data_dir}/usage.json
    pub usage_path: PathBuf,
    /// Parsed config file settings
    pub settings: ConfigFile,
}

/// Parsed from .toolforge/config.toml (all fields have defaults)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub dispatch: DispatchConfig,
    pub rules: RulesConfig,
    pub analyzer: AnalyzerConfig,
    pub shell: ShellConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Per-call limit; unset means tools may run indefinitely
    pub timeout_secs: Option<u64>,
}

impl DispatchConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Rules document, relative to the project root
    pub path: PathBuf,
    pub lessons_heading: String,
    pub suggestions_heading: String,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".cursorrules"),
            lessons_heading: "Lessons Learned".into(),
            suggestions_heading: "Tool Suggestions".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Reliability and performance rules need more calls than this
    pub min_calls: u64,
    pub success_threshold: f64,
    pub latency_threshold_ms: f64,
    /// Tools with fewer calls than this count as rarely used
    pub rare_calls: u64,
    /// Discoverability rule applies once more tools than this have been used
    pub min_distinct_tools: usize,
    pub top_suggestions: usize,
    /// Push suggestions to the rules document on this interval
    pub interval_secs: Option<u64>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_calls: 5,
            success_threshold: 0.8,
            latency_threshold_ms: 2000.0,
            rare_calls: 3,
            min_distinct_tools: 5,
            top_suggestions: 3,
            interval_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub enabled: bool,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

const DEFAULT_CONFIG_TOML: &str = r#"# Toolforge configuration

[dispatch]
# Per tool call limit in seconds (unset: no limit)
# timeout_secs = 120

[rules]
# Rules document that lessons and suggestions are written into
path = ".cursorrules"
lessons_heading = "Lessons Learned"
suggestions_heading = "Tool Suggestions"

[analyzer]
min_calls = 5
success_threshold = 0.8
latency_threshold_ms = 2000.0
rare_calls = 3
min_distinct_tools = 5
top_suggestions = 3
# Push suggestions to the rules document periodically (seconds)
# interval_secs = 3600

[shell]
# Expose the run_command tool
enabled = true
"#;

const DATA_DIR_GITIGNORE: &str = r#"# Toolforge - usage statistics (user-local, not shared)
usage.json
usage.json.tmp
"#;

impl Config {
    /// Detect project configuration from current directory
    pub fn detect() -> Result<Self> {
        Self::from_path(&std::env::current_dir()?)
    }

    /// Create configuration from a specific path
    pub fn from_path(start_path: &Path) -> Result<Self> {
        let project_root = Self::find_project_root(start_path)?;
        let data_dir = project_root.join(".toolforge");
        let usage_path = data_dir.join("usage.json");
        let settings = Self::load_config_file(&data_dir);

        Ok(Self {
            project_root,
            data_dir,
            usage_path,
            settings,
        })
    }

    /// Load config.toml from .toolforge/ directory, falling back to defaults
    fn load_config_file(data_dir: &Path) -> ConfigFile {
        let config_path = data_dir.join("config.toml");
        if config_path.is_file() {
            match std::fs::read_to_string(&config_path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => return config,
                    Err(e) => warn!("Failed to parse config.toml: {}", e),
                },
                Err(e) => warn!("Failed to read config.toml: {}", e),
            }
        }
        ConfigFile::default()
    }

    /// Find project root by walking up from start path
    ///
    /// Looks for:
    /// 1. .toolforge directory
    /// 2. .git directory
    /// 3. Falls back to start path if nothing found
    fn find_project_root(start_path: &Path) -> Result<PathBuf> {
        let start = start_path
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", start_path.display()))?;
        let mut current = start.clone();

        loop {
            if current.join(".toolforge").is_dir() || current.join(".git").is_dir() {
                return Ok(current);
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok(start),
            }
        }
    }

    /// Absolute path of the rules document
    pub fn rules_path(&self) -> PathBuf {
        self.resolve(&self.settings.rules.path)
    }

    /// Resolve a user-supplied path against the project root
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    /// Ensure the data directory exists; initialize it on first run
    pub fn ensure_dirs(&self) -> Result<()> {
        let is_first_run = !self.data_dir.exists();

        std::fs::create_dir_all(&self.data_dir)
            .context("Failed to create .toolforge directory")?;

        if is_first_run {
            self.init_data_dir()?;
        }

        Ok(())
    }

    /// Initialize .toolforge/ directory with default files
    fn init_data_dir(&self) -> Result<()> {
        let config_path = self.data_dir.join("config.toml");
        if !config_path.exists() {
            std::fs::write(&config_path, DEFAULT_CONFIG_TOML)
                .context("Failed to write default config.toml")?;
            info!("Created .toolforge/config.toml with defaults");
        }

        let gitignore_path = self.data_dir.join(".gitignore");
        if !gitignore_path.exists() {
            std::fs::write(&gitignore_path, DATA_DIR_GITIGNORE)
                .context("Failed to write .toolforge/.gitignore")?;
            info!("Created .toolforge/.gitignore");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_find_project_root_with_git() {
        let temp_dir = tempfile::tempdir().unwrap();
        let project_root = temp_dir.path();
        let sub_dir = project_root.join("src/deep/nested");

        fs::create_dir_all(&sub_dir).unwrap();
        fs::create_dir_all(project_root.join(".git")).unwrap();

        let found = Config::find_project_root(&sub_dir).unwrap();

        assert_eq!(found, project_root.canonicalize().unwrap());
    }

    #[test]
    fn test_find_project_root_with_data_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let project_root = temp_dir.path();
        let sub_dir = project_root.join("src");

        fs::create_dir_all(&sub_dir).unwrap();
        fs::create_dir_all(project_root.join(".toolforge")).unwrap();

        let found = Config::find_project_root(&sub_dir).unwrap();

        assert_eq!(found, project_root.canonicalize().unwrap());
    }

    #[test]
    fn test_config_file_defaults() {
        let config = ConfigFile::default();
        assert_eq!(config.dispatch.timeout(), None);
        assert_eq!(config.rules.path, PathBuf::from(".cursorrules"));
        assert_eq!(config.analyzer.min_calls, 5);
        assert_eq!(config.analyzer.top_suggestions, 3);
        assert!(config.shell.enabled);
    }

    #[test]
    fn test_config_file_parse() {
        let toml_str = r#"
[dispatch]
timeout_secs = 30

[analyzer]
success_threshold = 0.9
"#;
        let config: ConfigFile = toml::from_str(toml_str).unwrap();
        assert_eq!(config.dispatch.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.analyzer.success_threshold, 0.9);
        // untouched fields keep defaults
        assert_eq!(config.analyzer.latency_threshold_ms, 2000.0);
        assert_eq!(config.rules.lessons_heading, "Lessons Learned");
    }

    #[test]
    fn test_default_toml_matches_defaults() {
        let parsed: ConfigFile = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(parsed.analyzer.min_calls, AnalyzerConfig::default().min_calls);
        assert_eq!(parsed.rules.path, RulesConfig::default().path);
        assert!(parsed.shell.enabled);
    }

    #[test]
    fn test_init_data_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let project_root = temp_dir.path();

        fs::create_dir_all(project_root.join(".git")).unwrap();

        let config = Config::from_path(project_root).unwrap();
        config.ensure_dirs().unwrap();

        assert!(config.data_dir.join("config.toml").exists());
        assert!(config.data_dir.join(".gitignore").exists());

        let gitignore = fs::read_to_string(config.data_dir.join(".gitignore")).unwrap();
        assert!(gitignore.contains("usage.json"));
        assert_eq!(config.rules_path(), config.project_root.join(".cursorrules"));
    }
}
