use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::UsageState;

/// Where the usage state lives between runs.
pub trait StateBackend: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<UsageState>>;
    fn save(&self, state: &UsageState) -> Result<()>;
}

/// Pretty-printed JSON document on disk.
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<UsageState>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let state = serde_json::from_str(&contents)
            .with_context(|| format!("Malformed usage state in {}", self.path.display()))?;
        Ok(Some(state))
    }

    fn save(&self, state: &UsageState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(state)?;

        // Replace atomically; a crash mid-write leaves the old state intact
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        Ok(())
    }
}

/// Keeps the last saved state in memory. Used for tests and benchmarks.
#[derive(Default)]
pub struct MemoryBackend {
    saved: Mutex<Option<UsageState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateBackend for MemoryBackend {
    fn load(&self) -> Result<Option<UsageState>> {
        let saved = self
            .saved
            .lock()
            .map_err(|_| anyhow::anyhow!("memory backend lock poisoned"))?;
        Ok(saved.clone())
    }

    fn save(&self, state: &UsageState) -> Result<()> {
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| anyhow::anyhow!("memory backend lock poisoned"))?;
        *saved = Some(state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_loads_none() {
        let temp = TempDir::new().unwrap();
        let backend = JsonFileBackend::new(temp.path().join("usage.json"));

        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let backend = JsonFileBackend::new(temp.path().join("nested/usage.json"));

        let mut state = UsageState::default();
        state.memory.insert("k".into(), serde_json::json!("v"));
        backend.save(&state).unwrap();

        let loaded = backend.load().unwrap().unwrap();
        assert_eq!(loaded.memory.get("k"), Some(&serde_json::json!("v")));
        assert!(!temp.path().join("nested/usage.json.tmp").exists());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("usage.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(JsonFileBackend::new(path).load().is_err());
    }
}
