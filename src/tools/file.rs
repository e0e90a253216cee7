use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use walkdir::{DirEntry, WalkDir};

use super::{bool_arg, str_arg, tool, u64_arg, ToolContext};
use crate::config::Config;
use crate::mcp::protocol::{Tool, ToolResult};
use crate::mcp::registry::{RegistryError, ToolHandler, ToolRegistry};

const DEFAULT_MAX_BYTES: u64 = 100_000;
const DEFAULT_MAX_ENTRIES: u64 = 200;
const DEFAULT_MAX_RESULTS: u64 = 50;

/// Directories never descended into when walking
const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    ".toolforge",
    "__pycache__",
    ".venv",
];

pub fn register(registry: &mut ToolRegistry, ctx: &Arc<ToolContext>) -> Result<(), RegistryError> {
    let config = ctx.config.clone();
    registry.register(Arc::new(ReadFile { config: config.clone() }))?;
    registry.register(Arc::new(WriteFile { config: config.clone() }))?;
    registry.register(Arc::new(ListDirectory { config: config.clone() }))?;
    registry.register(Arc::new(FindFiles { config: config.clone() }))?;
    registry.register(Arc::new(SearchFiles { config }))?;
    Ok(())
}

/// Path relative to the project root when possible, with `/` separators.
fn display_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn is_skipped(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && SKIP_DIRS.iter().any(|d| entry.file_name() == *d)
}

pub struct ReadFile {
    config: Arc<Config>,
}

#[async_trait]
impl ToolHandler for ReadFile {
    fn descriptor(&self) -> Tool {
        tool(
            "read_file",
            "Read a text file. Paths are relative to the project root.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "File path" },
                    "max_bytes": { "type": "integer", "default": DEFAULT_MAX_BYTES }
                },
                "required": ["path"]
            }),
        )
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult> {
        let Some(path) = str_arg(&args, "path") else {
            return Ok(ToolResult::error("Missing required parameter: path"));
        };
        let max_bytes = u64_arg(&args, "max_bytes").unwrap_or(DEFAULT_MAX_BYTES) as usize;

        let full = self.config.resolve(path);
        let bytes = tokio::fs::read(&full)
            .await
            .with_context(|| format!("Failed to read {}", full.display()))?;

        if bytes.len() > max_bytes {
            let text = String::from_utf8_lossy(&bytes[..max_bytes]);
            return Ok(ToolResult::text(format!(
                "{}\n... (truncated, {} of {} bytes shown)",
                text,
                max_bytes,
                bytes.len()
            )));
        }

        Ok(ToolResult::text(String::from_utf8_lossy(&bytes)))
    }
}

pub struct WriteFile {
    config: Arc<Config>,
}

#[async_trait]
impl ToolHandler for WriteFile {
    fn descriptor(&self) -> Tool {
        tool(
            "write_file",
            "Write text to a file, creating parent directories. \
             Set append to add to the end instead of replacing.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "content": { "type": "string" },
                    "append": { "type": "boolean", "default": false }
                },
                "required": ["path", "content"]
            }),
        )
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult> {
        let (Some(path), Some(content)) = (str_arg(&args, "path"), str_arg(&args, "content")) else {
            return Ok(ToolResult::error("Missing required parameters: path, content"));
        };
        let append = bool_arg(&args, "append");

        let full = self.config.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&full)
            .await
            .with_context(|| format!("Failed to open {}", full.display()))?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;

        Ok(ToolResult::text(format!(
            "{} {} bytes to {}",
            if append { "Appended" } else { "Wrote" },
            content.len(),
            path
        )))
    }
}

pub struct ListDirectory {
    config: Arc<Config>,
}

#[async_trait]
impl ToolHandler for ListDirectory {
    fn descriptor(&self) -> Tool {
        tool(
            "list_directory",
            "List entries of a directory (directories end with /). \
             Skips .git, node_modules and build output.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "default": "." },
                    "recursive": { "type": "boolean", "default": false },
                    "max_entries": { "type": "integer", "default": DEFAULT_MAX_ENTRIES }
                }
            }),
        )
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult> {
        let dir = self.config.resolve(str_arg(&args, "path").unwrap_or("."));
        let recursive = bool_arg(&args, "recursive");
        let max_entries = u64_arg(&args, "max_entries").unwrap_or(DEFAULT_MAX_ENTRIES) as usize;

        if !dir.is_dir() {
            return Ok(ToolResult::error(format!("Not a directory: {}", dir.display())));
        }

        let entries = tokio::task::spawn_blocking(move || list_entries(&dir, recursive)).await?;
        let total = entries.len();

        let mut lines: Vec<String> = entries.into_iter().take(max_entries).collect();
        if total > max_entries {
            lines.push(format!("... ({} more entries)", total - max_entries));
        }
        if lines.is_empty() {
            return Ok(ToolResult::text("(empty directory)"));
        }
        Ok(ToolResult::text(lines.join("\n")))
    }
}

fn list_entries(dir: &Path, recursive: bool) -> Vec<String> {
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name();

    walker
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
        .filter_map(|e| e.ok())
        .map(|e| {
            let mut name = display_path(dir, e.path());
            if e.file_type().is_dir() {
                name.push('/');
            }
            name
        })
        .collect()
}

pub struct FindFiles {
    config: Arc<Config>,
}

#[async_trait]
impl ToolHandler for FindFiles {
    fn descriptor(&self) -> Tool {
        tool(
            "find_files",
            "Find files matching a glob pattern relative to the project root (e.g. src/**/*.rs).",
            json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string" },
                    "max_results": { "type": "integer", "default": DEFAULT_MAX_ENTRIES }
                },
                "required": ["pattern"]
            }),
        )
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult> {
        let Some(pattern) = str_arg(&args, "pattern") else {
            return Ok(ToolResult::error("Missing required parameter: pattern"));
        };
        let max_results = u64_arg(&args, "max_results").unwrap_or(DEFAULT_MAX_ENTRIES) as usize;

        let root = self.config.project_root.clone();
        let full_pattern = self.config.resolve(pattern).to_string_lossy().to_string();

        let paths = match glob::glob(&full_pattern) {
            Ok(paths) => paths,
            Err(e) => return Ok(ToolResult::error(format!("Invalid pattern: {}", e))),
        };

        let matches: Vec<String> = paths
            .filter_map(|p| p.ok())
            .filter(|p| p.is_file())
            .map(|p| display_path(&root, &p))
            .collect();

        if matches.is_empty() {
            return Ok(ToolResult::text(format!("No files match {}", pattern)));
        }

        let total = matches.len();
        let mut lines: Vec<String> = matches.into_iter().take(max_results).collect();
        if total > max_results {
            lines.push(format!("... ({} more files)", total - max_results));
        }
        Ok(ToolResult::text(lines.join("\n")))
    }
}

pub struct SearchFiles {
    config: Arc<Config>,
}

#[async_trait]
impl ToolHandler for SearchFiles {
    fn descriptor(&self) -> Tool {
        tool(
            "search_files",
            "Search file contents with a regular expression. Returns path:line: text matches.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string", "description": "Regular expression" },
                    "path": { "type": "string", "default": "." },
                    "max_results": { "type": "integer", "default": DEFAULT_MAX_RESULTS }
                },
                "required": ["pattern"]
            }),
        )
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult> {
        let Some(pattern) = str_arg(&args, "pattern") else {
            return Ok(ToolResult::error("Missing required parameter: pattern"));
        };
        let re = match regex::Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => return Ok(ToolResult::error(format!("Invalid regex: {}", e))),
        };
        let max_results = u64_arg(&args, "max_results").unwrap_or(DEFAULT_MAX_RESULTS) as usize;

        let root = self.config.project_root.clone();
        let dir = self.config.resolve(str_arg(&args, "path").unwrap_or("."));

        let hits =
            tokio::task::spawn_blocking(move || search(&root, &dir, &re, max_results)).await?;

        if hits.is_empty() {
            return Ok(ToolResult::text(format!("No matches for {}", pattern)));
        }
        Ok(ToolResult::text(hits.join("\n")))
    }
}

fn search(root: &Path, dir: &Path, re: &regex::Regex, max_results: usize) -> Vec<String> {
    let mut hits = Vec::new();

    let files = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file());

    for entry in files {
        // Binary and unreadable files are skipped
        let Ok(contents) = std::fs::read_to_string(entry.path()) else {
            continue;
        };

        for (i, line) in contents.lines().enumerate() {
            if !re.is_match(line) {
                continue;
            }
            if hits.len() >= max_results {
                hits.push(format!("... (stopped after {} matches)", max_results));
                return hits;
            }
            hits.push(format!(
                "{}:{}: {}",
                display_path(root, entry.path()),
                i + 1,
                line.trim()
            ));
        }
    }

    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::setup_ctx;

    #[tokio::test]
    async fn test_write_then_read() {
        let (ctx, _temp) = setup_ctx();
        let write = WriteFile { config: ctx.config.clone() };
        let read = ReadFile { config: ctx.config.clone() };

        let result = write
            .invoke(json!({"path": "notes/a.txt", "content": "one\n"}))
            .await
            .unwrap();
        assert!(!result.is_error());

        write
            .invoke(json!({"path": "notes/a.txt", "content": "two\n", "append": true}))
            .await
            .unwrap();

        let result = read.invoke(json!({"path": "notes/a.txt"})).await.unwrap();
        assert_eq!(result.text_content(), "one\ntwo\n");
    }

    #[tokio::test]
    async fn test_read_truncates() {
        let (ctx, temp) = setup_ctx();
        std::fs::write(temp.path().join("big.txt"), "x".repeat(100)).unwrap();

        let read = ReadFile { config: ctx.config.clone() };
        let text = read
            .invoke(json!({"path": "big.txt", "max_bytes": 10}))
            .await
            .unwrap()
            .text_content();
        assert!(text.starts_with("xxxxxxxxxx\n"));
        assert!(text.contains("10 of 100 bytes"));
    }

    #[tokio::test]
    async fn test_read_missing_file_is_error() {
        let (ctx, _temp) = setup_ctx();
        let read = ReadFile { config: ctx.config.clone() };

        assert!(read.invoke(json!({"path": "nope.txt"})).await.is_err());
    }

    #[tokio::test]
    async fn test_list_directory_skips_data_dir() {
        let (ctx, temp) = setup_ctx();
        std::fs::create_dir_all(temp.path().join("src/inner")).unwrap();
        std::fs::write(temp.path().join("src/main.rs"), "fn main() {}").unwrap();
        std::fs::write(temp.path().join("src/inner/lib.rs"), "").unwrap();

        let list = ListDirectory { config: ctx.config.clone() };
        let flat = list.invoke(json!({})).await.unwrap().text_content();
        assert_eq!(flat, "src/");

        let deep = list
            .invoke(json!({"path": "src", "recursive": true}))
            .await
            .unwrap()
            .text_content();
        assert_eq!(deep, "inner/\ninner/lib.rs\nmain.rs");
    }

    #[tokio::test]
    async fn test_find_files_glob() {
        let (ctx, temp) = setup_ctx();
        std::fs::create_dir_all(temp.path().join("src/a")).unwrap();
        std::fs::write(temp.path().join("src/a/x.rs"), "").unwrap();
        std::fs::write(temp.path().join("src/y.txt"), "").unwrap();

        let find = FindFiles { config: ctx.config.clone() };
        let text = find
            .invoke(json!({"pattern": "src/**/*.rs"}))
            .await
            .unwrap()
            .text_content();
        assert_eq!(text, "src/a/x.rs");
    }

    #[tokio::test]
    async fn test_search_files() {
        let (ctx, temp) = setup_ctx();
        std::fs::write(temp.path().join("a.rs"), "fn alpha() {}\nfn beta() {}\n").unwrap();

        let search = SearchFiles { config: ctx.config.clone() };
        let text = search
            .invoke(json!({"pattern": "fn b\\w+"}))
            .await
            .unwrap()
            .text_content();
        assert_eq!(text, "a.rs:2: fn beta() {}");

        let bad = search.invoke(json!({"pattern": "("})).await.unwrap();
        assert!(bad.is_error());
    }

    #[tokio::test]
    async fn test_search_files_limit() {
        let (ctx, temp) = setup_ctx();
        std::fs::write(temp.path().join("a.txt"), "hit 1\nhit 2\n").unwrap();
        let search = SearchFiles { config: ctx.config.clone() };

        let exact = search
            .invoke(json!({"pattern": "hit", "max_results": 2}))
            .await
            .unwrap()
            .text_content();
        assert_eq!(exact, "a.txt:1: hit 1\na.txt:2: hit 2");

        let cut = search
            .invoke(json!({"pattern": "hit", "max_results": 1}))
            .await
            .unwrap()
            .text_content();
        assert_eq!(cut, "a.txt:1: hit 1\n... (stopped after 1 matches)");

        let none = search
            .invoke(json!({"pattern": "hit", "max_results": 0}))
            .await
            .unwrap()
            .text_content();
        assert_eq!(none, "... (stopped after 0 matches)");
    }
}
