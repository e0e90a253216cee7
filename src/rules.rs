//! External rules document (e.g. `.cursorrules`) shared with the IDE.
//!
//! Content we own lives in named sections: a block between
//! `<!-- toolforge:{slug}:start -->` and `<!-- toolforge:{slug}:end -->` whose
//! first line is a `## {heading}`. Everything outside those blocks is left
//! untouched.

use anyhow::{Context, Result};
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::config::RulesConfig;

/// A delimited, replaceable block inside a text document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedSection {
    slug: String,
    heading: String,
}

impl NamedSection {
    pub fn new(slug: impl Into<String>, heading: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            heading: heading.into(),
        }
    }

    fn start_marker(&self) -> String {
        format!("<!-- toolforge:{}:start -->", self.slug)
    }

    fn end_marker(&self) -> String {
        format!("<!-- toolforge:{}:end -->", self.slug)
    }

    /// Byte range of the whole block, markers included.
    pub fn find(&self, text: &str) -> Option<Range<usize>> {
        let start_marker = self.start_marker();
        let end_marker = self.end_marker();

        let start = text.find(&start_marker)?;
        let body_start = start + start_marker.len();
        let end = body_start + text[body_start..].find(&end_marker)? + end_marker.len();
        Some(start..end)
    }

    /// Body lines of the block, without the heading.
    pub fn lines(&self, text: &str) -> Vec<String> {
        let Some(range) = self.find(text) else {
            return Vec::new();
        };

        let inner_start = range.start + self.start_marker().len();
        let inner_end = range.end - self.end_marker().len();

        text[inner_start..inner_end]
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.is_empty() && !l.starts_with("## "))
            .map(String::from)
            .collect()
    }

    /// Replace the block's body with `lines`, creating the block at the end of
    /// the document if it is not there yet.
    pub fn replace(&self, text: &str, lines: &[String]) -> String {
        let block = self.render(lines);

        match self.find(text) {
            Some(range) => format!("{}{}{}", &text[..range.start], block, &text[range.end..]),
            None => {
                let existing = text.trim_end();
                if existing.is_empty() {
                    format!("{}\n", block)
                } else {
                    format!("{}\n\n{}\n", existing, block)
                }
            }
        }
    }

    /// Add one line to the block unless it is already present.
    pub fn append(&self, text: &str, line: &str) -> String {
        let mut lines = self.lines(text);
        if lines.iter().any(|l| l == line) {
            return text.to_string();
        }
        lines.push(line.to_string());
        self.replace(text, &lines)
    }

    fn render(&self, lines: &[String]) -> String {
        let mut block = String::new();
        block.push_str(&self.start_marker());
        block.push('\n');
        block.push_str(&format!("## {}\n", self.heading));
        for line in lines {
            block.push_str(line);
            block.push('\n');
        }
        block.push_str(&self.end_marker());
        block
    }
}

/// The rules file plus the two sections written into it.
#[derive(Debug, Clone)]
pub struct RulesDocument {
    path: PathBuf,
    lessons: NamedSection,
    suggestions: NamedSection,
}

impl RulesDocument {
    pub fn new(path: impl Into<PathBuf>, settings: &RulesConfig) -> Self {
        Self {
            path: path.into(),
            lessons: NamedSection::new("lessons", &settings.lessons_heading),
            suggestions: NamedSection::new("suggestions", &settings.suggestions_heading),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current text; a missing file reads as empty.
    pub fn read(&self) -> Result<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        }
    }

    pub fn write(&self, text: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        std::fs::write(&self.path, text)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    pub fn append_lesson(&self, category: &str, text: &str) -> Result<()> {
        let current = self.read()?;
        let updated = self
            .lessons
            .append(&current, &format!("- [{}] {}", category, text));
        if updated != current {
            self.write(&updated)?;
        }
        Ok(())
    }

    /// Overwrite the suggestion block with `lines`.
    pub fn write_suggestions(&self, lines: &[String]) -> Result<()> {
        let current = self.read()?;
        self.write(&self.suggestions.replace(&current, lines))
    }

    pub fn lesson_lines(&self) -> Result<Vec<String>> {
        Ok(self.lessons.lines(&self.read()?))
    }

    pub fn suggestion_lines(&self) -> Result<Vec<String>> {
        Ok(self.suggestions.lines(&self.read()?))
    }
}
