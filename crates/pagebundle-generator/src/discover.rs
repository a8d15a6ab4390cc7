//! Source discovery from `src` glob patterns.
//!
//! Patterns are project-relative. A leading `!` turns a pattern into an
//! exclusion. Files below the output directory are never sources.

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use pagebundle_core::config::normalize_path;
use thiserror::Error;
use tracing::{debug, warn};

/// Discovery errors.
#[derive(Debug, Error)]
pub enum DiscoverError {
    /// A `src` entry is not a valid glob.
    #[error("invalid glob pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

/// Result type for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoverError>;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Compiled `src` patterns.
#[derive(Debug, Clone)]
pub struct SourceSet {
    root: PathBuf,
    dest: PathBuf,
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl SourceSet {
    /// Compile `patterns` rooted at `root`; `dest` is excluded.
    pub fn new(root: impl Into<PathBuf>, patterns: &[String], dest: &Path) -> Result<Self> {
        let mut include = Vec::new();
        let mut exclude = Vec::new();

        for raw in patterns {
            let (negated, pattern) = match raw.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, raw.as_str()),
            };
            let pattern = pattern.trim_start_matches("./");
            let compiled = Pattern::new(pattern).map_err(|source| DiscoverError::Pattern {
                pattern: raw.clone(),
                source,
            })?;
            if negated {
                exclude.push(compiled);
            } else {
                include.push(compiled);
            }
        }

        Ok(Self {
            root: root.into(),
            dest: normalize_path(dest),
            include,
            exclude,
        })
    }

    /// Whether the project-relative `file` is a source.
    pub fn matches(&self, file: &Path) -> bool {
        let file = normalize_path(file);
        if file.starts_with(&self.dest) || file.starts_with("node_modules") {
            return false;
        }
        let text = file.to_string_lossy().replace('\\', "/");
        self.include.iter().any(|p| p.matches_with(&text, MATCH_OPTIONS))
            && !self.exclude.iter().any(|p| p.matches_with(&text, MATCH_OPTIONS))
    }

    /// Directories that must be watched to see every matching file: the
    /// literal prefix of each include pattern.
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = Vec::new();
        for pattern in &self.include {
            let prefix: PathBuf = Path::new(pattern.as_str())
                .components()
                .take_while(|c| !c.as_os_str().to_string_lossy().contains(['*', '?', '[']))
                .collect();
            let dir = if self.root.join(&prefix).is_file() {
                prefix.parent().map(Path::to_path_buf).unwrap_or_default()
            } else {
                prefix
            };
            if !roots.iter().any(|r| dir.starts_with(r)) {
                roots.retain(|r| !r.starts_with(&dir));
                roots.push(dir);
            }
        }
        roots
    }

    /// Every matching file, project-relative, in pattern order then path
    /// order, without duplicates.
    pub fn discover(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for pattern in &self.include {
            let full = self.root.join(walk_pattern(pattern.as_str()));
            let Ok(entries) = glob::glob_with(&full.to_string_lossy(), MATCH_OPTIONS) else {
                continue;
            };
            let mut matched: Vec<PathBuf> = entries
                .filter_map(|entry| match entry {
                    Ok(path) => Some(path),
                    Err(e) => {
                        warn!(error = %e, "skipping unreadable path");
                        None
                    }
                })
                .filter(|path| path.is_file())
                .filter_map(|path| path.strip_prefix(&self.root).ok().map(normalize_path))
                .filter(|relative| self.matches(relative))
                .collect();
            matched.sort();

            for relative in matched {
                if !files.contains(&relative) {
                    files.push(relative);
                }
            }
        }
        debug!(count = files.len(), "discovered sources");
        files
    }
}

/// Pattern handed to the directory walk. A trailing `**` only yields
/// directories there, so it is widened to every file below them.
fn walk_pattern(pattern: &str) -> String {
    if pattern == "**" || pattern.ends_with("/**") {
        format!("{pattern}/*")
    } else {
        pattern.to_string()
    }
}
