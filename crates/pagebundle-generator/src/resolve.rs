//! Classification of page references.
//!
//! A reference found in page markup is resolved against the page's directory.
//! It is `Local` when that file exists, `External` when it names something
//! installed under `node_modules`, and `Global` otherwise. Results are cached
//! per joined path for the lifetime of the process.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use pagebundle_core::{config::normalize_path, link::resolve_output_name};
use pagebundle_parser::{RenderedHtml, collect_references, rewrite_references};
use tracing::trace;

/// Where a reference points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Project file, project-relative.
    Local(PathBuf),
    /// Installed module, absolute.
    External(PathBuf),
    /// Anything else (CDN URL, runtime path, missing file).
    Global,
}

/// Memoized reference resolution.
#[derive(Debug)]
pub struct StatCache {
    root: PathBuf,
    entries: HashMap<PathBuf, Resolution>,
}

impl StatCache {
    /// Create a cache resolving files below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: HashMap::new(),
        }
    }

    /// Resolve `reference` as written in a file located in `dir`
    /// (project-relative).
    pub async fn resolve(&mut self, dir: &Path, reference: &str) -> Resolution {
        let joined = normalize_path(&dir.join(reference));
        if let Some(hit) = self.entries.get(&joined) {
            return hit.clone();
        }

        let resolution = if is_file(&self.root.join(&joined)).await {
            Resolution::Local(joined.clone())
        } else if let Some(module) = self.find_module(reference).await {
            Resolution::External(module)
        } else {
            Resolution::Global
        };

        trace!(reference, resolved = ?resolution, "resolved reference");
        self.entries.insert(joined, resolution.clone());
        resolution
    }

    /// Rewrite the local references of `markup`, written in a file located in
    /// `dir`, to output links prefixed with `depth`. The local files are
    /// returned as the page's dependencies; other references are kept.
    pub async fn render_references(
        &mut self,
        dir: &Path,
        depth: &str,
        markup: &str,
    ) -> RenderedHtml {
        let mut replacements = HashMap::new();
        let mut dependencies: Vec<PathBuf> = Vec::new();

        for reference in collect_references(markup) {
            let Resolution::Local(local) = self.resolve(dir, reference).await else {
                continue;
            };
            replacements.insert(
                reference.to_string(),
                format!("{depth}{}", resolve_output_name(&local)),
            );
            if !dependencies.contains(&local) {
                dependencies.push(local);
            }
        }

        RenderedHtml {
            markup: rewrite_references(markup, &replacements),
            dependencies,
        }
    }

    /// Number of distinct joined paths resolved so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was resolved yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    async fn find_module(&self, reference: &str) -> Option<PathBuf> {
        let relative = reference.trim_start_matches("./");
        if relative.starts_with("..") {
            return None;
        }

        for base in self.root.ancestors() {
            let candidate = base.join("node_modules").join(relative);
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Some(candidate);
            }
        }
        None
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
