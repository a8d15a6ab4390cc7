//! In-memory registry of tracked files.
//!
//! A file is tracked the moment it enters a cycle and stays tracked until a
//! watch event invalidates it. Tracking is what keeps a file from being
//! processed twice within one cycle.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use pagebundle_core::{FileKind, Page};

/// State kept for one tracked file.
#[derive(Debug, Clone, Default)]
pub struct TrackedFile {
    /// Output has been produced for this file.
    pub ready: bool,
    /// Rendered page record (HTML/Markdown only).
    pub page: Option<Page>,
    /// Files this one depends on, duplicate free, in discovery order.
    pub imported: Vec<PathBuf>,
}

/// Registry of tracked files, in insertion order.
#[derive(Debug, Default)]
pub struct DependencyCache {
    files: HashMap<PathBuf, TrackedFile>,
    order: Vec<PathBuf>,
}

impl DependencyCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `file` is tracked.
    pub fn contains(&self, file: &Path) -> bool {
        self.files.contains_key(file)
    }

    /// Whether `file` is tracked and its output was produced.
    pub fn is_ready(&self, file: &Path) -> bool {
        self.files.get(file).is_some_and(|f| f.ready)
    }

    /// Start tracking `file` with a fresh, unready state.
    ///
    /// Re-inserting a tracked file resets it and moves it to the end.
    pub fn insert(&mut self, file: impl Into<PathBuf>) {
        let file = file.into();
        if self.files.insert(file.clone(), TrackedFile::default()).is_some() {
            self.order.retain(|f| f != &file);
        }
        self.order.push(file);
    }

    /// Stop tracking `file`.
    pub fn remove(&mut self, file: &Path) -> Option<TrackedFile> {
        let removed = self.files.remove(file)?;
        self.order.retain(|f| f != file);
        Some(removed)
    }

    /// Record that `dependent` imports `dependency`. Returns `false` when the
    /// edge was already known or `dependent` is untracked.
    pub fn add_dependency(&mut self, dependent: &Path, dependency: &Path) -> bool {
        let Some(entry) = self.files.get_mut(dependent) else {
            return false;
        };
        if entry.imported.iter().any(|f| f == dependency) {
            return false;
        }
        entry.imported.push(dependency.to_path_buf());
        true
    }

    /// Mark a tracked file as processed.
    pub fn mark_ready(&mut self, file: &Path) {
        if let Some(entry) = self.files.get_mut(file) {
            entry.ready = true;
        }
    }

    /// Attach the page record of a tracked file.
    pub fn set_page(&mut self, file: &Path, page: Page) {
        if let Some(entry) = self.files.get_mut(file) {
            entry.page = Some(page);
        }
    }

    /// Tracked state of `file`.
    pub fn get(&self, file: &Path) -> Option<&TrackedFile> {
        self.files.get(file)
    }

    /// Page records of every tracked page, in registry order.
    pub fn pages(&self) -> Vec<&Page> {
        self.iter().filter_map(|(_, f)| f.page.as_ref()).collect()
    }

    /// Tracked files of the given kind, in registry order.
    pub fn files_matching(&self, kind: FileKind) -> Vec<PathBuf> {
        self.order
            .iter()
            .filter(|f| FileKind::of(f) == kind)
            .cloned()
            .collect()
    }

    /// Drop every tracked file that never became ready, returning them.
    ///
    /// Used after a failed cycle so the next event retries those files.
    pub fn discard_unready(&mut self) -> Vec<PathBuf> {
        let unready: Vec<PathBuf> = self
            .order
            .iter()
            .filter(|f| !self.is_ready(f))
            .cloned()
            .collect();
        for file in &unready {
            self.remove(file);
        }
        unready
    }

    /// Tracked files with their state, in registry order.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &TrackedFile)> {
        self.order
            .iter()
            .filter_map(|f| self.files.get(f).map(|state| (f.as_path(), state)))
    }

    /// Number of tracked files.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use pagebundle_core::PageMeta;
    use pretty_assertions::assert_eq;

    use super::*;

    fn page(file: &str) -> Page {
        Page::from_meta(
            PageMeta::default(),
            "Others",
            PathBuf::from(file),
            PathBuf::from("dist").join(file),
            file.to_string(),
        )
    }

    #[test]
    fn test_insert_and_ready() {
        let mut cache = DependencyCache::new();
        let file = Path::new("pages/a.md");

        assert!(!cache.contains(file));
        cache.insert(file);
        assert!(cache.contains(file));
        assert!(!cache.is_ready(file));

        cache.mark_ready(file);
        assert!(cache.is_ready(file));
    }

    #[test]
    fn test_reinsert_moves_to_end_and_resets() {
        let mut cache = DependencyCache::new();
        cache.insert("a.md");
        cache.insert("b.md");
        cache.add_dependency(Path::new("a.md"), Path::new("x.css"));
        cache.mark_ready(Path::new("a.md"));

        cache.insert("a.md");

        let order: Vec<_> = cache.iter().map(|(p, _)| p.to_path_buf()).collect();
        assert_eq!(order, vec![PathBuf::from("b.md"), PathBuf::from("a.md")]);
        let state = cache.get(Path::new("a.md")).unwrap();
        assert!(!state.ready);
        assert!(state.imported.is_empty());
    }

    #[test]
    fn test_remove_then_insert() {
        let mut cache = DependencyCache::new();
        cache.insert("a.md");
        cache.insert("b.md");
        assert!(cache.remove(Path::new("a.md")).is_some());
        assert!(cache.remove(Path::new("a.md")).is_none());
        cache.insert("a.md");

        assert_eq!(
            cache.files_matching(FileKind::Markdown),
            vec![PathBuf::from("b.md"), PathBuf::from("a.md")]
        );
    }

    #[test]
    fn test_add_dependency_is_idempotent() {
        let mut cache = DependencyCache::new();
        cache.insert("a.html");

        assert!(cache.add_dependency(Path::new("a.html"), Path::new("s.css")));
        assert!(!cache.add_dependency(Path::new("a.html"), Path::new("s.css")));
        assert!(cache.add_dependency(Path::new("a.html"), Path::new("app.js")));
        assert!(!cache.add_dependency(Path::new("missing.html"), Path::new("s.css")));

        assert_eq!(
            cache.get(Path::new("a.html")).unwrap().imported,
            vec![PathBuf::from("s.css"), PathBuf::from("app.js")]
        );
    }

    #[test]
    fn test_pages_in_registry_order() {
        let mut cache = DependencyCache::new();
        for file in ["b.md", "style.css", "a.md"] {
            cache.insert(file);
        }
        cache.set_page(Path::new("a.md"), page("a.md"));
        cache.set_page(Path::new("b.md"), page("b.md"));

        let files: Vec<_> = cache.pages().iter().map(|p| p.file.clone()).collect();
        assert_eq!(files, vec![PathBuf::from("b.md"), PathBuf::from("a.md")]);
    }

    #[test]
    fn test_files_matching() {
        let mut cache = DependencyCache::new();
        for file in ["main.ts", "a.md", "widget.js", "logo.png"] {
            cache.insert(file);
        }

        assert_eq!(
            cache.files_matching(FileKind::Script),
            vec![PathBuf::from("main.ts"), PathBuf::from("widget.js")]
        );
        assert_eq!(cache.files_matching(FileKind::Asset), vec![PathBuf::from("logo.png")]);
    }

    #[test]
    fn test_discard_unready() {
        let mut cache = DependencyCache::new();
        cache.insert("a.md");
        cache.insert("b.md");
        cache.mark_ready(Path::new("a.md"));

        assert_eq!(cache.discard_unready(), vec![PathBuf::from("b.md")]);
        assert_eq!(cache.len(), 1);
        assert!(cache.is_ready(Path::new("a.md")));
    }
}
