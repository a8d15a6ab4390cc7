//! Translation of file-system events into build cycles.
//!
//! Pages discover their dependencies while rendering. The bridge remembers
//! those edges so that a change to a dependency re-triggers every file that
//! depends on it, and tells the watcher which new files it must observe.

use std::{
    collections::HashMap,
    mem,
    path::{Path, PathBuf},
};

use pagebundle_core::{FileKind, config::normalize_path};
use tracing::debug;

use crate::cache::DependencyCache;

/// A batch of file-system changes, project-relative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchEvent {
    pub add: Vec<PathBuf>,
    pub change: Vec<PathBuf>,
    pub unlink: Vec<PathBuf>,
}

impl WatchEvent {
    /// Whether the batch carries no paths.
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.change.is_empty() && self.unlink.is_empty()
    }

    /// Every path in the batch.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.add
            .iter()
            .chain(&self.change)
            .chain(&self.unlink)
            .map(PathBuf::as_path)
    }
}

/// Input of one orchestrator cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleRequest {
    /// Files to (re)process.
    pub files: Vec<PathBuf>,
    /// Bundle scripts even if no new script entered the set.
    pub force_scripts: bool,
}

impl CycleRequest {
    /// Fold `other` into `self`, keeping file order and dropping duplicates.
    pub fn merge(&mut self, other: CycleRequest) {
        for file in other.files {
            if !self.files.contains(&file) {
                self.files.push(file);
            }
        }
        self.force_scripts |= other.force_scripts;
    }

    /// Whether running this request would do anything.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && !self.force_scripts
    }
}

/// Dependency edges observed in watch mode.
#[derive(Debug, Default)]
pub struct WatchBridge {
    dependents: HashMap<PathBuf, Vec<PathBuf>>,
    new_files: Vec<PathBuf>,
}

impl WatchBridge {
    /// Create an empty bridge.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that rendering `parent` depended on `file`.
    pub fn register_dependency(&mut self, file: &Path, parent: &Path) {
        let parents = self.dependents.entry(file.to_path_buf()).or_insert_with(|| {
            self.new_files.push(file.to_path_buf());
            Vec::new()
        });
        if !parents.iter().any(|p| p == parent) {
            debug!(file = %file.display(), parent = %parent.display(), "registered dependency");
            parents.push(parent.to_path_buf());
        }
    }

    /// `true` when no file is known to depend on `file`.
    pub fn is_root_watch(&self, file: &Path) -> bool {
        self.dependents.get(file).is_none_or(Vec::is_empty)
    }

    /// Files known to depend on `file`.
    pub fn dependents(&self, file: &Path) -> &[PathBuf] {
        self.dependents.get(file).map_or(&[], Vec::as_slice)
    }

    /// Files registered since the last call; the watcher must start
    /// observing them.
    pub fn take_new_watch_files(&mut self) -> Vec<PathBuf> {
        mem::take(&mut self.new_files)
    }

    /// Apply the watch rules to an event batch, invalidating cache entries
    /// that must be rebuilt. Returns `None` when nothing needs to run.
    pub fn translate(
        &self,
        event: &WatchEvent,
        cache: &mut DependencyCache,
    ) -> Option<CycleRequest> {
        let mut request = CycleRequest::default();

        for file in event.add.iter().map(|f| normalize_path(f)) {
            if self.is_root_watch(&file)
                && FileKind::of(&file).is_fixed_link()
                && !cache.contains(&file)
            {
                request.files.push(file);
            }
        }

        let mut changed: Vec<PathBuf> = Vec::new();
        for file in event.change.iter().map(|f| normalize_path(f)) {
            for candidate in std::iter::once(file.clone()).chain(self.dependents(&file).iter().cloned()) {
                if !changed.contains(&candidate) {
                    changed.push(candidate);
                }
            }
        }
        for file in changed {
            let keep = (self.is_root_watch(&file) || cache.contains(&file))
                && FileKind::of(&file) != FileKind::Script;
            if keep {
                cache.remove(&file);
                if !request.files.contains(&file) {
                    request.files.push(file);
                }
            }
        }

        for file in event.unlink.iter().map(|f| normalize_path(f)) {
            if FileKind::of(&file) == FileKind::Script && cache.remove(&file).is_some() {
                request.force_scripts = true;
            }
        }

        (!request.is_empty()).then_some(request)
    }
}
