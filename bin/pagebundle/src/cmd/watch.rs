//! Watch command - incremental rebuilds with live reload

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use color_eyre::eyre::{Result, WrapErr};
use notify::{
    EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::{ModifyKind, RenameMode},
};
use pagebundle_core::{FileKind, Options};
use pagebundle_generator::{BundleEvent, Orchestrator, WatchEvent};
use tokio::sync::mpsc;

use super::{OptionArgs, Target, load_options, print_report};
use crate::server::DevServer;

/// Debounce interval for file changes.
const DEBOUNCE_MS: u64 = 200;

/// Run the watch command.
///
/// `serve` starts the development server unless the manifest already asks
/// for it.
pub async fn run(target: &Target, args: &OptionArgs, serve: bool) -> Result<()> {
    let mut overrides = args.overrides();
    overrides.watch = Some(true);
    if serve {
        overrides.server = Some(true);
    }
    let options = load_options(target, &overrides)?;
    session(target.root()?, options).await
}

/// Build once, then rebuild whatever each batch of file events invalidates
/// until Ctrl+C.
pub async fn session(root: PathBuf, options: Options) -> Result<()> {
    tracing::info!(root = %root.display(), "starting watch mode");

    let mut orchestrator =
        Orchestrator::new(&root, options.clone()).wrap_err("Invalid source patterns")?;

    let server = if options.server {
        let server = DevServer::start(&root.join(&options.dest), true, options.port).await?;
        Some(Arc::new(server))
    } else {
        None
    };
    if let Some(server) = &server {
        orchestrator.set_live_reload(server.clone());
    }
    orchestrator.enable_watch();

    match orchestrator.build_all().await {
        Ok(report) => print_report(&report, &options.dest),
        Err(e) => {
            tracing::error!(error = %e, "initial build failed");
            eprintln!("  ✗ Build failed: {e}");
        }
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<notify::Event>();
    let mut watch = FileWatch::new(&root, tx)?;
    for dir in orchestrator.sources().watch_roots() {
        watch.watch_dir(&dir);
    }
    watch.sync(&mut orchestrator);

    println!("  Watching for changes, press Ctrl+C to stop");
    println!();

    let mut pending = PendingRebuild::default();
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => pending.push(classify(&event, watch.root())),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }

        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(DEBOUNCE_MS), rx.recv()).await
        {
            pending.push(classify(&event, watch.root()));
        }

        // Events arriving while the cycle runs are coalesced into the next one.
        while let Some(batch) = pending.take() {
            {
                let cycle = rebuild(&mut orchestrator, batch);
                tokio::pin!(cycle);
                loop {
                    tokio::select! {
                        () = &mut cycle => break,
                        Some(event) = rx.recv() => pending.push(classify(&event, watch.root())),
                    }
                }
            }
            watch.sync(&mut orchestrator);
        }
    }

    tracing::info!("watch mode stopped");
    Ok(())
}

/// Process one coalesced batch. Errors are reported, never returned.
async fn rebuild(orchestrator: &mut Orchestrator, event: WatchEvent) {
    let event = relevant(orchestrator, event);
    if event.is_empty() {
        return;
    }
    tracing::debug!(?event, "file change");

    let modules: Vec<PathBuf> = event
        .change
        .iter()
        .filter(|f| orchestrator.is_bundle_input(f))
        .cloned()
        .collect();

    let mut bundled = false;
    if let Some(request) = orchestrator.translate(&event) {
        println!("  File change detected, rebuilding...");
        match orchestrator
            .run_cycle(request.files, request.force_scripts)
            .await
        {
            Ok(report) => {
                bundled = report.bundled;
                println!(
                    "  ✓ Rebuilt {} pages, {} styles, {} assets in {}ms",
                    report.pages,
                    report.styles,
                    report.assets,
                    report.elapsed.as_millis()
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "rebuild failed");
                eprintln!("  ✗ Rebuild failed: {e}");
            }
        }
    }

    if bundled || modules.is_empty() {
        return;
    }
    for event in orchestrator.rebundle(&modules).await {
        match event {
            BundleEvent::Start => println!("  Script change detected, bundling..."),
            BundleEvent::End { elapsed } => println!("  ✓ Bundled in {}ms", elapsed.as_millis()),
            BundleEvent::Error(e) => eprintln!("  ✗ Bundle failed: {e}"),
        }
    }
}

/// Drop paths nothing cares about, and treat re-created tracked files as
/// changes: editors often save by replacing the file.
fn relevant(orchestrator: &Orchestrator, event: WatchEvent) -> WatchEvent {
    let known = |file: &Path| {
        orchestrator.sources().matches(file)
            || orchestrator.options().is_template(file)
            || orchestrator.is_bundle_input(file)
            || orchestrator
                .bridge()
                .is_some_and(|b| !b.dependents(file).is_empty())
    };

    let WatchEvent {
        add,
        change,
        unlink,
    } = event;
    let mut relevant = WatchEvent {
        change: change.into_iter().filter(|f| known(f.as_path())).collect(),
        unlink: unlink.into_iter().filter(|f| known(f.as_path())).collect(),
        ..WatchEvent::default()
    };
    for file in add.into_iter().filter(|f| known(f.as_path())) {
        if orchestrator.cache().contains(&file) {
            if !relevant.change.contains(&file) {
                relevant.change.push(file);
            }
        } else {
            relevant.add.push(file);
        }
    }
    relevant
}

/// Map a notify event to project-relative watch paths.
fn classify(event: &notify::Event, root: &Path) -> WatchEvent {
    let mut out = WatchEvent::default();
    let paths = event
        .paths
        .iter()
        .filter_map(|path| path.strip_prefix(root).ok().map(|rel| (path, rel.to_path_buf())));

    for (absolute, relative) in paths {
        let bucket = match event.kind {
            EventKind::Create(_) => &mut out.add,
            EventKind::Remove(_) => &mut out.unlink,
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => &mut out.unlink,
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => &mut out.add,
            EventKind::Modify(ModifyKind::Name(_)) if absolute.exists() => &mut out.add,
            EventKind::Modify(ModifyKind::Name(_)) => &mut out.unlink,
            EventKind::Modify(ModifyKind::Metadata(_)) => continue,
            EventKind::Modify(_) => &mut out.change,
            _ => continue,
        };
        bucket.push(relative);
    }
    out
}

/// Single-slot queue of events waiting for the next cycle.
///
/// Every batch pushed while a cycle runs is merged into the one pending
/// batch, so a burst of changes costs one cycle after the current one.
#[derive(Debug, Default)]
pub struct PendingRebuild {
    slot: Option<WatchEvent>,
}

impl PendingRebuild {
    /// Merge `event` into the pending batch.
    ///
    /// The last thing that happened to a path wins between `add` and
    /// `unlink`.
    pub fn push(&mut self, event: WatchEvent) {
        if event.is_empty() {
            return;
        }
        let pending = self.slot.get_or_insert_with(WatchEvent::default);

        for file in event.unlink {
            pending.add.retain(|f| f != &file);
            pending.change.retain(|f| f != &file);
            push_unique(&mut pending.unlink, file);
        }
        for file in event.add {
            pending.unlink.retain(|f| f != &file);
            push_unique(&mut pending.add, file);
        }
        for file in event.change {
            if !pending.add.contains(&file) {
                push_unique(&mut pending.change, file);
            }
        }
    }

    /// Take the pending batch, leaving the slot empty.
    pub fn take(&mut self) -> Option<WatchEvent> {
        self.slot.take()
    }

    /// Whether no batch is pending.
    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }
}

fn push_unique(list: &mut Vec<PathBuf>, file: PathBuf) {
    if !list.contains(&file) {
        list.push(file);
    }
}

/// The notify watcher plus the paths it already observes.
struct FileWatch {
    watcher: RecommendedWatcher,
    root: PathBuf,
    dirs: Vec<PathBuf>,
    files: HashSet<PathBuf>,
}

impl FileWatch {
    fn new(root: &Path, tx: mpsc::UnboundedSender<notify::Event>) -> Result<Self> {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    // The receiver is gone once the watch loop has stopped.
                    let _ = tx.send(event);
                }
                Err(e) => tracing::warn!(error = %e, "file watch error"),
            },
            notify::Config::default(),
        )
        .wrap_err("Failed to create file watcher")?;

        Ok(Self {
            watcher,
            root,
            dirs: Vec::new(),
            files: HashSet::new(),
        })
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn covered(&self, file: &Path) -> bool {
        self.dirs.iter().any(|dir| file.starts_with(dir))
    }

    /// Watch a project-relative directory recursively.
    fn watch_dir(&mut self, dir: &Path) {
        if self.covered(dir) {
            return;
        }
        let path = self.root.join(dir);
        if !path.is_dir() {
            tracing::warn!(dir = %path.display(), "watch root does not exist");
            return;
        }
        match self.watcher.watch(&path, RecursiveMode::Recursive) {
            Ok(()) => {
                tracing::debug!(dir = %path.display(), "watching directory");
                self.dirs.push(dir.to_path_buf());
            }
            Err(e) => tracing::warn!(dir = %path.display(), error = %e, "cannot watch directory"),
        }
    }

    /// Watch a single project-relative file unless a directory watch already
    /// sees it.
    fn watch_file(&mut self, file: &Path) {
        if self.covered(file) || self.files.contains(file) {
            return;
        }
        let path = self.root.join(file);
        match self.watcher.watch(&path, RecursiveMode::NonRecursive) {
            Ok(()) => {
                tracing::debug!(file = %path.display(), "watching file");
                self.files.insert(file.to_path_buf());
            }
            Err(e) => tracing::debug!(file = %path.display(), error = %e, "cannot watch file"),
        }
    }

    /// Start observing files the last cycle discovered: dependencies from
    /// the bridge and modules of the current bundle.
    fn sync(&mut self, orchestrator: &mut Orchestrator) {
        let mut files: Vec<PathBuf> = orchestrator
            .bridge_mut()
            .map(|bridge| bridge.take_new_watch_files())
            .unwrap_or_default();
        files.extend(orchestrator.bundle_files().map(Path::to_path_buf));

        for file in files {
            if FileKind::of(&file) == FileKind::Script || self.root.join(&file).is_file() {
                self.watch_file(&file);
            }
        }
    }
}
