//! Build orchestration.
//!
//! An [`Orchestrator`] owns every piece of cross-cycle state: the dependency
//! cache, resolved references, the template, the bundle cache and, once
//! [`Orchestrator::enable_watch`] ran, the watch bridge. Each cycle is given
//! the set of files that changed and only regenerates what is not tracked.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use futures_util::future::join_all;
use pagebundle_core::{
    CoreError, FileKind, Options, Page, PageMeta, TemplateMeta,
    config::normalize_path,
    frontmatter::parse_front_matter,
    link::{output_path, relative_depth, resolve_output_name},
};
use pagebundle_parser::{
    CssProcessor, MarkdownError, MarkdownRenderer, RenderedHtml, StyleError, StyleOptions,
    StyleProcessor,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    assets::{AssetError, AssetProcessor},
    bridge::{CycleRequest, WatchBridge, WatchEvent},
    bundler::{BundleCache, BundleError, BundleRequest, EsmBundler, ScriptBundler},
    cache::DependencyCache,
    discover::{DiscoverError, SourceSet},
    nav::{DEFAULT_GROUP, GroupOrder, build_nav, pagination},
    resolve::StatCache,
    template::{Layout, TemplateEngine, TemplateError},
};

/// Build errors.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Options or front matter error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Markdown page error.
    #[error(transparent)]
    Markdown(#[from] MarkdownError),

    /// Stylesheet error.
    #[error("style error: {0}")]
    Style(#[from] StyleError),

    /// Template error.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Bundler error.
    #[error("bundle error: {0}")]
    Bundle(#[from] BundleError),

    /// Asset error.
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// Source discovery error.
    #[error(transparent)]
    Discover(#[from] DiscoverError),
}

/// Result type for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Receiver of "output changed" notifications, usually a dev server.
pub trait LiveReload: Send + Sync {
    /// Tell connected clients to reload.
    fn reload(&self);

    /// Script injected before `</body>` of every written page.
    fn client_script(&self) -> Option<String> {
        None
    }
}

/// Progress of a bundle triggered by the bundle watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleEvent {
    Start,
    End { elapsed: Duration },
    Error(String),
}

/// What one cycle produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Pages rendered and written.
    pub pages: usize,
    /// Stylesheets processed.
    pub styles: usize,
    /// Plain assets copied.
    pub assets: usize,
    /// Script entries in the bundle, when bundling ran.
    pub scripts: usize,
    /// Whether the bundler ran.
    pub bundled: bool,
    /// Wall time of the cycle.
    pub elapsed: Duration,
}

struct LoadedPage {
    file: PathBuf,
    meta: PageMeta,
    markup: String,
}

struct RenderedPage {
    page: Page,
    markup: String,
}

/// Incremental build orchestrator.
pub struct Orchestrator {
    root: PathBuf,
    options: Options,
    sources: SourceSet,
    cache: DependencyCache,
    stats: StatCache,
    bridge: Option<WatchBridge>,
    markdown: MarkdownRenderer,
    templates: TemplateEngine,
    layout: Option<Layout>,
    group_order: GroupOrder,
    default_group: String,
    assets: AssetProcessor,
    styles: Box<dyn StyleProcessor>,
    bundler: Box<dyn ScriptBundler>,
    bundle_cache: BundleCache,
    bundle_watch: HashSet<PathBuf>,
    live_reload: Option<Arc<dyn LiveReload>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("root", &self.root)
            .field("tracked", &self.cache.len())
            .field("watch", &self.bridge.is_some())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator for the project at `root`, with the built-in
    /// stylesheet processor and bundler.
    pub fn new(root: impl Into<PathBuf>, options: Options) -> Result<Self> {
        let root = root.into();
        let sources = SourceSet::new(&root, &options.src, &options.dest)?;
        let group_order = GroupOrder::from_meta(&TemplateMeta::default(), DEFAULT_GROUP);

        Ok(Self {
            assets: AssetProcessor::new(&root, &options.dest),
            bundler: Box::new(EsmBundler::new(&root, &options.dest)),
            stats: StatCache::new(&root),
            styles: Box::new(CssProcessor),
            root,
            options,
            sources,
            cache: DependencyCache::new(),
            bridge: None,
            markdown: MarkdownRenderer::new(),
            templates: TemplateEngine::new(),
            layout: None,
            group_order,
            default_group: DEFAULT_GROUP.to_string(),
            bundle_cache: BundleCache::default(),
            bundle_watch: HashSet::new(),
            live_reload: None,
        })
    }

    /// Replace the stylesheet processor.
    #[must_use]
    pub fn with_style_processor(mut self, styles: impl StyleProcessor + 'static) -> Self {
        self.styles = Box::new(styles);
        self
    }

    /// Replace the script bundler.
    #[must_use]
    pub fn with_bundler(mut self, bundler: impl ScriptBundler + 'static) -> Self {
        self.bundler = Box::new(bundler);
        self
    }

    /// Notify `live_reload` after every cycle and bundle.
    pub fn set_live_reload(&mut self, live_reload: Arc<dyn LiveReload>) {
        self.live_reload = Some(live_reload);
    }

    /// Switch to watch mode: dependency edges are recorded from now on.
    ///
    /// Edges discovered by earlier cycles are replayed into the bridge.
    pub fn enable_watch(&mut self) -> &mut WatchBridge {
        let cache = &self.cache;
        self.bridge.get_or_insert_with(|| {
            let mut bridge = WatchBridge::new();
            for (file, state) in cache.iter() {
                for dependency in &state.imported {
                    bridge.register_dependency(dependency, file);
                }
            }
            bridge
        })
    }

    /// The watch bridge, once watch mode is enabled.
    pub fn bridge(&self) -> Option<&WatchBridge> {
        self.bridge.as_ref()
    }

    /// Mutable access to the watch bridge, once watch mode is enabled.
    pub fn bridge_mut(&mut self) -> Option<&mut WatchBridge> {
        self.bridge.as_mut()
    }

    /// Dependency cache.
    pub fn cache(&self) -> &DependencyCache {
        &self.cache
    }

    /// Compiled `src` patterns.
    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    /// Options the orchestrator was built with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Translate a watch event into a cycle request, invalidating what it
    /// touches. `None` outside watch mode or when nothing is affected.
    pub fn translate(&mut self, event: &WatchEvent) -> Option<CycleRequest> {
        self.bridge.as_ref()?.translate(event, &mut self.cache)
    }

    /// Whether `file` is part of the last bundle.
    pub fn is_bundle_input(&self, file: &Path) -> bool {
        self.bundle_watch.contains(&normalize_path(file))
    }

    /// Module files of the last bundle, project-relative.
    pub fn bundle_files(&self) -> impl Iterator<Item = &Path> {
        self.bundle_watch.iter().map(PathBuf::as_path)
    }

    /// Run a full build over every discovered source.
    pub async fn build_all(&mut self) -> Result<CycleReport> {
        let files = self.sources.discover();
        info!(files = files.len(), "starting build");
        self.run_cycle(files, false).await
    }

    /// Run one cycle over `changed`.
    ///
    /// On failure every file left unready is untracked again so the next
    /// triggering event retries it. Nothing already written is rolled back.
    pub async fn run_cycle(
        &mut self,
        changed: Vec<PathBuf>,
        force_scripts: bool,
    ) -> Result<CycleReport> {
        let started = Instant::now();
        match self.cycle(changed, force_scripts, started).await {
            Ok(report) => Ok(report),
            Err(e) => {
                let discarded = self.cache.discard_unready();
                debug!(count = discarded.len(), "discarded unready files");
                Err(e)
            }
        }
    }

    async fn cycle(
        &mut self,
        changed: Vec<PathBuf>,
        force_scripts: bool,
        started: Instant,
    ) -> Result<CycleReport> {
        let mut files: Vec<PathBuf> = Vec::with_capacity(changed.len());
        for file in changed {
            let file = normalize_path(&file);
            if !files.contains(&file) {
                files.push(file);
            }
        }

        let mut report = CycleReport::default();

        if let Some(template) = self.options.template.clone()
            && let Some(index) = files.iter().position(|f| f == &template)
        {
            files.remove(index);
            self.load_template(&template, &mut files).await?;
        }

        let rendered = self.load_pages(&mut files).await?;
        report.pages = self.write_pages(rendered).await?;

        let (styles, assets) = self.process_styles_and_assets(&files).await?;
        report.styles = styles;
        report.assets = assets;

        let new_scripts: Vec<PathBuf> = files
            .iter()
            .filter(|f| FileKind::of(f) == FileKind::Script && !self.cache.contains(f))
            .cloned()
            .collect();
        for script in &new_scripts {
            self.cache.insert(script);
        }

        if force_scripts || !new_scripts.is_empty() {
            report.scripts = self.bundle().await?;
            report.bundled = true;
        } else {
            info!("bundle: {}ms", started.elapsed().as_millis());
            self.notify_reload();
        }

        report.elapsed = started.elapsed();
        Ok(report)
    }

    async fn load_template(&mut self, template: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
        self.cache.insert(template);
        let content = self.assets.read(template).await?;
        let (meta, source) = parse_front_matter::<TemplateMeta>(&content, template)?;

        self.default_group = meta
            .default_group
            .clone()
            .unwrap_or_else(|| DEFAULT_GROUP.to_string());
        self.group_order = GroupOrder::from_meta(&meta, &self.default_group);
        self.layout = Some(Layout {
            name: template.to_string_lossy().into_owned(),
            meta,
            source,
        });
        self.cache.mark_ready(template);

        let pages: Vec<PathBuf> = self
            .cache
            .iter()
            .map(|(file, _)| file.to_path_buf())
            .filter(|file| FileKind::of(file).is_page() && file != template)
            .collect();
        for page in pages {
            self.cache.remove(&page);
            if !files.contains(&page) {
                files.push(page);
            }
        }

        debug!(
            template = %template.display(),
            groups = self.group_order.len(),
            "loaded template"
        );
        Ok(())
    }

    fn untracked_pages(&self, files: &[PathBuf]) -> Vec<PathBuf> {
        files
            .iter()
            .filter(|f| FileKind::of(f).is_page())
            .filter(|f| !self.options.is_template(f) && !self.cache.contains(f))
            .cloned()
            .collect()
    }

    /// Load, render and resolve every untracked page. Pages found through
    /// references are loaded in a following round.
    async fn load_pages(&mut self, files: &mut Vec<PathBuf>) -> Result<Vec<RenderedPage>> {
        let mut rendered = Vec::new();

        loop {
            let batch = self.untracked_pages(files);
            if batch.is_empty() {
                break;
            }
            for file in &batch {
                self.cache.insert(file);
            }

            let markdown = &self.markdown;
            let assets = &self.assets;
            let loaded = join_all(batch.into_iter().map(|file| async move {
                let content = assets.read(&file).await?;
                let (meta, markup) = if FileKind::of(&file) == FileKind::Markdown {
                    markdown.parse(&content, &file)?
                } else {
                    parse_front_matter::<PageMeta>(&content, &file)?
                };
                Ok::<_, BuildError>(LoadedPage { file, meta, markup })
            }))
            .await;

            for page in loaded {
                rendered.push(self.resolve_page(page?, files).await);
            }
        }

        Ok(rendered)
    }

    async fn resolve_page(&mut self, loaded: LoadedPage, files: &mut Vec<PathBuf>) -> RenderedPage {
        let LoadedPage { file, meta, markup } = loaded;
        let depth = relative_depth(meta.folder.as_deref());
        let link = resolve_output_name(&file);
        let dest = output_path(&self.options.dest, meta.folder.as_deref(), &link);
        let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();

        let RenderedHtml { markup, dependencies } =
            self.stats.render_references(&dir, &depth, &markup).await;
        for local in dependencies {
            self.cache.add_dependency(&file, &local);
            if let Some(bridge) = self.bridge.as_mut() {
                bridge.register_dependency(&local, &file);
            }
            if !files.contains(&local) {
                files.push(local);
            }
        }

        let page = Page::from_meta(meta, &self.default_group, file.clone(), dest, link);
        self.cache.set_page(&file, page.clone());
        RenderedPage { page, markup }
    }

    async fn write_pages(&mut self, rendered: Vec<RenderedPage>) -> Result<usize> {
        let all_pages = self.cache.pages();
        let script = self.live_reload.as_ref().and_then(|l| l.client_script());

        let mut outputs = Vec::with_capacity(rendered.len());
        for RenderedPage { page, markup } in &rendered {
            let html = match &self.layout {
                Some(layout) => {
                    let nav = build_nav(page, &all_pages, &self.group_order);
                    let pager = pagination(page, &nav);
                    self.templates
                        .render_page(layout, page, markup, &nav, &pager)?
                }
                None => markup.clone(),
            };
            let html = match &script {
                Some(script) => inject_script(&html, script),
                None => html,
            };
            outputs.push((self.root.join(&page.dest), html));
        }

        let assets = &self.assets;
        let written = join_all(
            outputs
                .iter()
                .map(|(path, html)| assets.write(path, html.as_bytes())),
        )
        .await;
        for result in written {
            result?;
        }

        for RenderedPage { page, .. } in &rendered {
            self.cache.mark_ready(&page.file);
        }
        if !rendered.is_empty() {
            info!(count = rendered.len(), "wrote pages");
        }
        Ok(rendered.len())
    }

    async fn process_styles_and_assets(&mut self, files: &[PathBuf]) -> Result<(usize, usize)> {
        let styles: Vec<PathBuf> = files
            .iter()
            .filter(|f| FileKind::of(f) == FileKind::Css && !self.cache.contains(f))
            .cloned()
            .collect();
        let copies: Vec<PathBuf> = files
            .iter()
            .filter(|f| !FileKind::of(f).is_fixed_link() && !self.cache.contains(f))
            .cloned()
            .collect();
        for file in styles.iter().chain(&copies) {
            self.cache.insert(file);
        }

        let style_options = StyleOptions {
            minify: self.options.minify,
            browsers: self.options.browsers.clone(),
            sourcemap: self.options.sourcemap,
        };
        let processor = &*self.styles;
        let assets = &self.assets;
        let root = &self.root;

        let style_jobs = join_all(styles.iter().map(|file| {
            let style_options = &style_options;
            async move {
                let output = processor.process(&root.join(file), style_options).await?;
                let dest = output_path(assets.dest(), None, &resolve_output_name(file));
                assets.write(&dest, output.code.as_bytes()).await?;
                Ok::<_, BuildError>((file, output.dependencies))
            }
        }));
        let copy_jobs = join_all(copies.iter().map(|file| async move {
            assets.copy(file).await?;
            Ok::<_, BuildError>(file)
        }));
        let (style_results, copy_results) = futures_util::future::join(style_jobs, copy_jobs).await;

        let mut first_error = None;
        for result in style_results {
            match result {
                Ok((file, dependencies)) => {
                    if let Some(bridge) = self.bridge.as_mut() {
                        for dependency in dependencies {
                            let relative = match dependency.strip_prefix(&self.root) {
                                Ok(relative) => normalize_path(relative),
                                Err(_) => dependency.clone(),
                            };
                            bridge.register_dependency(&relative, file);
                        }
                    }
                    self.cache.mark_ready(file);
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        for result in copy_results {
            match result {
                Ok(file) => self.cache.mark_ready(file),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        Ok((styles.len(), copies.len()))
    }

    async fn bundle(&mut self) -> Result<usize> {
        let started = Instant::now();
        let inputs = self.cache.files_matching(FileKind::Script);

        // The previous bundle watch is replaced as a whole.
        self.bundle_watch.clear();

        if inputs.is_empty() {
            debug!("no scripts to bundle");
            self.notify_reload();
            return Ok(0);
        }

        let request = BundleRequest {
            inputs: inputs.clone(),
            external: self.options.external.clone(),
            minify: self.options.minify,
            sourcemap: self.options.sourcemap,
        };
        let output = self
            .bundler
            .bundle(&request, &mut self.bundle_cache)
            .await?;

        for input in &inputs {
            self.cache.mark_ready(input);
        }
        if self.bridge.is_some() {
            self.bundle_watch = output.watch_files.into_iter().collect();
        }

        info!(
            entries = output.entries.len(),
            chunks = output.chunks.len(),
            "bundle: {}ms",
            started.elapsed().as_millis()
        );
        self.notify_reload();
        Ok(inputs.len())
    }

    /// Re-bundle after a change to one of the bundle's modules.
    ///
    /// Returns the events of the run; errors are logged, never returned, so
    /// watching continues.
    pub async fn rebundle(&mut self, changed: &[PathBuf]) -> Vec<BundleEvent> {
        if !changed.iter().any(|f| self.is_bundle_input(f)) {
            return Vec::new();
        }

        let started = Instant::now();
        let mut events = vec![BundleEvent::Start];
        debug!("bundle started");

        let inputs = self.cache.files_matching(FileKind::Script);
        let request = BundleRequest {
            inputs,
            external: self.options.external.clone(),
            minify: self.options.minify,
            sourcemap: self.options.sourcemap,
        };

        match self.bundler.bundle(&request, &mut self.bundle_cache).await {
            Ok(output) => {
                self.bundle_watch = output.watch_files.into_iter().collect();
                let elapsed = started.elapsed();
                info!("bundle: {}ms", elapsed.as_millis());
                self.notify_reload();
                events.push(BundleEvent::End { elapsed });
            }
            Err(e) => {
                error!(error = %e, "bundle failed");
                events.push(BundleEvent::Error(e.to_string()));
            }
        }
        events
    }

    fn notify_reload(&self) {
        if let Some(live_reload) = &self.live_reload {
            live_reload.reload();
        }
    }
}

/// Insert `script` before the last `</body>`, or append it.
fn inject_script(html: &str, script: &str) -> String {
    match html.rfind("</body>") {
        Some(index) => {
            let mut out = String::with_capacity(html.len() + script.len());
            out.push_str(&html[..index]);
            out.push_str(script);
            out.push_str(&html[index..]);
            out
        }
        None => {
            warn!("page has no </body>, appending live reload script");
            format!("{html}{script}")
        }
    }
}
