//! End-to-end tests for the build engine.
//!
//! Each test lays out a small project in a temporary directory and drives the
//! orchestrator the way the CLI does: a full build, then watch events.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use pagebundle_core::Options;
use pagebundle_generator::{
    BundleEvent, BundleOutput, BundleRequest, Orchestrator, ScriptBundler, WatchEvent,
    bundler::{BundleCache, Result as BundleResult},
};
use pagebundle_parser::{StyleOptions, StyleOutput, StyleProcessor, css::Result as StyleResult};
use tempfile::TempDir;

const TEMPLATE: &str = r#"---
title: Docs
groupOrder:
  - Guides
---
<html><body><nav>{% for group in pages %}[{{ group.title }}:{% for p in group.pages %}{{ p.title }}={{ p.link }};{% endfor %}]{% endfor %}</nav><main>{{ page.content }}</main>{% if page.next %}<a rel="next" href="{{ page.next.link }}">{{ page.next.title }}</a>{% endif %}</body></html>
"#;

fn write(dir: &TempDir, file: &str, contents: &str) {
    let path = dir.path().join(file);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn read(dir: &TempDir, file: &str) -> String {
    fs::read_to_string(dir.path().join(file)).unwrap()
}

fn options(src: &[&str], template: Option<&str>) -> Options {
    let mut src: Vec<String> = src.iter().map(|s| s.to_string()).collect();
    if let Some(template) = template {
        src.insert(0, template.to_string());
    }
    Options {
        src,
        template: template.map(PathBuf::from),
        ..Options::default()
    }
}

fn docs_site() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(&dir, "template.html", TEMPLATE);
    write(
        &dir,
        "pages/install.md",
        "---\ntitle: Install\ngroup: Guides\n---\n# Install\n",
    );
    write(&dir, "pages/faq.md", "---\ntitle: FAQ\n---\n# FAQ\n");
    write(
        &dir,
        "pages/usage.md",
        "---\ntitle: Usage\ngroup: Guides\nfolder: guides\n---\n# Usage\n",
    );
    dir
}

#[derive(Default)]
struct CountingBundler {
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl ScriptBundler for CountingBundler {
    async fn bundle(
        &self,
        request: &BundleRequest,
        _cache: &mut BundleCache,
    ) -> BundleResult<BundleOutput> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(BundleOutput {
            watch_files: request.inputs.clone(),
            ..BundleOutput::default()
        })
    }
}

#[derive(Default)]
struct RecordingStyles {
    processed: Arc<Mutex<Vec<PathBuf>>>,
}

#[async_trait]
impl StyleProcessor for RecordingStyles {
    async fn process(&self, path: &Path, _options: &StyleOptions) -> StyleResult<StyleOutput> {
        self.processed.lock().unwrap().push(path.to_path_buf());
        Ok(StyleOutput {
            code: fs::read_to_string(path).unwrap_or_default(),
            dependencies: Vec::new(),
        })
    }
}

#[tokio::test]
async fn test_whole_directory_pattern() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "template.html",
        "---
groupOrder:
  - Guides
  - Others
---
<nav>{% for group in pages %}[{{ group.title }}]{% endfor %}</nav>{{ page.content }}",
    );
    write(&dir, "pages/a.md", "---
title: A
group: Guides
---
# A
");
    write(&dir, "pages/b.md", "---
title: B
---
# B
");
    write(&dir, "pages/c.md", "---
title: C
---
# C
");

    let mut orchestrator =
        Orchestrator::new(dir.path(), options(&["pages/**"], Some("template.html"))).unwrap();
    let report = orchestrator.build_all().await.unwrap();

    assert_eq!(report.pages, 3);
    for page in ["a", "b", "c"] {
        let html = read(&dir, &format!("dist/{page}.html"));
        assert!(html.starts_with("<nav>[Guides][Others]</nav>"), "{page}: {html}");
    }
}

#[tokio::test]
async fn test_shared_stylesheet_processed_once_per_cycle() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a.html", "<link rel=\"stylesheet\" href=\"s.css\">");
    write(&dir, "b.html", "<link rel=\"stylesheet\" href=\"./s.css\">");
    write(&dir, "s.css", "p { color: red; }");

    let styles = RecordingStyles::default();
    let processed = styles.processed.clone();
    let mut orchestrator = Orchestrator::new(dir.path(), options(&["*.html", "s.css"], None))
        .unwrap()
        .with_style_processor(styles);

    let report = orchestrator.build_all().await.unwrap();

    assert_eq!(report.pages, 2);
    assert_eq!(report.styles, 1);
    assert_eq!(*processed.lock().unwrap(), vec![dir.path().join("s.css")]);
    assert_eq!(read(&dir, "dist/s.css"), "p { color: red; }");
}

#[tokio::test]
async fn test_nav_orders_declared_groups_first() {
    let dir = docs_site();
    let mut orchestrator = Orchestrator::new(
        dir.path(),
        options(&["pages/*.md"], Some("template.html")),
    )
    .unwrap();

    let report = orchestrator.build_all().await.unwrap();
    assert_eq!(report.pages, 3);

    let install = read(&dir, "dist/install.html");
    assert!(install.contains(
        "<nav>[Guides:Install=install.html;Usage=guides/usage.html;][Others:FAQ=faq.html;]</nav>"
    ));
    assert!(install.contains("<main><h1>Install</h1></main>"));
    assert!(install.contains("<a rel=\"next\" href=\"guides/usage.html\">Usage</a>"));

    let usage = read(&dir, "dist/guides/usage.html");
    assert!(usage.contains("[Guides:Install=../install.html;Usage=usage.html;]"));
    assert!(!usage.contains("rel=\"next\""));
}

#[tokio::test]
async fn test_template_change_rerenders_every_page() {
    let dir = docs_site();
    let mut orchestrator = Orchestrator::new(
        dir.path(),
        options(&["pages/*.md"], Some("template.html")),
    )
    .unwrap();
    orchestrator.build_all().await.unwrap();
    orchestrator.enable_watch();

    write(&dir, "template.html", "---\ndefaultGroup: Misc\n---\n<div>{{ page.content }}</div>");
    let request = orchestrator
        .translate(&WatchEvent {
            change: vec![PathBuf::from("template.html")],
            ..WatchEvent::default()
        })
        .unwrap();
    let report = orchestrator
        .run_cycle(request.files, request.force_scripts)
        .await
        .unwrap();

    assert_eq!(report.pages, 3);
    assert_eq!(read(&dir, "dist/faq.html"), "<div><h1>FAQ</h1></div>");
}

#[tokio::test]
async fn test_unchanged_files_are_not_rebuilt() {
    let dir = docs_site();
    let mut orchestrator = Orchestrator::new(
        dir.path(),
        options(&["pages/*.md"], Some("template.html")),
    )
    .unwrap();
    orchestrator.build_all().await.unwrap();

    let files = orchestrator.sources().discover();
    let files: Vec<PathBuf> = files
        .into_iter()
        .filter(|f| f != Path::new("template.html"))
        .collect();
    let report = orchestrator.run_cycle(files, false).await.unwrap();

    assert_eq!(report.pages, 0);
    assert_eq!(report.styles, 0);
    assert!(!report.bundled);
}

#[tokio::test]
async fn test_css_only_change_does_not_bundle() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "index.html",
        "<link rel=\"stylesheet\" href=\"site.css\"><script type=\"module\" src=\"app.js\"></script>",
    );
    write(&dir, "site.css", "body { margin: 0; }");
    write(&dir, "app.js", "console.log('hi');");

    let bundler = CountingBundler::default();
    let runs = bundler.runs.clone();
    let mut orchestrator = Orchestrator::new(dir.path(), options(&["*.html"], None))
        .unwrap()
        .with_bundler(bundler);

    let report = orchestrator.build_all().await.unwrap();
    assert!(report.bundled);
    assert_eq!(report.scripts, 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    orchestrator.enable_watch();
    write(&dir, "site.css", "body { margin: 1px; }");
    let request = orchestrator
        .translate(&WatchEvent {
            change: vec![PathBuf::from("site.css")],
            ..WatchEvent::default()
        })
        .unwrap();
    let report = orchestrator
        .run_cycle(request.files, request.force_scripts)
        .await
        .unwrap();

    assert_eq!(report.styles, 1);
    assert!(!report.bundled);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(read(&dir, "dist/site.css"), "body { margin: 1px; }");
}

#[tokio::test]
async fn test_dependency_change_rerenders_page() {
    let dir = TempDir::new().unwrap();
    write(&dir, "index.html", "<a href=\"partial.html\">partial</a>");
    write(&dir, "partial.html", "<p>v1</p>");

    let mut orchestrator = Orchestrator::new(dir.path(), options(&["index.html"], None)).unwrap();
    orchestrator.enable_watch();
    let report = orchestrator.build_all().await.unwrap();
    assert_eq!(report.pages, 2);

    fs::remove_file(dir.path().join("dist/index.html")).unwrap();
    write(&dir, "partial.html", "<p>v2</p>");

    let request = orchestrator
        .translate(&WatchEvent {
            change: vec![PathBuf::from("partial.html")],
            ..WatchEvent::default()
        })
        .unwrap();
    assert!(request.files.contains(&PathBuf::from("index.html")));

    let report = orchestrator
        .run_cycle(request.files, request.force_scripts)
        .await
        .unwrap();
    assert_eq!(report.pages, 2);
    assert!(dir.path().join("dist/index.html").exists());
    assert_eq!(read(&dir, "dist/partial.html"), "<p>v2</p>");
}

#[tokio::test]
async fn test_removed_script_forces_bundle() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a.js", "export const a = 1;");
    write(&dir, "b.js", "export const b = 2;");

    let bundler = CountingBundler::default();
    let runs = bundler.runs.clone();
    let mut orchestrator = Orchestrator::new(dir.path(), options(&["*.js"], None))
        .unwrap()
        .with_bundler(bundler);
    orchestrator.enable_watch();
    orchestrator.build_all().await.unwrap();

    fs::remove_file(dir.path().join("b.js")).unwrap();
    let request = orchestrator
        .translate(&WatchEvent {
            unlink: vec![PathBuf::from("b.js")],
            ..WatchEvent::default()
        })
        .unwrap();
    assert!(request.force_scripts);

    let report = orchestrator
        .run_cycle(request.files, request.force_scripts)
        .await
        .unwrap();
    assert!(report.bundled);
    assert_eq!(report.scripts, 1);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_module_change_rebundles() {
    let dir = TempDir::new().unwrap();
    write(&dir, "src/app.js", "import { x } from './util.js';\nconsole.log(x);\n");
    write(&dir, "src/util.js", "export const x = 1;\n");

    let mut orchestrator = Orchestrator::new(dir.path(), options(&["src/app.js"], None)).unwrap();
    orchestrator.enable_watch();
    orchestrator.build_all().await.unwrap();
    assert!(orchestrator.is_bundle_input(Path::new("src/util.js")));

    let unrelated = orchestrator.rebundle(&[PathBuf::from("README.md")]).await;
    assert!(unrelated.is_empty());

    write(&dir, "src/util.js", "export const x = 22;\n");
    let events = orchestrator.rebundle(&[PathBuf::from("src/util.js")]).await;
    assert_eq!(events.first(), Some(&BundleEvent::Start));
    assert!(matches!(events.last(), Some(BundleEvent::End { .. })));

    write(&dir, "src/app.js", "import './missing.js';\n");
    let events = orchestrator.rebundle(&[PathBuf::from("src/app.js")]).await;
    assert!(matches!(events.last(), Some(BundleEvent::Error(_))));
}
