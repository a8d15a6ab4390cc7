//! Script bundling.
//!
//! The orchestrator talks to a [`ScriptBundler`]. [`EsmBundler`] is the
//! built-in one: it walks the ES-module graph of every entry through static
//! and dynamic relative imports, writes entries to `dest/<name>.js` and every
//! other module to `dest/chunks/<hash>.js`, rewriting import specifiers to
//! match. Bare specifiers are left for the browser (or an import map).

use std::{
    collections::{HashMap, HashSet, VecDeque},
    ops::Range,
    path::{Path, PathBuf},
    sync::LazyLock,
    time::SystemTime,
};

use async_trait::async_trait;
use pagebundle_core::{
    config::normalize_path,
    link::{checksum, relative_link, resolve_output_name, to_slash},
};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"\b(?:import|export)\b[^;"'()]*?\bfrom\s*["']([^"'\n]+)["']"#,
        r#"|\bimport\s*["']([^"'\n]+)["']"#,
        r#"|\bimport\s*\(\s*["']([^"'\n]+)["']\s*\)"#,
    ))
    .expect("valid regex")
});

const RESOLVE_EXTENSIONS: &[&str] = &["js", "mjs", "ts", "tsx", "jsx"];

/// Script bundling errors.
#[derive(Debug, Error)]
pub enum BundleError {
    /// Reading or writing a module failed.
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A relative import does not point to a file.
    #[error("cannot resolve '{specifier}' imported from {importer}")]
    Unresolved { specifier: String, importer: PathBuf },
}

/// Result type for bundle operations.
pub type Result<T> = std::result::Result<T, BundleError>;

/// What to bundle.
#[derive(Debug, Clone, Default)]
pub struct BundleRequest {
    /// Entry modules, project-relative.
    pub inputs: Vec<PathBuf>,
    /// Bare module names expected to stay external.
    pub external: Vec<String>,
    pub minify: bool,
    pub sourcemap: bool,
}

/// Files produced by a bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleOutput {
    /// Entry outputs.
    pub entries: Vec<PathBuf>,
    /// Chunk outputs.
    pub chunks: Vec<PathBuf>,
    /// Every module read while bundling, project-relative. Watching these
    /// is enough to know when the bundle is stale.
    pub watch_files: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
struct ImportSite {
    range: Range<usize>,
    specifier: String,
}

#[derive(Debug, Clone)]
struct ModuleSource {
    stamp: Option<(SystemTime, u64)>,
    code: String,
    imports: Vec<ImportSite>,
}

/// Parsed modules kept between bundles; a module is re-read only when its
/// modification time or size changes.
#[derive(Debug, Default)]
pub struct BundleCache {
    modules: HashMap<PathBuf, ModuleSource>,
}

impl BundleCache {
    /// Number of cached modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// A script bundler.
#[async_trait]
pub trait ScriptBundler: Send + Sync {
    /// Bundle every input, reusing and refreshing `cache`.
    async fn bundle(&self, request: &BundleRequest, cache: &mut BundleCache)
    -> Result<BundleOutput>;
}

/// Built-in ES-module bundler.
///
/// Sources are emitted as written: no transpilation or minification.
#[derive(Debug, Clone)]
pub struct EsmBundler {
    root: PathBuf,
    dest: PathBuf,
}

impl EsmBundler {
    /// Create a bundler reading below `root` and writing below `root/dest`.
    pub fn new(root: impl Into<PathBuf>, dest: impl AsRef<Path>) -> Self {
        let root = root.into();
        let dest = root.join(dest);
        Self { root, dest }
    }

    async fn load(&self, module: &Path, cache: &mut BundleCache) -> Result<ModuleSource> {
        let path = self.root.join(module);
        let stamp = tokio::fs::metadata(&path)
            .await
            .and_then(|m| Ok((m.modified()?, m.len())))
            .ok();

        if let Some(hit) = cache.modules.get(module)
            && stamp.is_some()
            && hit.stamp == stamp
        {
            return Ok(hit.clone());
        }

        let code = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| BundleError::Io {
                path: path.clone(),
                source,
            })?;
        let source = ModuleSource {
            stamp,
            imports: scan_imports(&code),
            code,
        };
        cache.modules.insert(module.to_path_buf(), source.clone());
        Ok(source)
    }

    async fn resolve(&self, importer: &Path, specifier: &str) -> Result<PathBuf> {
        let dir = importer.parent().unwrap_or_else(|| Path::new(""));
        let base = normalize_path(&dir.join(specifier));

        let mut candidates = vec![base.clone()];
        for ext in RESOLVE_EXTENSIONS {
            let mut name = base.clone().into_os_string();
            name.push(format!(".{ext}"));
            candidates.push(PathBuf::from(name));
        }
        for ext in RESOLVE_EXTENSIONS {
            candidates.push(base.join(format!("index.{ext}")));
        }

        for candidate in candidates {
            if tokio::fs::metadata(self.root.join(&candidate))
                .await
                .is_ok_and(|m| m.is_file())
            {
                return Ok(candidate);
            }
        }

        Err(BundleError::Unresolved {
            specifier: specifier.to_string(),
            importer: importer.to_path_buf(),
        })
    }

    /// `dest`-relative output link of a module.
    fn output_link(module: &Path, entries: &HashSet<PathBuf>) -> String {
        if entries.contains(module) {
            resolve_output_name(module)
        } else {
            format!("chunks/{}.js", checksum(&to_slash(module)))
        }
    }
}

#[async_trait]
impl ScriptBundler for EsmBundler {
    async fn bundle(
        &self,
        request: &BundleRequest,
        cache: &mut BundleCache,
    ) -> Result<BundleOutput> {
        if request.minify || request.sourcemap {
            debug!("minify/sourcemap are not applied by the built-in bundler");
        }

        let entries: HashSet<PathBuf> = request.inputs.iter().map(|p| normalize_path(p)).collect();
        let mut queue: VecDeque<PathBuf> = request.inputs.iter().map(|p| normalize_path(p)).collect();
        let mut order = Vec::new();
        let mut graph: HashMap<PathBuf, (ModuleSource, Vec<Option<PathBuf>>)> = HashMap::new();

        while let Some(module) = queue.pop_front() {
            if graph.contains_key(&module) {
                continue;
            }
            let source = self.load(&module, cache).await?;

            let mut targets = Vec::with_capacity(source.imports.len());
            for site in &source.imports {
                if is_relative(&site.specifier) {
                    let target = self.resolve(&module, &site.specifier).await?;
                    queue.push_back(target.clone());
                    targets.push(Some(target));
                } else {
                    if !is_allowed_external(&site.specifier, &request.external) {
                        warn!(
                            module = %module.display(),
                            specifier = %site.specifier,
                            "bare import left external"
                        );
                    }
                    targets.push(None);
                }
            }

            order.push(module.clone());
            graph.insert(module, (source, targets));
        }

        let mut output = BundleOutput::default();
        for module in &order {
            let Some((source, targets)) = graph.get(module) else {
                continue;
            };
            let link = Self::output_link(module, &entries);

            let mut code = source.code.clone();
            for (site, target) in source.imports.iter().zip(targets).rev() {
                let Some(target) = target else {
                    continue;
                };
                let mut specifier = relative_link(&link, &Self::output_link(target, &entries));
                if !specifier.starts_with("../") {
                    specifier.insert_str(0, "./");
                }
                code.replace_range(site.range.clone(), &specifier);
            }

            let path = self.dest.join(&link);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| BundleError::Io {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
            tokio::fs::write(&path, code)
                .await
                .map_err(|source| BundleError::Io {
                    path: path.clone(),
                    source,
                })?;

            if entries.contains(module) {
                output.entries.push(path);
            } else {
                output.chunks.push(path);
            }
            output.watch_files.push(module.clone());
        }

        cache.modules.retain(|path, _| graph.contains_key(path));
        Ok(output)
    }
}

fn scan_imports(code: &str) -> Vec<ImportSite> {
    IMPORT
        .captures_iter(code)
        .filter_map(|caps| {
            let spec = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3))?;
            Some(ImportSite {
                range: spec.range(),
                specifier: spec.as_str().to_string(),
            })
        })
        .collect()
}

fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../")
}

/// `lit/decorators.js` -> `lit`, `@scope/pkg/x` -> `@scope/pkg`.
fn package_name(specifier: &str) -> &str {
    let mut parts = specifier.splitn(3, '/');
    match (parts.next(), parts.next()) {
        (Some(scope), Some(name)) if scope.starts_with('@') => {
            &specifier[..scope.len() + 1 + name.len()]
        }
        (Some(name), _) => name,
        _ => specifier,
    }
}

fn is_allowed_external(specifier: &str, external: &[String]) -> bool {
    let package = package_name(specifier);
    external.iter().any(|e| e == package || e == specifier)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn write(dir: &TempDir, file: &str, contents: &str) {
        let path = dir.path().join(file);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_scan_imports() {
        let code = r#"import a from "./a.js";
import { b,
  c } from './b';
import "./side.js";
export * from "./re.js";
const lazy = () => import("./lazy.js");
import lit from "lit";
"#;
        let specs: Vec<_> = scan_imports(code).into_iter().map(|s| s.specifier).collect();
        assert_eq!(
            specs,
            vec!["./a.js", "./b", "./side.js", "./re.js", "./lazy.js", "lit"]
        );
    }

    #[test]
    fn test_package_name() {
        assert_eq!(package_name("lit"), "lit");
        assert_eq!(package_name("lit/decorators.js"), "lit");
        assert_eq!(package_name("@scope/pkg/x.js"), "@scope/pkg");
        assert!(is_allowed_external("lit/html.js", &["lit".to_string()]));
        assert!(!is_allowed_external("react", &["lit".to_string()]));
    }

    #[tokio::test]
    async fn test_bundle_entries_and_chunks() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/app.js", "import { x } from \"./util\";\nconst l = import('./lazy.js');\nimport lit from \"lit\";\n");
        write(&dir, "src/util.js", "export const x = 1;\n");
        write(&dir, "src/lazy.js", "import { x } from '../src/util.js';\n");

        let bundler = EsmBundler::new(dir.path(), "dist");
        let request = BundleRequest {
            inputs: vec![PathBuf::from("src/app.js")],
            external: vec!["lit".to_string()],
            ..BundleRequest::default()
        };
        let mut cache = BundleCache::default();
        let output = bundler.bundle(&request, &mut cache).await.unwrap();

        let util = format!("chunks/{}.js", checksum("src/util.js"));
        let lazy = format!("chunks/{}.js", checksum("src/lazy.js"));

        assert_eq!(output.entries, vec![dir.path().join("dist/app.js")]);
        assert_eq!(output.chunks.len(), 2);
        assert_eq!(
            output.watch_files,
            vec![
                PathBuf::from("src/app.js"),
                PathBuf::from("src/util.js"),
                PathBuf::from("src/lazy.js")
            ]
        );

        let app = std::fs::read_to_string(dir.path().join("dist/app.js")).unwrap();
        assert!(app.contains(&format!("from \"./{util}\"")));
        assert!(app.contains(&format!("import('./{lazy}')")));
        assert!(app.contains("from \"lit\""));

        let lazy_code = std::fs::read_to_string(dir.path().join("dist").join(&lazy)).unwrap();
        assert!(lazy_code.contains(&format!("from './{}'", util.trim_start_matches("chunks/"))));
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn test_entry_imported_by_chunk() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.js", "import './shared.js';\n");
        write(&dir, "b.js", "export const b = 1;\n");
        write(&dir, "shared.js", "import { b } from './b.js';\n");

        let bundler = EsmBundler::new(dir.path(), "dist");
        let request = BundleRequest {
            inputs: vec![PathBuf::from("a.js"), PathBuf::from("b.js")],
            ..BundleRequest::default()
        };
        bundler.bundle(&request, &mut BundleCache::default()).await.unwrap();

        let shared = format!("chunks/{}.js", checksum("shared.js"));
        let code = std::fs::read_to_string(dir.path().join("dist").join(shared)).unwrap();
        assert!(code.contains("from '../b.js'"));
    }

    #[tokio::test]
    async fn test_unresolved_import() {
        let dir = TempDir::new().unwrap();
        write(&dir, "app.js", "import './missing.js';\n");

        let bundler = EsmBundler::new(dir.path(), "dist");
        let request = BundleRequest {
            inputs: vec![PathBuf::from("app.js")],
            ..BundleRequest::default()
        };
        let err = bundler
            .bundle(&request, &mut BundleCache::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BundleError::Unresolved { .. }));
    }

    #[tokio::test]
    async fn test_cache_reused_and_pruned() {
        let dir = TempDir::new().unwrap();
        write(&dir, "app.js", "import './dep.js';\n");
        write(&dir, "dep.js", "export {};\n");

        let bundler = EsmBundler::new(dir.path(), "dist");
        let request = BundleRequest {
            inputs: vec![PathBuf::from("app.js")],
            ..BundleRequest::default()
        };
        let mut cache = BundleCache::default();
        bundler.bundle(&request, &mut cache).await.unwrap();
        assert_eq!(cache.len(), 2);

        write(&dir, "app.js", "export const only = 1;\n");
        let output = bundler.bundle(&request, &mut cache).await.unwrap();
        assert_eq!(output.watch_files, vec![PathBuf::from("app.js")]);
        assert_eq!(cache.len(), 1);
    }
}
