//! Bundle options: package manifest section, environment and CLI overrides.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::{CoreError, Result};

/// Manifest section read when none is given on the command line.
pub const DEFAULT_SECTION: &str = "bundle";

/// Environment variable prefix, e.g. `PAGEBUNDLE__DEST=public`.
pub const ENV_PREFIX: &str = "PAGEBUNDLE";

/// Fully resolved options driving a build session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Glob patterns to discover input files. The template, if any, comes first.
    pub src: Vec<String>,

    /// Output root.
    pub dest: PathBuf,

    /// Optional outer template (HTML file with navigation front matter).
    pub template: Option<PathBuf>,

    /// Module specifiers the script bundler must leave external.
    pub external: Vec<String>,

    /// Keep watching the source tree after the first build.
    pub watch: bool,

    /// Serve `dest` over HTTP.
    pub server: bool,

    /// Port for the development server.
    pub port: u16,

    /// Minify CSS output.
    pub minify: bool,

    /// Target browsers passed to the CSS processor.
    pub browsers: Vec<String>,

    /// Ask the bundler for source maps.
    pub sourcemap: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            src: Vec::new(),
            dest: PathBuf::from(default_dest()),
            template: None,
            external: Vec::new(),
            watch: false,
            server: false,
            port: default_port(),
            minify: false,
            browsers: Vec::new(),
            sourcemap: false,
        }
    }
}

/// Values given on the command line. `None` leaves the manifest value alone.
#[derive(Debug, Clone, Default)]
pub struct OptionOverrides {
    pub src: Option<Vec<String>>,
    pub dest: Option<String>,
    pub template: Option<String>,
    pub external: Option<String>,
    pub watch: Option<bool>,
    pub server: Option<bool>,
    pub port: Option<u16>,
    pub minify: Option<bool>,
    pub browsers: Option<Vec<String>>,
    pub sourcemap: Option<bool>,
}

/// The subset of `package.json` the bundler reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub dependencies: BTreeMap<String, serde_json::Value>,

    #[serde(default, rename = "peerDependencies")]
    pub peer_dependencies: BTreeMap<String, serde_json::Value>,

    #[serde(flatten)]
    pub sections: serde_json::Map<String, serde_json::Value>,
}

impl PackageManifest {
    /// Read a manifest from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            CoreError::config_with_source(format!("Failed to parse manifest: {}", path.display()), e)
        })
    }

    /// Get a named options section.
    pub fn section(&self, name: &str) -> Option<&serde_json::Value> {
        self.sections.get(name)
    }
}

/// A string or a list of strings; strings may pack several values.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum StringOrList {
    List(Vec<String>),
    Text(String),
}

impl StringOrList {
    fn split(self, separator: char) -> Vec<String> {
        match self {
            Self::List(items) => items,
            Self::Text(text) => text
                .split(separator)
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// `external` accepts `true` (every direct dependency), a list, or a comma string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ExternalSpec {
    Flag(bool),
    List(Vec<String>),
    Text(String),
}

#[derive(Debug, Clone, Deserialize)]
struct RawOptions {
    #[serde(default)]
    src: Option<StringOrList>,
    #[serde(default = "default_dest")]
    dest: String,
    #[serde(default)]
    template: Option<String>,
    #[serde(default)]
    external: Option<ExternalSpec>,
    #[serde(default)]
    watch: bool,
    #[serde(default)]
    server: bool,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    minify: bool,
    #[serde(default)]
    browsers: Option<StringOrList>,
    #[serde(default)]
    sourcemap: bool,
}

fn default_dest() -> String {
    "dist".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Options {
    /// Load options from a manifest section, the environment and CLI overrides.
    ///
    /// Layering (last wins): manifest section, `PAGEBUNDLE__*` variables, CLI.
    /// A missing manifest is not an error.
    pub fn load(
        manifest_path: Option<&Path>,
        section: &str,
        overrides: &OptionOverrides,
    ) -> Result<Self> {
        let manifest = match manifest_path {
            Some(path) if path.exists() => PackageManifest::load(path)?,
            Some(path) => {
                tracing::debug!(path = %path.display(), "manifest not found, using defaults");
                PackageManifest::default()
            }
            None => PackageManifest::default(),
        };

        let mut builder = config::Config::builder();

        if let Some(values) = manifest.section(section) {
            builder = builder.add_source(config::File::from_str(
                &values.to_string(),
                config::FileFormat::Json,
            ));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        builder = apply_overrides(builder, overrides)?;

        let raw: RawOptions = builder.build()?.try_deserialize()?;
        let options = Self::from_raw(raw, &manifest);
        options.validate()?;
        Ok(options)
    }

    fn from_raw(raw: RawOptions, manifest: &PackageManifest) -> Self {
        let mut src = raw.src.map(|s| s.split(';')).unwrap_or_default();

        let mut external = match raw.external {
            Some(ExternalSpec::Flag(true)) => manifest.dependencies.keys().cloned().collect(),
            Some(ExternalSpec::Text(text)) if text == "true" => {
                manifest.dependencies.keys().cloned().collect()
            }
            Some(ExternalSpec::Text(text)) => StringOrList::Text(text).split(','),
            Some(ExternalSpec::List(items)) => items,
            Some(ExternalSpec::Flag(false)) | None => Vec::new(),
        };
        for peer in manifest.peer_dependencies.keys() {
            if !external.contains(peer) {
                external.push(peer.clone());
            }
        }

        let template = raw.template.map(|t| normalize_path(Path::new(&t)));
        if let Some(ref template) = template {
            src.insert(0, template.to_string_lossy().into_owned());
        }

        let src = src.into_iter().map(|glob| glob.replace('\\', "/")).collect();

        Self {
            src,
            dest: PathBuf::from(raw.dest),
            template,
            external,
            watch: raw.watch,
            server: raw.server,
            port: raw.port,
            minify: raw.minify,
            browsers: raw.browsers.map(|b| b.split(',')).unwrap_or_default(),
            sourcemap: raw.sourcemap,
        }
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        if self.src.is_empty() {
            return Err(CoreError::config("src must name at least one glob pattern"));
        }

        if self.dest.as_os_str().is_empty() {
            return Err(CoreError::config("dest cannot be empty"));
        }

        if let Some(ref template) = self.template
            && !template.exists()
        {
            tracing::warn!(template = %template.display(), "template file does not exist yet");
        }

        Ok(())
    }

    /// Whether `file` is the configured template.
    pub fn is_template(&self, file: &Path) -> bool {
        self.template.as_deref() == Some(file)
    }
}

fn apply_overrides(
    mut builder: config::ConfigBuilder<config::builder::DefaultState>,
    overrides: &OptionOverrides,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
    if let Some(ref src) = overrides.src {
        builder = builder.set_override("src", src.clone())?;
    }
    if let Some(ref dest) = overrides.dest {
        builder = builder.set_override("dest", dest.clone())?;
    }
    if let Some(ref template) = overrides.template {
        builder = builder.set_override("template", template.clone())?;
    }
    if let Some(ref external) = overrides.external {
        builder = builder.set_override("external", external.clone())?;
    }
    if let Some(watch) = overrides.watch {
        builder = builder.set_override("watch", watch)?;
    }
    if let Some(server) = overrides.server {
        builder = builder.set_override("server", server)?;
    }
    if let Some(port) = overrides.port {
        builder = builder.set_override("port", i64::from(port))?;
    }
    if let Some(minify) = overrides.minify {
        builder = builder.set_override("minify", minify)?;
    }
    if let Some(ref browsers) = overrides.browsers {
        builder = builder.set_override("browsers", browsers.clone())?;
    }
    if let Some(sourcemap) = overrides.sourcemap {
        builder = builder.set_override("sourcemap", sourcemap)?;
    }
    Ok(builder)
}

/// Lexically normalize a path: drop `.` segments and fold `..` where possible.
///
/// Never touches the file system, so it works for files that no longer exist.
pub fn normalize_path(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    out.pop();
                } else if !matches!(
                    out.components().next_back(),
                    Some(Component::RootDir | Component::Prefix(_))
                ) {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn write_manifest(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("package.json");
        std::fs::write(&path, content).expect("write manifest");
        path
    }

    #[test]
    fn test_load_from_manifest_section() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let manifest = write_manifest(
            dir.path(),
            r#"{
                "name": "site",
                "dependencies": { "preact": "^10.0.0", "htm": "^3.0.0" },
                "peerDependencies": { "lit": "^3.0.0" },
                "bundle": {
                    "src": "pages/**; assets/**",
                    "dest": "public",
                    "template": "./layout/template.html",
                    "external": true,
                    "minify": true,
                    "browsers": "last 2 versions, not dead"
                }
            }"#,
        );

        let options =
            Options::load(Some(&manifest), DEFAULT_SECTION, &OptionOverrides::default())
                .expect("load options");

        assert_eq!(
            options.src,
            vec!["layout/template.html", "pages/**", "assets/**"]
        );
        assert_eq!(options.dest, PathBuf::from("public"));
        assert_eq!(options.template, Some(PathBuf::from("layout/template.html")));
        assert_eq!(options.external, vec!["htm", "preact", "lit"]);
        assert!(options.minify);
        assert_eq!(options.browsers, vec!["last 2 versions", "not dead"]);
        assert_eq!(options.port, 3000);
    }

    #[test]
    fn test_cli_overrides_win() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let manifest = write_manifest(
            dir.path(),
            r#"{ "bundle": { "src": ["pages/**"], "dest": "public", "external": "a, b" } }"#,
        );

        let overrides = OptionOverrides {
            dest: Some("out".to_string()),
            port: Some(8080),
            watch: Some(true),
            ..Default::default()
        };
        let options = Options::load(Some(&manifest), DEFAULT_SECTION, &overrides)
            .expect("load options");

        assert_eq!(options.dest, PathBuf::from("out"));
        assert_eq!(options.port, 8080);
        assert!(options.watch);
        assert_eq!(options.external, vec!["a", "b"]);
    }

    #[test]
    fn test_missing_manifest_uses_cli() {
        let overrides = OptionOverrides {
            src: Some(vec!["src/**".to_string()]),
            ..Default::default()
        };
        let options = Options::load(
            Some(Path::new("/nonexistent/package.json")),
            DEFAULT_SECTION,
            &overrides,
        )
        .expect("load options");

        assert_eq!(options.src, vec!["src/**"]);
        assert_eq!(options.dest, PathBuf::from("dist"));
        assert!(options.template.is_none());
    }

    #[test]
    fn test_empty_src_rejected() {
        let result = Options::load(None, DEFAULT_SECTION, &OptionOverrides::default());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("src"));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("./a/./b/../c.md")), PathBuf::from("a/c.md"));
        assert_eq!(normalize_path(Path::new("../x/y")), PathBuf::from("../x/y"));
        assert_eq!(normalize_path(Path::new("/root/../etc")), PathBuf::from("/etc"));
    }
}
