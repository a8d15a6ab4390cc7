//! Command implementations.

pub mod build;
pub mod check;
pub mod watch;

use std::path::{Path, PathBuf};

use color_eyre::eyre::{Result, WrapErr};
use pagebundle_core::{OptionOverrides, Options};
use pagebundle_generator::CycleReport;

/// Where options are read from.
#[derive(Debug, Clone)]
pub struct Target {
    /// Package manifest, usually `package.json`.
    pub manifest: PathBuf,
    /// Manifest section holding the options.
    pub section: String,
}

impl Target {
    pub fn new(manifest: impl Into<PathBuf>, section: impl Into<String>) -> Self {
        Self {
            manifest: manifest.into(),
            section: section.into(),
        }
    }

    /// Project root: the directory holding the manifest.
    pub fn root(&self) -> Result<PathBuf> {
        let root = match self.manifest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::env::current_dir().wrap_err("Failed to read current directory")?,
        };
        Ok(root.canonicalize().unwrap_or(root))
    }
}

/// Option overrides shared by `build` and `watch`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct OptionArgs {
    /// Source glob patterns (repeatable)
    #[arg(short, long = "src", num_args = 1..)]
    pub src: Vec<String>,

    /// Output directory
    #[arg(short, long)]
    pub dest: Option<String>,

    /// Outer page template
    #[arg(short, long)]
    pub template: Option<String>,

    /// Modules left external by the bundler (comma separated, or "true")
    #[arg(long)]
    pub external: Option<String>,

    /// Minify stylesheets
    #[arg(long)]
    pub minify: bool,

    /// Target browsers for the stylesheet processor
    #[arg(long, value_delimiter = ',')]
    pub browsers: Vec<String>,

    /// Emit source maps
    #[arg(long)]
    pub sourcemap: bool,

    /// Serve the output directory
    #[arg(long)]
    pub server: bool,

    /// Port for the development server
    #[arg(short, long)]
    pub port: Option<u16>,
}

impl OptionArgs {
    /// Overrides for [`Options::load`]. Flags that are not set leave the
    /// manifest value alone.
    pub fn overrides(&self) -> OptionOverrides {
        OptionOverrides {
            src: (!self.src.is_empty()).then(|| self.src.clone()),
            dest: self.dest.clone(),
            template: self.template.clone(),
            external: self.external.clone(),
            watch: None,
            server: self.server.then_some(true),
            port: self.port,
            minify: self.minify.then_some(true),
            browsers: (!self.browsers.is_empty()).then(|| self.browsers.clone()),
            sourcemap: self.sourcemap.then_some(true),
        }
    }
}

/// Load options for `target` with `overrides` applied on top.
pub fn load_options(target: &Target, overrides: &OptionOverrides) -> Result<Options> {
    let options = Options::load(Some(&target.manifest), &target.section, overrides)
        .wrap_err_with(|| {
            format!(
                "Failed to load options from {} (section \"{}\")",
                target.manifest.display(),
                target.section
            )
        })?;
    tracing::debug!(?options, "loaded options");
    Ok(options)
}

/// Print what a cycle produced.
pub(crate) fn print_report(report: &CycleReport, dest: &Path) {
    println!();
    println!("  Pages:      {:>6}", report.pages);
    println!("  Styles:     {:>6}", report.styles);
    println!("  Assets:     {:>6}", report.assets);
    if report.bundled {
        println!("  Scripts:    {:>6}", report.scripts);
    }
    println!("  Duration:   {:>6}ms", report.elapsed.as_millis());
    println!("  Output:     {}", dest.display());
    println!();
}
