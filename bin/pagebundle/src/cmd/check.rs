//! Check command - validate options, front matter and the template

use std::{collections::HashSet, path::Path};

use color_eyre::eyre::{Result, bail};
use pagebundle_core::{
    FileKind, Options, PageMeta, TemplateMeta, frontmatter::parse_front_matter,
};
use pagebundle_generator::SourceSet;

use super::{Target, load_options};

/// Validation result.
#[derive(Debug, Default)]
struct ValidationResult {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidationResult {
    fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Run the check command.
pub fn run(target: &Target, strict: bool) -> Result<()> {
    tracing::info!(manifest = %target.manifest.display(), strict, "checking project");

    let mut result = ValidationResult::default();

    println!("Checking options...");
    let options = match load_options(target, &Default::default()) {
        Ok(options) => {
            println!("  ✓ Options valid");
            Some(options)
        }
        Err(e) => {
            result.add_error(format!("Options error: {e:#}"));
            println!("  ✗ Options invalid: {e:#}");
            None
        }
    };

    if let Some(options) = options {
        let root = target.root()?;
        check_sources(&root, &options, &mut result);
    }

    println!();
    println!("Summary:");
    println!("  Errors:   {}", result.errors.len());
    println!("  Warnings: {}", result.warnings.len());

    if result.has_errors() {
        println!();
        println!("Errors:");
        for err in &result.errors {
            println!("  ✗ {err}");
        }
    }

    if result.has_warnings() {
        println!();
        println!("Warnings:");
        for warn in &result.warnings {
            println!("  ⚠ {warn}");
        }
    }

    if result.has_errors() {
        bail!("Validation failed with {} error(s)", result.errors.len());
    }

    if strict && result.has_warnings() {
        bail!(
            "Validation failed with {} warning(s) (strict mode)",
            result.warnings.len()
        );
    }

    println!();
    println!("✓ All checks passed");

    Ok(())
}

fn check_sources(root: &Path, options: &Options, result: &mut ValidationResult) {
    println!("\nChecking sources...");
    let sources = match SourceSet::new(root, &options.src, &options.dest) {
        Ok(sources) => sources,
        Err(e) => {
            result.add_error(e.to_string());
            return;
        }
    };

    let files = sources.discover();
    if files.is_empty() {
        result.add_warning(format!("No file matches {}", options.src.join(", ")));
    }

    let dest = root.join(&options.dest);
    if dest.exists() && !dest.is_dir() {
        result.add_error(format!(
            "Output path exists but is not a directory: {}",
            options.dest.display()
        ));
    }

    let mut titles = HashSet::new();
    let mut checked = 0;
    let mut failed = 0;
    for file in files.iter().filter(|f| FileKind::of(f).is_page()) {
        if options.is_template(file) {
            continue;
        }
        checked += 1;
        let content = match std::fs::read_to_string(root.join(file)) {
            Ok(content) => content,
            Err(e) => {
                result.add_error(format!("{}: Failed to read file: {e}", file.display()));
                failed += 1;
                continue;
            }
        };
        match parse_front_matter::<PageMeta>(&content, file) {
            Ok((meta, _)) => {
                if let Some(title) = meta.title {
                    titles.insert(title);
                }
            }
            Err(e) => {
                result.add_error(e.to_string());
                failed += 1;
            }
        }
    }

    if failed == 0 {
        println!("  ✓ All {checked} pages valid");
    } else {
        println!("  ✗ {failed}/{checked} pages have errors");
    }

    if let Some(template) = &options.template {
        check_template(&root.join(template), template, &titles, result);
    }
}

/// Parse the template's front matter and report `groupOrder` entries that
/// cannot match anything.
fn check_template(
    path: &Path,
    template: &Path,
    titles: &HashSet<String>,
    result: &mut ValidationResult,
) {
    println!("\nChecking template...");
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            result.add_error(format!("{}: Failed to read template: {e}", template.display()));
            return;
        }
    };
    let meta = match parse_front_matter::<TemplateMeta>(&content, template) {
        Ok((meta, _)) => meta,
        Err(e) => {
            result.add_error(e.to_string());
            return;
        }
    };

    for warning in group_order_warnings(&meta, titles) {
        result.add_warning(warning);
    }
    println!("  ✓ Template checked ({} groups ordered)", meta.group_order.len());
}

fn group_order_warnings(meta: &TemplateMeta, titles: &HashSet<String>) -> Vec<String> {
    let mut warnings = Vec::new();
    let mut seen = HashSet::new();

    for (index, entry) in meta.group_order.iter().enumerate() {
        let Some((group, pages)) = entry.parts() else {
            warnings.push(format!("groupOrder entry {index} names no group"));
            continue;
        };
        if !seen.insert(group) {
            warnings.push(format!("groupOrder declares \"{group}\" more than once"));
        }
        for page in pages {
            if !titles.contains(page) {
                warnings.push(format!("groupOrder \"{group}\" lists unknown page \"{page}\""));
            }
        }
    }
    warnings
}
