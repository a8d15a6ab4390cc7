//! Stylesheet processing.
//!
//! The orchestrator only depends on [`StyleProcessor`]; [`CssProcessor`] is the
//! built-in implementation. It inlines local `@import` rules, reporting every
//! inlined file as a dependency, and minifies when asked.

use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::html::Reference;

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@import\s+(?:url\(\s*)?["']?([^"')\s;]+)["']?\s*\)?\s*([^;]*);"#).expect("valid regex")
});
static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*([{};,])\s*").expect("valid regex"));

/// Stylesheet processing errors.
#[derive(Debug, Error)]
pub enum StyleError {
    /// Reading a stylesheet failed.
    #[error("failed to read stylesheet {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stylesheet imports itself, directly or indirectly.
    #[error("circular @import of {0}")]
    ImportCycle(PathBuf),
}

/// Result type for style operations.
pub type Result<T> = std::result::Result<T, StyleError>;

/// Options forwarded from the bundle configuration.
#[derive(Debug, Clone, Default)]
pub struct StyleOptions {
    /// Strip comments and redundant whitespace.
    pub minify: bool,
    /// Target browser queries.
    pub browsers: Vec<String>,
    /// Emit source maps where supported.
    pub sourcemap: bool,
}

/// Processed stylesheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleOutput {
    /// Final CSS text.
    pub code: String,
    /// On-disk files the output was built from, besides the input itself.
    pub dependencies: Vec<PathBuf>,
}

/// A stylesheet transformer.
#[async_trait]
pub trait StyleProcessor: Send + Sync {
    /// Process the stylesheet at `path`.
    async fn process(&self, path: &Path, options: &StyleOptions) -> Result<StyleOutput>;
}

/// Built-in processor: `@import` inlining and minification.
///
/// `browsers` and `sourcemap` are accepted but not acted upon; vendor
/// prefixing needs an external processor.
#[derive(Debug, Clone, Copy, Default)]
pub struct CssProcessor;

#[async_trait]
impl StyleProcessor for CssProcessor {
    async fn process(&self, path: &Path, options: &StyleOptions) -> Result<StyleOutput> {
        if !options.browsers.is_empty() {
            debug!(path = %path.display(), browsers = ?options.browsers, "browser targets ignored");
        }

        let mut dependencies = Vec::new();
        let mut stack = vec![path.to_path_buf()];
        let code = inline_imports(path, &mut stack, &mut dependencies).await?;

        let code = if options.minify { minify(&code) } else { code };
        Ok(StyleOutput { code, dependencies })
    }
}

fn inline_imports<'a>(
    path: &'a Path,
    stack: &'a mut Vec<PathBuf>,
    dependencies: &'a mut Vec<PathBuf>,
) -> BoxFuture<'a, Result<String>> {
    Box::pin(async move {
        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| StyleError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let dir = path.parent().unwrap_or_else(|| Path::new(""));

        let imports: Vec<(usize, usize, String, String)> = IMPORT
            .captures_iter(&source)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let reference = Reference::parse(caps.get(1)?.as_str())?;
                let media = caps.get(2).map_or("", |m| m.as_str().trim());
                Some((
                    whole.start(),
                    whole.end(),
                    reference.path.to_string(),
                    media.to_string(),
                ))
            })
            .collect();

        let mut out = String::with_capacity(source.len());
        let mut last = 0;
        for (start, end, target, media) in imports {
            let import = dir.join(&target);
            if !tokio::fs::try_exists(&import).await.unwrap_or(false) {
                continue;
            }
            if stack.contains(&import) {
                return Err(StyleError::ImportCycle(import));
            }

            stack.push(import.clone());
            let inlined = inline_imports(&import, stack, dependencies).await?;
            stack.pop();
            if !dependencies.contains(&import) {
                dependencies.push(import);
            }

            out.push_str(&source[last..start]);
            if media.is_empty() {
                out.push_str(&inlined);
            } else {
                out.push_str(&format!("@media {media} {{\n{inlined}\n}}"));
            }
            last = end;
        }
        out.push_str(&source[last..]);

        Ok(out)
    })
}

/// Remove comments and collapse whitespace.
pub fn minify(css: &str) -> String {
    let css = COMMENT.replace_all(css, "");
    let css = WHITESPACE.replace_all(&css, " ");
    let css = PUNCTUATION.replace_all(&css, "$1");
    css.replace(";}", "}").trim().to_string()
}
