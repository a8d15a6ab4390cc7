//! Reference scanning and rewriting for HTML markup.
//!
//! Pages refer to stylesheets, scripts, images and other pages through `src`
//! and `href` attributes. Only relative references are of interest; absolute
//! URLs, fragments and template expressions are left alone.

use std::{collections::HashMap, path::PathBuf, sync::LazyLock};

use regex::{Captures, Regex};

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(src|href)(\s*=\s*)(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
});

static SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*:").expect("valid regex"));

/// Markup produced by rendering a page, with the local files it refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedHtml {
    /// Rewritten markup.
    pub markup: String,
    /// Local files referenced by the markup, in first-seen order.
    pub dependencies: Vec<PathBuf>,
}

/// A relative reference split into the path and its query/fragment suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference<'a> {
    /// Path part, e.g. `../styles/site.css`.
    pub path: &'a str,
    /// `?query` / `#fragment` suffix, kept verbatim on rewrite.
    pub suffix: &'a str,
}

impl<'a> Reference<'a> {
    /// Parse an attribute value. Returns `None` for anything that is not a
    /// relative file reference.
    pub fn parse(value: &'a str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty()
            || value.starts_with(['#', '/', '?'])
            || value.contains("{{")
            || value.contains("{%")
            || SCHEME.is_match(value)
        {
            return None;
        }

        let split = value.find(['?', '#']).unwrap_or(value.len());
        let (path, suffix) = value.split_at(split);
        if path.is_empty() {
            return None;
        }
        Some(Self { path, suffix })
    }
}

/// Distinct relative reference paths in `markup`, in document order.
pub fn collect_references(markup: &str) -> Vec<&str> {
    let mut seen = Vec::new();
    for caps in ATTRIBUTE.captures_iter(markup) {
        let Some(reference) = attribute_value(&caps).and_then(Reference::parse) else {
            continue;
        };
        if !seen.contains(&reference.path) {
            seen.push(reference.path);
        }
    }
    seen
}

/// Replace reference paths found in `replacements`; everything else is kept
/// byte for byte.
pub fn rewrite_references(markup: &str, replacements: &HashMap<String, String>) -> String {
    if replacements.is_empty() {
        return markup.to_string();
    }

    ATTRIBUTE
        .replace_all(markup, |caps: &Captures<'_>| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            let Some(reference) = attribute_value(caps).and_then(Reference::parse) else {
                return whole.to_string();
            };
            let Some(target) = replacements.get(reference.path) else {
                return whole.to_string();
            };
            let quote = if caps.get(3).is_some() { '"' } else { '\'' };
            format!(
                "{}{}{quote}{target}{}{quote}",
                &caps[1], &caps[2], reference.suffix
            )
        })
        .into_owned()
}

fn attribute_value<'h>(caps: &Captures<'h>) -> Option<&'h str> {
    caps.get(3).or_else(|| caps.get(4)).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_reference_parse() {
        assert_eq!(
            Reference::parse("img/logo.png?v=2"),
            Some(Reference { path: "img/logo.png", suffix: "?v=2" })
        );
        assert_eq!(
            Reference::parse("guide.md#setup"),
            Some(Reference { path: "guide.md", suffix: "#setup" })
        );
        assert_eq!(Reference::parse("https://cdn.example.com/x.js"), None);
        assert_eq!(Reference::parse("//cdn.example.com/x.js"), None);
        assert_eq!(Reference::parse("/abs/path.css"), None);
        assert_eq!(Reference::parse("#top"), None);
        assert_eq!(Reference::parse("mailto:me@example.com"), None);
        assert_eq!(Reference::parse("data:image/png;base64,AAAA"), None);
        assert_eq!(Reference::parse("{{ page.prev.link }}"), None);
        assert_eq!(Reference::parse(""), None);
    }

    #[test]
    fn test_collect_references() {
        let markup = r#"<link rel="stylesheet" href="styles/site.css">
<script src='app.ts'></script>
<img SRC="img/logo.png"><a href="https://example.com">x</a>
<a href="styles/site.css#x">again</a>"#;

        assert_eq!(
            collect_references(markup),
            vec!["styles/site.css", "app.ts", "img/logo.png"]
        );
    }

    #[test]
    fn test_rewrite_references() {
        let markup = r#"<img src="img/logo.png?v=1"><script src='app.ts'></script><a href="http://x.io">x</a>"#;
        let replacements = HashMap::from([
            ("img/logo.png".to_string(), "../file-0011aabb.png".to_string()),
            ("app.ts".to_string(), "../app.js".to_string()),
        ]);

        assert_eq!(
            rewrite_references(markup, &replacements),
            r#"<img src="../file-0011aabb.png?v=1"><script src='../app.js'></script><a href="http://x.io">x</a>"#
        );
    }

    #[test]
    fn test_rewrite_keeps_unknown() {
        let markup = r#"<script src="lodash/lodash.js"></script>"#;
        let replacements = HashMap::from([("other.js".to_string(), "x.js".to_string())]);
        assert_eq!(rewrite_references(markup, &replacements), markup);
    }
}
