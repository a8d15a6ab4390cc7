//! Front matter parsing for pages and the template.
//!
//! A fixed-link input may begin with a YAML block delimited by `---` lines.

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{CoreError, Result};

const DELIMITER: &str = "---";

/// Metadata recognised on pages. Unknown keys are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMeta {
    /// Page title, also used to order pages inside a group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Menu groups the page belongs to.
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub group: Vec<String>,

    /// Output subfolder below `dest`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,

    /// `false` disables wrapping the page in the outer template.
    #[serde(default = "default_true")]
    pub template: bool,

    /// Custom extra fields.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Default for PageMeta {
    fn default() -> Self {
        Self {
            title: None,
            group: Vec::new(),
            folder: None,
            template: true,
            extra: BTreeMap::new(),
        }
    }
}

/// Metadata recognised on the template file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateMeta {
    /// Group assigned to pages that declare none.
    #[serde(default, rename = "defaultGroup", skip_serializing_if = "Option::is_none")]
    pub default_group: Option<String>,

    /// Navigation ordering directive.
    #[serde(default, rename = "groupOrder")]
    pub group_order: Vec<GroupOrderEntry>,

    /// Everything else, exposed to templates as `theme.*`.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// One `groupOrder` item: a bare group title, or `{title: [page titles]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupOrderEntry {
    Title(String),
    Nested(BTreeMap<String, OneOrMany>),
}

impl GroupOrderEntry {
    /// Group title and the ordered page titles declared for it.
    ///
    /// A nested entry is expected to carry a single key; extra keys are ignored.
    pub fn parts(&self) -> Option<(&str, Vec<&str>)> {
        match self {
            Self::Title(title) => Some((title.as_str(), Vec::new())),
            Self::Nested(map) => map
                .iter()
                .next()
                .map(|(title, pages)| (title.as_str(), pages.as_slice())),
        }
    }
}

/// A single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn as_slice(&self) -> Vec<&str> {
        match self {
            Self::One(one) => vec![one.as_str()],
            Self::Many(many) => many.iter().map(String::as_str).collect(),
        }
    }

    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(one) => vec![one],
            Self::Many(many) => many,
        }
    }
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<OneOrMany>::deserialize(deserializer)?;
    Ok(value.map(OneOrMany::into_vec).unwrap_or_default())
}

fn default_true() -> bool {
    true
}

/// Split content into the YAML block and the body.
///
/// The opening delimiter must be the very first line; the block ends at the
/// next line consisting only of `---`.
pub fn split_front_matter(content: &str) -> Option<(&str, &str)> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let after_open = content
        .strip_prefix(DELIMITER)?
        .strip_prefix("\r\n")
        .or_else(|| content.strip_prefix(DELIMITER)?.strip_prefix('\n'))?;

    let mut offset = 0;
    for line in after_open.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            let yaml = &after_open[..offset];
            let body = &after_open[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }

    None
}

/// Parse front matter into `T`, returning the metadata and the remaining body.
///
/// Content without a front matter block yields `T::default()` and the full input.
pub fn parse_front_matter<T>(content: &str, path: &Path) -> Result<(T, String)>
where
    T: DeserializeOwned + Default,
{
    let Some((yaml, body)) = split_front_matter(content) else {
        return Ok((T::default(), content.to_string()));
    };

    if yaml.trim().is_empty() {
        return Ok((T::default(), body.to_string()));
    }

    let meta = serde_yaml::from_str(yaml).map_err(|e| CoreError::front_matter(path, e.to_string()))?;
    Ok((meta, body.to_string()))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_split_front_matter() {
        let content = "---\ntitle: Hello\n---\n\nBody text.";
        let (yaml, body) = split_front_matter(content).expect("split");
        assert_eq!(yaml, "title: Hello\n");
        assert_eq!(body, "\nBody text.");
    }

    #[test]
    fn test_no_front_matter() {
        assert!(split_front_matter("# Just markdown").is_none());
        assert!(split_front_matter("text\n---\nmore").is_none());
    }

    #[test]
    fn test_horizontal_rule_in_body_is_kept() {
        let content = "---\ntitle: A\n---\nintro\n\n---\n\noutro";
        let (meta, body) = parse_front_matter::<PageMeta>(content, Path::new("a.md")).expect("parse");
        assert_eq!(meta.title.as_deref(), Some("A"));
        assert!(body.contains("---"));
        assert!(body.contains("outro"));
    }

    #[test]
    fn test_page_meta_group_forms() {
        let (single, _) =
            parse_front_matter::<PageMeta>("---\ngroup: Guides\n---\n", Path::new("a.md"))
                .expect("parse");
        assert_eq!(single.group, vec!["Guides"]);

        let (many, _) = parse_front_matter::<PageMeta>(
            "---\ngroup: [Guides, API]\nfolder: docs\ntemplate: false\nicon: star\n---\n",
            Path::new("b.md"),
        )
        .expect("parse");
        assert_eq!(many.group, vec!["Guides", "API"]);
        assert_eq!(many.folder.as_deref(), Some("docs"));
        assert!(!many.template);
        assert!(many.extra.contains_key("icon"));
    }

    #[test]
    fn test_page_meta_defaults() {
        let (meta, body) =
            parse_front_matter::<PageMeta>("plain body", Path::new("c.html")).expect("parse");
        assert!(meta.template);
        assert!(meta.group.is_empty());
        assert_eq!(body, "plain body");
    }

    #[test]
    fn test_template_meta_group_order() {
        let content = r#"---
title: Docs
defaultGroup: Misc
groupOrder:
  - Getting started
  - Guides:
      - Install
      - Configure
---
<html>{{ page.content }}</html>"#;

        let (meta, body) =
            parse_front_matter::<TemplateMeta>(content, Path::new("template.html")).expect("parse");

        assert_eq!(meta.default_group.as_deref(), Some("Misc"));
        assert_eq!(meta.group_order.len(), 2);
        assert_eq!(meta.group_order[0].parts(), Some(("Getting started", vec![])));
        assert_eq!(
            meta.group_order[1].parts(),
            Some(("Guides", vec!["Install", "Configure"]))
        );
        assert!(meta.extra.contains_key("title"));
        assert!(body.starts_with("<html>"));
    }

    #[test]
    fn test_invalid_yaml_reports_path() {
        let result = parse_front_matter::<PageMeta>("---\ngroup: [a\n---\n", Path::new("bad.md"));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("bad.md"));
    }
}
