//! File kinds and page records.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::frontmatter::PageMeta;

/// Kind of an input file, decided by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// `.html` / `.htm` pages.
    Html,
    /// `.md` / `.markdown` pages.
    Markdown,
    /// Stylesheets.
    Css,
    /// Script entry points and modules.
    Script,
    /// Anything else, copied verbatim.
    Asset,
}

impl FileKind {
    /// Determine the kind from a file extension (without the dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "html" | "htm" => Self::Html,
            "md" | "markdown" => Self::Markdown,
            "css" => Self::Css,
            "js" | "mjs" | "jsx" | "ts" | "tsx" => Self::Script,
            _ => Self::Asset,
        }
    }

    /// Determine the kind of a path.
    pub fn of(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map_or(Self::Asset, Self::from_extension)
    }

    /// Fixed-link kinds keep a human readable output name.
    pub fn is_fixed_link(self) -> bool {
        !matches!(self, Self::Asset)
    }

    /// HTML and Markdown inputs become pages.
    pub fn is_page(self) -> bool {
        matches!(self, Self::Html | Self::Markdown)
    }
}

/// A rendered page's record, shared with templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Page title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Output subfolder below `dest`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,

    /// Menu groups (never empty once built).
    pub group: Vec<String>,

    /// Source path.
    pub file: PathBuf,

    /// Output path.
    pub dest: PathBuf,

    /// Output-relative URL (file name, or a relative link inside a nav tree).
    pub link: String,

    /// Whether the outer template wraps this page.
    pub template: bool,

    /// Extra front matter fields.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Page {
    /// Build a page from its front matter and computed location.
    pub fn from_meta(
        meta: PageMeta,
        default_group: &str,
        file: PathBuf,
        dest: PathBuf,
        link: String,
    ) -> Self {
        let group = if meta.group.is_empty() {
            vec![default_group.to_string()]
        } else {
            meta.group
        };

        Self {
            title: meta.title,
            folder: meta.folder,
            group,
            file,
            dest,
            link,
            template: meta.template,
            extra: meta.extra,
        }
    }

    /// Output link including the folder, e.g. `guides/intro.html`.
    pub fn site_link(&self) -> String {
        match self.folder.as_deref().map(|f| f.trim_matches('/')) {
            Some(folder) if !folder.is_empty() => format!("{folder}/{}", self.link),
            _ => self.link.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(FileKind::from_extension("md"), FileKind::Markdown);
        assert_eq!(FileKind::from_extension("HTML"), FileKind::Html);
        assert_eq!(FileKind::from_extension("tsx"), FileKind::Script);
        assert_eq!(FileKind::from_extension("css"), FileKind::Css);
        assert_eq!(FileKind::from_extension("png"), FileKind::Asset);
        assert_eq!(FileKind::of(Path::new("LICENSE")), FileKind::Asset);
    }

    #[test]
    fn test_fixed_link() {
        assert!(FileKind::Markdown.is_fixed_link());
        assert!(FileKind::Script.is_fixed_link());
        assert!(!FileKind::Asset.is_fixed_link());
        assert!(FileKind::Html.is_page());
        assert!(!FileKind::Css.is_page());
    }

    #[test]
    fn test_page_default_group() {
        let page = Page::from_meta(
            PageMeta::default(),
            "Others",
            PathBuf::from("pages/a.md"),
            PathBuf::from("dist/a.html"),
            "a.html".to_string(),
        );
        assert_eq!(page.group, vec!["Others"]);
        assert_eq!(page.site_link(), "a.html");
    }

    #[test]
    fn test_site_link_with_folder() {
        let meta = PageMeta {
            folder: Some("guides/".to_string()),
            ..PageMeta::default()
        };
        let page = Page::from_meta(
            meta,
            "Others",
            PathBuf::from("pages/b.md"),
            PathBuf::from("dist/guides/b.html"),
            "b.html".to_string(),
        );
        assert_eq!(page.site_link(), "guides/b.html");
    }
}
