//! Output names and relative links.
//!
//! Fixed-link inputs keep their base name so content URLs stay readable;
//! every other asset gets an opaque `file-<checksum><ext>` name.

use std::path::{Path, PathBuf};

use crate::content::FileKind;

/// Output file name for an input path.
///
/// ```
/// use std::path::Path;
/// use pagebundle_core::link::resolve_output_name;
///
/// assert_eq!(resolve_output_name(Path::new("pages/intro.md")), "intro.html");
/// assert_eq!(resolve_output_name(Path::new("src/app.tsx")), "app.js");
/// ```
pub fn resolve_output_name(input: &Path) -> String {
    let kind = FileKind::of(input);
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = input
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    match kind {
        FileKind::Script => format!("{stem}.js"),
        FileKind::Markdown => format!("{stem}.html"),
        FileKind::Html | FileKind::Css => format!("{stem}{ext}"),
        FileKind::Asset => format!("file-{}{ext}", checksum(&to_slash(input))),
    }
}

/// Deterministic 32-bit token of a string (FNV-1a 64, first 8 hex digits).
///
/// Not collision resistant; only stable.
pub fn checksum(value: &str) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in value.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    format!("{hash:016x}")[..8].to_string()
}

/// `dest_root/[folder/]name`.
pub fn output_path(dest_root: &Path, folder: Option<&str>, name: &str) -> PathBuf {
    let mut path = dest_root.to_path_buf();
    if let Some(folder) = folder.map(|f| f.trim_matches('/')).filter(|f| !f.is_empty()) {
        path.push(folder);
    }
    path.push(name);
    path
}

/// One `../` per folder segment, leading from a page back to `dest`.
pub fn relative_depth(folder: Option<&str>) -> String {
    folder
        .map(|f| f.split(['/', '\\']).filter(|s| !s.is_empty() && *s != ".").count())
        .map(|depth| "../".repeat(depth))
        .unwrap_or_default()
}

/// Link from the page at output link `from` to output link `to`.
///
/// Both arguments are `dest`-relative, slash separated.
pub fn relative_link(from: &str, to: &str) -> String {
    let from_dir: Vec<&str> = {
        let mut parts: Vec<&str> = segments(from).collect();
        parts.pop();
        parts
    };
    let to_parts: Vec<&str> = segments(to).collect();

    let max_common = from_dir.len().min(to_parts.len().saturating_sub(1));
    let common = from_dir
        .iter()
        .zip(&to_parts)
        .take(max_common)
        .take_while(|(a, b)| a == b)
        .count();

    let mut link = "../".repeat(from_dir.len() - common);
    link.push_str(&to_parts[common..].join("/"));
    link
}

fn segments(link: &str) -> impl Iterator<Item = &str> {
    link.split('/').filter(|s| !s.is_empty() && *s != ".")
}

/// Render a path with forward slashes.
pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
