//! pagebundle parser library
//!
//! Content transformers used while rendering a cycle: Markdown to HTML,
//! reference scanning/rewriting in HTML markup, and stylesheet processing.

pub mod css;
pub mod html;
pub mod markdown;

pub use css::{CssProcessor, StyleError, StyleOptions, StyleOutput, StyleProcessor};
pub use html::{RenderedHtml, Reference, collect_references, rewrite_references};
pub use markdown::{MarkdownError, MarkdownRenderer};
