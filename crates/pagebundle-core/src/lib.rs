//! pagebundle core library
//!
//! Options, front matter, file kinds, output naming and error handling shared
//! by the parser, the generator and the CLI.

pub mod config;
pub mod content;
pub mod error;
pub mod frontmatter;
pub mod link;

pub use config::{OptionOverrides, Options};
pub use content::{FileKind, Page};
pub use error::{CoreError, Result};
pub use frontmatter::{PageMeta, TemplateMeta};
