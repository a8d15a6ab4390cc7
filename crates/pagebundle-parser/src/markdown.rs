//! Markdown renderer using pulldown-cmark.
//!
//! Tables, code blocks and raw HTML blocks are wrapped in `markdown -*-container`
//! elements so themes can style rendered content apart from hand written markup.

use std::path::Path;

use pagebundle_core::{
    frontmatter::{PageMeta, parse_front_matter},
    CoreError,
};
use pulldown_cmark::{CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd, html};
use thiserror::Error;

/// Markdown rendering errors.
#[derive(Debug, Error)]
pub enum MarkdownError {
    /// Failed to parse front matter.
    #[error("front matter error: {0}")]
    FrontMatter(#[from] CoreError),
}

/// Result type for markdown operations.
pub type Result<T> = std::result::Result<T, MarkdownError>;

const TABLE_OPEN: &str = "<div class=\"markdown -table-container\">";
const HTML_OPEN: &str = "<div class=\"markdown -html-container\">";
const CONTAINER_CLOSE: &str = "</div>\n";

/// Markdown to HTML renderer.
#[derive(Debug, Clone)]
pub struct MarkdownRenderer {
    options: Options,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    /// Create a renderer with GFM-style extensions enabled.
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_HEADING_ATTRIBUTES);

        Self { options }
    }

    /// Split front matter and render the body.
    pub fn parse(&self, content: &str, path: &Path) -> Result<(PageMeta, String)> {
        let (meta, body) = parse_front_matter::<PageMeta>(content, path)?;
        Ok((meta, self.render(&body)))
    }

    /// Render a markdown body (no front matter) to HTML.
    pub fn render(&self, body: &str) -> String {
        let mut events: Vec<Event<'_>> = Vec::new();
        let mut code: Option<(String, String)> = None;

        for event in Parser::new_ext(body, self.options) {
            match event {
                Event::Start(Tag::Table(_)) => {
                    events.push(Event::Html(CowStr::Borrowed(TABLE_OPEN)));
                    events.push(event);
                }
                Event::End(TagEnd::Table) => {
                    events.push(event);
                    events.push(Event::Html(CowStr::Borrowed(CONTAINER_CLOSE)));
                }

                Event::Start(Tag::HtmlBlock) => {
                    events.push(Event::Html(CowStr::Borrowed(HTML_OPEN)));
                    events.push(event);
                }
                Event::End(TagEnd::HtmlBlock) => {
                    events.push(event);
                    events.push(Event::Html(CowStr::Borrowed(CONTAINER_CLOSE)));
                }

                Event::Start(Tag::CodeBlock(kind)) => {
                    let lang = match kind {
                        CodeBlockKind::Fenced(info) => info
                            .split_whitespace()
                            .next()
                            .unwrap_or_default()
                            .to_string(),
                        CodeBlockKind::Indented => String::new(),
                    };
                    code = Some((lang, String::new()));
                }
                Event::Text(text) if code.is_some() => {
                    if let Some((_, buf)) = code.as_mut() {
                        buf.push_str(&text);
                    }
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((lang, buf)) = code.take() {
                        events.push(Event::Html(code_container(&lang, &buf).into()));
                    }
                }

                other => events.push(other),
            }
        }

        let mut out = String::with_capacity(body.len() * 3 / 2);
        html::push_html(&mut out, events.into_iter());
        out
    }
}

fn code_container(lang: &str, code: &str) -> String {
    let lang = escape(lang);
    format!(
        "<pre class=\"markdown -code-container\" data-code=\"{lang}\"><code class=\"language-{lang}\">{}</code></pre>\n",
        escape(code)
    )
}

/// Escape HTML special characters.
pub fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
