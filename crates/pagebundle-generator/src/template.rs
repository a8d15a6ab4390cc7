//! Page and layout rendering with minijinja.
//!
//! Page markup is itself a template: it is rendered against `theme`, `page`
//! and `pages` before being wrapped by the layout, which receives the same
//! data plus `page.content`. Output is not auto-escaped.

use minijinja::{AutoEscape, Environment, Error, ErrorKind, Value};
use pagebundle_core::{Page, TemplateMeta};
use serde::Serialize;
use thiserror::Error;

use crate::nav::{NavGroup, Pagination};

/// Template rendering errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Rendering a template failed.
    #[error("failed to render {name}: {source}")]
    Render {
        name: String,
        #[source]
        source: Error,
    },
}

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;

/// The outer template: its front matter and body.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    /// Name used in error messages.
    pub name: String,
    /// Front matter, exposed as `theme`.
    pub meta: TemplateMeta,
    /// Template body.
    pub source: String,
}

#[derive(Serialize)]
struct PageView<'a> {
    #[serde(flatten)]
    page: &'a Page,
    prev: Option<&'a Page>,
    next: Option<&'a Page>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
}

#[derive(Serialize)]
struct RenderContext<'a> {
    theme: &'a TemplateMeta,
    page: PageView<'a>,
    pages: &'a [NavGroup],
}

/// Template engine shared by every page of a cycle.
#[derive(Debug)]
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    /// Create an engine with the `toJson` filter registered.
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.add_filter("toJson", to_json);
        Self { env }
    }

    /// Render a template source string against `ctx`.
    pub fn render_str<S: Serialize>(&self, name: &str, source: &str, ctx: S) -> Result<String> {
        self.env
            .render_named_str(name, source, ctx)
            .map_err(|source| TemplateError::Render {
                name: name.to_string(),
                source,
            })
    }

    /// Render one page: its own markup first, then the layout around it unless
    /// the page opted out with `template: false`.
    pub fn render_page(
        &self,
        layout: &Layout,
        page: &Page,
        markup: &str,
        nav: &[NavGroup],
        pager: &Pagination,
    ) -> Result<String> {
        let name = page.file.to_string_lossy();

        let body = self.render_str(&name, markup, context(layout, page, nav, pager, None))?;
        if !page.template {
            return Ok(body);
        }
        self.render_str(
            &layout.name,
            &layout.source,
            context(layout, page, nav, pager, Some(&body)),
        )
    }
}

fn context<'a>(
    layout: &'a Layout,
    page: &'a Page,
    nav: &'a [NavGroup],
    pager: &'a Pagination,
    content: Option<&'a str>,
) -> RenderContext<'a> {
    RenderContext {
        theme: &layout.meta,
        page: PageView {
            page,
            prev: pager.prev.as_ref(),
            next: pager.next.as_ref(),
            content,
        },
        pages: nav,
    }
}

fn to_json(value: Value) -> std::result::Result<String, Error> {
    serde_json::to_string(&value).map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}
