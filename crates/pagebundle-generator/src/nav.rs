//! Navigation groups and pagination.
//!
//! Every page is rendered with the full page list, grouped by menu group and
//! with links recomputed relative to the page being rendered.

use std::{cmp::Ordering, collections::HashMap};

use pagebundle_core::{Page, TemplateMeta, link::relative_link};
use serde::Serialize;

/// Default group title when the template declares none.
pub const DEFAULT_GROUP: &str = "Others";

/// Declared position of a group and of its pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPosition {
    /// Group title.
    pub title: String,
    /// Declaration index.
    pub position: usize,
    /// Page title to declaration index inside the group.
    pub pages: HashMap<String, usize>,
}

/// Group ordering declared by the template's `groupOrder`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupOrder {
    groups: HashMap<String, GroupPosition>,
}

impl GroupOrder {
    /// Build the ordering from template metadata.
    ///
    /// `default_group` is appended last unless the template already declares
    /// it, in which case the declared position is kept.
    pub fn from_meta(meta: &TemplateMeta, default_group: &str) -> Self {
        let mut order = Self::default();
        for entry in &meta.group_order {
            let Some((title, pages)) = entry.parts() else {
                continue;
            };
            if order.groups.contains_key(title) {
                continue;
            }
            let pages = pages
                .into_iter()
                .enumerate()
                .map(|(position, page)| (page.to_string(), position))
                .collect();
            order.declare(title, pages);
        }

        if !order.groups.contains_key(default_group) {
            order.declare(default_group, HashMap::new());
        }
        order
    }

    fn declare(&mut self, title: &str, pages: HashMap<String, usize>) {
        let position = self.groups.len();
        self.groups.insert(
            title.to_string(),
            GroupPosition {
                title: title.to_string(),
                position,
                pages,
            },
        );
    }

    /// Declared ordering of `title`, if any.
    pub fn get(&self, title: &str) -> Option<&GroupPosition> {
        self.groups.get(title)
    }

    /// Number of declared groups, the default group included.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether no group is declared.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// A navigation group as seen from one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavGroup {
    pub title: String,
    pub pages: Vec<Page>,
}

/// Neighbours of a page inside its first navigation group.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Pagination {
    pub prev: Option<Page>,
    pub next: Option<Page>,
}

/// Group `pages` for rendering `current`.
pub fn build_nav(current: &Page, pages: &[&Page], order: &GroupOrder) -> Vec<NavGroup> {
    let from = current.site_link();

    let mut groups: Vec<(String, Vec<Page>)> = Vec::new();
    for page in pages {
        let mut relative = (*page).clone();
        relative.link = relative_link(&from, &page.site_link());

        for title in &page.group {
            match groups.iter_mut().find(|(t, _)| t == title) {
                Some((_, members)) => members.push(relative.clone()),
                None => groups.push((title.clone(), vec![relative.clone()])),
            }
        }
    }

    let (mut ordered, mut unordered): (Vec<_>, Vec<_>) = groups
        .into_iter()
        .partition(|(title, _)| order.get(title).is_some());

    ordered.sort_by_key(|(title, _)| order.get(title).map_or(usize::MAX, |g| g.position));
    unordered.sort_by(|(a, _), (b, _)| a.cmp(b));

    let ordered = ordered.into_iter().map(|(title, pages)| {
        let pages = match order.get(&title) {
            Some(group) if !group.pages.is_empty() => order_pages(pages, &group.pages),
            _ => pages,
        };
        NavGroup { title, pages }
    });
    let unordered = unordered.into_iter().map(|(title, mut pages)| {
        pages.sort_by(by_title);
        NavGroup { title, pages }
    });

    ordered.chain(unordered).collect()
}

/// Declared pages first by position, the rest by title.
fn order_pages(pages: Vec<Page>, positions: &HashMap<String, usize>) -> Vec<Page> {
    let position = |page: &Page| page.title.as_ref().and_then(|t| positions.get(t)).copied();

    let (mut declared, mut rest): (Vec<_>, Vec<_>) =
        pages.into_iter().partition(|p| position(p).is_some());
    declared.sort_by_key(|p| position(p));
    rest.sort_by(by_title);

    declared.extend(rest);
    declared
}

fn by_title(a: &Page, b: &Page) -> Ordering {
    a.title.cmp(&b.title)
}

/// Previous and next page of `current` in the first group that contains it.
pub fn pagination(current: &Page, nav: &[NavGroup]) -> Pagination {
    for group in nav {
        if let Some(index) = group.pages.iter().position(|p| p.file == current.file) {
            return Pagination {
                prev: index.checked_sub(1).and_then(|i| group.pages.get(i)).cloned(),
                next: group.pages.get(index + 1).cloned(),
            };
        }
    }
    Pagination::default()
}
