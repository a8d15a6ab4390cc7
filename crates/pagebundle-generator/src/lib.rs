//! pagebundle generator library
//!
//! Incremental build engine.
//!
//! # Modules
//!
//! - [`build`] - Cycle orchestration over a changed-file set
//! - [`cache`] - Tracked files and their dependency lists
//! - [`bridge`] - Watch events to cycle requests
//! - [`nav`] - Navigation groups and pagination
//! - [`template`] - Page and layout rendering
//! - [`resolve`] - Local / external / global reference resolution
//! - [`bundler`] - Script bundling
//! - [`assets`] - Output writing and asset copying
//! - [`discover`] - `src` glob discovery

pub mod assets;
pub mod bridge;
pub mod build;
pub mod bundler;
pub mod cache;
pub mod discover;
pub mod nav;
pub mod resolve;
pub mod template;

pub use bridge::{CycleRequest, WatchBridge, WatchEvent};
pub use build::{BuildError, BundleEvent, CycleReport, LiveReload, Orchestrator};
pub use bundler::{BundleOutput, BundleRequest, EsmBundler, ScriptBundler};
pub use cache::{DependencyCache, TrackedFile};
pub use discover::SourceSet;
pub use nav::{GroupOrder, NavGroup, Pagination, build_nav, pagination};
