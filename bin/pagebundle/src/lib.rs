//! pagebundle CLI library
//!
//! Command implementations and the development server behind the
//! `pagebundle` binary.
//!
//! # Modules
//!
//! - [`cmd`] - Command implementations (build, watch, check)
//! - [`server`] - Development server with live reload
//!
//! # Example
//!
//! ```no_run
//! use pagebundle::cmd::{self, OptionArgs};
//!
//! # async fn run() -> color_eyre::eyre::Result<()> {
//! let target = cmd::Target::new("package.json", "bundle");
//! cmd::build::run(&target, &OptionArgs::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod cmd;
pub mod server;

pub use pagebundle_core::{Options, Page};
pub use pagebundle_generator::{CycleReport, Orchestrator};

/// Initialize tracing with the specified verbosity level.
///
/// # Arguments
///
/// * `verbose` - Verbosity level (0 = WARN, 1 = INFO, 2 = DEBUG, 3+ = TRACE)
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}
