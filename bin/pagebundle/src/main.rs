//! pagebundle CLI
//!
//! Builds pages, stylesheets, assets and scripts from a package manifest
//! section, optionally watching and serving the output.
//!
//! This is the binary entry point. The library functionality is in `lib.rs`.

use clap::Parser;
use color_eyre::eyre::Result;
use pagebundle::cmd::{self, OptionArgs, Target};

/// Command-line interface for pagebundle.
#[derive(Parser)]
#[command(
    name = "pagebundle",
    version,
    about = "Incremental page and script bundler"
)]
struct Cli {
    /// Package manifest holding the options
    #[arg(short, long, default_value = "package.json", global = true)]
    manifest: std::path::PathBuf,

    /// Manifest section to read
    #[arg(long, default_value = pagebundle_core::config::DEFAULT_SECTION, global = true)]
    section: String,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(clap::Subcommand)]
enum Commands {
    /// Build every source once
    Build {
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Build, then rebuild on change with live reload
    Watch {
        #[command(flatten)]
        options: OptionArgs,
        /// Do not start the development server
        #[arg(long)]
        no_server: bool,
    },
    /// Validate options, front matter and the template
    Check {
        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    pagebundle::init_tracing(cli.verbose);

    let target = Target::new(cli.manifest, cli.section);
    match cli.command {
        Commands::Build { options } => {
            cmd::build::run(&target, &options).await?;
        }
        Commands::Watch { options, no_server } => {
            cmd::watch::run(&target, &options, !no_server).await?;
        }
        Commands::Check { strict } => {
            cmd::check::run(&target, strict)?;
        }
    }

    Ok(())
}
