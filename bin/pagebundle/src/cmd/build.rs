//! Build command - one full cycle over every source

use color_eyre::eyre::{Result, WrapErr};
use pagebundle_generator::Orchestrator;

use super::{OptionArgs, Target, load_options, print_report, watch};
use crate::server::DevServer;

/// Run the build command.
///
/// Builds every discovered source into `dest`. With `server` set the output
/// keeps being served afterwards; with `watch` set in the manifest this is
/// the same as the watch command.
pub async fn run(target: &Target, args: &OptionArgs) -> Result<()> {
    let options = load_options(target, &args.overrides())?;
    let root = target.root()?;

    if options.watch {
        return watch::session(root, options).await;
    }

    tracing::info!(
        root = %root.display(),
        dest = %options.dest.display(),
        patterns = options.src.len(),
        "starting build"
    );

    let mut orchestrator =
        Orchestrator::new(&root, options.clone()).wrap_err("Invalid source patterns")?;
    let report = orchestrator.build_all().await.wrap_err("Build failed")?;

    println!();
    println!("  Build completed successfully!");
    print_report(&report, &options.dest);

    tracing::info!(?report, "build completed");

    if options.server {
        let server = DevServer::start(&root.join(&options.dest), false, options.port).await?;
        println!("  Press Ctrl+C to stop");
        tokio::select! {
            result = server.wait() => result?,
            _ = tokio::signal::ctrl_c() => {}
        }
    }

    Ok(())
}
