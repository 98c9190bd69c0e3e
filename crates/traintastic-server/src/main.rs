use clap::Parser;
use tracing::{info, warn};

use traintastic_server::cli::Cli;
use traintastic_server::utils::standard_paths;
use traintastic_server::{ServerRuntime, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let datadir = cli
        .datadir
        .unwrap_or_else(standard_paths::default_data_dir);
    if let Err(err) = std::fs::create_dir_all(&datadir) {
        warn!("cannot create data directory {}: {err}", datadir.display());
    }
    info!(datadir = %datadir.display(), "starting");
    if cli.tray {
        // Headless build: accepted for compatibility, no tray is shown.
        info!("tray requested but not available in this build");
    }

    let locale_dir = standard_paths::locale_dir(&datadir);
    tracing::debug!(locale_dir = %locale_dir.display(), "locale lookup path");

    let settings = Settings::load(&datadir);
    let runtime = ServerRuntime::start(settings).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    tokio::task::spawn_blocking(move || runtime.shutdown()).await?;
    Ok(())
}
