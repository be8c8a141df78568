//! Funding rate engine - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Multi-exchange funding rate collector
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "FUNDRATE_CONFIG", default_value = "config/default.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    fundrate_telemetry::init_logging()?;

    info!("Starting fundrate v{}", env!("CARGO_PKG_VERSION"));
    info!(config_path = %args.config, "Loading configuration");

    let config = fundrate_app::AppConfig::from_file(&args.config)?;
    info!(
        instruments = config.instruments.len(),
        data_dir = %config.storage.data_dir,
        "Configuration loaded"
    );

    let app = fundrate_app::Application::new(config)?;
    let report = app.run().await?;

    info!(
        observations = report.observations_stored,
        alerts = report.alerts.total(),
        "Shutdown complete"
    );
    Ok(())
}
