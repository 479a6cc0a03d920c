//! rulegate CLI entrypoint

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rulegate::cli::Cli;
use rulegate::config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config is read first so its log level can seed the filter
    let loaded = config::load(cli.config_path());
    let default_level = loaded
        .as_ref()
        .map(|c| c.file.log.level.clone())
        .unwrap_or_else(|_| "info".to_string());

    // Initialize tracing: RUST_LOG, then RULEGATE_LOG, then log.level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("RULEGATE_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    cli.execute(loaded).await
}
