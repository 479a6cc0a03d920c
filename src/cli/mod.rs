//! Command-line interface for rulegate.
//!
//! Provides commands for running the engine, validating a configuration,
//! listing driver schemas and showing the resolved configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use crate::config::LoadedConfig;
use crate::core::{bootstrap, check, RuleEngine};
use crate::drivers::DriverCatalog;
use crate::plugins::{HeartbeatPlugin, PluginCatalog};

/// rulegate - edge gateway rule engine
#[derive(Parser, Debug)]
#[command(name = "rulegate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: .rulegate/config.yaml, searched upward)
    #[arg(short, long, global = true, env = "RULEGATE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load the configured resources and run until Ctrl-C
    Run,

    /// Validate every configured resource and rule without starting anything
    Check,

    /// Print the configuration schema of every driver and plugin as JSON
    Schemas,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    pub fn config_path(&self) -> Option<&Path> {
        self.config.as_deref()
    }

    /// Execute the CLI command.
    ///
    /// `loaded` is the configuration resolved before logging was set up;
    /// commands that need it report its error.
    pub async fn execute(self, loaded: Result<LoadedConfig>) -> Result<()> {
        match self.command {
            Commands::Run => run(loaded?).await,
            Commands::Check => check_config(loaded?),
            Commands::Schemas => print_schemas(),
            Commands::Config => show_config(loaded?),
        }
    }
}

async fn run(loaded: LoadedConfig) -> Result<()> {
    match &loaded.path {
        Some(path) => tracing::info!(config = %path.display(), "Starting rulegate"),
        None => tracing::info!("Starting rulegate with default configuration"),
    }

    let engine = RuleEngine::new(loaded.file.engine.clone());

    let report = match bootstrap(&engine, &loaded.file).await {
        Ok(report) => report,
        Err(e) => {
            engine.shutdown().await;
            return Err(e.context("Startup aborted"));
        }
    };
    if report.failed > 0 {
        tracing::warn!(failed = report.failed, "Some resources failed to load");
    }

    engine.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    eprintln!();

    engine.shutdown().await;
    Ok(())
}

fn check_config(loaded: LoadedConfig) -> Result<()> {
    let issues = check(
        &loaded.file,
        &DriverCatalog::with_builtins(),
        &PluginCatalog::with_builtins(),
        &loaded.file.engine.script,
    );

    let resources = &loaded.file.resources;
    let total = resources.inputs.len()
        + resources.outputs.len()
        + resources.devices.len()
        + resources.rules.len();

    if issues.is_empty() {
        println!("Configuration OK ({} resources checked)", total);
        return Ok(());
    }

    println!("{:<10} {:<24} {}", "RESOURCE", "NAME", "PROBLEM");
    println!("{}", "-".repeat(75));
    for issue in &issues {
        println!("{:<10} {:<24} {}", issue.resource, issue.name, issue.message);
    }

    anyhow::bail!("{} issue(s) found", issues.len())
}

fn print_schemas() -> Result<()> {
    let schemas = json!({
        "drivers": DriverCatalog::with_builtins().schemas(),
        "plugins": [HeartbeatPlugin::schema()],
    });

    println!("{}", serde_json::to_string_pretty(&schemas)?);
    Ok(())
}

fn show_config(loaded: LoadedConfig) -> Result<()> {
    println!("rulegate Configuration");
    println!("======================");
    println!();

    match &loaded.path {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (none, using defaults)"),
    }
    println!();

    let yaml = serde_yaml::to_string(&loaded.file).context("Failed to render configuration")?;
    println!("{}", yaml);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["rulegate", "check", "--config", "gw.yaml"]).unwrap();
        assert!(matches!(cli.command, Commands::Check));
        assert_eq!(cli.config_path(), Some(Path::new("gw.yaml")));
    }
}
