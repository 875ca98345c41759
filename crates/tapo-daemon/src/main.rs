//! tapo-scan - Command line entry point
//!
//! Checks the configuration and locates configured devices on the local
//! network without connecting to them.

mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tapo_discovery::NetworkDeviceLocator;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "tapo-scan")]
#[command(about = "Locate Tapo devices on the local network by IP or MAC address")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "tapo.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write an example configuration file
    Init,
    /// Validate the configuration file
    Check,
    /// Resolve every configured address once
    Locate,
    /// Keep resolving configured devices and report address changes
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("tapo-scan v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Init => {
            if args.config.exists() {
                anyhow::bail!("{} already exists", args.config.display());
            }
            config::save_default_config(&args.config)?;
            println!("Wrote {}", args.config.display());
            Ok(())
        }
        Command::Check => commands::check(&config::load_config(&args.config)?),
        Command::Locate => {
            let config = config::load_config(&args.config)?;
            commands::locate(&config, &system_locator(&config)).await
        }
        Command::Watch => {
            let config = config::load_config(&args.config)?;
            commands::watch(&config, Arc::new(system_locator(&config))).await
        }
    }
}

fn system_locator(config: &config::Config) -> NetworkDeviceLocator {
    NetworkDeviceLocator::system(config.to_orchestrator_config().scan_timeout())
}
