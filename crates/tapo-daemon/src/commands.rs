//! Subcommand implementations

use anyhow::Result;
use futures_util::future::join_all;
use std::sync::Arc;
use tapo_core::{IpResolver, ManagedDevice};
use tapo_discovery::NetworkDeviceLocator;
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::Config;

/// Validate the configuration and report problems
pub fn check(config: &Config) -> Result<()> {
    let orchestrator = config.to_orchestrator_config();

    println!(
        "Credentials: {}",
        if orchestrator.credentials().is_some() { "configured" } else { "missing" }
    );
    println!(
        "Retry policy: {} attempts, {}s apart",
        orchestrator.retry_budget, orchestrator.retry_delay_secs
    );

    let mut invalid = 0;
    for address in &orchestrator.addresses {
        let valid = address.is_valid();
        if !valid {
            invalid += 1;
        }
        println!("  - {} [{}]", address, if valid { "ok" } else { "invalid" });
    }

    if orchestrator.addresses.is_empty() {
        anyhow::bail!("No addresses configured");
    }
    if invalid > 0 {
        anyhow::bail!("{} of {} addresses are invalid", invalid, orchestrator.addresses.len());
    }
    Ok(())
}

/// Resolve every configured address once and print the results
pub async fn locate(config: &Config, locator: &NetworkDeviceLocator) -> Result<()> {
    let valid: Vec<_> = config.addresses.iter().filter(|a| a.is_valid()).collect();
    let results = join_all(valid.iter().map(|address| locator.find(address))).await;

    println!("Located {} of {} devices:", results.iter().flatten().count(), valid.len());
    for (address, result) in valid.iter().zip(results) {
        match result {
            Some(device) => println!("  - {} -> {} ({}) uuid {}", address, device.ip, device.mac, device.uuid),
            None => println!("  - {} -> not found", address),
        }
    }
    Ok(())
}

/// Locate devices, then keep their addresses current until interrupted
pub async fn watch(config: &Config, locator: Arc<NetworkDeviceLocator>) -> Result<()> {
    let located = join_all(
        config
            .addresses
            .iter()
            .filter(|a| a.is_valid())
            .map(|address| locator.find(address)),
    )
    .await;

    let resolver: Arc<dyn IpResolver> = locator;
    let devices: Vec<ManagedDevice> = located
        .into_iter()
        .flatten()
        .map(|device| ManagedDevice::new(device, resolver.clone()))
        .collect();

    if devices.is_empty() {
        anyhow::bail!("None of the configured devices could be located");
    }

    info!(
        devices = devices.len(),
        interval = ?config.refresh_interval(),
        "Watching device addresses"
    );

    let mut ticker = interval(config.refresh_interval());
    // The first tick completes immediately and the devices were just located
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let changes = join_all(devices.iter().map(|d| d.refresh())).await;
                for (device, change) in devices.iter().zip(changes) {
                    if let Some(ip) = change {
                        println!("{} moved to {}", device.mac(), ip);
                    }
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for interrupt");
                }
                info!("Stopping watch");
                return Ok(());
            }
        }
    }
}
