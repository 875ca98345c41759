//! Configuration loading and validation

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tapo_core::AddressDescriptor;
use tapo_discovery::{OrchestratorConfig, DEFAULT_RETRY_BUDGET, DEFAULT_RETRY_DELAY};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default, rename = "address")]
    pub addresses: Vec<AddressDescriptor>,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Tapo account email
    #[serde(default)]
    pub email: Option<String>,
    /// Tapo account password
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Connection attempts per device
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    /// Delay between connection attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// Time allowed for one neighbor table scan in seconds
    #[serde(default = "default_scan_timeout")]
    pub scan_timeout_secs: u64,
    /// How often `watch` re-resolves device addresses in seconds
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            retry_budget: default_retry_budget(),
            retry_delay_secs: default_retry_delay(),
            scan_timeout_secs: default_scan_timeout(),
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

fn default_retry_budget() -> u32 {
    DEFAULT_RETRY_BUDGET
}

fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY.as_secs()
}

fn default_scan_timeout() -> u64 {
    5
}

fn default_refresh_interval() -> u64 {
    60
}

impl Config {
    /// Convert to the discovery library's configuration
    pub fn to_orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            email: self.account.email.clone(),
            password: self.account.password.clone(),
            addresses: self.addresses.clone(),
            retry_budget: self.discovery.retry_budget,
            retry_delay_secs: self.discovery.retry_delay_secs,
            scan_timeout_secs: self.discovery.scan_timeout_secs,
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.discovery.refresh_interval_secs.max(1))
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), addresses = config.addresses.len(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save an example configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let config = Config {
        account: AccountConfig {
            email: Some("user@example.com".to_string()),
            password: Some("change-me".to_string()),
        },
        addresses: vec![
            AddressDescriptor::mac("AA:BB:CC:DD:EE:FF"),
            AddressDescriptor::ip("192.168.1.50"),
        ],
        discovery: DiscoveryConfig::default(),
    };

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content)?;
    Ok(())
}
