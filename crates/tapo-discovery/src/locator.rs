//! Resolve configured addresses to located devices

use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tapo_core::{AddressDescriptor, AddressKind, IpResolver, LocatedDevice, MacAddress};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::arp::{NeighborEntry, NeighborTable, SystemNeighborTable};

/// Default time allowed for a single neighbor table enumeration
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(5);

/// Looks devices up in the neighbor table.
///
/// Every lookup performs a fresh enumeration; nothing is cached. Scan
/// failures and timeouts are reported as "not found".
#[derive(Clone)]
pub struct NetworkDeviceLocator {
    table: Arc<dyn NeighborTable>,
    scan_timeout: Duration,
}

impl NetworkDeviceLocator {
    pub fn new(table: Arc<dyn NeighborTable>, scan_timeout: Duration) -> Self {
        Self { table, scan_timeout }
    }

    /// Locator backed by the host's neighbor table
    pub fn system(scan_timeout: Duration) -> Self {
        Self::new(Arc::new(SystemNeighborTable), scan_timeout)
    }

    /// Resolve an address descriptor to a located device
    pub async fn find(&self, address: &AddressDescriptor) -> Option<LocatedDevice> {
        match address.kind {
            AddressKind::Ip => {
                info!(ip = %address.value, "Locating device by IP address");
                let entries = self.scan().await?;
                let located = entries
                    .into_iter()
                    .filter(|e| e.ip.to_string() == address.value)
                    .find_map(into_located);
                if located.is_none() {
                    warn!(ip = %address.value, "Failed to find device for IP address");
                }
                located
            }
            AddressKind::Mac => {
                let Some(mac) = MacAddress::parse(&address.value) else {
                    error!(value = %address.value, "Invalid MAC address in configuration");
                    return None;
                };
                self.find_by_mac(&mac).await
            }
            AddressKind::Unknown => {
                error!(value = %address.value, "Unsupported address type in configuration");
                None
            }
        }
    }

    /// Resolve a device by MAC alone, case-insensitively
    pub async fn find_by_mac(&self, mac: &MacAddress) -> Option<LocatedDevice> {
        info!(mac = %mac, "Locating IP by MAC address");
        let entries = self.scan().await?;
        let located = entries
            .into_iter()
            .filter(|e| e.mac.as_ref() == Some(mac))
            .find_map(into_located);

        match &located {
            Some(device) => debug!(ip = %device.ip, mac = %device.mac, "Device found"),
            None => warn!(mac = %mac, "Failed to find IP for MAC address"),
        }
        located
    }

    async fn scan(&self) -> Option<Vec<NeighborEntry>> {
        match timeout(self.scan_timeout, self.table.entries()).await {
            Ok(Ok(entries)) => Some(entries),
            Ok(Err(e)) => {
                warn!(error = %e, "Neighbor table scan failed");
                None
            }
            Err(_) => {
                warn!(timeout = ?self.scan_timeout, "Neighbor table scan timed out");
                None
            }
        }
    }
}

fn into_located(entry: NeighborEntry) -> Option<LocatedDevice> {
    entry.mac.map(|mac| LocatedDevice::new(entry.ip, mac))
}

#[async_trait]
impl IpResolver for NetworkDeviceLocator {
    async fn resolve_ip(&self, mac: &MacAddress) -> Option<Ipv4Addr> {
        self.find_by_mac(mac).await.map(|device| device.ip)
    }
}
