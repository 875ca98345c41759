//! Device types for tracking located hardware

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::address::MacAddress;

/// Namespace for name-based accessory UUIDs
const ACCESSORY_NAMESPACE: Uuid = Uuid::from_u128(0x6ba7_b814_9dad_11d1_80b4_00c0_4fd4_30c8);

/// Derive the stable accessory UUID for a seed (normalized MAC or child device id)
pub fn derive_uuid(seed: &str) -> Uuid {
    Uuid::new_v5(&ACCESSORY_NAMESPACE, seed.as_bytes())
}

/// A device found in the neighbor table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatedDevice {
    pub ip: Ipv4Addr,
    pub mac: MacAddress,
    /// Derived from `mac` only, never from `ip`
    pub uuid: Uuid,
}

impl LocatedDevice {
    pub fn new(ip: Ipv4Addr, mac: MacAddress) -> Self {
        let uuid = derive_uuid(mac.as_str());
        Self { ip, mac, uuid }
    }
}

/// Resolves the current IP of a device from its MAC
#[async_trait]
pub trait IpResolver: Send + Sync {
    async fn resolve_ip(&self, mac: &MacAddress) -> Option<Ipv4Addr>;
}

#[derive(Debug, Clone, Copy)]
struct Location {
    ip: Ipv4Addr,
    refreshed_at: DateTime<Utc>,
}

/// Shared handle to a located device whose IP may follow DHCP changes
pub type DeviceHandle = Arc<ManagedDevice>;

/// A located device with a refreshable IP.
///
/// Accessories hold a [`DeviceHandle`] and read [`ManagedDevice::ip`] when
/// they need to talk to the device, so they always see the latest address.
pub struct ManagedDevice {
    mac: MacAddress,
    uuid: Uuid,
    location: RwLock<Location>,
    resolver: Arc<dyn IpResolver>,
}

impl ManagedDevice {
    pub fn new(device: LocatedDevice, resolver: Arc<dyn IpResolver>) -> Self {
        Self {
            mac: device.mac,
            uuid: device.uuid,
            location: RwLock::new(Location {
                ip: device.ip,
                refreshed_at: Utc::now(),
            }),
            resolver,
        }
    }

    pub fn mac(&self) -> &MacAddress {
        &self.mac
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub async fn ip(&self) -> Ipv4Addr {
        self.location.read().await.ip
    }

    /// When the IP was last confirmed by a successful resolution
    pub async fn refreshed_at(&self) -> DateTime<Utc> {
        self.location.read().await.refreshed_at
    }

    /// Current snapshot as a plain record
    pub async fn snapshot(&self) -> LocatedDevice {
        LocatedDevice {
            ip: self.ip().await,
            mac: self.mac.clone(),
            uuid: self.uuid,
        }
    }

    /// Re-resolve the IP by MAC.
    ///
    /// The held IP is only replaced when resolution succeeds; a device that
    /// is briefly off the network keeps its last known address. Returns the
    /// new IP when it changed.
    pub async fn refresh(&self) -> Option<Ipv4Addr> {
        let Some(ip) = self.resolver.resolve_ip(&self.mac).await else {
            debug!(mac = %self.mac, "Refresh failed, keeping last known IP");
            return None;
        };

        let mut location = self.location.write().await;
        location.refreshed_at = Utc::now();
        if location.ip == ip {
            return None;
        }

        info!(
            mac = %self.mac,
            old_ip = %location.ip,
            new_ip = %ip,
            "Device IP address changed"
        );
        location.ip = ip;
        Some(ip)
    }
}

impl std::fmt::Debug for ManagedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedDevice")
            .field("mac", &self.mac)
            .field("uuid", &self.uuid)
            .finish_non_exhaustive()
    }
}
