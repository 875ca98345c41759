//! Discovery pass: locate, connect, reconcile, prune

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::slice;
use std::sync::Arc;
use std::time::Duration;
use tapo_core::{
    derive_uuid, AccessoryClass, AddressDescriptor, AddressKind, DeviceHandle, IpResolver, MacAddress,
    ManagedDevice,
};
use tapo_session::{ChildInfo, Credentials, SessionClient, SessionError, SessionHandle};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::host::{AccessoryContext, AccessoryHost, HostError};
use crate::locator::NetworkDeviceLocator;
use crate::reconcile::{PruneScope, ReconciliationDecision, ReconciliationPlanner};
use crate::retry::{AttemptGate, RetryLedger, DEFAULT_RETRY_BUDGET, DEFAULT_RETRY_DELAY};

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Device returned no information")]
    EmptyInfo,
    #[error(transparent)]
    Host(#[from] HostError),
}

/// Platform configuration as supplied by the host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub addresses: Vec<AddressDescriptor>,
    /// Connection attempts per device
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    /// Delay between connection attempts
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// Time allowed for a single neighbor table scan
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,
}

fn default_retry_budget() -> u32 {
    DEFAULT_RETRY_BUDGET
}

fn default_retry_delay_secs() -> u64 {
    DEFAULT_RETRY_DELAY.as_secs()
}

fn default_scan_timeout_secs() -> u64 {
    5
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            email: None,
            password: None,
            addresses: Vec::new(),
            retry_budget: default_retry_budget(),
            retry_delay_secs: default_retry_delay_secs(),
            scan_timeout_secs: default_scan_timeout_secs(),
        }
    }
}

impl OrchestratorConfig {
    /// Credentials, when both email and password are set
    pub fn credentials(&self) -> Option<Credentials> {
        match (self.email.as_deref(), self.password.as_deref()) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                Some(Credentials::new(email, password))
            }
            _ => None,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}

/// How a registered accessory reaches its device
#[derive(Clone)]
pub enum AccessoryBinding {
    Device {
        device: DeviceHandle,
        session: SessionHandle,
    },
    /// Reached through the parent hub's session
    Child {
        parent: Uuid,
        device_id: String,
        session: SessionHandle,
    },
}

/// An accessory wired up during a pass
#[derive(Clone)]
pub struct RegisteredAccessory {
    pub uuid: Uuid,
    pub name: String,
    pub class: AccessoryClass,
    pub binding: AccessoryBinding,
}

impl fmt::Debug for RegisteredAccessory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("RegisteredAccessory");
        s.field("uuid", &self.uuid).field("name", &self.name).field("class", &self.class);
        match &self.binding {
            AccessoryBinding::Device { device, .. } => s.field("device", device),
            AccessoryBinding::Child { parent, device_id, .. } => {
                s.field("parent", parent).field("device_id", device_id)
            }
        };
        s.finish()
    }
}

/// Result of one discovery pass
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub decisions: Vec<ReconciliationDecision>,
    pub registered: Vec<RegisteredAccessory>,
}

impl DiscoveryReport {
    pub fn decisions_for(&self, uuid: Uuid) -> Vec<&ReconciliationDecision> {
        self.decisions.iter().filter(|d| d.uuid() == uuid).collect()
    }

    pub fn removed(&self) -> Vec<Uuid> {
        self.decisions
            .iter()
            .filter(|d| matches!(d, ReconciliationDecision::Remove(_)))
            .map(|d| d.uuid())
            .collect()
    }

    pub fn hubs(&self) -> impl Iterator<Item = &RegisteredAccessory> {
        self.registered.iter().filter(|a| a.class == AccessoryClass::Hub)
    }
}

/// State shared by the branches of one pass
struct Pass {
    planner: ReconciliationPlanner,
    decisions: Mutex<Vec<ReconciliationDecision>>,
    registered: Mutex<Vec<RegisteredAccessory>>,
    /// Located device UUID to the address branch that connects it
    located: Mutex<HashMap<Uuid, usize>>,
    /// Child UUID to the hub that reported it
    children: Mutex<HashMap<Uuid, Uuid>>,
    unlisted_hubs: Mutex<HashSet<Uuid>>,
}

impl Pass {
    fn new(planner: ReconciliationPlanner) -> Self {
        Self {
            planner,
            decisions: Mutex::new(Vec::new()),
            registered: Mutex::new(Vec::new()),
            located: Mutex::new(HashMap::new()),
            children: Mutex::new(HashMap::new()),
            unlisted_hubs: Mutex::new(HashSet::new()),
        }
    }

    /// Record a located device for an address branch; returns the branch
    /// that already owns it, if another one does
    async fn claim_device(&self, uuid: Uuid, branch: usize) -> Option<usize> {
        let mut located = self.located.lock().await;
        match located.get(&uuid) {
            Some(&owner) if owner != branch => Some(owner),
            Some(_) => None,
            None => {
                located.insert(uuid, branch);
                None
            }
        }
    }

    /// Record a child for a hub; returns the hub that already owns it, if any
    async fn claim_child(&self, child: Uuid, hub: Uuid) -> Option<Uuid> {
        let mut children = self.children.lock().await;
        match children.get(&child) {
            Some(&owner) => Some(owner),
            None => {
                children.insert(child, hub);
                None
            }
        }
    }

    async fn prune_scope(&self, addresses: &[AddressDescriptor]) -> PruneScope {
        let mut configured: HashSet<Uuid> = self.located.lock().await.keys().copied().collect();
        configured.extend(
            addresses
                .iter()
                .filter(|a| a.kind == AddressKind::Mac && a.is_valid())
                .filter_map(|a| MacAddress::parse(&a.value))
                .map(|mac| derive_uuid(mac.as_str())),
        );

        // A configured parent that never connected could not list its
        // children, so it is treated like a hub whose listing failed.
        let connected: HashSet<Uuid> = self
            .registered
            .lock()
            .await
            .iter()
            .filter(|a| matches!(a.binding, AccessoryBinding::Device { .. }))
            .map(|a| a.uuid)
            .collect();
        let mut unlisted_hubs = self.unlisted_hubs.lock().await.clone();
        unlisted_hubs.extend(configured.difference(&connected).copied());

        PruneScope {
            configured,
            discovered_children: self.children.lock().await.keys().copied().collect(),
            unlisted_hubs,
        }
    }
}

/// Drives discovery passes against the host's accessory cache.
///
/// The retry ledger lives as long as the orchestrator, so a device that
/// used up its budget stays given up on across passes.
pub struct DiscoveryOrchestrator {
    config: OrchestratorConfig,
    locator: Arc<NetworkDeviceLocator>,
    client: Arc<dyn SessionClient>,
    host: Arc<dyn AccessoryHost>,
    ledger: RetryLedger,
}

impl DiscoveryOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        locator: NetworkDeviceLocator,
        client: Arc<dyn SessionClient>,
        host: Arc<dyn AccessoryHost>,
    ) -> Self {
        let ledger = RetryLedger::new(config.retry_budget, config.retry_delay());
        Self {
            config,
            locator: Arc::new(locator),
            client,
            host,
            ledger,
        }
    }

    pub fn ledger(&self) -> &RetryLedger {
        &self.ledger
    }

    /// Run one full discovery pass.
    ///
    /// Per-device failures are logged and isolated; the pass always runs
    /// every branch to completion.
    pub async fn run_pass(&self) -> DiscoveryReport {
        let pass = Pass::new(ReconciliationPlanner::new(self.host.cached_accessories()));

        let credentials = match self.config.credentials() {
            Some(credentials) if !self.config.addresses.is_empty() => credentials,
            _ => {
                info!("No devices configured, removing cached accessories");
                let decisions = pass.planner.remove_all().await;
                self.apply_removals(&decisions);
                return DiscoveryReport {
                    decisions,
                    registered: Vec::new(),
                };
            }
        };

        info!(addresses = self.config.addresses.len(), "Starting discovery pass");

        join_all(
            self.config
                .addresses
                .iter()
                .enumerate()
                .map(|(branch, address)| self.load_device(&pass, branch, address, &credentials)),
        )
        .await;

        let hubs: Vec<(Uuid, SessionHandle)> = pass
            .registered
            .lock()
            .await
            .iter()
            .filter(|a| a.class == AccessoryClass::Hub)
            .filter_map(|a| match &a.binding {
                AccessoryBinding::Device { session, .. } => Some((a.uuid, session.clone())),
                AccessoryBinding::Child { .. } => None,
            })
            .collect();

        join_all(hubs.into_iter().map(|(hub, session)| self.load_children(&pass, hub, session))).await;

        let scope = pass.prune_scope(&self.config.addresses).await;
        let leftovers = pass.planner.finish(&scope).await;
        self.apply_removals(&leftovers);

        let mut decisions = pass.decisions.into_inner();
        decisions.extend(leftovers);
        let registered = pass.registered.into_inner();

        info!(
            decisions = decisions.len(),
            registered = registered.len(),
            "Discovery pass complete"
        );

        DiscoveryReport { decisions, registered }
    }

    async fn load_device(&self, pass: &Pass, branch: usize, address: &AddressDescriptor, credentials: &Credentials) {
        if !address.is_valid() {
            error!(address = %address, "Invalid address in configuration, skipping");
            return;
        }

        loop {
            let Some(located) = self.locator.find(address).await else {
                return;
            };
            let uuid = located.uuid;
            if let Some(owner) = pass.claim_device(uuid, branch).await {
                warn!(
                    address = %address,
                    uuid = %uuid,
                    owner = ?self.config.addresses.get(owner).map(ToString::to_string),
                    "Device already handled by another configured address, skipping"
                );
                return;
            }

            match self.ledger.begin_attempt(uuid).await {
                AttemptGate::Refuse => {
                    info!(ip = %located.ip, mac = %located.mac, "Retry budget exhausted");
                    return;
                }
                AttemptGate::ProceedAfter(delay) => {
                    info!(ip = %located.ip, delay = ?delay, "Retrying connection");
                    sleep(delay).await;
                    let remaining = self.ledger.remaining(&uuid).await.unwrap_or_default();
                    info!(ip = %located.ip, remaining, budget = self.ledger.budget(), "Connecting");
                }
                AttemptGate::Proceed => {}
            }

            let resolver: Arc<dyn IpResolver> = self.locator.clone();
            let device = Arc::new(ManagedDevice::new(located, resolver));

            match self.connect_device(pass, device, credentials).await {
                Ok(()) => return,
                Err(e) => {
                    let remaining = self.ledger.record_failure(uuid).await;
                    warn!(address = %address, error = %e, remaining, "Failed to set up device");
                    if remaining == 0 {
                        info!(address = %address, "Retry budget exhausted");
                        return;
                    }
                }
            }
        }
    }

    async fn connect_device(
        &self,
        pass: &Pass,
        device: DeviceHandle,
        credentials: &Credentials,
    ) -> Result<(), DiscoveryError> {
        let session = self.client.setup(device.clone(), credentials).await?;
        let info = session
            .get_info()
            .await?
            .filter(|info| !info.is_empty())
            .ok_or(DiscoveryError::EmptyInfo)?;

        let name = info.display_name();
        let kind = info.kind();
        let Some(class) = kind.accessory_class() else {
            error!(
                name = %name,
                kind = ?kind,
                device_type = %info.device_type,
                "Failed to register accessory of unsupported type"
            );
            return Ok(());
        };

        let context = AccessoryContext::Device {
            name: name.clone(),
            session: Some(session.clone()),
        };
        let registered = RegisteredAccessory {
            uuid: device.uuid(),
            name,
            class,
            binding: AccessoryBinding::Device { device, session },
        };
        self.reconcile(pass, context, registered).await
    }

    async fn load_children(&self, pass: &Pass, hub: Uuid, session: SessionHandle) {
        let children = match session.get_child_devices().await {
            Ok(children) => children,
            Err(e) => {
                warn!(hub = %hub, error = %e, "Failed to list child devices");
                pass.unlisted_hubs.lock().await.insert(hub);
                return;
            }
        };
        debug!(hub = %hub, count = children.len(), "Listed child devices");

        let mut branches = Vec::new();
        for child in children {
            if child.device_id.is_empty() {
                debug!(hub = %hub, "Skipping child without device id");
                continue;
            }

            // Child UUIDs are derived from the device id alone, so two hubs
            // reporting the same id would collide; the first hub keeps it.
            let uuid = derive_uuid(&child.device_id);
            if let Some(owner) = pass.claim_child(uuid, hub).await {
                warn!(
                    device_id = %child.device_id,
                    hub = %hub,
                    owner = %owner,
                    "Child device id already reported this pass, skipping"
                );
                continue;
            }

            branches.push(self.load_child(pass, hub, session.clone(), child, uuid));
        }

        join_all(branches).await;
    }

    async fn load_child(&self, pass: &Pass, hub: Uuid, session: SessionHandle, child: ChildInfo, uuid: Uuid) {
        loop {
            match self.ledger.begin_attempt(uuid).await {
                AttemptGate::Refuse => {
                    info!(device_id = %child.device_id, "Retry budget exhausted");
                    return;
                }
                AttemptGate::ProceedAfter(delay) => {
                    info!(device_id = %child.device_id, delay = ?delay, "Retrying child device");
                    sleep(delay).await;
                }
                AttemptGate::Proceed => {}
            }

            match self.connect_child(pass, hub, &session, &child, uuid).await {
                Ok(()) => return,
                Err(e) => {
                    let remaining = self.ledger.record_failure(uuid).await;
                    warn!(device_id = %child.device_id, error = %e, remaining, "Failed to set up child device");
                    if remaining == 0 {
                        info!(device_id = %child.device_id, "Retry budget exhausted");
                        return;
                    }
                }
            }
        }
    }

    async fn connect_child(
        &self,
        pass: &Pass,
        hub: Uuid,
        session: &SessionHandle,
        child: &ChildInfo,
        uuid: Uuid,
    ) -> Result<(), DiscoveryError> {
        let name = child.display_name();
        let kind = child.kind();
        let Some(class) = kind.accessory_class() else {
            error!(
                name = %name,
                kind = ?kind,
                device_type = %child.device_type,
                category = %child.category,
                "Failed to register child accessory of unsupported type"
            );
            return Ok(());
        };

        let context = AccessoryContext::Child {
            name: name.clone(),
            parent: hub,
        };
        let registered = RegisteredAccessory {
            uuid,
            name,
            class,
            binding: AccessoryBinding::Child {
                parent: hub,
                device_id: child.device_id.clone(),
                session: session.clone(),
            },
        };
        self.reconcile(pass, context, registered).await
    }

    async fn reconcile(
        &self,
        pass: &Pass,
        context: AccessoryContext,
        registered: RegisteredAccessory,
    ) -> Result<(), DiscoveryError> {
        let uuid = registered.uuid;
        let Some(decision) = pass.planner.claim(uuid, &registered.name, context).await else {
            return Ok(());
        };

        let applied = match &decision {
            ReconciliationDecision::Restore(accessory) => {
                info!(name = %accessory.display_name, uuid = %uuid, "Restoring existing accessory from cache");
                self.host.update(slice::from_ref(accessory))
            }
            ReconciliationDecision::Create(accessory) => {
                info!(name = %accessory.display_name, uuid = %uuid, "Adding new accessory");
                self.host.register(slice::from_ref(accessory))
            }
            ReconciliationDecision::Remove(_) | ReconciliationDecision::Retain(_) => Ok(()),
        };

        if let Err(e) = applied {
            pass.planner.release(uuid).await;
            return Err(e.into());
        }

        pass.decisions.lock().await.push(decision);
        pass.registered.lock().await.push(registered);
        Ok(())
    }

    fn apply_removals(&self, decisions: &[ReconciliationDecision]) {
        for decision in decisions {
            if let ReconciliationDecision::Remove(accessory) = decision {
                info!(name = %accessory.display_name, uuid = %accessory.uuid, "Remove cached accessory");
                if let Err(e) = self.host.unregister(slice::from_ref(accessory)) {
                    error!(uuid = %accessory.uuid, error = %e, "Failed to remove cached accessory");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_host_json() {
        let json = r#"{
            "platform": "TapoLink",
            "email": "user@example.com",
            "password": "secret",
            "addresses": [
                {"value": "AA:BB:CC:DD:EE:FF", "type": "MAC"},
                {"value": "192.168.1.5", "type": "IP"}
            ],
            "retryDelaySecs": 2
        }"#;
        let config: OrchestratorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.addresses.len(), 2);
        assert_eq!(config.retry_budget, 20);
        assert_eq!(config.retry_delay(), Duration::from_secs(2));
        assert_eq!(config.scan_timeout(), Duration::from_secs(5));
        assert_eq!(config.credentials(), Some(Credentials::new("user@example.com", "secret")));
    }

    #[test]
    fn test_config_credentials_require_both_fields() {
        let mut config = OrchestratorConfig {
            email: Some("user@example.com".to_string()),
            ..Default::default()
        };
        assert!(config.credentials().is_none());
        config.password = Some(String::new());
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_config_never_serializes_password() {
        let config = OrchestratorConfig {
            email: Some("user@example.com".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
