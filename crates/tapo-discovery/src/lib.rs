//! Tapo Discovery - Device discovery and accessory reconciliation
//!
//! This crate provides:
//! - Neighbor (ARP) table enumeration and address-to-device resolution
//! - A per-device retry budget for connection attempts
//! - Reconciliation of discovered devices against the host's accessory cache
//! - The discovery pass tying these together, including hub child devices

pub mod arp;
pub mod host;
pub mod locator;
pub mod orchestrator;
pub mod reconcile;
pub mod retry;

pub use arp::{NeighborEntry, NeighborState, NeighborTable, SystemNeighborTable};
pub use host::{AccessoryContext, AccessoryHost, CachedAccessory, HostError};
pub use locator::{NetworkDeviceLocator, DEFAULT_SCAN_TIMEOUT};
pub use orchestrator::{
    AccessoryBinding, DiscoveryError, DiscoveryOrchestrator, DiscoveryReport, OrchestratorConfig,
    RegisteredAccessory,
};
pub use reconcile::{PruneScope, ReconciliationDecision, ReconciliationPlanner};
pub use retry::{AttemptGate, RetryLedger, RetryState, DEFAULT_RETRY_BUDGET, DEFAULT_RETRY_DELAY};
