//! Reconcile discovered devices against the host's accessory cache

use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::host::{AccessoryContext, CachedAccessory};

/// Outcome for one accessory in a discovery pass
#[derive(Debug, Clone)]
pub enum ReconciliationDecision {
    /// Cached accessory backed by a device found this pass, with refreshed context
    Restore(CachedAccessory),
    /// Newly discovered device
    Create(CachedAccessory),
    /// Cached accessory no longer backed by configuration or discovery
    Remove(CachedAccessory),
    /// Cached accessory still configured but not reached this pass
    Retain(CachedAccessory),
}

impl ReconciliationDecision {
    pub fn accessory(&self) -> &CachedAccessory {
        match self {
            Self::Restore(a) | Self::Create(a) | Self::Remove(a) | Self::Retain(a) => a,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.accessory().uuid
    }
}

/// What a pass learned, used to find stale cache entries
#[derive(Debug, Clone, Default)]
pub struct PruneScope {
    /// UUIDs of top-level devices that are still configured
    pub configured: HashSet<Uuid>,
    /// Child UUIDs reported by hubs this pass
    pub discovered_children: HashSet<Uuid>,
    /// Configured parents whose children were not listed this pass
    pub unlisted_hubs: HashSet<Uuid>,
}

impl PruneScope {
    /// Whether a cached accessory should be removed
    pub fn is_stale(&self, accessory: &CachedAccessory) -> bool {
        match &accessory.context {
            AccessoryContext::Device { .. } => !self.configured.contains(&accessory.uuid),
            AccessoryContext::Child { parent, .. } => {
                if !self.configured.contains(parent) {
                    return true;
                }
                !self.unlisted_hubs.contains(parent) && !self.discovered_children.contains(&accessory.uuid)
            }
        }
    }
}

/// Decides restore/create/remove for one discovery pass.
///
/// Each UUID receives at most one decision; cached accessories left over at
/// the end of the pass are either removed or retained.
#[derive(Debug)]
pub struct ReconciliationPlanner {
    cached: Vec<CachedAccessory>,
    index: HashMap<Uuid, usize>,
    decided: Mutex<HashSet<Uuid>>,
}

impl ReconciliationPlanner {
    pub fn new(cached: Vec<CachedAccessory>) -> Self {
        let index = cached.iter().enumerate().map(|(i, a)| (a.uuid, i)).collect();
        Self {
            cached,
            index,
            decided: Mutex::new(HashSet::new()),
        }
    }

    pub fn cached(&self) -> &[CachedAccessory] {
        &self.cached
    }

    /// Claim a decision for a discovered device.
    ///
    /// Returns `None` when the UUID was already decided this pass.
    pub async fn claim(&self, uuid: Uuid, name: &str, context: AccessoryContext) -> Option<ReconciliationDecision> {
        let mut decided = self.decided.lock().await;
        if !decided.insert(uuid) {
            warn!(uuid = %uuid, name = %name, "Accessory already reconciled this pass, skipping");
            return None;
        }

        let decision = match self.index.get(&uuid).map(|&i| &self.cached[i]) {
            Some(existing) => {
                let mut restored = existing.clone();
                restored.context = context;
                ReconciliationDecision::Restore(restored)
            }
            None => ReconciliationDecision::Create(CachedAccessory::new(uuid, name, context)),
        };
        debug!(uuid = %uuid, decision = ?decision_kind(&decision), "Claimed accessory");
        Some(decision)
    }

    /// Give back a claim whose decision could not be applied
    pub async fn release(&self, uuid: Uuid) {
        self.decided.lock().await.remove(&uuid);
    }

    /// Decide every cached accessory not claimed this pass
    pub async fn finish(&self, scope: &PruneScope) -> Vec<ReconciliationDecision> {
        let mut decided = self.decided.lock().await;
        self.cached
            .iter()
            .filter(|a| decided.insert(a.uuid))
            .map(|a| {
                if scope.is_stale(a) {
                    ReconciliationDecision::Remove(a.clone())
                } else {
                    ReconciliationDecision::Retain(a.clone())
                }
            })
            .collect()
    }

    /// Remove every cached accessory not yet decided
    pub async fn remove_all(&self) -> Vec<ReconciliationDecision> {
        let mut decided = self.decided.lock().await;
        self.cached
            .iter()
            .filter(|a| decided.insert(a.uuid))
            .map(|a| ReconciliationDecision::Remove(a.clone()))
            .collect()
    }
}

fn decision_kind(decision: &ReconciliationDecision) -> &'static str {
    match decision {
        ReconciliationDecision::Restore(_) => "restore",
        ReconciliationDecision::Create(_) => "create",
        ReconciliationDecision::Remove(_) => "remove",
        ReconciliationDecision::Retain(_) => "retain",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapo_core::derive_uuid;

    fn device(seed: &str) -> CachedAccessory {
        CachedAccessory::new(
            derive_uuid(seed),
            seed,
            AccessoryContext::Device {
                name: seed.to_string(),
                session: None,
            },
        )
    }

    fn child(seed: &str, parent: &str) -> CachedAccessory {
        CachedAccessory::new(
            derive_uuid(seed),
            seed,
            AccessoryContext::Child {
                name: seed.to_string(),
                parent: derive_uuid(parent),
            },
        )
    }

    fn scope(configured: &[&str], children: &[&str]) -> PruneScope {
        PruneScope {
            configured: configured.iter().map(|s| derive_uuid(s)).collect(),
            discovered_children: children.iter().map(|s| derive_uuid(s)).collect(),
            unlisted_hubs: HashSet::new(),
        }
    }

    #[test]
    fn test_unconfigured_device_is_stale() {
        let scope = scope(&["aa:bb:cc:dd:ee:ff"], &[]);
        assert!(scope.is_stale(&device("11:22:33:44:55:66")));
        assert!(!scope.is_stale(&device("aa:bb:cc:dd:ee:ff")));
    }

    #[test]
    fn test_child_of_unconfigured_hub_is_stale() {
        let scope = scope(&["aa:bb:cc:dd:ee:ff"], &["child-1"]);
        assert!(scope.is_stale(&child("child-1", "11:22:33:44:55:66")));
    }

    #[test]
    fn test_undiscovered_child_of_live_hub_is_stale() {
        let scope = scope(&["hub"], &["child-1"]);
        assert!(!scope.is_stale(&child("child-1", "hub")));
        assert!(scope.is_stale(&child("child-2", "hub")));
    }

    #[test]
    fn test_children_of_unlisted_hub_are_kept() {
        let mut scope = scope(&["hub"], &[]);
        scope.unlisted_hubs.insert(derive_uuid("hub"));
        assert!(!scope.is_stale(&child("child-2", "hub")));
    }

    #[tokio::test]
    async fn test_claim_restore_and_create() {
        let planner = ReconciliationPlanner::new(vec![device("aa:bb:cc:dd:ee:ff")]);
        let context = AccessoryContext::Device {
            name: "Lamp".to_string(),
            session: None,
        };

        let restored = planner
            .claim(derive_uuid("aa:bb:cc:dd:ee:ff"), "Lamp", context.clone())
            .await
            .unwrap();
        match restored {
            ReconciliationDecision::Restore(a) => {
                assert_eq!(a.context.name(), "Lamp");
                assert_eq!(a.display_name, "aa:bb:cc:dd:ee:ff");
            }
            other => panic!("expected restore, got {other:?}"),
        }

        let created = planner.claim(derive_uuid("new"), "Plug", context).await.unwrap();
        assert!(matches!(created, ReconciliationDecision::Create(ref a) if a.display_name == "Plug"));
    }

    #[tokio::test]
    async fn test_second_claim_is_rejected_until_released() {
        let planner = ReconciliationPlanner::new(Vec::new());
        let uuid = derive_uuid("aa:bb:cc:dd:ee:ff");
        let context = AccessoryContext::Device {
            name: "Lamp".to_string(),
            session: None,
        };

        assert!(planner.claim(uuid, "Lamp", context.clone()).await.is_some());
        assert!(planner.claim(uuid, "Lamp", context.clone()).await.is_none());
        planner.release(uuid).await;
        assert!(planner.claim(uuid, "Lamp", context).await.is_some());
    }

    #[tokio::test]
    async fn test_finish_decides_each_cached_accessory_once() {
        let cached = vec![
            device("aa:bb:cc:dd:ee:ff"),
            device("11:22:33:44:55:66"),
            device("hub"),
            child("child-1", "hub"),
            child("child-2", "hub"),
        ];
        let planner = ReconciliationPlanner::new(cached);
        planner
            .claim(
                derive_uuid("aa:bb:cc:dd:ee:ff"),
                "Lamp",
                AccessoryContext::Device {
                    name: "Lamp".to_string(),
                    session: None,
                },
            )
            .await;

        let decisions = planner
            .finish(&scope(&["aa:bb:cc:dd:ee:ff", "hub"], &["child-1"]))
            .await;

        let removed: Vec<Uuid> = decisions
            .iter()
            .filter(|d| matches!(d, ReconciliationDecision::Remove(_)))
            .map(|d| d.uuid())
            .collect();
        let retained: Vec<Uuid> = decisions
            .iter()
            .filter(|d| matches!(d, ReconciliationDecision::Retain(_)))
            .map(|d| d.uuid())
            .collect();

        assert_eq!(decisions.len(), 4);
        assert_eq!(removed, vec![derive_uuid("11:22:33:44:55:66"), derive_uuid("child-2")]);
        assert_eq!(retained, vec![derive_uuid("hub"), derive_uuid("child-1")]);

        // A second finish has nothing left to decide
        assert!(planner.finish(&PruneScope::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_all() {
        let planner = ReconciliationPlanner::new(vec![device("a"), child("b", "a")]);
        let decisions = planner.remove_all().await;
        assert_eq!(decisions.len(), 2);
        assert!(decisions.iter().all(|d| matches!(d, ReconciliationDecision::Remove(_))));
    }
}
