//! Accessory cache and registration seam owned by the host

use std::fmt;
use tapo_session::SessionHandle;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Failed to register {uuid}: {reason}")]
    Register { uuid: Uuid, reason: String },
    #[error("Failed to unregister {uuid}: {reason}")]
    Unregister { uuid: Uuid, reason: String },
    #[error("Failed to update {uuid}: {reason}")]
    Update { uuid: Uuid, reason: String },
}

/// Per-accessory context persisted by the host
#[derive(Clone)]
pub enum AccessoryContext {
    /// A network attached device
    Device {
        name: String,
        /// Not persisted across restarts
        session: Option<SessionHandle>,
    },
    /// A device behind a hub
    Child { name: String, parent: Uuid },
}

impl AccessoryContext {
    pub fn name(&self) -> &str {
        match self {
            Self::Device { name, .. } | Self::Child { name, .. } => name,
        }
    }

    pub fn is_child(&self) -> bool {
        matches!(self, Self::Child { .. })
    }

    pub fn parent(&self) -> Option<Uuid> {
        match self {
            Self::Child { parent, .. } => Some(*parent),
            Self::Device { .. } => None,
        }
    }
}

impl fmt::Debug for AccessoryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device { name, session } => f
                .debug_struct("Device")
                .field("name", name)
                .field("session", &session.is_some())
                .finish(),
            Self::Child { name, parent } => f
                .debug_struct("Child")
                .field("name", name)
                .field("parent", parent)
                .finish(),
        }
    }
}

/// An accessory as known to the host's cache
#[derive(Debug, Clone)]
pub struct CachedAccessory {
    pub uuid: Uuid,
    pub display_name: String,
    pub context: AccessoryContext,
}

impl CachedAccessory {
    pub fn new(uuid: Uuid, display_name: impl Into<String>, context: AccessoryContext) -> Self {
        Self {
            uuid,
            display_name: display_name.into(),
            context,
        }
    }
}

/// The host platform that owns the accessory cache
pub trait AccessoryHost: Send + Sync {
    /// Accessories restored from the host's cache
    fn cached_accessories(&self) -> Vec<CachedAccessory>;

    fn register(&self, accessories: &[CachedAccessory]) -> Result<(), HostError>;

    fn unregister(&self, accessories: &[CachedAccessory]) -> Result<(), HostError>;

    /// Persist context changes of restored accessories
    fn update(&self, _accessories: &[CachedAccessory]) -> Result<(), HostError> {
        Ok(())
    }
}
