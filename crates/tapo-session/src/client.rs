//! Session client seam used by discovery

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tapo_core::DeviceHandle;
use thiserror::Error;

use crate::info::{ChildInfo, DeviceInfo};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session setup failed for {ip}: {reason}")]
    Setup { ip: String, reason: String },
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

/// Account credentials used to authenticate with devices
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An authenticated session with one device
#[async_trait]
pub trait Session: Send + Sync {
    /// Fetch device information; `Ok(None)` for an empty response
    async fn get_info(&self) -> Result<Option<DeviceInfo>, SessionError>;

    /// List child devices (hubs only)
    async fn get_child_devices(&self) -> Result<Vec<ChildInfo>, SessionError>;
}

pub type SessionHandle = Arc<dyn Session>;

/// Establishes sessions with located devices.
///
/// The session receives the shared device handle rather than an IP so it
/// can follow address changes through [`tapo_core::ManagedDevice::refresh`].
#[async_trait]
pub trait SessionClient: Send + Sync {
    async fn setup(&self, device: DeviceHandle, credentials: &Credentials) -> Result<SessionHandle, SessionError>;
}
