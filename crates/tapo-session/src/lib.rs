//! Tapo Session - Session client seam for device queries
//!
//! This crate defines the interface discovery uses to authenticate with a
//! located device and query its information and child devices.

pub mod client;
pub mod info;

pub use client::{Credentials, Session, SessionClient, SessionError, SessionHandle};
pub use info::{decode_nickname, ChildInfo, DeviceInfo, NO_NAME_NICKNAME};
