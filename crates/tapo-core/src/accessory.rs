//! Device kind classification and accessory class dispatch

use serde::{Deserialize, Serialize};
use std::fmt;

/// Accessory behaviour wired up for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessoryClass {
    LightBulb,
    Outlet,
    Hub,
    Button,
    Contact,
    MotionSensor,
}

impl fmt::Display for AccessoryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LightBulb => "LightBulb",
            Self::Outlet => "Outlet",
            Self::Hub => "Hub",
            Self::Button => "Button",
            Self::Contact => "Contact",
            Self::MotionSensor => "MotionSensor",
        };
        f.write_str(name)
    }
}

/// Kind of a top-level (network attached) device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    LightBulb,
    Outlet,
    Hub,
    Unknown,
}

impl DeviceKind {
    /// Classify from the reported device type, e.g. `SMART.TAPOBULB`
    pub fn classify(device_type: &str) -> Self {
        if device_type.contains("BULB") {
            Self::LightBulb
        } else if device_type.contains("PLUG") {
            Self::Outlet
        } else if device_type.contains("HUB") {
            Self::Hub
        } else {
            Self::Unknown
        }
    }

    pub fn accessory_class(self) -> Option<AccessoryClass> {
        match self {
            Self::LightBulb => Some(AccessoryClass::LightBulb),
            Self::Outlet => Some(AccessoryClass::Outlet),
            Self::Hub => Some(AccessoryClass::Hub),
            Self::Unknown => None,
        }
    }
}

/// Kind of a child device behind a hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChildKind {
    Button,
    Contact,
    MotionSensor,
    Unknown,
}

impl ChildKind {
    /// Classify from the reported type (`SMART.TAPOSENSOR`) and category
    pub fn classify(device_type: &str, category: &str) -> Self {
        if !device_type.contains("SENSOR") {
            return Self::Unknown;
        }

        if category.contains("button") {
            Self::Button
        } else if category.contains("contact-sensor") {
            Self::Contact
        } else if category.contains("motion-sensor") {
            Self::MotionSensor
        } else {
            Self::Unknown
        }
    }

    pub fn accessory_class(self) -> Option<AccessoryClass> {
        match self {
            Self::Button => Some(AccessoryClass::Button),
            Self::Contact => Some(AccessoryClass::Contact),
            Self::MotionSensor => Some(AccessoryClass::MotionSensor),
            Self::Unknown => None,
        }
    }
}
