//! Device records as held by the device directory.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed enumeration of load categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Lighting,
    Hvac,
    Computers,
    Kitchen,
    LabEquipment,
    Other,
}

/// Operating state of a controllable load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    On,
    Off,
    Standby,
}

impl DeviceState {
    /// Returns the wire name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Standby => "standby",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One physical, possibly controllable, load.
///
/// Priority level 1 is the most critical and is never shed or shifted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Stable unique identifier.
    pub id: String,
    /// Load category.
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    /// Present rated draw in watts (non-negative, reduced by shifting).
    pub power_rating_watts: f64,
    /// Criticality rank, 1 (most critical) to 5.
    pub priority_level: u8,
    /// Whether the core may act on this device at all.
    pub controllable: bool,
    /// Current operating state.
    pub current_state: DeviceState,
    /// Time of the last state or rating change.
    pub last_updated: DateTime<Utc>,
}

impl Device {
    /// Creates a controllable device that is currently on.
    pub fn new(
        id: impl Into<String>,
        device_type: DeviceType,
        power_rating_watts: f64,
        priority_level: u8,
    ) -> Self {
        Self {
            id: id.into(),
            device_type,
            power_rating_watts,
            priority_level,
            controllable: true,
            current_state: DeviceState::On,
            last_updated: Utc::now(),
        }
    }

    /// Returns the device with a different operating state.
    pub fn with_state(mut self, state: DeviceState) -> Self {
        self.current_state = state;
        self
    }

    /// Returns the device with a different controllable flag.
    pub fn with_controllable(mut self, controllable: bool) -> Self {
        self.controllable = controllable;
        self
    }
}
