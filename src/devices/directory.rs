//! Query-and-conditional-update port onto the device store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::types::{Device, DeviceState, DeviceType};
use crate::error::DirectoryError;

/// Candidate selection criteria. Unset fields match every device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceFilter {
    pub controllable: Option<bool>,
    pub state: Option<DeviceState>,
    pub device_types: Option<Vec<DeviceType>>,
    pub min_priority: Option<u8>,
}

impl DeviceFilter {
    /// Filter matching controllable devices that are currently on.
    pub fn controllable_on() -> Self {
        Self {
            controllable: Some(true),
            state: Some(DeviceState::On),
            ..Self::default()
        }
    }

    /// Restricts the filter to the given load categories.
    pub fn of_types(mut self, types: &[DeviceType]) -> Self {
        self.device_types = Some(types.to_vec());
        self
    }

    /// Restricts the filter to priority levels `>= level`.
    pub fn min_priority(mut self, level: u8) -> Self {
        self.min_priority = Some(level);
        self
    }

    /// Returns `true` when `device` satisfies every set criterion.
    pub fn matches(&self, device: &Device) -> bool {
        self.controllable.is_none_or(|c| device.controllable == c)
            && self.state.is_none_or(|s| device.current_state == s)
            && self
                .device_types
                .as_ref()
                .is_none_or(|types| types.contains(&device.device_type))
            && self
                .min_priority
                .is_none_or(|level| device.priority_level >= level)
    }
}

/// Mutation applied by a successful conditional update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceUpdate {
    /// New operating state.
    pub state: DeviceState,
    /// Watts to subtract from the rating, floored at zero.
    pub power_reduction_watts: Option<f64>,
}

impl DeviceUpdate {
    /// State-only transition.
    pub fn to_state(state: DeviceState) -> Self {
        Self {
            state,
            power_reduction_watts: None,
        }
    }
}

/// Store of device records shared by every planner and handler.
///
/// Every mutation is a compare-and-swap on `current_state` so that racing
/// planning passes cannot both act on the same device.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Returns all devices matching `filter`, in no guaranteed order.
    async fn find_candidates(&self, filter: &DeviceFilter) -> Result<Vec<Device>, DirectoryError>;

    /// Applies `update` only if the device exists and is still in `expected`.
    ///
    /// Returns `Ok(false)` when the precondition no longer holds.
    async fn conditional_update(
        &self,
        id: &str,
        expected: DeviceState,
        update: DeviceUpdate,
    ) -> Result<bool, DirectoryError>;
}

/// In-process directory backed by an ordered map.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    devices: RwLock<BTreeMap<String, Device>>,
}

impl MemoryDirectory {
    /// Creates a directory seeded with `devices`; later duplicates replace earlier ones.
    pub fn new(devices: impl IntoIterator<Item = Device>) -> Self {
        let devices = devices.into_iter().map(|d| (d.id.clone(), d)).collect();
        Self {
            devices: RwLock::new(devices),
        }
    }

    /// Returns a copy of the device with `id`, if present.
    pub async fn get(&self, id: &str) -> Option<Device> {
        self.devices.read().await.get(id).cloned()
    }

    /// Returns copies of every device ordered by id.
    pub async fn all(&self) -> Vec<Device> {
        self.devices.read().await.values().cloned().collect()
    }

    /// Inserts or replaces a device record.
    pub async fn upsert(&self, device: Device) {
        self.devices.write().await.insert(device.id.clone(), device);
    }
}

#[async_trait]
impl DeviceDirectory for MemoryDirectory {
    async fn find_candidates(&self, filter: &DeviceFilter) -> Result<Vec<Device>, DirectoryError> {
        let devices = self.devices.read().await;
        Ok(devices.values().filter(|d| filter.matches(d)).cloned().collect())
    }

    async fn conditional_update(
        &self,
        id: &str,
        expected: DeviceState,
        update: DeviceUpdate,
    ) -> Result<bool, DirectoryError> {
        let mut devices = self.devices.write().await;
        let Some(device) = devices.get_mut(id) else {
            return Ok(false);
        };
        if device.current_state != expected {
            return Ok(false);
        }

        device.current_state = update.state;
        if let Some(reduction) = update.power_reduction_watts {
            device.power_rating_watts = (device.power_rating_watts - reduction).max(0.0);
        }
        device.last_updated = Utc::now();
        Ok(true)
    }
}
