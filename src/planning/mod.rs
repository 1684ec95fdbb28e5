pub mod shed;
pub mod shift;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::devices::Device;

pub use shed::{LoadShedder, LoadSheddingResult, ShedCommand};
pub use shift::{LoadShiftingResult, LoadShifter, ShiftCommand, ShiftRequest};

/// Audit device id for planner summaries.
pub const SYSTEM_DEVICE_ID: &str = "system";

/// Action carried by a planning command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandAction {
    Off,
    Shift,
}

/// Least critical first; ties broken by ascending id so passes are reproducible.
fn by_shedding_order(a: &Device, b: &Device) -> Ordering {
    b.priority_level
        .cmp(&a.priority_level)
        .then_with(|| a.id.cmp(&b.id))
}
