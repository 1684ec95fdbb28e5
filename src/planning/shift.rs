//! Load shifting: delay and optionally throttle non-critical loads of given types.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{CommandAction, SYSTEM_DEVICE_ID, by_shedding_order};
use crate::audit::{AuditRecorder, EventKind};
use crate::devices::{DeviceDirectory, DeviceFilter, DeviceState, DeviceType, DeviceUpdate};
use crate::error::PlanError;
use crate::policy::PriorityPolicy;

/// Lowest priority level ever considered for shifting.
const MIN_SHIFT_PRIORITY: u8 = 2;

/// Which loads to shift and by how much.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftRequest {
    pub device_types: Vec<DeviceType>,
    pub delay_minutes: f64,
    /// Percentage of the rating to shave off, in `[0, 100]`.
    #[serde(default)]
    pub reduction_percent: Option<f64>,
}

/// Instruction to delay (and possibly throttle) one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftCommand {
    pub device_id: String,
    pub action: CommandAction,
    pub delay_minutes: f64,
    pub power_reduction_watts: f64,
    pub priority: u8,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of one shifting pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadShiftingResult {
    pub success: bool,
    pub devices_shifted: usize,
    pub shift_commands: Vec<ShiftCommand>,
}

/// Plans and applies load shifting against the shared device directory.
pub struct LoadShifter {
    policy: Arc<PriorityPolicy>,
    directory: Arc<dyn DeviceDirectory>,
    audit: Arc<AuditRecorder>,
}

impl LoadShifter {
    pub fn new(
        policy: Arc<PriorityPolicy>,
        directory: Arc<dyn DeviceDirectory>,
        audit: Arc<AuditRecorder>,
    ) -> Self {
        Self {
            policy,
            directory,
            audit,
        }
    }

    /// Emits a shift command for every eligible device of the requested types.
    ///
    /// Priority-1 devices are excluded by the directory query itself. With a
    /// positive `reduction_percent` the device moves `on -> standby` and its
    /// rating drops by that share; without one the command is a pure delay
    /// signal and the device record is left untouched.
    ///
    /// # Errors
    ///
    /// - `InvalidTarget` if the delay is negative or the percentage is outside `[0, 100]`
    /// - `DirectoryUnavailable` if the directory query or update fails
    /// - `PolicyViolation` if a candidate carries a level outside `1..=5`
    pub async fn shift(&self, request: &ShiftRequest) -> Result<LoadShiftingResult, PlanError> {
        validate(request)?;

        let filter = DeviceFilter::controllable_on()
            .of_types(&request.device_types)
            .min_priority(MIN_SHIFT_PRIORITY);
        let mut candidates = self.directory.find_candidates(&filter).await?;
        candidates.sort_by(by_shedding_order);

        let rules = candidates
            .iter()
            .map(|d| self.policy.capabilities_for(d.priority_level))
            .collect::<Result<Vec<_>, _>>()?;

        let percent = request.reduction_percent.filter(|p| *p > 0.0);
        let mut shift_commands = Vec::new();

        for (device, rule) in candidates.iter().zip(rules) {
            if !rule.can_shift {
                debug!(device_id = %device.id, priority = device.priority_level, "not shiftable");
                continue;
            }

            let power_reduction_watts =
                percent.map_or(0.0, |p| device.power_rating_watts * p / 100.0);

            if percent.is_some() {
                let update = DeviceUpdate {
                    state: DeviceState::Standby,
                    power_reduction_watts: Some(power_reduction_watts),
                };
                let applied = self
                    .directory
                    .conditional_update(&device.id, DeviceState::On, update)
                    .await?;
                if !applied {
                    warn!(device_id = %device.id, "device changed state during shifting, skipped");
                    continue;
                }
            }

            info!(
                device_id = %device.id,
                delay_minutes = request.delay_minutes,
                power_reduction_watts,
                "shift command issued"
            );
            shift_commands.push(ShiftCommand {
                device_id: device.id.clone(),
                action: CommandAction::Shift,
                delay_minutes: request.delay_minutes,
                power_reduction_watts,
                priority: device.priority_level,
                timestamp: Utc::now(),
            });
        }

        let affected: Vec<&str> = shift_commands.iter().map(|c| c.device_id.as_str()).collect();
        self.audit
            .info(
                SYSTEM_DEVICE_ID,
                EventKind::LoadShift,
                format!(
                    "Load shifting initiated. Delay: {}min, Reduction: {}%, Devices affected: {}",
                    request.delay_minutes,
                    request.reduction_percent.unwrap_or(0.0),
                    affected.join(", ")
                ),
            )
            .await;

        Ok(LoadShiftingResult {
            success: !shift_commands.is_empty(),
            devices_shifted: shift_commands.len(),
            shift_commands,
        })
    }
}

fn validate(request: &ShiftRequest) -> Result<(), PlanError> {
    if !request.delay_minutes.is_finite() || request.delay_minutes < 0.0 {
        return Err(PlanError::InvalidTarget(format!(
            "delayMinutes must be a finite number >= 0, got {}",
            request.delay_minutes
        )));
    }
    if let Some(p) = request.reduction_percent {
        if !(0.0..=100.0).contains(&p) {
            return Err(PlanError::InvalidTarget(format!(
                "reductionPercent must be in [0, 100], got {p}"
            )));
        }
    }
    Ok(())
}
