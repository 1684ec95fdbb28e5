//! Load shedding: turn off the least critical loads until a reduction target is met.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{CommandAction, SYSTEM_DEVICE_ID, by_shedding_order};
use crate::audit::{AuditRecorder, EventKind};
use crate::devices::{DeviceDirectory, DeviceFilter, DeviceState, DeviceUpdate};
use crate::error::PlanError;
use crate::policy::PriorityPolicy;

/// Instruction to turn one device off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShedCommand {
    pub device_id: String,
    pub action: CommandAction,
    pub expected_reduction_watts: f64,
    pub priority: u8,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of one shedding pass. `success == false` is a normal result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSheddingResult {
    pub success: bool,
    #[serde(rename = "remainingReductionNeededKW")]
    pub remaining_reduction_needed_kw: f64,
    pub shed_commands: Vec<ShedCommand>,
}

/// Plans and applies load shedding against the shared device directory.
pub struct LoadShedder {
    policy: Arc<PriorityPolicy>,
    directory: Arc<dyn DeviceDirectory>,
    audit: Arc<AuditRecorder>,
}

impl LoadShedder {
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

    /// Sheds controllable, running devices until `target_reduction_kw` is covered.
    ///
    /// Candidates are walked least-critical first (priority descending, then id
    /// ascending). A device whose conditional `on -> off` update loses a race
    /// is skipped and does not count towards the reduction.
    ///
    /// # Errors
    ///
    /// - `InvalidTarget` if the target is not a finite number > 0
    /// - `DirectoryUnavailable` if the directory query or update fails
    /// - `PolicyViolation` if a candidate carries a level outside `1..=5`
    pub async fn shed(&self, target_reduction_kw: f64) -> Result<LoadSheddingResult, PlanError> {
        if !target_reduction_kw.is_finite() || target_reduction_kw <= 0.0 {
            return Err(PlanError::InvalidTarget(format!(
                "targetReductionKW must be a finite number > 0, got {target_reduction_kw}"
            )));
        }

        let mut candidates = self
            .directory
            .find_candidates(&DeviceFilter::controllable_on())
            .await?;
        candidates.sort_by(by_shedding_order);

        // Resolve every rule before the first update so a bad level leaves the
        // directory untouched.
        let rules = candidates
            .iter()
            .map(|d| self.policy.capabilities_for(d.priority_level))
            .collect::<Result<Vec<_>, _>>()?;

        // Whole milliwatts: an exact fit must leave no remainder.
        let target_mw = to_milliwatts(target_reduction_kw * 1000.0);
        let mut remaining_mw = target_mw;
        let mut shed_commands = Vec::new();

        for (device, rule) in candidates.iter().zip(rules) {
            if remaining_mw <= 0 {
                break;
            }

            if !rule.can_shed {
                debug!(device_id = %device.id, priority = device.priority_level, "not sheddable");
                continue;
            }

            let applied = self
                .directory
                .conditional_update(
                    &device.id,
                    DeviceState::On,
                    DeviceUpdate::to_state(DeviceState::Off),
                )
                .await?;
            if !applied {
                warn!(device_id = %device.id, "device changed state during shedding, skipped");
                continue;
            }

            let command = ShedCommand {
                device_id: device.id.clone(),
                action: CommandAction::Off,
                expected_reduction_watts: device.power_rating_watts,
                priority: device.priority_level,
                timestamp: Utc::now(),
            };
            info!(
                device_id = %command.device_id,
                watts = command.expected_reduction_watts,
                priority = command.priority,
                max_minutes = ?rule.max_shed_duration_minutes,
                "shed command issued"
            );
            remaining_mw -= to_milliwatts(device.power_rating_watts);
            shed_commands.push(command);
        }

        let achieved_kw = kilowatts(target_mw - remaining_mw);
        let affected: Vec<&str> = shed_commands.iter().map(|c| c.device_id.as_str()).collect();
        self.audit
            .info(
                SYSTEM_DEVICE_ID,
                EventKind::LoadShed,
                format!(
                    "Load shedding initiated. Target: {target_reduction_kw}kW, Actual: {achieved_kw}kW, Devices affected: {}",
                    affected.join(", ")
                ),
            )
            .await;

        Ok(LoadSheddingResult {
            success: remaining_mw <= 0,
            remaining_reduction_needed_kw: kilowatts(remaining_mw.max(0)),
            shed_commands,
        })
    }
}

fn to_milliwatts(watts: f64) -> i64 {
    (watts * 1000.0).round() as i64
}

fn kilowatts(milliwatts: i64) -> f64 {
    milliwatts as f64 / 1_000_000.0
}
