//! Validation, routing, and response correlation for optimization commands.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use super::command::{
    BATTERY_ACTION_PREFIX, BATTERY_TARGET, BatteryAck, BatteryMode, BatteryStatusUpdate,
    CommandBody, CommandResponse, CommandResult, GRID_TARGET, OptimizationCommand,
    REQUEST_POWER, best_target,
};
use crate::audit::{AuditRecorder, EventKind};
use crate::error::DispatchError;
use crate::grid::GridLedger;
use crate::transport::{Transport, topics};

/// Issuer recorded on commands derived from battery status changes.
pub const DERIVED_ISSUER: &str = "battery-status";

/// Routes optimizer commands to the grid ledger and the battery stub.
///
/// Unlike the planners, every validation or routing failure is audited and
/// then returned to the caller.
pub struct CommandDispatcher {
    ledger: Arc<GridLedger>,
    audit: Arc<AuditRecorder>,
    transport: Arc<dyn Transport>,
    default_price_per_kwh: f64,
    derived_power_kw: f64,
}

impl CommandDispatcher {
    /// Creates a dispatcher.
    ///
    /// * `default_price_per_kwh` - price used for `REQUEST_POWER` purchases
    /// * `derived_power_kw` - magnitude of grid requests derived from battery status
    pub fn new(
        ledger: Arc<GridLedger>,
        audit: Arc<AuditRecorder>,
        transport: Arc<dyn Transport>,
        default_price_per_kwh: f64,
        derived_power_kw: f64,
    ) -> Self {
        Self {
            ledger,
            audit,
            transport,
            default_price_per_kwh,
            derived_power_kw,
        }
    }

    /// Handles a raw payload from the command topic and publishes the outcome.
    ///
    /// # Errors
    ///
    /// Returns the validation or routing error after it has been audited and
    /// published as a failure response.
    pub async fn handle_command(&self, payload: &[u8]) -> Result<CommandResult, DispatchError> {
        let raw: Value = serde_json::from_slice(payload).unwrap_or(Value::Null);
        let command_id = raw.get("id").and_then(Value::as_str).unwrap_or_default();

        let outcome = match OptimizationCommand::from_value(&raw) {
            Ok(command) => self.execute(&command).await,
            Err(err) => {
                let target = best_target(&raw);
                warn!(command_id, target, error = %err, "command rejected");
                self.audit
                    .error(
                        target,
                        EventKind::OptimizationCommand,
                        format!("Rejected optimization command: {err}"),
                    )
                    .await;
                Err(err)
            }
        };

        self.respond(command_id, &outcome).await;
        outcome
    }

    /// Routes a validated command, auditing any failure against its target.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` for a negative value
    /// - `InvalidBatteryAction` for an unknown battery mode or action
    /// - `UnknownTarget` for a target other than `grid` or `battery`
    /// - `MalformedCommand` for a grid action other than `REQUEST_POWER`
    pub async fn execute(
        &self,
        command: &OptimizationCommand,
    ) -> Result<CommandResult, DispatchError> {
        let routed = match command.target_device_id.as_str() {
            GRID_TARGET => self.request_power(command).await,
            BATTERY_TARGET => self.set_battery(command).await,
            other => Err(DispatchError::UnknownTarget(other.to_string())),
        };

        if let Err(err) = &routed {
            warn!(command_id = %command.id, target = %command.target_device_id, error = %err, "command failed");
            self.audit
                .error(
                    &command.target_device_id,
                    EventKind::OptimizationCommand,
                    format!("Command {} failed: {err}", command.id),
                )
                .await;
        }
        routed
    }

    async fn request_power(
        &self,
        command: &OptimizationCommand,
    ) -> Result<CommandResult, DispatchError> {
        let CommandBody {
            action,
            value,
            unit,
        } = &command.command;
        if action != REQUEST_POWER {
            return Err(DispatchError::MalformedCommand(format!(
                "unsupported grid action \"{action}\""
            )));
        }
        if *value < 0.0 {
            return Err(DispatchError::InvalidAmount { value: *value });
        }

        let result = self
            .ledger
            .buy(*value, self.default_price_per_kwh, None)
            .await;
        info!(command_id = %command.id, value, success = result.success, "grid power requested");
        self.audit
            .info(
                GRID_TARGET,
                EventKind::OptimizationCommand,
                format!(
                    "Command {}: requested {value}{unit} from grid at ${}/kWh",
                    command.id, self.default_price_per_kwh
                ),
            )
            .await;
        Ok(CommandResult::Grid(result))
    }

    async fn set_battery(
        &self,
        command: &OptimizationCommand,
    ) -> Result<CommandResult, DispatchError> {
        let CommandBody {
            action,
            value,
            unit,
        } = &command.command;
        let mode_name = action.strip_prefix(BATTERY_ACTION_PREFIX).ok_or_else(|| {
            DispatchError::InvalidBatteryAction(format!("unsupported battery action \"{action}\""))
        })?;
        if *value < 0.0 {
            return Err(DispatchError::InvalidAmount { value: *value });
        }
        let mode: BatteryMode = mode_name.parse()?;

        let message = format!("Battery set to {mode} at {value}{unit}");
        info!(command_id = %command.id, %mode, value, "battery command acknowledged");
        self.audit
            .info(BATTERY_TARGET, EventKind::OptimizationCommand, message.clone())
            .await;
        Ok(CommandResult::Battery(BatteryAck {
            mode,
            power: *value,
            unit: unit.clone(),
            message,
        }))
    }

    /// Reacts to a battery status change.
    ///
    /// Always audits the change. A move to `charging` or `discharging` derives
    /// a grid `REQUEST_POWER` command that runs through [`Self::execute`]; its
    /// failure is audited here and never propagated. Returns the derived
    /// command's response, if one was issued.
    pub async fn handle_battery_status(
        &self,
        update: &BatteryStatusUpdate,
    ) -> Option<CommandResponse> {
        info!(battery_id = %update.battery_id, old = %update.old_status, new = %update.new_status, "battery status changed");
        self.audit
            .info(
                &update.battery_id,
                EventKind::BatteryStatus,
                format!(
                    "Battery {} status changed from {} to {}",
                    update.battery_id, update.old_status, update.new_status
                ),
            )
            .await;

        let command = derive_grid_command(update, self.derived_power_kw)?;
        let outcome = self.execute(&command).await;
        if let Err(err) = &outcome {
            self.audit
                .error(
                    &update.battery_id,
                    EventKind::BatteryStatus,
                    format!(
                        "Derived grid command {} for battery {} failed: {err}",
                        command.id, update.battery_id
                    ),
                )
                .await;
        }
        self.respond(&command.id, &outcome).await;
        Some(CommandResponse::from_outcome(&command.id, &outcome))
    }

    async fn respond(&self, command_id: &str, outcome: &Result<CommandResult, DispatchError>) {
        let response = CommandResponse::from_outcome(command_id, outcome);
        let payload = match serde_json::to_vec(&response) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(command_id, error = %err, "failed to encode command response");
                return;
            }
        };
        if let Err(err) = self
            .transport
            .publish(topics::COMMANDS_RESPONSE, payload)
            .await
        {
            warn!(command_id, error = %err, "failed to publish command response");
        }
    }
}

/// Grid request implied by a battery status change: `+magnitude` when the
/// battery starts charging, `-magnitude` when it starts discharging.
pub fn derive_grid_command(
    update: &BatteryStatusUpdate,
    magnitude_kw: f64,
) -> Option<OptimizationCommand> {
    let value = match update.new_status.parse::<BatteryMode>().ok()? {
        BatteryMode::Charging => magnitude_kw,
        BatteryMode::Discharging => -magnitude_kw,
        BatteryMode::Idle => return None,
    };
    Some(OptimizationCommand {
        id: format!("derived-{}", Uuid::new_v4()),
        target_device_id: GRID_TARGET.to_string(),
        command: CommandBody {
            action: REQUEST_POWER.to_string(),
            value,
            unit: "kW".to_string(),
        },
        timestamp: Utc::now(),
        issued_by: Some(DERIVED_ISSUER.to_string()),
    })
}
