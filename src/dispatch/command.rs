//! Optimization-command wire types and validation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DispatchError;
use crate::grid::TransactionResult;

/// Target id addressing the grid connection.
pub const GRID_TARGET: &str = "grid";
/// Target id addressing the battery.
pub const BATTERY_TARGET: &str = "battery";
/// Grid action requesting power.
pub const REQUEST_POWER: &str = "REQUEST_POWER";
/// Prefix of battery mode actions, e.g. `SET_BATTERY_CHARGING`.
pub const BATTERY_ACTION_PREFIX: &str = "SET_BATTERY_";
/// Target reported when a malformed command carries no usable target id.
pub const UNKNOWN_TARGET: &str = "unknown";

/// Action, magnitude, and unit of a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandBody {
    pub action: String,
    pub value: f64,
    pub unit: String,
}

/// Validated instruction from the external optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationCommand {
    pub id: String,
    pub target_device_id: String,
    pub command: CommandBody,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_by: Option<String>,
}

impl OptimizationCommand {
    /// Validates a decoded JSON command.
    ///
    /// `id`, `targetDeviceId`, `command` (with `action` and numeric `value`) and
    /// `timestamp` are required. `timestamp` may be RFC 3339 or epoch
    /// milliseconds; `command.unit` defaults to `kW`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedCommand` naming the first missing or mistyped field.
    pub fn from_value(raw: &Value) -> Result<Self, DispatchError> {
        let id = required_str(raw, "id")?;
        let target_device_id = required_str(raw, "targetDeviceId")?;
        let body = raw
            .get("command")
            .filter(|c| c.is_object())
            .ok_or_else(|| missing("command"))?;
        let action = required_str(body, "action").map_err(|_| missing("command.action"))?;
        let value = body
            .get("value")
            .and_then(Value::as_f64)
            .ok_or_else(|| missing("command.value"))?;
        let unit = body
            .get("unit")
            .and_then(Value::as_str)
            .unwrap_or("kW")
            .to_string();
        let timestamp = raw
            .get("timestamp")
            .and_then(parse_timestamp)
            .ok_or_else(|| missing("timestamp"))?;
        let issued_by = raw
            .get("issuedBy")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self {
            id,
            target_device_id,
            command: CommandBody {
                action,
                value,
                unit,
            },
            timestamp,
            issued_by,
        })
    }
}

/// Best-available target id of a possibly malformed command.
pub fn best_target(raw: &Value) -> &str {
    raw.get("targetDeviceId")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_TARGET)
}

fn required_str(raw: &Value, field: &str) -> Result<String, DispatchError> {
    raw.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| missing(field))
}

fn missing(field: &str) -> DispatchError {
    DispatchError::MalformedCommand(format!("missing or invalid `{field}`"))
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}

/// Battery operating mode named by a `SET_BATTERY_<mode>` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatteryMode {
    Charging,
    Discharging,
    Idle,
}

impl BatteryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Charging => "charging",
            Self::Discharging => "discharging",
            Self::Idle => "idle",
        }
    }
}

impl fmt::Display for BatteryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatteryMode {
    type Err = DispatchError;

    /// Parses a mode case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "charging" => Ok(Self::Charging),
            "discharging" => Ok(Self::Discharging),
            "idle" => Ok(Self::Idle),
            _ => Err(DispatchError::InvalidBatteryAction(format!(
                "unsupported battery mode \"{s}\", expected charging, discharging or idle"
            ))),
        }
    }
}

/// Battery status change reported by the battery actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryStatusUpdate {
    pub battery_id: String,
    pub old_status: String,
    pub new_status: String,
}

/// Acknowledgment of a battery mode command. No actuation is performed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryAck {
    pub mode: BatteryMode,
    pub power: f64,
    pub unit: String,
    pub message: String,
}

/// Result of a successfully routed command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandResult {
    Grid(TransactionResult),
    Battery(BatteryAck),
}

/// Terminal outcome published on the command-response topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub command_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CommandResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    pub fn from_outcome(command_id: &str, outcome: &Result<CommandResult, DispatchError>) -> Self {
        match outcome {
            Ok(result) => Self {
                command_id: command_id.to_string(),
                success: true,
                result: Some(result.clone()),
                error: None,
            },
            Err(err) => Self {
                command_id: command_id.to_string(),
                success: false,
                result: None,
                error: Some(err.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn valid() -> Value {
        json!({
            "id": "cmd-1",
            "targetDeviceId": "grid",
            "command": { "action": "REQUEST_POWER", "value": 4.5, "unit": "kW" },
            "timestamp": "2026-10-18T12:00:00Z",
            "issuedBy": "optimizer"
        })
    }

    #[test]
    fn parses_complete_command() {
        let cmd = OptimizationCommand::from_value(&valid()).expect("command should validate");
        assert_eq!(cmd.id, "cmd-1");
        assert_eq!(cmd.target_device_id, "grid");
        assert_eq!(cmd.command.value, 4.5);
        assert_eq!(cmd.issued_by.as_deref(), Some("optimizer"));
    }

    #[test]
    fn accepts_epoch_millis_and_default_unit() {
        let raw = json!({
            "id": "cmd-2",
            "targetDeviceId": "battery",
            "command": { "action": "SET_BATTERY_IDLE", "value": 0 },
            "timestamp": 1_760_000_000_000_i64
        });
        let cmd = OptimizationCommand::from_value(&raw).expect("command should validate");
        assert_eq!(cmd.command.unit, "kW");
        assert_eq!(cmd.timestamp.timestamp_millis(), 1_760_000_000_000);
    }

    #[test]
    fn each_required_field_is_checked() {
        for field in ["id", "targetDeviceId", "command", "timestamp"] {
            let mut raw = valid();
            raw.as_object_mut().unwrap().remove(field);
            let err = OptimizationCommand::from_value(&raw).unwrap_err();
            assert!(
                matches!(&err, DispatchError::MalformedCommand(m) if m.contains(field)),
                "{field}: {err}"
            );
        }
    }

    #[test]
    fn best_target_falls_back_to_unknown() {
        assert_eq!(best_target(&valid()), "grid");
        assert_eq!(best_target(&json!({ "id": "x" })), UNKNOWN_TARGET);
        assert_eq!(best_target(&Value::Null), UNKNOWN_TARGET);
    }

    #[test]
    fn battery_mode_is_case_insensitive() {
        assert_eq!("CHARGING".parse::<BatteryMode>(), Ok(BatteryMode::Charging));
        assert_eq!("Idle".parse::<BatteryMode>(), Ok(BatteryMode::Idle));
        assert!(matches!(
            "TURBO".parse::<BatteryMode>(),
            Err(DispatchError::InvalidBatteryAction(_))
        ));
    }

    #[test]
    fn failure_response_carries_error_only() {
        let outcome = Err(DispatchError::UnknownTarget("toaster".into()));
        let json = serde_json::to_value(CommandResponse::from_outcome("c9", &outcome)).unwrap();
        assert_eq!(json["command_id"], "c9");
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "unknown target: toaster");
        assert!(json.get("result").is_none());
    }
}
