//! TOML-based service configuration and preset definitions.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::audit::ErrorEncoding;
use crate::devices::{Device, DeviceState, DeviceType};
use crate::grid::GridStatusSnapshot;
use crate::policy::{PriorityPolicy, PriorityRule};

/// Top-level service configuration parsed from TOML.
///
/// All sections have defaults. Load from TOML with
/// [`ServiceConfig::from_toml_file`] or use [`ServiceConfig::campus`] for the
/// built-in demo fleet.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Transport client and error-channel settings.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Grid connection and tariff figures.
    #[serde(default)]
    pub grid: GridConfig,
    /// Command dispatcher parameters.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Optional override of the priority table, one entry per level.
    #[serde(default)]
    pub priority: Vec<PriorityLevelConfig>,
    /// Seed fleet for the in-memory device directory.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// TCP port the API binds on all interfaces.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3002 }
    }
}

/// Transport client and error-channel settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    /// Prefix of the randomly suffixed client id.
    pub client_id_prefix: String,
    /// Encoding of records published on the error channel.
    pub error_encoding: ErrorEncoding,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            client_id_prefix: "demand-response".to_string(),
            error_encoding: ErrorEncoding::Binary,
        }
    }
}

/// Grid connection and tariff figures.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    pub connected: bool,
    /// Energy the grid can currently supply (kWh).
    pub available_capacity_kwh: f64,
    pub buy_rate_per_kwh: f64,
    pub sell_rate_per_kwh: f64,
    /// Price attached to dispatched `REQUEST_POWER` purchases.
    pub default_price_per_kwh: f64,
    /// Minutes a completed or failed transaction stays queryable.
    pub settled_retention_minutes: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            connected: true,
            available_capacity_kwh: 1000.0,
            buy_rate_per_kwh: 0.15,
            sell_rate_per_kwh: 0.12,
            default_price_per_kwh: 0.15,
            settled_retention_minutes: 24 * 60,
        }
    }
}

/// Command dispatcher parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Magnitude (kW) of grid requests derived from battery status changes.
    pub derived_power_kw: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            derived_power_kw: 5.0,
        }
    }
}

/// One row of a priority-table override.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PriorityLevelConfig {
    /// Level in `1..=5`.
    pub level: u8,
    #[serde(default)]
    pub description: String,
    pub can_shed: bool,
    pub can_shift: bool,
    #[serde(default)]
    pub max_shed_duration_minutes: Option<u32>,
}

/// One seeded device.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub power_rating_watts: f64,
    pub priority_level: u8,
    #[serde(default = "default_controllable")]
    pub controllable: bool,
    #[serde(default = "default_state")]
    pub state: DeviceState,
}

fn default_controllable() -> bool {
    true
}

fn default_state() -> DeviceState {
    DeviceState::On
}

impl DeviceConfig {
    fn seed(id: &str, device_type: DeviceType, watts: f64, priority_level: u8) -> Self {
        Self {
            id: id.to_string(),
            device_type,
            power_rating_watts: watts,
            priority_level,
            controllable: true,
            state: DeviceState::On,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"devices[2].priority_level"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl ServiceConfig {
    /// Demo campus fleet with one device at each interesting priority level.
    pub fn campus() -> Self {
        Self {
            devices: vec![
                DeviceConfig::seed("critical-001", DeviceType::Computers, 2000.0, 1),
                DeviceConfig::seed("hvac-001", DeviceType::Hvac, 3000.0, 3),
                DeviceConfig::seed("light-001", DeviceType::Lighting, 500.0, 4),
                DeviceConfig::seed("decor-001", DeviceType::Lighting, 200.0, 5),
            ],
            ..Self::default()
        }
    }

    /// Defaults with no seeded devices.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["campus", "empty"];

    /// Loads a configuration from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "campus" => Ok(Self::campus()),
            "empty" => Ok(Self::empty()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("config", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.transport.client_id_prefix.trim().is_empty() {
            errors.push(ConfigError::new(
                "transport.client_id_prefix",
                "must not be empty",
            ));
        }

        let g = &self.grid;
        for (field, value) in [
            ("grid.available_capacity_kwh", g.available_capacity_kwh),
            ("grid.buy_rate_per_kwh", g.buy_rate_per_kwh),
            ("grid.sell_rate_per_kwh", g.sell_rate_per_kwh),
        ] {
            if !value.is_finite() || value < 0.0 {
                errors.push(ConfigError::new(field, "must be a finite number >= 0"));
            }
        }
        if !g.default_price_per_kwh.is_finite() || g.default_price_per_kwh <= 0.0 {
            errors.push(ConfigError::new(
                "grid.default_price_per_kwh",
                "must be a finite number > 0",
            ));
        }

        let d = self.dispatch.derived_power_kw;
        if !d.is_finite() || d <= 0.0 {
            errors.push(ConfigError::new(
                "dispatch.derived_power_kw",
                "must be a finite number > 0",
            ));
        }

        if !self.priority.is_empty() {
            self.validate_priority(&mut errors);
        }

        let mut seen = HashSet::new();
        for (i, dev) in self.devices.iter().enumerate() {
            if dev.id.trim().is_empty() {
                errors.push(ConfigError::new(format!("devices[{i}].id"), "must not be empty"));
            } else if !seen.insert(dev.id.as_str()) {
                errors.push(ConfigError::new(
                    format!("devices[{i}].id"),
                    format!("duplicate device id \"{}\"", dev.id),
                ));
            }
            if !PriorityPolicy::is_valid_level(dev.priority_level) {
                errors.push(ConfigError::new(
                    format!("devices[{i}].priority_level"),
                    format!("must be in 1..=5, got {}", dev.priority_level),
                ));
            }
            if !dev.power_rating_watts.is_finite() || dev.power_rating_watts < 0.0 {
                errors.push(ConfigError::new(
                    format!("devices[{i}].power_rating_watts"),
                    "must be a finite number >= 0",
                ));
            }
        }

        errors
    }

    fn validate_priority(&self, errors: &mut Vec<ConfigError>) {
        let mut seen = [false; 5];
        for (i, row) in self.priority.iter().enumerate() {
            if !PriorityPolicy::is_valid_level(row.level) {
                errors.push(ConfigError::new(
                    format!("priority[{i}].level"),
                    format!("must be in 1..=5, got {}", row.level),
                ));
                continue;
            }
            let slot = &mut seen[usize::from(row.level - 1)];
            if *slot {
                errors.push(ConfigError::new(
                    format!("priority[{i}].level"),
                    format!("level {} is defined more than once", row.level),
                ));
            }
            *slot = true;
            if row.level == PriorityPolicy::MOST_CRITICAL && (row.can_shed || row.can_shift) {
                errors.push(ConfigError::new(
                    format!("priority[{i}]"),
                    "level 1 must not allow shedding or shifting",
                ));
            }
        }
        for (idx, present) in seen.iter().enumerate() {
            if !present {
                errors.push(ConfigError::new(
                    "priority",
                    format!("missing entry for level {}", idx + 1),
                ));
            }
        }
    }

    /// Priority table to run with: the override if present, else the default.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the resulting level-1 rule would allow
    /// shedding or shifting.
    pub fn priority_policy(&self) -> Result<PriorityPolicy, ConfigError> {
        if self.priority.is_empty() {
            return Ok(PriorityPolicy::standard());
        }
        let mut rules = PriorityPolicy::standard().rules().clone();
        for row in &self.priority {
            if let Some(rule) = rules.get_mut(usize::from(row.level).wrapping_sub(1)) {
                *rule = PriorityRule {
                    description: row.description.clone(),
                    can_shed: row.can_shed,
                    can_shift: row.can_shift,
                    max_shed_duration_minutes: row.max_shed_duration_minutes,
                };
            }
        }
        PriorityPolicy::new(rules).map_err(|_| {
            ConfigError::new("priority", "level 1 must not allow shedding or shifting")
        })
    }

    /// Device records for the in-memory directory.
    pub fn seed_devices(&self) -> Vec<Device> {
        self.devices
            .iter()
            .map(|d| {
                Device::new(d.id.clone(), d.device_type, d.power_rating_watts, d.priority_level)
                    .with_controllable(d.controllable)
                    .with_state(d.state)
            })
            .collect()
    }

    /// Grid snapshot served while no live telemetry is wired in.
    pub fn grid_snapshot(&self) -> GridStatusSnapshot {
        GridStatusSnapshot {
            connected: self.grid.connected,
            available_capacity: self.grid.available_capacity_kwh,
            current_buy_rate: self.grid.buy_rate_per_kwh,
            current_sell_rate: self.grid.sell_rate_per_kwh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_priority_table() -> &'static str {
        r#"
[[priority]]
level = 1
description = "life safety"
can_shed = false
can_shift = false

[[priority]]
level = 2
can_shed = false
can_shift = false

[[priority]]
level = 3
can_shed = true
can_shift = true
max_shed_duration_minutes = 15

[[priority]]
level = 4
can_shed = true
can_shift = true

[[priority]]
level = 5
can_shed = true
can_shift = true
"#
    }

    #[test]
    fn campus_preset_valid() {
        let errors = ServiceConfig::campus().validate();
        assert!(errors.is_empty(), "campus should be valid: {errors:?}");
    }

    #[test]
    fn all_presets_are_valid() {
        for name in ServiceConfig::PRESETS {
            let cfg = ServiceConfig::from_preset(name);
            assert!(cfg.is_ok(), "preset \"{name}\" should load");
            let errors = cfg.as_ref().map(|c| c.validate()).unwrap_or_default();
            assert!(errors.is_empty(), "preset \"{name}\" should be valid: {errors:?}");
        }
    }

    #[test]
    fn from_preset_unknown() {
        let err = ServiceConfig::from_preset("nonexistent").unwrap_err();
        assert!(err.message.contains("unknown preset"));
    }

    #[test]
    fn campus_seeds_four_devices() {
        let devices = ServiceConfig::campus().seed_devices();
        let ids: Vec<&str> = devices.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["critical-001", "hvac-001", "light-001", "decor-001"]);
        assert!(devices.iter().all(|d| d.controllable));
        assert!(devices.iter().all(|d| d.current_state == DeviceState::On));
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[server]
port = 8080

[transport]
client_id_prefix = "dr-test"
error_encoding = "json"

[grid]
connected = false
available_capacity_kwh = 250.0
buy_rate_per_kwh = 0.2
sell_rate_per_kwh = 0.1
default_price_per_kwh = 0.18
settled_retention_minutes = 30

[dispatch]
derived_power_kw = 2.5

[[devices]]
id = "pump-1"
type = "lab_equipment"
power_rating_watts = 750.0
priority_level = 2

[[devices]]
id = "sign-1"
type = "lighting"
power_rating_watts = 90.0
priority_level = 5
state = "off"
"#;
        let cfg = ServiceConfig::from_toml_str(toml).expect("valid TOML should parse");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.transport.error_encoding, ErrorEncoding::Json);
        assert!(!cfg.grid_snapshot().connected);
        assert_eq!(cfg.grid.settled_retention_minutes, 30);
        assert_eq!(cfg.dispatch.derived_power_kw, 2.5);
        assert_eq!(cfg.devices.len(), 2);
        assert_eq!(cfg.devices[0].device_type, DeviceType::LabEquipment);
        assert_eq!(cfg.devices[1].state, DeviceState::Off);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg = ServiceConfig::from_toml_str("[server]\nport = 9000\n").unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.transport.client_id_prefix, "demand-response");
        assert_eq!(cfg.grid.buy_rate_per_kwh, 0.15);
        assert_eq!(cfg.grid.settled_retention_minutes, 1440);
        assert_eq!(cfg.dispatch.derived_power_kw, 5.0);
        assert!(cfg.devices.is_empty());
    }

    #[test]
    fn invalid_toml_unknown_field() {
        let result = ServiceConfig::from_toml_str("[grid]\nbogus_field = true\n");
        assert!(result.is_err());
    }

    #[test]
    fn validation_catches_bad_devices() {
        let mut cfg = ServiceConfig::campus();
        cfg.devices[1].id = "critical-001".into();
        cfg.devices[2].priority_level = 9;
        cfg.devices[3].power_rating_watts = -1.0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "devices[1].id"));
        assert!(errors.iter().any(|e| e.field == "devices[2].priority_level"));
        assert!(errors.iter().any(|e| e.field == "devices[3].power_rating_watts"));
    }

    #[test]
    fn validation_catches_bad_dispatch_magnitude() {
        let mut cfg = ServiceConfig::empty();
        cfg.dispatch.derived_power_kw = 0.0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "dispatch.derived_power_kw"));
    }

    #[test]
    fn priority_override_replaces_table() {
        let cfg = ServiceConfig::from_toml_str(full_priority_table()).unwrap();
        assert!(cfg.validate().is_empty());
        let policy = cfg.priority_policy().expect("override is valid");
        assert!(!policy.capabilities_for(2).unwrap().can_shift);
        assert_eq!(
            policy.capabilities_for(3).unwrap().max_shed_duration_minutes,
            Some(15)
        );
        assert_eq!(policy.capabilities_for(1).unwrap().description, "life safety");
    }

    #[test]
    fn priority_override_must_protect_level_one() {
        let toml = full_priority_table().replacen("can_shed = false", "can_shed = true", 1);
        let cfg = ServiceConfig::from_toml_str(&toml).unwrap();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "priority[0]"));
        assert!(cfg.priority_policy().is_err());
    }

    #[test]
    fn incomplete_priority_override_is_rejected() {
        let toml = r#"
[[priority]]
level = 1
can_shed = false
can_shift = false

[[priority]]
level = 1
can_shed = false
can_shift = false
"#;
        let cfg = ServiceConfig::from_toml_str(toml).unwrap();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.message.contains("more than once")));
        assert_eq!(
            errors
                .iter()
                .filter(|e| e.message.starts_with("missing entry"))
                .count(),
            4
        );
    }

    #[test]
    fn no_override_means_standard_policy() {
        assert_eq!(
            ServiceConfig::campus().priority_policy().unwrap(),
            PriorityPolicy::standard()
        );
    }
}
