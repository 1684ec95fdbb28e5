//! Static priority table mapping a criticality level to its allowed actions.

use serde::{Deserialize, Serialize};

use crate::error::{PolicyViolation, UnprotectedCriticalLevel};

/// Allowed actions for one priority level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityRule {
    /// Human-readable description of the loads at this level.
    pub description: String,
    /// Whether devices at this level may be turned off.
    pub can_shed: bool,
    /// Whether devices at this level may be delayed or throttled.
    pub can_shift: bool,
    /// Longest allowed shed, if shedding is allowed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_shed_duration_minutes: Option<u32>,
}

impl PriorityRule {
    fn new(description: &str, can_shed: bool, can_shift: bool, max_minutes: Option<u32>) -> Self {
        Self {
            description: description.to_string(),
            can_shed,
            can_shift,
            max_shed_duration_minutes: max_minutes,
        }
    }
}

/// Immutable priority table for levels 1 through 5.
///
/// Built once at startup and shared by reference; never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorityPolicy {
    rules: [PriorityRule; 5],
}

impl PriorityPolicy {
    /// Lowest (most critical) level.
    pub const MOST_CRITICAL: u8 = 1;
    /// Highest (least critical) level.
    pub const LEAST_CRITICAL: u8 = 5;

    /// Creates a policy from rules ordered by level 1..=5.
    ///
    /// # Errors
    ///
    /// Returns `UnprotectedCriticalLevel` if the level-1 rule allows shedding
    /// or shifting.
    pub fn new(rules: [PriorityRule; 5]) -> Result<Self, UnprotectedCriticalLevel> {
        if rules[0].can_shed || rules[0].can_shift {
            return Err(UnprotectedCriticalLevel);
        }
        Ok(Self { rules })
    }

    /// Default table: critical loads untouched, dispensable loads shed first.
    pub fn standard() -> Self {
        let rules = [
            PriorityRule::new(
                "Emergency systems, security, critical medical equipment",
                false,
                false,
                None,
            ),
            PriorityRule::new(
                "Important infrastructure (servers, network equipment)",
                false,
                true,
                None,
            ),
            PriorityRule::new("Comfort systems (HVAC in occupied areas)", true, true, Some(30)),
            PriorityRule::new(
                "Non-essential lighting, recreational equipment",
                true,
                true,
                Some(120),
            ),
            PriorityRule::new(
                "Dispensable loads (decorative lighting, non-essential appliances)",
                true,
                true,
                Some(240),
            ),
        ];
        Self { rules }
    }

    /// Rules ordered by level 1..=5.
    pub fn rules(&self) -> &[PriorityRule; 5] {
        &self.rules
    }

    /// Returns `true` when `level` lies in the closed domain `1..=5`.
    pub fn is_valid_level(level: u8) -> bool {
        (Self::MOST_CRITICAL..=Self::LEAST_CRITICAL).contains(&level)
    }

    /// Looks up the rule for `level`.
    ///
    /// # Errors
    ///
    /// Returns `PolicyViolation` for any level outside `1..=5`; there is no
    /// fallback rule.
    pub fn capabilities_for(&self, level: u8) -> Result<&PriorityRule, PolicyViolation> {
        if !Self::is_valid_level(level) {
            return Err(PolicyViolation { level });
        }
        Ok(&self.rules[usize::from(level - 1)])
    }
}

impl Default for PriorityPolicy {
    fn default() -> Self {
        Self::standard()
    }
}
