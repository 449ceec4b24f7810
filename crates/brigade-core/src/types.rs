use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// One stage of the fixed scenario lifecycle. Phases run strictly in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    Preparation,
    Cooking,
    Plating,
    Service,
    Cleanup,
}

impl Phase {
    pub fn all() -> &'static [Phase] {
        &[
            Phase::Setup,
            Phase::Preparation,
            Phase::Cooking,
            Phase::Plating,
            Phase::Service,
            Phase::Cleanup,
        ]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<Phase> {
        Phase::all().get(self.index() + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::Preparation => "preparation",
            Phase::Cooking => "cooking",
            Phase::Plating => "plating",
            Phase::Service => "service",
            Phase::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = crate::error::BrigadeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "setup" => Ok(Phase::Setup),
            "preparation" => Ok(Phase::Preparation),
            "cooking" => Ok(Phase::Cooking),
            "plating" => Ok(Phase::Plating),
            "service" => Ok(Phase::Service),
            "cleanup" => Ok(Phase::Cleanup),
            _ => Err(crate::error::BrigadeError::InvalidPhase(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

/// Status of a scenario run.
///
/// Transitions: `Running → Completed | Failed | Cancelled`. A finished run
/// always carries one of the three terminal values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// StationKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationKind {
    Prep,
    Grill,
    Saute,
    Bake,
    Cold,
    Expedite,
    Wash,
}

impl StationKind {
    pub fn all() -> &'static [StationKind] {
        &[
            StationKind::Prep,
            StationKind::Grill,
            StationKind::Saute,
            StationKind::Bake,
            StationKind::Cold,
            StationKind::Expedite,
            StationKind::Wash,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StationKind::Prep => "prep",
            StationKind::Grill => "grill",
            StationKind::Saute => "saute",
            StationKind::Bake => "bake",
            StationKind::Cold => "cold",
            StationKind::Expedite => "expedite",
            StationKind::Wash => "wash",
        }
    }
}

impl fmt::Display for StationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StationKind {
    type Err = crate::error::BrigadeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prep" => Ok(StationKind::Prep),
            "grill" => Ok(StationKind::Grill),
            "saute" | "sauté" => Ok(StationKind::Saute),
            "bake" | "baking" => Ok(StationKind::Bake),
            "cold" | "cold_prep" => Ok(StationKind::Cold),
            "expedite" => Ok(StationKind::Expedite),
            "wash" | "dish" => Ok(StationKind::Wash),
            _ => Err(crate::error::BrigadeError::UnknownStation(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// OperatingMode
// ---------------------------------------------------------------------------

/// Coarse kitchen activity level, a step function of total station occupants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    Idle,
    Prep,
    Service,
    Rush,
}

impl OperatingMode {
    pub fn from_occupants(total: usize) -> Self {
        match total {
            0 => OperatingMode::Idle,
            1..=3 => OperatingMode::Prep,
            4..=6 => OperatingMode::Service,
            _ => OperatingMode::Rush,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperatingMode::Idle => "idle",
            OperatingMode::Prep => "prep",
            OperatingMode::Service => "service",
            OperatingMode::Rush => "rush",
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CrisisKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrisisKind {
    EquipmentFailure,
    IngredientShortage,
    LargeOrder,
    StaffInjury,
    FoodSafetyIssue,
}

impl CrisisKind {
    /// The fixed crisis catalogue, in draw order.
    pub fn catalogue() -> &'static [CrisisKind] {
        &[
            CrisisKind::EquipmentFailure,
            CrisisKind::IngredientShortage,
            CrisisKind::LargeOrder,
            CrisisKind::StaffInjury,
            CrisisKind::FoodSafetyIssue,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CrisisKind::EquipmentFailure => "equipment_failure",
            CrisisKind::IngredientShortage => "ingredient_shortage",
            CrisisKind::LargeOrder => "large_order",
            CrisisKind::StaffInjury => "staff_injury",
            CrisisKind::FoodSafetyIssue => "food_safety_issue",
        }
    }
}

impl fmt::Display for CrisisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ActorId
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ActorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_order_is_fixed() {
        let mut phase = Phase::Setup;
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            seen.push(next);
            phase = next;
        }
        assert_eq!(seen, Phase::all());
        assert_eq!(Phase::Cleanup.next(), None);
    }

    #[test]
    fn phase_parses_from_str() {
        assert_eq!("cooking".parse::<Phase>().unwrap(), Phase::Cooking);
        assert!("boiling".parse::<Phase>().is_err());
    }

    #[test]
    fn operating_mode_is_step_function_of_occupants() {
        assert_eq!(OperatingMode::from_occupants(0), OperatingMode::Idle);
        assert_eq!(OperatingMode::from_occupants(1), OperatingMode::Prep);
        assert_eq!(OperatingMode::from_occupants(3), OperatingMode::Prep);
        assert_eq!(OperatingMode::from_occupants(4), OperatingMode::Service);
        assert_eq!(OperatingMode::from_occupants(6), OperatingMode::Service);
        assert_eq!(OperatingMode::from_occupants(7), OperatingMode::Rush);
    }

    #[test]
    fn station_kind_accepts_legacy_names() {
        assert_eq!("dish".parse::<StationKind>().unwrap(), StationKind::Wash);
        assert_eq!("cold_prep".parse::<StationKind>().unwrap(), StationKind::Cold);
    }
}
