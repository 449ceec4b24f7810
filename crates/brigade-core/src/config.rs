use crate::error::{BrigadeError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ScenarioType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioType {
    #[default]
    CookingChallenge,
    ServiceRush,
    EquipmentFailure,
    TimePressure,
    CollaborationTest,
    CrisisManagement,
    CateringEvent,
}

// ---------------------------------------------------------------------------
// ScenarioConfig
// ---------------------------------------------------------------------------

/// Caller-supplied description of one scenario run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub scenario_id: String,
    #[serde(default)]
    pub scenario_type: ScenarioType,
    /// Wall-clock budget for the whole run, in minutes.
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: u32,
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,
    #[serde(default = "default_max_concurrent_agents")]
    pub max_concurrent_agents: usize,
    #[serde(default)]
    pub recipes: Vec<String>,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    /// Multiplier on time constraints, `>= 1.0`.
    #[serde(default = "default_time_pressure")]
    pub time_pressure: f64,
    /// Per-tick crisis probability during COOKING, in `[0, 1]`.
    #[serde(default = "default_crisis_probability")]
    pub crisis_probability: f64,
    #[serde(default = "default_true")]
    pub collaboration_required: bool,
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,
    #[serde(default = "default_efficiency_threshold")]
    pub efficiency_threshold: f64,
    /// When false, every phase runs its items one at a time.
    #[serde(default = "default_true")]
    pub parallel_tasks: bool,
    #[serde(default = "default_true")]
    pub save_intermediate_states: bool,
    #[serde(default = "default_true")]
    pub record_communications: bool,
    /// Seed for every random draw in the run. `None` seeds from entropy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_duration_minutes() -> u32 {
    30
}

fn default_max_agents() -> usize {
    4
}

fn default_max_concurrent_agents() -> usize {
    4
}

fn default_difficulty() -> String {
    "medium".to_string()
}

fn default_time_pressure() -> f64 {
    1.0
}

fn default_crisis_probability() -> f64 {
    0.1
}

fn default_true() -> bool {
    true
}

fn default_quality_threshold() -> f64 {
    0.8
}

fn default_efficiency_threshold() -> f64 {
    0.7
}

impl ScenarioConfig {
    pub fn new(scenario_id: impl Into<String>) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            scenario_type: ScenarioType::default(),
            duration_minutes: default_duration_minutes(),
            max_agents: default_max_agents(),
            max_concurrent_agents: default_max_concurrent_agents(),
            recipes: Vec::new(),
            difficulty: default_difficulty(),
            time_pressure: default_time_pressure(),
            crisis_probability: default_crisis_probability(),
            collaboration_required: true,
            quality_threshold: default_quality_threshold(),
            efficiency_threshold: default_efficiency_threshold(),
            parallel_tasks: true,
            save_intermediate_states: true,
            record_communications: true,
            seed: None,
        }
    }

    /// Number of actors the run will use: the smaller of the two caps.
    pub fn agents_needed(&self) -> usize {
        self.max_agents.min(self.max_concurrent_agents)
    }

    pub fn duration_budget(&self) -> Duration {
        Duration::from_secs(u64::from(self.duration_minutes) * 60)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: ScenarioConfig = serde_yaml::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the runner cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.scenario_id.trim().is_empty() {
            return Err(BrigadeError::InvalidConfig("scenario_id is empty".into()));
        }
        if self.max_agents == 0 || self.max_concurrent_agents == 0 {
            return Err(BrigadeError::InvalidConfig(
                "max_agents and max_concurrent_agents must be at least 1".into(),
            ));
        }
        if !self.time_pressure.is_finite() || self.time_pressure < 1.0 {
            return Err(BrigadeError::InvalidConfig(format!(
                "time_pressure must be >= 1.0, got {}",
                self.time_pressure
            )));
        }
        if !(0.0..=1.0).contains(&self.crisis_probability) {
            return Err(BrigadeError::InvalidConfig(format!(
                "crisis_probability must be within [0, 1], got {}",
                self.crisis_probability
            )));
        }
        for (name, value) in [
            ("quality_threshold", self.quality_threshold),
            ("efficiency_threshold", self.efficiency_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(BrigadeError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ContentionPolicy
// ---------------------------------------------------------------------------

/// What a task does when its station or equipment is unavailable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentionPolicy {
    /// Mark the task failed immediately.
    Fail,
    /// Retry the same station after a short backoff, then fail.
    Retry { attempts: u32, backoff_ms: u64 },
    /// Try the work kind's fallback stations in order, then fail.
    Fallback,
}

impl Default for ContentionPolicy {
    fn default() -> Self {
        ContentionPolicy::Retry {
            attempts: 5,
            backoff_ms: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// SchedulerSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_group_timeout_ms")]
    pub group_timeout_ms: u64,
    #[serde(default = "default_inter_group_pause_ms")]
    pub inter_group_pause_ms: u64,
    #[serde(default)]
    pub contention: ContentionPolicy,
}

fn default_group_timeout_ms() -> u64 {
    30_000
}

fn default_inter_group_pause_ms() -> u64 {
    10
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            group_timeout_ms: default_group_timeout_ms(),
            inter_group_pause_ms: default_inter_group_pause_ms(),
            contention: ContentionPolicy::default(),
        }
    }
}

impl SchedulerSettings {
    pub fn group_timeout(&self) -> Duration {
        Duration::from_millis(self.group_timeout_ms)
    }

    pub fn inter_group_pause(&self) -> Duration {
        Duration::from_millis(self.inter_group_pause_ms)
    }
}

// ---------------------------------------------------------------------------
// DisruptionSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisruptionSettings {
    /// Chance per tick that an active crisis resolves on its own.
    #[serde(default = "default_resolution_probability")]
    pub resolution_probability: f64,
    /// Equipment condition below which a release may break the equipment.
    #[serde(default = "default_breakdown_threshold")]
    pub breakdown_threshold: f64,
    /// Chance of breakdown per decay event below the threshold.
    #[serde(default = "default_breakdown_probability")]
    pub breakdown_probability: f64,
    /// Condition lost each time a piece of equipment is released.
    #[serde(default = "default_condition_decay")]
    pub condition_decay: f64,
    /// Cleanliness lost each time an actor leaves a station.
    #[serde(default = "default_cleanliness_decay")]
    pub cleanliness_decay: f64,
    /// Interval between environment ticks during COOKING.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_resolution_probability() -> f64 {
    0.1
}

fn default_breakdown_threshold() -> f64 {
    0.3
}

fn default_breakdown_probability() -> f64 {
    0.01
}

fn default_condition_decay() -> f64 {
    0.001
}

fn default_cleanliness_decay() -> f64 {
    0.002
}

fn default_tick_interval_ms() -> u64 {
    25
}

impl Default for DisruptionSettings {
    fn default() -> Self {
        Self {
            resolution_probability: default_resolution_probability(),
            breakdown_threshold: default_breakdown_threshold(),
            breakdown_probability: default_breakdown_probability(),
            condition_decay: default_condition_decay(),
            cleanliness_decay: default_cleanliness_decay(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl DisruptionSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

// ---------------------------------------------------------------------------
// ScoringPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringPolicy {
    #[serde(default = "default_base_quality")]
    pub base_quality: f64,
    /// Penalty per unit of failure ratio `failed / (completed + failed)`.
    #[serde(default = "default_failure_penalty")]
    pub failure_penalty: f64,
    /// Penalty per unit of time pressure above 1.0.
    #[serde(default = "default_time_pressure_penalty")]
    pub time_pressure_penalty: f64,
    /// Expected communications per ordered actor pair. A policy knob with no
    /// derivation behind it; tune rather than trust for larger teams.
    #[serde(default = "default_collaboration_factor")]
    pub collaboration_factor: u32,
}

fn default_base_quality() -> f64 {
    0.8
}

fn default_failure_penalty() -> f64 {
    0.3
}

fn default_time_pressure_penalty() -> f64 {
    0.2
}

fn default_collaboration_factor() -> u32 {
    2
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            base_quality: default_base_quality(),
            failure_penalty: default_failure_penalty(),
            time_pressure_penalty: default_time_pressure_penalty(),
            collaboration_factor: default_collaboration_factor(),
        }
    }
}

// ---------------------------------------------------------------------------
// BrigadeConfig (top-level)
// ---------------------------------------------------------------------------

/// Engine policy shared by every run, stored at `.brigade/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrigadeConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub disruption: DisruptionSettings,
    #[serde(default)]
    pub scoring: ScoringPolicy,
}

fn default_version() -> u32 {
    1
}

impl Default for BrigadeConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            scheduler: SchedulerSettings::default(),
            disruption: DisruptionSettings::default(),
            scoring: ScoringPolicy::default(),
        }
    }
}

impl BrigadeConfig {
    /// Load the config under `root`, falling back to defaults when absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: BrigadeConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.scheduler.group_timeout_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "scheduler.group_timeout_ms is 0: every task will time out".into(),
            });
        }

        if self.scheduler.inter_group_pause_ms > self.scheduler.group_timeout_ms {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "scheduler.inter_group_pause_ms ({}) exceeds group_timeout_ms ({})",
                    self.scheduler.inter_group_pause_ms, self.scheduler.group_timeout_ms
                ),
            });
        }

        if let ContentionPolicy::Retry { attempts, .. } = self.scheduler.contention {
            if attempts > 20 {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "scheduler.contention retries {attempts} times (>20 is unusual)"
                    ),
                });
            }
        }

        for (name, value) in [
            (
                "disruption.resolution_probability",
                self.disruption.resolution_probability,
            ),
            (
                "disruption.breakdown_probability",
                self.disruption.breakdown_probability,
            ),
            (
                "disruption.breakdown_threshold",
                self.disruption.breakdown_threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("{name} must be within [0, 1], got {value}"),
                });
            }
        }

        if self.scoring.collaboration_factor == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "scoring.collaboration_factor must be at least 1".into(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn scenario_config_fills_defaults() {
        let yaml = "scenario_id: lunch\nrecipes: [r1, r2]\n";
        let cfg: ScenarioConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.max_agents, 4);
        assert_eq!(cfg.time_pressure, 1.0);
        assert!(cfg.parallel_tasks);
        assert_eq!(cfg.recipes, vec!["r1", "r2"]);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn scenario_config_rejects_low_time_pressure() {
        let mut cfg = ScenarioConfig::new("s");
        cfg.time_pressure = 0.5;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("time_pressure"));
    }

    #[test]
    fn scenario_config_rejects_crisis_probability_out_of_range() {
        let mut cfg = ScenarioConfig::new("s");
        cfg.crisis_probability = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn agents_needed_is_min_of_caps() {
        let mut cfg = ScenarioConfig::new("s");
        cfg.max_agents = 6;
        cfg.max_concurrent_agents = 3;
        assert_eq!(cfg.agents_needed(), 3);
    }

    #[test]
    fn contention_policy_yaml_tagged() {
        let policy = ContentionPolicy::Retry {
            attempts: 2,
            backoff_ms: 5,
        };
        let yaml = serde_yaml::to_string(&policy).unwrap();
        assert!(yaml.contains("type: retry"));
        let parsed: ContentionPolicy = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, policy);
    }

    #[test]
    fn load_missing_config_returns_default() {
        let dir = TempDir::new().unwrap();
        let cfg = BrigadeConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.scoring.collaboration_factor, 2);
    }

    #[test]
    fn save_then_load_preserves_policy() {
        let dir = TempDir::new().unwrap();
        let mut cfg = BrigadeConfig::default();
        cfg.scheduler.contention = ContentionPolicy::Fallback;
        cfg.scheduler.group_timeout_ms = 500;
        cfg.save(dir.path()).unwrap();

        let loaded = BrigadeConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.scheduler.contention, ContentionPolicy::Fallback);
        assert_eq!(loaded.scheduler.group_timeout_ms, 500);
    }

    #[test]
    fn validate_flags_zero_timeout() {
        let mut cfg = BrigadeConfig::default();
        cfg.scheduler.group_timeout_ms = 0;
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("group_timeout_ms")));
    }

    #[test]
    fn default_config_has_no_warnings() {
        assert!(BrigadeConfig::default().validate().is_empty());
    }
}
