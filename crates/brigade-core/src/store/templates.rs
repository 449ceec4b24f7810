//! Named scenario templates, stored at `.brigade/templates.yaml`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{ScenarioConfig, ScenarioType};
use crate::error::{BrigadeError, Result};
use crate::paths;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioTemplate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scenario_type: ScenarioType,
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: u32,
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,
    #[serde(default)]
    pub recipes: Vec<String>,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default = "default_time_pressure")]
    pub time_pressure: f64,
    #[serde(default)]
    pub crisis_probability: f64,
    #[serde(default)]
    pub collaboration_required: bool,
}

fn default_duration_minutes() -> u32 {
    30
}

fn default_max_agents() -> usize {
    4
}

fn default_difficulty() -> String {
    "medium".to_string()
}

fn default_time_pressure() -> f64 {
    1.0
}

impl ScenarioTemplate {
    /// Build a runnable configuration. The scenario id is the template name.
    pub fn to_config(&self) -> ScenarioConfig {
        let mut cfg = ScenarioConfig::new(self.name.clone());
        cfg.scenario_type = self.scenario_type;
        cfg.duration_minutes = self.duration_minutes;
        cfg.max_agents = self.max_agents;
        cfg.max_concurrent_agents = self.max_agents;
        cfg.recipes = self.recipes.clone();
        cfg.difficulty = self.difficulty.clone();
        cfg.time_pressure = self.time_pressure;
        cfg.crisis_probability = self.crisis_probability;
        cfg.collaboration_required = self.collaboration_required;
        cfg
    }
}

/// Templates shipped with `brigade init`.
pub fn default_templates() -> Vec<ScenarioTemplate> {
    vec![
        ScenarioTemplate {
            name: "basic-cooking".into(),
            description: "Two cooks, one dish, no surprises".into(),
            scenario_type: ScenarioType::CookingChallenge,
            duration_minutes: 5,
            max_agents: 2,
            recipes: vec!["r1".into()],
            difficulty: "easy".into(),
            time_pressure: 1.0,
            crisis_probability: 0.0,
            collaboration_required: false,
        },
        ScenarioTemplate {
            name: "dinner-rush".into(),
            description: "Full brigade under time pressure".into(),
            scenario_type: ScenarioType::ServiceRush,
            duration_minutes: 10,
            max_agents: 6,
            recipes: vec!["r1".into(), "r2".into(), "r3".into(), "r4".into()],
            difficulty: "hard".into(),
            time_pressure: 1.5,
            crisis_probability: 0.1,
            collaboration_required: true,
        },
        ScenarioTemplate {
            name: "crisis-drill".into(),
            description: "Busy kitchen with frequent crises".into(),
            scenario_type: ScenarioType::CrisisManagement,
            duration_minutes: 10,
            max_agents: 5,
            recipes: vec!["r3".into(), "r5".into()],
            difficulty: "medium".into(),
            time_pressure: 1.2,
            crisis_probability: 0.5,
            collaboration_required: true,
        },
    ]
}

pub fn load_templates(root: &Path) -> Result<Vec<ScenarioTemplate>> {
    let path = paths::templates_path(root);
    if !path.exists() {
        return Ok(default_templates());
    }
    let data = std::fs::read_to_string(&path)?;
    Ok(serde_yaml::from_str(&data)?)
}

pub fn save_templates(root: &Path, templates: &[ScenarioTemplate]) -> Result<()> {
    let data = serde_yaml::to_string(templates)?;
    crate::io::atomic_write(&paths::templates_path(root), data.as_bytes())
}

pub fn find_template<'a>(
    templates: &'a [ScenarioTemplate],
    name: &str,
) -> Result<&'a ScenarioTemplate> {
    templates
        .iter()
        .find(|t| t.name == name)
        .ok_or_else(|| BrigadeError::TemplateNotFound(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_templates_produce_valid_configs() {
        for template in default_templates() {
            template.to_config().validate().unwrap();
        }
    }

    #[test]
    fn save_then_load_templates() {
        let dir = TempDir::new().unwrap();
        save_templates(dir.path(), &default_templates()).unwrap();
        let loaded = load_templates(dir.path()).unwrap();
        assert_eq!(loaded, default_templates());
    }

    #[test]
    fn find_template_reports_missing_name() {
        let templates = default_templates();
        assert_eq!(find_template(&templates, "dinner-rush").unwrap().max_agents, 6);
        assert!(matches!(
            find_template(&templates, "brunch"),
            Err(BrigadeError::TemplateNotFound(_))
        ));
    }
}
