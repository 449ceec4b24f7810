//! Per-phase work item generation.

use std::collections::HashMap;

use tracing::warn;
use uuid::Uuid;

use crate::config::ScenarioConfig;
use crate::environment::EnvironmentState;
use crate::recipe::{Recipe, RecipeBook};
use crate::task::{WorkItem, WorkKind};
use crate::types::{Phase, StationKind};

/// Items for one phase and how they must be run.
#[derive(Debug, Clone, Default)]
pub struct PhasePlan {
    pub items: Vec<WorkItem>,
    /// Run one item at a time regardless of the actor count.
    pub sequential: bool,
}

fn difficulty_factor(difficulty: &str) -> f64 {
    match difficulty.to_ascii_lowercase().as_str() {
        "easy" => 0.8,
        "hard" => 1.3,
        "expert" => 1.6,
        _ => 1.0,
    }
}

/// Turns a scenario's recipes into work items, phase by phase.
///
/// The planner remembers the setup item issued for each recipe's equipment
/// so cooking steps on that equipment can depend on it.
pub struct ScenarioPlanner<'a> {
    config: &'a ScenarioConfig,
    book: &'a RecipeBook,
    env: &'a EnvironmentState,
    setup_items: HashMap<(String, String), Uuid>,
}

impl<'a> ScenarioPlanner<'a> {
    pub fn new(config: &'a ScenarioConfig, book: &'a RecipeBook, env: &'a EnvironmentState) -> Self {
        Self {
            config,
            book,
            env,
            setup_items: HashMap::new(),
        }
    }

    pub fn plan(&mut self, phase: Phase) -> PhasePlan {
        let mut plan = match phase {
            Phase::Setup | Phase::Service => PhasePlan::default(),
            Phase::Preparation => PhasePlan {
                items: self.preparation(),
                sequential: false,
            },
            Phase::Cooking => PhasePlan {
                items: self.cooking(),
                sequential: false,
            },
            Phase::Plating => PhasePlan {
                items: self.plating(),
                sequential: true,
            },
            Phase::Cleanup => PhasePlan {
                items: cleanup(),
                sequential: true,
            },
        };
        if !self.config.parallel_tasks {
            plan.sequential = true;
        }
        plan
    }

    fn known_recipes(&self) -> Vec<&'a Recipe> {
        self.config
            .recipes
            .iter()
            .filter_map(|id| {
                let recipe = self.book.get(id);
                if recipe.is_none() {
                    warn!(scenario_id = %self.config.scenario_id, recipe = %id, "unknown recipe skipped");
                }
                recipe
            })
            .collect()
    }

    fn scaled(&self, minutes: f64) -> f64 {
        minutes * difficulty_factor(&self.config.difficulty)
    }

    fn preparation(&mut self) -> Vec<WorkItem> {
        let mut items = Vec::new();
        for recipe in self.known_recipes() {
            for ingredient in &recipe.ingredients {
                let Some(note) = &ingredient.preparation else {
                    continue;
                };
                items.push(
                    WorkItem::new(WorkKind::Prep, format!("Prepare {}: {note}", ingredient.name))
                        .priority(2)
                        .estimated(self.scaled(5.0))
                        .with_ingredient(ingredient.name.clone())
                        .for_recipe(recipe.id.clone()),
                );
            }
            for equipment in &recipe.equipment {
                let Some(station) = self.env.station_for_equipment(equipment) else {
                    warn!(recipe = %recipe.id, equipment = %equipment, "recipe names unknown equipment");
                    continue;
                };
                let item = WorkItem::new(WorkKind::Setup, format!("Set up {equipment}"))
                    .priority(3)
                    .estimated(self.scaled(2.0))
                    .at_station(station)
                    .with_equipment(equipment.clone())
                    .for_recipe(recipe.id.clone());
                self.setup_items
                    .insert((recipe.id.clone(), equipment.clone()), item.id);
                items.push(item);
            }
        }
        items
    }

    fn cooking(&self) -> Vec<WorkItem> {
        let mut items = Vec::new();
        for recipe in self.known_recipes() {
            for (step, instruction) in recipe.instructions.iter().enumerate() {
                let mut item = WorkItem::new(WorkKind::Cook, instruction.text.clone())
                    .priority(1)
                    .estimated(self.scaled(instruction.duration_minutes.unwrap_or(5.0)))
                    .for_recipe(recipe.id.clone())
                    .tag("step", (step + 1).to_string());
                if let Some(t) = instruction.temperature {
                    item = item.tag("temperature", format!("{t}"));
                }
                if !instruction.techniques.is_empty() {
                    item = item.tag("techniques", instruction.techniques.join(","));
                }
                if let Some(equipment) = &instruction.equipment {
                    if let Some(station) = self.env.station_for_equipment(equipment) {
                        item = item.at_station(station).with_equipment(equipment.clone());
                    }
                    if let Some(setup) = self
                        .setup_items
                        .get(&(recipe.id.clone(), equipment.clone()))
                    {
                        item = item.after(*setup);
                    }
                }
                items.push(item);
            }
        }
        items
    }

    fn plating(&self) -> Vec<WorkItem> {
        self.config
            .recipes
            .iter()
            .map(|id| {
                let name = self.book.get(id).map(|r| r.name.as_str()).unwrap_or(id);
                WorkItem::new(WorkKind::Plate, format!("Plate {name}"))
                    .priority(1)
                    .estimated(self.scaled(3.0))
                    .at_station(StationKind::Expedite)
                    .with_equipment("plating_station")
                    .for_recipe(id.clone())
            })
            .collect()
    }
}

/// Stations a completed cleanup item restores, keyed by the item's tag.
pub fn cleaned_stations(item: &WorkItem) -> Vec<StationKind> {
    item.tags
        .get("stations")
        .map(|list| list.split(',').filter_map(|s| s.parse().ok()).collect())
        .unwrap_or_default()
}

fn cleanup() -> Vec<WorkItem> {
    [
        (
            "Clean cooking stations",
            StationKind::Wash,
            "grill,saute,bake",
        ),
        ("Clean equipment", StationKind::Wash, "wash,expedite"),
        ("Organize ingredients", StationKind::Prep, "prep,cold"),
    ]
    .into_iter()
    .map(|(description, station, stations)| {
        WorkItem::new(WorkKind::Clean, description)
            .priority(1)
            .estimated(10.0)
            .at_station(station)
            .tag("stations", stations)
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn env() -> EnvironmentState {
        EnvironmentState::new(&mut StdRng::seed_from_u64(0))
    }

    fn config(recipes: &[&str]) -> ScenarioConfig {
        let mut cfg = ScenarioConfig::new("plan-test");
        cfg.recipes = recipes.iter().map(|s| s.to_string()).collect();
        cfg
    }

    #[test]
    fn preparation_emits_prep_and_setup_items() {
        let env = env();
        let book = RecipeBook::sample();
        let cfg = config(&["r1"]);
        let mut planner = ScenarioPlanner::new(&cfg, &book, &env);
        let plan = planner.plan(Phase::Preparation);

        let prep: Vec<_> = plan.items.iter().filter(|i| i.kind == WorkKind::Prep).collect();
        let setup: Vec<_> = plan.items.iter().filter(|i| i.kind == WorkKind::Setup).collect();
        // butter has no preparation note
        assert_eq!(prep.len(), 2);
        assert!(prep.iter().all(|i| i.priority == 2 && i.ingredients.len() == 1));
        assert_eq!(setup.len(), 2);
        assert!(setup
            .iter()
            .all(|i| i.priority == 3 && i.station == Some(StationKind::Saute)));
        assert!(!plan.sequential);
    }

    #[test]
    fn cooking_depends_on_matching_setup() {
        let env = env();
        let book = RecipeBook::sample();
        let cfg = config(&["r3"]);
        let mut planner = ScenarioPlanner::new(&cfg, &book, &env);
        let prep = planner.plan(Phase::Preparation);
        let grill_setup = prep
            .items
            .iter()
            .find(|i| i.kind == WorkKind::Setup)
            .unwrap()
            .id;

        let cooking = planner.plan(Phase::Cooking);
        assert_eq!(cooking.items.len(), 2);
        let grill = &cooking.items[0];
        assert_eq!(grill.station, Some(StationKind::Grill));
        assert!(grill.depends_on.contains(&grill_setup));
        assert_eq!(grill.tags.get("temperature"), Some("250"));
        let rest = &cooking.items[1];
        assert!(rest.depends_on.is_empty());
        assert!(rest.equipment.is_empty());
    }

    #[test]
    fn unknown_recipe_is_skipped_but_plated() {
        let env = env();
        let book = RecipeBook::sample();
        let cfg = config(&["mystery"]);
        let mut planner = ScenarioPlanner::new(&cfg, &book, &env);
        assert!(planner.plan(Phase::Preparation).items.is_empty());
        assert!(planner.plan(Phase::Cooking).items.is_empty());
        let plating = planner.plan(Phase::Plating);
        assert_eq!(plating.items.len(), 1);
        assert_eq!(plating.items[0].description, "Plate mystery");
        assert!(plating.sequential);
    }

    #[test]
    fn cleanup_is_three_sequential_items() {
        let env = env();
        let book = RecipeBook::sample();
        let cfg = config(&[]);
        let mut planner = ScenarioPlanner::new(&cfg, &book, &env);
        let plan = planner.plan(Phase::Cleanup);
        let names: Vec<_> = plan.items.iter().map(|i| i.description.as_str()).collect();
        assert_eq!(
            names,
            vec!["Clean cooking stations", "Clean equipment", "Organize ingredients"]
        );
        assert!(plan.sequential);
        assert_eq!(
            cleaned_stations(&plan.items[0]),
            vec![StationKind::Grill, StationKind::Saute, StationKind::Bake]
        );
    }

    #[test]
    fn serial_scenarios_run_every_phase_sequentially() {
        let env = env();
        let book = RecipeBook::sample();
        let mut cfg = config(&["r2"]);
        cfg.parallel_tasks = false;
        let mut planner = ScenarioPlanner::new(&cfg, &book, &env);
        assert!(planner.plan(Phase::Preparation).sequential);
    }

    #[test]
    fn difficulty_scales_estimates() {
        let env = env();
        let book = RecipeBook::sample();
        let mut cfg = config(&["r4"]);
        cfg.difficulty = "hard".into();
        let mut planner = ScenarioPlanner::new(&cfg, &book, &env);
        let cooking = planner.plan(Phase::Cooking);
        assert!((cooking.items[0].estimated_minutes - 3.9).abs() < 1e-9);
    }
}
