//! Recipes and the recipe book scenarios draw their work from.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BrigadeError, Result};
use crate::paths;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    /// How it must be prepared before cooking, e.g. "dice". Ingredients
    /// without a note need no prep work.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preparation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<f64>,
    /// Target temperature in °C.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub techniques: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub equipment: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<Instruction>,
}

// ---------------------------------------------------------------------------
// RecipeBook
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct RecipeBook {
    recipes: BTreeMap<String, Recipe>,
}

impl RecipeBook {
    pub fn new(recipes: impl IntoIterator<Item = Recipe>) -> Self {
        Self {
            recipes: recipes.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    /// Load `.brigade/recipes.yaml`, or the built-in book when it is absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::recipes_path(root);
        if !path.exists() {
            return Ok(Self::sample());
        }
        let data = std::fs::read_to_string(&path)?;
        let recipes: Vec<Recipe> = serde_yaml::from_str(&data)?;
        Ok(Self::new(recipes))
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let list: Vec<&Recipe> = self.recipes.values().collect();
        let data = serde_yaml::to_string(&list)?;
        crate::io::atomic_write(&paths::recipes_path(root), data.as_bytes())
    }

    pub fn get(&self, id: &str) -> Option<&Recipe> {
        self.recipes.get(id)
    }

    pub fn require(&self, id: &str) -> Result<&Recipe> {
        self.get(id)
            .ok_or_else(|| BrigadeError::RecipeNotFound(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.recipes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    /// A small book covering every station.
    pub fn sample() -> Self {
        fn ing(name: &str, preparation: Option<&str>) -> Ingredient {
            Ingredient {
                name: name.into(),
                preparation: preparation.map(Into::into),
            }
        }
        fn step(text: &str, minutes: f64, equipment: Option<&str>, technique: &str) -> Instruction {
            Instruction {
                text: text.into(),
                duration_minutes: Some(minutes),
                temperature: None,
                equipment: equipment.map(Into::into),
                techniques: vec![technique.into()],
            }
        }

        Self::new([
            Recipe {
                id: "r1".into(),
                name: "Pan-seared salmon".into(),
                ingredients: vec![
                    ing("fish", Some("portion into fillets")),
                    ing("butter", None),
                    ing("garlic", Some("mince")),
                ],
                equipment: vec!["gas_burners".into(), "saute_pans".into()],
                instructions: vec![
                    step("Sear salmon skin-side down", 6.0, Some("saute_pans"), "searing"),
                    step("Baste with garlic butter", 2.0, Some("gas_burners"), "basting"),
                ],
            },
            Recipe {
                id: "r2".into(),
                name: "Tomato risotto".into(),
                ingredients: vec![
                    ing("onions", Some("dice")),
                    ing("tomatoes", Some("crush")),
                    ing("oil", None),
                ],
                equipment: vec!["sauce_pots".into()],
                instructions: vec![
                    step("Sweat onions", 5.0, Some("sauce_pots"), "sweating"),
                    step("Add rice and stock gradually", 18.0, Some("sauce_pots"), "stirring"),
                ],
            },
            Recipe {
                id: "r3".into(),
                name: "Grilled steak".into(),
                ingredients: vec![ing("beef", Some("trim and season")), ing("salt", None)],
                equipment: vec!["gas_grill".into()],
                instructions: vec![
                    Instruction {
                        temperature: Some(250.0),
                        ..step("Grill to medium rare", 8.0, Some("gas_grill"), "grilling")
                    },
                    step("Rest before slicing", 5.0, None, "resting"),
                ],
            },
            Recipe {
                id: "r4".into(),
                name: "Garden salad".into(),
                ingredients: vec![ing("tomatoes", Some("wedge")), ing("pepper", None)],
                equipment: vec!["salad_station".into()],
                instructions: vec![step("Toss and dress", 3.0, Some("salad_station"), "tossing")],
            },
            Recipe {
                id: "r5".into(),
                name: "Brioche".into(),
                ingredients: vec![
                    ing("flour", Some("sift")),
                    ing("eggs", Some("beat")),
                    ing("milk", None),
                ],
                equipment: vec!["mixers".into(), "convection_oven".into()],
                instructions: vec![
                    step("Knead the dough", 10.0, Some("mixers"), "kneading"),
                    Instruction {
                        temperature: Some(190.0),
                        ..step("Bake until golden", 25.0, Some("convection_oven"), "baking")
                    },
                ],
            },
        ])
    }
}
