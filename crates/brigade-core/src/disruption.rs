//! Crisis injection and recovery.
//!
//! All randomness comes from the caller's source, so a seeded run triggers
//! the same crises at the same ticks.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::actor::ActionResult;
use crate::allocator::ResourceAllocator;
use crate::config::DisruptionSettings;
use crate::error::Result;
use crate::task::{WorkItem, WorkKind};
use crate::types::{ActorId, CrisisKind, OperatingMode, Phase, StationKind};

const SANITATION_CLEANLINESS: f64 = 0.2;
const RUSH_ORDER_ITEMS: usize = 2;

// ---------------------------------------------------------------------------
// CrisisEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrisisResponse {
    pub actor: ActorId,
    pub action: ActionResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Died down on its own.
    Subsided,
    /// A recovery item completed.
    Recovered,
    /// Still open when the run ended.
    Unresolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrisisEvent {
    pub id: Uuid,
    pub kind: CrisisKind,
    pub phase: Phase,
    pub triggered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    /// What the crisis did to the kitchen.
    pub detail: String,
    #[serde(default)]
    pub responses: Vec<CrisisResponse>,
}

impl CrisisEvent {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.resolved_at
            .map(|end| (end - self.triggered_at).num_milliseconds() as f64 / 1000.0)
    }
}

/// A freshly triggered crisis and the recovery items it calls for.
#[derive(Debug, Clone)]
pub struct Disruption {
    pub event: CrisisEvent,
    pub items: Vec<WorkItem>,
}

// ---------------------------------------------------------------------------
// DisruptionInjector
// ---------------------------------------------------------------------------

/// Clamp a configured chance into `[0, 1]`. Non-finite values never fire.
fn probability(p: f64) -> f64 {
    if p.is_finite() {
        p.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[derive(Debug, Clone)]
pub struct DisruptionInjector {
    trigger_probability: f64,
    resolution_probability: f64,
}

impl DisruptionInjector {
    pub fn new(trigger_probability: f64, settings: &DisruptionSettings) -> Self {
        Self {
            trigger_probability: probability(trigger_probability),
            resolution_probability: probability(settings.resolution_probability),
        }
    }

    /// Roll for a new crisis. Only a busy kitchen (service or rush) with no
    /// crisis already open is eligible.
    pub fn maybe_trigger(
        &self,
        allocator: &ResourceAllocator,
        phase: Phase,
        rng: &mut impl Rng,
    ) -> Option<Disruption> {
        let conditions = allocator.environment().conditions();
        if conditions.crisis_active
            || !matches!(conditions.mode, OperatingMode::Service | OperatingMode::Rush)
        {
            return None;
        }
        if !rng.gen_bool(self.trigger_probability) {
            return None;
        }

        let kind = *CrisisKind::catalogue().choose(rng)?;
        let (detail, items) = match self.apply(allocator, kind, rng) {
            Ok(effect) => effect,
            Err(e) => {
                warn!(crisis = %kind, error = %e, "crisis effect could not be applied");
                (format!("{kind} (no effect: {e})"), Vec::new())
            }
        };
        allocator.environment().set_crisis(Some(kind));
        info!(crisis = %kind, phase = %phase, %detail, "crisis triggered");

        Some(Disruption {
            event: CrisisEvent {
                id: Uuid::new_v4(),
                kind,
                phase,
                triggered_at: Utc::now(),
                resolved_at: None,
                resolution: None,
                detail,
                responses: Vec::new(),
            },
            items,
        })
    }

    /// Roll for the open crisis to subside. Returns true when it resolved.
    pub fn maybe_resolve(
        &self,
        allocator: &ResourceAllocator,
        event: &mut CrisisEvent,
        rng: &mut impl Rng,
    ) -> bool {
        if event.is_resolved() || !rng.gen_bool(self.resolution_probability) {
            return false;
        }
        self.resolve(allocator, event, Resolution::Subsided);
        true
    }

    /// Close `event` and clear the crisis flag.
    pub fn resolve(&self, allocator: &ResourceAllocator, event: &mut CrisisEvent, how: Resolution) {
        if event.is_resolved() {
            return;
        }
        event.resolved_at = Some(Utc::now());
        event.resolution = Some(how);
        allocator.environment().set_crisis(None);
        info!(crisis = %event.kind, resolution = ?how, "crisis resolved");
    }

    /// Undo a crisis effect after its recovery item completed.
    pub fn recover(&self, allocator: &ResourceAllocator, item: &WorkItem) -> Result<()> {
        match item.kind {
            WorkKind::EmergencyRepair => {
                if let Some(equipment) = item.tags.get("equipment") {
                    allocator.repair_equipment(item.target_station(), equipment)?;
                }
            }
            WorkKind::EmergencyRestock => {
                if let Some(ingredient) = item.tags.get("ingredient") {
                    allocator.restock(ingredient);
                }
            }
            WorkKind::Sanitation => allocator.service_station(item.target_station())?,
            _ => {}
        }
        Ok(())
    }

    fn apply(
        &self,
        allocator: &ResourceAllocator,
        kind: CrisisKind,
        rng: &mut impl Rng,
    ) -> Result<(String, Vec<WorkItem>)> {
        let snapshot = allocator.environment().snapshot();
        match kind {
            CrisisKind::EquipmentFailure => {
                let candidates: Vec<(StationKind, String)> = snapshot
                    .stations
                    .iter()
                    .flat_map(|s| {
                        s.equipment
                            .iter()
                            .filter(|e| e.available)
                            .map(move |e| (s.kind, e.name.clone()))
                    })
                    .collect();
                let Some((station, name)) = candidates.choose(rng).cloned() else {
                    return Ok(("no working equipment left to fail".into(), Vec::new()));
                };
                allocator.break_equipment(station, &name)?;
                let item = WorkItem::new(WorkKind::EmergencyRepair, format!("Repair {name}"))
                    .priority(10)
                    .estimated(15.0)
                    .at_station(station)
                    .tag("equipment", name.clone());
                Ok((format!("{name} at {station} broke down"), vec![item]))
            }
            CrisisKind::IngredientShortage => {
                let tracked: Vec<&String> = snapshot.inventory.keys().collect();
                let Some(ingredient) = tracked.choose(rng).map(|s| s.to_string()) else {
                    return Ok(("pantry is untracked".into(), Vec::new()));
                };
                allocator.deplete(&ingredient);
                let item =
                    WorkItem::new(WorkKind::EmergencyRestock, format!("Restock {ingredient}"))
                        .priority(9)
                        .estimated(10.0)
                        .tag("ingredient", ingredient.clone());
                Ok((format!("ran out of {ingredient}"), vec![item]))
            }
            CrisisKind::LargeOrder => {
                let items = (1..=RUSH_ORDER_ITEMS)
                    .map(|n| {
                        WorkItem::new(WorkKind::RushOrder, format!("Rush order {n}"))
                            .priority(8)
                            .estimated(10.0)
                    })
                    .collect();
                Ok(("large order arrived".into(), items))
            }
            CrisisKind::StaffInjury => Ok(("a cook was injured".into(), Vec::new())),
            CrisisKind::FoodSafetyIssue => {
                let station = *StationKind::all().choose(rng).unwrap_or(&StationKind::Prep);
                allocator.contaminate(station, SANITATION_CLEANLINESS)?;
                let item = WorkItem::new(WorkKind::Sanitation, format!("Sanitize {station} station"))
                    .priority(9)
                    .estimated(10.0)
                    .at_station(station);
                Ok((format!("{station} station failed a hygiene check"), vec![item]))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
