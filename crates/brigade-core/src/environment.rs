//! Simulated kitchen: stations, equipment, pantry and ambient conditions.
//!
//! `EnvironmentState` is owned by one run. Readers get cloned snapshots; the
//! only writers are [`crate::allocator::ResourceAllocator`] and
//! [`crate::disruption::DisruptionInjector`], through the crate-private
//! mutators below. Each station sits behind its own mutex so concurrent tasks
//! serialize per station.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{BrigadeError, Result};
use crate::types::{ActorId, CrisisKind, OperatingMode, StationKind};

const BASE_TEMPERATURE: f64 = 22.0;
const MAX_TEMPERATURE: f64 = 35.0;
const BASE_HUMIDITY: f64 = 60.0;
const MAX_HUMIDITY: f64 = 80.0;
const RUSH_THRESHOLD: usize = 6;

// ---------------------------------------------------------------------------
// Equipment
// ---------------------------------------------------------------------------

/// How a piece of equipment affects the room while in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatProfile {
    Ambient,
    DryHeat,
    Steam,
    Chilled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Equipment {
    pub name: String,
    pub station: StationKind,
    pub available: bool,
    /// 1.0 is pristine. Only decreases while in use, until the next reset or repair.
    pub condition: f64,
    pub temperature: Option<f64>,
    pub in_use_by: Option<ActorId>,
    pub maintenance_required: bool,
    pub heat: HeatProfile,
}

impl Equipment {
    fn new(name: &str, station: StationKind, heat: HeatProfile) -> Self {
        Self {
            name: name.to_string(),
            station,
            available: true,
            condition: 1.0,
            temperature: None,
            in_use_by: None,
            maintenance_required: false,
            heat,
        }
    }

    fn reset(&mut self, rng: &mut impl Rng) {
        self.available = true;
        self.condition = rng.gen_range(0.8..=1.0);
        self.in_use_by = None;
        self.maintenance_required = false;
        self.temperature = match self.heat {
            HeatProfile::DryHeat if self.name.contains("oven") => Some(rng.gen_range(180.0..220.0)),
            HeatProfile::DryHeat => Some(rng.gen_range(200.0..300.0)),
            HeatProfile::Chilled => Some(rng.gen_range(2.0..4.0)),
            HeatProfile::Ambient | HeatProfile::Steam => None,
        };
    }
}

// ---------------------------------------------------------------------------
// Station
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    pub kind: StationKind,
    pub name: String,
    pub capacity: usize,
    /// Never larger than `capacity`.
    pub occupants: BTreeSet<ActorId>,
    pub cleanliness: f64,
    pub equipment: Vec<Equipment>,
}

impl Station {
    pub fn is_full(&self) -> bool {
        self.occupants.len() >= self.capacity
    }

    pub fn equipment(&self, name: &str) -> Option<&Equipment> {
        self.equipment.iter().find(|e| e.name == name)
    }

    pub(crate) fn equipment_mut(&mut self, name: &str) -> Result<&mut Equipment> {
        let kind = self.kind;
        self.equipment
            .iter_mut()
            .find(|e| e.name == name)
            .ok_or_else(|| BrigadeError::UnknownEquipment {
                station: kind.to_string(),
                equipment: name.to_string(),
            })
    }
}

/// Canonical kitchen layout: `(kind, display name, capacity, equipment)`.
fn station_catalogue() -> Vec<(StationKind, &'static str, usize, Vec<(&'static str, HeatProfile)>)> {
    use HeatProfile::*;
    vec![
        (
            StationKind::Prep,
            "Prep Station",
            3,
            vec![
                ("cutting_board", Ambient),
                ("prep_knives", Ambient),
                ("food_processor", Ambient),
            ],
        ),
        (
            StationKind::Grill,
            "Grill Station",
            2,
            vec![
                ("gas_grill", DryHeat),
                ("grill_tools", Ambient),
                ("thermometer", Ambient),
            ],
        ),
        (
            StationKind::Saute,
            "Sauté Station",
            2,
            vec![
                ("gas_burners", Steam),
                ("saute_pans", Ambient),
                ("sauce_pots", Steam),
            ],
        ),
        (
            StationKind::Bake,
            "Baking Station",
            2,
            vec![
                ("convection_oven", DryHeat),
                ("mixers", Ambient),
                ("baking_tools", Ambient),
            ],
        ),
        (
            StationKind::Cold,
            "Cold Prep",
            2,
            vec![
                ("refrigeration", Chilled),
                ("salad_station", Ambient),
                ("cold_tools", Ambient),
            ],
        ),
        (
            StationKind::Expedite,
            "Expedite Station",
            1,
            vec![
                ("heat_lamps", Ambient),
                ("plating_station", Ambient),
                ("garnish_station", Ambient),
            ],
        ),
        (
            StationKind::Wash,
            "Dish Station",
            2,
            vec![
                ("dishwasher", Ambient),
                ("sanitizer", Ambient),
                ("drying_racks", Ambient),
            ],
        ),
    ]
}

/// Pantry levels after a reset.
pub fn baseline_inventory() -> BTreeMap<String, f64> {
    [
        ("flour", 100.0),
        ("eggs", 50.0),
        ("milk", 20.0),
        ("butter", 10.0),
        ("salt", 5.0),
        ("pepper", 2.0),
        ("oil", 15.0),
        ("onions", 25.0),
        ("garlic", 10.0),
        ("tomatoes", 30.0),
        ("beef", 20.0),
        ("chicken", 25.0),
        ("fish", 15.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

// ---------------------------------------------------------------------------
// EnvironmentalConditions
// ---------------------------------------------------------------------------

/// Ambient conditions. Derived by [`EnvironmentState::tick`]; the crisis fields
/// are owned by the disruption injector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalConditions {
    pub temperature: f64,
    pub humidity: f64,
    pub noise_level: f64,
    pub rush_multiplier: f64,
    /// Occupant utilisation across all stations, in `[0, 1]`.
    pub time_pressure: f64,
    pub mode: OperatingMode,
    pub crisis_active: bool,
    pub crisis_kind: Option<CrisisKind>,
}

impl Default for EnvironmentalConditions {
    fn default() -> Self {
        Self {
            temperature: BASE_TEMPERATURE,
            humidity: BASE_HUMIDITY,
            noise_level: 0.0,
            rush_multiplier: 1.0,
            time_pressure: 0.0,
            mode: OperatingMode::Idle,
            crisis_active: false,
            crisis_kind: None,
        }
    }
}

// ---------------------------------------------------------------------------
// EnvironmentSnapshot
// ---------------------------------------------------------------------------

/// Read-only copy of the environment for actors and reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub conditions: EnvironmentalConditions,
    pub stations: Vec<Station>,
    pub inventory: BTreeMap<String, f64>,
    pub total_occupants: usize,
}

impl EnvironmentSnapshot {
    pub fn station(&self, kind: StationKind) -> Option<&Station> {
        self.stations.iter().find(|s| s.kind == kind)
    }

    pub fn broken_equipment(&self) -> Vec<&Equipment> {
        self.stations
            .iter()
            .flat_map(|s| s.equipment.iter())
            .filter(|e| e.maintenance_required)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// EnvironmentState
// ---------------------------------------------------------------------------

pub struct EnvironmentState {
    stations: BTreeMap<StationKind, Mutex<Station>>,
    conditions: Mutex<EnvironmentalConditions>,
    inventory: Mutex<BTreeMap<String, f64>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl EnvironmentState {
    /// Build the canonical kitchen and reset it to baseline.
    pub fn new(rng: &mut impl Rng) -> Self {
        let stations = station_catalogue()
            .into_iter()
            .map(|(kind, name, capacity, equipment)| {
                let station = Station {
                    kind,
                    name: name.to_string(),
                    capacity,
                    occupants: BTreeSet::new(),
                    cleanliness: 1.0,
                    equipment: equipment
                        .into_iter()
                        .map(|(n, heat)| Equipment::new(n, kind, heat))
                        .collect(),
                };
                (kind, Mutex::new(station))
            })
            .collect();
        let state = Self {
            stations,
            conditions: Mutex::new(EnvironmentalConditions::default()),
            inventory: Mutex::new(baseline_inventory()),
        };
        state.reset(rng);
        state
    }

    /// Restore the baseline: empty stations, equipment re-randomized in the
    /// `[0.8, 1.0]` condition band, full pantry, conditions at rest.
    pub fn reset(&self, rng: &mut impl Rng) {
        for station in self.stations.values() {
            let mut station = lock(station);
            station.occupants.clear();
            station.cleanliness = 1.0;
            for equipment in &mut station.equipment {
                equipment.reset(rng);
            }
        }
        *lock(&self.inventory) = baseline_inventory();
        *lock(&self.conditions) = EnvironmentalConditions::default();
    }

    /// Recompute derived conditions from current occupancy and return the mode.
    pub fn tick(&self) -> OperatingMode {
        let mut occupants = 0usize;
        let mut capacity = 0usize;
        let mut dry_heat = 0usize;
        let mut steam = 0usize;
        for station in self.stations.values() {
            let station = lock(station);
            occupants += station.occupants.len();
            capacity += station.capacity;
            for equipment in station.equipment.iter().filter(|e| e.in_use_by.is_some()) {
                match equipment.heat {
                    HeatProfile::DryHeat => dry_heat += 1,
                    HeatProfile::Steam => steam += 1,
                    HeatProfile::Ambient | HeatProfile::Chilled => {}
                }
            }
        }

        let mode = OperatingMode::from_occupants(occupants);
        let mut conditions = lock(&self.conditions);
        conditions.temperature = (BASE_TEMPERATURE + dry_heat as f64 * 2.0).min(MAX_TEMPERATURE);
        conditions.humidity = (BASE_HUMIDITY + steam as f64 * 3.0).min(MAX_HUMIDITY);
        conditions.noise_level = (occupants as f64 * 0.1).min(1.0);
        conditions.rush_multiplier = if occupants > RUSH_THRESHOLD {
            1.0 + (occupants - RUSH_THRESHOLD) as f64 * 0.2
        } else {
            1.0
        };
        conditions.time_pressure = if capacity == 0 {
            0.0
        } else {
            occupants as f64 / capacity as f64
        };
        conditions.mode = mode;
        mode
    }

    pub fn snapshot(&self) -> EnvironmentSnapshot {
        let stations: Vec<Station> = self.stations.values().map(|s| lock(s).clone()).collect();
        let total_occupants = stations.iter().map(|s| s.occupants.len()).sum();
        EnvironmentSnapshot {
            conditions: lock(&self.conditions).clone(),
            stations,
            inventory: lock(&self.inventory).clone(),
            total_occupants,
        }
    }

    pub fn conditions(&self) -> EnvironmentalConditions {
        lock(&self.conditions).clone()
    }

    pub fn mode(&self) -> OperatingMode {
        lock(&self.conditions).mode
    }

    pub fn total_occupants(&self) -> usize {
        self.stations.values().map(|s| lock(s).occupants.len()).sum()
    }

    /// Station owning the named piece of equipment.
    pub fn station_for_equipment(&self, name: &str) -> Option<StationKind> {
        self.stations
            .iter()
            .find(|(_, s)| lock(s).equipment(name).is_some())
            .map(|(kind, _)| *kind)
    }

    pub fn inventory_level(&self, ingredient: &str) -> Option<f64> {
        lock(&self.inventory).get(ingredient).copied()
    }

    // -----------------------------------------------------------------------
    // Crate-private mutators (allocator and injector only)
    // -----------------------------------------------------------------------

    pub(crate) fn with_station<R>(
        &self,
        kind: StationKind,
        f: impl FnOnce(&mut Station) -> R,
    ) -> Result<R> {
        let station = self
            .stations
            .get(&kind)
            .ok_or_else(|| BrigadeError::UnknownStation(kind.to_string()))?;
        let mut guard = lock(station);
        Ok(f(&mut guard))
    }

    pub(crate) fn with_inventory<R>(&self, f: impl FnOnce(&mut BTreeMap<String, f64>) -> R) -> R {
        f(&mut lock(&self.inventory))
    }

    pub(crate) fn set_crisis(&self, kind: Option<CrisisKind>) {
        let mut conditions = lock(&self.conditions);
        conditions.crisis_active = kind.is_some();
        conditions.crisis_kind = kind;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn kitchen() -> EnvironmentState {
        EnvironmentState::new(&mut StdRng::seed_from_u64(7))
    }

    fn occupy(state: &EnvironmentState, kind: StationKind, actor: &str) {
        state
            .with_station(kind, |s| s.occupants.insert(ActorId::from(actor)))
            .unwrap();
    }

    #[test]
    fn reset_restores_baseline() {
        let state = kitchen();
        occupy(&state, StationKind::Grill, "a");
        state
            .with_station(StationKind::Grill, |s| {
                s.cleanliness = 0.1;
                let grill = s.equipment_mut("gas_grill").unwrap();
                grill.available = false;
                grill.maintenance_required = true;
            })
            .unwrap();
        state.with_inventory(|inv| inv.insert("beef".into(), 0.0));
        state.set_crisis(Some(CrisisKind::StaffInjury));

        state.reset(&mut StdRng::seed_from_u64(1));

        let snap = state.snapshot();
        assert_eq!(snap.total_occupants, 0);
        assert!(!snap.conditions.crisis_active);
        assert_eq!(snap.inventory.get("beef"), Some(&20.0));
        for station in &snap.stations {
            assert_eq!(station.cleanliness, 1.0);
            for e in &station.equipment {
                assert!(e.available);
                assert!(!e.maintenance_required);
                assert!((0.8..=1.0).contains(&e.condition), "{}: {}", e.name, e.condition);
            }
        }
    }

    #[test]
    fn reset_assigns_temperatures_by_profile() {
        let snap = kitchen().snapshot();
        let oven = snap.station(StationKind::Bake).unwrap().equipment("convection_oven").unwrap();
        let grill = snap.station(StationKind::Grill).unwrap().equipment("gas_grill").unwrap();
        let fridge = snap.station(StationKind::Cold).unwrap().equipment("refrigeration").unwrap();
        assert!((180.0..220.0).contains(&oven.temperature.unwrap()));
        assert!((200.0..300.0).contains(&grill.temperature.unwrap()));
        assert!((2.0..4.0).contains(&fridge.temperature.unwrap()));
        assert!(snap.station(StationKind::Prep).unwrap().equipment("cutting_board").unwrap().temperature.is_none());
    }

    #[test]
    fn tick_derives_mode_from_occupants() {
        let state = kitchen();
        assert_eq!(state.tick(), OperatingMode::Idle);

        occupy(&state, StationKind::Prep, "a");
        assert_eq!(state.tick(), OperatingMode::Prep);

        occupy(&state, StationKind::Prep, "b");
        occupy(&state, StationKind::Grill, "c");
        occupy(&state, StationKind::Grill, "d");
        assert_eq!(state.tick(), OperatingMode::Service);

        for (kind, actor) in [
            (StationKind::Saute, "e"),
            (StationKind::Saute, "f"),
            (StationKind::Bake, "g"),
            (StationKind::Bake, "h"),
        ] {
            occupy(&state, kind, actor);
        }
        assert_eq!(state.tick(), OperatingMode::Rush);
        let conditions = state.conditions();
        assert!((conditions.rush_multiplier - 1.4).abs() < 1e-9);
        assert!((conditions.noise_level - 0.8).abs() < 1e-9);
    }

    #[test]
    fn heat_sources_raise_temperature_and_humidity_with_caps() {
        let state = kitchen();
        state
            .with_station(StationKind::Grill, |s| {
                s.equipment_mut("gas_grill").unwrap().in_use_by = Some("a".into());
            })
            .unwrap();
        state
            .with_station(StationKind::Saute, |s| {
                s.equipment_mut("gas_burners").unwrap().in_use_by = Some("b".into());
                s.equipment_mut("sauce_pots").unwrap().in_use_by = Some("b".into());
            })
            .unwrap();
        state.tick();
        let conditions = state.conditions();
        assert_eq!(conditions.temperature, 24.0);
        assert_eq!(conditions.humidity, 66.0);
        assert!(conditions.temperature <= MAX_TEMPERATURE);
    }

    #[test]
    fn tick_preserves_crisis_flag() {
        let state = kitchen();
        state.set_crisis(Some(CrisisKind::LargeOrder));
        state.tick();
        let conditions = state.conditions();
        assert!(conditions.crisis_active);
        assert_eq!(conditions.crisis_kind, Some(CrisisKind::LargeOrder));
    }

    #[test]
    fn station_for_equipment_finds_owner() {
        let state = kitchen();
        assert_eq!(state.station_for_equipment("sauce_pots"), Some(StationKind::Saute));
        assert_eq!(state.station_for_equipment("wok"), None);
    }

    #[test]
    fn snapshot_is_detached_copy() {
        let state = kitchen();
        let mut snap = state.snapshot();
        snap.stations[0].occupants.insert("ghost".into());
        assert_eq!(state.total_occupants(), 0);
    }
}
