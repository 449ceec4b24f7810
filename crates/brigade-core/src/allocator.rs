//! Station occupancy and equipment locks.
//!
//! Every mutation of [`EnvironmentState`] made by a running task goes through
//! here. Each station is guarded by its own mutex inside the environment, so
//! two tasks racing for the same station serialize and neither can push the
//! occupant set past capacity.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, warn};

use crate::config::DisruptionSettings;
use crate::environment::{baseline_inventory, EnvironmentState};
use crate::error::{BrigadeError, Result};
use crate::types::{ActorId, StationKind};

pub struct ResourceAllocator {
    env: Arc<EnvironmentState>,
    rng: Mutex<StdRng>,
    settings: DisruptionSettings,
}

impl ResourceAllocator {
    pub fn new(env: Arc<EnvironmentState>, rng: StdRng, settings: DisruptionSettings) -> Self {
        Self {
            env,
            rng: Mutex::new(rng),
            settings,
        }
    }

    pub fn environment(&self) -> &Arc<EnvironmentState> {
        &self.env
    }

    // -----------------------------------------------------------------------
    // Stations
    // -----------------------------------------------------------------------

    /// Claim a slot at `station`. Succeeds iff the station has spare capacity.
    /// An actor holds at most one slot per station, so a second claim by the
    /// same actor fails until the first is released.
    pub fn try_acquire(&self, station: StationKind, actor: &ActorId) -> bool {
        self.env
            .with_station(station, |s| {
                if s.is_full() || s.occupants.contains(actor) {
                    return false;
                }
                s.occupants.insert(actor.clone())
            })
            .unwrap_or(false)
    }

    /// Give up a slot. Releasing a slot that is not held is a no-op.
    pub fn release(&self, station: StationKind, actor: &ActorId) {
        let decay = self.settings.cleanliness_decay;
        let released = self
            .env
            .with_station(station, |s| {
                let removed = s.occupants.remove(actor);
                if removed {
                    s.cleanliness = (s.cleanliness - decay).max(0.0);
                }
                removed
            })
            .unwrap_or(false);
        if released {
            debug!(station = %station, actor = %actor, "released station");
        }
    }

    // -----------------------------------------------------------------------
    // Equipment
    // -----------------------------------------------------------------------

    /// Lock a piece of equipment for `actor`. Fails when it is broken or held
    /// by someone else.
    pub fn acquire_equipment(
        &self,
        station: StationKind,
        equipment: &str,
        actor: &ActorId,
    ) -> Result<()> {
        self.env.with_station(station, |s| -> Result<()> {
            let item = s.equipment_mut(equipment)?;
            if !item.available {
                return Err(BrigadeError::EquipmentUnavailable {
                    equipment: equipment.to_string(),
                    reason: "out of service".into(),
                });
            }
            if let Some(holder) = item.in_use_by.as_ref().filter(|h| *h != actor) {
                return Err(BrigadeError::EquipmentUnavailable {
                    equipment: equipment.to_string(),
                    reason: format!("in use by {holder}"),
                });
            }
            item.in_use_by = Some(actor.clone());
            Ok(())
        })?
    }

    /// Unlock equipment held by `actor` and wear it down. Returns true when
    /// this release broke the equipment.
    ///
    /// Below the breakdown threshold a single draw from the allocator's seeded
    /// source decides the breakdown, so a fixed seed and call order always
    /// break the same equipment.
    pub fn release_equipment(
        &self,
        station: StationKind,
        equipment: &str,
        actor: &ActorId,
    ) -> Result<bool> {
        let decay = self.settings.condition_decay;
        let threshold = self.settings.breakdown_threshold;
        let probability = self.settings.breakdown_probability;

        let broke = self.env.with_station(station, |s| -> Result<bool> {
            let item = s.equipment_mut(equipment)?;
            if item.in_use_by.as_ref() != Some(actor) {
                return Ok(false);
            }
            item.in_use_by = None;
            item.condition = (item.condition - decay).max(0.0);
            if item.condition < threshold && !item.maintenance_required {
                let roll: f64 = self.rng.lock().unwrap_or_else(|p| p.into_inner()).gen();
                if roll < probability {
                    item.available = false;
                    item.maintenance_required = true;
                    return Ok(true);
                }
            }
            Ok(false)
        })??;

        if broke {
            warn!(station = %station, equipment, "equipment broke down after use");
        }
        Ok(broke)
    }

    // -----------------------------------------------------------------------
    // Pantry
    // -----------------------------------------------------------------------

    /// Take one unit of `ingredient`. Untracked ingredients never run out.
    pub fn draw_ingredient(&self, ingredient: &str) -> Result<()> {
        self.env.with_inventory(|inv| match inv.get_mut(ingredient) {
            None => Ok(()),
            Some(level) if *level >= 1.0 => {
                *level -= 1.0;
                Ok(())
            }
            Some(_) => Err(BrigadeError::IngredientUnavailable(ingredient.to_string())),
        })
    }

    /// Refill `ingredient` to its baseline level.
    pub fn restock(&self, ingredient: &str) {
        let level = baseline_inventory().get(ingredient).copied().unwrap_or(10.0);
        self.env.with_inventory(|inv| {
            inv.insert(ingredient.to_string(), level);
        });
        debug!(ingredient, level, "restocked");
    }

    // -----------------------------------------------------------------------
    // Recovery (repair, sanitation) and disruption hooks
    // -----------------------------------------------------------------------

    pub fn repair_equipment(&self, station: StationKind, equipment: &str) -> Result<()> {
        self.env.with_station(station, |s| -> Result<()> {
            let item = s.equipment_mut(equipment)?;
            item.available = true;
            item.maintenance_required = false;
            item.condition = 1.0;
            Ok(())
        })?
    }

    /// Restore a station's cleanliness.
    pub fn service_station(&self, station: StationKind) -> Result<()> {
        self.env.with_station(station, |s| s.cleanliness = 1.0)
    }

    pub(crate) fn break_equipment(&self, station: StationKind, equipment: &str) -> Result<()> {
        self.env.with_station(station, |s| -> Result<()> {
            let item = s.equipment_mut(equipment)?;
            item.available = false;
            item.maintenance_required = true;
            Ok(())
        })?
    }

    pub(crate) fn deplete(&self, ingredient: &str) {
        self.env.with_inventory(|inv| {
            inv.insert(ingredient.to_string(), 0.0);
        });
    }

    pub(crate) fn contaminate(&self, station: StationKind, cleanliness: f64) -> Result<()> {
        self.env
            .with_station(station, |s| s.cleanliness = cleanliness.clamp(0.0, 1.0))
    }

    // -----------------------------------------------------------------------
    // Leases
    // -----------------------------------------------------------------------

    /// Claim `station` and then every named piece of equipment on it. On any
    /// failure everything claimed so far is released again.
    pub fn lease(
        self: &Arc<Self>,
        station: StationKind,
        equipment: &[String],
        actor: &ActorId,
    ) -> Result<Lease> {
        if !self.try_acquire(station, actor) {
            return Err(BrigadeError::StationFull(station.to_string()));
        }
        let mut lease = Lease {
            allocator: Arc::clone(self),
            station,
            actor: actor.clone(),
            equipment: Vec::new(),
        };
        for name in equipment {
            self.acquire_equipment(station, name, actor)?;
            lease.equipment.push(name.clone());
        }
        Ok(lease)
    }
}

/// Held resources of one running task. Dropping the lease releases equipment
/// and then the station slot, whether the task finished, failed or was
/// aborted.
pub struct Lease {
    allocator: Arc<ResourceAllocator>,
    station: StationKind,
    actor: ActorId,
    equipment: Vec<String>,
}

impl Lease {
    pub fn station(&self) -> StationKind {
        self.station
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        for name in self.equipment.drain(..) {
            if let Err(e) = self
                .allocator
                .release_equipment(self.station, &name, &self.actor)
            {
                warn!(equipment = %name, error = %e, "failed to release equipment");
            }
        }
        self.allocator.release(self.station, &self.actor);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn allocator_with(settings: DisruptionSettings, seed: u64) -> Arc<ResourceAllocator> {
        let mut rng = StdRng::seed_from_u64(seed);
        let env = Arc::new(EnvironmentState::new(&mut rng));
        Arc::new(ResourceAllocator::new(env, rng, settings))
    }

    fn allocator() -> Arc<ResourceAllocator> {
        allocator_with(DisruptionSettings::default(), 42)
    }

    #[test]
    fn try_acquire_rejects_beyond_capacity() {
        let alloc = allocator();
        assert!(alloc.try_acquire(StationKind::Grill, &"a".into()));
        assert!(alloc.try_acquire(StationKind::Grill, &"b".into()));
        assert!(!alloc.try_acquire(StationKind::Grill, &"c".into()));
        assert!(alloc.try_acquire(StationKind::Expedite, &"d".into()));
        assert!(!alloc.try_acquire(StationKind::Expedite, &"e".into()));
        let snap = alloc.environment().snapshot();
        for station in &snap.stations {
            assert!(station.occupants.len() <= station.capacity);
        }
    }

    #[test]
    fn same_actor_cannot_take_a_second_slot() {
        let alloc = allocator();
        let a = ActorId::from("a");
        assert!(alloc.try_acquire(StationKind::Expedite, &a));
        assert!(!alloc.try_acquire(StationKind::Expedite, &a));

        // not full, but the actor already holds its slot
        assert!(alloc.try_acquire(StationKind::Grill, &a));
        assert!(!alloc.try_acquire(StationKind::Grill, &a));
        assert!(alloc.try_acquire(StationKind::Grill, &"b".into()));

        alloc.release(StationKind::Expedite, &a);
        assert!(alloc.try_acquire(StationKind::Expedite, &a));
    }

    #[test]
    fn capacity_holds_under_thread_contention() {
        let alloc = allocator();
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let alloc = Arc::clone(&alloc);
                std::thread::spawn(move || {
                    let actor = ActorId::new(format!("cook-{i}"));
                    alloc.try_acquire(StationKind::Prep, &actor)
                })
            })
            .collect();
        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(granted, 3);
        let prep = alloc.environment().snapshot();
        assert_eq!(prep.station(StationKind::Prep).unwrap().occupants.len(), 3);
    }

    #[test]
    fn release_is_idempotent() {
        let alloc = allocator();
        let actor = ActorId::from("a");
        assert!(alloc.try_acquire(StationKind::Saute, &actor));
        alloc.release(StationKind::Saute, &actor);
        alloc.release(StationKind::Saute, &actor);
        let snap = alloc.environment().snapshot();
        let saute = snap.station(StationKind::Saute).unwrap();
        assert!(saute.occupants.is_empty());
        // only the first release dirties the station
        assert!((saute.cleanliness - 0.998).abs() < 1e-9);
    }

    #[test]
    fn equipment_is_exclusive_per_actor() {
        let alloc = allocator();
        let a = ActorId::from("a");
        let b = ActorId::from("b");
        alloc.acquire_equipment(StationKind::Grill, "gas_grill", &a).unwrap();
        alloc.acquire_equipment(StationKind::Grill, "gas_grill", &a).unwrap();
        let err = alloc
            .acquire_equipment(StationKind::Grill, "gas_grill", &b)
            .unwrap_err();
        assert!(err.to_string().contains("in use by a"));

        // a release by the wrong actor changes nothing
        assert!(!alloc.release_equipment(StationKind::Grill, "gas_grill", &b).unwrap());
        alloc.release_equipment(StationKind::Grill, "gas_grill", &a).unwrap();
        alloc.acquire_equipment(StationKind::Grill, "gas_grill", &b).unwrap();
    }

    #[test]
    fn unknown_equipment_is_an_error() {
        let alloc = allocator();
        let err = alloc
            .acquire_equipment(StationKind::Grill, "wok", &"a".into())
            .unwrap_err();
        assert!(matches!(err, BrigadeError::UnknownEquipment { .. }));
    }

    #[test]
    fn release_decays_condition() {
        let alloc = allocator();
        let a = ActorId::from("a");
        let before = alloc.environment().snapshot();
        let before = before
            .station(StationKind::Bake)
            .unwrap()
            .equipment("mixers")
            .unwrap()
            .condition;
        alloc.acquire_equipment(StationKind::Bake, "mixers", &a).unwrap();
        alloc.release_equipment(StationKind::Bake, "mixers", &a).unwrap();
        let after = alloc.environment().snapshot();
        let mixers = after.station(StationKind::Bake).unwrap().equipment("mixers").unwrap();
        assert!(mixers.condition < before);
        assert!(mixers.in_use_by.is_none());
    }

    #[test]
    fn breakdown_is_reproducible_under_seed() {
        let settings = DisruptionSettings {
            condition_decay: 0.2,
            breakdown_threshold: 0.9,
            breakdown_probability: 0.5,
            ..DisruptionSettings::default()
        };
        let run = |seed| {
            let alloc = allocator_with(settings.clone(), seed);
            let a = ActorId::from("a");
            let mut history = Vec::new();
            for _ in 0..4 {
                if alloc.acquire_equipment(StationKind::Cold, "cold_tools", &a).is_err() {
                    history.push(None);
                    continue;
                }
                history.push(Some(
                    alloc.release_equipment(StationKind::Cold, "cold_tools", &a).unwrap(),
                ));
            }
            history
        };
        assert_eq!(run(9), run(9));
    }

    #[test]
    fn certain_breakdown_flags_maintenance() {
        let settings = DisruptionSettings {
            condition_decay: 0.9,
            breakdown_threshold: 0.5,
            breakdown_probability: 1.0,
            ..DisruptionSettings::default()
        };
        let alloc = allocator_with(settings, 3);
        let a = ActorId::from("a");
        alloc.acquire_equipment(StationKind::Wash, "dishwasher", &a).unwrap();
        assert!(alloc.release_equipment(StationKind::Wash, "dishwasher", &a).unwrap());
        assert!(alloc
            .acquire_equipment(StationKind::Wash, "dishwasher", &a)
            .is_err());
        alloc.repair_equipment(StationKind::Wash, "dishwasher").unwrap();
        alloc.acquire_equipment(StationKind::Wash, "dishwasher", &a).unwrap();
    }

    #[test]
    fn pantry_draws_until_empty() {
        let alloc = allocator();
        alloc.deplete("salt");
        assert!(matches!(
            alloc.draw_ingredient("salt"),
            Err(BrigadeError::IngredientUnavailable(_))
        ));
        alloc.draw_ingredient("saffron").unwrap();
        alloc.restock("salt");
        alloc.draw_ingredient("salt").unwrap();
        assert_eq!(alloc.environment().inventory_level("salt"), Some(4.0));
    }

    #[test]
    fn lease_releases_on_drop() {
        let alloc = allocator();
        let a = ActorId::from("a");
        {
            let lease = alloc
                .lease(StationKind::Grill, &["gas_grill".to_string()], &a)
                .unwrap();
            assert_eq!(lease.station(), StationKind::Grill);
            assert_eq!(alloc.environment().total_occupants(), 1);
        }
        let snap = alloc.environment().snapshot();
        assert_eq!(snap.total_occupants, 0);
        let grill = snap.station(StationKind::Grill).unwrap().equipment("gas_grill").unwrap();
        assert!(grill.in_use_by.is_none());
    }

    #[test]
    fn failed_lease_rolls_back_station() {
        let alloc = allocator();
        alloc.break_equipment(StationKind::Grill, "gas_grill").unwrap();
        let res = alloc.lease(StationKind::Grill, &["gas_grill".to_string()], &"a".into());
        assert!(res.is_err());
        assert_eq!(alloc.environment().total_occupants(), 0);
    }
}
