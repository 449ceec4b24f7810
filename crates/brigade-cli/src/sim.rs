//! Simulated kitchen staff for command-line runs.
//!
//! Each actor answers with a line of prose and hands it through
//! `parse_action`, the same adapter a text-generating actor would use.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use brigade_core::actor::{parse_action, ActContext, ActionResult, Actor, ActorError, ActorRole};
use brigade_core::task::WorkKind;
use brigade_core::types::ActorId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Chance that a cook talks to a teammate instead of reporting the work.
const CHATTER: f64 = 0.25;

const ROSTER: &[ActorRole] = &[
    ActorRole::HeadChef,
    ActorRole::SousChef,
    ActorRole::LineCook,
    ActorRole::PrepCook,
    ActorRole::GrillCook,
    ActorRole::PastryChef,
    ActorRole::Expediter,
    ActorRole::Dishwasher,
    ActorRole::KitchenPorter,
];

pub struct SimulatedActor {
    id: ActorId,
    role: ActorRole,
    peers: Vec<ActorId>,
    latency: Duration,
    failure_rate: f64,
    rng: Mutex<StdRng>,
}

impl SimulatedActor {
    /// Draw the next latency, whether this call fails, a self-assessed
    /// quality and maybe a teammate to talk to.
    fn roll(&self) -> (Duration, bool, f64, Option<&ActorId>) {
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        let jitter = rng.gen_range(0.5..1.5);
        let fails = rng.gen_bool(self.failure_rate);
        let quality = rng.gen_range(0.7..=1.0);
        let peer = if !self.peers.is_empty() && rng.gen_bool(CHATTER) {
            self.peers.get(rng.gen_range(0..self.peers.len()))
        } else {
            None
        };
        (self.latency.mul_f64(jitter), fails, quality, peer)
    }

    fn narrate(&self, ctx: &ActContext, peer: Option<&ActorId>) -> String {
        if let Some(peer) = peer {
            return format!("Assist @{peer} at the pass");
        }
        let item = &ctx.item;
        let what = &item.description;
        match item.kind {
            WorkKind::Prep => format!(
                "Chop and portion the {}",
                item.ingredients.first().map(String::as_str).unwrap_or("mise en place")
            ),
            WorkKind::Setup => format!(
                "Use the {}",
                item.equipment.first().map(String::as_str).unwrap_or("station")
            ),
            WorkKind::Cook | WorkKind::RushOrder => format!("Cook: {what}"),
            WorkKind::Plate => format!("Plate and garnish: {what}"),
            WorkKind::Clean | WorkKind::Sanitation => {
                format!("Clean down the {} station", item.target_station())
            }
            WorkKind::EmergencyRepair => format!("Operate the spare while fixing: {what}"),
            WorkKind::EmergencyRestock => format!("Fetch stock: {what}"),
            WorkKind::CrisisResponse if self.role.is_lead() => match self.peers.first() {
                Some(peer) => format!("Delegate recovery to @{peer}"),
                None => "Wait for the kitchen to settle".to_string(),
            },
            WorkKind::CrisisResponse => "Heard, chef".to_string(),
        }
    }
}

#[async_trait]
impl Actor for SimulatedActor {
    fn id(&self) -> &ActorId {
        &self.id
    }

    fn role(&self) -> ActorRole {
        self.role
    }

    async fn act(&self, ctx: ActContext) -> Result<ActionResult, ActorError> {
        let (latency, fails, quality, peer) = self.roll();
        let text = self.narrate(&ctx, peer);

        let mut cancel = ctx.cancel.clone();
        tokio::select! {
            _ = tokio::time::sleep(latency) => {}
            _ = cancel.cancelled() => return Err(ActorError::Cancelled),
        }

        if fails {
            return Err(ActorError::Failed(format!(
                "{} fumbled '{}'",
                self.id, ctx.item.description
            )));
        }
        Ok(parse_action(&text, self.role).with_quality(quality))
    }
}

/// Build `count` actors, cycling through the roster from the head chef down.
pub fn brigade(count: usize, seed: u64, latency: Duration, failure_rate: f64) -> Vec<Arc<dyn Actor>> {
    let ids: Vec<(ActorId, ActorRole)> = (0..count)
        .map(|i| {
            let role = ROSTER[i % ROSTER.len()];
            (ActorId::new(format!("{role}-{i}")), role)
        })
        .collect();

    ids.iter()
        .enumerate()
        .map(|(i, (id, role))| {
            let peers = ids
                .iter()
                .filter(|(other, _)| other != id)
                .map(|(other, _)| other.clone())
                .collect();
            Arc::new(SimulatedActor {
                id: id.clone(),
                role: *role,
                peers,
                latency,
                failure_rate: failure_rate.clamp(0.0, 1.0),
                rng: Mutex::new(StdRng::seed_from_u64(seed.wrapping_add(i as u64))),
            }) as Arc<dyn Actor>
        })
        .collect()
}
