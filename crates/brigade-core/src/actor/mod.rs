//! The actor boundary: the single capability the core consumes, plus the
//! bookkeeping the runner keeps per actor.

mod parse;

pub use parse::{parse_action, ActionKind, ActionResult, ActorRole};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cancel::CancelSignal;
use crate::environment::EnvironmentSnapshot;
use crate::task::{TaskOutcome, TaskState, WorkItem};
use crate::types::{ActorId, Phase};

// ---------------------------------------------------------------------------
// Actor trait
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActorError {
    #[error("{0}")]
    Failed(String),

    #[error("cancelled")]
    Cancelled,

    #[error("actor unavailable: {0}")]
    Unavailable(String),
}

/// Everything an actor sees for one call.
#[derive(Debug, Clone)]
pub struct ActContext {
    pub scenario_id: String,
    pub phase: Phase,
    pub item: WorkItem,
    pub environment: EnvironmentSnapshot,
    /// Fires when the call's group deadline passes. Honouring it is optional;
    /// the scheduler stops waiting either way.
    pub cancel: CancelSignal,
}

/// An external participant that performs one work item per call.
///
/// Implementations may be slow or fail; the core treats every call as an
/// opaque remote invocation.
#[async_trait]
pub trait Actor: Send + Sync {
    fn id(&self) -> &ActorId;

    fn role(&self) -> ActorRole;

    async fn act(&self, ctx: ActContext) -> Result<ActionResult, ActorError>;
}

// ---------------------------------------------------------------------------
// ActorStats
// ---------------------------------------------------------------------------

const ENERGY_PER_TASK: f64 = 0.02;
const FAILURE_STRESS: f64 = 0.05;
const CRISIS_STRESS: f64 = 0.2;
const TIME_PRESSURE_STRESS: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorStats {
    pub tasks_assigned: u32,
    pub tasks_completed: u32,
    pub tasks_failed: u32,
    /// Subset of `tasks_failed`.
    pub tasks_timed_out: u32,
    pub busy_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action: Option<String>,
    pub stress: f64,
    pub energy: f64,
    pub performance: f64,
}

impl Default for ActorStats {
    fn default() -> Self {
        Self {
            tasks_assigned: 0,
            tasks_completed: 0,
            tasks_failed: 0,
            tasks_timed_out: 0,
            busy_ms: 0,
            last_action: None,
            stress: 0.0,
            energy: 1.0,
            performance: 1.0,
        }
    }
}

impl ActorStats {
    /// Fold one terminal outcome into the counters.
    pub fn record(&mut self, outcome: &TaskOutcome) {
        self.tasks_assigned += 1;
        self.busy_ms += outcome.duration_ms;
        self.energy = (self.energy - ENERGY_PER_TASK).max(0.0);

        let base = match outcome.state {
            TaskState::Completed => {
                self.tasks_completed += 1;
                1.0
            }
            TaskState::Failed | TaskState::TimedOut => {
                self.tasks_failed += 1;
                if outcome.state == TaskState::TimedOut {
                    self.tasks_timed_out += 1;
                }
                self.add_stress(FAILURE_STRESS);
                0.5
            }
        };
        let secs = outcome.duration_ms as f64 / 1000.0;
        let time_factor = (1.0 - secs / 300.0).max(0.1);
        self.performance = 0.8 * self.performance + 0.2 * (base * time_factor);

        if let Some(result) = &outcome.result {
            self.last_action = Some(result.summary.clone());
        } else if let Some(err) = &outcome.error {
            self.last_action = Some(format!("{}: {err}", outcome.description));
        }
    }

    pub fn apply_time_pressure(&mut self, time_pressure: f64) {
        self.add_stress(TIME_PRESSURE_STRESS * time_pressure);
    }

    pub fn apply_crisis(&mut self) {
        self.add_stress(CRISIS_STRESS);
    }

    fn add_stress(&mut self, amount: f64) {
        self.stress = (self.stress + amount).clamp(0.0, 1.0);
    }
}

// ---------------------------------------------------------------------------
// ActorHandle
// ---------------------------------------------------------------------------

/// An actor plus the runner's bookkeeping for it.
#[derive(Clone)]
pub struct ActorHandle {
    actor: Arc<dyn Actor>,
    pub stats: ActorStats,
}

impl ActorHandle {
    pub fn new(actor: Arc<dyn Actor>) -> Self {
        Self {
            actor,
            stats: ActorStats::default(),
        }
    }

    pub fn id(&self) -> &ActorId {
        self.actor.id()
    }

    pub fn role(&self) -> ActorRole {
        self.actor.role()
    }

    pub fn actor(&self) -> Arc<dyn Actor> {
        Arc::clone(&self.actor)
    }
}

impl std::fmt::Debug for ActorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorHandle")
            .field("id", self.id())
            .field("role", &self.role())
            .field("stats", &self.stats)
            .finish()
    }
}
