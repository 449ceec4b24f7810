//! Live progress events for a scenario run.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::task::TaskState;
use crate::types::{ActorId, CrisisKind, Phase, RunStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    ScenarioStarted {
        run_id: Uuid,
        scenario_id: String,
    },
    PhaseChanged {
        run_id: Uuid,
        phase: Phase,
    },
    TaskFinished {
        run_id: Uuid,
        phase: Phase,
        task_id: Uuid,
        actor: ActorId,
        state: TaskState,
    },
    CrisisOccurred {
        run_id: Uuid,
        crisis_id: Uuid,
        kind: CrisisKind,
    },
    CrisisResolved {
        run_id: Uuid,
        crisis_id: Uuid,
        kind: CrisisKind,
    },
    ScenarioFinished {
        run_id: Uuid,
        status: RunStatus,
    },
}

/// Fire-and-forget publisher. Sending never blocks; with no subscribers the
/// event is dropped, and slow subscribers see `Lagged`.
#[derive(Debug, Clone)]
pub struct EventSink {
    run_id: Uuid,
    tx: broadcast::Sender<RunEvent>,
}

impl EventSink {
    pub fn new(run_id: Uuid, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { run_id, tx }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: RunEvent) {
        let _ = self.tx.send(event);
    }
}
