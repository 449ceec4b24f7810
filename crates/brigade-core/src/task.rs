//! Work items, batches and their terminal outcomes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::actor::{ActionResult, ActorError};
use crate::types::{ActorId, StationKind};

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// Upper bound on free-form annotations carried by items and results.
pub const MAX_TAGS: usize = 16;

/// Bounded string map for data that has no named field.
///
/// Inserts beyond [`MAX_TAGS`] distinct keys are dropped; overwriting an
/// existing key always succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the map is full and `key` is new.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.0.len() >= MAX_TAGS && !self.0.contains_key(&key) {
            return false;
        }
        self.0.insert(key, value.into());
        true
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = Tags::new();
        for (k, v) in iter {
            tags.insert(k, v);
        }
        tags
    }
}

// ---------------------------------------------------------------------------
// WorkKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkKind {
    Setup,
    Prep,
    Cook,
    Plate,
    Clean,
    EmergencyRepair,
    EmergencyRestock,
    RushOrder,
    Sanitation,
    CrisisResponse,
}

impl WorkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkKind::Setup => "setup",
            WorkKind::Prep => "prep",
            WorkKind::Cook => "cook",
            WorkKind::Plate => "plate",
            WorkKind::Clean => "clean",
            WorkKind::EmergencyRepair => "emergency_repair",
            WorkKind::EmergencyRestock => "emergency_restock",
            WorkKind::RushOrder => "rush_order",
            WorkKind::Sanitation => "sanitation",
            WorkKind::CrisisResponse => "crisis_response",
        }
    }

    /// Station used when the item does not pin one.
    pub fn primary_station(self) -> StationKind {
        match self {
            WorkKind::Setup | WorkKind::Prep | WorkKind::EmergencyRestock => StationKind::Prep,
            WorkKind::Cook => StationKind::Saute,
            WorkKind::RushOrder => StationKind::Grill,
            WorkKind::Plate | WorkKind::CrisisResponse => StationKind::Expedite,
            WorkKind::Clean | WorkKind::Sanitation | WorkKind::EmergencyRepair => StationKind::Wash,
        }
    }

    /// Alternatives tried in order under the fallback contention policy.
    pub fn fallback_stations(self) -> &'static [StationKind] {
        match self {
            WorkKind::Setup | WorkKind::Prep | WorkKind::EmergencyRestock => &[StationKind::Cold],
            WorkKind::Cook | WorkKind::RushOrder => {
                &[StationKind::Grill, StationKind::Saute, StationKind::Bake]
            }
            WorkKind::Plate => &[StationKind::Prep],
            WorkKind::Clean => &[StationKind::Prep],
            WorkKind::Sanitation | WorkKind::EmergencyRepair | WorkKind::CrisisResponse => &[],
        }
    }

    /// Items whose completion undoes a crisis effect.
    pub fn restores_resource(self) -> bool {
        matches!(
            self,
            WorkKind::EmergencyRepair | WorkKind::EmergencyRestock | WorkKind::Sanitation
        )
    }
}

impl fmt::Display for WorkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// WorkItem
// ---------------------------------------------------------------------------

/// One unit of work handed to exactly one actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub kind: WorkKind,
    pub description: String,
    /// Higher runs first when a phase sorts its items.
    pub priority: u8,
    pub estimated_minutes: f64,
    /// Pinned station. `None` routes through `kind.primary_station()`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station: Option<StationKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub equipment: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingredients: Vec<String>,
    /// Items that must have completed before this one is dispatched.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe_id: Option<String>,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
}

impl WorkItem {
    pub fn new(kind: WorkKind, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            description: description.into(),
            priority: 1,
            estimated_minutes: 5.0,
            station: None,
            equipment: Vec::new(),
            ingredients: Vec::new(),
            depends_on: BTreeSet::new(),
            recipe_id: None,
            tags: Tags::new(),
        }
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn estimated(mut self, minutes: f64) -> Self {
        self.estimated_minutes = minutes;
        self
    }

    pub fn at_station(mut self, station: StationKind) -> Self {
        self.station = Some(station);
        self
    }

    pub fn with_equipment(mut self, name: impl Into<String>) -> Self {
        self.equipment.push(name.into());
        self
    }

    pub fn with_ingredient(mut self, name: impl Into<String>) -> Self {
        self.ingredients.push(name.into());
        self
    }

    pub fn after(mut self, id: Uuid) -> Self {
        self.depends_on.insert(id);
        self
    }

    pub fn for_recipe(mut self, recipe_id: impl Into<String>) -> Self {
        self.recipe_id = Some(recipe_id.into());
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key, value);
        self
    }

    pub fn target_station(&self) -> StationKind {
        self.station.unwrap_or_else(|| self.kind.primary_station())
    }
}

// ---------------------------------------------------------------------------
// TaskBatch
// ---------------------------------------------------------------------------

/// Ordered items released together for one scheduling round.
#[derive(Debug, Clone, Default)]
pub struct TaskBatch {
    pub items: Vec<WorkItem>,
}

impl TaskBatch {
    pub fn new(items: Vec<WorkItem>) -> Self {
        Self { items }
    }

    /// Highest priority first; ties keep generation order.
    pub fn by_priority(mut items: Vec<WorkItem>) -> Self {
        items.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ---------------------------------------------------------------------------
// TaskState / TaskError / TaskOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Completed,
    Failed,
    TimedOut,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a task did not complete. Recorded, never propagated.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskError {
    #[error("actor error: {message}")]
    Actor { message: String },

    #[error("resource unavailable: {message}")]
    ResourceUnavailable { message: String },

    #[error("dependency {dependency} has not completed")]
    UnmetDependency { dependency: Uuid },

    #[error("task panicked: {message}")]
    Panicked { message: String },

    #[error("timed out after {after_ms}ms")]
    TimedOut { after_ms: u64 },
}

impl TaskError {
    pub fn kind(&self) -> &'static str {
        match self {
            TaskError::Actor { .. } => "actor",
            TaskError::ResourceUnavailable { .. } => "resource_unavailable",
            TaskError::UnmetDependency { .. } => "unmet_dependency",
            TaskError::Panicked { .. } => "panicked",
            TaskError::TimedOut { .. } => "timed_out",
        }
    }
}

impl From<ActorError> for TaskError {
    fn from(e: ActorError) -> Self {
        TaskError::Actor {
            message: e.to_string(),
        }
    }
}

/// Terminal record for one dispatched item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: Uuid,
    pub kind: WorkKind,
    pub description: String,
    pub actor: ActorId,
    pub state: TaskState,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ActionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

impl TaskOutcome {
    pub fn is_completed(&self) -> bool {
        self.state == TaskState::Completed
    }
}

// ---------------------------------------------------------------------------
// BatchOutcome
// ---------------------------------------------------------------------------

/// Everything a `run_batch` call produced, in dispatch order per group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub outcomes: Vec<TaskOutcome>,
    /// Items never dispatched because the run was cancelled between groups.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<Uuid>,
}

impl BatchOutcome {
    fn count(&self, state: TaskState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    pub fn completed(&self) -> usize {
        self.count(TaskState::Completed)
    }

    /// Failures excluding timeouts.
    pub fn failed(&self) -> usize {
        self.count(TaskState::Failed)
    }

    pub fn timed_out(&self) -> usize {
        self.count(TaskState::TimedOut)
    }

    pub fn outcome(&self, task_id: Uuid) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.task_id == task_id)
    }

    pub fn extend(&mut self, other: BatchOutcome) {
        self.outcomes.extend(other.outcomes);
        self.skipped.extend(other.skipped);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
