//! Bounded fan-out of work items over a pool of actors.
//!
//! A batch is cut into groups of at most `concurrency_limit` items. Groups run
//! strictly one after another; the items of one group run concurrently on a
//! `JoinSet`, each on a different actor, under one shared deadline.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::actor::{ActContext, Actor, ActionResult, ActorHandle};
use crate::allocator::{Lease, ResourceAllocator};
use crate::cancel::{CancelHandle, CancelSignal};
use crate::config::{ContentionPolicy, SchedulerSettings};
use crate::error::BrigadeError;
use crate::events::{EventSink, RunEvent};
use crate::task::{BatchOutcome, TaskBatch, TaskError, TaskOutcome, TaskState, WorkItem};
use crate::types::{ActorId, Phase};

pub struct TaskBatchScheduler {
    allocator: Arc<ResourceAllocator>,
    settings: SchedulerSettings,
    scenario_id: String,
    cancel: CancelSignal,
    events: Option<EventSink>,
    /// Every item completed by this scheduler, across batches.
    completed: HashSet<Uuid>,
}

impl TaskBatchScheduler {
    pub fn new(
        allocator: Arc<ResourceAllocator>,
        settings: SchedulerSettings,
        scenario_id: impl Into<String>,
    ) -> Self {
        Self {
            allocator,
            settings,
            scenario_id: scenario_id.into(),
            cancel: CancelSignal::never(),
            events: None,
            completed: HashSet::new(),
        }
    }

    /// Scenario-level cancellation, checked before each group.
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = Some(events);
        self
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn is_completed(&self, id: &Uuid) -> bool {
        self.completed.contains(id)
    }

    /// Run `batch` to completion.
    ///
    /// Never fails as a whole: every dispatched item ends completed, failed or
    /// timed out, and items left behind by a cancellation are reported as
    /// skipped. Actor statistics are folded after each group returns.
    pub async fn run_batch(
        &mut self,
        phase: Phase,
        batch: TaskBatch,
        actors: &mut [ActorHandle],
        concurrency_limit: usize,
        timeout: Duration,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        if batch.is_empty() {
            return outcome;
        }
        if actors.is_empty() {
            warn!(scenario_id = %self.scenario_id, phase = %phase, "no actors; batch skipped");
            outcome.skipped = batch.items.iter().map(|i| i.id).collect();
            return outcome;
        }

        let group_size = concurrency_limit.clamp(1, actors.len());
        let groups: Vec<&[WorkItem]> = batch.items.chunks(group_size).collect();
        info!(
            scenario_id = %self.scenario_id,
            phase = %phase,
            items = batch.items.len(),
            groups = groups.len(),
            group_size,
            "running batch"
        );

        for (g, group) in groups.iter().enumerate() {
            if self.cancel.is_cancelled() {
                let remaining = groups[g..].iter().flat_map(|grp| grp.iter().map(|i| i.id));
                outcome.skipped.extend(remaining);
                info!(scenario_id = %self.scenario_id, phase = %phase, skipped = outcome.skipped.len(), "batch cancelled");
                break;
            }
            if g > 0 {
                tokio::time::sleep(self.settings.inter_group_pause()).await;
            }

            let results = self
                .run_group(phase, g * group_size, group, actors, timeout)
                .await;

            for (actor_idx, task) in results {
                actors[actor_idx].stats.record(&task);
                if task.is_completed() {
                    self.completed.insert(task.task_id);
                } else {
                    warn!(
                        scenario_id = %self.scenario_id,
                        phase = %phase,
                        task_id = %task.task_id,
                        actor = %task.actor,
                        state = %task.state,
                        error = ?task.error,
                        "task did not complete"
                    );
                }
                if let Some(events) = &self.events {
                    events.emit(RunEvent::TaskFinished {
                        run_id: events.run_id(),
                        phase,
                        task_id: task.task_id,
                        actor: task.actor.clone(),
                        state: task.state,
                    });
                }
                outcome.outcomes.push(task);
            }
        }
        outcome
    }

    /// Dispatch one group and wait for it, at most until the deadline.
    /// Results come back in group order, paired with the actor index.
    async fn run_group(
        &self,
        phase: Phase,
        base: usize,
        group: &[WorkItem],
        actors: &[ActorHandle],
        timeout: Duration,
    ) -> Vec<(usize, TaskOutcome)> {
        let deadline = Instant::now() + timeout;
        let (group_cancel, group_signal) = CancelHandle::new();
        let snapshot = self.allocator.environment().snapshot();
        let assigned: Vec<usize> = (0..group.len()).map(|i| (base + i) % actors.len()).collect();
        let mut slots: Vec<Option<TaskOutcome>> = vec![None; group.len()];
        let mut set = JoinSet::new();

        for (i, item) in group.iter().enumerate() {
            let handle = &actors[assigned[i]];
            if let Some(dep) = item.depends_on.iter().find(|d| !self.completed.contains(d)) {
                slots[i] = Some(finish(
                    item,
                    handle.id(),
                    Duration::ZERO,
                    Err(TaskError::UnmetDependency { dependency: *dep }),
                ));
                continue;
            }
            let ctx = ActContext {
                scenario_id: self.scenario_id.clone(),
                phase,
                item: item.clone(),
                environment: snapshot.clone(),
                cancel: group_signal.clone(),
            };
            let job = TaskJob {
                allocator: Arc::clone(&self.allocator),
                policy: self.settings.contention.clone(),
                actor: handle.actor(),
                actor_id: handle.id().clone(),
                item: item.clone(),
            };
            debug!(task_id = %item.id, actor = %handle.id(), kind = %item.kind, "dispatching task");
            set.spawn(async move { (i, job.run(ctx).await) });
        }

        let mut timed_out = false;
        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((i, task)))) => slots[i] = Some(task),
                Ok(Some(Err(e))) => warn!(error = %e, "task join failed"),
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    group_cancel.cancel();
                    set.abort_all();
                    // Wait for aborted tasks so their leases are released.
                    while set.join_next().await.is_some() {}
                    break;
                }
            }
        }

        let after_ms = timeout.as_millis() as u64;
        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                let task = slot.unwrap_or_else(|| {
                    let error = if timed_out {
                        TaskError::TimedOut { after_ms }
                    } else {
                        TaskError::Panicked {
                            message: "task aborted".into(),
                        }
                    };
                    finish(&group[i], actors[assigned[i]].id(), timeout, Err(error))
                });
                (assigned[i], task)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// TaskJob
// ---------------------------------------------------------------------------

/// Everything one spawned task owns.
struct TaskJob {
    allocator: Arc<ResourceAllocator>,
    policy: ContentionPolicy,
    actor: Arc<dyn Actor>,
    actor_id: ActorId,
    item: WorkItem,
}

impl TaskJob {
    async fn run(self, ctx: ActContext) -> TaskOutcome {
        let started = Instant::now();
        let lease = match self.acquire().await {
            Ok(lease) => lease,
            Err(e) => {
                return finish(
                    &self.item,
                    &self.actor_id,
                    started.elapsed(),
                    Err(TaskError::ResourceUnavailable {
                        message: e.to_string(),
                    }),
                )
            }
        };
        for ingredient in &self.item.ingredients {
            if let Err(e) = self.allocator.draw_ingredient(ingredient) {
                drop(lease);
                return finish(
                    &self.item,
                    &self.actor_id,
                    started.elapsed(),
                    Err(TaskError::ResourceUnavailable {
                        message: e.to_string(),
                    }),
                );
            }
        }

        let call = AssertUnwindSafe(self.actor.act(ctx)).catch_unwind().await;
        drop(lease);

        let result = match call {
            Ok(Ok(action)) => Ok(action),
            Ok(Err(e)) => Err(TaskError::from(e)),
            Err(panic) => Err(TaskError::Panicked {
                message: panic_message(panic.as_ref()),
            }),
        };
        finish(&self.item, &self.actor_id, started.elapsed(), result)
    }

    async fn acquire(&self) -> Result<Lease, BrigadeError> {
        let target = self.item.target_station();
        let equipment = &self.item.equipment;
        match &self.policy {
            ContentionPolicy::Fail => self.allocator.lease(target, equipment, &self.actor_id),
            ContentionPolicy::Retry {
                attempts,
                backoff_ms,
            } => {
                let mut remaining = (*attempts).max(1);
                loop {
                    match self.allocator.lease(target, equipment, &self.actor_id) {
                        Ok(lease) => return Ok(lease),
                        Err(e) if remaining <= 1 => return Err(e),
                        Err(e) => {
                            remaining -= 1;
                            debug!(task_id = %self.item.id, error = %e, remaining, "resource busy, retrying");
                            tokio::time::sleep(Duration::from_millis(*backoff_ms)).await;
                        }
                    }
                }
            }
            ContentionPolicy::Fallback => {
                let mut last = match self.allocator.lease(target, equipment, &self.actor_id) {
                    Ok(lease) => return Ok(lease),
                    Err(e) => e,
                };
                // Equipment is bound to its station, so only free-standing work moves.
                if equipment.is_empty() {
                    for station in self.item.kind.fallback_stations() {
                        if *station == target {
                            continue;
                        }
                        match self.allocator.lease(*station, equipment, &self.actor_id) {
                            Ok(lease) => return Ok(lease),
                            Err(e) => last = e,
                        }
                    }
                }
                Err(last)
            }
        }
    }
}

fn finish(
    item: &WorkItem,
    actor: &ActorId,
    elapsed: Duration,
    result: Result<ActionResult, TaskError>,
) -> TaskOutcome {
    let (state, result, error) = match result {
        Ok(action) => (TaskState::Completed, Some(action), None),
        Err(e @ TaskError::TimedOut { .. }) => (TaskState::TimedOut, None, Some(e)),
        Err(e) => (TaskState::Failed, None, Some(e)),
    };
    TaskOutcome {
        task_id: item.id,
        kind: item.kind,
        description: item.description.clone(),
        actor: actor.clone(),
        state,
        duration_ms: elapsed.as_millis() as u64,
        finished_at: Utc::now(),
        result,
        error,
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
