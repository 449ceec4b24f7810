//! The scenario phase machine.
//!
//! One [`ScenarioRunner`] drives one run: it owns the run's environment,
//! walks the phases in order, hands each phase's items to the scheduler and
//! folds the outcomes into an [`ExecutionResult`]. The result always leaves
//! with a terminal status.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::actor::{ActContext, Actor, ActorHandle};
use crate::aggregate::{ExecutionResult, PhaseSnapshot, ResultAggregator};
use crate::allocator::ResourceAllocator;
use crate::cancel::CancelSignal;
use crate::config::{BrigadeConfig, ScenarioConfig};
use crate::disruption::{CrisisEvent, CrisisResponse, DisruptionInjector, Resolution};
use crate::environment::EnvironmentState;
use crate::error::{BrigadeError, Result};
use crate::events::{EventSink, RunEvent};
use crate::plan::{cleaned_stations, PhasePlan, ScenarioPlanner};
use crate::recipe::RecipeBook;
use crate::scheduler::{panic_message, TaskBatchScheduler};
use crate::store::RunRepository;
use crate::task::{BatchOutcome, TaskBatch, WorkItem, WorkKind};
use crate::types::{Phase, RunStatus};

const EVENT_CAPACITY: usize = 256;
const CRISIS_RESPONDERS: usize = 2;

// ---------------------------------------------------------------------------
// ScenarioRunner
// ---------------------------------------------------------------------------

pub struct ScenarioRunner {
    config: ScenarioConfig,
    engine: BrigadeConfig,
    book: Arc<RecipeBook>,
    actors: Vec<Arc<dyn Actor>>,
    repository: Option<Arc<dyn RunRepository>>,
    cancel: CancelSignal,
    events: EventSink,
}

impl ScenarioRunner {
    pub fn new(config: ScenarioConfig, engine: BrigadeConfig, book: Arc<RecipeBook>) -> Self {
        Self {
            config,
            engine,
            book,
            actors: Vec::new(),
            repository: None,
            cancel: CancelSignal::never(),
            events: EventSink::new(Uuid::new_v4(), EVENT_CAPACITY),
        }
    }

    /// Actors offered to the run. SETUP takes as many as the scenario needs,
    /// in the order given.
    pub fn with_actors(mut self, actors: Vec<Arc<dyn Actor>>) -> Self {
        self.actors = actors;
        self
    }

    pub fn with_repository(mut self, repository: Arc<dyn RunRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.events.run_id()
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    /// Drive the run to a terminal status.
    pub async fn run(self) -> ExecutionResult {
        let ScenarioRunner {
            config,
            engine,
            book,
            actors,
            repository,
            cancel,
            events,
        } = self;
        let run_id = events.run_id();

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let env = Arc::new(EnvironmentState::new(&mut rng));
        let allocator = Arc::new(ResourceAllocator::new(
            Arc::clone(&env),
            StdRng::seed_from_u64(rng.gen()),
            engine.disruption.clone(),
        ));
        let scheduler = TaskBatchScheduler::new(
            Arc::clone(&allocator),
            engine.scheduler.clone(),
            config.scenario_id.clone(),
        )
        .with_cancel(cancel.clone())
        .with_events(events.clone());

        let mut run = Run {
            config: &config,
            engine: &engine,
            allocator,
            injector: DisruptionInjector::new(config.crisis_probability, &engine.disruption),
            aggregator: ResultAggregator::new(engine.scoring.clone()),
            scheduler,
            rng,
            team: Vec::new(),
            result: ExecutionResult::new(run_id, &config),
            events: events.clone(),
            repository,
            deadline: Instant::now() + config.duration_budget(),
        };

        events.emit(RunEvent::ScenarioStarted {
            run_id,
            scenario_id: config.scenario_id.clone(),
        });
        info!(scenario_id = %config.scenario_id, %run_id, "scenario started");

        if let Err(e) = config.validate() {
            run.result.record_error(None, "invalid_config", e.to_string());
            run.result.finish(RunStatus::Failed);
        } else {
            let mut planner = ScenarioPlanner::new(&config, &book, &env);
            run.phases(&mut planner, actors, &cancel).await;
        }

        run.close().await
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Per-run state. Created when a run starts and dropped when it ends.
struct Run<'a> {
    config: &'a ScenarioConfig,
    engine: &'a BrigadeConfig,
    allocator: Arc<ResourceAllocator>,
    injector: DisruptionInjector,
    aggregator: ResultAggregator,
    scheduler: TaskBatchScheduler,
    rng: StdRng,
    team: Vec<ActorHandle>,
    result: ExecutionResult,
    events: EventSink,
    repository: Option<Arc<dyn RunRepository>>,
    deadline: Instant,
}

impl Run<'_> {
    async fn phases(
        &mut self,
        planner: &mut ScenarioPlanner<'_>,
        actors: Vec<Arc<dyn Actor>>,
        cancel: &CancelSignal,
    ) {
        let mut pool = Some(actors);
        for &phase in Phase::all() {
            if cancel.is_cancelled() {
                self.cancelled(phase);
                return;
            }

            self.result.phase = Some(phase);
            self.events.emit(RunEvent::PhaseChanged {
                run_id: self.result.run_id,
                phase,
            });
            info!(scenario_id = %self.config.scenario_id, phase = %phase, "phase started");
            let started = Instant::now();

            let step = match phase {
                Phase::Setup => self.setup(pool.take().unwrap_or_default()),
                Phase::Cooking => {
                    let plan = planner.plan(phase);
                    self.cooking(plan).await;
                    Ok(())
                }
                Phase::Service => {
                    self.service();
                    Ok(())
                }
                _ => {
                    let plan = planner.plan(phase);
                    self.execute(phase, plan.items, plan.sequential).await;
                    Ok(())
                }
            };

            let elapsed = started.elapsed().as_secs_f64();
            self.result
                .phase_timings
                .insert(phase.as_str().to_string(), elapsed);
            debug!(scenario_id = %self.config.scenario_id, phase = %phase, elapsed, "phase finished");

            if let Err(e) = step {
                error!(scenario_id = %self.config.scenario_id, phase = %phase, error = %e, "phase failed");
                self.result
                    .record_error(Some(phase), "phase_failed", e.to_string());
                self.result.finish(RunStatus::Failed);
                return;
            }

            if self.config.save_intermediate_states {
                self.result.snapshots.push(PhaseSnapshot {
                    phase,
                    captured_at: chrono::Utc::now(),
                    environment: self.allocator.environment().snapshot(),
                });
                self.persist();
            }
        }

        // Groups skipped during the last phase still mean the run was cut short.
        if cancel.is_cancelled() && self.result.tasks_skipped > 0 {
            self.cancelled(Phase::Cleanup);
        }
    }

    fn cancelled(&mut self, phase: Phase) {
        info!(scenario_id = %self.config.scenario_id, phase = %phase, "scenario cancelled");
        self.result.record_error(
            Some(phase),
            "cancelled",
            format!("cancelled before {phase} finished"),
        );
        self.result.finish(RunStatus::Cancelled);
    }

    /// Finalize scores, close open crises, persist and announce the outcome.
    async fn close(mut self) -> ExecutionResult {
        self.aggregator.record_actors(&mut self.result, &self.team);
        self.aggregator
            .finalize_scores(&mut self.result, self.team.len(), self.config);
        for crisis in self
            .result
            .crisis_events
            .iter_mut()
            .filter(|c| !c.is_resolved())
        {
            crisis.resolution = Some(Resolution::Unresolved);
        }
        self.result.finish(RunStatus::Completed);
        self.persist();

        info!(
            scenario_id = %self.config.scenario_id,
            status = %self.result.status,
            completed = self.result.tasks_completed,
            failed = self.result.tasks_failed,
            quality = self.result.quality_score,
            efficiency = self.result.efficiency_score,
            "scenario finished"
        );
        self.events.emit(RunEvent::ScenarioFinished {
            run_id: self.result.run_id,
            status: self.result.status,
        });
        self.result
    }

    fn persist(&mut self) {
        let Some(repository) = &self.repository else {
            return;
        };
        if let Err(e) = repository.save_run_snapshot(&self.result) {
            warn!(scenario_id = %self.config.scenario_id, error = %e, "failed to save run snapshot");
            self.result
                .record_error(self.result.phase, "persistence", e.to_string());
        }
    }

    // -- phases -------------------------------------------------------------

    fn setup(&mut self, actors: Vec<Arc<dyn Actor>>) -> Result<()> {
        let needed = self.config.agents_needed();
        let mut seen = HashSet::new();
        self.team = actors
            .into_iter()
            .filter(|actor| {
                let fresh = seen.insert(actor.id().clone());
                if !fresh {
                    warn!(scenario_id = %self.config.scenario_id, actor = %actor.id(), "duplicate actor id dropped");
                }
                fresh
            })
            .take(needed)
            .map(ActorHandle::new)
            .collect();
        if self.team.is_empty() {
            return Err(BrigadeError::NoActors(self.config.scenario_id.clone()));
        }
        if self.team.len() < needed {
            warn!(
                scenario_id = %self.config.scenario_id,
                needed,
                available = self.team.len(),
                "running with fewer actors than requested"
            );
        }
        info!(scenario_id = %self.config.scenario_id, actors = self.team.len(), "brigade assembled");
        Ok(())
    }

    async fn cooking(&mut self, plan: PhasePlan) {
        for handle in &mut self.team {
            handle.stats.apply_time_pressure(self.config.time_pressure);
        }

        let lookup = index_items(&plan.items);
        let limit = self.concurrency(plan.sequential);
        let timeout = self.group_timeout();
        let crises_before = self.result.crisis_events.len();

        let mut ticker = tokio::time::interval(self.engine.disruption.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut recovery = Vec::new();

        let outcome = {
            let Run {
                scheduler,
                team,
                allocator,
                injector,
                rng,
                result,
                events,
                ..
            } = self;
            let batch = scheduler.run_batch(
                Phase::Cooking,
                TaskBatch::new(plan.items),
                team,
                limit,
                timeout,
            );
            tokio::pin!(batch);
            loop {
                tokio::select! {
                    biased;
                    outcome = &mut batch => break outcome,
                    _ = ticker.tick() => recovery.extend(tick_disruptions(
                        allocator.as_ref(),
                        injector,
                        rng,
                        &mut result.crisis_events,
                        events,
                    )),
                }
            }
        };
        self.absorb(Phase::Cooking, &lookup, &outcome);

        for idx in crises_before..self.result.crisis_events.len() {
            for handle in &mut self.team {
                handle.stats.apply_crisis();
            }
            self.gather_responses(idx).await;
        }

        if !recovery.is_empty() {
            let batch = TaskBatch::by_priority(recovery);
            info!(
                scenario_id = %self.config.scenario_id,
                items = batch.len(),
                "running crisis recovery"
            );
            self.execute(Phase::Cooking, batch.items, false).await;
        }
    }

    fn service(&mut self) {
        self.result.quality_score = self.aggregator.service_quality(
            self.result.tasks_completed,
            self.result.tasks_failed,
            self.config.time_pressure,
        );
        info!(
            scenario_id = %self.config.scenario_id,
            quality = self.result.quality_score,
            "service scored"
        );
    }

    // -- helpers ------------------------------------------------------------

    async fn execute(&mut self, phase: Phase, items: Vec<WorkItem>, sequential: bool) {
        if items.is_empty() {
            return;
        }
        let lookup = index_items(&items);
        let limit = self.concurrency(sequential);
        let timeout = self.group_timeout();
        let outcome = self
            .scheduler
            .run_batch(phase, TaskBatch::new(items), &mut self.team, limit, timeout)
            .await;
        self.absorb(phase, &lookup, &outcome);
    }

    /// Fold a batch into the result and apply what completed items restore.
    fn absorb(&mut self, phase: Phase, lookup: &HashMap<Uuid, WorkItem>, outcome: &BatchOutcome) {
        self.aggregator.fold_batch(
            &mut self.result,
            phase,
            outcome,
            self.config.record_communications,
        );

        for done in outcome.outcomes.iter().filter(|o| o.is_completed()) {
            let Some(item) = lookup.get(&done.task_id) else {
                continue;
            };
            if item.kind == WorkKind::Clean {
                for station in cleaned_stations(item) {
                    if let Err(e) = self.allocator.service_station(station) {
                        self.result
                            .record_error(Some(phase), "cleaning", e.to_string());
                    }
                }
            } else if item.kind.restores_resource() {
                if let Err(e) = self.injector.recover(&self.allocator, item) {
                    self.result
                        .record_error(Some(phase), "recovery", e.to_string());
                    continue;
                }
                self.resolve_crisis(item);
            }
        }
    }

    fn resolve_crisis(&mut self, item: &WorkItem) {
        let Some(crisis_id) = item.tags.get("crisis_id") else {
            return;
        };
        let Some(event) = self
            .result
            .crisis_events
            .iter_mut()
            .find(|c| c.id.to_string() == crisis_id && !c.is_resolved())
        else {
            return;
        };
        self.injector
            .resolve(&self.allocator, event, Resolution::Recovered);
        self.events.emit(RunEvent::CrisisResolved {
            run_id: self.events.run_id(),
            crisis_id: event.id,
            kind: event.kind,
        });
    }

    /// Ask up to two actors, leads first, how they respond to a crisis.
    async fn gather_responses(&mut self, idx: usize) {
        let event = self.result.crisis_events[idx].clone();
        let mut order: Vec<usize> = (0..self.team.len()).collect();
        order.sort_by_key(|&i| !self.team[i].role().is_lead());
        order.truncate(CRISIS_RESPONDERS);

        let item = WorkItem::new(
            WorkKind::CrisisResponse,
            format!("Respond to {}: {}", event.kind, event.detail),
        )
        .priority(10)
        .tag("crisis_id", event.id.to_string());
        let snapshot = self.allocator.environment().snapshot();
        let timeout = self.group_timeout();

        let calls = order.iter().map(|&i| {
            let actor = self.team[i].actor();
            let ctx = ActContext {
                scenario_id: self.config.scenario_id.clone(),
                phase: event.phase,
                item: item.clone(),
                environment: snapshot.clone(),
                cancel: CancelSignal::never(),
            };
            async move {
                let call = AssertUnwindSafe(actor.act(ctx)).catch_unwind();
                let reply = match tokio::time::timeout(timeout, call).await {
                    Ok(Ok(Ok(action))) => Ok(action),
                    Ok(Ok(Err(e))) => Err(e.to_string()),
                    Ok(Err(panic)) => {
                        Err(format!("panicked: {}", panic_message(panic.as_ref())))
                    }
                    Err(_) => Err(format!("no response within {}ms", timeout.as_millis())),
                };
                (actor.id().clone(), reply)
            }
        });
        let replies = futures::future::join_all(calls).await;

        for (actor, reply) in replies {
            match reply {
                Ok(action) => self.result.crisis_events[idx]
                    .responses
                    .push(CrisisResponse { actor, action }),
                Err(message) => self.result.record_error(
                    Some(event.phase),
                    "crisis_response",
                    format!("{actor}: {message}"),
                ),
            }
        }
    }

    fn concurrency(&self, sequential: bool) -> usize {
        if sequential {
            1
        } else {
            self.config.max_concurrent_agents.min(self.team.len()).max(1)
        }
    }

    /// The configured group timeout, cut down to what is left of the budget.
    fn group_timeout(&self) -> Duration {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        self.engine.scheduler.group_timeout().min(remaining)
    }
}

fn index_items(items: &[WorkItem]) -> HashMap<Uuid, WorkItem> {
    items.iter().map(|i| (i.id, i.clone())).collect()
}

/// One environment tick during cooking: refresh conditions, then either roll
/// the open crisis for resolution or roll for a new one. Returns recovery
/// items for a newly triggered crisis.
fn tick_disruptions(
    allocator: &ResourceAllocator,
    injector: &DisruptionInjector,
    rng: &mut StdRng,
    crises: &mut Vec<CrisisEvent>,
    events: &EventSink,
) -> Vec<WorkItem> {
    allocator.environment().tick();

    if let Some(open) = crises.iter_mut().find(|c| !c.is_resolved()) {
        if injector.maybe_resolve(allocator, open, rng) {
            events.emit(RunEvent::CrisisResolved {
                run_id: events.run_id(),
                crisis_id: open.id,
                kind: open.kind,
            });
        }
        return Vec::new();
    }

    let Some(disruption) = injector.maybe_trigger(allocator, Phase::Cooking, rng) else {
        return Vec::new();
    };
    let crisis_id = disruption.event.id;
    events.emit(RunEvent::CrisisOccurred {
        run_id: events.run_id(),
        crisis_id,
        kind: disruption.event.kind,
    });
    crises.push(disruption.event);
    disruption
        .items
        .into_iter()
        .map(|item| item.tag("crisis_id", crisis_id.to_string()))
        .collect()
}

// ---------------------------------------------------------------------------
// Multi-run execution
// ---------------------------------------------------------------------------

/// Run several scenarios, each with its own environment. Results come back
/// in the order the runners were given.
pub async fn run_all(runners: Vec<ScenarioRunner>, parallel: bool) -> Vec<ExecutionResult> {
    if !parallel {
        let mut results = Vec::with_capacity(runners.len());
        for runner in runners {
            results.push(guarded(runner).await);
        }
        return results;
    }

    let total = runners.len();
    let mut set = JoinSet::new();
    for (i, runner) in runners.into_iter().enumerate() {
        set.spawn(async move { (i, guarded(runner).await) });
    }

    let mut slots: Vec<Option<ExecutionResult>> = vec![None; total];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((i, result)) => slots[i] = Some(result),
            Err(e) => error!(error = %e, "scenario task aborted"),
        }
    }
    slots.into_iter().flatten().collect()
}

/// Run one scenario, turning a panic inside it into a failed result.
async fn guarded(runner: ScenarioRunner) -> ExecutionResult {
    let run_id = runner.run_id();
    let config = runner.config.clone();
    match AssertUnwindSafe(runner.run()).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(scenario_id = %config.scenario_id, %message, "scenario panicked");
            let mut result = ExecutionResult::new(run_id, &config);
            result.record_error(None, "panicked", message);
            result.finish(RunStatus::Failed);
            result
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
