use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use brigade_core::actor::{ActContext, ActionKind, ActionResult, Actor, ActorError, ActorRole};
use brigade_core::aggregate::ExecutionResult;
use brigade_core::cancel::CancelHandle;
use brigade_core::config::{BrigadeConfig, ContentionPolicy, ScenarioConfig};
use brigade_core::error::BrigadeError;
use brigade_core::events::RunEvent;
use brigade_core::recipe::{Instruction, Recipe, RecipeBook};
use brigade_core::store::{MemoryRepository, RunRepository, ScenarioTemplate};
use brigade_core::types::{ActorId, Phase, RunStatus};
use brigade_core::{run_all, ScenarioRunner};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Test actors
// ---------------------------------------------------------------------------

/// Succeeds after a fixed delay. Items whose description starts with
/// `stall_prefix` sleep far longer than any group timeout. With
/// `panics_on_crisis` set, the cook panics when asked to respond to a crisis.
struct Cook {
    id: ActorId,
    role: ActorRole,
    delay: Duration,
    stall_prefix: Option<&'static str>,
    panics_on_crisis: bool,
    log: Arc<Mutex<Vec<String>>>,
    cancel_on_first_call: Mutex<Option<CancelHandle>>,
}

impl Cook {
    fn new(name: &str, delay_ms: u64) -> Self {
        Self {
            id: ActorId::new(name),
            role: ActorRole::LineCook,
            delay: Duration::from_millis(delay_ms),
            stall_prefix: None,
            panics_on_crisis: false,
            log: Arc::new(Mutex::new(Vec::new())),
            cancel_on_first_call: Mutex::new(None),
        }
    }
}

/// Pushes `dropped:<phase>` when the call future is dropped before finishing.
struct DropMarker {
    log: Arc<Mutex<Vec<String>>>,
    label: String,
    armed: bool,
}

impl Drop for DropMarker {
    fn drop(&mut self) {
        if self.armed {
            self.log.lock().unwrap().push(format!("dropped:{}", self.label));
        }
    }
}

#[async_trait]
impl Actor for Cook {
    fn id(&self) -> &ActorId {
        &self.id
    }

    fn role(&self) -> ActorRole {
        self.role
    }

    async fn act(&self, ctx: ActContext) -> Result<ActionResult, ActorError> {
        if let Some(handle) = self.cancel_on_first_call.lock().unwrap().take() {
            handle.cancel();
        }

        let phase = ctx.phase.as_str();
        self.log.lock().unwrap().push(format!("start:{phase}"));
        let mut marker = DropMarker {
            log: Arc::clone(&self.log),
            label: phase.to_string(),
            armed: true,
        };

        let stalls = self
            .stall_prefix
            .is_some_and(|p| ctx.item.description.starts_with(p));
        let delay = if stalls {
            Duration::from_secs(10)
        } else if ctx.item.description.starts_with("Respond") {
            if self.panics_on_crisis {
                panic!("{} froze at the pass", self.id);
            }
            Duration::from_millis(1)
        } else {
            self.delay
        };
        tokio::time::sleep(delay).await;

        marker.armed = false;
        self.log.lock().unwrap().push(format!("end:{phase}"));
        Ok(ActionResult::new(ActionKind::Cook, ctx.item.description))
    }
}

fn cooks(n: usize, delay_ms: u64) -> Vec<Arc<dyn Actor>> {
    (0..n)
        .map(|i| Arc::new(Cook::new(&format!("cook-{i}"), delay_ms)) as Arc<dyn Actor>)
        .collect()
}

/// Always talks to the other cook.
struct Talker {
    id: ActorId,
    partner: ActorId,
}

#[async_trait]
impl Actor for Talker {
    fn id(&self) -> &ActorId {
        &self.id
    }

    fn role(&self) -> ActorRole {
        ActorRole::LineCook
    }

    async fn act(&self, ctx: ActContext) -> Result<ActionResult, ActorError> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(ActionResult::new(ActionKind::Communicate, ctx.item.description).to(self.partner.clone()))
    }
}

struct BrokenRepository;

impl RunRepository for BrokenRepository {
    fn save_run_snapshot(&self, _result: &ExecutionResult) -> brigade_core::Result<()> {
        Err(BrigadeError::RunStore("disk full".into()))
    }

    fn load_scenario_templates(&self) -> brigade_core::Result<Vec<ScenarioTemplate>> {
        Ok(Vec::new())
    }

    fn list_runs(&self) -> brigade_core::Result<Vec<ExecutionResult>> {
        Ok(Vec::new())
    }

    fn load_run(&self, run_id: Uuid) -> brigade_core::Result<ExecutionResult> {
        Err(BrigadeError::RunNotFound(run_id.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn basic_config() -> ScenarioConfig {
    let mut cfg = ScenarioConfig::new("basic");
    cfg.duration_minutes = 5;
    cfg.max_agents = 2;
    cfg.max_concurrent_agents = 2;
    cfg.crisis_probability = 0.0;
    cfg.recipes = vec!["r1".into()];
    cfg.seed = Some(42);
    cfg
}

fn runner(cfg: ScenarioConfig, engine: BrigadeConfig) -> ScenarioRunner {
    ScenarioRunner::new(cfg, engine, Arc::new(RecipeBook::sample()))
}

/// Four one-step recipes, each cooked at a different station.
fn spread_book() -> RecipeBook {
    let recipe = |id: &str, equipment: &str| Recipe {
        id: id.into(),
        name: format!("dish {id}"),
        ingredients: Vec::new(),
        equipment: Vec::new(),
        instructions: vec![Instruction {
            text: format!("Cook {id}"),
            duration_minutes: Some(5.0),
            temperature: None,
            equipment: Some(equipment.into()),
            techniques: Vec::new(),
        }],
    };
    RecipeBook::new([
        recipe("grill", "gas_grill"),
        recipe("oven", "convection_oven"),
        recipe("salad", "salad_station"),
        recipe("pot", "sauce_pots"),
    ])
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn basic_scenario_completes_cleanly() {
    let result = runner(basic_config(), BrigadeConfig::default())
        .with_actors(cooks(2, 10))
        .run()
        .await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.tasks_failed, 0);
    assert_eq!(result.efficiency_score, 1.0);
    assert_eq!(result.recipes_completed, 1);
    assert!(result.tasks_completed > 0);
    assert_eq!(result.actor_performance.len(), 2);
    assert!(result.ended_at.is_some());
}

#[tokio::test]
async fn preparation_fully_resolves_before_cooking() {
    let mut engine = BrigadeConfig::default();
    engine.scheduler.group_timeout_ms = 100;

    let log = Arc::new(Mutex::new(Vec::new()));
    let actors: Vec<Arc<dyn Actor>> = (0..2)
        .map(|i| {
            let mut cook = Cook::new(&format!("cook-{i}"), 5);
            cook.stall_prefix = Some("Prepare fish");
            cook.log = Arc::clone(&log);
            Arc::new(cook) as Arc<dyn Actor>
        })
        .collect();

    let result = runner(basic_config(), engine)
        .with_actors(actors)
        .run()
        .await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.tasks_timed_out, 1);

    let log = log.lock().unwrap();
    let first_cook = log.iter().position(|e| e == "start:cooking").unwrap();
    let dropped = log.iter().position(|e| e == "dropped:preparation").unwrap();
    assert!(dropped < first_cook);
    assert!(log[first_cook..].iter().all(|e| !e.ends_with(":preparation")));
}

#[tokio::test]
async fn same_seed_gives_identical_scores() {
    let run = || async {
        let actors: Vec<Arc<dyn Actor>> = vec![
            Arc::new(Talker {
                id: ActorId::new("a"),
                partner: ActorId::new("b"),
            }),
            Arc::new(Talker {
                id: ActorId::new("b"),
                partner: ActorId::new("a"),
            }),
        ];
        runner(basic_config(), BrigadeConfig::default())
            .with_actors(actors)
            .run()
            .await
    };
    let first = run().await;
    let second = run().await;

    assert_eq!(first.quality_score.to_bits(), second.quality_score.to_bits());
    assert_eq!(first.efficiency_score.to_bits(), second.efficiency_score.to_bits());
    assert_eq!(
        first.collaboration_score.to_bits(),
        second.collaboration_score.to_bits()
    );
    assert!(first.communication_count > 0);
}

#[tokio::test]
async fn busy_kitchen_raises_and_records_crises() {
    let runner = ScenarioRunner::new(
        crisis_config(7, 1.0),
        retrying_engine(),
        Arc::new(spread_book()),
    )
    .with_actors(cooks(4, 200));
    let mut events = runner.subscribe();
    let result = runner.run().await;

    assert!(result.status.is_terminal());
    assert!(!result.crisis_events.is_empty());
    for crisis in &result.crisis_events {
        assert_eq!(crisis.phase, Phase::Cooking);
        assert!(crisis.resolution.is_some());
        assert!(crisis.responses.len() <= 2);
    }
    assert!(result
        .actor_performance
        .values()
        .all(|perf| perf.stress > 0.0));

    let mut saw_crisis = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, RunEvent::CrisisOccurred { .. }) {
            saw_crisis = true;
        }
    }
    assert!(saw_crisis);
}

fn crisis_config(seed: u64, probability: f64) -> ScenarioConfig {
    let mut cfg = ScenarioConfig::new("crisis");
    cfg.max_agents = 4;
    cfg.max_concurrent_agents = 4;
    cfg.crisis_probability = probability;
    cfg.recipes = vec!["grill".into(), "oven".into(), "salad".into(), "pot".into()];
    cfg.seed = Some(seed);
    cfg
}

fn retrying_engine() -> BrigadeConfig {
    let mut engine = BrigadeConfig::default();
    engine.scheduler.contention = ContentionPolicy::Retry {
        attempts: 50,
        backoff_ms: 5,
    };
    engine
}

#[tokio::test]
async fn panicking_crisis_responder_still_yields_a_result() {
    let actors: Vec<Arc<dyn Actor>> = (0..4)
        .map(|i| {
            let mut cook = Cook::new(&format!("cook-{i}"), 200);
            cook.panics_on_crisis = true;
            Arc::new(cook) as Arc<dyn Actor>
        })
        .collect();
    let runner = ScenarioRunner::new(
        crisis_config(7, 1.0),
        retrying_engine(),
        Arc::new(spread_book()),
    )
    .with_actors(actors);

    let result = tokio::spawn(runner.run())
        .await
        .expect("run must not unwind");

    assert!(result.status.is_terminal());
    assert!(!result.crisis_events.is_empty());
    assert!(result.crisis_events.iter().all(|c| c.responses.is_empty()));
    assert!(result
        .errors
        .iter()
        .any(|e| e.kind == "crisis_response" && e.message.contains("panicked")));
}

#[tokio::test]
async fn same_seed_replays_the_same_crises() {
    let mut engine = retrying_engine();
    engine.disruption.tick_interval_ms = 50;

    let run = |seed: u64| {
        let engine = engine.clone();
        async move {
            ScenarioRunner::new(crisis_config(seed, 0.5), engine, Arc::new(spread_book()))
                .with_actors(cooks(4, 175))
                .run()
                .await
        }
    };
    let crises = |r: &ExecutionResult| {
        r.crisis_events
            .iter()
            .map(|c| (c.kind, c.resolution))
            .collect::<Vec<_>>()
    };

    let mut total_crises = 0;
    for seed in 1..=3 {
        let first = run(seed).await;
        let second = run(seed).await;

        assert_eq!(first.status, second.status, "seed {seed}");
        assert_eq!(crises(&first), crises(&second), "seed {seed}");
        assert_eq!(first.tasks_completed, second.tasks_completed, "seed {seed}");
        assert_eq!(first.tasks_failed, second.tasks_failed, "seed {seed}");
        assert_eq!(first.quality_score.to_bits(), second.quality_score.to_bits());
        assert_eq!(first.efficiency_score.to_bits(), second.efficiency_score.to_bits());
        assert_eq!(
            first.collaboration_score.to_bits(),
            second.collaboration_score.to_bits()
        );
        total_crises += first.crisis_events.len();
    }
    assert!(total_crises > 0);
}

#[tokio::test]
async fn no_actors_fails_at_setup() {
    let result = runner(basic_config(), BrigadeConfig::default()).run().await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.phase, Some(Phase::Setup));
    assert!(result.phase_timings.contains_key("setup"));
    assert!(!result.phase_timings.contains_key("preparation"));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].phase, Some(Phase::Setup));
}

#[tokio::test]
async fn cancellation_stops_between_phases() {
    let (handle, signal) = CancelHandle::new();
    let first = Cook::new("cook-0", 10);
    *first.cancel_on_first_call.lock().unwrap() = Some(handle);
    let actors: Vec<Arc<dyn Actor>> = vec![Arc::new(first), Arc::new(Cook::new("cook-1", 10))];

    let result = runner(basic_config(), BrigadeConfig::default())
        .with_actors(actors)
        .with_cancel(signal)
        .run()
        .await;

    assert_eq!(result.status, RunStatus::Cancelled);
    assert!(result.phase_timings.contains_key("preparation"));
    assert!(!result.phase_timings.contains_key("cooking"));
    assert!(result.tasks_skipped > 0);
}

#[tokio::test]
async fn save_failure_keeps_terminal_status() {
    let mut cfg = basic_config();
    cfg.save_intermediate_states = false;
    let result = runner(cfg, BrigadeConfig::default())
        .with_actors(cooks(2, 5))
        .with_repository(Arc::new(BrokenRepository))
        .run()
        .await;

    assert_eq!(result.status, RunStatus::Completed);
    assert!(result.errors.iter().any(|e| e.kind == "persistence"));
}

#[tokio::test]
async fn finished_runs_are_stored() {
    let repo = Arc::new(MemoryRepository::new());
    let result = runner(basic_config(), BrigadeConfig::default())
        .with_actors(cooks(2, 5))
        .with_repository(repo.clone())
        .run()
        .await;

    let stored = repo.load_run(result.run_id).unwrap();
    assert_eq!(stored.status, RunStatus::Completed);
    assert_eq!(stored.tasks_completed, result.tasks_completed);
}

#[tokio::test]
async fn sequential_run_all_gives_each_run_its_own_kitchen() {
    let runners = (0..2)
        .map(|i| {
            let mut cfg = basic_config();
            cfg.scenario_id = format!("run-{i}");
            runner(cfg, BrigadeConfig::default()).with_actors(cooks(2, 5))
        })
        .collect();
    let results = run_all(runners, false).await;

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.status == RunStatus::Completed));
    assert_ne!(results[0].run_id, results[1].run_id);
}
