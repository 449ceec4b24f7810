//! Run results and the scoring folded into them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::actor::{ActionKind, ActorHandle, ActorRole};
use crate::config::{ScenarioConfig, ScenarioType, ScoringPolicy};
use crate::disruption::CrisisEvent;
use crate::environment::EnvironmentSnapshot;
use crate::task::{BatchOutcome, TaskState, WorkKind};
use crate::types::{ActorId, Phase, RunStatus};

// ---------------------------------------------------------------------------
// Result records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActorPerformance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ActorRole>,
    pub tasks_assigned: u32,
    pub tasks_completed: u32,
    pub tasks_failed: u32,
    pub tasks_timed_out: u32,
    pub busy_seconds: f64,
    pub stress: f64,
    pub energy: f64,
    pub performance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action: Option<String>,
}

/// One entry of the run's error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorId>,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Communication {
    pub timestamp: DateTime<Utc>,
    pub phase: Phase,
    pub from: ActorId,
    pub to: ActorId,
    pub kind: ActionKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseSnapshot {
    pub phase: Phase,
    pub captured_at: DateTime<Utc>,
    pub environment: EnvironmentSnapshot,
}

// ---------------------------------------------------------------------------
// ExecutionResult
// ---------------------------------------------------------------------------

/// Everything a run produced. Owned by the runner until the run ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub run_id: Uuid,
    pub scenario_id: String,
    #[serde(default)]
    pub scenario_type: ScenarioType,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
    /// Last phase entered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    pub tasks_completed: u32,
    /// Includes timed-out tasks.
    pub tasks_failed: u32,
    pub tasks_timed_out: u32,
    pub tasks_skipped: u32,
    pub recipes_completed: u32,
    pub communication_count: u32,
    pub quality_score: f64,
    pub efficiency_score: f64,
    pub collaboration_score: f64,
    pub thresholds_met: bool,
    pub actor_performance: BTreeMap<String, ActorPerformance>,
    /// Wall-clock seconds per phase, keyed by phase name.
    pub phase_timings: BTreeMap<String, f64>,
    pub errors: Vec<ErrorEntry>,
    pub crisis_events: Vec<CrisisEvent>,
    #[serde(default)]
    pub communications: Vec<Communication>,
    #[serde(default)]
    pub snapshots: Vec<PhaseSnapshot>,
}

impl ExecutionResult {
    pub fn new(run_id: Uuid, config: &ScenarioConfig) -> Self {
        Self {
            run_id,
            scenario_id: config.scenario_id.clone(),
            scenario_type: config.scenario_type,
            status: RunStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            duration_seconds: 0.0,
            phase: None,
            tasks_completed: 0,
            tasks_failed: 0,
            tasks_timed_out: 0,
            tasks_skipped: 0,
            recipes_completed: 0,
            communication_count: 0,
            quality_score: 0.0,
            efficiency_score: 0.0,
            collaboration_score: 0.0,
            thresholds_met: false,
            actor_performance: BTreeMap::new(),
            phase_timings: BTreeMap::new(),
            errors: Vec::new(),
            crisis_events: Vec::new(),
            communications: Vec::new(),
            snapshots: Vec::new(),
        }
    }

    pub fn is_successful(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn record_error(
        &mut self,
        phase: Option<Phase>,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.errors.push(ErrorEntry {
            timestamp: Utc::now(),
            phase,
            task_id: None,
            actor: None,
            kind: kind.into(),
            message: message.into(),
        });
    }

    /// Close the run with a terminal status. The first terminal status wins.
    pub fn finish(&mut self, status: RunStatus) {
        if self.status.is_terminal() {
            return;
        }
        let ended = Utc::now();
        self.status = status;
        self.ended_at = Some(ended);
        self.duration_seconds = (ended - self.started_at).num_milliseconds() as f64 / 1000.0;
    }
}

// ---------------------------------------------------------------------------
// ResultAggregator
// ---------------------------------------------------------------------------

pub struct ResultAggregator {
    policy: ScoringPolicy,
}

impl ResultAggregator {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    /// Fold one batch into the running result.
    pub fn fold_batch(
        &self,
        result: &mut ExecutionResult,
        phase: Phase,
        outcome: &BatchOutcome,
        record_communications: bool,
    ) {
        result.tasks_skipped += outcome.skipped.len() as u32;
        for task in &outcome.outcomes {
            let perf = result
                .actor_performance
                .entry(task.actor.to_string())
                .or_default();
            perf.tasks_assigned += 1;
            perf.busy_seconds += task.duration_ms as f64 / 1000.0;

            match task.state {
                TaskState::Completed => {
                    result.tasks_completed += 1;
                    perf.tasks_completed += 1;
                    if task.kind == WorkKind::Plate {
                        result.recipes_completed += 1;
                    }
                }
                TaskState::Failed | TaskState::TimedOut => {
                    result.tasks_failed += 1;
                    perf.tasks_failed += 1;
                    if task.state == TaskState::TimedOut {
                        result.tasks_timed_out += 1;
                        perf.tasks_timed_out += 1;
                    }
                    let (kind, message) = match &task.error {
                        Some(e) => (e.kind().to_string(), e.to_string()),
                        None => (task.state.to_string(), String::new()),
                    };
                    result.errors.push(ErrorEntry {
                        timestamp: task.finished_at,
                        phase: Some(phase),
                        task_id: Some(task.task_id),
                        actor: Some(task.actor.clone()),
                        kind,
                        message: format!("{}: {message}", task.description),
                    });
                }
            }

            let Some(action) = &task.result else { continue };
            let Some(to) = &action.recipient else { continue };
            if action.kind.is_social() && *to != task.actor {
                result.communication_count += 1;
                if record_communications {
                    result.communications.push(Communication {
                        timestamp: task.finished_at,
                        phase,
                        from: task.actor.clone(),
                        to: to.clone(),
                        kind: action.kind,
                        message: action.summary.clone(),
                    });
                }
            }
        }
    }

    /// Copy the actors' live bookkeeping into the result.
    pub fn record_actors(&self, result: &mut ExecutionResult, actors: &[ActorHandle]) {
        for handle in actors {
            let perf = result
                .actor_performance
                .entry(handle.id().to_string())
                .or_default();
            perf.role = Some(handle.role());
            perf.stress = handle.stats.stress;
            perf.energy = handle.stats.energy;
            perf.performance = handle.stats.performance;
            perf.last_action = handle.stats.last_action.clone();
        }
    }

    /// Quality after service: base minus penalties for the failure ratio and
    /// for time pressure above 1.0, clamped to `[0, 1]`.
    pub fn service_quality(&self, completed: u32, failed: u32, time_pressure: f64) -> f64 {
        let total = completed + failed;
        let failure_ratio = if total == 0 {
            0.0
        } else {
            f64::from(failed) / f64::from(total)
        };
        let quality = self.policy.base_quality
            - self.policy.failure_penalty * failure_ratio
            - self.policy.time_pressure_penalty * (time_pressure - 1.0).max(0.0);
        quality.clamp(0.0, 1.0)
    }

    pub fn efficiency(&self, completed: u32, failed: u32) -> f64 {
        let total = completed + failed;
        if total == 0 {
            0.0
        } else {
            f64::from(completed) / f64::from(total)
        }
    }

    /// Communications normalised against `n * (n - 1) * factor`, capped at 1.
    /// A lone actor scores 1.0.
    pub fn collaboration(&self, communications: u32, actor_count: usize) -> f64 {
        if actor_count <= 1 {
            return 1.0;
        }
        let n = actor_count as f64;
        let expected = n * (n - 1.0) * f64::from(self.policy.collaboration_factor.max(1));
        (f64::from(communications) / expected).min(1.0)
    }

    pub fn finalize_scores(
        &self,
        result: &mut ExecutionResult,
        actor_count: usize,
        config: &ScenarioConfig,
    ) {
        result.efficiency_score = self.efficiency(result.tasks_completed, result.tasks_failed);
        result.collaboration_score = self.collaboration(result.communication_count, actor_count);
        result.thresholds_met = result.quality_score >= config.quality_threshold
            && result.efficiency_score >= config.efficiency_threshold;
    }
}

// ---------------------------------------------------------------------------
// ExecutionSummary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub total_scenarios: usize,
    pub successful: usize,
    pub failed: usize,
    pub average_duration_seconds: f64,
    pub average_quality: f64,
    pub average_efficiency: f64,
    pub average_collaboration: f64,
}

impl ExecutionSummary {
    pub fn from_results(results: &[ExecutionResult]) -> Self {
        if results.is_empty() {
            return Self::default();
        }
        let n = results.len() as f64;
        let mean = |f: fn(&ExecutionResult) -> f64| results.iter().map(f).sum::<f64>() / n;
        let successful = results.iter().filter(|r| r.is_successful()).count();
        Self {
            total_scenarios: results.len(),
            successful,
            failed: results.len() - successful,
            average_duration_seconds: mean(|r| r.duration_seconds),
            average_quality: mean(|r| r.quality_score),
            average_efficiency: mean(|r| r.efficiency_score),
            average_collaboration: mean(|r| r.collaboration_score),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActionResult;
    use crate::task::{TaskError, TaskOutcome};

    fn task(actor: &str, kind: WorkKind, state: TaskState) -> TaskOutcome {
        TaskOutcome {
            task_id: Uuid::new_v4(),
            kind,
            description: format!("{kind} work"),
            actor: ActorId::from(actor),
            state,
            duration_ms: 250,
            finished_at: Utc::now(),
            result: (state == TaskState::Completed)
                .then(|| ActionResult::new(ActionKind::Cook, "ok")),
            error: match state {
                TaskState::Completed => None,
                TaskState::Failed => Some(TaskError::Actor {
                    message: "burnt".into(),
                }),
                TaskState::TimedOut => Some(TaskError::TimedOut { after_ms: 50 }),
            },
        }
    }

    fn aggregator() -> ResultAggregator {
        ResultAggregator::new(ScoringPolicy::default())
    }

    fn fresh() -> ExecutionResult {
        ExecutionResult::new(Uuid::new_v4(), &ScenarioConfig::new("agg"))
    }

    #[test]
    fn fold_counts_and_logs_failures() {
        let agg = aggregator();
        let mut result = fresh();
        let outcome = BatchOutcome {
            outcomes: vec![
                task("a", WorkKind::Plate, TaskState::Completed),
                task("b", WorkKind::Cook, TaskState::Failed),
                task("a", WorkKind::Cook, TaskState::TimedOut),
            ],
            skipped: vec![Uuid::new_v4()],
        };
        agg.fold_batch(&mut result, Phase::Cooking, &outcome, true);

        assert_eq!(result.tasks_completed, 1);
        assert_eq!(result.tasks_failed, 2);
        assert_eq!(result.tasks_timed_out, 1);
        assert_eq!(result.tasks_skipped, 1);
        assert_eq!(result.recipes_completed, 1);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[1].kind, "timed_out");
        assert_eq!(result.errors[1].phase, Some(Phase::Cooking));
        let a = &result.actor_performance["a"];
        assert_eq!(a.tasks_assigned, 2);
        assert_eq!(a.tasks_timed_out, 1);
        assert!((a.busy_seconds - 0.5).abs() < 1e-9);
    }

    #[test]
    fn only_addressed_social_actions_count_as_communication() {
        let agg = aggregator();
        let mut result = fresh();
        let mut talk = task("a", WorkKind::Cook, TaskState::Completed);
        talk.result = Some(ActionResult::new(ActionKind::Communicate, "behind you").to("b"));
        let mut self_talk = task("a", WorkKind::Cook, TaskState::Completed);
        self_talk.result = Some(ActionResult::new(ActionKind::Collaborate, "me").to("a"));
        let mut cooking = task("b", WorkKind::Cook, TaskState::Completed);
        cooking.result = Some(ActionResult::new(ActionKind::Cook, "sear").to("a"));

        let outcome = BatchOutcome {
            outcomes: vec![talk, self_talk, cooking],
            skipped: vec![],
        };
        agg.fold_batch(&mut result, Phase::Cooking, &outcome, false);
        assert_eq!(result.communication_count, 1);
        assert!(result.communications.is_empty());
    }

    #[test]
    fn service_quality_penalises_failures_and_pressure() {
        let agg = aggregator();
        assert!((agg.service_quality(10, 0, 1.0) - 0.8).abs() < 1e-12);
        assert!((agg.service_quality(5, 5, 1.0) - 0.65).abs() < 1e-12);
        assert!((agg.service_quality(10, 0, 2.0) - 0.6).abs() < 1e-12);
        assert_eq!(agg.service_quality(0, 10, 5.0), 0.0);
        assert!((agg.service_quality(0, 0, 1.0) - 0.8).abs() < 1e-12);
    }

    #[test]
    fn efficiency_handles_empty_runs() {
        let agg = aggregator();
        assert_eq!(agg.efficiency(0, 0), 0.0);
        assert_eq!(agg.efficiency(3, 1), 0.75);
    }

    #[test]
    fn collaboration_normalises_against_pairs() {
        let agg = aggregator();
        assert_eq!(agg.collaboration(0, 1), 1.0);
        assert_eq!(agg.collaboration(0, 2), 0.0);
        assert_eq!(agg.collaboration(2, 2), 0.5);
        assert_eq!(agg.collaboration(100, 3), 1.0);
    }

    #[test]
    fn finalize_is_deterministic() {
        let agg = aggregator();
        let cfg = ScenarioConfig::new("agg");
        let scores = || {
            let mut result = fresh();
            result.tasks_completed = 7;
            result.tasks_failed = 3;
            result.communication_count = 5;
            result.quality_score = agg.service_quality(7, 3, 1.4);
            agg.finalize_scores(&mut result, 3, &cfg);
            (
                result.quality_score.to_bits(),
                result.efficiency_score.to_bits(),
                result.collaboration_score.to_bits(),
            )
        };
        assert_eq!(scores(), scores());
    }

    #[test]
    fn finish_keeps_first_terminal_status() {
        let mut result = fresh();
        result.finish(RunStatus::Failed);
        result.finish(RunStatus::Completed);
        assert_eq!(result.status, RunStatus::Failed);
        assert!(result.ended_at.is_some());
    }

    #[test]
    fn summary_averages_results() {
        let mut ok = fresh();
        ok.quality_score = 0.8;
        ok.efficiency_score = 1.0;
        ok.finish(RunStatus::Completed);
        let mut bad = fresh();
        bad.quality_score = 0.4;
        bad.finish(RunStatus::Failed);

        let summary = ExecutionSummary::from_results(&[ok, bad]);
        assert_eq!(summary.total_scenarios, 2);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        assert!((summary.average_quality - 0.6).abs() < 1e-12);
        assert!((summary.average_efficiency - 0.5).abs() < 1e-12);
        assert_eq!(ExecutionSummary::from_results(&[]), ExecutionSummary::default());
    }
}
