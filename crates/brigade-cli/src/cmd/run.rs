use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use brigade_core::{
    aggregate::ExecutionResult,
    config::{BrigadeConfig, ScenarioConfig, WarnLevel},
    recipe::RecipeBook,
    store::{templates::find_template, FileRepository, RunRepository},
    types::RunStatus,
    ScenarioRunner,
};
use clap::Args;

use crate::output::{print_json, print_table, score};
use crate::sim;

const DEFAULT_TEMPLATE: &str = "basic-cooking";

#[derive(Args)]
pub struct RunArgs {
    /// Scenario template name (default: basic-cooking)
    #[arg(long, conflicts_with = "config")]
    pub template: Option<String>,

    /// Scenario config file (YAML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of simulated actors (default: what the scenario needs)
    #[arg(long)]
    pub actors: Option<usize>,

    /// Seed for the kitchen and the simulated actors
    #[arg(long)]
    pub seed: Option<u64>,

    /// Probability that a simulated actor fails a task
    #[arg(long, default_value_t = 0.0)]
    pub failure_rate: f64,

    /// Mean simulated actor latency in milliseconds
    #[arg(long, default_value_t = 20)]
    pub latency_ms: u64,
}

pub fn run(root: &Path, args: RunArgs, json: bool) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&args.failure_rate) {
        anyhow::bail!("--failure-rate must be within [0, 1]");
    }

    let engine = BrigadeConfig::load(root).context("failed to load config")?;
    if let Some(bad) = engine
        .validate()
        .into_iter()
        .find(|w| w.level == WarnLevel::Error)
    {
        anyhow::bail!("invalid config: {}", bad.message);
    }
    let book = RecipeBook::load(root).context("failed to load recipes")?;
    let repo = FileRepository::open(root)
        .context("brigade is not initialized here; run `brigade init` first")?;

    let mut scenario = match &args.config {
        Some(path) => ScenarioConfig::load(path)
            .with_context(|| format!("failed to load scenario {}", path.display()))?,
        None => {
            let name = args.template.as_deref().unwrap_or(DEFAULT_TEMPLATE);
            let templates = repo
                .load_scenario_templates()
                .context("failed to load templates")?;
            find_template(&templates, name)?.to_config()
        }
    };
    if args.seed.is_some() {
        scenario.seed = args.seed;
    }

    let count = args.actors.unwrap_or_else(|| scenario.agents_needed());
    let actors = sim::brigade(
        count,
        scenario.seed.unwrap_or_else(rand::random),
        Duration::from_millis(args.latency_ms),
        args.failure_rate,
    );

    let runner = ScenarioRunner::new(scenario, engine, Arc::new(book))
        .with_actors(actors)
        .with_repository(Arc::new(repo));

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(runner.run());

    if json {
        print_json(&result)?;
    } else {
        print_result(&result);
    }

    if result.status != RunStatus::Completed {
        anyhow::bail!("scenario '{}' ended {}", result.scenario_id, result.status);
    }
    Ok(())
}

pub fn print_result(result: &ExecutionResult) {
    println!("Run:          {}", result.run_id);
    println!("Scenario:     {}", result.scenario_id);
    println!("Status:       {}", result.status);
    println!("Duration:     {:.2}s", result.duration_seconds);
    println!(
        "Tasks:        {} completed, {} failed ({} timed out), {} skipped",
        result.tasks_completed, result.tasks_failed, result.tasks_timed_out, result.tasks_skipped
    );
    println!("Recipes:      {}", result.recipes_completed);
    println!(
        "Scores:       quality {}  efficiency {}  collaboration {}",
        score(result.quality_score),
        score(result.efficiency_score),
        score(result.collaboration_score)
    );
    println!(
        "Thresholds:   {}",
        if result.thresholds_met { "met" } else { "missed" }
    );

    if !result.crisis_events.is_empty() {
        println!("\nCrises:");
        for crisis in &result.crisis_events {
            let outcome = crisis
                .resolution
                .map(|r| format!("{r:?}").to_lowercase())
                .unwrap_or_else(|| "open".to_string());
            println!("  {:<20} {:<10} {}", crisis.kind.as_str(), outcome, crisis.detail);
        }
    }

    if !result.actor_performance.is_empty() {
        println!();
        let rows = result
            .actor_performance
            .iter()
            .map(|(id, perf)| {
                vec![
                    id.clone(),
                    perf.tasks_completed.to_string(),
                    perf.tasks_failed.to_string(),
                    score(perf.stress),
                    score(perf.performance),
                ]
            })
            .collect();
        print_table(&["ACTOR", "DONE", "FAILED", "STRESS", "PERF"], rows);
    }

    if !result.errors.is_empty() {
        println!("\nErrors:");
        for entry in &result.errors {
            let phase = entry.phase.map(|p| p.as_str()).unwrap_or("-");
            println!("  [{phase}] {}: {}", entry.kind, entry.message);
        }
    }
}
