use anyhow::Context;
use brigade_core::{
    aggregate::ExecutionSummary,
    store::{FileRepository, RunRepository},
};
use clap::Subcommand;
use std::path::Path;
use uuid::Uuid;

use crate::cmd::run::print_result;
use crate::output::{print_json, print_table, score};

#[derive(Subcommand)]
pub enum RunsSubcommand {
    /// List stored runs, newest first
    List {
        /// Show at most this many runs
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one stored run
    Show { run_id: String },

    /// Aggregate statistics over every stored run
    Summary,
}

pub fn run(root: &Path, subcmd: RunsSubcommand, json: bool) -> anyhow::Result<()> {
    let repo = FileRepository::open(root)
        .context("brigade is not initialized here; run `brigade init` first")?;
    match subcmd {
        RunsSubcommand::List { limit } => list(&repo, limit, json),
        RunsSubcommand::Show { run_id } => show(&repo, &run_id, json),
        RunsSubcommand::Summary => summary(&repo, json),
    }
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

fn list(repo: &FileRepository, limit: Option<usize>, json: bool) -> anyhow::Result<()> {
    let mut runs = repo.list_runs().context("failed to read runs")?;
    if let Some(limit) = limit {
        runs.truncate(limit);
    }

    if json {
        let items: Vec<_> = runs
            .iter()
            .map(|r| {
                serde_json::json!({
                    "run_id": r.run_id,
                    "scenario_id": r.scenario_id,
                    "status": r.status,
                    "started_at": r.started_at,
                    "quality_score": r.quality_score,
                    "efficiency_score": r.efficiency_score,
                })
            })
            .collect();
        return print_json(&items);
    }

    if runs.is_empty() {
        println!("No runs yet.");
        return Ok(());
    }

    let rows = runs
        .iter()
        .map(|r| {
            vec![
                r.run_id.to_string(),
                r.scenario_id.clone(),
                r.status.to_string(),
                r.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                score(r.quality_score),
                score(r.efficiency_score),
            ]
        })
        .collect();
    print_table(
        &["RUN", "SCENARIO", "STATUS", "STARTED", "QUALITY", "EFFICIENCY"],
        rows,
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(repo: &FileRepository, run_id: &str, json: bool) -> anyhow::Result<()> {
    let id = Uuid::parse_str(run_id).with_context(|| format!("'{run_id}' is not a run id"))?;
    let result = repo.load_run(id)?;
    if json {
        print_json(&result)
    } else {
        print_result(&result);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// summary
// ---------------------------------------------------------------------------

fn summary(repo: &FileRepository, json: bool) -> anyhow::Result<()> {
    let runs = repo.list_runs().context("failed to read runs")?;
    let summary = ExecutionSummary::from_results(&runs);

    if json {
        return print_json(&summary);
    }

    println!("Scenarios:      {}", summary.total_scenarios);
    println!("Successful:     {}", summary.successful);
    println!("Failed:         {}", summary.failed);
    println!("Avg duration:   {:.2}s", summary.average_duration_seconds);
    println!("Avg quality:    {}", score(summary.average_quality));
    println!("Avg efficiency: {}", score(summary.average_efficiency));
    println!("Avg collab:     {}", score(summary.average_collaboration));
    Ok(())
}
