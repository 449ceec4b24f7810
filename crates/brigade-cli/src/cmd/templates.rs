use anyhow::Context;
use brigade_core::store::templates::load_templates;
use clap::Subcommand;
use std::path::Path;

use crate::output::{print_json, print_table};

#[derive(Subcommand)]
pub enum TemplatesSubcommand {
    /// List scenario templates
    List,
}

pub fn run(root: &Path, subcmd: TemplatesSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        TemplatesSubcommand::List => list(root, json),
    }
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let templates = load_templates(root).context("failed to load templates")?;
    if json {
        return print_json(&templates);
    }

    let rows = templates
        .iter()
        .map(|t| {
            vec![
                t.name.clone(),
                t.max_agents.to_string(),
                format!("{}m", t.duration_minutes),
                t.recipes.join(","),
                format!("{:.2}", t.crisis_probability),
                t.description.clone(),
            ]
        })
        .collect();
    print_table(
        &["NAME", "AGENTS", "BUDGET", "RECIPES", "CRISIS", "DESCRIPTION"],
        rows,
    );
    Ok(())
}
