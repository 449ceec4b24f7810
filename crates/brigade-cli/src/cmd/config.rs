use crate::output::print_json;
use anyhow::Context;
use brigade_core::config::{BrigadeConfig, WarnLevel};
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective engine config
    Show,

    /// Validate the config for common mistakes
    Validate,
}

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Validate => validate(root, json),
    }
}

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = BrigadeConfig::load(root).context("failed to load config")?;
    if json {
        return print_json(&config);
    }

    let s = &config.scheduler;
    let d = &config.disruption;
    let q = &config.scoring;
    println!("Scheduler:");
    println!("  group timeout:     {}ms", s.group_timeout_ms);
    println!("  inter-group pause: {}ms", s.inter_group_pause_ms);
    println!("  contention:        {:?}", s.contention);
    println!("Disruption:");
    println!("  resolution prob:   {}", d.resolution_probability);
    println!("  breakdown:         p={} below {}", d.breakdown_probability, d.breakdown_threshold);
    println!("  tick interval:     {}ms", d.tick_interval_ms);
    println!("Scoring:");
    println!("  base quality:      {}", q.base_quality);
    println!("  failure penalty:   {}", q.failure_penalty);
    println!("  pressure penalty:  {}", q.time_pressure_penalty);
    println!("  collab factor:     {}", q.collaboration_factor);
    Ok(())
}

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = BrigadeConfig::load(root).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
