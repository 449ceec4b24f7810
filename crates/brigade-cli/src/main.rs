mod cmd;
mod output;
mod root;
mod sim;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, run::RunArgs, runs::RunsSubcommand,
    templates::TemplatesSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "brigade",
    about = "Run phase-based kitchen scenarios against a brigade of actors",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .brigade/)
    #[arg(long, global = true, env = "BRIGADE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize brigade in the current project
    Init,

    /// Run one scenario with simulated actors
    Run(RunArgs),

    /// Inspect stored runs
    Runs {
        #[command(subcommand)]
        subcommand: RunsSubcommand,
    },

    /// Inspect scenario templates
    Templates {
        #[command(subcommand)]
        subcommand: TemplatesSubcommand,
    },

    /// Inspect and validate the engine config
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run(_) => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Run(args) => cmd::run::run(&root, args, cli.json),
        Commands::Runs { subcommand } => cmd::runs::run(&root, subcommand, cli.json),
        Commands::Templates { subcommand } => cmd::templates::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
