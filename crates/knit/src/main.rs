//! knit CLI - resolve extractor output into graph upserts from the command line.
//!
//! Reads per-file IR as JSONL, resolves it, writes the upsert plan as JSONL
//! and applies plans to a `SQLite` graph.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod cli;

/// knit: identity and relationship resolution for a cross-language code graph.
#[derive(Parser)]
#[command(name = "knit")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (defaults to .knit/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve FileIr JSONL into an upsert plan
    Resolve {
        /// FileIr JSONL files, one record per analyzed file
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Write the plan here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Project id (defaults to `project` in the config file)
        #[arg(short, long)]
        project: Option<String>,

        /// List every diagnostic, not just the counts
        #[arg(short, long)]
        diagnostics: bool,
    },

    /// Apply an upsert plan to the graph database
    Apply {
        /// Plan JSONL written by `knit resolve`
        plan: PathBuf,

        /// Graph database (defaults to `storage.database` in the config)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Print the canonical id and GID of an entity
    Id(cli::id::IdArgs),

    /// Show graph database statistics
    Stats {
        /// Graph database (defaults to `storage.database` in the config)
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli::load_config(cli.config.as_deref()).await {
        Ok(config) => match cli.command {
            Commands::Resolve {
                inputs,
                output,
                project,
                diagnostics,
            } => {
                cli::resolve::run(
                    &config,
                    &inputs,
                    output.as_deref(),
                    project.as_deref(),
                    diagnostics,
                )
                .await
            }
            Commands::Apply { plan, db } => cli::apply::run(&config, &plan, db.as_deref()).await,
            Commands::Id(args) => cli::id::run(&config, &args),
            Commands::Stats { db } => cli::stats::run(&config, db.as_deref()).await,
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            for cause in e.chain().skip(1) {
                eprintln!("  {}: {cause}", "caused by".dimmed());
            }
            ExitCode::FAILURE
        }
    }
}
