//! `knit apply` command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use knit::{Config, GraphStore, SqliteGraph, UpsertPlan};

use super::database_path;

/// Run the apply command.
pub async fn run(config: &Config, plan_path: &Path, db: Option<&Path>) -> Result<()> {
    let (plan, warnings) = UpsertPlan::read_jsonl(plan_path)
        .await
        .with_context(|| format!("failed to read plan {}", plan_path.display()))?;
    for warning in &warnings {
        eprintln!(
            "{}: {}: {warning}",
            "warning".yellow().bold(),
            plan_path.display()
        );
    }

    let db_path = database_path(config, db);
    let graph = SqliteGraph::open(&db_path)
        .with_context(|| format!("failed to open graph database {}", db_path.display()))?;
    graph.apply(&plan).await?;

    println!(
        "{} {} nodes and {} relationships to {}",
        "Applied".green().bold(),
        plan.nodes().len(),
        plan.relationships().len(),
        db_path.display()
    );

    let stats = graph.stats().await?;
    if stats.stubs > 0 {
        println!(
            "  {}: {} nodes known only as edge endpoints",
            "Stubs".yellow(),
            stats.stubs
        );
    }
    Ok(())
}
