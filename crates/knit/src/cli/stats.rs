//! `knit stats` command implementation.

use std::path::Path;

use anyhow::{Result, bail};
use colored::Colorize;
use knit::{Config, GraphStore, SqliteGraph};

use super::database_path;

/// Run the stats command.
pub async fn run(config: &Config, db: Option<&Path>) -> Result<()> {
    let db_path = database_path(config, db);
    let size = match std::fs::metadata(&db_path) {
        Ok(meta) => format_size(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            bail!("no graph database at {}; run `knit apply` first", db_path.display());
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to get database file size");
            "size unknown".to_string()
        }
    };

    let stats = SqliteGraph::open(&db_path)?.stats().await?;

    println!("{}", "knit Graph Statistics".cyan().bold());
    println!();
    println!(
        "  {}: {} ({})",
        "Database".white().bold(),
        db_path.display(),
        size
    );
    println!();
    println!(
        "  {}: {} total, {} stubs",
        "Nodes".white().bold(),
        stats.nodes.to_string().green(),
        stats.stubs.to_string().yellow()
    );
    println!(
        "  {}: {} total",
        "Relationships".white().bold(),
        stats.edges().to_string().green()
    );

    // Count descending, then type name
    let mut by_type: Vec<_> = stats.edges_by_type.into_iter().collect();
    by_type.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (kind, count) in by_type {
        println!("    {}: {}", kind.dimmed(), count);
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
