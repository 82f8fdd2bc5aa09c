//! `knit resolve` command implementation.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use colored::Colorize;
use knit::{Config, DiagnosticKind, ResolutionBatch};

const MAX_DISPLAY_ITEMS: usize = 20;

/// Run the resolve command.
pub async fn run(
    config: &Config,
    inputs: &[PathBuf],
    output: Option<&Path>,
    project: Option<&str>,
    show_diagnostics: bool,
) -> Result<()> {
    let project = project.or(config.project.as_deref()).ok_or_else(|| {
        anyhow!("no project id: pass --project or set `project` in the config file")
    })?;

    let mut batch = ResolutionBatch::new(project);
    for input in inputs {
        let warnings = batch
            .extend_from_jsonl(input)
            .await
            .with_context(|| format!("failed to load {}", input.display()))?;
        for warning in &warnings {
            eprintln!(
                "{}: {}: {warning}",
                "warning".yellow().bold(),
                input.display()
            );
        }
    }

    let resolution = batch.resolve(config)?;
    let plan = batch.plan_with(&resolution, config)?;

    match output {
        Some(path) => plan
            .write_jsonl(path)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => {
            let stdout = std::io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            for directive in plan.directives() {
                serde_json::to_writer(&mut out, &directive)?;
                out.write_all(b"\n")?;
            }
            out.flush()?;
        }
    }

    eprintln!(
        "{} {} files: {} nodes, {} relationships",
        "Resolved".green().bold(),
        batch.len(),
        plan.nodes().len(),
        plan.relationships().len()
    );
    let unresolved = resolution.unresolved_count();
    let ambiguous = resolution.ambiguous_count();
    if unresolved > 0 || ambiguous > 0 {
        eprintln!(
            "  {}: {}   {}: {}",
            "Unresolved".yellow(),
            unresolved,
            "Ambiguous".yellow(),
            ambiguous
        );
    }

    if show_diagnostics {
        for diagnostic in resolution.diagnostics.iter().take(MAX_DISPLAY_ITEMS) {
            let tag = match diagnostic.kind {
                DiagnosticKind::UnresolvableRelationship => "unresolved".dimmed(),
                DiagnosticKind::AmbiguousRelationship => "ambiguous".yellow(),
            };
            eprintln!("  {} {tag} {diagnostic}", "•".dimmed());
        }
        if resolution.diagnostics.len() > MAX_DISPLAY_ITEMS {
            eprintln!(
                "  {} ... and {} more",
                "•".dimmed(),
                resolution.diagnostics.len() - MAX_DISPLAY_ITEMS
            );
        }
    }

    if let Some(path) = output {
        eprintln!("{}: {}", "Plan".dimmed(), path.display());
    }
    Ok(())
}
