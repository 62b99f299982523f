use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tracing::info;

use relink_core::ingest::{IngestStats, Ingestor};

use super::StoreArgs;

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Project directories, ingested in the given order
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Project name (default: directory name); only with a single path
    #[arg(long)]
    pub name: Option<String>,

    /// Print per-project statistics as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

pub async fn run(args: IngestArgs) -> anyhow::Result<()> {
    if args.name.is_some() && args.paths.len() > 1 {
        anyhow::bail!("--name can only be used with a single project path");
    }

    let config = args.store.load_config()?;
    let backend = args.store.open(&config, true)?;
    let mut ingestor = Ingestor::new(config);

    let mut summaries = Vec::new();
    for path in &args.paths {
        let root = std::fs::canonicalize(path)
            .with_context(|| format!("Cannot resolve path: {}", path.display()))?;
        info!(path = %root.display(), "Ingesting project");
        let stats = match &args.name {
            Some(name) => ingestor.ingest_named(&backend, &root, name).await,
            None => ingestor.ingest(&backend, &root).await,
        }
        .with_context(|| format!("Ingestion failed for {}", root.display()))?;

        for (file, err) in &stats.errors {
            eprintln!("warning: {}: {file}: {err}", stats.project);
        }
        if args.json {
            summaries.push(summary_json(&stats));
        } else {
            print_summary(&stats);
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    }
    Ok(())
}

fn print_summary(stats: &IngestStats) {
    println!(
        "Ingested {}: {} files, {} modules, {} definitions, {} calls",
        stats.project, stats.files, stats.modules, stats.definitions, stats.calls
    );
    println!(
        "  edges:   {} local, {} cross-project, {} reconciled",
        stats.local_edges, stats.cross_project_edges, stats.reconciled_edges
    );
    println!(
        "  pending: {} recorded, {} candidates dropped",
        stats.pending_recorded, stats.candidates_dropped
    );
    if !stats.errors.is_empty() {
        println!("  errors:  {}", stats.errors.len());
    }
    println!("  took {:.2}s", stats.duration.as_secs_f64());
}

fn summary_json(stats: &IngestStats) -> serde_json::Value {
    serde_json::json!({
        "project": stats.project,
        "files": stats.files,
        "modules": stats.modules,
        "definitions": stats.definitions,
        "calls": stats.calls,
        "local_edges": stats.local_edges,
        "cross_project_edges": stats.cross_project_edges,
        "reconciled_edges": stats.reconciled_edges,
        "pending_recorded": stats.pending_recorded,
        "candidates_dropped": stats.candidates_dropped,
        "errors": stats
            .errors
            .iter()
            .map(|(path, err)| serde_json::json!({ "path": path, "error": err.to_string() }))
            .collect::<Vec<_>>(),
        "duration_ms": u64::try_from(stats.duration.as_millis()).unwrap_or(u64::MAX),
    })
}
