use anyhow::Context;
use clap::Args;

use relink_core::store::GraphBackend;

use super::StoreArgs;

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Print statistics as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

pub async fn run(args: StatsArgs) -> anyhow::Result<()> {
    let config = args.store.load_config()?;
    let db_path = args.store.db_path(&config);
    let backend = args.store.open(&config, false)?;

    let stats = backend.stats().await.context("Failed to read store stats")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let projects = backend.projects().await.context("Failed to read projects")?;

    println!("relink stats for {}", db_path.display());
    println!();
    println!("  Projects: {}", stats.projects);
    for project in &projects {
        println!(
            "    {:<20} ingested {}",
            project.name,
            project.ingested_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    println!();

    println!("  Nodes: {} total", stats.total_nodes());
    let mut labels: Vec<_> = stats.nodes_by_label.iter().collect();
    labels.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    for (label, count) in &labels {
        println!("    {label:<20} {count:>6}");
    }
    println!();

    println!("  Relationships: {} total", stats.total_relationships());
    let mut rels: Vec<_> = stats.relationships_by_type.iter().collect();
    rels.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    for (rel, count) in &rels {
        println!("    {rel:<20} {count:>6}");
    }
    println!();

    println!(
        "  Pending calls: {} ({} unparsed)",
        stats.pending_calls, stats.unparsed_pending
    );
    Ok(())
}
