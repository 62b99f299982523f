use anyhow::Context;
use clap::Args;

use relink_core::ingest::Ingestor;

use super::StoreArgs;

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}

pub async fn run(args: ReconcileArgs) -> anyhow::Result<()> {
    let config = args.store.load_config()?;
    let backend = args.store.open(&config, false)?;
    let ingestor = Ingestor::new(config);

    let stats = ingestor
        .reconcile(&backend)
        .await
        .context("Reconciliation failed")?;

    println!(
        "Reconciled {} of {} pending calls ({} retained, {} unparsed)",
        stats.reconciled_edges, stats.examined, stats.retained, stats.unparsed_retained
    );
    Ok(())
}
