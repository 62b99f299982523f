use anyhow::Context;
use clap::Args;

use relink_core::pending::PendingCallStore;

use super::StoreArgs;

#[derive(Args, Debug)]
pub struct PendingArgs {
    /// Only calls whose caller failed to parse
    #[arg(long)]
    pub unparsed: bool,

    /// Only calls from this project
    #[arg(long)]
    pub project: Option<String>,

    /// Print records as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

pub async fn run(args: PendingArgs) -> anyhow::Result<()> {
    let config = args.store.load_config()?;
    let backend = args.store.open(&config, false)?;

    let store = PendingCallStore::new(&backend);
    let snapshot = store
        .snapshot()
        .await
        .context("Failed to read pending calls")?;

    let mut records = if args.unparsed {
        snapshot.unparsed
    } else {
        let mut all = snapshot.promotable;
        all.extend(snapshot.unparsed);
        all
    };
    if let Some(project) = &args.project {
        records.retain(|r| &r.project_name == project);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No pending calls");
        return Ok(());
    }
    if args.unparsed {
        let callers: Vec<String> = store
            .unparsed_callers()
            .await
            .context("Failed to read pending calls")?
            .into_iter()
            .filter(|caller| records.iter().any(|r| &r.caller_qn == caller))
            .collect();
        println!("{} caller(s) failed to parse:", callers.len());
        for caller in &callers {
            println!("  {caller}");
        }
    }
    println!("{} pending call(s)", records.len());
    for record in &records {
        let marker = if record.caller_was_parsed { "" } else { " (unparsed)" };
        println!(
            "  {} -> {}{marker}",
            record.caller_qn, record.call_name
        );
        for candidate in &record.candidates {
            println!("      {candidate}");
        }
    }
    Ok(())
}
