use anyhow::{Context, Result};
use clap::Args;
use datareg_core::{FetchStatus, RegistryLedger, RunConfig};

use crate::output::format::format_record_list;
use crate::output::OutputFormat;

#[derive(Args)]
pub struct LogArgs {
    /// Only rows for this dataset name
    #[arg(long)]
    pub name: Option<String>,

    /// Only rows with this status (succeeded or failed)
    #[arg(long)]
    pub status: Option<FetchStatus>,

    /// Show the last N matching rows
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

pub fn run(args: &LogArgs, config: &RunConfig, format: OutputFormat) -> Result<()> {
    let ledger = RegistryLedger::open(config.layout.registry_path());
    let records: Vec<_> = ledger
        .records()
        .context("Failed to read registry")?
        .into_iter()
        .filter(|r| args.name.as_deref().map_or(true, |n| r.name == n))
        .filter(|r| args.status.map_or(true, |s| r.status == s))
        .collect();

    let skip = records.len().saturating_sub(args.limit);

    let output = format_record_list(&records[skip..], format);
    print!("{output}");
    Ok(())
}
