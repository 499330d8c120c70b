use std::collections::BTreeMap;

use anyhow::{Context, Result};
use clap::Args;
use datareg_core::digest::sha256_file;
use datareg_core::{DataLayout, DownloadRecord, RegistryLedger, RunConfig};
use serde::Serialize;

use crate::exit::IntegrityFailure;
use crate::output::format::format_verify_report;
use crate::output::OutputFormat;

#[derive(Args)]
pub struct VerifyArgs {
    /// Only check files registered under this dataset name
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Missing,
    Modified,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Ok => "ok",
            CheckStatus::Missing => "missing",
            CheckStatus::Modified => "modified",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FileCheck {
    pub name: String,
    pub dest_path: String,
    pub status: CheckStatus,
    pub expected_sha256: String,
    pub actual_sha256: Option<String>,
}

pub fn run(args: &VerifyArgs, config: &RunConfig, format: OutputFormat) -> Result<()> {
    let records = RegistryLedger::open(config.layout.registry_path())
        .records()
        .context("Failed to read registry")?;
    let checks = check_all(&config.layout, &records, args.name.as_deref())?;

    print!("{}", format_verify_report(&checks, format));

    let failed = checks.iter().filter(|c| c.status != CheckStatus::Ok).count();
    if failed > 0 {
        return Err(IntegrityFailure {
            failed,
            checked: checks.len(),
        }
        .into());
    }
    Ok(())
}

/// Check the latest succeeded row for every distinct `dest_path`.
pub fn check_all(layout: &DataLayout, records: &[DownloadRecord], name: Option<&str>) -> Result<Vec<FileCheck>> {
    let mut latest: BTreeMap<&str, &DownloadRecord> = BTreeMap::new();
    for r in records.iter().filter(|r| r.is_succeeded()) {
        if name.map_or(true, |n| r.name == n) {
            latest.insert(r.dest_path.as_str(), r);
        }
    }

    latest.into_values().map(|r| check_one(layout, r)).collect()
}

fn check_one(layout: &DataLayout, record: &DownloadRecord) -> Result<FileCheck> {
    let path = layout.absolute_from_relative(&record.dest_path);
    let (status, actual) = if !path.is_file() {
        (CheckStatus::Missing, None)
    } else {
        let (sha, _) = sha256_file(&path).with_context(|| format!("Failed to hash {}", path.display()))?;
        let status = if sha == record.sha256 {
            CheckStatus::Ok
        } else {
            CheckStatus::Modified
        };
        (status, Some(sha))
    };
    tracing::debug!(dest = %record.dest_path, status = status.as_str(), "verified");

    Ok(FileCheck {
        name: record.name.clone(),
        dest_path: record.dest_path.clone(),
        status,
        expected_sha256: record.sha256.clone(),
        actual_sha256: actual,
    })
}
