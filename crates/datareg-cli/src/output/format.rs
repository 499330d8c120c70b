use datareg_core::DownloadRecord;

use super::OutputFormat;
use crate::commands::verify::{CheckStatus, FileCheck};
use crate::pipeline::Outcome;

pub fn format_outcome(outcome: &Outcome, fmt: OutputFormat) -> String {
    match fmt {
        OutputFormat::Json => serde_json::to_string_pretty(outcome).unwrap_or_default(),
        OutputFormat::Text => {
            let r = outcome.record();
            match outcome {
                Outcome::Skipped(_) => format!(
                    "{} is already present at {} (sha256 {})",
                    r.name, r.dest_path, r.sha256
                ),
                Outcome::Installed(_) => format!(
                    "Saved: {} ({} bytes, sha256 {})",
                    r.dest_path, r.size_bytes, r.sha256
                ),
            }
        }
    }
}

pub fn format_record_list(records: &[DownloadRecord], fmt: OutputFormat) -> String {
    match fmt {
        OutputFormat::Json => {
            let mut s = serde_json::to_string_pretty(records).unwrap_or_default();
            s.push('\n');
            s
        }
        OutputFormat::Text => format_record_list_text(records),
    }
}

fn format_record_list_text(records: &[DownloadRecord]) -> String {
    if records.is_empty() {
        return "No registry entries found.\n".to_string();
    }

    let mut out = String::new();
    for r in records {
        let marker = if r.is_succeeded() { '\u{25c6}' } else { '\u{2717}' };
        let short = r.sha256.get(..12).unwrap_or(&r.sha256);
        let short = if short.is_empty() { "-" } else { short };
        let time = r.timestamp_utc.format("%Y-%m-%d %H:%M:%S");
        out.push_str(&format!(
            "{marker} {time}  {:<9} {} -> {}  {} bytes  {short}\n",
            r.status.as_str(), r.name, r.dest_path, r.size_bytes
        ));
        out.push_str(&format!("    {}\n", r.url));
    }
    out
}

pub fn format_verify_report(checks: &[FileCheck], fmt: OutputFormat) -> String {
    match fmt {
        OutputFormat::Json => {
            let mut s = serde_json::to_string_pretty(checks).unwrap_or_default();
            s.push('\n');
            s
        }
        OutputFormat::Text => format_verify_report_text(checks),
    }
}

fn format_verify_report_text(checks: &[FileCheck]) -> String {
    if checks.is_empty() {
        return "No registered files to verify.\n".to_string();
    }

    let mut out = String::new();
    for c in checks {
        out.push_str(&format!("{:<8} {}\n", c.status.as_str(), c.dest_path));
        if c.status == CheckStatus::Modified {
            out.push_str(&format!("    expected {}\n", c.expected_sha256));
            if let Some(actual) = &c.actual_sha256 {
                out.push_str(&format!("    actual   {actual}\n"));
            }
        }
    }
    let ok = checks.iter().filter(|c| c.status == CheckStatus::Ok).count();
    out.push_str(&format!("\n{ok}/{} file(s) ok\n", checks.len()));
    out
}
