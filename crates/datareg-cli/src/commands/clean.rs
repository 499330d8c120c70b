use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::Result;
use clap::Args;
use datareg_core::RunConfig;
use walkdir::WalkDir;

#[derive(Args)]
pub struct CleanArgs {
    /// Only remove temp files untouched for at least this many minutes
    #[arg(long, default_value = "60")]
    pub min_age_mins: u64,

    /// List what would be removed without removing it
    #[arg(long)]
    pub dry_run: bool,

    /// Skip confirmation prompt
    #[arg(long, short)]
    pub yes: bool,
}

pub fn run(args: &CleanArgs, config: &RunConfig) -> Result<()> {
    let data_dir = config.layout.data_dir();
    let min_age = min_age(args.min_age_mins);
    let orphans = find_orphans(&data_dir, min_age, SystemTime::now());

    if orphans.is_empty() {
        println!("No orphaned temp files found.");
        return Ok(());
    }

    println!(
        "{} orphaned temp file(s) to {}:",
        orphans.len(),
        if args.dry_run { "remove (dry run)" } else { "remove" }
    );
    for path in &orphans {
        let shown = path.strip_prefix(config.layout.root()).unwrap_or(path);
        println!("  {}", shown.display());
    }

    if args.dry_run {
        println!("\nDry run: nothing was removed.");
        return Ok(());
    }
    if !args.yes {
        eprintln!("\nUse --yes to confirm removal.");
        return Ok(());
    }

    let mut removed = 0;
    for path in &orphans {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("Failed to remove {}: {e}", path.display()),
        }
    }
    println!("Removed {removed} temp file(s).");
    Ok(())
}

fn min_age(mins: u64) -> Duration {
    Duration::from_secs(mins.saturating_mul(60))
}

/// Dot-prefixed `*.part` files under `data_dir` last modified at least `min_age` before `now`.
fn find_orphans(data_dir: &Path, min_age: Duration, now: SystemTime) -> Vec<PathBuf> {
    WalkDir::new(data_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| is_temp_name(&e.file_name().to_string_lossy()))
        .filter(|e| {
            e.metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|mtime| now.duration_since(mtime).ok())
                .is_some_and(|age| age >= min_age)
        })
        .map(|e| e.into_path())
        .collect()
}

fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(".part")
}
