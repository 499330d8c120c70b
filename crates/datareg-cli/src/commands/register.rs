use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use datareg_core::digest::{sha256_file, HashingWriter};
use datareg_core::{DownloadRecord, Layer, RegistryLedger, ResolvedPath, RunConfig};

use super::download::{parse_layer, parse_single_line};
use crate::output::format::format_outcome;
use crate::output::OutputFormat;
use crate::pipeline::{install, Outcome};

pub const MANUAL_URL: &str = "manual://local";

#[derive(Args)]
pub struct RegisterArgs {
    /// Dataset name; becomes the directory under the layer
    #[arg(long)]
    pub name: String,

    /// Local file to register
    #[arg(long)]
    pub file: PathBuf,

    /// Data layer to store the file in
    #[arg(long, value_parser = parse_layer, default_value = "external")]
    pub dest_subdir: Layer,

    /// File name on disk (defaults to the source file's name)
    #[arg(long)]
    pub filename: Option<String>,

    /// Provenance to record in place of a download URL
    #[arg(long, default_value = MANUAL_URL, value_parser = parse_single_line)]
    pub url: String,

    /// Overwrite an existing file at the destination
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: &RegisterArgs, config: &RunConfig, format: OutputFormat) -> Result<()> {
    let source = args
        .file
        .canonicalize()
        .with_context(|| format!("File not found: {}", args.file.display()))?;
    if !source.is_file() {
        anyhow::bail!("Not a regular file: {}", source.display());
    }

    let filename = match &args.filename {
        Some(f) => f.clone(),
        None => source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("Source path has no file name")?,
    };
    let dest = config
        .layout
        .resolve(&args.name, args.dest_subdir, &filename)
        .context("Failed to resolve destination")?;

    let (sha256, size_bytes) = if is_same_file(&source, &dest) {
        tracing::info!(dest = %dest.relative, "file already in place, recording only");
        sha256_file(&source).with_context(|| format!("Failed to hash {}", source.display()))?
    } else {
        copy_into_place(&source, &dest, args.force)?
    };

    let record = DownloadRecord::succeeded(&args.name, &args.url, &dest.relative, &sha256, size_bytes, None);
    RegistryLedger::open(config.layout.registry_path())
        .append(&record)
        .with_context(|| format!("{} is in place but could not be recorded", dest.relative))?;

    println!("{}", format_outcome(&Outcome::Installed(record), format));
    Ok(())
}

fn is_same_file(source: &Path, dest: &ResolvedPath) -> bool {
    dest.absolute
        .canonicalize()
        .map(|d| d == source)
        .unwrap_or(false)
}

/// Copy through a hashing temp file next to the destination, then install it.
fn copy_into_place(source: &Path, dest: &ResolvedPath, force: bool) -> Result<(String, u64)> {
    let mut reader = BufReader::new(
        File::open(source).with_context(|| format!("Failed to open {}", source.display()))?,
    );
    let temp = tempfile::Builder::new()
        .prefix(&format!(".{}.", dest.file_name()))
        .suffix(".part")
        .tempfile_in(dest.parent())
        .context("Failed to create temp file")?;

    let mut writer = HashingWriter::new(temp);
    io::copy(&mut reader, &mut writer).with_context(|| format!("Failed to copy {}", source.display()))?;
    writer.flush()?;
    let (temp, sha256, size_bytes) = writer.finish();
    temp.as_file().sync_all()?;

    install(temp, &dest.absolute, force).with_context(|| format!("Failed to install {}", dest.relative))?;
    tracing::debug!(source = %source.display(), dest = %dest.relative, size_bytes, "copied");
    Ok((sha256, size_bytes))
}
