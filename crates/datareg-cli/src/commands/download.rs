use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use datareg_core::digest::normalize_sha256;
use datareg_core::{default_filename, FetchSettings, Layer, RunConfig, Secret, Secrets};
use datareg_fetch::FetchError;

use crate::output::format::format_outcome;
use crate::output::progress::DownloadBar;
use crate::output::OutputFormat;
use crate::pipeline::{DownloadPlan, Pipeline};

#[derive(Args)]
pub struct DownloadArgs {
    /// Dataset name; becomes the directory under the layer
    #[arg(long)]
    pub name: String,

    /// Source URL (http or https)
    #[arg(long, value_parser = parse_single_line)]
    pub url: String,

    /// Data layer to store the file in
    #[arg(long, value_parser = parse_layer)]
    pub dest_subdir: Layer,

    /// File name on disk (defaults to the last URL path segment)
    #[arg(long)]
    pub filename: Option<String>,

    /// Expected SHA-256 of the payload, 64 hex digits
    #[arg(long)]
    pub sha256: Option<String>,

    /// Refetch and overwrite even if the registry says it is present
    #[arg(long)]
    pub force: bool,

    /// Key in secrets/.env sent as `Authorization: Bearer <value>`
    #[arg(long, value_name = "KEY")]
    pub bearer_secret: Option<String>,

    /// Extra header whose value comes from secrets/.env (repeatable)
    #[arg(long, value_name = "NAME=KEY", value_parser = parse_header_secret)]
    pub header_secret: Vec<(String, String)>,

    #[command(flatten)]
    pub network: NetworkArgs,
}

#[derive(Args)]
pub struct NetworkArgs {
    /// Total attempts including the first
    #[arg(long, env = "DATAREG_MAX_ATTEMPTS", default_value = "4")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on each further retry
    #[arg(long, env = "DATAREG_RETRY_BASE_MS", default_value = "500")]
    pub retry_base_ms: u64,

    /// Per-read timeout in seconds
    #[arg(long, env = "DATAREG_TIMEOUT_SECS", default_value = "60")]
    pub timeout_secs: u64,
}

impl NetworkArgs {
    pub fn settings(&self) -> FetchSettings {
        FetchSettings {
            max_attempts: self.max_attempts,
            base_backoff: Duration::from_millis(self.retry_base_ms),
            read_timeout: Duration::from_secs(self.timeout_secs),
            ..FetchSettings::default()
        }
    }
}

pub(crate) fn parse_layer(s: &str) -> Result<Layer, String> {
    s.parse::<Layer>().map_err(|e| e.to_string())
}

/// Registry rows are one per line, so recorded text may not break lines.
pub(crate) fn parse_single_line(s: &str) -> Result<String, String> {
    if s.contains(['\n', '\r']) {
        return Err("must not contain line breaks".to_string());
    }
    Ok(s.to_string())
}

fn parse_header_secret(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, key)) if !name.trim().is_empty() && !key.trim().is_empty() => {
            Ok((name.trim().to_string(), key.trim().to_string()))
        }
        _ => Err(format!("expected NAME=KEY, got '{s}'")),
    }
}

pub fn run(args: &DownloadArgs, config: &RunConfig, format: OutputFormat) -> Result<()> {
    let expected_sha256 = args
        .sha256
        .as_deref()
        .map(|hex| normalize_sha256(hex).ok_or_else(|| FetchError::InvalidExpectedHash(hex.to_string())))
        .transpose()?;

    let (bearer, headers) = load_credentials(args, config)?;
    let plan = DownloadPlan {
        name: args.name.clone(),
        url: args.url.clone(),
        layer: args.dest_subdir,
        filename: args
            .filename
            .clone()
            .unwrap_or_else(|| default_filename(&args.url)),
        expected_sha256,
        force: args.force,
        headers,
        bearer,
    };

    let bar = DownloadBar::new(&plan.filename, format);
    let mut pipeline = Pipeline::new(config)?.with_progress(&bar);
    let result = pipeline.run(&plan);
    bar.finish();
    tracing::debug!(stage = ?pipeline.stage(), name = %plan.name, "download finished");
    let outcome = result.with_context(|| format!("Download of '{}' failed", plan.name))?;
    println!("{}", format_outcome(&outcome, format));
    Ok(())
}

type Credentials = (Option<Secret>, Vec<(String, Secret)>);

fn load_credentials(args: &DownloadArgs, config: &RunConfig) -> Result<Credentials> {
    if args.bearer_secret.is_none() && args.header_secret.is_empty() {
        return Ok((None, Vec::new()));
    }
    let secrets = Secrets::load_dir(&config.layout.secrets_dir()).context("Failed to load secrets")?;

    let bearer = args
        .bearer_secret
        .as_deref()
        .map(|key| secrets.get(key).cloned())
        .transpose()?;
    let headers = args
        .header_secret
        .iter()
        .map(|(name, key)| Ok((name.clone(), secrets.get(key)?.clone())))
        .collect::<Result<Vec<_>>>()?;
    Ok((bearer, headers))
}
