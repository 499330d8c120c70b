//! The download state machine: resolve, consult the registry, fetch,
//! install atomically, record.

use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use datareg_core::{
    CoreError, DownloadRecord, Layer, RegistryLedger, ResolvedPath, RunConfig, Secret,
};
use datareg_fetch::{DownloadClient, FetchError, FetchRequest, NoProgress, TransferProgress};
use serde::Serialize;
use tempfile::NamedTempFile;

/// Everything one `download` invocation asks for.
#[derive(Debug)]
pub struct DownloadPlan {
    pub name: String,
    pub url: String,
    pub layer: Layer,
    pub filename: String,
    /// Already normalized to lowercase hex.
    pub expected_sha256: Option<String>,
    pub force: bool,
    pub headers: Vec<(String, Secret)>,
    pub bearer: Option<Secret>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    ResolvePath,
    CheckRegistry,
    Skip,
    Fetch,
    Install,
    Record,
    Done,
    Error,
}

#[derive(Debug, Serialize)]
#[serde(tag = "action", content = "record", rename_all = "lowercase")]
pub enum Outcome {
    Skipped(DownloadRecord),
    Installed(DownloadRecord),
}

impl Outcome {
    pub fn record(&self) -> &DownloadRecord {
        match self {
            Outcome::Skipped(r) | Outcome::Installed(r) => r,
        }
    }
}

pub struct Pipeline<'a> {
    config: &'a RunConfig,
    ledger: RegistryLedger,
    client: DownloadClient,
    progress: &'a dyn TransferProgress,
    stage: Stage,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a RunConfig) -> Result<Self> {
        let client = DownloadClient::new(&config.fetch).context("Failed to build HTTP client")?;
        Ok(Self {
            config,
            ledger: RegistryLedger::open(config.layout.registry_path()),
            client,
            progress: &NoProgress,
            stage: Stage::Start,
        })
    }

    pub fn with_progress(mut self, progress: &'a dyn TransferProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn run(&mut self, plan: &DownloadPlan) -> Result<Outcome> {
        let result = self.drive(plan);
        if let Err(e) = &result {
            tracing::debug!(from = ?self.stage, error = %e, "pipeline failed");
            self.enter(Stage::Error);
        }
        result
    }

    fn drive(&mut self, plan: &DownloadPlan) -> Result<Outcome> {
        self.enter(Stage::ResolvePath);
        let dest = self
            .config
            .layout
            .resolve(&plan.name, plan.layer, &plan.filename)
            .context("Failed to resolve destination")?;

        self.enter(Stage::CheckRegistry);
        if let Some(existing) = self.check_registry(plan, &dest)? {
            self.enter(Stage::Skip);
            self.enter(Stage::Done);
            return Ok(Outcome::Skipped(existing));
        }
        if !plan.force && dest.absolute.exists() {
            return Err(already_exists(&dest.relative).into());
        }

        self.enter(Stage::Fetch);
        let request = self.request_for(plan, &dest);
        let fetched = match self.client.fetch_with_progress(&request, self.progress) {
            Ok(f) => f,
            Err(e) => {
                self.record_failure(plan, &dest, &e);
                return Err(e.into());
            }
        };

        self.enter(Stage::Install);
        install(fetched.temp, &dest.absolute, plan.force)
            .with_context(|| format!("Failed to install {}", dest.relative))?;

        self.enter(Stage::Record);
        let record = DownloadRecord::succeeded(
            &plan.name,
            &plan.url,
            &dest.relative,
            &fetched.sha256,
            fetched.size_bytes,
            fetched.etag,
        );
        self.ledger
            .append(&record)
            .with_context(|| format!("{} was installed but could not be recorded", dest.relative))?;

        self.enter(Stage::Done);
        Ok(Outcome::Installed(record))
    }

    fn check_registry(&self, plan: &DownloadPlan, dest: &ResolvedPath) -> Result<Option<DownloadRecord>> {
        if plan.force {
            return Ok(None);
        }
        let Some(row) = self
            .ledger
            .lookup(&plan.name, &plan.url)
            .context("Failed to read registry")?
        else {
            return Ok(None);
        };
        if row.dest_path != dest.relative {
            tracing::debug!(registered = %row.dest_path, requested = %dest.relative, "destination changed");
            return Ok(None);
        }
        if let Some(expected) = &plan.expected_sha256 {
            if &row.sha256 != expected {
                tracing::debug!(registered = %row.sha256, %expected, "registered hash differs");
                return Ok(None);
            }
        }
        if !dest.absolute.is_file() {
            tracing::warn!(dest = %dest.relative, "registered file is missing, fetching again");
            return Ok(None);
        }
        Ok(Some(row))
    }

    fn request_for(&self, plan: &DownloadPlan, dest: &ResolvedPath) -> FetchRequest {
        let mut req = FetchRequest::new(&plan.url, self.config.layout.temp_dir_for(dest))
            .temp_prefix(dest.file_name())
            .expected_sha256(plan.expected_sha256.clone());
        for (name, value) in &plan.headers {
            req = req.header(name, value.clone());
        }
        if let Some(token) = &plan.bearer {
            req = req.bearer(token.clone());
        }
        req
    }

    fn record_failure(&self, plan: &DownloadPlan, dest: &ResolvedPath, err: &FetchError) {
        let (sha256, size_bytes) = err.received();
        let row = DownloadRecord::failed(&plan.name, &plan.url, &dest.relative, sha256, size_bytes);
        if let Err(e) = self.ledger.append(&row) {
            tracing::error!(error = %e, name = %plan.name, "could not record failed download");
        }
    }

    fn enter(&mut self, next: Stage) {
        tracing::debug!(from = ?self.stage, to = ?next, "stage");
        self.stage = next;
    }
}

fn already_exists(shown: &str) -> CoreError {
    CoreError::PathConflict(format!("{shown} already exists; pass --force to overwrite"))
}

/// Move a finished temp file to `dest`. Without `force` an existing file is
/// never replaced. The temp file is removed on every error path.
pub(crate) fn install(temp: NamedTempFile, dest: &Path, force: bool) -> Result<(), CoreError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(temp.path(), fs::Permissions::from_mode(0o644))?;
    }

    let persisted = if force {
        temp.persist(dest)
    } else {
        temp.persist_noclobber(dest)
    };
    if let Err(e) = persisted {
        return Err(match e.error.kind() {
            io::ErrorKind::AlreadyExists => already_exists(&dest.display().to_string()),
            _ => CoreError::Io(e.error),
        });
    }

    sync_parent(dest);
    tracing::info!(dest = %dest.display(), "installed");
    Ok(())
}

fn sync_parent(path: &Path) {
    #[cfg(unix)]
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}
