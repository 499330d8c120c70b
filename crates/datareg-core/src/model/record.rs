use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Column order of `data/_registry.csv`. Field order of [`DownloadRecord`] must match.
pub const REGISTRY_HEADER: &str =
    "name,url,dest_path,sha256,size_bytes,timestamp_utc,status,http_etag";

/// Outcome of a single fetch attempt as recorded in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Succeeded,
    Failed,
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStatus::Succeeded => "succeeded",
            FetchStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FetchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(FetchStatus::Succeeded),
            "failed" => Ok(FetchStatus::Failed),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

/// One immutable row of the provenance registry.
///
/// Written exactly once per fetch attempt and never modified afterwards.
/// `dest_path` is relative to the project root so the registry stays valid
/// when the checkout moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub name: String,
    pub url: String,
    pub dest_path: String,
    pub sha256: String,
    pub size_bytes: u64,
    pub timestamp_utc: DateTime<Utc>,
    pub status: FetchStatus,
    pub http_etag: Option<String>,
}

impl DownloadRecord {
    /// A row for a file that is installed at `dest_path` with the given hash.
    pub fn succeeded(
        name: &str,
        url: &str,
        dest_path: &str,
        sha256: &str,
        size_bytes: u64,
        http_etag: Option<String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            dest_path: dest_path.to_string(),
            sha256: sha256.to_string(),
            size_bytes,
            timestamp_utc: Utc::now().trunc_subsecs(3),
            status: FetchStatus::Succeeded,
            http_etag,
        }
    }

    /// A row for an attempt that installed nothing. `sha256` may be empty
    /// when no body was received.
    pub fn failed(name: &str, url: &str, dest_path: &str, sha256: &str, size_bytes: u64) -> Self {
        Self {
            status: FetchStatus::Failed,
            ..Self::succeeded(name, url, dest_path, sha256, size_bytes, None)
        }
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == FetchStatus::Succeeded
    }
}
