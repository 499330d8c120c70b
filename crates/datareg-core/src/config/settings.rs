use std::time::Duration;

use crate::error::CoreError;
use crate::paths::DataLayout;

/// Network and retry knobs for the download client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub base_backoff: Duration,
    pub connect_timeout: Duration,
    /// Per-read timeout on the response body.
    pub read_timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(60),
            user_agent: concat!("datareg/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl FetchSettings {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_attempts == 0 {
            return Err(CoreError::Config("max attempts must be at least 1".into()));
        }
        if self.read_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(CoreError::Config("timeouts must be non-zero".into()));
        }
        Ok(())
    }
}

/// Everything a command needs, built once from the command line.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub layout: DataLayout,
    pub fetch: FetchSettings,
}

impl RunConfig {
    pub fn new(layout: DataLayout, fetch: FetchSettings) -> Result<Self, CoreError> {
        fetch.validate()?;
        Ok(Self { layout, fetch })
    }
}
