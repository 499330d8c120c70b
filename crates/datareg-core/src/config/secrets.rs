use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CoreError;

/// Default credentials file inside `secrets/`.
pub const SECRETS_FILE: &str = ".env";

/// A credential value. Never printed: both `Debug` and `Display` redact it.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value, for handing to an HTTP header and nothing else.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("***")
    }
}

/// Key/value credentials loaded from a `.env`-style file.
#[derive(Debug, Default)]
pub struct Secrets {
    source: Option<PathBuf>,
    values: HashMap<String, Secret>,
}

impl Secrets {
    /// Load `<secrets_dir>/.env`. Missing file is an error only once a key is requested.
    pub fn load_dir(secrets_dir: &Path) -> Result<Self, CoreError> {
        let path = secrets_dir.join(SECRETS_FILE);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no secrets file");
            return Ok(Self {
                source: Some(path),
                values: HashMap::new(),
            });
        }
        Self::load_file(&path)
    }

    pub fn load_file(path: &Path) -> Result<Self, CoreError> {
        let content = fs::read_to_string(path)
            .map_err(|e| CoreError::Secret(format!("cannot read {}: {e}", path.display())))?;
        let values = parse_env(&content)?;
        tracing::debug!(path = %path.display(), keys = values.len(), "loaded secrets");
        Ok(Self {
            source: Some(path.to_path_buf()),
            values,
        })
    }

    pub fn get(&self, key: &str) -> Result<&Secret, CoreError> {
        self.values.get(key).ok_or_else(|| {
            let from = self
                .source
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "secrets".to_string());
            CoreError::Secret(format!("key '{key}' not found in {from}"))
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn parse_env(content: &str) -> Result<HashMap<String, Secret>, CoreError> {
    let mut values = HashMap::new();
    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        // Report the line number only; the line itself may hold a credential.
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| CoreError::Secret(format!("line {} is not KEY=VALUE", idx + 1)))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(CoreError::Secret(format!("line {} has an empty key", idx + 1)));
        }
        values.insert(key.to_string(), Secret::new(unquote(value.trim())));
    }
    Ok(values)
}

fn unquote(value: &str) -> &str {
    for q in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
