use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CoreError;
use crate::model::Layer;

/// Directory under the project root holding every dataset layer and the registry.
pub const DATA_DIR: &str = "data";
/// Registry file name inside [`DATA_DIR`].
pub const REGISTRY_FILE: &str = "_registry.csv";
/// Directory under the project root holding `.env` credentials.
pub const SECRETS_DIR: &str = "secrets";
/// Filename used when a URL has no usable last path segment.
pub const FALLBACK_FILENAME: &str = "download.bin";

/// A destination computed for `(name, layer, filename)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Absolute-or-root-joined path on disk.
    pub absolute: PathBuf,
    /// `data/<layer>/<name>/<filename>`, always with `/` separators. This is what the registry stores.
    pub relative: String,
}

impl ResolvedPath {
    pub fn parent(&self) -> &Path {
        self.absolute.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn file_name(&self) -> &str {
        self.relative.rsplit('/').next().unwrap_or(&self.relative)
    }
}

/// The fixed `data/` layout rooted at the project directory.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        // Absolute roots keep registry-relative paths stable across cwd changes.
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn layer_dir(&self, layer: Layer) -> PathBuf {
        self.data_dir().join(layer.as_str())
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir().join(REGISTRY_FILE)
    }

    pub fn secrets_dir(&self) -> PathBuf {
        self.root.join(SECRETS_DIR)
    }

    /// Create every layer directory and `secrets/`. Idempotent.
    pub fn ensure_layout(&self) -> Result<(), CoreError> {
        for layer in Layer::ALL {
            fs::create_dir_all(self.layer_dir(layer))?;
        }
        fs::create_dir_all(self.secrets_dir())?;
        Ok(())
    }

    /// Compute `data/<layer>/<name>/<filename>` without touching disk.
    pub fn locate(&self, name: &str, layer: Layer, filename: &str) -> Result<ResolvedPath, CoreError> {
        validate_component("dataset name", name)?;
        validate_component("filename", filename)?;

        let relative = format!("{DATA_DIR}/{}/{name}/{filename}", layer.as_str());
        let absolute = self.layer_dir(layer).join(name).join(filename);
        Ok(ResolvedPath { absolute, relative })
    }

    /// Like [`locate`](Self::locate), then create the destination's parent
    /// directories. The destination file itself is never created.
    pub fn resolve(&self, name: &str, layer: Layer, filename: &str) -> Result<ResolvedPath, CoreError> {
        let resolved = self.locate(name, layer, filename)?;
        fs::create_dir_all(resolved.parent())?;
        Ok(resolved)
    }

    /// Temp files go next to the destination so the final rename stays on one filesystem.
    pub fn temp_dir_for(&self, resolved: &ResolvedPath) -> PathBuf {
        resolved.parent().to_path_buf()
    }

    /// Map a registry-relative `dest_path` back onto disk.
    pub fn absolute_from_relative(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|c| !c.is_empty())
            .fold(self.root.clone(), |acc, c| acc.join(c))
    }
}

fn validate_component(what: &str, value: &str) -> Result<(), CoreError> {
    let reject = |reason: &str| {
        Err(CoreError::PathConflict(format!(
            "{what} '{}' {reason}",
            value.escape_debug()
        )))
    };

    if value.is_empty() {
        return reject("is empty");
    }
    if value.chars().any(char::is_control) {
        return reject("contains a control character");
    }
    if value == "." || value == ".." {
        return reject("is a relative directory reference");
    }
    if value.contains('/') || value.contains('\\') {
        return reject("contains a path separator");
    }
    if Path::new(value).is_absolute() || has_drive_prefix(value) {
        return reject("is an absolute path");
    }
    Ok(())
}

fn has_drive_prefix(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Derive a filename from the last path segment of `url`, ignoring query and fragment.
pub fn default_filename(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let without_query = without_fragment.split('?').next().unwrap_or(without_fragment);
    let path = match without_query.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, p)| p).unwrap_or(""),
        None => without_query,
    };
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|seg| !seg.is_empty() && validate_component("filename", seg).is_ok())
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string())
}
