use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Top-level data directory a dataset file lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Raw,
    External,
    Interim,
    Processed,
}

impl Layer {
    pub const ALL: [Layer; 4] = [Layer::Raw, Layer::External, Layer::Interim, Layer::Processed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Raw => "raw",
            Layer::External => "external",
            Layer::Interim => "interim",
            Layer::Processed => "processed",
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Layer {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Layer::ALL
            .into_iter()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| {
                CoreError::PathConflict(format!(
                    "unknown layer '{s}' (expected raw, external, interim or processed)"
                ))
            })
    }
}
