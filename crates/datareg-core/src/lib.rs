//! Core building blocks for datareg: the on-disk data layout, the
//! append-only provenance registry, content hashing, and run configuration.

pub mod config;
pub mod digest;
pub mod error;
pub mod model;
pub mod paths;
pub mod registry;

pub use config::{FetchSettings, RunConfig, Secret, Secrets};
pub use error::CoreError;
pub use model::{DownloadRecord, FetchStatus, Layer};
pub use paths::{default_filename, DataLayout, ResolvedPath};
pub use registry::RegistryLedger;
