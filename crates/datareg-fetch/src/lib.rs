//! HTTP download client for datareg.
//!
//! Downloads stream into a temp file next to their destination while being
//! hashed. Transient failures are retried with exponential backoff; the
//! caller decides where the verified temp file is installed.

pub mod client;
pub mod error;
pub mod progress;
pub mod retry;

pub use client::{DownloadClient, FetchRequest, FetchedFile};
pub use error::FetchError;
pub use progress::{NoProgress, TransferProgress};
pub use retry::{classify_status, retry_delay, run_with_retry, AttemptOutcome, RetryPolicy, StatusClass};
