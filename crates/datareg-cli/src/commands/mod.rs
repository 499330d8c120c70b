pub mod clean;
pub mod download;
pub mod init;
pub mod log;
pub mod register;
pub mod verify;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Create the data/ layout, secrets/ and an empty registry
    Init,
    /// Download a dataset file and record it in the registry
    Download(download::DownloadArgs),
    /// Register an existing local file (e.g. a manual export)
    Register(register::RegisterArgs),
    /// List registry entries
    Log(log::LogArgs),
    /// Check installed files against their registered hashes
    Verify(verify::VerifyArgs),
    /// Remove orphaned temp files left by interrupted downloads
    Clean(clean::CleanArgs),
}
