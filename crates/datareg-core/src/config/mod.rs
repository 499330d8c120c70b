pub mod secrets;
pub mod settings;

pub use secrets::{Secret, Secrets};
pub use settings::{FetchSettings, RunConfig};
