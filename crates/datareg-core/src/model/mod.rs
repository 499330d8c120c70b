pub mod layer;
pub mod record;

pub use layer::Layer;
pub use record::{DownloadRecord, FetchStatus, REGISTRY_HEADER};
