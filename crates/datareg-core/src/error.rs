use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid dataset path: {0}")]
    PathConflict(String),

    #[error("Registry write failed: {0}")]
    RegistryWrite(String),

    #[error("Registry parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Secrets error: {0}")]
    Secret(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
