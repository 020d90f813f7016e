use thiserror::Error;
use wheel_database::BackendError;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("required capabilities are missing: {}", .0.join(", "))]
    MissingCapabilities(Vec<String>),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MigrationError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
