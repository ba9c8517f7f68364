use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Invalid config value for {key}: {reason}")]
    Config { key: String, reason: String },

    #[error("Report source error: {0}")]
    Source(String),

    #[error("{0}")]
    Other(String),
}
