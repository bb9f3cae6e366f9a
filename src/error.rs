use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed plugin metadata: {0}")]
    Metadata(#[from] prost::DecodeError),

    #[error("No video data for run={run:?}, tag={tag:?}")]
    NotFound { run: String, tag: String },

    #[error("Blob '{0}' not found")]
    BlobNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Video encoding failed: {0}")]
    Encode(String),

    #[error("Demux error: {0}")]
    Demux(String),

    #[error("Series storage error: {0}")]
    Storage(String),
}

impl PluginError {
    /// True for errors caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PluginError::NotFound { .. }
                | PluginError::BlobNotFound(_)
                | PluginError::InvalidArgument(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PluginError>;
