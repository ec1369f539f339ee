use thiserror::Error;

/// Main error type for ctxbridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Rejected tool input (bad path, empty query, traversal, oversize).
    /// Displays as the bare message so the facade can surface it verbatim.
    #[error("{0}")]
    InvalidInput(String),

    /// A file could not be opened or read during a pass
    #[error("failed to read {path}: {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },

    /// The registry file exists but does not parse
    #[error("project registry is corrupt: {0}")]
    RegistryCorrupt(String),

    /// Upload kept failing on transient conditions until retries ran out
    #[error("upload failed after {attempts} attempts: {message}")]
    UploadTransient { attempts: u32, message: String },

    /// Upload rejected outright (4xx or malformed response body)
    #[error("upload rejected: {0}")]
    UploadPermanent(String),

    /// Retrieval request failed after retries
    #[error("search failed: {0}")]
    Search(String),

    /// Configuration errors
    #[error("{0}")]
    Config(String),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenient Result type using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;
