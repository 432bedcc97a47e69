use thiserror::Error;

/// Errors from the content-addressable store.
#[derive(Debug, Error)]
pub enum ContentError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No content row exists for the requested hash.
    #[error("Content not found: {hash}")]
    NotFound { hash: String },

    /// The source text exceeds the configured size cap.
    #[error("Source too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    /// Decompressed output exceeded the bound (malformed or hostile blob).
    #[error("Decompressed content exceeds {max} bytes")]
    DecompressionTooLarge { max: usize },

    /// The stored payload is not valid UTF-8 after decompression.
    #[error("Stored content for {hash} is not valid UTF-8")]
    InvalidUtf8 { hash: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ContentError>;
