//! Error types for the Naturale core library.

/// Top-level error enum for the Naturale core library.
#[derive(Debug, thiserror::Error)]
pub enum NaturaleError {
    #[error("Empty or invalid query")]
    EmptyInput,

    #[error("Metadata fetch failed: {0}")]
    MetadataFetch(String),

    #[error("AI strategy failed: {0}")]
    AiStrategy(String),

    #[error("Compile error: {0}")]
    Compile(String),

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Server error: HTTP {status} - {body}")]
    Server { status: u16, body: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NaturaleError {
    /// Errors that a later strategy may still recover from.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, NaturaleError::EmptyInput | NaturaleError::Compile(_))
    }
}

pub type NaturaleResult<T> = Result<T, NaturaleError>;
