use thiserror::Error;

/// Errors surfaced by the round engine and its stores.
#[derive(Debug, Error)]
pub enum NbackError {
    /// Malformed configuration handed to the generator or to `start()`.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("preferences could not be encoded: {0}")]
    PreferencesFormat(#[from] serde_json::Error),

    #[error("history database error: {0}")]
    History(#[from] rusqlite::Error),
}

impl NbackError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }
}

pub type Result<T> = std::result::Result<T, NbackError>;
