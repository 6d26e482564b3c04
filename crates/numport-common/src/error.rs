//! Error types shared across numport crates

use thiserror::Error;

/// Result type alias for shared numport operations
pub type Result<T> = std::result::Result<T, NumportError>;

/// Main error type for shared numport concerns
#[derive(Error, Debug)]
pub enum NumportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid phone number '{input}': {reason}")]
    InvalidPhoneNumber { input: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl NumportError {
    pub fn invalid_phone(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPhoneNumber {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
