//! Error types for Rudder

use thiserror::Error;

/// Main error type for Rudder operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Validation error for cluster configuration
    #[error("validation error: {0}")]
    Validation(String),

    /// A required setting is missing or unusable
    #[error("settings error: {0}")]
    Settings(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Token acquisition error
    #[error("token error: {0}")]
    Token(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a settings error with the given message
    pub fn settings(msg: impl Into<String>) -> Self {
        Self::Settings(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a token error with the given message
    pub fn token(msg: impl Into<String>) -> Self {
        Self::Token(msg.into())
    }
}
