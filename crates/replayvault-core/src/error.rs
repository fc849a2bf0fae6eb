//! Error types for ReplayVault Core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    // Capture errors
    #[error("Capture error: {0}")]
    Capture(String),

    #[error("No active capture for participant {0}")]
    NoActiveCapture(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error must prevent the engine from starting
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::ConfigValidation(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_config_errors_are_fatal() {
        assert!(Error::Config("bad".to_string()).is_fatal());
        assert!(Error::ConfigValidation("bad".to_string()).is_fatal());
        assert!(!Error::Capture("boom".to_string()).is_fatal());
        assert!(!Error::NoActiveCapture("p1".to_string()).is_fatal());
        assert!(!Error::Io(std::io::Error::other("disk")).is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = Error::NoActiveCapture("alice".to_string());
        assert_eq!(err.to_string(), "No active capture for participant alice");
    }
}
