use thiserror::Error;

#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Unknown tier: {0}")]
    UnknownTier(String),

    #[error("Invalid rate configuration: {0}")]
    InvalidRate(String),

    #[error("Invalid token count: {0} (must be greater than zero)")]
    InvalidTokenCount(u64),

    #[error("Identity key cannot be empty")]
    EmptyKey,

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("File system error: {0}")]
    FileSystemError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl RateLimitError {
    /// Whether the error stems from a bad tier table rather than a bad call.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RateLimitError::ConfigurationError(_)
                | RateLimitError::UnknownTier(_)
                | RateLimitError::InvalidRate(_)
                | RateLimitError::JsonError(_)
        )
    }
}

/// Result type alias for rate limiter operations
pub type Result<T> = std::result::Result<T, RateLimitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(RateLimitError::UnknownTier("GOLD".into()).is_configuration());
        assert!(RateLimitError::InvalidRate("capacity".into()).is_configuration());
        assert!(!RateLimitError::InvalidTokenCount(0).is_configuration());
        assert!(!RateLimitError::EmptyKey.is_configuration());
        assert!(!RateLimitError::InvalidCommand("consume".into()).is_configuration());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            RateLimitError::InvalidTokenCount(0).to_string(),
            "Invalid token count: 0 (must be greater than zero)"
        );
        assert_eq!(
            RateLimitError::UnknownTier("GOLD".into()).to_string(),
            "Unknown tier: GOLD"
        );
    }
}
