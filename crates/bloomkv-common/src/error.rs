//! Error types for bloomkv configuration and validation

use crate::types::BucketNameError;
use thiserror::Error;

/// Common result type
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid bucket name: {0}")]
    InvalidBucketName(#[from] BucketNameError),
}

impl Error {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::configuration("false_positive_rate must be in (0, 1)");
        assert_eq!(
            err.to_string(),
            "configuration error: false_positive_rate must be in (0, 1)"
        );

        let err: Error = BucketNameError::Empty.into();
        assert_eq!(err.to_string(), "invalid bucket name: bucket name cannot be empty");
    }
}
