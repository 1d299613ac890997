//! Core type definitions for bloomkv
//!
//! Bucket names and small helpers shared between the store and the CLI.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a bucket name in bytes
pub const MAX_BUCKET_NAME_LEN: usize = 64;

/// Name of a bucket (an independent keyspace inside the store file)
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct BucketName(String);

impl BucketName {
    /// Create a new bucket name, validating naming rules
    pub fn new(name: impl Into<String>) -> Result<Self, BucketNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Get the bucket name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the owned string
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    fn validate(name: &str) -> Result<(), BucketNameError> {
        let Some(first) = name.chars().next() else {
            return Err(BucketNameError::Empty);
        };
        if name.len() > MAX_BUCKET_NAME_LEN {
            return Err(BucketNameError::TooLong);
        }
        if !first.is_ascii_alphanumeric() {
            return Err(BucketNameError::InvalidStartChar);
        }
        for c in name.chars() {
            if !c.is_ascii_alphanumeric() && c != '-' && c != '_' && c != '.' {
                return Err(BucketNameError::InvalidChar(c));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BucketName({:?})", self.0)
    }
}

impl AsRef<str> for BucketName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for BucketName {
    type Error = BucketNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Errors that can occur when creating a bucket name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BucketNameError {
    #[error("bucket name cannot be empty")]
    Empty,
    #[error("bucket name must be at most {MAX_BUCKET_NAME_LEN} bytes")]
    TooLong,
    #[error("bucket name must start with a letter or number")]
    InvalidStartChar,
    #[error("bucket name contains invalid character: {0:?}")]
    InvalidChar(char),
}

/// Lossy printable view of a binary key, for log lines and error messages
pub struct KeyDisplay<'a>(pub &'a [u8]);

impl fmt::Display for KeyDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.0).escape_debug())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_name_valid() {
        assert!(BucketName::new("default").is_ok());
        assert!(BucketName::new("sessions_v2").is_ok());
        assert!(BucketName::new("a.b-c").is_ok());
        assert!(BucketName::new("7").is_ok());
    }

    #[test]
    fn test_bucket_name_invalid() {
        assert_eq!(BucketName::new(""), Err(BucketNameError::Empty));
        assert_eq!(
            BucketName::new("-bucket"),
            Err(BucketNameError::InvalidStartChar)
        );
        assert_eq!(
            BucketName::new("has space"),
            Err(BucketNameError::InvalidChar(' '))
        );
        assert_eq!(
            BucketName::new("x".repeat(MAX_BUCKET_NAME_LEN + 1)),
            Err(BucketNameError::TooLong)
        );
    }

    #[test]
    fn test_key_display_escapes_binary() {
        assert_eq!(KeyDisplay(b"user:1").to_string(), "user:1");
        assert_eq!(KeyDisplay(b"a\nb").to_string(), "a\\nb");
    }
}
