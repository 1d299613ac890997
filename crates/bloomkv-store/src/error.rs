//! Error type for backend operations

use bloomkv_common::types::{BucketNameError, KeyDisplay};

/// Error type for backend operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error("key exists: {bucket}/{key}")]
    KeyExists { bucket: String, key: String },

    #[error("key not found: {bucket}/{key}")]
    KeyNotFound { bucket: String, key: String },

    #[error("value of {bucket}/{key} is not a number: {value:?}")]
    NotANumber {
        bucket: String,
        key: String,
        value: String,
    },

    #[error("invalid bucket name: {0}")]
    InvalidBucketName(#[from] BucketNameError),

    #[error("redb error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),

    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub(crate) fn key_exists(bucket: &str, key: &[u8]) -> Self {
        Self::KeyExists {
            bucket: bucket.to_string(),
            key: KeyDisplay(key).to_string(),
        }
    }

    pub(crate) fn key_not_found(bucket: &str, key: &[u8]) -> Self {
        Self::KeyNotFound {
            bucket: bucket.to_string(),
            key: KeyDisplay(key).to_string(),
        }
    }

    pub(crate) fn not_a_number(bucket: &str, key: &[u8], value: &[u8]) -> Self {
        Self::NotANumber {
            bucket: bucket.to_string(),
            key: KeyDisplay(key).to_string(),
            value: String::from_utf8_lossy(value).into_owned(),
        }
    }

    /// Failure of the durable store itself rather than of an operation's precondition
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Database(_)
                | Self::Storage(_)
                | Self::Table(_)
                | Self::Transaction(_)
                | Self::Commit(_)
                | Self::Io(_)
        )
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. })
    }
}
