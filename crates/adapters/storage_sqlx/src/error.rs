//! Storage-specific error type wrapping sqlx errors.

use polystore_domain::error::PolystoreError;

/// Errors originating from the sqlx storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A query, connection or transaction call failed.
    #[error("database error")]
    Database(#[from] sqlx::Error),

    /// The database returned a key that does not fit an `i64`.
    #[error("generated key {0} does not fit a 64-bit signed integer")]
    GeneratedKey(u64),
}

impl From<StorageError> for PolystoreError {
    fn from(err: StorageError) -> Self {
        Self::Storage(Box::new(err))
    }
}
