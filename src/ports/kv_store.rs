use async_trait::async_trait;
use thiserror::Error;

/// Error type for key-value store operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// Backing store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Backend rejected the operation
    #[error("Store operation failed: {0}")]
    OperationFailed(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// KvStore defines the port (interface) for the ephemeral key-value mapping shared
/// by stored base configs and short links.
///
/// Keys and values are opaque strings. Implementations decide about expiry; the
/// in-memory adapter keeps entries for the process lifetime.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Fetch the value for `key`, `None` when absent
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Insert or overwrite `key`
    async fn put(&self, key: &str, value: String) -> StoreResult<()>;

    /// Insert `key` only if it is absent. Returns `false` when the key was taken.
    async fn put_if_absent(&self, key: &str, value: String) -> StoreResult<bool>;

    /// Remove `key`. Returns `true` when an entry was removed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;
}
