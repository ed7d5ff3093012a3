use thiserror::Error;
use txscope_types::TxConversionError;

/// A dynamic error type for encapsulating backend errors.
///
/// Used as the source for most [`StorageError`] variants so Redis and other
/// backend errors are wrapped uniformly.
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that may occur while interacting with the cache store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to establish a connection to the cache backend.
    #[error("cache connection failed")]
    Connection(#[source] SourceError),

    /// Failed to read from the cache.
    #[error("cache read failed")]
    Read(#[source] SourceError),

    /// Failed to write to the cache.
    #[error("cache write failed")]
    Write(#[source] SourceError),

    /// A cached record did not encode or decode as expected.
    #[error("malformed cache record")]
    Codec(#[from] serde_json::Error),

    /// A signed transaction could not be converted into a stored record.
    #[error(transparent)]
    Transaction(#[from] TxConversionError),
}
