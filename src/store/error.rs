//! Error types for keyed store operations

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to the keyed store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached
    #[error("keyed store unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected or failed a command
    #[error("keyed store command failed: {0}")]
    Command(String),

    /// A key holds a value of an unexpected shape
    #[error("key {key} holds an invalid value: {reason}")]
    InvalidValue { key: String, reason: String },
}

#[cfg(feature = "redis-store")]
impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_refusal() || err.is_timeout() {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Command(err.to_string())
        }
    }
}
