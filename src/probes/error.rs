use std::time::Duration;

use crate::store::StoreError;

/// Why a probe could not produce a measurement
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProbeError {
    /// The probe did not finish within its timeout
    #[error("probe timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The target could not be reached or is not configured
    #[error("{0}")]
    Unavailable(String),

    /// The target answered with an error
    #[error("query failed: {0}")]
    Query(String),

    /// The probe itself broke (panicked task, poisoned lock, ...)
    #[error("probe failed: {0}")]
    Failed(String),
}

impl ProbeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProbeError::Timeout(_))
    }
}

impl From<StoreError> for ProbeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => ProbeError::Unavailable(msg),
            other => ProbeError::Query(other.to_string()),
        }
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for ProbeError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                ProbeError::Unavailable(err.to_string())
            }
            _ => ProbeError::Query(err.to_string()),
        }
    }
}
