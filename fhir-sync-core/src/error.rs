//! Error types shared by the synchronizer and its collaborators.

use thiserror::Error;

/// Errors raised by a [`DataSource`](crate::DataSource) implementation.
#[derive(Debug, Error)]
pub enum DataSourceError {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Server answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// Response body could not be decoded
    #[error("Failed to decode response: {0}")]
    Decode(String),
    /// Anything else (connection refused, timeouts, ...)
    #[error("{0}")]
    Other(String),
}

/// Errors raised by a [`LocalChangeStore`](crate::LocalChangeStore) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("{0}")]
    Other(String),
}

/// An error recorded while running a sync pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A remote request failed
    #[error("Data source error: {0}")]
    DataSource(#[from] DataSourceError),
    /// The local store failed
    #[error("Local store error: {0}")]
    Store(#[from] StoreError),
    /// The pass itself failed unexpectedly (panic, aborted task)
    #[error("Internal sync failure: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display() {
        let err = DataSourceError::Http {
            status: 503,
            body: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "HTTP 503: unavailable");
    }

    #[test]
    fn test_sync_error_wraps_source() {
        let err: SyncError = DataSourceError::Decode("bad json".into()).into();
        assert!(matches!(
            err,
            SyncError::DataSource(DataSourceError::Decode(_))
        ));
        assert_eq!(
            err.to_string(),
            "Data source error: Failed to decode response: bad json"
        );
    }
}
