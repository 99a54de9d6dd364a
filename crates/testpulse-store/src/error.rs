//! Error types for the storage layer.

/// Errors returned by [`UserStore`](crate::UserStore) and
/// [`AnalyticsReader`](crate::AnalyticsReader) implementations.
///
/// None of these are fatal to a session; the session engine turns them
/// into an error envelope and keeps going.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Every pooled connection stayed busy past the acquire timeout.
    #[error("timed out waiting for a database connection")]
    PoolTimeout,

    /// The store can't be reached at all (pool closed, network down,
    /// or the in-memory store switched off by a test).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Any other database failure.
    #[cfg(feature = "mysql")]
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

#[cfg(feature = "mysql")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => Self::PoolTimeout,
            sqlx::Error::PoolClosed => Self::Unavailable("connection pool closed".into()),
            sqlx::Error::Io(e) => Self::Unavailable(e.to_string()),
            other => Self::Database(other),
        }
    }
}
