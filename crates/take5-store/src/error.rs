//! Error types for the persistence layer.

/// Errors from identity lookup and room persistence.
///
/// None of these are fatal to the server: callers log them and carry on
/// with the in-memory state.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A snapshot could not be encoded or decoded.
    #[error("snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// A thread panicked while holding the connection.
    #[error("store connection lock poisoned")]
    Poisoned,
}
