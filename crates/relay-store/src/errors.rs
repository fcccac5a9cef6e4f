//! Store error types.

/// Errors raised by the persistence gateway.
///
/// Callers on the session lifecycle path treat any of these as a degraded
/// write: logged, never propagated into an in-memory transition. The
/// orchestration service surfaces them for its own CRUD operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool exhausted or unavailable.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A schema migration failed.
    #[error("migration failed: {message}")]
    Migration {
        /// What went wrong.
        message: String,
    },
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, StoreError>;
