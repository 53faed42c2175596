use thiserror::Error;

/// Errors raised by the primary document store and the search index.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or refused the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A write would violate a unique-key constraint.
    #[error("Duplicate key in {collection}: {field} = {value}")]
    DuplicateKey {
        collection: String,
        field: String,
        value: String,
    },

    /// A document did not have the shape an operation requires.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for document store and search index operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by a cache. Cache failures are never authoritative.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache could not be reached.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// A Redis command failed.
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Errors raised by the durable log.
#[derive(Debug, Error)]
pub enum LogError {
    /// The broker could not be reached.
    #[error("Log unavailable: {0}")]
    Unavailable(String),

    /// The reader or writer has already been closed.
    #[error("Log handle is closed")]
    Closed,

    /// The broker replied with something the client cannot interpret.
    #[error("Malformed log reply: {0}")]
    Malformed(String),

    /// A Redis command failed.
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}
