//! Key-value cache contract.

use std::time::Duration;

use async_trait::async_trait;

use crate::CacheError;

/// A best-effort key-value cache.
///
/// A miss never means the entity does not exist; callers fall back to the
/// primary store. Values are serialized entities or scalars.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns the cached value, or `None` on a miss or after expiry.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Removes a single key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Removes several keys in one round trip.
    async fn delete_many(&self, keys: &[String]) -> Result<(), CacheError>;
}
