use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::{Cache, CacheError};

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// In-memory TTL cache.
///
/// Expiry uses the tokio clock, so tests can drive it with a paused runtime.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail with [`CacheError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns true if `key` holds an unexpired value.
    pub async fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .await
            .get(key)
            .is_some_and(|entry| entry.expires_at > Instant::now())
    }

    /// Returns the remaining lifetime of `key`.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.expires_at - now)
    }

    /// Returns the value of `key` without going through the fault switch.
    pub async fn peek(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone())
    }

    fn check_available(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable(
                "in-memory cache is offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check_available()?;
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.check_available()?;
        self.entries.write().await.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.check_available()?;
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), CacheError> {
        self.check_available()?;
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = InMemoryCache::new();
        cache
            .set("product:p1", "{}".to_string(), Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(cache.get("product:p1").await.unwrap().as_deref(), Some("{}"));

        tokio::time::advance(Duration::from_secs(599)).await;
        assert!(cache.contains("product:p1").await);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("product:p1").await.unwrap(), None);
        assert!(!cache.contains("product:p1").await);
    }

    #[tokio::test]
    async fn delete_many_removes_all_listed_keys() {
        let cache = InMemoryCache::new();
        for key in ["a", "b", "c"] {
            cache.set(key, key.to_string(), Duration::from_secs(60)).await.unwrap();
        }
        cache
            .delete_many(&["a".to_string(), "c".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert!(!cache.contains("a").await);
        assert!(cache.contains("b").await);
        assert!(!cache.contains("c").await);
    }

    #[tokio::test]
    async fn offline_cache_reports_errors() {
        let cache = InMemoryCache::new();
        cache.set_unavailable(true);
        assert!(cache.get("k").await.is_err());
        assert!(cache.delete("k").await.is_err());
        assert!(
            cache
                .set("k", "v".to_string(), Duration::from_secs(1))
                .await
                .is_err()
        );
    }
}
