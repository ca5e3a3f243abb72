//! Key-value store seam.
//!
//! The tool registry and session store share state across gateway
//! instances through this trait. [`RedisKv`] is the deployment
//! implementation; [`MemoryKv`] backs tests and single-process setups.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;

use crate::error::GatewayError;

/// Minimal KV surface: string keys with TTL plus per-key hashes.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a string key.
    async fn get(&self, key: &str) -> Result<Option<String>, GatewayError>;

    /// Write a string key.
    async fn set(&self, key: &str, value: String) -> Result<(), GatewayError>;

    /// Write a string key that expires.
    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), GatewayError>;

    /// Delete a key (string or hash).
    async fn delete(&self, key: &str) -> Result<(), GatewayError>;

    /// Set one hash field.
    async fn hset(&self, key: &str, field: &str, value: String) -> Result<(), GatewayError>;

    /// Read one hash field.
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, GatewayError>;

    /// Read a whole hash.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, GatewayError>;

    /// Delete one hash field.
    async fn hdel(&self, key: &str, field: &str) -> Result<(), GatewayError>;
}

/// In-process KV store.
#[derive(Debug, Default)]
pub struct MemoryKv {
    strings: DashMap<String, (String, Option<Instant>)>,
    hashes: DashMap<String, HashMap<String, String>>,
}

impl MemoryKv {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, GatewayError> {
        match self.strings.get(key) {
            Some(entry) => {
                let (value, expires) = entry.value();
                if expires.is_some_and(|at| Instant::now() >= at) {
                    drop(entry);
                    self.strings.remove(key);
                    Ok(None)
                } else {
                    Ok(Some(value.clone()))
                }
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<(), GatewayError> {
        self.strings.insert(key.to_owned(), (value, None));
        Ok(())
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), GatewayError> {
        self.strings
            .insert(key.to_owned(), (value, Some(Instant::now() + ttl)));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), GatewayError> {
        self.strings.remove(key);
        self.hashes.remove(key);
        Ok(())
    }

    async fn hset(&self, key: &str, field: &str, value: String) -> Result<(), GatewayError> {
        self.hashes
            .entry(key.to_owned())
            .or_default()
            .insert(field.to_owned(), value);
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, GatewayError> {
        Ok(self
            .hashes
            .get(key)
            .and_then(|hash| hash.get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, GatewayError> {
        Ok(self.hashes.get(key).map(|h| h.clone()).unwrap_or_default())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<(), GatewayError> {
        if let Some(mut hash) = self.hashes.get_mut(key) {
            hash.remove(field);
        }
        Ok(())
    }
}

/// Redis-backed KV store shared by all gateway instances.
#[derive(Clone)]
pub struct RedisKv {
    connection: redis::aio::ConnectionManager,
}

impl RedisKv {
    /// Connect to the Redis instance at `url`.
    pub async fn connect(url: &str) -> Result<Self, GatewayError> {
        let client = redis::Client::open(url).map_err(|e| GatewayError::Kv(e.to_string()))?;
        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| GatewayError::Kv(e.to_string()))?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl KvStore for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>, GatewayError> {
        let mut conn = self.connection.clone();
        conn.get(key)
            .await
            .map_err(|e| GatewayError::Kv(e.to_string()))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), GatewayError> {
        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| GatewayError::Kv(e.to_string()))
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), GatewayError> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs())
            .await
            .map_err(|e| GatewayError::Kv(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), GatewayError> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| GatewayError::Kv(e.to_string()))
    }

    async fn hset(&self, key: &str, field: &str, value: String) -> Result<(), GatewayError> {
        let mut conn = self.connection.clone();
        conn.hset::<_, _, _, ()>(key, field, value)
            .await
            .map_err(|e| GatewayError::Kv(e.to_string()))
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, GatewayError> {
        let mut conn = self.connection.clone();
        conn.hget(key, field)
            .await
            .map_err(|e| GatewayError::Kv(e.to_string()))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, GatewayError> {
        let mut conn = self.connection.clone();
        conn.hgetall(key)
            .await
            .map_err(|e| GatewayError::Kv(e.to_string()))
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<(), GatewayError> {
        let mut conn = self.connection.clone();
        conn.hdel::<_, _, ()>(key, field)
            .await
            .map_err(|e| GatewayError::Kv(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn string_roundtrip() {
        let kv = MemoryKv::new();
        assert_eq!(kv.get("k").await.unwrap(), None);
        kv.set("k", "v".into()).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), Some("v".into()));
        kv.delete("k").await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn ttl_expires_keys() {
        let kv = MemoryKv::new();
        kv.set_with_ttl("k", "v".into(), Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(kv.get("k").await.unwrap(), Some("v".into()));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(kv.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn hash_roundtrip() {
        let kv = MemoryKv::new();
        kv.hset("h", "a", "1".into()).await.unwrap();
        kv.hset("h", "b", "2".into()).await.unwrap();

        assert_eq!(kv.hget("h", "a").await.unwrap(), Some("1".into()));
        assert_eq!(kv.hgetall("h").await.unwrap().len(), 2);

        kv.hdel("h", "a").await.unwrap();
        assert_eq!(kv.hget("h", "a").await.unwrap(), None);

        kv.delete("h").await.unwrap();
        assert!(kv.hgetall("h").await.unwrap().is_empty());
    }
}
