//! Narrow interface to an optional external key-value store.
//!
//! The resolver never assumes anything about the store beyond get, set
//! with TTL, and delete on opaque bytes. Mirror failures must degrade to
//! cache misses, so the trait is infallible from the caller's view —
//! implementations log and swallow their own transport errors.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// External key-value store, as seen by the caches.
#[async_trait]
pub trait KvMirror: Send + Sync {
    /// Fetches a value; `None` for missing, expired or unreachable.
    async fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Stores a value expiring after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);

    /// Removes a value.
    async fn delete(&self, key: &str);
}

/// In-process store used in tests and as a stand-in when no external
/// store is configured.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
}

#[async_trait]
impl KvMirror for MemoryKv {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.lock();
        let (value, expires_at) = entries.get(key)?;
        if *expires_at <= Instant::now() {
            return None;
        }
        Some(value.clone())
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.entries
            .lock()
            .insert(key.to_string(), (value, Instant::now() + ttl));
    }

    async fn delete(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let kv = MemoryKv::default();
        kv.set("k", b"v".to_vec(), Duration::from_secs(60)).await;
        assert_eq!(kv.get("k").await, Some(b"v".to_vec()));
        kv.delete("k").await;
        assert_eq!(kv.get("k").await, None);
    }

    #[tokio::test]
    async fn expiry_respected() {
        let kv = MemoryKv::default();
        kv.set("k", b"v".to_vec(), Duration::ZERO).await;
        assert_eq!(kv.get("k").await, None);
    }
}
