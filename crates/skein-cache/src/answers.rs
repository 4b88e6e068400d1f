//! The shared answer cache.
//!
//! Keyed by canonicalized `(qname, qtype)`. Values hold the record set as
//! presentation strings plus an absolute expiry; expired entries are
//! treated as absent on read and reaped when their shard is next written.
//! Capacity is enforced per shard on insertion by evicting the least
//! recently used entry. Shard mutexes give at-most-one writer per key;
//! readers only touch an atomic access stamp while holding the lock
//! briefly.

use crate::{clamp_ttl, mirror::KvMirror};
use parking_lot::Mutex;
use skein_proto::presentation::parse_record;
use skein_proto::{Name, RType, Record};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

const SHARDS: usize = 16;

/// Canonical cache key: lowercased FQDN plus query type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    name: Name,
    rtype: RType,
}

impl CacheKey {
    /// Builds a key, canonicalizing the name.
    pub fn new(name: &Name, rtype: RType) -> Self {
        Self {
            name: name.to_lowercase(),
            rtype,
        }
    }

    /// The canonicalized name.
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// The query type.
    pub fn rtype(&self) -> RType {
        self.rtype
    }

    /// Stable string form, used as the external mirror key.
    pub fn mirror_key(&self) -> String {
        format!("{}_{}", self.name, self.rtype.to_u16())
    }
}

struct Entry {
    lines: Vec<String>,
    expires_at: Instant,
    stamp: AtomicU64,
}

struct Shard {
    map: HashMap<CacheKey, Entry>,
}

/// TTL-bounded, LRU-evicting answer cache.
pub struct AnswerCache {
    shards: Vec<Mutex<Shard>>,
    per_shard_cap: usize,
    clock: AtomicU64,
    mirror: Option<Arc<dyn KvMirror>>,
}

impl AnswerCache {
    /// Creates a cache holding at most `max_entries` sets.
    pub fn new(max_entries: usize) -> Self {
        let per_shard_cap = max_entries.div_ceil(SHARDS).max(1);
        let shards = (0..SHARDS)
            .map(|_| {
                Mutex::new(Shard {
                    map: HashMap::new(),
                })
            })
            .collect();
        Self {
            shards,
            per_shard_cap,
            clock: AtomicU64::new(0),
            mirror: None,
        }
    }

    /// Attaches an external mirror; writes and invalidations are forwarded,
    /// reads fall back to it on a local miss.
    pub fn with_mirror(mut self, mirror: Arc<dyn KvMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    fn shard_for(&self, key: &CacheKey) -> &Mutex<Shard> {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % SHARDS]
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the unexpired set under `key`, re-parsed from presentation
    /// form. A line that no longer parses is dropped, not the whole set.
    pub async fn get(&self, key: &CacheKey) -> Option<Vec<Record>> {
        let now = Instant::now();
        let lines = {
            let shard = self.shard_for(key).lock();
            let entry = shard.map.get(key)?;
            if entry.expires_at <= now {
                return None;
            }
            entry.stamp.store(self.tick(), Ordering::Relaxed);
            entry.lines.clone()
        };
        Some(reparse(&lines))
    }

    /// Like [`get`](Self::get) but consulting the mirror on a local miss.
    pub async fn get_or_mirror(&self, key: &CacheKey) -> Option<Vec<Record>> {
        if let Some(records) = self.get(key).await {
            return Some(records);
        }
        let mirror = self.mirror.as_ref()?;
        let bytes = mirror.get(&key.mirror_key()).await?;
        let lines: Vec<String> = serde_json::from_slice(&bytes)
            .map_err(|e| debug!(error = %e, "discarding undecodable mirrored entry"))
            .ok()?;
        let records = reparse(&lines);
        if records.is_empty() {
            return None;
        }
        trace!(key = %key.name(), "answer served from mirror");
        Some(records)
    }

    /// Inserts or replaces the set under `key`, expiring `ttl` from now.
    ///
    /// A zero TTL is stored already expired, so the next `get` reports it
    /// absent. Exceeding capacity evicts the shard's least recently used
    /// entry. Expired neighbors are reaped while the shard is held.
    pub async fn put(&self, key: CacheKey, records: &[Record], ttl: Duration) {
        let ttl = clamp_ttl(ttl);
        let lines: Vec<String> = records.iter().map(ToString::to_string).collect();
        let now = Instant::now();
        {
            let mut shard = self.shard_for(&key).lock();
            shard.map.retain(|_, e| e.expires_at > now);
            if !shard.map.contains_key(&key) && shard.map.len() >= self.per_shard_cap {
                if let Some(victim) = shard
                    .map
                    .iter()
                    .min_by_key(|(_, e)| e.stamp.load(Ordering::Relaxed))
                    .map(|(k, _)| k.clone())
                {
                    trace!(key = %victim.name(), "evicting least recently used entry");
                    shard.map.remove(&victim);
                }
            }
            shard.map.insert(
                key.clone(),
                Entry {
                    lines: lines.clone(),
                    expires_at: now + ttl,
                    stamp: AtomicU64::new(self.tick()),
                },
            );
        }

        if let Some(mirror) = &self.mirror {
            match serde_json::to_vec(&lines) {
                Ok(bytes) => mirror.set(&key.mirror_key(), bytes, ttl).await,
                Err(e) => warn!(error = %e, "failed to encode entry for mirror"),
            }
        }
    }

    /// Drops the entry under `key`.
    pub async fn invalidate(&self, key: &CacheKey) {
        self.shard_for(key).lock().map.remove(key);
        if let Some(mirror) = &self.mirror {
            mirror.delete(&key.mirror_key()).await;
        }
    }

    /// Number of live (possibly expired, not yet reaped) entries.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().map.len()).sum()
    }

    /// True when no entries are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn reparse(lines: &[String]) -> Vec<Record> {
    lines
        .iter()
        .filter_map(|line| match parse_record(line) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, line, "dropping unparsable cached record");
                None
            }
        })
        .collect()
}
