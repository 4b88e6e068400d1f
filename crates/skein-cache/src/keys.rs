//! The validated-DNSKEY cache, keyed by zone.
//!
//! The validator probes this before trying keys from the message and
//! fills it after a successful verification, using the key's own TTL.
//! Mirrored entries use the `{rr, cached_at, ttl}` JSON shape.

use crate::{clamp_ttl, mirror::KvMirror};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use skein_proto::presentation::parse_record;
use skein_proto::rdata::{Dnskey, RData};
use skein_proto::{Name, Record};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Mirror payload for one cached key.
#[derive(Debug, Serialize, Deserialize)]
struct MirroredKey {
    rr: String,
    cached_at: DateTime<Utc>,
    ttl: u32,
}

/// A validated key held by the cache.
#[derive(Debug, Clone)]
pub struct CachedKey {
    /// The DNSKEY record as received.
    pub record: Record,
    /// The key payload.
    pub key: Dnskey,
}

struct KeyEntry {
    line: String,
    expires_at: Instant,
}

/// Zone-keyed DNSKEY cache.
pub struct KeyCache {
    entries: Mutex<HashMap<Name, KeyEntry>>,
    mirror: Option<Arc<dyn KvMirror>>,
}

impl KeyCache {
    /// Creates an empty key cache.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            mirror: None,
        }
    }

    /// Attaches an external mirror.
    pub fn with_mirror(mut self, mirror: Arc<dyn KvMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    fn mirror_key(zone: &Name) -> String {
        format!("dnskey:{}", zone.to_lowercase())
    }

    /// Returns the unexpired key cached for `zone`, consulting the mirror
    /// on a local miss.
    pub async fn get(&self, zone: &Name) -> Option<CachedKey> {
        let zone = zone.to_lowercase();
        let line = {
            let entries = self.entries.lock();
            entries.get(&zone).and_then(|e| {
                (e.expires_at > Instant::now()).then(|| e.line.clone())
            })
        };
        if let Some(line) = line {
            return decode(&line);
        }

        let mirror = self.mirror.as_ref()?;
        let bytes = mirror.get(&Self::mirror_key(&zone)).await?;
        let mirrored: MirroredKey = serde_json::from_slice(&bytes)
            .map_err(|e| debug!(error = %e, "discarding undecodable mirrored DNSKEY"))
            .ok()?;
        let age = Utc::now()
            .signed_duration_since(mirrored.cached_at)
            .num_seconds();
        if age < 0 || age as u64 >= u64::from(mirrored.ttl) {
            return None;
        }
        trace!(zone = %zone, "DNSKEY served from mirror");
        decode(&mirrored.rr)
    }

    /// Caches `record` (which must be a DNSKEY) for `zone`, expiring after
    /// the key's own TTL.
    pub async fn put(&self, zone: &Name, record: &Record) {
        let RData::Dnskey(_) = record.rdata else {
            debug!(zone = %zone, "refusing to cache non-DNSKEY record");
            return;
        };
        let zone = zone.to_lowercase();
        let ttl = clamp_ttl(Duration::from_secs(u64::from(record.ttl)));
        let line = record.to_string();
        self.entries.lock().insert(
            zone.clone(),
            KeyEntry {
                line: line.clone(),
                expires_at: Instant::now() + ttl,
            },
        );

        if let Some(mirror) = &self.mirror {
            let payload = MirroredKey {
                rr: line,
                cached_at: Utc::now(),
                ttl: record.ttl,
            };
            if let Ok(bytes) = serde_json::to_vec(&payload) {
                mirror.set(&Self::mirror_key(&zone), bytes, ttl).await;
            }
        }
    }

    /// Drops the key cached for `zone`.
    pub async fn invalidate(&self, zone: &Name) {
        let zone = zone.to_lowercase();
        self.entries.lock().remove(&zone);
        if let Some(mirror) = &self.mirror {
            mirror.delete(&Self::mirror_key(&zone)).await;
        }
    }
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new()
    }
}

fn decode(line: &str) -> Option<CachedKey> {
    let record = parse_record(line)
        .map_err(|e| debug!(error = %e, "dropping unparsable cached DNSKEY"))
        .ok()?;
    match record.rdata.clone() {
        RData::Dnskey(key) => Some(CachedKey { record, key }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryKv;
    use skein_proto::RecordType;
    use std::str::FromStr;

    fn dnskey_record(zone: &str, ttl: u32) -> Record {
        Record::new(
            Name::from_str(zone).unwrap(),
            RecordType::DNSKEY,
            ttl,
            RData::Dnskey(Dnskey {
                flags: 257,
                protocol: 3,
                algorithm: 8,
                public_key: vec![3, 1, 0, 1],
            }),
        )
    }

    #[tokio::test]
    async fn put_then_get() {
        let cache = KeyCache::new();
        let zone = Name::from_str("example.com").unwrap();
        let record = dnskey_record("example.com", 3600);
        cache.put(&zone, &record).await;

        let cached = cache.get(&zone).await.unwrap();
        assert_eq!(cached.key.key_tag(),
            match &record.rdata { RData::Dnskey(k) => k.key_tag(), _ => unreachable!() });
    }

    #[tokio::test]
    async fn zone_lookup_is_case_insensitive() {
        let cache = KeyCache::new();
        cache
            .put(&Name::from_str("Example.COM").unwrap(), &dnskey_record("example.com", 3600))
            .await;
        assert!(cache.get(&Name::from_str("example.com").unwrap()).await.is_some());
    }

    #[tokio::test]
    async fn non_dnskey_refused() {
        let cache = KeyCache::new();
        let zone = Name::from_str("example.com").unwrap();
        let a = Record::a(zone.clone(), 300, std::net::Ipv4Addr::new(192, 0, 2, 1));
        cache.put(&zone, &a).await;
        assert!(cache.get(&zone).await.is_none());
    }

    #[tokio::test]
    async fn mirror_payload_shape() {
        let kv = Arc::new(MemoryKv::default());
        let cache = KeyCache::new().with_mirror(kv.clone());
        let zone = Name::from_str("example.com").unwrap();
        cache.put(&zone, &dnskey_record("example.com", 3600)).await;

        let raw = kv.get("dnskey:example.com.").await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert!(value.get("rr").is_some());
        assert!(value.get("cached_at").is_some());
        assert_eq!(value.get("ttl").unwrap().as_u64(), Some(3600));

        // a cold cache sharing the store picks the key up
        let cold = KeyCache::new().with_mirror(kv);
        assert!(cold.get(&zone).await.is_some());
    }
}
