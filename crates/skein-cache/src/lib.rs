//! # skein-cache
//!
//! In-memory caches for the skein resolver: the shared answer cache keyed
//! by `(qname, qtype)` and the DNSKEY cache keyed by zone. Both store
//! records as presentation strings so stored state is transport-agnostic;
//! reads re-parse through the codec and drop individual lines that fail.
//!
//! Either cache can mirror writes to an external key-value store through
//! the narrow [`KvMirror`] trait; the resolver never talks to the store
//! directly.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod answers;
pub mod keys;
pub mod mirror;

pub use answers::{AnswerCache, CacheKey};
pub use keys::{CachedKey, KeyCache};
pub use mirror::{KvMirror, MemoryKv};

use std::time::Duration;

/// Hard ceiling on any cached TTL: seven days.
pub const MAX_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Clamps a TTL into the cacheable range.
pub(crate) fn clamp_ttl(ttl: Duration) -> Duration {
    ttl.min(MAX_TTL)
}
