//! # skein-resolver
//!
//! The iterative resolution engine. Walks the delegation chain from the
//! configured root servers, follows CNAMEs, resolves glue, validates key
//! sets when enforcement is on, coalesces identical in-flight queries and
//! feeds the shared answer cache.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod net;

pub use engine::{Engine, EngineConfig};

use async_trait::async_trait;
use skein_proto::{Name, Record, RecordType};
use std::time::Duration;
use thiserror::Error;

/// Result alias for resolution.
pub type Result<T> = std::result::Result<T, ResolveError>;

/// Why a resolution failed.
///
/// `Clone` because coalesced followers receive the leader's outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The query deadline passed.
    #[error("query deadline exhausted")]
    Timeout,

    /// An authority answered authoritatively that the name does not exist.
    #[error("name does not exist")]
    Nxdomain,

    /// An authority answered SERVFAIL, or every authority at some step was
    /// unusable.
    #[error("upstream failure")]
    ServFail,

    /// Enforcement is on and the chain of trust could not be established.
    #[error("DNSSEC validation failed")]
    ValidationFailed,

    /// A depth, CNAME or authority-fanout bound was exceeded.
    #[error("resolution bound exceeded: {0}")]
    LoopOrBound(&'static str),

    /// A response could not be decoded.
    #[error("malformed response: {0}")]
    WireMalformed(String),
}

/// A completed resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    /// The answer records, alias chain included.
    pub records: Vec<Record>,
    /// True only when the validator returned `Verified` for the final
    /// answer; drives the AD bit on responses.
    pub authenticated: bool,
}

/// Anything that can answer `(name, qtype)` questions. The transport
/// servers hold this, which keeps them testable without a network.
#[async_trait]
pub trait Resolve: Send + Sync {
    /// Resolves `name`/`qtype` to an answer set.
    async fn resolve(&self, name: &Name, qtype: RecordType) -> Result<Lookup>;
}

/// Hard bounds of a single resolution, per the engine's contract.
#[derive(Debug, Clone)]
pub struct Bounds {
    /// Maximum delegation depth.
    pub max_depth: usize,
    /// Maximum CNAME chain length.
    pub max_cnames: usize,
    /// Maximum authorities contacted per query.
    pub max_authorities: usize,
    /// Delegation depth available to nested glue lookups.
    pub glue_depth: usize,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            max_depth: 16,
            max_cnames: 8,
            max_authorities: 64,
            glue_depth: 4,
        }
    }
}

/// Engine timing knobs.
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// Whole-query deadline.
    pub deadline: Duration,
    /// Per-authority exchange timeout.
    pub hop: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(10),
            hop: Duration::from_secs(2),
        }
    }
}
