//! Root trust anchor loader.
//!
//! Reads a DNS presentation file (the shape IANA publishes root keys in)
//! and keeps the first DNSKEY whose owner is the root. Everything else —
//! comments, other owners, other types, unparsable lines — is skipped.

use crate::{ConfigError, Result};
use skein_proto::presentation::parse_record;
use skein_proto::rdata::{Dnskey, RData};
use skein_proto::Record;
use std::path::Path;
use tracing::{debug, warn};

/// The pinned root key: the DNSKEY record retained from the anchor file.
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    /// The full record, owner `.`.
    pub record: Record,
    /// The DNSKEY payload.
    pub key: Dnskey,
}

impl TrustAnchor {
    /// Key tag of the pinned key.
    pub fn key_tag(&self) -> u16 {
        self.key.key_tag()
    }
}

/// Loads the trust anchor from `path`.
pub fn load_trust_anchor(path: &Path) -> Result<TrustAnchor> {
    let shown = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: shown.clone(),
        source,
    })?;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        let record = match parse_record(line) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "skipping unparsable anchor line");
                continue;
            }
        };
        if !record.name.is_root() {
            continue;
        }
        if let RData::Dnskey(key) = record.rdata.clone() {
            debug!(key_tag = key.key_tag(), algorithm = key.algorithm, "loaded root trust anchor");
            return Ok(TrustAnchor { record, key });
        }
    }

    Err(ConfigError::invalid(
        &shown,
        "no DNSKEY record with owner \".\" found",
    ))
}
