//! Runtime settings: a flat `key = value` file.
//!
//! Recognized keys:
//!
//! | key | meaning |
//! |---|---|
//! | `listen.udp` / `listen.tcp` | socket addresses for plain DNS |
//! | `listen.tls` / `listen.quic` | socket addresses for DoT / DoQ |
//! | `tls.cert` / `tls.key` | PEM certificate chain and private key |
//! | `cache.max_entries` | answer cache capacity |
//! | `cache.default_ttl_seconds` | TTL for mirror entries lacking one |
//! | `dnssec.enforce` | strict validation on/off |
//! | `resolver.deadline_ms` | whole-query deadline |
//! | `resolver.hop_timeout_ms` | per-authority exchange timeout |
//!
//! Unknown keys are logged and skipped; a value that fails to parse is a
//! configuration error.

use crate::{ConfigError, Result};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Parsed runtime settings with defaults applied.
#[derive(Debug, Clone)]
pub struct Settings {
    /// UDP listener address.
    pub listen_udp: Option<SocketAddr>,
    /// TCP listener address.
    pub listen_tcp: Option<SocketAddr>,
    /// DoT listener address.
    pub listen_tls: Option<SocketAddr>,
    /// DoQ listener address.
    pub listen_quic: Option<SocketAddr>,
    /// PEM certificate chain for DoT/DoQ.
    pub tls_cert: Option<PathBuf>,
    /// PEM private key for DoT/DoQ.
    pub tls_key: Option<PathBuf>,
    /// Answer cache capacity.
    pub cache_max_entries: usize,
    /// Fallback TTL for mirrored entries.
    pub cache_default_ttl: Duration,
    /// Strict DNSSEC validation.
    pub dnssec_enforce: bool,
    /// Whole-query deadline.
    pub resolver_deadline: Duration,
    /// Per-hop timeout.
    pub hop_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_udp: Some(SocketAddr::from(([0, 0, 0, 0], 53))),
            listen_tcp: None,
            listen_tls: None,
            listen_quic: None,
            tls_cert: None,
            tls_key: None,
            cache_max_entries: 10_000,
            cache_default_ttl: Duration::from_secs(300),
            dnssec_enforce: true,
            resolver_deadline: Duration::from_millis(10_000),
            hop_timeout: Duration::from_millis(2_000),
        }
    }
}

impl Settings {
    /// Loads settings from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let shown = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: shown.clone(),
            source,
        })?;
        Self::parse(&text, &shown)
    }

    /// Parses settings text.
    pub fn parse(text: &str, path: &str) -> Result<Self> {
        let mut settings = Self::default();
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::invalid(path, format!("not a key = value line: {line:?}")));
            };
            let key = key.trim();
            let value = value.trim();
            let bad = |what: &str| ConfigError::invalid(path, format!("bad {what}: {value:?}"));

            match key {
                "listen.udp" => settings.listen_udp = Some(value.parse().map_err(|_| bad(key))?),
                "listen.tcp" => settings.listen_tcp = Some(value.parse().map_err(|_| bad(key))?),
                "listen.tls" => settings.listen_tls = Some(value.parse().map_err(|_| bad(key))?),
                "listen.quic" => settings.listen_quic = Some(value.parse().map_err(|_| bad(key))?),
                "tls.cert" => settings.tls_cert = Some(PathBuf::from(value)),
                "tls.key" => settings.tls_key = Some(PathBuf::from(value)),
                "cache.max_entries" => {
                    settings.cache_max_entries = value.parse().map_err(|_| bad(key))?
                }
                "cache.default_ttl_seconds" => {
                    settings.cache_default_ttl =
                        Duration::from_secs(value.parse().map_err(|_| bad(key))?)
                }
                "dnssec.enforce" => {
                    settings.dnssec_enforce = match value {
                        "true" | "yes" | "on" | "1" => true,
                        "false" | "no" | "off" | "0" => false,
                        _ => return Err(bad(key)),
                    }
                }
                "resolver.deadline_ms" => {
                    settings.resolver_deadline =
                        Duration::from_millis(value.parse().map_err(|_| bad(key))?)
                }
                "resolver.hop_timeout_ms" => {
                    settings.hop_timeout =
                        Duration::from_millis(value.parse().map_err(|_| bad(key))?)
                }
                other => warn!(key = other, "ignoring unknown settings key"),
            }
        }

        if settings.listen_tls.is_some() || settings.listen_quic.is_some() {
            if settings.tls_cert.is_none() || settings.tls_key.is_none() {
                return Err(ConfigError::invalid(
                    path,
                    "listen.tls/listen.quic require tls.cert and tls.key",
                ));
            }
        }
        Ok(settings)
    }
}
