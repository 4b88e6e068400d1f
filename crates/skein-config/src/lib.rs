//! # skein-config
//!
//! Startup configuration for the skein resolver: the root server list, the
//! pinned root trust anchor, and the runtime settings file. Every loader is
//! a constructor returning `Result` — nothing here exits the process; the
//! binary decides what a failed load means.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod anchor;
pub mod roots;
pub mod settings;

pub use anchor::load_trust_anchor;
pub use roots::{load_root_servers, RootServer};
pub use settings::Settings;

use thiserror::Error;

/// Result alias for configuration loading.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// A startup-time misconfiguration. Fatal to the process by policy, but
/// surfaced as a value so each loader stays testable in isolation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read at all.
    #[error("cannot read {path}: {source}")]
    Unreadable {
        /// Offending path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file was read but its content is unusable.
    #[error("invalid config in {path}: {reason}")]
    Invalid {
        /// Offending path.
        path: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(path: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}
