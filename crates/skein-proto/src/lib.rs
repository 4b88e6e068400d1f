//! # skein-proto
//!
//! DNS wire format for the skein resolver: message and record codecs per
//! RFC 1035, EDNS(0) per RFC 6891, and the DNSSEC record types needed for
//! validation (RFC 4034/5155). Also carries the zone presentation format
//! used by the cache and the trust-anchor loader.
//!
//! Parsing handles name compression (with pointer-loop detection); writing
//! compresses question and owner names through a per-message suffix table.
//! Record types the resolver does not interpret survive as opaque RDATA.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod edns;
pub mod error;
pub mod header;
pub mod message;
pub mod name;
pub mod presentation;
pub mod question;
pub mod rdata;
pub mod record;
pub mod types;
pub mod wire;

pub use edns::Edns;
pub use error::{Result, WireError};
pub use header::{Flags, Header};
pub use message::Message;
pub use name::Name;
pub use question::Question;
pub use rdata::RData;
pub use record::{Record, RecordSet};
pub use types::{Opcode, RType, Rcode, RecordClass, RecordType};

/// Maximum label length in bytes (RFC 1035).
pub const MAX_LABEL_LEN: usize = 63;

/// Maximum wire-format name length in bytes (RFC 1035).
pub const MAX_NAME_LEN: usize = 255;

/// Classic UDP message ceiling without EDNS (RFC 1035).
pub const MAX_PLAIN_UDP: usize = 512;

/// EDNS payload size the resolver advertises on outbound queries.
pub const EDNS_UDP_SIZE: u16 = 4096;

/// Port for plain DNS over UDP and TCP.
pub const DNS_PORT: u16 = 53;

/// Port for DNS over TLS and DNS over QUIC.
pub const TLS_PORT: u16 = 853;
