//! Record types, classes, opcodes and response codes.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Record types the resolver understands.
///
/// Anything else travels through the codec as [`RType::Other`] with opaque
/// RDATA; it is cached and echoed but never interpreted.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u16)]
pub enum RecordType {
    /// IPv4 address.
    A = 1,
    /// Authoritative name server.
    NS = 2,
    /// Canonical name.
    CNAME = 5,
    /// Start of authority.
    SOA = 6,
    /// Domain name pointer.
    PTR = 12,
    /// Mail exchange.
    MX = 15,
    /// Text strings.
    TXT = 16,
    /// IPv6 address.
    AAAA = 28,
    /// Service locator.
    SRV = 33,
    /// EDNS(0) pseudo-record.
    OPT = 41,
    /// Delegation signer.
    DS = 43,
    /// DNSSEC signature.
    RRSIG = 46,
    /// Next secure.
    NSEC = 47,
    /// DNS public key.
    DNSKEY = 48,
    /// Next secure, hashed.
    NSEC3 = 50,
    /// HTTPS service binding.
    HTTPS = 65,
    /// Any record type (query only).
    ANY = 255,
}

impl RecordType {
    /// Numeric type code.
    #[inline]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Looks up a known type by code.
    #[inline]
    pub fn from_u16(value: u16) -> Option<Self> {
        Self::try_from(value).ok()
    }

    /// Type mnemonic, as written in zone files.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::NS => "NS",
            Self::CNAME => "CNAME",
            Self::SOA => "SOA",
            Self::PTR => "PTR",
            Self::MX => "MX",
            Self::TXT => "TXT",
            Self::AAAA => "AAAA",
            Self::SRV => "SRV",
            Self::OPT => "OPT",
            Self::DS => "DS",
            Self::RRSIG => "RRSIG",
            Self::NSEC => "NSEC",
            Self::DNSKEY => "DNSKEY",
            Self::NSEC3 => "NSEC3",
            Self::HTTPS => "HTTPS",
            Self::ANY => "ANY",
        }
    }

    /// Reverse of [`mnemonic`](Self::mnemonic); also accepts `TYPE123`.
    pub fn from_mnemonic(s: &str) -> Option<Self> {
        let known = match s {
            "A" => Self::A,
            "NS" => Self::NS,
            "CNAME" => Self::CNAME,
            "SOA" => Self::SOA,
            "PTR" => Self::PTR,
            "MX" => Self::MX,
            "TXT" => Self::TXT,
            "AAAA" => Self::AAAA,
            "SRV" => Self::SRV,
            "OPT" => Self::OPT,
            "DS" => Self::DS,
            "RRSIG" => Self::RRSIG,
            "NSEC" => Self::NSEC,
            "DNSKEY" => Self::DNSKEY,
            "NSEC3" => Self::NSEC3,
            "HTTPS" => Self::HTTPS,
            "ANY" => Self::ANY,
            _ => {
                let code: u16 = s.strip_prefix("TYPE")?.parse().ok()?;
                return Self::from_u16(code);
            }
        };
        Some(known)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// A type code that may fall outside the known set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RType {
    /// A type the resolver interprets.
    Known(RecordType),
    /// Anything else, carried by code.
    Other(u16),
}

impl RType {
    /// Wraps a raw type code.
    #[inline]
    pub fn from_u16(value: u16) -> Self {
        RecordType::from_u16(value)
            .map(Self::Known)
            .unwrap_or(Self::Other(value))
    }

    /// Numeric type code.
    #[inline]
    pub const fn to_u16(self) -> u16 {
        match self {
            Self::Known(t) => t.to_u16(),
            Self::Other(v) => v,
        }
    }

    /// The known type, if any.
    #[inline]
    pub const fn known(self) -> Option<RecordType> {
        match self {
            Self::Known(t) => Some(t),
            Self::Other(_) => None,
        }
    }
}

impl From<RecordType> for RType {
    fn from(t: RecordType) -> Self {
        Self::Known(t)
    }
}

impl fmt::Display for RType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(t) => write!(f, "{t}"),
            Self::Other(v) => write!(f, "TYPE{v}"),
        }
    }
}

/// Record class. Only IN matters in practice; the rest are carried by code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordClass {
    /// Internet.
    In,
    /// Chaos.
    Ch,
    /// Hesiod.
    Hs,
    /// Any class (query only).
    Any,
    /// Unrecognized class code.
    Other(u16),
}

impl RecordClass {
    /// Wraps a raw class code.
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => Self::In,
            3 => Self::Ch,
            4 => Self::Hs,
            255 => Self::Any,
            other => Self::Other(other),
        }
    }

    /// Numeric class code.
    pub const fn to_u16(self) -> u16 {
        match self {
            Self::In => 1,
            Self::Ch => 3,
            Self::Hs => 4,
            Self::Any => 255,
            Self::Other(v) => v,
        }
    }
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::In => f.write_str("IN"),
            Self::Ch => f.write_str("CH"),
            Self::Hs => f.write_str("HS"),
            Self::Any => f.write_str("ANY"),
            Self::Other(v) => write!(f, "CLASS{v}"),
        }
    }
}

impl Default for RecordClass {
    fn default() -> Self {
        Self::In
    }
}

/// Header opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    /// Standard query.
    Query,
    /// Server status request.
    Status,
    /// Zone change notification.
    Notify,
    /// Dynamic update.
    Update,
    /// Unassigned opcode, carried by value.
    Other(u8),
}

impl Opcode {
    /// Wraps a raw 4-bit opcode.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Query,
            2 => Self::Status,
            4 => Self::Notify,
            5 => Self::Update,
            other => Self::Other(other & 0x0F),
        }
    }

    /// Numeric opcode.
    pub const fn to_u8(self) -> u8 {
        match self {
            Self::Query => 0,
            Self::Status => 2,
            Self::Notify => 4,
            Self::Update => 5,
            Self::Other(v) => v,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => f.write_str("QUERY"),
            Self::Status => f.write_str("STATUS"),
            Self::Notify => f.write_str("NOTIFY"),
            Self::Update => f.write_str("UPDATE"),
            Self::Other(v) => write!(f, "OPCODE{v}"),
        }
    }
}

impl Default for Opcode {
    fn default() -> Self {
        Self::Query
    }
}

/// Response code (the 4-bit header field; EDNS extension bits excluded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rcode {
    /// No error.
    NoError,
    /// The query was malformed.
    FormErr,
    /// The server failed to complete the request.
    ServFail,
    /// The name does not exist.
    NxDomain,
    /// The requested operation is not implemented.
    NotImp,
    /// The server refused to answer.
    Refused,
    /// Any other code.
    Other(u8),
}

impl Rcode {
    /// Wraps a raw 4-bit rcode.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NoError,
            1 => Self::FormErr,
            2 => Self::ServFail,
            3 => Self::NxDomain,
            4 => Self::NotImp,
            5 => Self::Refused,
            other => Self::Other(other & 0x0F),
        }
    }

    /// Numeric rcode.
    pub const fn to_u8(self) -> u8 {
        match self {
            Self::NoError => 0,
            Self::FormErr => 1,
            Self::ServFail => 2,
            Self::NxDomain => 3,
            Self::NotImp => 4,
            Self::Refused => 5,
            Self::Other(v) => v,
        }
    }

    /// True for NOERROR.
    pub fn is_no_error(self) -> bool {
        matches!(self, Self::NoError)
    }

    /// True for NXDOMAIN.
    pub fn is_nxdomain(self) -> bool {
        matches!(self, Self::NxDomain)
    }

    /// True for SERVFAIL.
    pub fn is_servfail(self) -> bool {
        matches!(self, Self::ServFail)
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoError => f.write_str("NOERROR"),
            Self::FormErr => f.write_str("FORMERR"),
            Self::ServFail => f.write_str("SERVFAIL"),
            Self::NxDomain => f.write_str("NXDOMAIN"),
            Self::NotImp => f.write_str("NOTIMP"),
            Self::Refused => f.write_str("REFUSED"),
            Self::Other(v) => write!(f, "RCODE{v}"),
        }
    }
}

impl Default for Rcode {
    fn default() -> Self {
        Self::NoError
    }
}
