//! Typed record data.
//!
//! [`RData`] is a tagged enum over the record types the resolver interprets:
//! addresses, delegation and alias records, SOA, and the DNSSEC set. Every
//! other type is carried as [`RData::Other`] — opaque bytes that are cached
//! and echoed verbatim but never drive resolver or validator logic.

mod address;
mod dnssec;
mod host;
mod soa;

pub use dnssec::{Dnskey, Ds, Nsec, Nsec3, Rrsig};
pub use soa::Soa;

pub(crate) use dnssec::{encode_type_bitmap, parse_sig_time};

use crate::error::{Result, WireError};
use crate::name::Name;
use crate::types::{RType, RecordType};
use crate::wire::Cursor;
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Record data, dispatched by type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RData {
    /// IPv4 address.
    A(Ipv4Addr),
    /// IPv6 address.
    Aaaa(Ipv6Addr),
    /// Delegation target.
    Ns(Name),
    /// Alias target.
    Cname(Name),
    /// Zone authority parameters.
    Soa(Soa),
    /// Zone public key.
    Dnskey(Dnskey),
    /// Child-key digest in the parent.
    Ds(Ds),
    /// Signature over an RRset.
    Rrsig(Rrsig),
    /// Authenticated denial, plain.
    Nsec(Nsec),
    /// Authenticated denial, hashed.
    Nsec3(Nsec3),
    /// Any type the resolver does not interpret, kept verbatim.
    Other(Vec<u8>),
}

impl RData {
    /// Parses RDATA of type `rtype` occupying `rdlength` bytes at `offset`.
    ///
    /// The whole message is passed so that embedded names can follow
    /// compression pointers.
    pub fn parse(rtype: RType, message: &[u8], offset: usize, rdlength: usize) -> Result<Self> {
        let slice = message
            .get(offset..offset + rdlength)
            .ok_or_else(|| WireError::truncated(offset, rdlength, message.len().saturating_sub(offset)))?;

        let parsed = match rtype.known() {
            Some(RecordType::A) => Self::A(address::parse_v4(slice)?),
            Some(RecordType::AAAA) => Self::Aaaa(address::parse_v6(slice)?),
            Some(RecordType::NS) => Self::Ns(host::parse_name(message, offset, rdlength, "NS")?),
            Some(RecordType::CNAME) => {
                Self::Cname(host::parse_name(message, offset, rdlength, "CNAME")?)
            }
            Some(RecordType::SOA) => Self::Soa(Soa::parse(message, offset, rdlength)?),
            Some(RecordType::DNSKEY) => Self::Dnskey(Dnskey::parse(slice)?),
            Some(RecordType::DS) => Self::Ds(Ds::parse(slice)?),
            Some(RecordType::RRSIG) => Self::Rrsig(Rrsig::parse(message, offset, rdlength)?),
            Some(RecordType::NSEC) => Self::Nsec(Nsec::parse(message, offset, rdlength)?),
            Some(RecordType::NSEC3) => Self::Nsec3(Nsec3::parse(&mut Cursor::new(slice))?),
            _ => Self::Other(slice.to_vec()),
        };
        Ok(parsed)
    }

    /// Serialized (uncompressed) RDATA length.
    pub fn wire_len(&self) -> usize {
        match self {
            Self::A(_) => 4,
            Self::Aaaa(_) => 16,
            Self::Ns(n) | Self::Cname(n) => n.wire_len(),
            Self::Soa(r) => r.wire_len(),
            Self::Dnskey(r) => r.wire_len(),
            Self::Ds(r) => r.wire_len(),
            Self::Rrsig(r) => r.wire_len(),
            Self::Nsec(r) => r.wire_len(),
            Self::Nsec3(r) => r.wire_len(),
            Self::Other(d) => d.len(),
        }
    }

    /// Appends the RDATA in uncompressed wire form.
    pub fn write(&self, buf: &mut BytesMut) {
        match self {
            Self::A(a) => buf.extend_from_slice(&a.octets()),
            Self::Aaaa(a) => buf.extend_from_slice(&a.octets()),
            Self::Ns(n) | Self::Cname(n) => n.write_uncompressed(buf),
            Self::Soa(r) => r.write(buf),
            Self::Dnskey(r) => r.write(buf),
            Self::Ds(r) => r.write(buf),
            Self::Rrsig(r) => r.write(buf),
            Self::Nsec(r) => r.write(buf),
            Self::Nsec3(r) => r.write(buf),
            Self::Other(d) => buf.extend_from_slice(d),
        }
    }

    /// The IPv4 address, if this is an A record.
    pub fn as_a(&self) -> Option<Ipv4Addr> {
        match self {
            Self::A(a) => Some(*a),
            _ => None,
        }
    }

    /// The IPv6 address, if this is an AAAA record.
    pub fn as_aaaa(&self) -> Option<Ipv6Addr> {
        match self {
            Self::Aaaa(a) => Some(*a),
            _ => None,
        }
    }

    /// The alias target, if this is a CNAME record.
    pub fn as_cname(&self) -> Option<&Name> {
        match self {
            Self::Cname(n) => Some(n),
            _ => None,
        }
    }

    /// The delegation target, if this is an NS record.
    pub fn as_ns(&self) -> Option<&Name> {
        match self {
            Self::Ns(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for RData {
    /// Presentation form of the RDATA alone (no owner/TTL/class/type).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A(a) => write!(f, "{a}"),
            Self::Aaaa(a) => write!(f, "{a}"),
            Self::Ns(n) | Self::Cname(n) => write!(f, "{n}"),
            Self::Soa(r) => write!(f, "{r}"),
            Self::Dnskey(r) => write!(f, "{r}"),
            Self::Ds(r) => write!(f, "{r}"),
            Self::Rrsig(r) => write!(f, "{r}"),
            Self::Nsec(r) => write!(f, "{r}"),
            Self::Nsec3(r) => write!(f, "{r}"),
            // RFC 3597 generic encoding
            Self::Other(d) => {
                write!(f, "\\# {}", d.len())?;
                if !d.is_empty() {
                    write!(f, " {}", data_encoding::HEXLOWER.encode(d))?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn a_record_roundtrip() {
        let rdata = RData::A(Ipv4Addr::new(93, 184, 216, 34));
        let mut buf = BytesMut::new();
        rdata.write(&mut buf);
        let parsed = RData::parse(RType::Known(RecordType::A), &buf, 0, buf.len()).unwrap();
        assert_eq!(parsed, rdata);
        assert_eq!(parsed.as_a(), Some(Ipv4Addr::new(93, 184, 216, 34)));
    }

    #[test]
    fn a_record_wrong_length() {
        let buf = [1u8, 2, 3];
        assert!(RData::parse(RType::Known(RecordType::A), &buf, 0, 3).is_err());
    }

    #[test]
    fn unknown_type_is_opaque() {
        let payload = vec![0xAB, 0xCD];
        let parsed = RData::parse(RType::Other(4711), &payload, 0, 2).unwrap();
        assert_eq!(parsed, RData::Other(payload));
        assert_eq!(parsed.to_string(), "\\# 2 abcd");
    }

    #[test]
    fn ns_follows_compression() {
        // apex name at offset 0, NS rdata at 13 is a bare pointer to it
        let mut msg = Vec::new();
        msg.extend_from_slice(b"\x07example\x03com\x00");
        msg.extend_from_slice(&[0xC0, 0x00]);
        let parsed = RData::parse(RType::Known(RecordType::NS), &msg, 13, 2).unwrap();
        assert_eq!(
            parsed.as_ns(),
            Some(&Name::from_str("example.com").unwrap())
        );
    }
}
