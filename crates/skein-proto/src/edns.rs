//! EDNS(0): the OPT pseudo-record (RFC 6891).
//!
//! The OPT record rides in the additional section and repurposes its class
//! field as the UDP payload size and its TTL as version/flags. Only version
//! 0 exists; options are kept as opaque code/data pairs.

use crate::error::{Result, WireError};
use crate::types::RecordType;
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::fmt;

/// DNSSEC-OK bit in the OPT TTL field.
const DO_BIT: u32 = 0x0000_8000;

/// EDNS parameters extracted from (or destined for) an OPT record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edns {
    /// Advertised maximum UDP payload.
    pub udp_size: u16,
    /// Upper 8 bits of the extended rcode.
    pub extended_rcode: u8,
    /// DNSSEC-OK flag.
    pub dnssec_ok: bool,
    /// Options, preserved but uninterpreted.
    pub options: Vec<(u16, Vec<u8>)>,
}

impl Edns {
    /// EDNS with the payload size the resolver advertises.
    pub fn new(udp_size: u16) -> Self {
        Self {
            udp_size,
            extended_rcode: 0,
            dnssec_ok: false,
            options: Vec::new(),
        }
    }

    /// EDNS with the DO bit set.
    pub fn with_dnssec_ok(udp_size: u16) -> Self {
        Self {
            dnssec_ok: true,
            ..Self::new(udp_size)
        }
    }

    /// Reconstructs EDNS from an OPT record's class, TTL and RDATA.
    pub fn from_opt(class: u16, ttl: u32, rdata: &[u8]) -> Result<Self> {
        let version = ((ttl >> 16) & 0xFF) as u8;
        if version != 0 {
            return Err(WireError::EdnsVersion(version));
        }
        let mut options = Vec::new();
        let mut pos = 0;
        while pos + 4 <= rdata.len() {
            let code = u16::from_be_bytes([rdata[pos], rdata[pos + 1]]);
            let len = u16::from_be_bytes([rdata[pos + 2], rdata[pos + 3]]) as usize;
            let data = rdata
                .get(pos + 4..pos + 4 + len)
                .ok_or_else(|| WireError::truncated(pos + 4, len, rdata.len() - pos - 4))?;
            options.push((code, data.to_vec()));
            pos += 4 + len;
        }
        if pos != rdata.len() {
            return Err(WireError::truncated(pos, 4, rdata.len() - pos));
        }
        Ok(Self {
            udp_size: class,
            extended_rcode: (ttl >> 24) as u8,
            dnssec_ok: ttl & DO_BIT != 0,
            options,
        })
    }

    /// Length of the OPT pseudo-record on the wire.
    pub fn wire_len(&self) -> usize {
        11 + self
            .options
            .iter()
            .map(|(_, data)| 4 + data.len())
            .sum::<usize>()
    }

    /// Appends the OPT pseudo-record.
    pub fn write(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(&[0]); // root owner
        buf.extend_from_slice(&RecordType::OPT.to_u16().to_be_bytes());
        buf.extend_from_slice(&self.udp_size.to_be_bytes());
        let mut ttl = u32::from(self.extended_rcode) << 24;
        if self.dnssec_ok {
            ttl |= DO_BIT;
        }
        buf.extend_from_slice(&ttl.to_be_bytes());
        let rdlen: usize = self.options.iter().map(|(_, d)| 4 + d.len()).sum();
        buf.extend_from_slice(&(rdlen as u16).to_be_bytes());
        for (code, data) in &self.options {
            buf.extend_from_slice(&code.to_be_bytes());
            buf.extend_from_slice(&(data.len() as u16).to_be_bytes());
            buf.extend_from_slice(data);
        }
    }
}

impl fmt::Display for Edns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "edns0 udp={}{}",
            self.udp_size,
            if self.dnssec_ok { " do" } else { "" }
        )
    }
}
