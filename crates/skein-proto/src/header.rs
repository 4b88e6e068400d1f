//! The fixed 12-byte message header.

use crate::error::{Result, WireError};
use crate::types::{Opcode, Rcode};
use bitflags::bitflags;
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Header size on the wire.
pub const HEADER_LEN: usize = 12;

bitflags! {
    /// Header flag bits (the non-opcode, non-rcode part of the flags word).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Flags: u16 {
        /// Response (vs. query).
        const QR = 0x8000;
        /// Authoritative answer.
        const AA = 0x0400;
        /// Truncated.
        const TC = 0x0200;
        /// Recursion desired.
        const RD = 0x0100;
        /// Recursion available.
        const RA = 0x0080;
        /// Authentic data (DNSSEC).
        const AD = 0x0020;
        /// Checking disabled (DNSSEC).
        const CD = 0x0010;
    }
}

/// Parsed message header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Transaction ID.
    pub id: u16,
    /// Flag bits.
    pub flags: Flags,
    /// Operation code.
    pub opcode: Opcode,
    /// Response code (header bits only).
    pub rcode: Rcode,
    /// Question count.
    pub qdcount: u16,
    /// Answer count.
    pub ancount: u16,
    /// Authority count.
    pub nscount: u16,
    /// Additional count.
    pub arcount: u16,
}

impl Header {
    /// An empty query header with a random transaction ID.
    pub fn query() -> Self {
        Self {
            id: rand::random(),
            flags: Flags::empty(),
            opcode: Opcode::Query,
            rcode: Rcode::NoError,
            qdcount: 0,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        }
    }

    /// A response header echoing `query`'s ID, opcode and RD bit.
    pub fn reply_to(query: &Header) -> Self {
        Self {
            id: query.id,
            flags: Flags::QR | (query.flags & Flags::RD),
            opcode: query.opcode,
            rcode: Rcode::NoError,
            qdcount: query.qdcount,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        }
    }

    /// True when the QR bit is clear.
    pub fn is_query(&self) -> bool {
        !self.flags.contains(Flags::QR)
    }

    /// True when the QR bit is set.
    pub fn is_response(&self) -> bool {
        self.flags.contains(Flags::QR)
    }

    /// Truncation bit.
    pub fn truncated(&self) -> bool {
        self.flags.contains(Flags::TC)
    }

    /// Authoritative-answer bit.
    pub fn authoritative(&self) -> bool {
        self.flags.contains(Flags::AA)
    }

    /// Authentic-data bit.
    pub fn authentic_data(&self) -> bool {
        self.flags.contains(Flags::AD)
    }

    /// Sets or clears a flag.
    pub fn set(&mut self, flag: Flags, on: bool) {
        self.flags.set(flag, on);
    }

    /// Parses a header from the front of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(WireError::truncated(0, HEADER_LEN, data.len()));
        }
        let word = |i: usize| u16::from_be_bytes([data[i], data[i + 1]]);
        let raw_flags = word(2);
        Ok(Self {
            id: word(0),
            flags: Flags::from_bits_truncate(raw_flags),
            opcode: Opcode::from_u8(((raw_flags >> 11) & 0x0F) as u8),
            rcode: Rcode::from_u8((raw_flags & 0x0F) as u8),
            qdcount: word(4),
            ancount: word(6),
            nscount: word(8),
            arcount: word(10),
        })
    }

    /// Appends the header to `buf`.
    pub fn write(&self, buf: &mut BytesMut) {
        let word = self.flags.bits()
            | (u16::from(self.opcode.to_u8()) << 11)
            | u16::from(self.rcode.to_u8());
        buf.extend_from_slice(&self.id.to_be_bytes());
        buf.extend_from_slice(&word.to_be_bytes());
        buf.extend_from_slice(&self.qdcount.to_be_bytes());
        buf.extend_from_slice(&self.ancount.to_be_bytes());
        buf.extend_from_slice(&self.nscount.to_be_bytes());
        buf.extend_from_slice(&self.arcount.to_be_bytes());
    }
}

impl Default for Header {
    fn default() -> Self {
        Self {
            id: 0,
            flags: Flags::empty(),
            opcode: Opcode::Query,
            rcode: Rcode::NoError,
            qdcount: 0,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id {:04x} {} {}", self.id, self.opcode, self.rcode)?;
        for (bit, tag) in [
            (Flags::QR, "qr"),
            (Flags::AA, "aa"),
            (Flags::TC, "tc"),
            (Flags::RD, "rd"),
            (Flags::RA, "ra"),
            (Flags::AD, "ad"),
            (Flags::CD, "cd"),
        ] {
            if self.flags.contains(bit) {
                write!(f, " {tag}")?;
            }
        }
        write!(
            f,
            " [{}/{}/{}/{}]",
            self.qdcount, self.ancount, self.nscount, self.arcount
        )
    }
}
