//! SOA payload.

use crate::error::{Result, WireError};
use crate::name::Name;
use crate::wire::Cursor;
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Start-of-authority record data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Soa {
    /// Primary name server.
    pub mname: Name,
    /// Responsible mailbox, encoded as a name.
    pub rname: Name,
    /// Zone serial.
    pub serial: u32,
    /// Secondary refresh interval, seconds.
    pub refresh: u32,
    /// Retry interval, seconds.
    pub retry: u32,
    /// Expiry limit, seconds.
    pub expire: u32,
    /// Minimum / negative-caching TTL, seconds.
    pub minimum: u32,
}

impl Soa {
    /// Parses SOA RDATA occupying `rdlength` bytes at `offset`.
    pub fn parse(message: &[u8], offset: usize, rdlength: usize) -> Result<Self> {
        let (mname, m_len) = Name::parse(message, offset)?;
        let (rname, r_len) = Name::parse(message, offset + m_len)?;
        let fixed = offset + m_len + r_len;
        if m_len + r_len + 20 != rdlength {
            return Err(WireError::rdata(
                "SOA",
                format!("{} bytes of rdata, {} declared", m_len + r_len + 20, rdlength),
            ));
        }
        let mut cur = Cursor::at(message, fixed);
        Ok(Self {
            mname,
            rname,
            serial: cur.u32()?,
            refresh: cur.u32()?,
            retry: cur.u32()?,
            expire: cur.u32()?,
            minimum: cur.u32()?,
        })
    }

    /// Serialized length.
    pub fn wire_len(&self) -> usize {
        self.mname.wire_len() + self.rname.wire_len() + 20
    }

    /// Appends the RDATA in uncompressed form.
    pub fn write(&self, buf: &mut BytesMut) {
        self.mname.write_uncompressed(buf);
        self.rname.write_uncompressed(buf);
        for v in [self.serial, self.refresh, self.retry, self.expire, self.minimum] {
            buf.extend_from_slice(&v.to_be_bytes());
        }
    }
}

impl fmt::Display for Soa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {}",
            self.mname, self.rname, self.serial, self.refresh, self.retry, self.expire, self.minimum
        )
    }
}
