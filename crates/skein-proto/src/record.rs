//! Resource records and RRsets.

use crate::error::{Result, WireError};
use crate::name::{Compressor, Name};
use crate::rdata::RData;
use crate::types::{RType, RecordClass, RecordType};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One resource record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    /// Owner name.
    pub name: Name,
    /// Type code.
    pub rtype: RType,
    /// Class code.
    pub class: RecordClass,
    /// Time to live, seconds.
    pub ttl: u32,
    /// Typed payload.
    pub rdata: RData,
}

impl Record {
    /// Builds a record in class IN.
    pub fn new(name: Name, rtype: RecordType, ttl: u32, rdata: RData) -> Self {
        Self {
            name,
            rtype: RType::Known(rtype),
            class: RecordClass::In,
            ttl,
            rdata,
        }
    }

    /// Shorthand for an A record.
    pub fn a(name: Name, ttl: u32, addr: std::net::Ipv4Addr) -> Self {
        Self::new(name, RecordType::A, ttl, RData::A(addr))
    }

    /// Shorthand for an AAAA record.
    pub fn aaaa(name: Name, ttl: u32, addr: std::net::Ipv6Addr) -> Self {
        Self::new(name, RecordType::AAAA, ttl, RData::Aaaa(addr))
    }

    /// Shorthand for an NS record.
    pub fn ns(name: Name, ttl: u32, target: Name) -> Self {
        Self::new(name, RecordType::NS, ttl, RData::Ns(target))
    }

    /// Shorthand for a CNAME record.
    pub fn cname(name: Name, ttl: u32, target: Name) -> Self {
        Self::new(name, RecordType::CNAME, ttl, RData::Cname(target))
    }

    /// The known record type, if any.
    pub fn record_type(&self) -> Option<RecordType> {
        self.rtype.known()
    }

    /// True when this record's type matches `t`.
    pub fn is_type(&self, t: RecordType) -> bool {
        self.rtype == RType::Known(t)
    }

    /// Parses a record at `offset`; returns it with the bytes consumed.
    pub fn parse(message: &[u8], offset: usize) -> Result<(Self, usize)> {
        let (name, name_len) = Name::parse(message, offset)?;
        let fixed = offset + name_len;
        let head = message
            .get(fixed..fixed + 10)
            .ok_or_else(|| WireError::truncated(fixed, 10, message.len().saturating_sub(fixed)))?;

        let rtype = RType::from_u16(u16::from_be_bytes([head[0], head[1]]));
        let class = RecordClass::from_u16(u16::from_be_bytes([head[2], head[3]]));
        let ttl = u32::from_be_bytes(head[4..8].try_into().unwrap());
        let rdlength = u16::from_be_bytes([head[8], head[9]]) as usize;

        let rdata_at = fixed + 10;
        if rdata_at + rdlength > message.len() {
            return Err(WireError::truncated(
                rdata_at,
                rdlength,
                message.len() - rdata_at,
            ));
        }
        let rdata = RData::parse(rtype, message, rdata_at, rdlength)?;

        Ok((
            Self {
                name,
                rtype,
                class,
                ttl,
                rdata,
            },
            name_len + 10 + rdlength,
        ))
    }

    /// Uncompressed wire length (an upper bound when written compressed).
    pub fn wire_len(&self) -> usize {
        self.name.wire_len() + 10 + self.rdata.wire_len()
    }

    /// Writes the record; the owner name is compressed, RDATA never is.
    pub fn write(&self, buf: &mut BytesMut, comp: &mut Compressor) {
        comp.write_name(&self.name, buf);
        self.write_tail(buf);
    }

    /// Writes the record with the owner name uncompressed.
    pub fn write_uncompressed(&self, buf: &mut BytesMut) {
        self.name.write_uncompressed(buf);
        self.write_tail(buf);
    }

    fn write_tail(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(&self.rtype.to_u16().to_be_bytes());
        buf.extend_from_slice(&self.class.to_u16().to_be_bytes());
        buf.extend_from_slice(&self.ttl.to_be_bytes());
        buf.extend_from_slice(&(self.rdata.wire_len() as u16).to_be_bytes());
        self.rdata.write(buf);
    }
}

impl fmt::Display for Record {
    /// Standard presentation form: `owner ttl class type rdata`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.name, self.ttl, self.class, self.rtype, self.rdata
        )
    }
}

/// Parses `count` records starting at `offset`.
///
/// Returns the records and the offset just past them.
pub fn parse_section(message: &[u8], mut offset: usize, count: u16) -> Result<(Vec<Record>, usize)> {
    let mut records = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (record, used) = Record::parse(message, offset)?;
        offset += used;
        records.push(record);
    }
    Ok((records, offset))
}

/// A set of records sharing owner, type and class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSet {
    records: Vec<Record>,
}

impl RecordSet {
    /// Groups `records` into one set; `None` when owners/types diverge or
    /// the input is empty.
    pub fn from_records(records: Vec<Record>) -> Option<Self> {
        let first = records.first()?;
        let (name, rtype, class) = (first.name.clone(), first.rtype, first.class);
        if records
            .iter()
            .any(|r| r.name != name || r.rtype != rtype || r.class != class)
        {
            return None;
        }
        Some(Self { records })
    }

    /// The records in the set.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Shared owner name.
    pub fn name(&self) -> &Name {
        &self.records[0].name
    }

    /// Shared type code.
    pub fn rtype(&self) -> RType {
        self.records[0].rtype
    }

    /// Smallest TTL across the set; this is the set's cache lifetime.
    pub fn min_ttl(&self) -> u32 {
        self.records.iter().map(|r| r.ttl).min().unwrap_or(0)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false; empty sets cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    #[test]
    fn record_roundtrip() {
        let rr = Record::a(
            Name::from_str("example.com").unwrap(),
            300,
            Ipv4Addr::new(93, 184, 216, 34),
        );
        let mut buf = BytesMut::new();
        rr.write_uncompressed(&mut buf);
        assert_eq!(buf.len(), rr.wire_len());

        let (parsed, used) = Record::parse(&buf, 0).unwrap();
        assert_eq!(used, buf.len());
        assert_eq!(parsed, rr);
    }

    #[test]
    fn rdlength_overrun_rejected() {
        let rr = Record::a(
            Name::from_str("example.com").unwrap(),
            60,
            Ipv4Addr::new(192, 0, 2, 1),
        );
        let mut buf = BytesMut::new();
        rr.write_uncompressed(&mut buf);
        // inflate the declared rdlength past the end of the buffer
        let rdlen_at = buf.len() - 4 - 2;
        buf[rdlen_at] = 0xFF;
        assert!(Record::parse(&buf, 0).is_err());
    }

    #[test]
    fn presentation_form() {
        let rr = Record::a(
            Name::from_str("example.com").unwrap(),
            300,
            Ipv4Addr::new(93, 184, 216, 34),
        );
        assert_eq!(rr.to_string(), "example.com.\t300\tIN\tA\t93.184.216.34");
    }

    #[test]
    fn record_set_min_ttl() {
        let name = Name::from_str("example.com").unwrap();
        let set = RecordSet::from_records(vec![
            Record::a(name.clone(), 300, Ipv4Addr::new(192, 0, 2, 1)),
            Record::a(name.clone(), 120, Ipv4Addr::new(192, 0, 2, 2)),
        ])
        .unwrap();
        assert_eq!(set.min_ttl(), 120);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn mixed_set_rejected() {
        let a = Record::a(
            Name::from_str("a.example.com").unwrap(),
            60,
            Ipv4Addr::new(192, 0, 2, 1),
        );
        let b = Record::a(
            Name::from_str("b.example.com").unwrap(),
            60,
            Ipv4Addr::new(192, 0, 2, 2),
        );
        assert!(RecordSet::from_records(vec![a, b]).is_none());
    }

    #[test]
    fn section_parse_consumes_all() {
        let name = Name::from_str("example.com").unwrap();
        let mut buf = BytesMut::new();
        Record::a(name.clone(), 60, Ipv4Addr::new(192, 0, 2, 1)).write_uncompressed(&mut buf);
        Record::ns(name.clone(), 60, Name::from_str("ns1.example.com").unwrap())
            .write_uncompressed(&mut buf);

        let (records, end) = parse_section(&buf, 0, 2).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(end, buf.len());
    }
}
