//! The question section.

use crate::error::{Result, WireError};
use crate::name::{Compressor, Name};
use crate::types::{RType, RecordClass, RecordType};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One query: name, type, class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Question {
    /// Queried name.
    pub qname: Name,
    /// Queried type.
    pub qtype: RType,
    /// Queried class.
    pub qclass: RecordClass,
}

impl Question {
    /// A question for a known type in class IN.
    pub fn new(qname: Name, qtype: RecordType) -> Self {
        Self {
            qname,
            qtype: RType::Known(qtype),
            qclass: RecordClass::In,
        }
    }

    /// Parses a question at `offset`; returns it with the bytes consumed.
    pub fn parse(message: &[u8], offset: usize) -> Result<(Self, usize)> {
        let (qname, name_len) = Name::parse(message, offset)?;
        let fixed = offset + name_len;
        let tail = message
            .get(fixed..fixed + 4)
            .ok_or_else(|| WireError::truncated(fixed, 4, message.len().saturating_sub(fixed)))?;
        Ok((
            Self {
                qname,
                qtype: RType::from_u16(u16::from_be_bytes([tail[0], tail[1]])),
                qclass: RecordClass::from_u16(u16::from_be_bytes([tail[2], tail[3]])),
            },
            name_len + 4,
        ))
    }

    /// Writes the question, compressing the name.
    pub fn write(&self, buf: &mut BytesMut, comp: &mut Compressor) {
        comp.write_name(&self.qname, buf);
        buf.extend_from_slice(&self.qtype.to_u16().to_be_bytes());
        buf.extend_from_slice(&self.qclass.to_u16().to_be_bytes());
    }

    /// Case-insensitive match against another question.
    pub fn matches(&self, other: &Question) -> bool {
        self.qname == other.qname && self.qtype == other.qtype && self.qclass == other.qclass
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.qname, self.qclass, self.qtype)
    }
}
