//! Whole-message codec.

use crate::edns::Edns;
use crate::error::{Result, WireError};
use crate::header::{Flags, Header, HEADER_LEN};
use crate::name::Compressor;
use crate::question::Question;
use crate::record::{parse_section, Record};
use crate::types::{RType, Rcode, RecordType};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A DNS message: header, question, answer/authority/additional sections
/// and the EDNS parameters carried by the OPT pseudo-record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The header; section counts are refreshed on write.
    pub header: Header,
    /// Question section.
    pub questions: Vec<Question>,
    /// Answer section.
    pub answers: Vec<Record>,
    /// Authority section.
    pub authority: Vec<Record>,
    /// Additional section, OPT excluded.
    pub additional: Vec<Record>,
    /// EDNS parameters, when an OPT record was present or is wanted.
    pub edns: Option<Edns>,
}

impl Message {
    /// A query for `question` with a random ID and no EDNS.
    pub fn query(question: Question) -> Self {
        let mut header = Header::query();
        header.qdcount = 1;
        Self {
            header,
            questions: vec![question],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            edns: None,
        }
    }

    /// A response skeleton echoing `query`'s ID, question and EDNS presence.
    pub fn reply_to(query: &Message) -> Self {
        let edns = query
            .edns
            .as_ref()
            .map(|e| Edns::new(e.udp_size.max(512)));
        Self {
            header: Header::reply_to(&query.header),
            questions: query.questions.clone(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            edns,
        }
    }

    /// The first (and in practice only) question.
    pub fn question(&self) -> Option<&Question> {
        self.questions.first()
    }

    /// Transaction ID.
    pub fn id(&self) -> u16 {
        self.header.id
    }

    /// Response code.
    pub fn rcode(&self) -> Rcode {
        self.header.rcode
    }

    /// Sets the response code.
    pub fn set_rcode(&mut self, rcode: Rcode) {
        self.header.rcode = rcode;
    }

    /// True when the DO bit was set by the sender.
    pub fn dnssec_ok(&self) -> bool {
        self.edns.as_ref().is_some_and(|e| e.dnssec_ok)
    }

    /// NOERROR with an empty answer section.
    pub fn is_nodata(&self) -> bool {
        self.rcode().is_no_error() && self.answers.is_empty()
    }

    /// A referral: no answers, NS records in authority.
    pub fn is_referral(&self) -> bool {
        self.answers.is_empty()
            && self
                .authority
                .iter()
                .any(|r| r.is_type(RecordType::NS))
    }

    /// Adds an answer record.
    pub fn push_answer(&mut self, record: Record) {
        self.answers.push(record);
    }

    /// Parses a complete message.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = Header::parse(data)?;
        let mut offset = HEADER_LEN;

        let mut questions = Vec::with_capacity(header.qdcount as usize);
        for _ in 0..header.qdcount {
            let (q, used) = Question::parse(data, offset)?;
            offset += used;
            questions.push(q);
        }

        let (answers, offset) = parse_section(data, offset, header.ancount)?;
        let (authority, offset) = parse_section(data, offset, header.nscount)?;
        let (raw_additional, _) = parse_section(data, offset, header.arcount)?;

        let mut additional = Vec::with_capacity(raw_additional.len());
        let mut edns = None;
        for record in raw_additional {
            if record.rtype == RType::Known(RecordType::OPT) {
                if edns.is_some() {
                    return Err(WireError::DuplicateOpt);
                }
                let mut rdata = BytesMut::new();
                record.rdata.write(&mut rdata);
                edns = Some(Edns::from_opt(record.class.to_u16(), record.ttl, &rdata)?);
            } else {
                additional.push(record);
            }
        }

        Ok(Self {
            header,
            questions,
            answers,
            authority,
            additional,
            edns,
        })
    }

    /// Serializes the message with name compression, refreshing counts.
    pub fn to_wire(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        let mut comp = Compressor::new();

        let mut header = self.header.clone();
        header.qdcount = self.questions.len() as u16;
        header.ancount = self.answers.len() as u16;
        header.nscount = self.authority.len() as u16;
        header.arcount = self.additional.len() as u16 + u16::from(self.edns.is_some());
        header.write(&mut buf);

        for q in &self.questions {
            q.write(&mut buf, &mut comp);
        }
        for r in self
            .answers
            .iter()
            .chain(self.authority.iter())
            .chain(self.additional.iter())
        {
            r.write(&mut buf, &mut comp);
        }
        if let Some(edns) = &self.edns {
            edns.write(&mut buf);
        }
        buf.freeze()
    }

    /// Upper bound on the serialized size (compression only shrinks it).
    pub fn wire_len(&self) -> usize {
        HEADER_LEN
            + self
                .questions
                .iter()
                .map(|q| q.qname.wire_len() + 4)
                .sum::<usize>()
            + self
                .answers
                .iter()
                .chain(self.authority.iter())
                .chain(self.additional.iter())
                .map(Record::wire_len)
                .sum::<usize>()
            + self.edns.as_ref().map_or(0, Edns::wire_len)
    }

    /// Shrinks the message under `max` serialized bytes by dropping
    /// additional, then authority, then answer records, setting TC if
    /// anything had to go.
    pub fn truncate_to(&mut self, max: usize) {
        let mut dropped = false;
        while self.to_wire().len() > max {
            let removed = self
                .additional
                .pop()
                .or_else(|| self.authority.pop())
                .or_else(|| self.answers.pop());
            if removed.is_none() {
                break;
            }
            dropped = true;
        }
        if dropped {
            self.header.set(Flags::TC, true);
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, ";; {}", self.header)?;
        if let Some(edns) = &self.edns {
            writeln!(f, ";; {edns}")?;
        }
        for q in &self.questions {
            writeln!(f, ";{q}")?;
        }
        for (tag, section) in [
            ("answer", &self.answers),
            ("authority", &self.authority),
            ("additional", &self.additional),
        ] {
            for r in section.iter() {
                writeln!(f, "{r}\t; {tag}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    fn a_question(name: &str) -> Question {
        Question::new(Name::from_str(name).unwrap(), RecordType::A)
    }

    #[test]
    fn query_roundtrip() {
        let mut query = Message::query(a_question("example.com"));
        query.header.id = 0x1234;
        query.edns = Some(Edns::with_dnssec_ok(4096));

        let wire = query.to_wire();
        let parsed = Message::parse(&wire).unwrap();

        assert_eq!(parsed.id(), 0x1234);
        assert!(parsed.dnssec_ok());
        assert_eq!(parsed.questions, query.questions);
        // a reparse serializes to the same bytes
        assert_eq!(parsed.to_wire(), wire);
    }

    #[test]
    fn response_roundtrip_with_compression() {
        let query = Message::query(a_question("www.example.com"));
        let mut response = Message::reply_to(&query);
        let owner = Name::from_str("www.example.com").unwrap();
        response.push_answer(Record::a(owner.clone(), 300, Ipv4Addr::new(93, 184, 216, 34)));
        response.push_answer(Record::cname(
            owner,
            300,
            Name::from_str("example.com").unwrap(),
        ));

        let wire = response.to_wire();
        // compression must have saved something over the naive length
        assert!(wire.len() < response.wire_len());

        let parsed = Message::parse(&wire).unwrap();
        assert_eq!(parsed.answers, response.answers);
        assert_eq!(parsed.to_wire(), wire);
    }

    #[test]
    fn reply_echoes_question_and_id() {
        let query = Message::query(a_question("example.com"));
        let reply = Message::reply_to(&query);
        assert_eq!(reply.id(), query.id());
        assert!(reply.header.is_response());
        assert_eq!(reply.questions, query.questions);
    }

    #[test]
    fn duplicate_opt_rejected() {
        let mut query = Message::query(a_question("example.com"));
        query.edns = Some(Edns::new(4096));
        let mut wire = BytesMut::from(&query.to_wire()[..]);
        // append a second OPT and bump arcount
        Edns::new(512).write(&mut wire);
        wire[11] = 2;
        assert!(matches!(
            Message::parse(&wire),
            Err(WireError::DuplicateOpt)
        ));
    }

    #[test]
    fn referral_shape() {
        let query = Message::query(a_question("example.com"));
        let mut referral = Message::reply_to(&query);
        referral.authority.push(Record::ns(
            Name::from_str("com").unwrap(),
            172800,
            Name::from_str("a.gtld-servers.net").unwrap(),
        ));
        assert!(referral.is_referral());
        assert!(!referral.is_nodata() || referral.is_referral());
    }

    #[test]
    fn truncation_sets_tc() {
        let query = Message::query(a_question("example.com"));
        let mut response = Message::reply_to(&query);
        for i in 0..80 {
            response.push_answer(Record::a(
                Name::from_str(&format!("host{i}.example.com")).unwrap(),
                300,
                Ipv4Addr::new(192, 0, 2, i as u8),
            ));
        }
        response.truncate_to(512);
        assert!(response.to_wire().len() <= 512);
        assert!(response.header.truncated());
        assert!(response.answers.len() < 80);
    }
}
