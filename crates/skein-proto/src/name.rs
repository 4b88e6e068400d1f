//! Domain names: storage, comparison, and wire codec.
//!
//! A [`Name`] is kept in uncompressed wire form (length-prefixed labels,
//! terminated by the root label). Comparison, hashing and ordering are
//! case-insensitive per RFC 1035; ordering follows the RFC 4034 canonical
//! rules so signed RRsets can be sorted directly.
//!
//! Wire parsing resolves compression pointers against the whole message;
//! pointers may only aim backwards and the jump count is bounded, so a
//! crafted pointer cycle fails fast instead of spinning. Writing goes
//! through [`Compressor`], which maintains a per-message suffix table.

use crate::error::{Result, WireError};
use crate::{MAX_LABEL_LEN, MAX_NAME_LEN};
use bytes::BytesMut;
use compact_str::CompactString;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Most names fit inline without touching the heap.
type NameBuf = SmallVec<[u8; 64]>;

/// Upper bound on compression-pointer jumps while decoding one name.
const MAX_JUMPS: usize = 64;

/// A fully-qualified DNS name.
#[derive(Clone)]
pub struct Name {
    /// Uncompressed wire form, always ending in the root label (a zero byte).
    wire: NameBuf,
}

impl Name {
    /// The root name `.`.
    pub fn root() -> Self {
        let mut wire = NameBuf::new();
        wire.push(0);
        Self { wire }
    }

    /// Decodes a possibly-compressed name at `offset` within `message`.
    ///
    /// Returns the name and the number of bytes the name occupies at the
    /// original position (a pointer counts as two bytes, whatever it
    /// expands to).
    pub fn parse(message: &[u8], offset: usize) -> Result<(Self, usize)> {
        let mut wire = NameBuf::new();
        let mut pos = offset;
        let mut jumped = false;
        let mut consumed = 0;
        let mut jumps = 0;

        loop {
            let len = *message
                .get(pos)
                .ok_or_else(|| WireError::truncated(pos, 1, 0))? as usize;

            if len & 0xC0 == 0xC0 {
                let low = *message
                    .get(pos + 1)
                    .ok_or_else(|| WireError::truncated(pos + 1, 1, 0))?;
                let target = ((len & 0x3F) << 8) | low as usize;
                if target >= pos {
                    return Err(WireError::BadPointer { at: pos, target });
                }
                if !jumped {
                    consumed = pos + 2 - offset;
                    jumped = true;
                }
                jumps += 1;
                if jumps > MAX_JUMPS {
                    return Err(WireError::PointerLoop(MAX_JUMPS));
                }
                pos = target;
                continue;
            }
            if len & 0xC0 != 0 {
                // 0x40/0x80 label types were never standardized
                return Err(WireError::presentation(format!(
                    "reserved label type 0x{len:02x}"
                )));
            }
            if len == 0 {
                wire.push(0);
                if !jumped {
                    consumed = pos + 1 - offset;
                }
                break;
            }
            if len > MAX_LABEL_LEN {
                return Err(WireError::LabelTooLong(len));
            }
            let label = message
                .get(pos + 1..pos + 1 + len)
                .ok_or_else(|| WireError::truncated(pos + 1, len, 0))?;
            if wire.len() + 1 + len + 1 > MAX_NAME_LEN {
                return Err(WireError::NameTooLong(wire.len() + 1 + len + 1));
            }
            wire.push(len as u8);
            wire.extend_from_slice(label);
            pos += 1 + len;
        }

        Ok((Self { wire }, consumed))
    }

    /// The uncompressed wire form, including the trailing root label.
    pub fn as_wire(&self) -> &[u8] {
        &self.wire
    }

    /// Wire length in bytes.
    pub fn wire_len(&self) -> usize {
        self.wire.len()
    }

    /// True for the root name.
    pub fn is_root(&self) -> bool {
        self.wire.len() == 1
    }

    /// Number of labels, not counting the root.
    pub fn label_count(&self) -> usize {
        self.labels().count()
    }

    /// Iterates the labels left to right, root label excluded.
    pub fn labels(&self) -> Labels<'_> {
        Labels {
            wire: &self.wire,
            pos: 0,
        }
    }

    /// The name with its leftmost label removed; `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let skip = 1 + self.wire[0] as usize;
        Some(Self {
            wire: NameBuf::from_slice(&self.wire[skip..]),
        })
    }

    /// True when `self` equals `zone` or sits underneath it.
    pub fn is_subdomain_of(&self, zone: &Name) -> bool {
        let mine: Vec<&[u8]> = self.labels().collect();
        let theirs: Vec<&[u8]> = zone.labels().collect();
        if mine.len() < theirs.len() {
            return false;
        }
        mine.iter()
            .rev()
            .zip(theirs.iter().rev())
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    /// An ASCII-lowercased copy; the canonical form for cache keys and
    /// DNSSEC signature data.
    #[must_use]
    pub fn to_lowercase(&self) -> Self {
        let mut wire = self.wire.clone();
        for b in wire.iter_mut() {
            b.make_ascii_lowercase();
        }
        Self { wire }
    }

    /// Appends the uncompressed wire form to `buf`.
    pub fn write_uncompressed(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(&self.wire);
    }
}

impl FromStr for Name {
    type Err = WireError;

    /// Parses dotted presentation form; a missing trailing dot is implied.
    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || s == "." {
            return Ok(Self::root());
        }
        let trimmed = s.strip_suffix('.').unwrap_or(s);
        let mut wire = NameBuf::new();
        for label in trimmed.split('.') {
            if label.is_empty() {
                return Err(WireError::presentation("empty label"));
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(WireError::LabelTooLong(label.len()));
            }
            for c in label.chars() {
                // wildcards and underscore-prefixed service labels are legal
                if !c.is_ascii_alphanumeric() && !matches!(c, '-' | '_' | '*') {
                    return Err(WireError::BadLabelChar(c));
                }
            }
            wire.push(label.len() as u8);
            wire.extend_from_slice(label.as_bytes());
        }
        wire.push(0);
        if wire.len() > MAX_NAME_LEN {
            return Err(WireError::NameTooLong(wire.len()));
        }
        Ok(Self { wire })
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        let mut out = CompactString::default();
        for label in self.labels() {
            for &b in label {
                out.push(b as char);
            }
            out.push('.');
        }
        f.write_str(&out)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({self})")
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.wire.len() == other.wire.len()
            && self
                .wire
                .iter()
                .zip(other.wire.iter())
                .all(|(a, b)| a.to_ascii_lowercase() == b.to_ascii_lowercase())
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for &b in self.wire.iter() {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    /// RFC 4034 §6.1 canonical ordering: compare label sequences right to
    /// left, each label as lowercase octets.
    fn cmp(&self, other: &Self) -> Ordering {
        let mine: Vec<&[u8]> = self.labels().collect();
        let theirs: Vec<&[u8]> = other.labels().collect();
        for (a, b) in mine.iter().rev().zip(theirs.iter().rev()) {
            let la = a.iter().map(u8::to_ascii_lowercase);
            let lb = b.iter().map(u8::to_ascii_lowercase);
            match la.cmp(lb) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        mine.len().cmp(&theirs.len())
    }
}

impl Default for Name {
    fn default() -> Self {
        Self::root()
    }
}

impl Serialize for Name {
    fn serialize<S: serde::Serializer>(&self, ser: S) -> std::result::Result<S::Ok, S::Error> {
        ser.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: serde::Deserializer<'de>>(de: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(de)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Iterator over a name's labels as raw byte slices.
pub struct Labels<'a> {
    wire: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Labels<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let len = *self.wire.get(self.pos)? as usize;
        if len == 0 {
            return None;
        }
        let label = &self.wire[self.pos + 1..self.pos + 1 + len];
        self.pos += 1 + len;
        Some(label)
    }
}

/// Per-message name compressor.
///
/// Records the buffer offset of every suffix it writes (keyed by the
/// lowercased suffix bytes) and emits a pointer when a later name shares
/// one. Offsets past the 14-bit pointer range are not recorded.
pub struct Compressor {
    table: HashMap<Vec<u8>, u16>,
}

impl Compressor {
    /// Creates an empty suffix table.
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Writes `name` to `buf`, compressing against earlier names.
    pub fn write_name(&mut self, name: &Name, buf: &mut BytesMut) {
        let wire = name.as_wire();
        let mut pos = 0;
        while wire[pos] != 0 {
            let suffix: Vec<u8> = wire[pos..].iter().map(u8::to_ascii_lowercase).collect();
            if let Some(&offset) = self.table.get(&suffix) {
                buf.extend_from_slice(&(0xC000 | offset).to_be_bytes());
                return;
            }
            let here = buf.len();
            if here <= 0x3FFF {
                self.table.insert(suffix, here as u16);
            }
            let len = wire[pos] as usize;
            buf.extend_from_slice(&wire[pos..pos + 1 + len]);
            pos += 1 + len;
        }
        buf.extend_from_slice(&[0]);
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_properties() {
        let root = Name::root();
        assert!(root.is_root());
        assert_eq!(root.label_count(), 0);
        assert_eq!(root.to_string(), ".");
        assert_eq!(root.wire_len(), 1);
    }

    #[test]
    fn from_str_roundtrip() {
        let name = Name::from_str("www.Example.COM.").unwrap();
        assert_eq!(name.label_count(), 3);
        assert_eq!(name.to_string(), "www.Example.COM.");
        assert_eq!(name, Name::from_str("WWW.example.com").unwrap());
    }

    #[test]
    fn lowercased_hash_matches() {
        use std::collections::hash_map::DefaultHasher;
        let upper = Name::from_str("EXAMPLE.COM").unwrap();
        let lower = Name::from_str("example.com").unwrap();
        let mut h1 = DefaultHasher::new();
        let mut h2 = DefaultHasher::new();
        upper.hash(&mut h1);
        lower.hash(&mut h2);
        assert_eq!(h1.finish(), h2.finish());
    }

    #[test]
    fn parent_walk() {
        let name = Name::from_str("a.b.example.com").unwrap();
        let parents: Vec<String> = std::iter::successors(name.parent(), Name::parent)
            .map(|n| n.to_string())
            .collect();
        assert_eq!(parents, vec!["b.example.com.", "example.com.", "com.", "."]);
    }

    #[test]
    fn subdomain_checks() {
        let zone = Name::from_str("example.com").unwrap();
        assert!(Name::from_str("ns1.EXAMPLE.com").unwrap().is_subdomain_of(&zone));
        assert!(zone.is_subdomain_of(&zone));
        assert!(!Name::from_str("example.org").unwrap().is_subdomain_of(&zone));
        assert!(!Name::from_str("com").unwrap().is_subdomain_of(&zone));
    }

    #[test]
    fn long_label_rejected() {
        let label = "x".repeat(64);
        assert!(matches!(
            Name::from_str(&label),
            Err(WireError::LabelTooLong(64))
        ));
    }

    #[test]
    fn parse_plain_name() {
        let wire = b"\x03www\x07example\x03com\x00";
        let (name, used) = Name::parse(wire, 0).unwrap();
        assert_eq!(name.to_string(), "www.example.com.");
        assert_eq!(used, wire.len());
    }

    #[test]
    fn parse_compressed_name() {
        // "example.com." at 0, "www.<ptr 0>" at 13
        let mut msg = Vec::new();
        msg.extend_from_slice(b"\x07example\x03com\x00");
        msg.extend_from_slice(b"\x03www\xC0\x00");
        let (name, used) = Name::parse(&msg, 13).unwrap();
        assert_eq!(name.to_string(), "www.example.com.");
        assert_eq!(used, 6);
    }

    #[test]
    fn pointer_cycle_rejected() {
        // pointer at offset 2 aiming at offset 0, which points forward again
        let msg = [0xC0u8, 0x02, 0xC0, 0x00];
        assert!(Name::parse(&msg, 0).is_err());
        assert!(Name::parse(&msg, 2).is_err());
    }

    #[test]
    fn self_pointer_rejected() {
        let msg = [0xC0u8, 0x00];
        assert!(matches!(
            Name::parse(&msg, 0),
            Err(WireError::BadPointer { at: 0, target: 0 })
        ));
    }

    #[test]
    fn canonical_order() {
        // RFC 4034 §6.1 example, sans escapes
        let sorted: Vec<Name> = [
            "example",
            "a.example",
            "yljkjljk.a.example",
            "Z.a.example",
            "zABC.a.EXAMPLE",
            "z.example",
            "*.z.example",
        ]
        .iter()
        .map(|s| Name::from_str(s).unwrap())
        .collect();
        let mut shuffled = sorted.clone();
        shuffled.reverse();
        shuffled.sort();
        assert_eq!(shuffled, sorted);
    }

    #[test]
    fn compressor_emits_pointer() {
        let mut buf = BytesMut::new();
        let mut comp = Compressor::new();
        let apex = Name::from_str("example.com").unwrap();
        let www = Name::from_str("www.example.com").unwrap();
        comp.write_name(&apex, &mut buf);
        let apex_len = buf.len();
        comp.write_name(&www, &mut buf);
        // second name: "www" label plus a two-byte pointer
        assert_eq!(buf.len(), apex_len + 4 + 2);
        let (parsed, _) = Name::parse(&buf, apex_len).unwrap();
        assert_eq!(parsed, www);
    }

    #[test]
    fn compressor_is_case_insensitive() {
        let mut buf = BytesMut::new();
        let mut comp = Compressor::new();
        comp.write_name(&Name::from_str("Example.COM").unwrap(), &mut buf);
        let first = buf.len();
        comp.write_name(&Name::from_str("mail.example.com").unwrap(), &mut buf);
        assert_eq!(buf.len(), first + 5 + 2);
    }
}
