//! DNSSEC payloads: DNSKEY, DS, RRSIG, NSEC, NSEC3 (RFC 4034, RFC 5155).

use crate::error::{Result, WireError};
use crate::name::Name;
use crate::types::RecordType;
use crate::wire::Cursor;
use bytes::BytesMut;
use data_encoding::{BASE32_NOPAD, BASE64, HEXLOWER};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Zone public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dnskey {
    /// Key flags; bit 0x0100 marks a zone key, 0x0001 a secure entry point.
    pub flags: u16,
    /// Protocol field, fixed at 3.
    pub protocol: u8,
    /// Signing algorithm number.
    pub algorithm: u8,
    /// Public key material in the algorithm's DNSKEY encoding.
    pub public_key: Vec<u8>,
}

impl Dnskey {
    /// Zone-key flag bit.
    pub const ZONE_KEY: u16 = 0x0100;
    /// Secure-entry-point flag bit.
    pub const SEP: u16 = 0x0001;

    /// True when the zone-key bit is set.
    pub fn is_zone_key(&self) -> bool {
        self.flags & Self::ZONE_KEY != 0
    }

    /// True for a key-signing key.
    pub fn is_sep(&self) -> bool {
        self.flags & Self::SEP != 0
    }

    /// Key tag per RFC 4034 appendix B, computed over the RDATA.
    pub fn key_tag(&self) -> u16 {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        self.write(&mut buf);
        let mut acc: u32 = 0;
        for (i, &b) in buf.iter().enumerate() {
            acc += if i & 1 == 0 {
                u32::from(b) << 8
            } else {
                u32::from(b)
            };
        }
        acc += acc >> 16;
        (acc & 0xFFFF) as u16
    }

    /// Parses DNSKEY RDATA.
    pub fn parse(slice: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(slice);
        Ok(Self {
            flags: cur.u16()?,
            protocol: cur.u8()?,
            algorithm: cur.u8()?,
            public_key: cur.rest().to_vec(),
        })
    }

    /// Serialized length.
    pub fn wire_len(&self) -> usize {
        4 + self.public_key.len()
    }

    /// Appends the RDATA.
    pub fn write(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(&self.flags.to_be_bytes());
        buf.extend_from_slice(&[self.protocol, self.algorithm]);
        buf.extend_from_slice(&self.public_key);
    }
}

impl fmt::Display for Dnskey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.flags,
            self.protocol,
            self.algorithm,
            BASE64.encode(&self.public_key)
        )
    }
}

/// Delegation signer: digest of a child zone's KSK, published in the parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ds {
    /// Tag of the referenced key.
    pub key_tag: u16,
    /// Algorithm of the referenced key.
    pub algorithm: u8,
    /// Digest algorithm (1 SHA-1, 2 SHA-256, 4 SHA-384).
    pub digest_type: u8,
    /// Digest bytes.
    pub digest: Vec<u8>,
}

impl Ds {
    /// Parses DS RDATA.
    pub fn parse(slice: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(slice);
        Ok(Self {
            key_tag: cur.u16()?,
            algorithm: cur.u8()?,
            digest_type: cur.u8()?,
            digest: cur.rest().to_vec(),
        })
    }

    /// Serialized length.
    pub fn wire_len(&self) -> usize {
        4 + self.digest.len()
    }

    /// Appends the RDATA.
    pub fn write(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(&self.key_tag.to_be_bytes());
        buf.extend_from_slice(&[self.algorithm, self.digest_type]);
        buf.extend_from_slice(&self.digest);
    }
}

impl fmt::Display for Ds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.key_tag,
            self.algorithm,
            self.digest_type,
            HEXLOWER.encode(&self.digest)
        )
    }
}

/// Signature over one RRset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rrsig {
    /// Type code of the signed RRset.
    pub type_covered: u16,
    /// Signing algorithm number.
    pub algorithm: u8,
    /// Label count of the owner name, wildcards excluded.
    pub labels: u8,
    /// TTL of the RRset at signing time.
    pub original_ttl: u32,
    /// Expiration, seconds since the epoch.
    pub expiration: u32,
    /// Inception, seconds since the epoch.
    pub inception: u32,
    /// Tag of the signing key.
    pub key_tag: u16,
    /// Zone that produced the signature.
    pub signer: Name,
    /// Signature bytes.
    pub signature: Vec<u8>,
}

impl Rrsig {
    /// Parses RRSIG RDATA occupying `rdlength` bytes at `offset`.
    pub fn parse(message: &[u8], offset: usize, rdlength: usize) -> Result<Self> {
        let mut cur = Cursor::at(message, offset);
        let type_covered = cur.u16()?;
        let algorithm = cur.u8()?;
        let labels = cur.u8()?;
        let original_ttl = cur.u32()?;
        let expiration = cur.u32()?;
        let inception = cur.u32()?;
        let key_tag = cur.u16()?;
        let (signer, signer_len) = Name::parse(message, cur.pos())?;
        let sig_start = cur.pos() + signer_len;
        let sig_end = offset + rdlength;
        if sig_start > sig_end {
            return Err(WireError::rdata("RRSIG", "signer name runs past rdlength"));
        }
        let signature = message
            .get(sig_start..sig_end)
            .ok_or_else(|| WireError::truncated(sig_start, sig_end - sig_start, 0))?
            .to_vec();
        Ok(Self {
            type_covered,
            algorithm,
            labels,
            original_ttl,
            expiration,
            inception,
            key_tag,
            signer,
            signature,
        })
    }

    /// Serialized length.
    pub fn wire_len(&self) -> usize {
        18 + self.signer.wire_len() + self.signature.len()
    }

    /// Appends the RDATA (signer never compressed, per RFC 4034).
    pub fn write(&self, buf: &mut BytesMut) {
        self.write_preamble(buf);
        buf.extend_from_slice(&self.signature);
    }

    /// Writes everything up to (and excluding) the signature bytes; this is
    /// the prefix of the data the signature is computed over.
    pub fn write_preamble(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(&self.type_covered.to_be_bytes());
        buf.extend_from_slice(&[self.algorithm, self.labels]);
        buf.extend_from_slice(&self.original_ttl.to_be_bytes());
        buf.extend_from_slice(&self.expiration.to_be_bytes());
        buf.extend_from_slice(&self.inception.to_be_bytes());
        buf.extend_from_slice(&self.key_tag.to_be_bytes());
        self.signer.to_lowercase().write_uncompressed(buf);
    }
}

impl fmt::Display for Rrsig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let covered = RecordType::from_u16(self.type_covered)
            .map(|t| t.mnemonic().to_owned())
            .unwrap_or_else(|| format!("TYPE{}", self.type_covered));
        write!(
            f,
            "{} {} {} {} {} {} {} {} {}",
            covered,
            self.algorithm,
            self.labels,
            self.original_ttl,
            sig_time(self.expiration),
            sig_time(self.inception),
            self.key_tag,
            self.signer,
            BASE64.encode(&self.signature)
        )
    }
}

/// Formats an RRSIG timestamp as YYYYMMDDHHmmSS (RFC 4034 §3.2).
pub(crate) fn sig_time(secs: u32) -> String {
    chrono::DateTime::from_timestamp(i64::from(secs), 0)
        .map(|t| t.format("%Y%m%d%H%M%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

/// Parses an RRSIG timestamp: YYYYMMDDHHmmSS or plain seconds.
pub(crate) fn parse_sig_time(s: &str) -> Result<u32> {
    if s.len() == 14 && s.bytes().all(|b| b.is_ascii_digit()) {
        let t = chrono::NaiveDateTime::parse_from_str(s, "%Y%m%d%H%M%S")
            .map_err(|e| WireError::presentation(format!("bad signature time {s:?}: {e}")))?;
        return Ok(t.and_utc().timestamp() as u32);
    }
    s.parse()
        .map_err(|_| WireError::presentation(format!("bad signature time {s:?}")))
}

/// Plain authenticated denial.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Nsec {
    /// Next owner name in canonical zone order.
    pub next_name: Name,
    /// Type bitmap in wire encoding.
    pub type_bitmap: Vec<u8>,
}

impl Nsec {
    /// Parses NSEC RDATA occupying `rdlength` bytes at `offset`.
    pub fn parse(message: &[u8], offset: usize, rdlength: usize) -> Result<Self> {
        let (next_name, used) = Name::parse(message, offset)?;
        if used > rdlength {
            return Err(WireError::rdata("NSEC", "next name runs past rdlength"));
        }
        let bitmap = message
            .get(offset + used..offset + rdlength)
            .ok_or_else(|| WireError::truncated(offset + used, rdlength - used, 0))?;
        Ok(Self {
            next_name,
            type_bitmap: bitmap.to_vec(),
        })
    }

    /// Record types named in the bitmap.
    pub fn types(&self) -> Vec<u16> {
        decode_type_bitmap(&self.type_bitmap)
    }

    /// Serialized length.
    pub fn wire_len(&self) -> usize {
        self.next_name.wire_len() + self.type_bitmap.len()
    }

    /// Appends the RDATA.
    pub fn write(&self, buf: &mut BytesMut) {
        self.next_name.write_uncompressed(buf);
        buf.extend_from_slice(&self.type_bitmap);
    }
}

impl fmt::Display for Nsec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.next_name)?;
        for code in self.types() {
            match RecordType::from_u16(code) {
                Some(t) => write!(f, " {t}")?,
                None => write!(f, " TYPE{code}")?,
            }
        }
        Ok(())
    }
}

/// Hashed authenticated denial.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Nsec3 {
    /// Hash algorithm (1 = SHA-1).
    pub hash_algorithm: u8,
    /// Flags; bit 0x01 is opt-out.
    pub flags: u8,
    /// Extra hash iterations.
    pub iterations: u16,
    /// Hash salt.
    pub salt: Vec<u8>,
    /// Hash of the next owner name.
    pub next_hashed: Vec<u8>,
    /// Type bitmap in wire encoding.
    pub type_bitmap: Vec<u8>,
}

impl Nsec3 {
    /// Parses NSEC3 RDATA from a cursor over exactly the RDATA slice.
    pub fn parse(cur: &mut Cursor<'_>) -> Result<Self> {
        let hash_algorithm = cur.u8()?;
        let flags = cur.u8()?;
        let iterations = cur.u16()?;
        let salt_len = cur.u8()? as usize;
        let salt = cur.take(salt_len)?.to_vec();
        let hash_len = cur.u8()? as usize;
        let next_hashed = cur.take(hash_len)?.to_vec();
        let type_bitmap = cur.rest().to_vec();
        Ok(Self {
            hash_algorithm,
            flags,
            iterations,
            salt,
            next_hashed,
            type_bitmap,
        })
    }

    /// Record types named in the bitmap.
    pub fn types(&self) -> Vec<u16> {
        decode_type_bitmap(&self.type_bitmap)
    }

    /// Serialized length.
    pub fn wire_len(&self) -> usize {
        6 + self.salt.len() + self.next_hashed.len() + self.type_bitmap.len()
    }

    /// Appends the RDATA.
    pub fn write(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(&[self.hash_algorithm, self.flags]);
        buf.extend_from_slice(&self.iterations.to_be_bytes());
        buf.extend_from_slice(&[self.salt.len() as u8]);
        buf.extend_from_slice(&self.salt);
        buf.extend_from_slice(&[self.next_hashed.len() as u8]);
        buf.extend_from_slice(&self.next_hashed);
        buf.extend_from_slice(&self.type_bitmap);
    }
}

impl fmt::Display for Nsec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let salt = if self.salt.is_empty() {
            "-".to_owned()
        } else {
            HEXLOWER.encode(&self.salt)
        };
        write!(
            f,
            "{} {} {} {} {}",
            self.hash_algorithm,
            self.flags,
            self.iterations,
            salt,
            BASE32_NOPAD.encode(&self.next_hashed)
        )?;
        for code in self.types() {
            match RecordType::from_u16(code) {
                Some(t) => write!(f, " {t}")?,
                None => write!(f, " TYPE{code}")?,
            }
        }
        Ok(())
    }
}

/// Decodes an NSEC/NSEC3 windowed type bitmap into type codes.
fn decode_type_bitmap(bitmap: &[u8]) -> Vec<u16> {
    let mut types = Vec::new();
    let mut pos = 0;
    while pos + 2 <= bitmap.len() {
        let window = u16::from(bitmap[pos]);
        let len = bitmap[pos + 1] as usize;
        pos += 2;
        if pos + len > bitmap.len() {
            break;
        }
        for (byte_idx, &byte) in bitmap[pos..pos + len].iter().enumerate() {
            for bit in 0..8u16 {
                if byte & (0x80 >> bit) != 0 {
                    types.push(window * 256 + byte_idx as u16 * 8 + bit);
                }
            }
        }
        pos += len;
    }
    types
}

/// Encodes type codes into the windowed bitmap form.
pub(crate) fn encode_type_bitmap(mut types: Vec<u16>) -> Vec<u8> {
    types.sort_unstable();
    types.dedup();
    let mut out = Vec::new();
    let mut idx = 0;
    while idx < types.len() {
        let window = types[idx] / 256;
        let mut bytes = [0u8; 32];
        let mut max_byte = 0;
        while idx < types.len() && types[idx] / 256 == window {
            let low = types[idx] % 256;
            let byte = (low / 8) as usize;
            bytes[byte] |= 0x80 >> (low % 8);
            max_byte = max_byte.max(byte);
            idx += 1;
        }
        out.push(window as u8);
        out.push(max_byte as u8 + 1);
        out.extend_from_slice(&bytes[..=max_byte]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn dnskey_key_tag_stable() {
        let key = Dnskey {
            flags: 257,
            protocol: 3,
            algorithm: 8,
            public_key: vec![0x03, 0x01, 0x00, 0x01],
        };
        let tag = key.key_tag();
        assert_eq!(tag, key.key_tag());
        assert!(key.is_zone_key());
        assert!(key.is_sep());
    }

    #[test]
    fn dnskey_roundtrip() {
        let key = Dnskey {
            flags: 256,
            protocol: 3,
            algorithm: 13,
            public_key: vec![7; 64],
        };
        let mut buf = BytesMut::new();
        key.write(&mut buf);
        assert_eq!(Dnskey::parse(&buf).unwrap(), key);
    }

    #[test]
    fn ds_roundtrip() {
        let ds = Ds {
            key_tag: 20326,
            algorithm: 8,
            digest_type: 2,
            digest: vec![0xAA; 32],
        };
        let mut buf = BytesMut::new();
        ds.write(&mut buf);
        assert_eq!(Ds::parse(&buf).unwrap(), ds);
    }

    #[test]
    fn rrsig_roundtrip() {
        let sig = Rrsig {
            type_covered: RecordType::DNSKEY.to_u16(),
            algorithm: 8,
            labels: 0,
            original_ttl: 172800,
            expiration: 1_700_086_400,
            inception: 1_698_000_000,
            key_tag: 20326,
            signer: Name::root(),
            signature: vec![0x55; 256],
        };
        let mut buf = BytesMut::new();
        sig.write(&mut buf);
        assert_eq!(buf.len(), sig.wire_len());
        assert_eq!(Rrsig::parse(&buf, 0, buf.len()).unwrap(), sig);
    }

    #[test]
    fn sig_time_roundtrip() {
        let t = 1_700_086_400u32;
        let formatted = sig_time(t);
        assert_eq!(formatted.len(), 14);
        assert_eq!(parse_sig_time(&formatted).unwrap(), t);
        assert_eq!(parse_sig_time("1700086400").unwrap(), t);
    }

    #[test]
    fn type_bitmap_roundtrip() {
        let types = vec![
            RecordType::A.to_u16(),
            RecordType::NS.to_u16(),
            RecordType::SOA.to_u16(),
            RecordType::RRSIG.to_u16(),
            RecordType::HTTPS.to_u16(),
        ];
        let encoded = encode_type_bitmap(types.clone());
        assert_eq!(decode_type_bitmap(&encoded), types);
    }

    #[test]
    fn nsec_roundtrip() {
        let nsec = Nsec {
            next_name: Name::from_str("b.example.com").unwrap(),
            type_bitmap: encode_type_bitmap(vec![1, 2, 46]),
        };
        let mut buf = BytesMut::new();
        nsec.write(&mut buf);
        let parsed = Nsec::parse(&buf, 0, buf.len()).unwrap();
        assert_eq!(parsed, nsec);
        assert_eq!(parsed.types(), vec![1, 2, 46]);
    }

    #[test]
    fn nsec3_roundtrip() {
        let nsec3 = Nsec3 {
            hash_algorithm: 1,
            flags: 1,
            iterations: 10,
            salt: vec![0xCA, 0xFE],
            next_hashed: vec![0x11; 20],
            type_bitmap: encode_type_bitmap(vec![1, 28]),
        };
        let mut buf = BytesMut::new();
        nsec3.write(&mut buf);
        assert_eq!(Nsec3::parse(&mut Cursor::new(&buf)).unwrap(), nsec3);
    }
}
