//! # skein-dnssec
//!
//! Authenticates DNSKEY record sets against the pinned root trust anchor.
//!
//! Given a response carrying a DNSKEY RRset and an RRSIG covering it, the
//! validator matches signature key tags against the zone's cached key or
//! the keys in the message, verifies the signature cryptographically, and
//! reports one of four [`Verdict`]s. Whether a non-`Verified` verdict is
//! fatal is the enforcement flag's call: strict mode fails the resolution
//! step, lenient mode degrades to an unauthenticated answer with AD clear.
//!
//! Supported algorithms: RSA/SHA-256 (8), RSA/SHA-512 (10) via `ring`, and
//! ECDSA P-256/SHA-256 (13) via `p256`.

#![warn(missing_docs)]
#![warn(clippy::all)]

use bytes::BytesMut;
use skein_cache::KeyCache;
use skein_proto::rdata::{Dnskey, RData, Rrsig};
use skein_proto::{Message, Name, Record, RecordType};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Seconds of clock skew tolerated on signature validity windows.
const CLOCK_SKEW: u32 = 300;

/// Result alias for verification internals.
pub type Result<T> = std::result::Result<T, DnssecError>;

/// Why a single signature check failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnssecError {
    /// Signature algorithm outside the supported set.
    #[error("unsupported algorithm {0}")]
    UnsupportedAlgorithm(u8),

    /// Public key material that does not match its algorithm's encoding.
    #[error("malformed public key: {0}")]
    MalformedKey(String),

    /// The DNSKEY is not flagged as a zone key or has a bad protocol.
    #[error("not a usable zone key (flags {flags:#06x}, protocol {protocol})")]
    NotZoneKey {
        /// DNSKEY flags field.
        flags: u16,
        /// DNSKEY protocol field.
        protocol: u8,
    },

    /// Cryptographic verification failed.
    #[error("signature does not verify")]
    BadSignature,

    /// The signature's validity window has passed.
    #[error("signature expired at {expiration}, now {now}")]
    Expired {
        /// Expiration timestamp.
        expiration: u32,
        /// Current timestamp.
        now: u32,
    },

    /// The signature's validity window has not begun.
    #[error("signature not valid before {inception}, now {now}")]
    NotYetValid {
        /// Inception timestamp.
        inception: u32,
        /// Current timestamp.
        now: u32,
    },
}

/// Outcome of validating a key set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// A signature verified and the verifying key is the trust anchor.
    Verified,
    /// A signature verified but no key in the chain matches the anchor.
    Unchained,
    /// The message lacks the pieces validation needs (anchor, RRSIG or
    /// DNSKEYs).
    Insufficient,
    /// Candidate keys existed but none verified the signature.
    Failed,
}

impl Verdict {
    /// True only for [`Verdict::Verified`].
    pub fn is_verified(self) -> bool {
        matches!(self, Self::Verified)
    }
}

/// DNSKEY-set validator with a pinned root anchor.
pub struct Validator {
    anchor: Option<Dnskey>,
    keys: Arc<KeyCache>,
    enforce: AtomicBool,
}

impl Validator {
    /// Creates a validator. `anchor` is the pinned root DNSKEY; without
    /// one every validation is at best `Insufficient`.
    pub fn new(anchor: Option<Dnskey>, keys: Arc<KeyCache>, enforce: bool) -> Self {
        Self {
            anchor,
            keys,
            enforce: AtomicBool::new(enforce),
        }
    }

    /// Whether strict enforcement is on.
    pub fn enforcing(&self) -> bool {
        self.enforce.load(Ordering::Relaxed)
    }

    /// Flips strict enforcement at runtime.
    pub fn set_enforcing(&self, on: bool) {
        self.enforce.store(on, Ordering::Relaxed);
    }

    /// True when `verdict` lets the resolution step continue: anything
    /// passes with enforcement off, only `Verified` with it on.
    pub fn acceptable(&self, verdict: Verdict) -> bool {
        verdict.is_verified() || !self.enforcing()
    }

    /// Validates the DNSKEY set carried by `message`, keyed by the zone
    /// being asked about.
    pub async fn validate_keyset(&self, message: &Message, zone: &Name) -> Verdict {
        let mut dnskeys: Vec<&Record> = Vec::new();
        let mut covering_sig: Option<&Rrsig> = None;

        for record in message.answers.iter().chain(message.authority.iter()) {
            match &record.rdata {
                RData::Dnskey(_) => dnskeys.push(record),
                RData::Rrsig(sig) if sig.type_covered == RecordType::DNSKEY.to_u16() => {
                    covering_sig.get_or_insert(sig);
                }
                _ => {}
            }
        }

        let Some(anchor) = &self.anchor else {
            debug!("no trust anchor pinned, cannot validate");
            return Verdict::Insufficient;
        };
        let (Some(rrsig), false) = (covering_sig, dnskeys.is_empty()) else {
            debug!(
                zone = %zone,
                rrsig = covering_sig.is_some(),
                dnskeys = dnskeys.len(),
                "incomplete validation set"
            );
            return Verdict::Insufficient;
        };

        // cached key first: skips re-deriving trust within the key's TTL
        if let Some(cached) = self.keys.get(zone).await {
            if cached.key.key_tag() == rrsig.key_tag {
                match self.verify_signature(&dnskeys, rrsig, &cached.key) {
                    Ok(()) => {
                        trace!(zone = %zone, key_tag = rrsig.key_tag, "verified with cached key");
                        return Verdict::Verified;
                    }
                    Err(e) => debug!(zone = %zone, error = %e, "cached key did not verify"),
                }
            }
        }

        let mut verified_any = false;
        for record in &dnskeys {
            let RData::Dnskey(key) = &record.rdata else {
                continue;
            };
            if key.key_tag() != rrsig.key_tag {
                continue;
            }
            match self.verify_signature(&dnskeys, rrsig, key) {
                Ok(()) => {
                    trace!(key_tag = rrsig.key_tag, "RRSIG verified");
                    self.keys.put(zone, record).await;
                    if key.key_tag() == anchor.key_tag() && key.public_key == anchor.public_key {
                        return Verdict::Verified;
                    }
                    warn!(
                        key_tag = key.key_tag(),
                        anchor_tag = anchor.key_tag(),
                        "signature valid but key is not the trust anchor"
                    );
                    verified_any = true;
                }
                Err(e) => debug!(key_tag = rrsig.key_tag, error = %e, "candidate key rejected"),
            }
        }

        if verified_any {
            Verdict::Unchained
        } else {
            warn!(zone = %zone, "no trusted DNSKEY verified the RRSIG");
            Verdict::Failed
        }
    }

    /// Verifies `rrsig` over the DNSKEY records with `key`.
    fn verify_signature(&self, records: &[&Record], rrsig: &Rrsig, key: &Dnskey) -> Result<()> {
        if !key.is_zone_key() || key.protocol != 3 {
            return Err(DnssecError::NotZoneKey {
                flags: key.flags,
                protocol: key.protocol,
            });
        }

        let now = unix_now();
        if now > rrsig.expiration.saturating_add(CLOCK_SKEW) {
            return Err(DnssecError::Expired {
                expiration: rrsig.expiration,
                now,
            });
        }
        if now < rrsig.inception.saturating_sub(CLOCK_SKEW) {
            return Err(DnssecError::NotYetValid {
                inception: rrsig.inception,
                now,
            });
        }

        let signed = signed_data(records, rrsig);
        verify_with_algorithm(rrsig.algorithm, &key.public_key, &signed, &rrsig.signature)
    }
}

/// Current Unix time in seconds.
fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Builds the data an RRSIG signs (RFC 4034 §3.1.8.1): the RRSIG RDATA up
/// to the signature, then the covered RRset in canonical form and order.
pub fn signed_data(records: &[&Record], rrsig: &Rrsig) -> Vec<u8> {
    let mut data = BytesMut::new();
    rrsig.write_preamble(&mut data);

    let mut canonical: Vec<Vec<u8>> = records
        .iter()
        .map(|r| {
            let mut rr = BytesMut::new();
            r.name.to_lowercase().write_uncompressed(&mut rr);
            rr.extend_from_slice(&rrsig.type_covered.to_be_bytes());
            rr.extend_from_slice(&r.class.to_u16().to_be_bytes());
            rr.extend_from_slice(&rrsig.original_ttl.to_be_bytes());
            let rdata = canonical_rdata(&r.rdata);
            rr.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
            rr.extend_from_slice(&rdata);
            rr.to_vec()
        })
        .collect();
    canonical.sort();

    for rr in canonical {
        data.extend_from_slice(&rr);
    }
    data.to_vec()
}

/// RDATA in canonical form: embedded names lowercased (RFC 4034 §6.2).
fn canonical_rdata(rdata: &RData) -> Vec<u8> {
    let mut buf = BytesMut::new();
    match rdata {
        RData::Ns(n) => n.to_lowercase().write_uncompressed(&mut buf),
        RData::Cname(n) => n.to_lowercase().write_uncompressed(&mut buf),
        RData::Soa(soa) => {
            let mut canonical = soa.clone();
            canonical.mname = canonical.mname.to_lowercase();
            canonical.rname = canonical.rname.to_lowercase();
            canonical.write(&mut buf);
        }
        RData::Nsec(nsec) => {
            let mut canonical = nsec.clone();
            canonical.next_name = canonical.next_name.to_lowercase();
            canonical.write(&mut buf);
        }
        // Rrsig::write already lowercases the signer
        other => other.write(&mut buf),
    }
    buf.to_vec()
}

/// Dispatches signature verification on the DNSSEC algorithm number.
fn verify_with_algorithm(
    algorithm: u8,
    public_key: &[u8],
    data: &[u8],
    signature: &[u8],
) -> Result<()> {
    match algorithm {
        8 => verify_rsa(
            public_key,
            data,
            signature,
            &ring::signature::RSA_PKCS1_1024_8192_SHA256_FOR_LEGACY_USE_ONLY,
        ),
        10 => verify_rsa(
            public_key,
            data,
            signature,
            &ring::signature::RSA_PKCS1_1024_8192_SHA512_FOR_LEGACY_USE_ONLY,
        ),
        13 => verify_p256(public_key, data, signature),
        other => Err(DnssecError::UnsupportedAlgorithm(other)),
    }
}

/// RSA per RFC 3110: the DNSKEY public key is exponent-length (one byte,
/// or zero plus two bytes), exponent, modulus.
fn verify_rsa(
    public_key: &[u8],
    data: &[u8],
    signature: &[u8],
    params: &'static ring::signature::RsaParameters,
) -> Result<()> {
    let (exponent, modulus) = split_rsa_key(public_key)?;
    let der = rsa_public_key_der(modulus, exponent);
    ring::signature::UnparsedPublicKey::new(params, &der)
        .verify(data, signature)
        .map_err(|_| DnssecError::BadSignature)
}

fn split_rsa_key(public_key: &[u8]) -> Result<(&[u8], &[u8])> {
    let first = *public_key
        .first()
        .ok_or_else(|| DnssecError::MalformedKey("empty key".into()))?;
    let (exp_len, exp_at) = if first == 0 {
        if public_key.len() < 3 {
            return Err(DnssecError::MalformedKey("truncated exponent length".into()));
        }
        (
            u16::from_be_bytes([public_key[1], public_key[2]]) as usize,
            3,
        )
    } else {
        (first as usize, 1)
    };
    if public_key.len() <= exp_at + exp_len {
        return Err(DnssecError::MalformedKey("truncated exponent".into()));
    }
    Ok((
        &public_key[exp_at..exp_at + exp_len],
        &public_key[exp_at + exp_len..],
    ))
}

/// Minimal DER: `SEQUENCE { INTEGER modulus, INTEGER exponent }`, the
/// RSAPublicKey shape `ring` expects.
fn rsa_public_key_der(modulus: &[u8], exponent: &[u8]) -> Vec<u8> {
    fn der_len(len: usize, out: &mut Vec<u8>) {
        if len < 128 {
            out.push(len as u8);
        } else if len < 256 {
            out.extend_from_slice(&[0x81, len as u8]);
        } else {
            out.extend_from_slice(&[0x82, (len >> 8) as u8, len as u8]);
        }
    }
    fn der_integer(data: &[u8], out: &mut Vec<u8>) {
        out.push(0x02);
        let pad = data.first().is_some_and(|b| b & 0x80 != 0);
        der_len(data.len() + usize::from(pad), out);
        if pad {
            out.push(0);
        }
        out.extend_from_slice(data);
    }

    let mut body = Vec::with_capacity(modulus.len() + exponent.len() + 16);
    der_integer(modulus, &mut body);
    der_integer(exponent, &mut body);

    let mut der = vec![0x30];
    der_len(body.len(), &mut der);
    der.extend_from_slice(&body);
    der
}

/// ECDSA P-256: a 64-byte uncompressed point and a fixed 64-byte r||s
/// signature (RFC 6605).
fn verify_p256(public_key: &[u8], data: &[u8], signature: &[u8]) -> Result<()> {
    use p256::ecdsa::signature::Verifier;
    use p256::ecdsa::{Signature, VerifyingKey};

    if public_key.len() != 64 {
        return Err(DnssecError::MalformedKey(format!(
            "P-256 key must be 64 bytes, got {}",
            public_key.len()
        )));
    }
    let mut point = Vec::with_capacity(65);
    point.push(0x04);
    point.extend_from_slice(public_key);
    let key = VerifyingKey::from_sec1_bytes(&point)
        .map_err(|e| DnssecError::MalformedKey(e.to_string()))?;

    let sig = Signature::from_slice(signature).map_err(|_| DnssecError::BadSignature)?;
    key.verify(data, &sig).map_err(|_| DnssecError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_proto::Question;
    use std::str::FromStr;

    fn anchor_key() -> Dnskey {
        Dnskey {
            flags: 257,
            protocol: 3,
            algorithm: 8,
            public_key: vec![0x03, 0x01, 0x00, 0x01, 0xAA, 0xBB],
        }
    }

    fn keyset_message(zone: &str, key: &Dnskey, sig_tag: u16) -> Message {
        let name = Name::from_str(zone).unwrap();
        let query = Message::query(Question::new(name.clone(), RecordType::DNSKEY));
        let mut msg = Message::reply_to(&query);
        msg.push_answer(Record::new(
            name.clone(),
            RecordType::DNSKEY,
            3600,
            RData::Dnskey(key.clone()),
        ));
        msg.push_answer(Record::new(
            name,
            RecordType::RRSIG,
            3600,
            RData::Rrsig(Rrsig {
                type_covered: RecordType::DNSKEY.to_u16(),
                algorithm: key.algorithm,
                labels: 0,
                original_ttl: 3600,
                expiration: unix_now() + 3600,
                inception: unix_now().saturating_sub(3600),
                key_tag: sig_tag,
                signer: Name::root(),
                signature: vec![0u8; 64],
            }),
        ));
        msg
    }

    fn validator(anchor: Option<Dnskey>, enforce: bool) -> Validator {
        Validator::new(anchor, Arc::new(KeyCache::new()), enforce)
    }

    #[tokio::test]
    async fn missing_anchor_is_insufficient() {
        let key = anchor_key();
        let msg = keyset_message(".", &key, key.key_tag());
        let v = validator(None, true);
        let verdict = v.validate_keyset(&msg, &Name::root()).await;
        assert_eq!(verdict, Verdict::Insufficient);
        assert!(!v.acceptable(verdict));
    }

    #[tokio::test]
    async fn missing_rrsig_is_insufficient() {
        let key = anchor_key();
        let name = Name::root();
        let query = Message::query(Question::new(name.clone(), RecordType::DNSKEY));
        let mut msg = Message::reply_to(&query);
        msg.push_answer(Record::new(
            name.clone(),
            RecordType::DNSKEY,
            3600,
            RData::Dnskey(key.clone()),
        ));
        assert_eq!(
            validator(Some(key), true).validate_keyset(&msg, &name).await,
            Verdict::Insufficient
        );
    }

    #[tokio::test]
    async fn bogus_signature_fails() {
        // key tags match but the signature bytes are garbage
        let key = anchor_key();
        let msg = keyset_message(".", &key, key.key_tag());
        let verdict = validator(Some(key), true)
            .validate_keyset(&msg, &Name::root())
            .await;
        assert_eq!(verdict, Verdict::Failed);
    }

    #[tokio::test]
    async fn tag_mismatch_fails() {
        let key = anchor_key();
        let wrong_tag = key.key_tag().wrapping_add(1);
        let msg = keyset_message(".", &key, wrong_tag);
        let verdict = validator(Some(key), true)
            .validate_keyset(&msg, &Name::root())
            .await;
        assert_eq!(verdict, Verdict::Failed);
    }

    #[tokio::test]
    async fn lenient_mode_accepts_failure() {
        let key = anchor_key();
        let msg = keyset_message(".", &key, key.key_tag());
        let v = validator(Some(key), false);
        let verdict = v.validate_keyset(&msg, &Name::root()).await;
        assert!(!verdict.is_verified());
        assert!(v.acceptable(verdict));
    }

    #[tokio::test]
    async fn enforcement_toggle() {
        let v = validator(None, true);
        assert!(v.enforcing());
        v.set_enforcing(false);
        assert!(!v.enforcing());
        assert!(v.acceptable(Verdict::Failed));
    }

    #[test]
    fn unsupported_algorithm_rejected() {
        let err = verify_with_algorithm(5, &[1, 2, 3], b"data", &[0; 64]);
        assert_eq!(err, Err(DnssecError::UnsupportedAlgorithm(5)));
    }

    #[test]
    fn rsa_key_split() {
        // one-byte exponent length
        let key = [1u8, 0x03, 0xAA, 0xBB];
        let (e, n) = split_rsa_key(&key).unwrap();
        assert_eq!(e, &[0x03]);
        assert_eq!(n, &[0xAA, 0xBB]);

        // three-byte exponent length
        let mut long = vec![0u8, 0x01, 0x00];
        long.extend(std::iter::repeat(0x07).take(256));
        long.extend_from_slice(&[0xAA, 0xBB]);
        let (e, n) = split_rsa_key(&long).unwrap();
        assert_eq!(e.len(), 256);
        assert_eq!(n, &[0xAA, 0xBB]);

        assert!(split_rsa_key(&[]).is_err());
        assert!(split_rsa_key(&[5, 1, 2]).is_err());
    }

    #[test]
    fn der_integer_padding() {
        let der = rsa_public_key_der(&[0x80, 0x01], &[0x01, 0x00, 0x01]);
        // SEQUENCE, len, INTEGER(00 80 01), INTEGER(01 00 01)
        assert_eq!(
            der,
            vec![0x30, 0x0A, 0x02, 0x03, 0x00, 0x80, 0x01, 0x02, 0x03, 0x01, 0x00, 0x01]
        );
    }

    #[test]
    fn signed_data_sorts_canonically() {
        let name = Name::from_str("Example.COM").unwrap();
        let rrsig = Rrsig {
            type_covered: RecordType::DNSKEY.to_u16(),
            algorithm: 8,
            labels: 2,
            original_ttl: 300,
            expiration: 2,
            inception: 1,
            key_tag: 42,
            signer: Name::from_str("EXAMPLE.com").unwrap(),
            signature: vec![],
        };
        let key_a = Record::new(
            name.clone(),
            RecordType::DNSKEY,
            300,
            RData::Dnskey(Dnskey {
                flags: 256,
                protocol: 3,
                algorithm: 8,
                public_key: vec![0xFF],
            }),
        );
        let key_b = Record::new(
            name,
            RecordType::DNSKEY,
            300,
            RData::Dnskey(Dnskey {
                flags: 256,
                protocol: 3,
                algorithm: 8,
                public_key: vec![0x00],
            }),
        );
        // record order must not matter
        let one = signed_data(&[&key_a, &key_b], &rrsig);
        let two = signed_data(&[&key_b, &key_a], &rrsig);
        assert_eq!(one, two);
        // signer name is lowercased in the preamble
        let signer_wire = b"\x07example\x03com\x00";
        assert!(one.windows(signer_wire.len()).any(|w| w == signer_wire));
    }
}
