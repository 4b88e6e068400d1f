//! Zone presentation format for single records.
//!
//! The cache stores record sets as one presentation line per record and
//! re-parses them on read; the trust-anchor loader reads DNSKEY lines from
//! disk. `Record`'s `Display` impl produces exactly the form parsed here,
//! so `parse_record(rr.to_string())` is the identity for every supported
//! type. Unknown types use the RFC 3597 `\# length hexdata` form.

use crate::error::{Result, WireError};
use crate::name::Name;
use crate::rdata::{Dnskey, Ds, Nsec, Nsec3, RData, Rrsig, Soa};
use crate::record::Record;
use crate::types::{RType, RecordClass, RecordType};
use data_encoding::{BASE32_NOPAD, BASE64, HEXLOWER, HEXUPPER};
use std::str::FromStr;

/// Parses one presentation line into a record.
///
/// Expected field order: `owner ttl class type rdata...`, whitespace
/// separated. Lines beginning with `;` are comments and yield an error;
/// callers filter them first.
pub fn parse_record(line: &str) -> Result<Record> {
    let mut fields = line.split_whitespace();
    let owner = fields
        .next()
        .ok_or_else(|| WireError::presentation("empty record line"))?;
    let name = Name::from_str(owner)?;

    let ttl: u32 = fields
        .next()
        .ok_or_else(|| WireError::presentation("missing ttl"))?
        .parse()
        .map_err(|_| WireError::presentation("ttl is not a number"))?;

    let class_field = fields
        .next()
        .ok_or_else(|| WireError::presentation("missing class"))?;
    let class = parse_class(class_field)?;

    let type_field = fields
        .next()
        .ok_or_else(|| WireError::presentation("missing type"))?;
    let rest: Vec<&str> = fields.collect();

    let (rtype, rdata) = parse_rdata(type_field, &rest)?;

    Ok(Record {
        name,
        rtype,
        class,
        ttl,
        rdata,
    })
}

fn parse_class(field: &str) -> Result<RecordClass> {
    match field {
        "IN" => Ok(RecordClass::In),
        "CH" => Ok(RecordClass::Ch),
        "HS" => Ok(RecordClass::Hs),
        "ANY" => Ok(RecordClass::Any),
        other => {
            let code = other
                .strip_prefix("CLASS")
                .and_then(|c| c.parse().ok())
                .ok_or_else(|| WireError::presentation(format!("bad class {other:?}")))?;
            Ok(RecordClass::from_u16(code))
        }
    }
}

fn parse_rdata(type_field: &str, rest: &[&str]) -> Result<(RType, RData)> {
    let need = |n: usize| -> Result<()> {
        if rest.len() < n {
            Err(WireError::presentation(format!(
                "{type_field} rdata needs {n} fields, got {}",
                rest.len()
            )))
        } else {
            Ok(())
        }
    };

    let rtype = match RecordType::from_mnemonic(type_field) {
        Some(t) => RType::Known(t),
        None => {
            let code: u16 = type_field
                .strip_prefix("TYPE")
                .and_then(|c| c.parse().ok())
                .ok_or_else(|| {
                    WireError::presentation(format!("unknown record type {type_field:?}"))
                })?;
            RType::from_u16(code)
        }
    };

    let rdata = match rtype.known() {
        Some(RecordType::A) => {
            need(1)?;
            RData::A(
                rest[0]
                    .parse()
                    .map_err(|_| WireError::presentation("bad IPv4 address"))?,
            )
        }
        Some(RecordType::AAAA) => {
            need(1)?;
            RData::Aaaa(
                rest[0]
                    .parse()
                    .map_err(|_| WireError::presentation("bad IPv6 address"))?,
            )
        }
        Some(RecordType::NS) => {
            need(1)?;
            RData::Ns(Name::from_str(rest[0])?)
        }
        Some(RecordType::CNAME) => {
            need(1)?;
            RData::Cname(Name::from_str(rest[0])?)
        }
        Some(RecordType::SOA) => {
            need(7)?;
            let num = |i: usize| -> Result<u32> {
                rest[i]
                    .parse()
                    .map_err(|_| WireError::presentation("bad SOA counter"))
            };
            RData::Soa(Soa {
                mname: Name::from_str(rest[0])?,
                rname: Name::from_str(rest[1])?,
                serial: num(2)?,
                refresh: num(3)?,
                retry: num(4)?,
                expire: num(5)?,
                minimum: num(6)?,
            })
        }
        Some(RecordType::DNSKEY) => {
            need(4)?;
            RData::Dnskey(Dnskey {
                flags: parse_num(rest[0], "DNSKEY flags")?,
                protocol: parse_num(rest[1], "DNSKEY protocol")?,
                algorithm: parse_num(rest[2], "DNSKEY algorithm")?,
                public_key: decode_base64(&rest[3..])?,
            })
        }
        Some(RecordType::DS) => {
            need(4)?;
            RData::Ds(Ds {
                key_tag: parse_num(rest[0], "DS key tag")?,
                algorithm: parse_num(rest[1], "DS algorithm")?,
                digest_type: parse_num(rest[2], "DS digest type")?,
                digest: decode_hex(&rest[3..].concat())?,
            })
        }
        Some(RecordType::RRSIG) => {
            need(9)?;
            let covered = RecordType::from_mnemonic(rest[0])
                .map(RecordType::to_u16)
                .or_else(|| rest[0].strip_prefix("TYPE").and_then(|c| c.parse().ok()))
                .ok_or_else(|| WireError::presentation("bad RRSIG covered type"))?;
            RData::Rrsig(Rrsig {
                type_covered: covered,
                algorithm: parse_num(rest[1], "RRSIG algorithm")?,
                labels: parse_num(rest[2], "RRSIG labels")?,
                original_ttl: parse_num(rest[3], "RRSIG original ttl")?,
                expiration: crate::rdata::parse_sig_time(rest[4])?,
                inception: crate::rdata::parse_sig_time(rest[5])?,
                key_tag: parse_num(rest[6], "RRSIG key tag")?,
                signer: Name::from_str(rest[7])?,
                signature: decode_base64(&rest[8..])?,
            })
        }
        Some(RecordType::NSEC) => {
            need(1)?;
            RData::Nsec(Nsec {
                next_name: Name::from_str(rest[0])?,
                type_bitmap: encode_types(&rest[1..])?,
            })
        }
        Some(RecordType::NSEC3) => {
            need(5)?;
            let salt = if rest[3] == "-" {
                Vec::new()
            } else {
                decode_hex(rest[3])?
            };
            RData::Nsec3(Nsec3 {
                hash_algorithm: parse_num(rest[0], "NSEC3 hash algorithm")?,
                flags: parse_num(rest[1], "NSEC3 flags")?,
                iterations: parse_num(rest[2], "NSEC3 iterations")?,
                salt,
                next_hashed: BASE32_NOPAD
                    .decode(rest[4].to_ascii_uppercase().as_bytes())
                    .map_err(|e| WireError::presentation(format!("bad NSEC3 hash: {e}")))?,
                type_bitmap: encode_types(&rest[5..])?,
            })
        }
        _ => {
            // RFC 3597 generic form, for Other and any type the resolver
            // does not interpret
            need(2)?;
            if rest[0] != "\\#" {
                return Err(WireError::presentation(
                    "uninterpreted type without generic \\# encoding",
                ));
            }
            let declared = parse_num::<u32>(rest[1], "generic rdata length")? as usize;
            let data = if rest.len() > 2 {
                decode_hex(&rest[2..].concat())?
            } else {
                Vec::new()
            };
            if data.len() != declared {
                return Err(WireError::presentation(format!(
                    "generic rdata declares {declared} bytes, carries {}",
                    data.len()
                )));
            }
            RData::Other(data)
        }
    };

    Ok((rtype, rdata))
}

fn parse_num<T: FromStr>(field: &str, what: &str) -> Result<T> {
    field
        .parse()
        .map_err(|_| WireError::presentation(format!("bad {what}: {field:?}")))
}

fn decode_base64(fields: &[&str]) -> Result<Vec<u8>> {
    BASE64
        .decode(fields.concat().as_bytes())
        .map_err(|e| WireError::presentation(format!("bad base64: {e}")))
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    HEXLOWER
        .decode(s.as_bytes())
        .or_else(|_| HEXUPPER.decode(s.as_bytes()))
        .map_err(|e| WireError::presentation(format!("bad hex: {e}")))
}

fn encode_types(fields: &[&str]) -> Result<Vec<u8>> {
    let mut codes = Vec::with_capacity(fields.len());
    for f in fields {
        let code = RecordType::from_mnemonic(f)
            .map(RecordType::to_u16)
            .or_else(|| f.strip_prefix("TYPE").and_then(|c| c.parse().ok()))
            .ok_or_else(|| WireError::presentation(format!("unknown type {f:?} in bitmap")))?;
        codes.push(code);
    }
    Ok(crate::rdata::encode_type_bitmap(codes))
}
