//! Single-name payloads (NS, CNAME).

use crate::error::{Result, WireError};
use crate::name::Name;

/// Parses a lone (possibly compressed) name that must fill `rdlength`.
pub(super) fn parse_name(
    message: &[u8],
    offset: usize,
    rdlength: usize,
    rtype: &'static str,
) -> Result<Name> {
    let (name, used) = Name::parse(message, offset)?;
    if used != rdlength {
        return Err(WireError::rdata(
            rtype,
            format!("name occupies {used} of {rdlength} rdata bytes"),
        ));
    }
    Ok(name)
}
