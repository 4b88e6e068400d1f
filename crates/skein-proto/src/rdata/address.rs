//! A and AAAA payloads.

use crate::error::{Result, WireError};
use std::net::{Ipv4Addr, Ipv6Addr};

pub(super) fn parse_v4(slice: &[u8]) -> Result<Ipv4Addr> {
    let octets: [u8; 4] = slice
        .try_into()
        .map_err(|_| WireError::rdata("A", format!("rdlength {} != 4", slice.len())))?;
    Ok(Ipv4Addr::from(octets))
}

pub(super) fn parse_v6(slice: &[u8]) -> Result<Ipv6Addr> {
    let octets: [u8; 16] = slice
        .try_into()
        .map_err(|_| WireError::rdata("AAAA", format!("rdlength {} != 16", slice.len())))?;
    Ok(Ipv6Addr::from(octets))
}
