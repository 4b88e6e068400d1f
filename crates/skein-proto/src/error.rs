//! Codec error type.

use thiserror::Error;

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, WireError>;

/// A malformed or unserializable DNS message.
///
/// Every parse failure lands here; the resolver maps all of them to its
/// `WireMalformed` category and the servers answer FORMERR where a reply is
/// still possible.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Input ended before the structure it promised.
    #[error("truncated input: need {need} bytes at offset {at}, have {have}")]
    Truncated {
        /// Offset where reading failed.
        at: usize,
        /// Bytes required.
        need: usize,
        /// Bytes actually available.
        have: usize,
    },

    /// A label longer than 63 bytes.
    #[error("label of {0} bytes exceeds the 63-byte limit")]
    LabelTooLong(usize),

    /// A name longer than 255 bytes in wire form.
    #[error("name of {0} bytes exceeds the 255-byte limit")]
    NameTooLong(usize),

    /// A byte that is not valid inside a hostname label.
    #[error("invalid character {0:?} in label")]
    BadLabelChar(char),

    /// A compression pointer aimed at or past its own position.
    #[error("compression pointer at offset {at} targets {target}")]
    BadPointer {
        /// Offset of the pointer.
        at: usize,
        /// Offset it references.
        target: usize,
    },

    /// More pointer jumps than any legitimate message needs.
    #[error("compression pointer chain exceeds {0} jumps")]
    PointerLoop(usize),

    /// RDATA that does not fit its declared rdlength or type shape.
    #[error("bad {rtype} rdata: {detail}")]
    BadRData {
        /// Record type mnemonic.
        rtype: &'static str,
        /// What went wrong.
        detail: String,
    },

    /// An OPT pseudo-record with an EDNS version we do not speak.
    #[error("unsupported EDNS version {0}")]
    EdnsVersion(u8),

    /// More than one OPT record in a message.
    #[error("duplicate OPT record")]
    DuplicateOpt,

    /// A presentation-format line that does not parse.
    #[error("bad presentation data: {0}")]
    Presentation(String),
}

impl WireError {
    pub(crate) fn truncated(at: usize, need: usize, have: usize) -> Self {
        Self::Truncated { at, need, have }
    }

    pub(crate) fn rdata(rtype: &'static str, detail: impl Into<String>) -> Self {
        Self::BadRData {
            rtype,
            detail: detail.into(),
        }
    }

    pub(crate) fn presentation(detail: impl Into<String>) -> Self {
        Self::Presentation(detail.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_offsets() {
        let err = WireError::truncated(10, 4, 2);
        assert_eq!(err.to_string(), "truncated input: need 4 bytes at offset 10, have 2");
    }

    #[test]
    fn rdata_error_names_type() {
        let err = WireError::rdata("RRSIG", "signer name runs past rdlength");
        assert!(err.to_string().contains("RRSIG"));
    }
}
