//! Protocol-level error types for framing, parsing, and building.
//!
//! Framing and parsing failures are never fatal to a session — only to the
//! connection they arrived on (see the engine/session boundary in
//! `fix-core`/`fix-engine`). This enum exists so callers can tell the
//! difference between "need more bytes" (not an error, handled separately)
//! and a genuinely malformed frame.

use thiserror::Error;

/// Errors raised while scanning, parsing, or building protocol messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
    /// Accumulation buffer does not yet contain a complete frame header.
    #[error("frame too short: need at least {needed} bytes, have {have}")]
    FrameTooShort {
        /// Minimum bytes required to parse the header.
        needed: usize,
        /// Bytes currently buffered.
        have: usize,
    },

    /// No `8=FIX` prefix found, or the header fields are not well-formed.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The `10=` checksum tag did not begin at the position implied by
    /// `BodyLength`.
    #[error("misaligned checksum: expected `10=` at offset {expected_offset}")]
    MisalignedChecksum {
        /// Offset at which `10=` was expected.
        expected_offset: usize,
    },

    /// The three bytes following `10=` were not ASCII digits.
    #[error("malformed checksum field: {0:?} is not three decimal digits")]
    MalformedChecksum([u8; 3]),

    /// The computed checksum did not match the value on the wire.
    #[error("checksum mismatch: computed {computed:03}, found {found:03}")]
    ChecksumMismatch {
        /// Checksum computed from frame bytes.
        computed: u8,
        /// Checksum found in the `10=` field.
        found: u8,
    },

    /// `setField` was called twice for the same tag within one build.
    #[error("duplicate tag {0} in outgoing build")]
    DuplicateTag(u32),

    /// A tag was referenced that the dictionary does not define.
    #[error("unknown tag {0}")]
    UnknownTag(u32),

    /// A field value fell outside the accepted numeric range.
    #[error("field {tag} out of range: {value}")]
    FieldOutOfRange {
        /// Tag whose value is out of range.
        tag: u32,
        /// Offending value, rendered for diagnostics.
        value: String,
    },

    /// A binary (OUCH/SBE) message was shorter than its declared length.
    #[error("payload too short: need {needed} bytes, have {have}")]
    PayloadTooShort {
        /// Bytes required by the message layout.
        needed: usize,
        /// Bytes actually available.
        have: usize,
    },

    /// The one-byte OUCH type code or FIX `MsgType` was not recognized.
    #[error("unknown message type {0:?}")]
    UnknownMessageType(String),
}

impl ProtoError {
    /// Maps frame-scanning failures onto documented negative return codes,
    /// for diagnostics and for tests that assert on them.
    #[must_use]
    pub fn frame_scan_code(&self) -> Option<i32> {
        match self {
            Self::InvalidHeader(_) => Some(-1),
            Self::MisalignedChecksum { .. } => Some(-2),
            Self::MalformedChecksum(_) => Some(-3),
            Self::ChecksumMismatch { .. } => Some(-4),
            _ => None,
        }
    }
}
