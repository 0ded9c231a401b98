//! Zero-copy FIX and binary (OUCH/SBE) message codecs.
//!
//! This crate has no network, scheduling, or persistence concerns — it only
//! turns bytes into flyweight views and flyweight views back into bytes.
//! Everything here is a pure function of its input buffer: frame scanning
//! (`fix::frame`), field indexing (`fix::incoming`), outgoing message
//! assembly (`fix::outgoing`), and the OUCH/SBE binary layouts (`binary`).
//!
//! # Layout
//!
//! - [`buffer::ByteSeq`] — a borrowed ASCII byte view with Java-`String`-style
//!   hashing, used throughout as the zero-copy field value type.
//! - [`dictionary::Dictionary`] — tag/message/group definitions, built
//!   programmatically by a caller (no XML loader ships here).
//! - [`fix`] — tag=value framing, parsing, and building.
//! - [`binary`] — OUCH and SBE flyweights.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod binary;
pub mod buffer;
pub mod dictionary;
pub mod error;
pub mod fix;

pub use buffer::ByteSeq;
pub use dictionary::Dictionary;
pub use error::ProtoError;
pub use fix::{is_admin, restamp_poss_dup, AdminMsgType, FixMessageView, FrameScanner, OutgoingBuilder, SOH};
