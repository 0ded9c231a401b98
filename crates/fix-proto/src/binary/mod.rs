//! C4 — binary codecs: OUCH fixed-offset order-entry messages and SBE
//! repeating-group framing.

pub mod ouch;
pub mod sbe;
