//! C3 — the FIX tag=value codec: frame extraction, the incoming flyweight,
//! and the outgoing builder.

pub mod frame;
pub mod incoming;
pub mod msgtype;
pub mod outgoing;

pub use frame::{FrameScanner, SOH};
pub use incoming::FixMessageView;
pub use msgtype::{is_admin, AdminMsgType};
pub use outgoing::{restamp_poss_dup, OutgoingBuilder};
