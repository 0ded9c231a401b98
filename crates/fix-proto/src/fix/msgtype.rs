//! Admin and session-level `MsgType` (tag 35) values the core must
//! recognize natively. Application message types are dictionary-driven and
//! not enumerated here.

use std::fmt;

/// Administrative `MsgType` values the session state machine interprets
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminMsgType {
    /// `35=0` Heartbeat.
    Heartbeat,
    /// `35=1` TestRequest.
    TestRequest,
    /// `35=2` ResendRequest.
    ResendRequest,
    /// `35=3` Reject.
    Reject,
    /// `35=4` SequenceReset.
    SequenceReset,
    /// `35=5` Logout.
    Logout,
    /// `35=A` Logon.
    Logon,
}

impl AdminMsgType {
    /// Parses a raw `MsgType` value, if it names an admin message.
    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        Some(match value {
            "0" => Self::Heartbeat,
            "1" => Self::TestRequest,
            "2" => Self::ResendRequest,
            "3" => Self::Reject,
            "4" => Self::SequenceReset,
            "5" => Self::Logout,
            "A" => Self::Logon,
            _ => return None,
        })
    }

    /// The raw `MsgType` wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Heartbeat => "0",
            Self::TestRequest => "1",
            Self::ResendRequest => "2",
            Self::Reject => "3",
            Self::SequenceReset => "4",
            Self::Logout => "5",
            Self::Logon => "A",
        }
    }
}

impl fmt::Display for AdminMsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// True if `msg_type` names an admin/session-level message rather than an
/// application message.
#[must_use]
pub fn is_admin(msg_type: &str) -> bool {
    AdminMsgType::from_str(msg_type).is_some()
}
