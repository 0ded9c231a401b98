//! Session-level error types.
//!
//! Splits transient from fatal failures: callers need to know whether an
//! error should tear the session down or can simply be logged and retried.

use std::io;

use fix_proto::ProtoError;
use thiserror::Error;

/// Errors raised while driving a [`crate::session::Session`].
#[derive(Error, Debug)]
pub enum SessionError {
    /// An inbound sequence number was lower than expected, without
    /// `PossDupFlag` set — unrecoverable without manual intervention.
    #[error("sequence too low: expected {expected}, got {got}")]
    SequenceTooLow {
        /// Expected next incoming sequence number.
        expected: u64,
        /// Sequence number actually received.
        got: u64,
    },

    /// An inbound sequence number was higher than expected; a
    /// `ResendRequest` has been emitted and the frame buffered pending
    /// resend completion.
    #[error("gap detected: expected {expected}, got {got}")]
    GapDetected {
        /// Expected next incoming sequence number.
        expected: u64,
        /// Sequence number actually received.
        got: u64,
    },

    /// A `ResendRequest` named a range this session cannot reconstruct from
    /// its log store.
    #[error("unsatisfiable resend request: {begin_seq_no}-{end_seq_no}")]
    UnsatisfiableResend {
        /// First requested sequence number.
        begin_seq_no: u64,
        /// Last requested sequence number (0 means "to infinity").
        end_seq_no: u64,
    },

    /// A protocol rule was violated (unexpected message for the current
    /// state, missing required field, malformed value).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The message pool had no free slots available within the caller's
    /// acquire policy.
    #[error("message pool exhausted")]
    PoolExhausted,

    /// The ring buffer had no room to claim a record of the requested
    /// length under the configured backpressure policy.
    #[error("ring buffer full")]
    RingBufferFull,

    /// Underlying framing/parsing/building failure.
    #[error(transparent)]
    Proto(#[from] ProtoError),
}

impl SessionError {
    /// True if the session can continue operating after this error (a gap
    /// awaiting resend, a transient pool/ring exhaustion) versus needing to
    /// disconnect (a sequence regression or protocol violation).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::GapDetected { .. } | Self::PoolExhausted | Self::RingBufferFull)
    }
}

impl From<SessionError> for io::Error {
    fn from(err: SessionError) -> Self {
        io::Error::other(err.to_string())
    }
}
