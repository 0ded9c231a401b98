//! Engine-level error types.

use fix_core::error::SessionError;
use fix_proto::ProtoError;
use thiserror::Error;

use crate::log_store::LogStoreError;

/// Session identifier, as configured on [`crate::config::SessionConfig`].
pub type SessionId = String;

/// Errors raised by [`crate::driver::EngineDriver`] and the binary wiring
/// it, per spec.md §7's three-enum split: protocol errors stay in
/// `fix-proto`, session-state errors stay in `fix-core`, and everything
/// about running the engine itself lives here.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A transport-level operation (bind, accept, read, write) failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The supplied configuration was invalid or incomplete.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An admin operation named a session id the engine doesn't manage.
    #[error("unknown session: {0}")]
    SessionNotFound(SessionId),

    /// The log store failed to append or replay.
    #[error("persistence error: {0}")]
    Persistence(#[from] LogStoreError),

    /// The session state machine rejected an event.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A frame failed to parse or build.
    #[error(transparent)]
    Proto(#[from] ProtoError),
}
