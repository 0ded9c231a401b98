//! Session state machine, message pool/ring buffer, and schedule windows
//! for a FIX/OUCH engine.
//!
//! This crate performs no I/O: [`env::Environment`] abstracts time and
//! randomness so [`session::Session`] and [`scheduler::ScheduleTracker`] can
//! be driven deterministically (real clock in production, virtual clock
//! under `turmoil` in tests). [`pool::Pool`] and [`ring::Ring`] are the
//! concurrency primitives the engine crate wires sockets through.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod env;
pub mod error;
pub mod pool;
pub mod ring;
pub mod scheduler;
pub mod session;

pub use env::Environment;
pub use error::SessionError;
pub use pool::{Pool, PoolGuard};
pub use ring::{BackpressurePolicy, Claim, Ring, RECORD_HEADER_LEN};
pub use scheduler::{ResetSchedule, Schedule, ScheduleEvent, ScheduleTracker, TimeWindow};
pub use session::{
    ResendEntryMeta, ResendItem, Session, SessionAction, SessionConfig, SessionRole, SessionState,
    plan_resend,
};
