//! Deterministic simulation harness for FIX/OUCH engine testing.
//!
//! Turmoil-backed [`Environment`](fix_core::env::Environment) (virtual
//! clock, seeded RNG) plus a [`SimDriver`] that feeds it directly into
//! [`fix_engine::EngineDriver`], so the six end-to-end scenarios in
//! `tests/` replay byte-for-byte identically on every run.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod sim_driver;
pub mod sim_env;

pub use sim_driver::SimDriver;
pub use sim_env::SimEnv;
