//! Deterministic [`Environment`] implementation for simulation.
//!
//! Mirrors `fix-engine`'s `SystemEnv` shape but swaps real time/RNG for
//! turmoil's virtualized clock and a seeded RNG, so scenario tests get the
//! same sequence of random bytes and the same elapsed-time behavior on
//! every run.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use fix_core::env::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Simulation environment: virtual clock (via turmoil/tokio time), seeded
/// `ChaCha8` RNG.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
    base_instant: tokio::time::Instant,
    base_epoch_millis: i64,
}

impl SimEnv {
    /// Creates a new simulation environment seeded for reproducibility.
    ///
    /// `base_epoch_millis` anchors [`Environment::wall_clock_millis`] to a
    /// fixed point in time (the virtual clock has no real epoch of its
    /// own); pass any value representative of the scenario under test,
    /// e.g. a session's configured start time.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            base_instant: tokio::time::Instant::now(),
            base_epoch_millis: 1_700_000_000_000,
        }
    }

    /// As [`Self::with_seed`] but anchoring the wall clock to `epoch_millis`.
    #[must_use]
    pub fn with_seed_and_epoch(seed: u64, epoch_millis: i64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            base_instant: tokio::time::Instant::now(),
            base_epoch_millis: epoch_millis,
        }
    }
}

impl Environment for SimEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().expect("sim rng mutex poisoned").fill_bytes(buffer);
    }

    fn wall_clock_millis(&self) -> i64 {
        let elapsed = tokio::time::Instant::now().saturating_duration_since(self.base_instant);
        self.base_epoch_millis + elapsed.as_millis() as i64
    }
}
