//! Simulation driver for `fix-engine` scenario testing.
//!
//! Drives an [`EngineDriver`] directly with injected frames and ticks,
//! without real sockets, by injecting events and frames in place of a live
//! transport. Time and randomness come from [`SimEnv`] so a scenario
//! replays identically on every run.

use fix_engine::{EngineAction, EngineDriver, EngineError, EngineEvent, LogStore, MemoryLogStore, SessionConfig};

use crate::SimEnv;

/// Drives one engine instance through a scenario: session setup, frame
/// injection, and scheduled ticks, collecting the outgoing frames each
/// step produces.
///
/// Mirrors the production `execute_actions` loop in `fix-engine`'s `lib.rs`
/// closely enough that `Persist` actions actually land in the underlying
/// log store, rather than being silently dropped — a scenario asserting on
/// `driver_mut().log_store()` afterwards sees what a real run would have
/// written.
pub struct SimDriver {
    driver: EngineDriver<SimEnv, MemoryLogStore>,
}

impl SimDriver {
    /// Creates a driver with no sessions registered yet.
    #[must_use]
    pub fn new(env: SimEnv) -> Self {
        Self { driver: EngineDriver::new(env, MemoryLogStore::new()) }
    }

    /// Registers a session.
    pub fn create_session(&mut self, config: SessionConfig) -> Result<(), EngineError> {
        self.driver.create_session(config)
    }

    /// Attaches a (simulated) channel to `session_id`, returning any frames
    /// produced immediately (e.g. an `Initiator`'s Logon).
    pub async fn connect(&mut self, session_id: &str) -> Result<Vec<Vec<u8>>, EngineError> {
        let actions = self.driver.connect(session_id)?;
        let connected = self
            .driver
            .process_event(EngineEvent::Connected { session_id: session_id.to_string() })
            .await?;
        self.execute(actions.into_iter().chain(connected)).await
    }

    /// Feeds one raw frame to `session_id`, returning the frames it
    /// produces in response.
    pub async fn inject_frame(
        &mut self,
        session_id: &str,
        raw: &[u8],
    ) -> Result<Vec<Vec<u8>>, EngineError> {
        let actions = self
            .driver
            .process_event(EngineEvent::FrameReceived {
                session_id: session_id.to_string(),
                raw: raw.to_vec(),
            })
            .await?;
        self.execute(actions).await
    }

    /// Simulates a transport loss for `session_id`.
    pub async fn disconnect(&mut self, session_id: &str, reason: &str) -> Result<(), EngineError> {
        let actions = self
            .driver
            .process_event(EngineEvent::Disconnected {
                session_id: session_id.to_string(),
                reason: reason.to_string(),
            })
            .await?;
        self.execute(actions).await?;
        Ok(())
    }

    /// Fires the heartbeat scheduled task once.
    pub async fn tick_heartbeat(&mut self) -> Result<Vec<Vec<u8>>, EngineError> {
        let actions = self.driver.process_event(EngineEvent::TickHeartbeat).await?;
        self.execute(actions).await
    }

    /// Fires the end-of-day scheduled task once.
    pub async fn tick_eod(&mut self) -> Result<Vec<Vec<u8>>, EngineError> {
        let actions = self.driver.process_event(EngineEvent::TickEod).await?;
        self.execute(actions).await
    }

    /// Forces an immediate end-of-day reset on one session.
    pub async fn trigger_eod(&mut self, session_id: &str) -> Result<Vec<Vec<u8>>, EngineError> {
        let actions = self.driver.trigger_eod(session_id)?;
        self.execute(actions).await
    }

    /// Applies `actions` against the underlying log store the way the
    /// production connection-handling loop does, returning the raw bytes
    /// of every `Send` action in order.
    async fn execute(
        &self,
        actions: impl IntoIterator<Item = EngineAction>,
    ) -> Result<Vec<Vec<u8>>, EngineError> {
        let mut frames = Vec::new();
        for action in actions {
            match action {
                EngineAction::Send { raw, .. } => frames.push(raw),
                EngineAction::Persist { session_id, entry } => {
                    self.driver.log_store().append(&session_id, entry).await?;
                }
                EngineAction::Disconnect { .. } | EngineAction::Connect { .. } | EngineAction::Log { .. } => {}
            }
        }
        Ok(frames)
    }

    /// Current lifecycle state of `session_id`.
    pub fn session_state(&self, session_id: &str) -> Option<fix_core::session::SessionState> {
        self.driver.session_state(session_id)
    }

    /// Next outgoing `MsgSeqNum` for `session_id`.
    pub fn outgoing_seq(&self, session_id: &str) -> Option<u64> {
        self.driver.outgoing_seq(session_id)
    }

    /// Next expected incoming `MsgSeqNum` for `session_id`.
    pub fn expected_incoming_seq(&self, session_id: &str) -> Option<u64> {
        self.driver.expected_incoming_seq(session_id)
    }

    /// Direct access to the underlying driver, for anything this
    /// convenience wrapper doesn't expose.
    pub fn driver_mut(&mut self) -> &mut EngineDriver<SimEnv, MemoryLogStore> {
        &mut self.driver
    }
}

#[cfg(test)]
mod tests {
    use fix_core::session::{SessionRole, SessionState};

    use super::*;
    use crate::SimEnv;

    fn config(session_id: &str, role: SessionRole) -> SessionConfig {
        SessionConfig {
            session_id: session_id.to_string(),
            sender_comp_id: "US".to_string(),
            target_comp_id: "EU".to_string(),
            begin_string: "FIX.4.4".to_string(),
            role,
            host: Some("localhost".to_string()),
            port: 9001,
            heartbeat_interval_secs: 30,
            timezone: None,
            start_time: None,
            end_time: None,
            eod_time: None,
            reset_on_eod: true,
            scheduler: None,
            persistence_path: "/tmp/fix-harness-test".into(),
            max_log_file_size: 1024,
        }
    }

    #[tokio::test]
    async fn connect_as_initiator_emits_logon_frame() {
        let mut sim = SimDriver::new(SimEnv::with_seed(1));
        sim.create_session(config("S1", SessionRole::Initiator)).unwrap();

        let frames = sim.connect("S1").await.unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(sim.session_state("S1"), Some(SessionState::LogonSent));
    }
}
