//! C8 — engine/network dispatch driver.
//!
//! `EngineDriver` is the sans-IO orchestrator: it owns the session-id →
//! [`Session`] map (via [`SessionRegistry`]) and turns [`EngineEvent`]s into
//! [`EngineAction`]s for a runtime (production TCP, or the turmoil harness)
//! to execute. No sockets, no files — those live in
//! `transport.rs`/`log_store.rs` and are driven by the actions this
//! produces.

use std::time::Duration;

use fix_core::env::Environment;
use fix_core::scheduler::ScheduleEvent;
use fix_core::session::{plan_resend, ResendEntryMeta, ResendItem, Session, SessionAction};
use fix_proto::{is_admin, restamp_poss_dup, FixMessageView};

use crate::config::SessionConfig;
use crate::error::EngineError;
use crate::log_store::{Direction, LogEntry, LogStore, ReplayFilter};
use crate::registry::SessionRegistry;

/// Severity for [`EngineAction::Log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Routine diagnostic detail.
    Debug,
    /// Normal operational event.
    Info,
    /// Recoverable problem.
    Warn,
    /// Unrecoverable problem for the affected session.
    Error,
}

/// Events the driver processes, produced by the runtime (TCP driver loop
/// in production, turmoil harness in tests).
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A transport layer accepted or dialed a connection for `session_id`.
    Connected {
        /// The session this connection belongs to.
        session_id: String,
    },
    /// A complete FIX frame arrived for `session_id`.
    FrameReceived {
        /// The session the frame arrived on.
        session_id: String,
        /// The raw frame bytes.
        raw: Vec<u8>,
    },
    /// The transport for `session_id` was lost.
    Disconnected {
        /// The session whose channel was lost.
        session_id: String,
        /// Why the channel was lost.
        reason: String,
    },
    /// The 1-second heartbeat/liveness scheduled task fired.
    TickHeartbeat,
    /// The 1-second schedule scheduled task fired.
    TickSchedule,
    /// The 60-second EOD scheduled task fired.
    TickEod,
}

/// Actions the runtime must execute, produced by the driver.
#[derive(Debug, Clone)]
pub enum EngineAction {
    /// Write `raw` to the transport backing `session_id`.
    Send {
        /// Destination session.
        session_id: String,
        /// Encoded frame bytes to write.
        raw: Vec<u8>,
    },
    /// Close the transport backing `session_id`.
    Disconnect {
        /// Session to disconnect.
        session_id: String,
        /// Human-readable reason, also logged.
        reason: String,
    },
    /// Dial out to `session_id`'s configured counterparty.
    Connect {
        /// Session to connect.
        session_id: String,
    },
    /// Append `entry` to `session_id`'s log stream.
    Persist {
        /// Session (== log stream name) to persist under.
        session_id: String,
        /// The entry to append.
        entry: LogEntry,
    },
    /// Structured log line for the runtime to emit via `tracing`.
    Log {
        /// Severity.
        level: LogLevel,
        /// Message text.
        message: String,
    },
}

/// Holds every session this engine instance manages and turns events into
/// actions. Generic over the injected [`Environment`] (real clock in
/// production, virtual clock under turmoil) and [`LogStore`] backend.
pub struct EngineDriver<E: Environment, L: LogStore> {
    env: E,
    log_store: L,
    registry: SessionRegistry<E::Instant>,
}

impl<E: Environment, L: LogStore> EngineDriver<E, L> {
    /// Creates an empty driver.
    pub fn new(env: E, log_store: L) -> Self {
        Self { env, log_store, registry: SessionRegistry::new() }
    }

    /// Registers a new session from configuration.
    pub fn create_session(&mut self, config: SessionConfig) -> Result<(), EngineError> {
        if !self.registry.create_session(&self.env, config.clone()) {
            return Err(EngineError::Configuration(format!(
                "session '{}' already exists",
                config.session_id
            )));
        }
        Ok(())
    }

    /// Current lifecycle state of a managed session, for monitoring/tests.
    pub fn session_state(&self, session_id: &str) -> Option<fix_core::session::SessionState> {
        self.registry.get(session_id).map(|r| r.session.state())
    }

    /// Next outgoing `MsgSeqNum` a session would assign.
    pub fn outgoing_seq(&self, session_id: &str) -> Option<u64> {
        self.registry.get(session_id).map(|r| r.session.outgoing_seq())
    }

    /// Next incoming `MsgSeqNum` a session expects.
    pub fn expected_incoming_seq(&self, session_id: &str) -> Option<u64> {
        self.registry.get(session_id).map(|r| r.session.expected_incoming())
    }

    /// Overrides a session's outgoing sequence number (admin operation,
    /// spec §6).
    pub fn set_outgoing_seq_num(&mut self, session_id: &str, seq: u64) -> Result<(), EngineError> {
        let registered = self
            .registry
            .get_mut(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
        registered.session.set_outgoing_seq_num(seq);
        Ok(())
    }

    /// Overrides a session's expected incoming sequence number (admin
    /// operation, spec §6).
    pub fn set_expected_incoming_seq_num(
        &mut self,
        session_id: &str,
        seq: u64,
    ) -> Result<(), EngineError> {
        let registered = self
            .registry
            .get_mut(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
        registered.session.set_expected_incoming_seq_num(seq);
        Ok(())
    }

    /// Forces an immediate end-of-day reset on one session, outside the
    /// regular `TickEod` schedule (admin operation, spec §6).
    pub fn trigger_eod(&mut self, session_id: &str) -> Result<Vec<EngineAction>, EngineError> {
        let epoch_millis = self.env.wall_clock_millis();
        let registered = self
            .registry
            .get_mut(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
        let (prior_out, prior_in) = registered.session.apply_eod_reset();
        Ok(vec![
            EngineAction::Persist {
                session_id: session_id.to_string(),
                entry: LogEntry {
                    timestamp_millis: epoch_millis,
                    direction: Direction::Outbound,
                    seq_num: 0,
                    metadata: bytes::Bytes::from(
                        format!("prior_outgoing={prior_out},prior_incoming={prior_in}").into_bytes(),
                    ),
                    raw: bytes::Bytes::from_static(b"EOD"),
                },
            },
            EngineAction::Log {
                level: LogLevel::Info,
                message: format!(
                    "manual EOD reset for {session_id}: outgoing {prior_out} -> 1, incoming {prior_in} -> 1"
                ),
            },
        ])
    }

    /// Starts the Logon handshake for an `Initiator` session, or marks an
    /// `Acceptor` session ready to receive one.
    pub fn connect(&mut self, session_id: &str) -> Result<Vec<EngineAction>, EngineError> {
        let registered = self
            .registry
            .get_mut(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;

        registered.session.connect(self.env.now());

        let mut actions = Vec::new();
        if matches!(registered.config.role, fix_core::session::SessionRole::Initiator) {
            actions.push(EngineAction::Connect { session_id: session_id.to_string() });
        }
        Ok(actions)
    }

    /// Cooperative logout.
    pub async fn logout(&mut self, session_id: &str, reason: &str) -> Result<Vec<EngineAction>, EngineError> {
        let registered = self
            .registry
            .get_mut(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
        let epoch_millis = self.env.wall_clock_millis();
        let actions = registered.session.send_logout(self.env.now(), epoch_millis)?;
        Ok(self.translate(session_id, actions, reason).await)
    }

    /// `EngineEvent` dispatch: the one place events become actions.
    pub async fn process_event(&mut self, event: EngineEvent) -> Result<Vec<EngineAction>, EngineError> {
        match event {
            EngineEvent::Connected { session_id } => self.on_connected(&session_id).await,
            EngineEvent::FrameReceived { session_id, raw } => self.on_frame(&session_id, raw).await,
            EngineEvent::Disconnected { session_id, reason } => {
                self.on_disconnected(&session_id, &reason)
            }
            EngineEvent::TickHeartbeat => self.on_tick_heartbeat().await,
            EngineEvent::TickSchedule => self.on_tick_schedule().await,
            EngineEvent::TickEod => self.on_tick_eod(),
        }
    }

    async fn on_connected(&mut self, session_id: &str) -> Result<Vec<EngineAction>, EngineError> {
        let registered = self
            .registry
            .get_mut(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
        registered.attached = true;

        if matches!(registered.config.role, fix_core::session::SessionRole::Initiator) {
            let epoch_millis = self.env.wall_clock_millis();
            let actions = registered.session.send_logon(false, self.env.now(), epoch_millis)?;
            return Ok(self.translate(session_id, actions, "").await);
        }
        Ok(Vec::new())
    }

    async fn on_frame(&mut self, session_id: &str, raw: Vec<u8>) -> Result<Vec<EngineAction>, EngineError> {
        let now = self.env.now();
        let epoch_millis = self.env.wall_clock_millis();

        let registered = self
            .registry
            .get_mut(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;

        let view = FixMessageView::wrap(&raw)?;
        let seq_num = view.seq_num().unwrap_or(0);
        let actions = registered.session.handle_frame(&view, now, epoch_millis)?;

        let mut out = self.translate(session_id, actions, "").await;
        out.push(EngineAction::Persist {
            session_id: session_id.to_string(),
            entry: LogEntry {
                timestamp_millis: epoch_millis,
                direction: Direction::Inbound,
                seq_num: seq_num as i32,
                metadata: bytes::Bytes::new(),
                raw: bytes::Bytes::copy_from_slice(&raw),
            },
        });
        Ok(out)
    }

    fn on_disconnected(
        &mut self,
        session_id: &str,
        reason: &str,
    ) -> Result<Vec<EngineAction>, EngineError> {
        let registered = self
            .registry
            .get_mut(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
        registered.attached = false;
        registered.session.disconnect();
        Ok(vec![EngineAction::Log {
            level: LogLevel::Info,
            message: format!("session {session_id} disconnected: {reason}"),
        }])
    }

    async fn on_tick_heartbeat(&mut self) -> Result<Vec<EngineAction>, EngineError> {
        let now = self.env.now();
        let epoch_millis = self.env.wall_clock_millis();
        let mut out = Vec::new();
        let session_ids: Vec<String> = self.registry.session_ids().map(str::to_string).collect();
        for session_id in session_ids {
            let registered = self.registry.get_mut(&session_id).expect("just listed");
            if !registered.session.state().is_connected() {
                continue;
            }
            let actions = registered.session.tick(&self.env, now, epoch_millis);
            out.extend(self.translate(&session_id, actions, "").await);
        }
        Ok(out)
    }

    /// Evaluates every session's [`fix_core::scheduler::Schedule`] against
    /// the current time and translates the resulting [`ScheduleEvent`]s
    /// into connect/logout/reset actions, per spec §4.9.
    async fn on_tick_schedule(&mut self) -> Result<Vec<EngineAction>, EngineError> {
        let now = self.env.now();
        let epoch_millis = self.env.wall_clock_millis();
        let now_utc = chrono::DateTime::from_timestamp_millis(epoch_millis).unwrap_or_else(chrono::Utc::now);

        let mut out = Vec::new();
        let session_ids: Vec<String> = self.registry.session_ids().map(str::to_string).collect();
        for session_id in session_ids {
            let events = {
                let registered = self.registry.get_mut(&session_id).expect("just listed");
                let Some(schedule) = registered.schedule.clone() else {
                    continue;
                };
                registered.schedule_tracker.tick(&schedule, now_utc)
            };

            for event in events {
                match event {
                    ScheduleEvent::SessionStart => {
                        let registered = self.registry.get_mut(&session_id).expect("just listed");
                        if matches!(registered.config.role, fix_core::session::SessionRole::Initiator)
                            && !registered.attached
                        {
                            out.push(EngineAction::Connect { session_id: session_id.clone() });
                        }
                        out.push(EngineAction::Log {
                            level: LogLevel::Info,
                            message: format!("session {session_id} schedule window opened"),
                        });
                    }
                    ScheduleEvent::SessionEnd => {
                        let logout_actions = {
                            let registered = self.registry.get_mut(&session_id).expect("just listed");
                            if registered.session.state().is_connected() {
                                registered.session.send_logout(now, epoch_millis).ok()
                            } else {
                                None
                            }
                        };
                        if let Some(actions) = logout_actions {
                            out.extend(
                                self.translate(&session_id, actions, "schedule window closed").await,
                            );
                        }
                    }
                    ScheduleEvent::Reset => {
                        let (prior_out, prior_in) = {
                            let registered = self.registry.get_mut(&session_id).expect("just listed");
                            registered.session.apply_eod_reset()
                        };
                        out.push(EngineAction::Persist {
                            session_id: session_id.clone(),
                            entry: LogEntry {
                                timestamp_millis: epoch_millis,
                                direction: Direction::Outbound,
                                seq_num: 0,
                                metadata: bytes::Bytes::from(
                                    format!("prior_outgoing={prior_out},prior_incoming={prior_in}")
                                        .into_bytes(),
                                ),
                                raw: bytes::Bytes::from_static(b"SCHEDULE_RESET"),
                            },
                        });
                        out.push(EngineAction::Log {
                            level: LogLevel::Info,
                            message: format!(
                                "scheduled reset for {session_id}: outgoing {prior_out} -> 1, incoming {prior_in} -> 1"
                            ),
                        });
                    }
                    ScheduleEvent::EndWarning => out.push(EngineAction::Log {
                        level: LogLevel::Info,
                        message: format!("session {session_id} schedule window closing soon"),
                    }),
                    ScheduleEvent::ResetWarning => out.push(EngineAction::Log {
                        level: LogLevel::Info,
                        message: format!("session {session_id} scheduled reset due soon"),
                    }),
                }
            }
        }
        Ok(out)
    }

    fn on_tick_eod(&mut self) -> Result<Vec<EngineAction>, EngineError> {
        let epoch_millis = self.env.wall_clock_millis();
        let mut out = Vec::new();
        let session_ids: Vec<String> = self.registry.session_ids().map(str::to_string).collect();
        for session_id in session_ids {
            let registered = self.registry.get_mut(&session_id).expect("just listed");
            if !registered.config.reset_on_eod {
                continue;
            }
            let (prior_out, prior_in) = registered.session.apply_eod_reset();
            out.push(EngineAction::Persist {
                session_id: session_id.clone(),
                entry: LogEntry {
                    timestamp_millis: epoch_millis,
                    direction: Direction::Outbound,
                    seq_num: 0,
                    metadata: bytes::Bytes::from(
                        format!("prior_outgoing={prior_out},prior_incoming={prior_in}")
                            .into_bytes(),
                    ),
                    raw: bytes::Bytes::from_static(b"EOD"),
                },
            });
            out.push(EngineAction::Log {
                level: LogLevel::Info,
                message: format!(
                    "EOD reset for {session_id}: outgoing {prior_out} -> 1, incoming {prior_in} -> 1"
                ),
            });
        }
        Ok(out)
    }

    /// Converts `Session`-level [`SessionAction`]s into engine-level
    /// [`EngineAction`]s, additionally persisting every outbound frame.
    async fn translate(
        &mut self,
        session_id: &str,
        actions: Vec<SessionAction>,
        disconnect_reason_override: &str,
    ) -> Vec<EngineAction> {
        let epoch_millis = self.env.wall_clock_millis();
        let mut out = Vec::new();
        for action in actions {
            match action {
                SessionAction::Send(bytes) => {
                    out.push(EngineAction::Persist {
                        session_id: session_id.to_string(),
                        entry: LogEntry {
                            timestamp_millis: epoch_millis,
                            direction: Direction::Outbound,
                            seq_num: 0,
                            metadata: bytes::Bytes::new(),
                            raw: bytes.clone(),
                        },
                    });
                    out.push(EngineAction::Send {
                        session_id: session_id.to_string(),
                        raw: bytes.to_vec(),
                    });
                }
                SessionAction::Disconnect { reason } => {
                    let reason = if disconnect_reason_override.is_empty() {
                        reason
                    } else {
                        disconnect_reason_override.to_string()
                    };
                    out.push(EngineAction::Disconnect {
                        session_id: session_id.to_string(),
                        reason,
                    });
                }
                SessionAction::RequestReplay { begin_seq_no, end_seq_no } => {
                    out.extend(self.fulfill_replay(session_id, begin_seq_no, end_seq_no).await);
                }
                SessionAction::EndOfDay { prior_outgoing_seq, prior_expected_incoming } => {
                    out.push(EngineAction::Log {
                        level: LogLevel::Info,
                        message: format!(
                            "session {session_id} EOD: {prior_outgoing_seq} / {prior_expected_incoming}"
                        ),
                    });
                }
            }
        }
        out
    }

    /// Fulfills an incoming `ResendRequest` (spec §4.7/§4.10): replays the
    /// outbound log for `[begin_seq_no, end_seq_no]` (`end_seq_no == 0`
    /// means "through the latest sent message"), collapsing consecutive
    /// admin messages into a single gap-fill via [`plan_resend`].
    async fn fulfill_replay(
        &mut self,
        session_id: &str,
        begin_seq_no: u64,
        end_seq_no: u64,
    ) -> Vec<EngineAction> {
        let now = self.env.now();
        let epoch_millis = self.env.wall_clock_millis();
        let current_outgoing = self.outgoing_seq(session_id).unwrap_or(1);
        let end_seq_no_exclusive = if end_seq_no == 0 { current_outgoing } else { end_seq_no + 1 };

        if begin_seq_no >= end_seq_no_exclusive {
            return Vec::new();
        }

        let filter = ReplayFilter {
            stream: Some(session_id.to_string()),
            direction: Some(Direction::Outbound),
            seq_range: Some((begin_seq_no as i32, (end_seq_no_exclusive - 1) as i32)),
            ..Default::default()
        };

        let mut entries: Vec<LogEntry> = Vec::new();
        if let Err(err) = self
            .log_store
            .replay(filter, |_stream, _offset, entry| {
                if entry.seq_num > 0 {
                    entries.push(entry.clone());
                }
            })
            .await
        {
            return vec![EngineAction::Log {
                level: LogLevel::Error,
                message: format!("session {session_id} resend replay failed: {err}"),
            }];
        }
        entries.sort_by_key(|e| e.seq_num);

        let metas: Vec<ResendEntryMeta> = entries
            .iter()
            .map(|entry| {
                let msg_type = FixMessageView::wrap(&entry.raw)
                    .ok()
                    .and_then(|view| view.msg_type().map(|m| m.to_string()))
                    .unwrap_or_default();
                ResendEntryMeta { seq_num: entry.seq_num as u64, is_admin: is_admin(&msg_type) }
            })
            .collect();

        let mut out = Vec::new();
        for item in plan_resend(&metas, end_seq_no_exclusive) {
            match item {
                ResendItem::Replay(seq) => {
                    let Some(entry) = entries.iter().find(|e| e.seq_num as u64 == seq) else {
                        continue;
                    };
                    match restamp_poss_dup(&entry.raw) {
                        Ok(restamped) => out.push(EngineAction::Send {
                            session_id: session_id.to_string(),
                            raw: restamped.to_vec(),
                        }),
                        Err(err) => out.push(EngineAction::Log {
                            level: LogLevel::Error,
                            message: format!(
                                "session {session_id} failed to restamp resend seq {seq}: {err}"
                            ),
                        }),
                    }
                }
                ResendItem::GapFill { begin_seq_no, new_seq_no } => {
                    let Some(registered) = self.registry.get_mut(session_id) else {
                        continue;
                    };
                    match registered.session.build_gap_fill(new_seq_no, now, epoch_millis) {
                        Ok(SessionAction::Send(bytes)) => {
                            out.push(EngineAction::Persist {
                                session_id: session_id.to_string(),
                                entry: LogEntry {
                                    timestamp_millis: epoch_millis,
                                    direction: Direction::Outbound,
                                    seq_num: 0,
                                    metadata: bytes::Bytes::new(),
                                    raw: bytes.clone(),
                                },
                            });
                            out.push(EngineAction::Send {
                                session_id: session_id.to_string(),
                                raw: bytes.to_vec(),
                            });
                        }
                        Ok(_) => {}
                        Err(err) => out.push(EngineAction::Log {
                            level: LogLevel::Error,
                            message: format!(
                                "session {session_id} gap-fill [{begin_seq_no}, {new_seq_no}) failed: {err}"
                            ),
                        }),
                    }
                }
            }
        }
        out
    }

    /// Total number of managed sessions.
    pub fn session_count(&self) -> usize {
        self.registry.session_count()
    }

    /// All configured session ids.
    pub fn session_ids(&self) -> Vec<String> {
        self.registry.session_ids().map(str::to_string).collect()
    }

    /// A session's static configuration, for runtimes that need to dial out
    /// or bind a listener.
    pub fn session_config(&self, session_id: &str) -> Option<&SessionConfig> {
        self.registry.get(session_id).map(|r| &r.config)
    }

    /// Distinct bind ports across all `Acceptor` sessions.
    pub fn acceptor_ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self
            .registry
            .session_ids()
            .filter_map(|id| self.registry.get(id))
            .filter(|r| matches!(r.config.role, fix_core::session::SessionRole::Acceptor))
            .map(|r| r.config.port)
            .collect();
        ports.sort_unstable();
        ports.dedup();
        ports
    }

    /// Resolves an inbound Logon on `port` to the session it belongs to, by
    /// matching the peer's `SenderCompID`/`TargetCompID` pair against each
    /// candidate session's configuration.
    pub fn resolve_acceptor(
        &self,
        port: u16,
        peer_sender_comp_id: &str,
        peer_target_comp_id: &str,
    ) -> Option<String> {
        self.registry
            .resolve_acceptor(port, peer_sender_comp_id, peer_target_comp_id)
            .map(str::to_string)
    }

    /// Read-only access to the log store, e.g. for resend replay.
    pub fn log_store(&self) -> &L {
        &self.log_store
    }

    /// Heartbeat tick period recommended for the binary's scheduler loop.
    pub const HEARTBEAT_TICK: Duration = Duration::from_secs(1);
    /// Schedule tick period recommended for the binary's scheduler loop.
    pub const SCHEDULE_TICK: Duration = Duration::from_secs(1);
    /// EOD tick period recommended for the binary's scheduler loop.
    pub const EOD_TICK: Duration = Duration::from_secs(60);
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use fix_core::session::SessionRole;

    use super::*;
    use crate::log_store::MemoryLogStore;

    #[derive(Clone)]
    struct TestEnv;

    impl Environment for TestEnv {
        type Instant = Instant;
        fn now(&self) -> Instant {
            Instant::now()
        }
        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            std::future::ready(())
        }
        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(9);
        }
        fn wall_clock_millis(&self) -> i64 {
            1_700_000_000_000
        }
    }

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
            persistence_path: "/tmp/fix-engine-test".into(),
            max_log_file_size: 1024,
        }
    }

    #[test]
    fn create_session_then_connect_emits_connect_action_for_initiator() {
        let mut driver = EngineDriver::new(TestEnv, MemoryLogStore::new());
        driver.create_session(config("S1", SessionRole::Initiator)).unwrap();
        let actions = driver.connect("S1").unwrap();
        assert!(matches!(actions.as_slice(), [EngineAction::Connect { .. }]));
    }

    #[tokio::test]
    async fn connected_event_sends_logon_for_initiator() {
        let mut driver = EngineDriver::new(TestEnv, MemoryLogStore::new());
        driver.create_session(config("S1", SessionRole::Initiator)).unwrap();
        driver.connect("S1").unwrap();

        let actions =
            driver.process_event(EngineEvent::Connected { session_id: "S1".to_string() }).await.unwrap();
        assert!(actions.iter().any(|a| matches!(a, EngineAction::Send { .. })));
        assert!(actions.iter().any(|a| matches!(a, EngineAction::Persist { .. })));
    }

    #[test]
    fn unknown_session_is_reported() {
        let mut driver = EngineDriver::new(TestEnv, MemoryLogStore::new());
        let err = driver.connect("missing").unwrap_err();
        assert!(matches!(err, EngineError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn eod_tick_resets_sessions_with_reset_on_eod() {
        let mut driver = EngineDriver::new(TestEnv, MemoryLogStore::new());
        driver.create_session(config("S1", SessionRole::Initiator)).unwrap();
        let actions = driver.process_event(EngineEvent::TickEod).await.unwrap();
        assert!(actions.iter().any(|a| matches!(a, EngineAction::Persist { .. })));
        assert!(actions.iter().any(|a| matches!(a, EngineAction::Log { .. })));
    }

    #[tokio::test]
    async fn request_replay_restamps_and_resends_stored_application_message() {
        let mut driver = EngineDriver::new(TestEnv, MemoryLogStore::new());
        driver.create_session(config("S1", SessionRole::Initiator)).unwrap();
        driver.connect("S1").unwrap();
        driver.process_event(EngineEvent::Connected { session_id: "S1".to_string() }).await.unwrap();

        let mut builder = fix_proto::OutgoingBuilder::new("FIX.4.4", "US", "EU");
        builder.set_msg_type("D").unwrap();
        builder.set_field(55, b"EUR/USD").unwrap();
        let raw = builder.prepare_for_send(2, 1_700_000_000_000).unwrap();
        driver
            .log_store()
            .append(
                "S1",
                LogEntry {
                    timestamp_millis: 1_700_000_000_000,
                    direction: Direction::Outbound,
                    seq_num: 2,
                    metadata: bytes::Bytes::new(),
                    raw: raw.clone(),
                },
            )
            .await
            .unwrap();

        let actions = driver.fulfill_replay("S1", 2, 2).await;
        let sent = actions
            .iter()
            .find_map(|a| match a {
                EngineAction::Send { raw, .. } => Some(raw.clone()),
                _ => None,
            })
            .expect("expected a Send action");

        let view = FixMessageView::wrap(&sent).unwrap();
        assert!(view.poss_dup());
        assert_eq!(view.int(34), Some(2));
    }

    #[tokio::test]
    async fn request_replay_gap_fills_admin_only_range() {
        let mut driver = EngineDriver::new(TestEnv, MemoryLogStore::new());
        driver.create_session(config("S1", SessionRole::Initiator)).unwrap();
        driver.connect("S1").unwrap();
        driver.process_event(EngineEvent::Connected { session_id: "S1".to_string() }).await.unwrap();

        let mut builder = fix_proto::OutgoingBuilder::new("FIX.4.4", "US", "EU");
        builder.set_msg_type("0").unwrap();
        let heartbeat = builder.prepare_for_send(2, 1_700_000_000_000).unwrap();
        driver
            .log_store()
            .append(
                "S1",
                LogEntry {
                    timestamp_millis: 1_700_000_000_000,
                    direction: Direction::Outbound,
                    seq_num: 2,
                    metadata: bytes::Bytes::new(),
                    raw: heartbeat,
                },
            )
            .await
            .unwrap();

        let actions = driver.fulfill_replay("S1", 2, 2).await;
        assert!(actions.iter().any(|a| match a {
            EngineAction::Send { raw, .. } => {
                let view = FixMessageView::wrap(raw).unwrap();
                view.msg_type().map(|m| m == "4").unwrap_or(false) && view.gap_fill()
            }
            _ => false,
        }));
    }

    #[tokio::test]
    async fn tick_schedule_opens_window_and_connects_initiator() {
        let mut driver = EngineDriver::new(TestEnv, MemoryLogStore::new());
        let mut scheduled = config("S1", SessionRole::Initiator);
        scheduled.scheduler = Some("always-open".to_string());
        scheduled.timezone = Some(chrono_tz::UTC);
        scheduled.start_time = Some("00:00:00".to_string());
        scheduled.end_time = Some("23:59:59".to_string());
        driver.create_session(scheduled).unwrap();

        let actions = driver.process_event(EngineEvent::TickSchedule).await.unwrap();
        assert!(actions
            .iter()
            .any(|a| matches!(a, EngineAction::Connect { session_id } if session_id.as_str() == "S1")));
        assert!(actions.iter().any(|a| matches!(a, EngineAction::Log { .. })));
    }

    #[tokio::test]
    async fn tick_schedule_is_idempotent_within_the_same_window() {
        let mut driver = EngineDriver::new(TestEnv, MemoryLogStore::new());
        let mut scheduled = config("S1", SessionRole::Initiator);
        scheduled.scheduler = Some("always-open".to_string());
        scheduled.timezone = Some(chrono_tz::UTC);
        scheduled.start_time = Some("00:00:00".to_string());
        scheduled.end_time = Some("23:59:59".to_string());
        driver.create_session(scheduled).unwrap();

        driver.process_event(EngineEvent::TickSchedule).await.unwrap();
        let second = driver.process_event(EngineEvent::TickSchedule).await.unwrap();
        assert!(second.is_empty());
    }
}
