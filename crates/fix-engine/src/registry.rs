//! Session registry for the engine's network dispatch (C8).
//!
//! FIX sessions are point-to-point: one `Session` per configured
//! `SessionConfig`, looked up by `session_id`. An acceptor bind port can
//! still serve more than one session, though, with selection driven by the
//! inbound Logon's `SenderCompID`/`TargetCompID` pair — so acceptors need a
//! port → candidate-sessions index alongside the primary session map.

use std::collections::HashMap;

use chrono::{NaiveTime, Weekday};
use fix_core::env::Environment;
use fix_core::scheduler::{ResetSchedule, Schedule, ScheduleTracker, TimeWindow};
use fix_core::session::Session;

use crate::config::SessionConfig;

const ALL_WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Builds this session's [`Schedule`] from its `start_time`/`end_time`/
/// `eod_time`/`timezone` config fields, active every day of the week.
/// Returns `None` if the session isn't bound to a scheduler, has no
/// timezone, or none of the time fields parse.
fn build_schedule(config: &SessionConfig) -> Option<Schedule> {
    config.scheduler.as_ref()?;
    let timezone = config.timezone?;

    let parse_time = |value: &str| NaiveTime::parse_from_str(value, "%H:%M:%S").ok();

    let mut windows = Vec::new();
    if let (Some(start), Some(end)) = (config.start_time.as_deref(), config.end_time.as_deref()) {
        if let (Some(start_time), Some(end_time)) = (parse_time(start), parse_time(end)) {
            windows.push(TimeWindow {
                days: ALL_WEEKDAYS.into_iter().collect(),
                start_time,
                end_time,
                overnight: end_time <= start_time,
            });
        }
    }

    let reset = config.eod_time.as_deref().and_then(parse_time).map(|reset_time| ResetSchedule {
        reset_time,
        tolerance: chrono::Duration::minutes(5),
    });

    if windows.is_empty() && reset.is_none() {
        tracing::warn!(
            "session '{}' names a scheduler but start_time/end_time/eod_time don't parse as HH:MM:SS",
            config.session_id
        );
        return None;
    }

    Some(Schedule { timezone, windows, reset, warning_minutes_before: 5, enabled: true })
}

/// A session template plus its live state machine and wiring.
pub struct RegisteredSession<I> {
    /// Static configuration this session was created from.
    pub config: SessionConfig,
    /// The live, I/O-free state machine.
    pub session: Session<I>,
    /// Set once a transport has attached an outbound handle for this session.
    pub attached: bool,
    /// This session's schedule window, built from `config` if it names a
    /// scheduler and carries parseable time fields.
    pub schedule: Option<Schedule>,
    /// Per-day "has this fired yet" state for `schedule`.
    pub schedule_tracker: ScheduleTracker,
}

/// Tracks every session the engine manages, plus which sessions an acceptor
/// bind port may route an incoming Logon to.
pub struct SessionRegistry<I> {
    sessions: HashMap<String, RegisteredSession<I>>,
    acceptor_candidates: HashMap<u16, Vec<String>>,
}

impl<I> Default for SessionRegistry<I> {
    fn default() -> Self {
        Self { sessions: HashMap::new(), acceptor_candidates: HashMap::new() }
    }
}

impl<I: Copy + Ord> SessionRegistry<I> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session from its configuration, constructing its
    /// initial [`Session`] state machine via `now`.
    pub fn create_session<E: Environment<Instant = I>>(
        &mut self,
        env: &E,
        config: SessionConfig,
    ) -> bool {
        if self.sessions.contains_key(&config.session_id) {
            return false;
        }

        let session_config = fix_core::session::SessionConfig {
            begin_string: config.begin_string.clone(),
            sender_comp_id: config.sender_comp_id.clone(),
            target_comp_id: config.target_comp_id.clone(),
            role: config.role,
            heartbeat_interval: std::time::Duration::from_secs(config.heartbeat_interval_secs),
        };
        let session = Session::new(env.now(), session_config);
        let schedule = build_schedule(&config);

        if matches!(config.role, fix_core::session::SessionRole::Acceptor) {
            self.acceptor_candidates.entry(config.port).or_default().push(config.session_id.clone());
        }

        self.sessions.insert(
            config.session_id.clone(),
            RegisteredSession {
                config,
                session,
                attached: false,
                schedule,
                schedule_tracker: ScheduleTracker::default(),
            },
        );
        true
    }

    /// Removes a session entirely.
    pub fn remove_session(&mut self, session_id: &str) -> Option<RegisteredSession<I>> {
        let removed = self.sessions.remove(session_id)?;
        if let Some(candidates) = self.acceptor_candidates.get_mut(&removed.config.port) {
            candidates.retain(|id| id != session_id);
        }
        Some(removed)
    }

    /// Read-only session lookup.
    pub fn get(&self, session_id: &str) -> Option<&RegisteredSession<I>> {
        self.sessions.get(session_id)
    }

    /// Mutable session lookup.
    pub fn get_mut(&mut self, session_id: &str) -> Option<&mut RegisteredSession<I>> {
        self.sessions.get_mut(session_id)
    }

    /// Candidate session ids an acceptor bound to `port` could route an
    /// inbound Logon to, to be narrowed by matching `SenderCompID`/
    /// `TargetCompID`.
    pub fn acceptor_candidates(&self, port: u16) -> &[String] {
        self.acceptor_candidates.get(&port).map_or(&[], Vec::as_slice)
    }

    /// Resolves an inbound Logon to one of this port's candidate sessions by
    /// matching the peer's `SenderCompID` against our configured
    /// `target_comp_id` and the peer's `TargetCompID` against our
    /// `sender_comp_id`.
    pub fn resolve_acceptor(
        &self,
        port: u16,
        peer_sender_comp_id: &str,
        peer_target_comp_id: &str,
    ) -> Option<&str> {
        self.acceptor_candidates(port).iter().find(|id| {
            self.sessions.get(id.as_str()).is_some_and(|registered| {
                registered.config.target_comp_id == peer_sender_comp_id
                    && registered.config.sender_comp_id == peer_target_comp_id
            })
        }).map(String::as_str)
    }

    /// All session ids, in an unspecified order.
    pub fn session_ids(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    /// Total number of managed sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
