//! C7 — the FIX session state machine.
//!
//! An action-pattern state machine: a pure state machine, generic over
//! [`crate::env::Environment`] and its `Instant`, that takes time as an
//! explicit parameter and returns [`SessionAction`]s for a driver to
//! execute. No socket, no clock reads, no log store access — those live in
//! `fix-engine`.
//!
//! Gap/resend/PossDup handling follows the session-recovery logic of the
//! ForgeFIX reference implementation (`other_examples/.../forgefix-src-fix.rs.rs`,
//! `handle_msg`/`resend_messages`/`build_gap_fill_msg`/`to_poss_dup_flag`),
//! restructured into this sans-IO style rather than its async loop.

use std::{
    cmp::Ordering,
    ops::Sub,
    time::{Duration, Instant},
};

use bytes::Bytes;
use fix_proto::{AdminMsgType, FixMessageView, OutgoingBuilder};

use crate::error::SessionError;

/// Who initiates the Logon handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    /// This side sends the first Logon.
    Initiator,
    /// This side waits for the peer's Logon and mirrors it.
    Acceptor,
}

/// Static session identity and timing configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// `BeginString` (tag 8), e.g. `"FIX.4.4"`.
    pub begin_string: String,
    /// This side's `SenderCompID` (tag 49 on outgoing messages).
    pub sender_comp_id: String,
    /// This side's `TargetCompID` (tag 56 on outgoing messages).
    pub target_comp_id: String,
    /// Initiator or acceptor.
    pub role: SessionRole,
    /// Heartbeat interval, sent as `HeartBtInt` (tag 108) in Logon.
    pub heartbeat_interval: Duration,
}

/// Session lifecycle state, per spec §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No channel attached.
    Disconnected,
    /// Channel attached, Logon not yet exchanged.
    Connected,
    /// This side sent Logon, awaiting the peer's reply.
    LogonSent,
    /// The peer's Logon was received, awaiting our reply to be sent.
    LogonReceived,
    /// Both sides have exchanged Logon.
    LoggedOn,
    /// This side sent Logout, awaiting the peer's Logout.
    LogoutSent,
    /// The peer's Logout was received, our reply not yet sent.
    LogoutReceived,
}

impl SessionState {
    /// True for any state with an attached channel, per spec §4.7's
    /// `isConnected` predicate.
    #[must_use]
    pub fn is_connected(self) -> bool {
        !matches!(self, Self::Disconnected)
    }

    /// True only in [`SessionState::LoggedOn`], per spec §4.7's
    /// `isLoggedOn` predicate.
    #[must_use]
    pub fn is_logged_on(self) -> bool {
        matches!(self, Self::LoggedOn)
    }
}

/// Actions returned by the session state machine for a driver to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Send these bytes (a complete, checksummed frame) to the peer.
    Send(Bytes),
    /// Tear down the channel with this reason.
    Disconnect {
        /// Human-readable disconnect reason.
        reason: String,
    },
    /// Ask the driver to fetch log entries in `[begin_seq_no, end_seq_no]`
    /// (`end_seq_no == 0` means "to infinity") and call
    /// [`plan_resend`] to decide what to replay.
    RequestReplay {
        /// First requested sequence number, inclusive.
        begin_seq_no: u64,
        /// Last requested sequence number, inclusive; 0 means open-ended.
        end_seq_no: u64,
    },
    /// Sequence counters were reset for end-of-day; the driver should log
    /// this transition.
    EndOfDay {
        /// Outgoing sequence number before the reset.
        prior_outgoing_seq: u64,
        /// Expected incoming sequence number before the reset.
        prior_expected_incoming: u64,
    },
}

/// Outcome of checking an inbound `MsgSeqNum` against the expected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeqCheck {
    Accept,
    Gap,
    Duplicate,
    TooLowFatal,
}

/// The FIX session state machine: pure, I/O-free, generic over the
/// injected clock's `Instant` type.
#[derive(Debug, Clone)]
pub struct Session<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    state: SessionState,
    config: SessionConfig,
    builder: OutgoingBuilder,
    outgoing_seq: u64,
    expected_incoming: u64,
    last_send: I,
    last_recv: I,
    pending_test_req_id: Option<String>,
}

impl<I> Session<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Creates a new session in [`SessionState::Disconnected`], both
    /// sequence counters starting at 1.
    #[must_use]
    pub fn new(now: I, config: SessionConfig) -> Self {
        let builder =
            OutgoingBuilder::new(&config.begin_string, &config.sender_comp_id, &config.target_comp_id);
        Self {
            state: SessionState::Disconnected,
            config,
            builder,
            outgoing_seq: 1,
            expected_incoming: 1,
            last_send: now,
            last_recv: now,
            pending_test_req_id: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Next outgoing `MsgSeqNum` to be assigned.
    #[must_use]
    pub fn outgoing_seq(&self) -> u64 {
        self.outgoing_seq
    }

    /// Next incoming `MsgSeqNum` expected.
    #[must_use]
    pub fn expected_incoming(&self) -> u64 {
        self.expected_incoming
    }

    /// Overrides the outgoing sequence number (admin operation, spec §6).
    pub fn set_outgoing_seq_num(&mut self, seq: u64) {
        self.outgoing_seq = seq;
    }

    /// Overrides the expected incoming sequence number (admin operation,
    /// spec §6).
    pub fn set_expected_incoming_seq_num(&mut self, seq: u64) {
        self.expected_incoming = seq;
    }

    /// Attaches a channel, transitioning out of [`SessionState::Disconnected`].
    pub fn connect(&mut self, now: I) {
        self.state = SessionState::Connected;
        self.last_send = now;
        self.last_recv = now;
    }

    /// Unconditionally tears the session down, regardless of current state.
    pub fn disconnect(&mut self) {
        self.state = SessionState::Disconnected;
    }

    /// Resets both sequence counters to 1 for end-of-day, per spec §4.7.
    /// Returns the prior counters so the caller can log them.
    pub fn apply_eod_reset(&mut self) -> (u64, u64) {
        let prior = (self.outgoing_seq, self.expected_incoming);
        self.outgoing_seq = 1;
        self.expected_incoming = 1;
        prior
    }

    fn emit(
        &mut self,
        msg_type: &str,
        fields: &[(u32, &[u8])],
        now: I,
        epoch_millis: i64,
    ) -> Result<SessionAction, SessionError> {
        self.builder.reset();
        self.builder.set_msg_type(msg_type)?;
        for (tag, value) in fields {
            self.builder.set_field(*tag, value)?;
        }
        let frame = self.builder.prepare_for_send(self.outgoing_seq, epoch_millis)?;
        self.outgoing_seq += 1;
        self.last_send = now;
        Ok(SessionAction::Send(frame))
    }

    /// Sends the initiating Logon (tag 98 EncryptMethod=0, tag 108
    /// HeartBtInt, optional tag 141 ResetSeqNumFlag).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Protocol`] if not in
    /// [`SessionState::Connected`].
    pub fn send_logon(
        &mut self,
        reset_seq_num: bool,
        now: I,
        epoch_millis: i64,
    ) -> Result<Vec<SessionAction>, SessionError> {
        if self.state != SessionState::Connected {
            return Err(SessionError::Protocol(format!("send_logon in state {:?}", self.state)));
        }
        if reset_seq_num {
            self.outgoing_seq = 1;
        }
        let heartbeat_secs = self.config.heartbeat_interval.as_secs().to_string();
        let mut fields: Vec<(u32, &[u8])> = vec![(98, b"0"), (108, heartbeat_secs.as_bytes())];
        if reset_seq_num {
            fields.push((141, b"Y"));
        }
        let action = self.emit("A", &fields, now, epoch_millis)?;
        self.state = SessionState::LogonSent;
        Ok(vec![action])
    }

    /// Processes one fully-framed, already-checksum-validated inbound
    /// message.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Protocol`] if required fields are missing,
    /// or propagates [`SessionError::Proto`] from frame construction.
    pub fn handle_frame(
        &mut self,
        view: &FixMessageView<'_>,
        now: I,
        epoch_millis: i64,
    ) -> Result<Vec<SessionAction>, SessionError> {
        self.last_recv = now;

        let msg_type = view
            .msg_type()
            .ok_or_else(|| SessionError::Protocol("missing MsgType".to_string()))?
            .to_string();
        let seq = view
            .seq_num()
            .ok_or_else(|| SessionError::Protocol("missing MsgSeqNum".to_string()))?
            .max(0) as u64;

        if msg_type == AdminMsgType::SequenceReset.as_str() {
            return self.handle_sequence_reset(view, now, epoch_millis);
        }

        match self.check_sequence(seq, view.poss_dup()) {
            SeqCheck::Accept => {}
            SeqCheck::Duplicate => return Ok(vec![]),
            SeqCheck::Gap => {
                let action = self.build_resend_request(self.expected_incoming, 0, now, epoch_millis)?;
                return Ok(vec![action]);
            },
            SeqCheck::TooLowFatal => {
                self.state = SessionState::Disconnected;
                return Err(SessionError::SequenceTooLow { expected: self.expected_incoming, got: seq });
            },
        }
        self.expected_incoming += 1;

        let Some(admin) = AdminMsgType::from_str(&msg_type) else {
            // Application message: sequencing already advanced; delivery to
            // business logic is out of scope for the session layer.
            return Ok(vec![]);
        };

        match admin {
            AdminMsgType::Logon => self.handle_logon(now, epoch_millis),
            AdminMsgType::Logout => self.handle_logout(now, epoch_millis),
            AdminMsgType::Heartbeat => {
                let clears_pending = match (view.raw(112), &self.pending_test_req_id) {
                    (Some(id), Some(pending)) => id == pending.as_str(),
                    _ => true,
                };
                if clears_pending {
                    self.pending_test_req_id = None;
                }
                Ok(vec![])
            },
            AdminMsgType::TestRequest => self.handle_test_request(view, now, epoch_millis),
            AdminMsgType::ResendRequest => self.handle_resend_request(view, now, epoch_millis),
            AdminMsgType::Reject => Ok(vec![]),
            AdminMsgType::SequenceReset => unreachable!("handled above"),
        }
    }

    fn check_sequence(&self, seq: u64, poss_dup: bool) -> SeqCheck {
        match seq.cmp(&self.expected_incoming) {
            Ordering::Equal => SeqCheck::Accept,
            Ordering::Greater => SeqCheck::Gap,
            Ordering::Less => {
                if poss_dup {
                    SeqCheck::Duplicate
                } else {
                    SeqCheck::TooLowFatal
                }
            },
        }
    }

    fn handle_logon(&mut self, now: I, epoch_millis: i64) -> Result<Vec<SessionAction>, SessionError> {
        match self.state {
            SessionState::Connected => {
                // Acceptor: mirror the peer's Logon.
                let heartbeat_secs = self.config.heartbeat_interval.as_secs().to_string();
                let action = self.emit("A", &[(98, b"0"), (108, heartbeat_secs.as_bytes())], now, epoch_millis)?;
                self.state = SessionState::LoggedOn;
                Ok(vec![action])
            },
            SessionState::LogonSent => {
                self.state = SessionState::LoggedOn;
                Ok(vec![])
            },
            other => Err(SessionError::Protocol(format!("unexpected Logon in state {other:?}"))),
        }
    }

    /// Sends a cooperative Logout and waits for the peer's reply.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Protocol`] if not currently logged on.
    pub fn send_logout(&mut self, now: I, epoch_millis: i64) -> Result<Vec<SessionAction>, SessionError> {
        if self.state != SessionState::LoggedOn {
            return Err(SessionError::Protocol(format!("send_logout in state {:?}", self.state)));
        }
        let action = self.emit("5", &[], now, epoch_millis)?;
        self.state = SessionState::LogoutSent;
        Ok(vec![action])
    }

    fn handle_logout(&mut self, now: I, epoch_millis: i64) -> Result<Vec<SessionAction>, SessionError> {
        match self.state {
            SessionState::LogoutSent => {
                self.state = SessionState::Disconnected;
                Ok(vec![SessionAction::Disconnect { reason: "logout acknowledged".to_string() }])
            },
            _ => {
                self.state = SessionState::LogoutReceived;
                let reply = self.emit("5", &[], now, epoch_millis)?;
                self.state = SessionState::Disconnected;
                Ok(vec![reply, SessionAction::Disconnect { reason: "peer logout".to_string() }])
            },
        }
    }

    fn handle_test_request(
        &mut self,
        view: &FixMessageView<'_>,
        now: I,
        epoch_millis: i64,
    ) -> Result<Vec<SessionAction>, SessionError> {
        let test_req_id = view.raw(112).map(|s| s.to_string()).unwrap_or_default();
        let action = self.emit("0", &[(112, test_req_id.as_bytes())], now, epoch_millis)?;
        Ok(vec![action])
    }

    fn handle_resend_request(
        &mut self,
        view: &FixMessageView<'_>,
        _now: I,
        _epoch_millis: i64,
    ) -> Result<Vec<SessionAction>, SessionError> {
        let begin_seq_no = view.int(7).unwrap_or(1).max(1) as u64;
        let end_seq_no = view.int(16).unwrap_or(0).max(0) as u64;
        Ok(vec![SessionAction::RequestReplay { begin_seq_no, end_seq_no }])
    }

    fn handle_sequence_reset(
        &mut self,
        view: &FixMessageView<'_>,
        _now: I,
        _epoch_millis: i64,
    ) -> Result<Vec<SessionAction>, SessionError> {
        let new_seq_no = view
            .new_seq_no()
            .ok_or_else(|| SessionError::Protocol("SequenceReset missing NewSeqNo".to_string()))?
            .max(0) as u64;

        if view.gap_fill() {
            if new_seq_no > self.expected_incoming {
                self.expected_incoming = new_seq_no;
                Ok(vec![])
            } else {
                Err(SessionError::Protocol(format!(
                    "gap-fill NewSeqNo {new_seq_no} does not advance past {}",
                    self.expected_incoming
                )))
            }
        } else {
            // Reset-mode SequenceReset: unconditional, even backwards.
            self.expected_incoming = new_seq_no;
            Ok(vec![])
        }
    }

    fn build_resend_request(
        &mut self,
        begin_seq_no: u64,
        end_seq_no: u64,
        now: I,
        epoch_millis: i64,
    ) -> Result<SessionAction, SessionError> {
        let begin = begin_seq_no.to_string();
        let end = end_seq_no.to_string();
        self.emit("2", &[(7, begin.as_bytes()), (16, end.as_bytes())], now, epoch_millis)
    }

    /// Builds a gap-fill `SequenceReset` (35=4, 123=Y) advancing the peer's
    /// view of our outgoing sequence to `new_seq_no` without actually
    /// resending the admin messages in between — see [`plan_resend`].
    ///
    /// # Errors
    ///
    /// Propagates [`SessionError::Proto`] from frame construction.
    pub fn build_gap_fill(&mut self, new_seq_no: u64, now: I, epoch_millis: i64) -> Result<SessionAction, SessionError> {
        let new_seq_no_str = new_seq_no.to_string();
        self.emit("4", &[(123, b"Y"), (36, new_seq_no_str.as_bytes())], now, epoch_millis)
    }

    /// Periodic maintenance: heartbeat emission, test-request escalation,
    /// and idle-timeout disconnect, per spec §4.7.
    pub fn tick<E>(&mut self, env: &E, now: I, epoch_millis: i64) -> Vec<SessionAction>
    where
        E: crate::env::Environment<Instant = I>,
    {
        if !self.state.is_logged_on() {
            return Vec::new();
        }
        let mut actions = Vec::new();
        let interval = self.config.heartbeat_interval;

        let since_recv = now - self.last_recv;
        if since_recv >= interval * 2 {
            self.state = SessionState::Disconnected;
            return vec![SessionAction::Disconnect { reason: "heartbeat timeout".to_string() }];
        }

        if since_recv >= interval + interval / 5 && self.pending_test_req_id.is_none() {
            let test_req_id = format!("TEST{:016X}", env.random_u64());
            self.pending_test_req_id = Some(test_req_id.clone());
            if let Ok(action) = self.emit("1", &[(112, test_req_id.as_bytes())], now, epoch_millis) {
                actions.push(action);
            }
        }

        let since_send = now - self.last_send;
        if since_send >= interval {
            if let Ok(action) = self.emit("0", &[], now, epoch_millis) {
                actions.push(action);
            }
        }

        actions
    }
}

/// One decision in a resend plan: either replay a stored message verbatim,
/// or collapse a run of admin messages into a single gap-fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendItem {
    /// Replay the stored message at this sequence number, with
    /// `PossDupFlag=Y`.
    Replay(u64),
    /// Send a gap-fill `SequenceReset` covering `[begin_seq_no, new_seq_no)`.
    GapFill {
        /// First sequence number covered by the gap.
        begin_seq_no: u64,
        /// The `NewSeqNo` to advance the peer to.
        new_seq_no: u64,
    },
}

/// Metadata the driver reads from the log store for one stored outbound
/// message, sufficient for [`plan_resend`] to decide whether it needs a
/// verbatim replay or can be folded into a gap-fill run.
#[derive(Debug, Clone, Copy)]
pub struct ResendEntryMeta {
    /// The message's original `MsgSeqNum`.
    pub seq_num: u64,
    /// True if the message is an admin/session-level message (eligible for
    /// gap-fill collapsing rather than verbatim replay).
    pub is_admin: bool,
}

/// Collapses consecutive admin-message runs in `entries` into single
/// gap-fill items, per spec §4.7: "Admin messages in the range are
/// replaced by a single SequenceReset-GapFill to the next application
/// message's seq." `end_seq_no_exclusive` is used as the gap-fill target
/// when a trailing admin run has no following application message.
#[must_use]
pub fn plan_resend(entries: &[ResendEntryMeta], end_seq_no_exclusive: u64) -> Vec<ResendItem> {
    let mut items = Vec::new();
    let mut i = 0;
    while i < entries.len() {
        if entries[i].is_admin {
            let begin_seq_no = entries[i].seq_num;
            let mut j = i;
            while j < entries.len() && entries[j].is_admin {
                j += 1;
            }
            let new_seq_no = entries.get(j).map_or(end_seq_no_exclusive, |e| e.seq_num);
            items.push(ResendItem::GapFill { begin_seq_no, new_seq_no });
            i = j;
        } else {
            items.push(ResendItem::Replay(entries[i].seq_num));
            i += 1;
        }
    }
    items
}
