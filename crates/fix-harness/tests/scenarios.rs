//! End-to-end scenarios: minimal logon, gap-and-fill recovery, checksum
//! corruption rejection, end-of-day reset, an overnight FX trading window,
//! and a build/parse round trip.

use chrono::TimeZone;
use chrono_tz::Tz;
use fix_core::scheduler::{Schedule, ScheduleEvent, ScheduleTracker, TimeWindow};
use fix_core::session::{SessionRole, SessionState};
use fix_engine::{Direction, LogStore, SessionConfig};
use fix_harness::{SimDriver, SimEnv};
use fix_proto::{FixMessageView, FrameScanner, OutgoingBuilder, ProtoError};

const EPOCH: i64 = 1_700_000_000_000;

fn session_config(session_id: &str, role: SessionRole) -> SessionConfig {
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
        persistence_path: "/tmp/fix-harness-scenarios".into(),
        max_log_file_size: 1024,
    }
}

/// Builds a frame as if sent by the counterparty: `sender`/`target` are
/// swapped relative to our own session config (our target is their
/// sender, and vice versa).
fn peer_frame(msg_type: &str, fields: &[(u32, &[u8])], seq: u64) -> Vec<u8> {
    let mut builder = OutgoingBuilder::new("FIX.4.4", "EU", "US");
    builder.set_msg_type(msg_type).unwrap();
    for (tag, value) in fields {
        builder.set_field(*tag, value).unwrap();
    }
    builder.prepare_for_send(seq, EPOCH).unwrap().to_vec()
}

fn frame_text(frame: &[u8]) -> String {
    String::from_utf8(frame.to_vec()).unwrap()
}

#[tokio::test]
async fn minimal_logon_round_trip() {
    let mut sim = SimDriver::new(SimEnv::with_seed(1));
    sim.create_session(session_config("S1", SessionRole::Initiator)).unwrap();

    let frames = sim.connect("S1").await.unwrap();
    assert_eq!(frames.len(), 1);
    assert!(frame_text(&frames[0]).contains("35=A"));
    assert_eq!(sim.session_state("S1"), Some(SessionState::LogonSent));

    let logon_reply = peer_frame("A", &[(98, b"0"), (108, b"30")], 1);
    let frames = sim.inject_frame("S1", &logon_reply).await.unwrap();
    assert!(frames.is_empty(), "initiator sends nothing further on a matching Logon reply");
    assert_eq!(sim.session_state("S1"), Some(SessionState::LoggedOn));
    assert_eq!(sim.expected_incoming_seq("S1"), Some(2));
}

#[tokio::test]
async fn gap_detected_and_filled() {
    let mut sim = SimDriver::new(SimEnv::with_seed(2));
    sim.create_session(session_config("S1", SessionRole::Initiator)).unwrap();
    sim.connect("S1").await.unwrap();
    sim.inject_frame("S1", &peer_frame("A", &[(98, b"0"), (108, b"30")], 1)).await.unwrap();
    assert_eq!(sim.expected_incoming_seq("S1"), Some(2));

    // Peer jumps straight to seq 5: we expect 2, this is a gap.
    let jumped = peer_frame("0", &[], 5);
    let frames = sim.inject_frame("S1", &jumped).await.unwrap();
    assert_eq!(frames.len(), 1);
    assert!(frame_text(&frames[0]).contains("35=2"), "a gap produces a ResendRequest");
    assert!(frame_text(&frames[0]).contains("\u{1}7=2\u{1}"), "ResendRequest begins replay at the expected seq");
    assert_eq!(sim.expected_incoming_seq("S1"), Some(2), "gap doesn't advance the counter");

    // Peer fills the gap with a gap-fill SequenceReset instead of resending.
    let gap_fill = peer_frame("4", &[(123, b"Y"), (36, b"00000005")], 2);
    let frames = sim.inject_frame("S1", &gap_fill).await.unwrap();
    assert!(frames.is_empty());
    assert_eq!(sim.expected_incoming_seq("S1"), Some(5));

    // Normal traffic resumes at seq 5.
    let resumed = peer_frame("0", &[], 5);
    sim.inject_frame("S1", &resumed).await.unwrap();
    assert_eq!(sim.expected_incoming_seq("S1"), Some(6));
}

#[test]
fn checksum_corruption_is_rejected_before_reaching_the_session() {
    let frame = peer_frame("0", &[], 1);
    let mut corrupted = frame.clone();
    let soh_positions: Vec<usize> =
        corrupted.iter().enumerate().filter(|(_, &b)| b == 0x01).map(|(i, _)| i).collect();
    let last_soh = *soh_positions.last().unwrap();
    // Flip a digit inside the checksum field (`10=NNN`).
    let digit_pos = last_soh - 1;
    corrupted[digit_pos] = if corrupted[digit_pos] == b'0' { b'1' } else { b'0' };

    let mut scanner = FrameScanner::new();
    scanner.add_data(&corrupted);
    let err = scanner.try_read_frame().unwrap_err();
    assert!(matches!(err, ProtoError::ChecksumMismatch { .. }));
}

#[tokio::test]
async fn eod_resets_sequence_numbers() {
    let mut sim = SimDriver::new(SimEnv::with_seed(3));
    sim.create_session(session_config("S1", SessionRole::Initiator)).unwrap();
    sim.connect("S1").await.unwrap();
    sim.inject_frame("S1", &peer_frame("A", &[(98, b"0"), (108, b"30")], 1)).await.unwrap();
    sim.inject_frame("S1", &peer_frame("0", &[], 2)).await.unwrap();
    assert_eq!(sim.expected_incoming_seq("S1"), Some(3));
    assert_eq!(sim.outgoing_seq("S1"), Some(2));

    let actions = sim.trigger_eod("S1").await.unwrap();
    assert!(actions.is_empty(), "EOD doesn't itself send a frame");
    assert_eq!(sim.outgoing_seq("S1"), Some(1));
    assert_eq!(sim.expected_incoming_seq("S1"), Some(1));

    let count = sim.driver_mut().log_store().entry_count(Some("S1")).await.unwrap();
    assert!(count >= 1, "the EOD reset is persisted");
    let latest = sim.driver_mut().log_store().latest("S1", Direction::Outbound).await.unwrap();
    assert_eq!(latest.unwrap().direction, Direction::Outbound);
}

#[test]
fn overnight_fx_window_spans_midnight() {
    let tz: Tz = "America/New_York".parse().unwrap();
    let mut days = std::collections::HashSet::new();
    for day in [
        chrono::Weekday::Sun,
        chrono::Weekday::Mon,
        chrono::Weekday::Tue,
        chrono::Weekday::Wed,
        chrono::Weekday::Thu,
    ] {
        days.insert(day);
    }

    let schedule = Schedule {
        timezone: tz,
        windows: vec![TimeWindow {
            days,
            start_time: chrono::NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            end_time: chrono::NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            overnight: true,
        }],
        reset: None,
        warning_minutes_before: 0,
        enabled: true,
    };

    // Sunday 18:00 local: inside the window (just opened).
    let sunday_evening = tz.with_ymd_and_hms(2024, 1, 7, 18, 0, 0).unwrap();
    assert!(schedule.should_be_active(sunday_evening));

    // Monday 03:00 local: still inside, carried over from Sunday's start day.
    let monday_early = tz.with_ymd_and_hms(2024, 1, 8, 3, 0, 0).unwrap();
    assert!(schedule.should_be_active(monday_early));

    // Saturday noon local: outside any window (FX market closed for the week).
    let saturday_noon = tz.with_ymd_and_hms(2024, 1, 13, 12, 0, 0).unwrap();
    assert!(!schedule.should_be_active(saturday_noon));

    let mut tracker = ScheduleTracker::default();
    let events = tracker.tick(&schedule, sunday_evening.with_timezone(&chrono::Utc));
    assert_eq!(events, vec![ScheduleEvent::SessionStart]);
}

#[test]
fn build_then_parse_round_trip_preserves_fields() {
    let mut builder = OutgoingBuilder::new("FIX.4.4", "US", "EU");
    builder.set_msg_type("D").unwrap();
    builder.set_field(11, b"ORDER-1").unwrap();
    builder.set_field(55, b"EUR/USD").unwrap();
    builder.set_field(54, b"1").unwrap();
    let frame = builder.prepare_for_send(7, EPOCH).unwrap();

    let mut scanner = FrameScanner::new();
    scanner.add_data(&frame);
    let scanned = scanner.try_read_frame().unwrap().unwrap();
    assert_eq!(scanned.as_ref(), frame.as_ref());

    let view = FixMessageView::wrap(&scanned).unwrap();
    assert_eq!(view.msg_type().unwrap(), "D");
    assert_eq!(view.seq_num(), Some(7));
    assert_eq!(view.sender_comp_id().unwrap(), "US");
    assert_eq!(view.target_comp_id().unwrap(), "EU");
    assert_eq!(view.raw(11).unwrap(), "ORDER-1");
    assert_eq!(view.raw(55).unwrap(), "EUR/USD");
}
