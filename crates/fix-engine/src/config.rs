//! Session and engine configuration, deserialized from whatever format the
//! host process chooses (the engine itself ships no file-format parser —
//! these structs are `serde::Deserialize` so a caller can feed them from
//! TOML, JSON, or environment variables as it sees fit).

use std::path::PathBuf;

use chrono_tz::Tz;
use fix_core::session::SessionRole;
use serde::Deserialize;

fn default_channel_capacity() -> usize {
    4096
}

fn default_max_log_file_size() -> u64 {
    64 * 1024 * 1024
}

/// One FIX session's recognized configuration, per spec.md §6.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Unique identifier for this session within the engine.
    pub session_id: String,
    /// Our `SenderCompID`.
    pub sender_comp_id: String,
    /// Counterparty's `TargetCompID`.
    pub target_comp_id: String,
    /// `BeginString`, e.g. `"FIX.4.4"`.
    pub begin_string: String,
    /// Whether this session initiates (dials out) or accepts (listens).
    pub role: SessionRole,
    /// Counterparty host, required for `Initiator` sessions.
    pub host: Option<String>,
    /// Counterparty port for `Initiator`, or the bind port for `Acceptor`.
    pub port: u16,
    /// `HeartBtInt` in seconds.
    pub heartbeat_interval_secs: u64,
    /// IANA timezone the session's schedule windows are expressed in.
    #[serde(default)]
    pub timezone: Option<Tz>,
    /// Optional named schedule window start (`HH:MM:SS`).
    pub start_time: Option<String>,
    /// Optional named schedule window end (`HH:MM:SS`).
    pub end_time: Option<String>,
    /// Optional end-of-day reset time (`HH:MM:SS`), in `timezone`.
    pub eod_time: Option<String>,
    /// Whether EOD resets both sequence counters to 1.
    #[serde(default)]
    pub reset_on_eod: bool,
    /// Name of the schedule this session is bound to, if any.
    pub scheduler: Option<String>,
    /// Directory this session's log store lives under.
    pub persistence_path: PathBuf,
    /// Segment rotation threshold in bytes.
    #[serde(default = "default_max_log_file_size")]
    pub max_log_file_size: u64,
}

/// Top-level engine configuration: transport/runtime knobs plus the set of
/// sessions to manage.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Sessions this engine instance owns.
    pub sessions: Vec<SessionConfig>,
    /// Period between `EngineEvent::TickHeartbeat` events, in seconds.
    #[serde(default = "default_heartbeat_tick_secs")]
    pub heartbeat_tick_secs: u64,
    /// Period between `EngineEvent::TickSchedule` events, in seconds.
    #[serde(default = "default_schedule_tick_secs")]
    pub schedule_tick_secs: u64,
    /// Period between `EngineEvent::TickEod` events, in seconds.
    #[serde(default = "default_eod_tick_secs")]
    pub eod_tick_secs: u64,
    /// Bounded channel capacity between the transport layer and the engine
    /// driver for each accepted connection.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_heartbeat_tick_secs() -> u64 {
    1
}

fn default_schedule_tick_secs() -> u64 {
    1
}

fn default_eod_tick_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_config_deserializes_from_toml() {
        let toml = r#"
            session_id = "NYSE1"
            sender_comp_id = "US"
            target_comp_id = "NYSE"
            begin_string = "FIX.4.4"
            role = "initiator"
            host = "fix.nyse.example"
            port = 9001
            heartbeat_interval_secs = 30
            persistence_path = "/var/lib/fix-engine/nyse1"
        "#;
        let config: SessionConfig = toml::from_str(toml).expect("valid config");
        assert_eq!(config.session_id, "NYSE1");
        assert_eq!(config.max_log_file_size, default_max_log_file_size());
        assert!(!config.reset_on_eod);
    }
}
