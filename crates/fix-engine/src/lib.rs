//! FIX/OUCH engine production runtime.
//!
//! Production "glue" wrapping [`EngineDriver`]'s action-based logic with
//! real I/O. The driver follows the Sans-IO pattern (see `fix-core`), while
//! [`Engine`] executes its actions over `tokio::net::TcpStream` connections
//! and a [`LogStore`] persistence backend.
//!
//! # Components
//!
//! - [`EngineDriver`]: action-based orchestrator (pure logic, no I/O)
//! - [`Engine`]: production runtime that dials/accepts TCP connections,
//!   drives the scheduled heartbeat/schedule/EOD ticks, and executes
//!   [`EngineAction`]s
//! - [`FixListener`]/[`FixConnection`]: TCP transport
//! - [`SystemEnv`]: production environment (real time, crypto RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod driver;
mod error;
mod log_store;
mod registry;
mod system_env;
mod transport;

use std::collections::HashMap;
use std::sync::Arc;

pub use config::{EngineConfig, SessionConfig};
pub use driver::{EngineAction, EngineDriver, EngineEvent, LogLevel};
pub use error::{EngineError, SessionId};
use fix_core::session::SessionRole;
use fix_proto::{FixMessageView, FrameScanner};
pub use log_store::{
    Direction, FileLogStore, FileLogStoreConfig, LogEntry, LogStore, LogStoreError, MemoryLogStore,
    Tailer,
};
pub use registry::{RegisteredSession, SessionRegistry};
pub use system_env::SystemEnv;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, RwLock};
pub use transport::{FixConnection, FixListener};

/// Live TCP write halves and the log store, shared across every
/// connection task so [`EngineAction::Send`]/[`EngineAction::Persist`] can
/// reach the right socket or stream without re-locking the driver.
struct SharedState<L: LogStore> {
    writers: RwLock<HashMap<String, Mutex<OwnedWriteHalf>>>,
    log_store: L,
}

impl<L: LogStore> SharedState<L> {
    fn new(log_store: L) -> Self {
        Self { writers: RwLock::new(HashMap::new()), log_store }
    }

    async fn attach(&self, session_id: &str, writer: OwnedWriteHalf) {
        self.writers.write().await.insert(session_id.to_string(), Mutex::new(writer));
    }

    async fn detach(&self, session_id: &str) {
        self.writers.write().await.remove(session_id);
    }
}

/// Production FIX engine: owns the [`EngineDriver`], a TCP listener per
/// configured acceptor port, and a background task per scheduled tick.
pub struct Engine<L: LogStore> {
    driver: Arc<Mutex<EngineDriver<SystemEnv, L>>>,
    shared: Arc<SharedState<L>>,
}

impl<L: LogStore> Engine<L> {
    /// Builds the driver from `config`, registering every session but not
    /// yet connecting or binding anything.
    pub fn new(config: EngineConfig, log_store: L) -> Result<Self, EngineError> {
        let env = SystemEnv::new();
        let mut driver = EngineDriver::new(env, log_store.clone());
        for session in config.sessions {
            driver.create_session(session)?;
        }
        Ok(Self {
            driver: Arc::new(Mutex::new(driver)),
            shared: Arc::new(SharedState::new(log_store)),
        })
    }

    /// Binds every configured acceptor port, dials every configured
    /// initiator session, and spawns the heartbeat/schedule/EOD tick
    /// loops. Runs until the process is killed or a listener errors.
    pub async fn run(self) -> Result<(), EngineError> {
        let ports = { self.driver.lock().await.acceptor_ports() };
        for port in ports {
            let driver = Arc::clone(&self.driver);
            let shared = Arc::clone(&self.shared);
            let bind_addr = format!("0.0.0.0:{port}");
            let listener = FixListener::bind(&bind_addr).await?;
            tracing::info!("listening for FIX sessions on {}", bind_addr);
            tokio::spawn(async move {
                if let Err(e) = accept_loop(port, listener, driver, shared).await {
                    tracing::error!("accept loop on port {} ended: {}", port, e);
                }
            });
        }

        let session_ids = { self.driver.lock().await.session_ids() };
        for session_id in session_ids {
            let is_initiator = {
                let driver = self.driver.lock().await;
                driver
                    .session_config(&session_id)
                    .is_some_and(|c| matches!(c.role, SessionRole::Initiator))
            };
            if is_initiator {
                let driver = Arc::clone(&self.driver);
                let shared = Arc::clone(&self.shared);
                tokio::spawn(async move {
                    if let Err(e) = dial_and_run(session_id.clone(), driver, shared).await {
                        tracing::warn!("initiator session {} ended: {}", session_id, e);
                    }
                });
            }
        }

        run_tick_loops(Arc::clone(&self.driver), Arc::clone(&self.shared)).await
    }
}

async fn dial_and_run<L: LogStore>(
    session_id: String,
    driver: Arc<Mutex<EngineDriver<SystemEnv, L>>>,
    shared: Arc<SharedState<L>>,
) -> Result<(), EngineError> {
    let (host, port) = {
        let driver = driver.lock().await;
        let config = driver
            .session_config(&session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.clone()))?;
        let host = config
            .host
            .clone()
            .ok_or_else(|| EngineError::Configuration(format!("session '{session_id}' has no host")))?;
        (host, config.port)
    };

    let conn = FixConnection::connect(&host, port).await?;
    handle_connection(session_id, conn, driver, shared).await
}

async fn accept_loop<L: LogStore>(
    port: u16,
    listener: FixListener,
    driver: Arc<Mutex<EngineDriver<SystemEnv, L>>>,
    shared: Arc<SharedState<L>>,
) -> Result<(), EngineError> {
    loop {
        let conn = listener.accept().await?;
        let driver = Arc::clone(&driver);
        let shared = Arc::clone(&shared);
        tokio::spawn(async move {
            if let Err(e) = handle_acceptor_connection(port, conn, driver, shared).await {
                tracing::warn!("inbound connection on port {} failed: {}", port, e);
            }
        });
    }
}

async fn handle_acceptor_connection<L: LogStore>(
    port: u16,
    conn: FixConnection,
    driver: Arc<Mutex<EngineDriver<SystemEnv, L>>>,
    shared: Arc<SharedState<L>>,
) -> Result<(), EngineError> {
    let (mut reader, writer) = conn.stream.into_split();
    let mut scanner = FrameScanner::new();
    let mut buf = [0u8; 4096];

    let first_frame = loop {
        if let Some(frame) = scanner.try_read_frame()? {
            break frame;
        }
        let n = read_some(&mut reader, &mut buf).await?;
        scanner.add_data(&buf[..n]);
    };

    let view = FixMessageView::wrap(&first_frame)?;
    let peer_sender = view.sender_comp_id().map(|s| s.to_string()).unwrap_or_default();
    let peer_target = view.target_comp_id().map(|s| s.to_string()).unwrap_or_default();

    let session_id = {
        let driver = driver.lock().await;
        driver.resolve_acceptor(port, &peer_sender, &peer_target)
    };
    let Some(session_id) = session_id else {
        tracing::warn!(
            "no session on port {} matches SenderCompID={} TargetCompID={}",
            port,
            peer_sender,
            peer_target
        );
        return Ok(());
    };

    shared.attach(&session_id, writer).await;

    {
        let mut driver = driver.lock().await;
        let actions = driver.process_event(EngineEvent::Connected { session_id: session_id.clone() }).await?;
        execute_actions(&shared, actions).await?;
    }
    {
        let mut driver = driver.lock().await;
        let actions = driver
            .process_event(EngineEvent::FrameReceived {
                session_id: session_id.clone(),
                raw: first_frame.to_vec(),
            })
            .await?;
        execute_actions(&shared, actions).await?;
    }

    read_frames_until_closed(session_id, reader, scanner, buf, driver, shared).await
}

async fn handle_connection<L: LogStore>(
    session_id: String,
    conn: FixConnection,
    driver: Arc<Mutex<EngineDriver<SystemEnv, L>>>,
    shared: Arc<SharedState<L>>,
) -> Result<(), EngineError> {
    let (reader, writer) = conn.stream.into_split();
    shared.attach(&session_id, writer).await;

    {
        let mut driver = driver.lock().await;
        let actions = driver.process_event(EngineEvent::Connected { session_id: session_id.clone() }).await?;
        execute_actions(&shared, actions).await?;
    }

    let scanner = FrameScanner::new();
    let buf = [0u8; 4096];
    read_frames_until_closed(session_id, reader, scanner, buf, driver, shared).await
}

async fn read_some(reader: &mut OwnedReadHalf, buf: &mut [u8]) -> Result<usize, EngineError> {
    let n = reader.read(buf).await?;
    if n == 0 {
        return Err(EngineError::Transport(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed",
        )));
    }
    Ok(n)
}

async fn read_frames_until_closed<L: LogStore>(
    session_id: String,
    mut reader: OwnedReadHalf,
    mut scanner: FrameScanner,
    mut buf: [u8; 4096],
    driver: Arc<Mutex<EngineDriver<SystemEnv, L>>>,
    shared: Arc<SharedState<L>>,
) -> Result<(), EngineError> {
    let close_reason = loop {
        match read_some(&mut reader, &mut buf).await {
            Ok(n) => scanner.add_data(&buf[..n]),
            Err(e) => break e.to_string(),
        }

        loop {
            match scanner.try_read_frame() {
                Ok(Some(raw)) => {
                    let mut driver = driver.lock().await;
                    match driver
                        .process_event(EngineEvent::FrameReceived {
                            session_id: session_id.clone(),
                            raw: raw.to_vec(),
                        })
                        .await
                    {
                        Ok(actions) => execute_actions(&shared, actions).await?,
                        Err(e) => tracing::warn!("frame processing error for {}: {}", session_id, e),
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("frame scan error for {}: {}", session_id, e);
                    break;
                },
            }
        }
    };

    shared.detach(&session_id).await;
    let mut driver = driver.lock().await;
    let actions = driver
        .process_event(EngineEvent::Disconnected { session_id, reason: close_reason })
        .await?;
    execute_actions(&shared, actions).await?;
    Ok(())
}

async fn run_tick_loops<L: LogStore>(
    driver: Arc<Mutex<EngineDriver<SystemEnv, L>>>,
    shared: Arc<SharedState<L>>,
) -> Result<(), EngineError> {
    let mut heartbeat = tokio::time::interval(EngineDriver::<SystemEnv, L>::HEARTBEAT_TICK);
    let mut schedule = tokio::time::interval(EngineDriver::<SystemEnv, L>::SCHEDULE_TICK);
    let mut eod = tokio::time::interval(EngineDriver::<SystemEnv, L>::EOD_TICK);

    loop {
        let event = tokio::select! {
            _ = heartbeat.tick() => EngineEvent::TickHeartbeat,
            _ = schedule.tick() => EngineEvent::TickSchedule,
            _ = eod.tick() => EngineEvent::TickEod,
        };
        let mut driver = driver.lock().await;
        let actions = driver.process_event(event).await?;
        drop(driver);
        execute_actions(&shared, actions).await?;
    }
}

/// Translates [`EngineAction`]s into real TCP writes, log-store appends,
/// disconnects, and `tracing` calls.
async fn execute_actions<L: LogStore>(
    shared: &SharedState<L>,
    actions: Vec<EngineAction>,
) -> Result<(), EngineError> {
    for action in actions {
        match action {
            EngineAction::Send { session_id, raw } => {
                let writers = shared.writers.read().await;
                if let Some(writer) = writers.get(&session_id) {
                    let mut writer = writer.lock().await;
                    if let Err(e) = writer.write_all(&raw).await {
                        tracing::warn!("write failed for session {}: {}", session_id, e);
                    }
                } else {
                    tracing::warn!("Send: session {} has no attached connection", session_id);
                }
            },
            EngineAction::Disconnect { session_id, reason } => {
                tracing::info!("disconnecting {}: {}", session_id, reason);
                let mut writers = shared.writers.write().await;
                if let Some(writer) = writers.remove(&session_id) {
                    let _ = writer.into_inner().shutdown().await;
                }
            },
            EngineAction::Connect { session_id } => {
                tracing::debug!("session {} requested an outbound connect", session_id);
            },
            EngineAction::Persist { session_id, entry } => {
                if let Err(e) = shared.log_store.append(&session_id, entry).await {
                    tracing::error!("failed to persist entry for {}: {}", session_id, e);
                }
            },
            EngineAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
        }
    }
    Ok(())
}
