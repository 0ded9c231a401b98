//! C6 — per-stream append-only log store.
//!
//! Every inbound/outbound message passing through a session is logged as a
//! [`LogEntry`] under a stream name (typically the session id). The on-disk
//! layout is a big-endian header followed by the raw payload, no separate
//! index file — replay is a forward scan that self-delimits records via the
//! `metadata_len`/`raw_len` fields.
//!
//! [`MemoryLogStore`] backs unit tests and the harness; [`FileLogStore`]
//! batches appends through a channel-fed background task, a `Storage` trait
//! with a `MemoryStorage` plus a persistent backend, following the
//! batching/durability policy of the FIX message-store reference
//! implementation in the wider example pack.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot, Mutex};

/// Fixed header length: `timestamp(8) + direction(1) + seq_num(4) +
/// metadata_len(2) + raw_len(4)`, excluding the variable-length bodies.
const HEADER_LEN: usize = 8 + 1 + 4 + 2 + 4;

/// Errors a [`LogStore`] implementation can raise.
#[derive(Debug, Error)]
pub enum LogStoreError {
    /// Underlying filesystem operation failed.
    #[error("log store I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A segment file contained a truncated or malformed record.
    #[error("corrupt log entry in stream {stream:?} at byte {offset}")]
    Corrupt {
        /// Stream the corrupt segment belongs to.
        stream: String,
        /// Byte offset within the segment file.
        offset: u64,
    },
    /// The background writer task for a [`FileLogStore`] has shut down.
    #[error("log store writer task is no longer running")]
    WriterGone,
}

/// Direction a stored entry travelled relative to this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Received from the counterparty.
    Inbound,
    /// Sent to the counterparty.
    Outbound,
}

impl Direction {
    fn to_byte(self) -> u8 {
        match self {
            Direction::Inbound => 0,
            Direction::Outbound => 1,
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Direction::Inbound),
            1 => Some(Direction::Outbound),
            _ => None,
        }
    }
}

/// One logged message: a FIX/OUCH frame plus its sequencing metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Unix epoch milliseconds when the entry was logged.
    pub timestamp_millis: i64,
    /// Inbound or outbound relative to this engine.
    pub direction: Direction,
    /// FIX `MsgSeqNum`, or 0 for entries without one (e.g. the EOD marker).
    pub seq_num: i32,
    /// Free-form metadata (e.g. `msgType="EOD"` markers carry prior counters here).
    pub metadata: Bytes,
    /// The raw wire bytes of the message.
    pub raw: Bytes,
}

impl LogEntry {
    fn encoded_len(&self) -> usize {
        HEADER_LEN + self.metadata.len() + self.raw.len()
    }

    fn encode(&self, out: &mut BytesMut) {
        out.put_i64(self.timestamp_millis);
        out.put_u8(self.direction.to_byte());
        out.put_i32(self.seq_num);
        out.put_u16(self.metadata.len() as u16);
        out.put_slice(&self.metadata);
        out.put_i32(self.raw.len() as i32);
        out.put_slice(&self.raw);
    }

    /// Decodes one entry from the front of `buf`, advancing it past the
    /// record. Returns `None` if `buf` doesn't yet hold a full record.
    fn decode(buf: &mut Bytes) -> Option<Self> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        let mut peek = buf.clone();
        let timestamp_millis = peek.get_i64();
        let direction = Direction::from_byte(peek.get_u8())?;
        let seq_num = peek.get_i32();
        let metadata_len = peek.get_u16() as usize;
        if peek.len() < metadata_len + 4 {
            return None;
        }
        let metadata = peek.split_to(metadata_len);
        let raw_len = peek.get_i32() as usize;
        if peek.len() < raw_len {
            return None;
        }
        let raw = peek.split_to(raw_len);
        let consumed = buf.len() - peek.len();
        buf.advance(consumed);
        Some(Self { timestamp_millis, direction, seq_num, metadata, raw })
    }
}

/// Filter applied by [`LogStore::replay`].
#[derive(Debug, Clone, Default)]
pub struct ReplayFilter {
    /// Restrict to a single stream; `None` means every stream.
    pub stream: Option<String>,
    /// Restrict to one direction.
    pub direction: Option<Direction>,
    /// Inclusive `MsgSeqNum` range.
    pub seq_range: Option<(i32, i32)>,
    /// Inclusive timestamp range, in epoch millis.
    pub time_range: Option<(i64, i64)>,
    /// Inclusive start offset within each matched stream.
    pub start_offset: Option<u64>,
    /// Exclusive end offset within each matched stream.
    pub end_offset: Option<u64>,
}

impl ReplayFilter {
    fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(direction) = self.direction {
            if entry.direction != direction {
                return false;
            }
        }
        if let Some((lo, hi)) = self.seq_range {
            if entry.seq_num < lo || entry.seq_num > hi {
                return false;
            }
        }
        if let Some((lo, hi)) = self.time_range {
            if entry.timestamp_millis < lo || entry.timestamp_millis > hi {
                return false;
            }
        }
        true
    }

    fn offset_in_range(&self, offset: u64) -> bool {
        if let Some(start) = self.start_offset {
            if offset < start {
                return false;
            }
        }
        if let Some(end) = self.end_offset {
            if offset >= end {
                return false;
            }
        }
        true
    }
}

/// Per-stream append-only log, indexed by a monotonic per-stream offset.
///
/// Appends within a stream are serialized; appends to distinct streams don't
/// contend with each other. Implementations are cheap to clone (internal
/// state is shared).
pub trait LogStore: Clone + Send + Sync + 'static {
    /// Appends `entry` to `stream`, returning the offset it was stored at.
    fn append(
        &self,
        stream: &str,
        entry: LogEntry,
    ) -> impl Future<Output = Result<u64, LogStoreError>> + Send;

    /// Forward-scans entries matching `filter`, invoking `handler(stream,
    /// offset, entry)` for each in stream-local offset order.
    fn replay(
        &self,
        filter: ReplayFilter,
        handler: impl FnMut(&str, u64, &LogEntry) + Send,
    ) -> impl Future<Output = Result<(), LogStoreError>> + Send;

    /// The most recently appended entry for `stream` in the given
    /// `direction`, or `None` if there isn't one.
    fn latest(
        &self,
        stream: &str,
        direction: Direction,
    ) -> impl Future<Output = Result<Option<LogEntry>, LogStoreError>> + Send;

    /// Entry count for `stream`, or the total across all streams if `None`.
    fn entry_count(
        &self,
        stream: Option<&str>,
    ) -> impl Future<Output = Result<u64, LogStoreError>> + Send;

    /// All known stream names, in the order they were first appended to.
    fn list_streams(&self) -> impl Future<Output = Result<Vec<String>, LogStoreError>> + Send;

    /// Creates a tailer over `stream` (or every stream, merged by
    /// timestamp, if `None`), starting at `start_position`.
    fn create_reader(&self, stream: Option<&str>, start_position: u64) -> Tailer<Self>
    where
        Self: Sized,
    {
        Tailer::new(self.clone(), stream.map(str::to_string), start_position)
    }
}

/// A blocking/pollable reader over one stream, or over every stream merged
/// by timestamp (stable on ties by the order streams were first seen).
pub struct Tailer<S: LogStore> {
    store: S,
    stream: Option<String>,
    positions: HashMap<String, u64>,
    start_position: u64,
    closed: bool,
}

impl<S: LogStore> Tailer<S> {
    fn new(store: S, stream: Option<String>, start_position: u64) -> Self {
        let mut positions = HashMap::new();
        if let Some(name) = &stream {
            positions.insert(name.clone(), start_position);
        }
        Self { store, stream, positions, start_position, closed: false }
    }

    /// Whether a subsequent [`Tailer::poll`] would currently have something
    /// to return, without blocking for new data.
    pub async fn has_next(&mut self) -> Result<bool, LogStoreError> {
        if self.closed {
            return Ok(false);
        }
        Ok(self.peek_candidates().await?.is_some())
    }

    /// The current read position. For a merged (`stream=None`) tailer this
    /// is the sum of per-stream positions.
    pub fn position(&self) -> u64 {
        self.positions.values().sum()
    }

    /// Repositions the tailer. Only meaningful for single-stream tailers.
    pub fn seek(&mut self, position: u64) {
        if let Some(name) = &self.stream {
            self.positions.insert(name.clone(), position);
        }
    }

    /// Closes the tailer; subsequent polls return `None`/`Ok(false)`.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Blocks up to `timeout`, returning the next `(stream, entry)` or
    /// `None` if nothing arrived before the deadline.
    pub async fn poll(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<(String, LogEntry)>, LogStoreError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(item) = self.try_next().await? {
                return Ok(Some(item));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(20).min(timeout)).await;
        }
    }

    /// Like [`Tailer::poll`] but collects up to `max` entries once at least
    /// one has arrived (or returns empty on timeout).
    pub async fn poll_batch(
        &mut self,
        max: usize,
        timeout: Duration,
    ) -> Result<Vec<(String, LogEntry)>, LogStoreError> {
        let mut out = Vec::new();
        if max == 0 {
            return Ok(out);
        }
        if let Some(first) = self.poll(timeout).await? {
            out.push(first);
            while out.len() < max {
                match self.try_next().await? {
                    Some(item) => out.push(item),
                    None => break,
                }
            }
        }
        Ok(out)
    }

    async fn try_next(&mut self) -> Result<Option<(String, LogEntry)>, LogStoreError> {
        if self.closed {
            return Ok(None);
        }
        let Some((stream, offset, entry)) = self.peek_candidates().await? else {
            return Ok(None);
        };
        self.positions.insert(stream.clone(), offset + 1);
        Ok(Some((stream, entry)))
    }

    /// Returns the next `(stream, offset, entry)` this tailer would yield,
    /// without advancing its position.
    async fn peek_candidates(&self) -> Result<Option<(String, u64, LogEntry)>, LogStoreError> {
        let streams: Vec<String> = match &self.stream {
            Some(name) => vec![name.clone()],
            None => self.store.list_streams().await?,
        };

        let mut best: Option<(String, u64, LogEntry)> = None;
        for name in streams {
            let position = *self.positions.get(&name).unwrap_or(&self.start_position);
            let mut found = None;
            self.store
                .replay(
                    ReplayFilter {
                        stream: Some(name.clone()),
                        start_offset: Some(position),
                        end_offset: Some(position + 1),
                        ..ReplayFilter::default()
                    },
                    |_, offset, entry| {
                        found = Some((offset, entry.clone()));
                    },
                )
                .await?;
            if let Some((offset, entry)) = found {
                let replace = match &best {
                    None => true,
                    Some((_, _, current)) => entry.timestamp_millis < current.timestamp_millis,
                };
                if replace {
                    best = Some((name, offset, entry));
                }
            }
        }
        Ok(best)
    }
}

/// Synchronous, in-memory [`LogStore`] used by tests and the simulation
/// harness.
#[derive(Clone, Default)]
pub struct MemoryLogStore {
    inner: Arc<Mutex<HashMap<String, Vec<LogEntry>>>>,
    order: Arc<Mutex<Vec<String>>>,
}

impl MemoryLogStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn touch_stream(&self, stream: &str) {
        let mut order = self.order.lock().await;
        if !order.iter().any(|s| s == stream) {
            order.push(stream.to_string());
        }
    }
}

impl LogStore for MemoryLogStore {
    async fn append(&self, stream: &str, entry: LogEntry) -> Result<u64, LogStoreError> {
        self.touch_stream(stream).await;
        let mut inner = self.inner.lock().await;
        let log = inner.entry(stream.to_string()).or_default();
        log.push(entry);
        Ok(log.len() as u64 - 1)
    }

    async fn replay(
        &self,
        filter: ReplayFilter,
        mut handler: impl FnMut(&str, u64, &LogEntry) + Send,
    ) -> Result<(), LogStoreError> {
        let inner = self.inner.lock().await;
        let streams: Vec<&String> = match &filter.stream {
            Some(name) => inner.keys().filter(|k| *k == name).collect(),
            None => inner.keys().collect(),
        };
        for name in streams {
            let Some(log) = inner.get(name) else { continue };
            for (offset, entry) in log.iter().enumerate() {
                let offset = offset as u64;
                if filter.offset_in_range(offset) && filter.matches(entry) {
                    handler(name, offset, entry);
                }
            }
        }
        Ok(())
    }

    async fn latest(
        &self,
        stream: &str,
        direction: Direction,
    ) -> Result<Option<LogEntry>, LogStoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .get(stream)
            .and_then(|log| log.iter().rev().find(|e| e.direction == direction))
            .cloned())
    }

    async fn entry_count(&self, stream: Option<&str>) -> Result<u64, LogStoreError> {
        let inner = self.inner.lock().await;
        let count = match stream {
            Some(name) => inner.get(name).map_or(0, Vec::len),
            None => inner.values().map(Vec::len).sum(),
        };
        Ok(count as u64)
    }

    async fn list_streams(&self) -> Result<Vec<String>, LogStoreError> {
        Ok(self.order.lock().await.clone())
    }
}

/// Configuration for a [`FileLogStore`].
#[derive(Debug, Clone)]
pub struct FileLogStoreConfig {
    /// Directory holding one subdirectory per stream.
    pub base_dir: PathBuf,
    /// Segment rotation threshold, in bytes.
    pub max_segment_bytes: u64,
    /// How often the background writer flushes pending appends.
    pub flush_interval: Duration,
    /// Bounded channel capacity between callers and the writer task.
    pub channel_capacity: usize,
}

impl Default for FileLogStoreConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("data/log"),
            max_segment_bytes: 64 * 1024 * 1024,
            flush_interval: Duration::from_millis(50),
            channel_capacity: 4096,
        }
    }
}

struct AppendCommand {
    stream: String,
    entry: LogEntry,
    reply: oneshot::Sender<Result<u64, LogStoreError>>,
}

struct StreamWriter {
    dir: PathBuf,
    file: File,
    segment_bytes: u64,
    next_offset: u64,
}

/// File-backed [`LogStore`]. Appends are routed through a single background
/// task (one per store instance) that batches writes per stream and flushes
/// on a timer, the same channel-fed-writer shape as the file-backed FIX
/// message store this crate's persistence is grounded on. `replay`/`latest`/
/// `entry_count`/`list_streams` read directly from disk and so only see
/// data the writer has already flushed.
#[derive(Clone)]
pub struct FileLogStore {
    tx: mpsc::Sender<AppendCommand>,
    base_dir: Arc<PathBuf>,
}

impl FileLogStore {
    /// Opens (creating if needed) a file-backed log store under
    /// `config.base_dir`, spawning its background writer task.
    pub async fn open(config: FileLogStoreConfig) -> Result<Self, LogStoreError> {
        fs::create_dir_all(&config.base_dir).await?;
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let base_dir = Arc::new(config.base_dir.clone());
        tokio::spawn(run_writer(config, rx));
        Ok(Self { tx, base_dir })
    }

    fn stream_dir(&self, stream: &str) -> PathBuf {
        self.base_dir.join(sanitize(stream))
    }
}

fn sanitize(stream: &str) -> String {
    stream.chars().map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' }).collect()
}

fn segment_name(start_offset: u64) -> String {
    format!("{start_offset:020}.log")
}

async fn run_writer(config: FileLogStoreConfig, mut rx: mpsc::Receiver<AppendCommand>) {
    let mut writers: HashMap<String, StreamWriter> = HashMap::new();
    let mut ticker = tokio::time::interval(config.flush_interval);

    loop {
        tokio::select! {
            maybe = rx.recv() => {
                let Some(cmd) = maybe else { break };
                let result = handle_append(&config, &mut writers, cmd.stream, cmd.entry).await;
                let _ = cmd.reply.send(result);
            }
            _ = ticker.tick() => {
                for writer in writers.values_mut() {
                    let _ = writer.file.sync_data().await;
                }
            }
        }
    }
}

async fn handle_append(
    config: &FileLogStoreConfig,
    writers: &mut HashMap<String, StreamWriter>,
    stream: String,
    entry: LogEntry,
) -> Result<u64, LogStoreError> {
    if !writers.contains_key(&stream) {
        let writer = open_stream_writer(&config.base_dir, &stream).await?;
        writers.insert(stream.clone(), writer);
    }
    let writer = writers.get_mut(&stream).expect("just inserted");

    let mut buf = BytesMut::with_capacity(entry.encoded_len());
    entry.encode(&mut buf);

    if writer.segment_bytes + buf.len() as u64 > config.max_segment_bytes && writer.segment_bytes > 0
    {
        let path = writer.dir.join(segment_name(writer.next_offset));
        writer.file = OpenOptions::new().create(true).append(true).open(&path).await?;
        writer.segment_bytes = 0;
    }

    writer.file.write_all(&buf).await?;
    writer.segment_bytes += buf.len() as u64;
    let offset = writer.next_offset;
    writer.next_offset += 1;
    Ok(offset)
}

async fn open_stream_writer(base_dir: &Path, stream: &str) -> Result<StreamWriter, LogStoreError> {
    let dir = base_dir.join(sanitize(stream));
    fs::create_dir_all(&dir).await?;

    let entries = list_segments(&dir).await?;
    let next_offset = if entries.is_empty() {
        0
    } else {
        count_entries_in_segments(&dir, &entries, stream).await?
    };

    let segment_path = match entries.last() {
        Some(name) => dir.join(name),
        None => dir.join(segment_name(0)),
    };
    let file = OpenOptions::new().create(true).append(true).open(&segment_path).await?;
    let segment_bytes = file.metadata().await?.len();

    Ok(StreamWriter { dir, file, segment_bytes, next_offset })
}

async fn list_segments(dir: &Path) -> Result<Vec<String>, LogStoreError> {
    let mut names = Vec::new();
    let mut read_dir = fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(".log") {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

async fn count_entries_in_segments(
    dir: &Path,
    segments: &[String],
    stream: &str,
) -> Result<u64, LogStoreError> {
    let mut count = 0u64;
    for name in segments {
        let bytes = fs::read(dir.join(name)).await?;
        let mut cursor = Bytes::from(bytes);
        while !cursor.is_empty() {
            if LogEntry::decode(&mut cursor).is_none() {
                return Err(LogStoreError::Corrupt {
                    stream: stream.to_string(),
                    offset: count,
                });
            }
            count += 1;
        }
    }
    Ok(count)
}

async fn scan_stream(dir: &Path, stream: &str) -> Result<Vec<LogEntry>, LogStoreError> {
    let segments = list_segments(dir).await?;
    let mut out = Vec::new();
    for name in segments {
        let bytes = fs::read(dir.join(&name)).await?;
        let mut cursor = Bytes::from(bytes);
        while !cursor.is_empty() {
            match LogEntry::decode(&mut cursor) {
                Some(entry) => out.push(entry),
                None => {
                    return Err(LogStoreError::Corrupt {
                        stream: stream.to_string(),
                        offset: out.len() as u64,
                    })
                }
            }
        }
    }
    Ok(out)
}

impl LogStore for FileLogStore {
    async fn append(&self, stream: &str, entry: LogEntry) -> Result<u64, LogStoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(AppendCommand { stream: stream.to_string(), entry, reply: reply_tx })
            .await
            .map_err(|_| LogStoreError::WriterGone)?;
        reply_rx.await.map_err(|_| LogStoreError::WriterGone)?
    }

    async fn replay(
        &self,
        filter: ReplayFilter,
        mut handler: impl FnMut(&str, u64, &LogEntry) + Send,
    ) -> Result<(), LogStoreError> {
        let streams = match &filter.stream {
            Some(name) => vec![name.clone()],
            None => self.list_streams().await?,
        };
        for name in streams {
            let entries = match scan_stream(&self.stream_dir(&name), &name).await {
                Ok(entries) => entries,
                Err(LogStoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            for (offset, entry) in entries.iter().enumerate() {
                let offset = offset as u64;
                if filter.offset_in_range(offset) && filter.matches(entry) {
                    handler(&name, offset, entry);
                }
            }
        }
        Ok(())
    }

    async fn latest(
        &self,
        stream: &str,
        direction: Direction,
    ) -> Result<Option<LogEntry>, LogStoreError> {
        match scan_stream(&self.stream_dir(stream), stream).await {
            Ok(entries) => Ok(entries.into_iter().rev().find(|e| e.direction == direction)),
            Err(LogStoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn entry_count(&self, stream: Option<&str>) -> Result<u64, LogStoreError> {
        match stream {
            Some(name) => match scan_stream(&self.stream_dir(name), name).await {
                Ok(entries) => Ok(entries.len() as u64),
                Err(LogStoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
                Err(e) => Err(e),
            },
            None => {
                let mut total = 0u64;
                for name in self.list_streams().await? {
                    total += self.entry_count(Some(&name)).await?;
                }
                Ok(total)
            }
        }
    }

    async fn list_streams(&self) -> Result<Vec<String>, LogStoreError> {
        let mut names = Vec::new();
        let mut read_dir = match fs::read_dir(self.base_dir.as_path()).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = read_dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ts: i64, seq: i32, dir: Direction, raw: &[u8]) -> LogEntry {
        LogEntry {
            timestamp_millis: ts,
            direction: dir,
            seq_num: seq,
            metadata: Bytes::new(),
            raw: Bytes::copy_from_slice(raw),
        }
    }

    #[test]
    fn entry_round_trips_through_encode_decode() {
        let e = entry(1_700_000_000_000, 42, Direction::Outbound, b"8=FIX.4.4|...");
        let mut buf = BytesMut::new();
        e.encode(&mut buf);
        let mut bytes = buf.freeze();
        let decoded = LogEntry::decode(&mut bytes).expect("full record decodes");
        assert_eq!(decoded, e);
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn memory_store_append_and_replay_round_trips() {
        let store = MemoryLogStore::new();
        store.append("SESSION1", entry(1, 1, Direction::Outbound, b"a")).await.unwrap();
        store.append("SESSION1", entry(2, 2, Direction::Inbound, b"b")).await.unwrap();

        let mut seen = Vec::new();
        store
            .replay(ReplayFilter::default(), |stream, offset, e| {
                seen.push((stream.to_string(), offset, e.seq_num));
            })
            .await
            .unwrap();

        assert_eq!(seen, vec![("SESSION1".to_string(), 0, 1), ("SESSION1".to_string(), 1, 2)]);
        assert_eq!(store.entry_count(Some("SESSION1")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn memory_store_latest_filters_by_direction() {
        let store = MemoryLogStore::new();
        store.append("S", entry(1, 1, Direction::Outbound, b"a")).await.unwrap();
        store.append("S", entry(2, 2, Direction::Inbound, b"b")).await.unwrap();
        store.append("S", entry(3, 3, Direction::Outbound, b"c")).await.unwrap();

        let latest = store.latest("S", Direction::Outbound).await.unwrap().unwrap();
        assert_eq!(latest.seq_num, 3);
    }

    #[tokio::test]
    async fn tailer_polls_new_entries_as_they_arrive() {
        let store = MemoryLogStore::new();
        store.append("S", entry(1, 1, Direction::Outbound, b"a")).await.unwrap();

        let mut tailer = store.create_reader(Some("S"), 0);
        let (stream, first) = tailer.poll(Duration::from_millis(100)).await.unwrap().unwrap();
        assert_eq!(stream, "S");
        assert_eq!(first.seq_num, 1);

        assert!(!tailer.has_next().await.unwrap());
        store.append("S", entry(2, 2, Direction::Outbound, b"b")).await.unwrap();
        let (_, second) = tailer.poll(Duration::from_millis(200)).await.unwrap().unwrap();
        assert_eq!(second.seq_num, 2);
    }

    #[tokio::test]
    async fn merged_tailer_orders_by_timestamp_across_streams() {
        let store = MemoryLogStore::new();
        store.append("A", entry(5, 1, Direction::Outbound, b"later")).await.unwrap();
        store.append("B", entry(2, 1, Direction::Outbound, b"earlier")).await.unwrap();

        let mut tailer = store.create_reader(None, 0);
        let batch = tailer.poll_batch(10, Duration::from_millis(100)).await.unwrap();
        let raws: Vec<&[u8]> = batch.iter().map(|(_, e)| e.raw.as_ref()).collect();
        assert_eq!(raws, vec![b"earlier".as_slice(), b"later".as_slice()]);
    }

    #[tokio::test]
    async fn file_store_recovers_offset_counter_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileLogStoreConfig {
            base_dir: dir.path().to_path_buf(),
            flush_interval: Duration::from_millis(5),
            ..FileLogStoreConfig::default()
        };

        let store = FileLogStore::open(config.clone()).await.unwrap();
        let offset = store.append("S", entry(1, 1, Direction::Outbound, b"x")).await.unwrap();
        assert_eq!(offset, 0);
        tokio::time::sleep(Duration::from_millis(30)).await;

        let reopened = FileLogStore::open(config).await.unwrap();
        let offset = reopened.append("S", entry(2, 2, Direction::Outbound, b"y")).await.unwrap();
        assert_eq!(offset, 1);
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(reopened.entry_count(Some("S")).await.unwrap(), 2);
        let latest = reopened.latest("S", Direction::Outbound).await.unwrap().unwrap();
        assert_eq!(latest.seq_num, 2);
    }
}
