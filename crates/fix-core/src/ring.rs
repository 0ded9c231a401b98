//! C5 — single-producer/single-consumer ring buffer for framed records.
//!
//! A power-of-two backing region is carved into variable-length records,
//! each prefixed by a fixed 16-byte header: `(session_id: u64, reserved:
//! u64)`. The producer claims a slice with [`Ring::try_claim`], writes into
//! it, then [`Ring::commit`]s; the consumer drains committed records with
//! [`Ring::read`]. Cursor bookkeeping is lock-free atomics; the backing
//! bytes sit behind a `Mutex` rather than raw `unsafe` aliasing, since the
//! claim/commit/read window is short and this crate forbids unsafe code.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

/// Fixed per-record header length in bytes: an 8-byte session id followed
/// by 8 reserved bytes.
pub const RECORD_HEADER_LEN: usize = 16;

/// Sentinel session id marking a gap record: bytes the producer skipped to
/// avoid straddling the physical end of the buffer. Written in place of a
/// real header whenever the skipped space is large enough to hold one.
const SKIP_MARKER: u64 = u64::MAX;

/// What the ring should do when a producer cannot claim enough space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressurePolicy {
    /// Fall back to a synchronous, unbuffered write (the default).
    SyncFallback,
    /// Block the producer until space frees up.
    Block,
    /// Drop the record and signal the caller to request a resend.
    DropAndResend,
}

/// A claimed, not-yet-committed write region.
///
/// Holds the backing buffer's lock for its lifetime; drop (or [`Ring::commit`])
/// releases it. Since the ring is single-producer/single-consumer this only
/// ever contends with a concurrent [`Ring::read`], and the window is the
/// time it takes the producer to fill one record.
pub struct Claim<'a> {
    guard: std::sync::MutexGuard<'a, Vec<u8>>,
    index: usize,
    len: usize,
    /// Bytes skipped immediately before this claim to avoid straddling the
    /// physical end of the buffer. Folded into the commit so the consumer's
    /// cursor arithmetic stays in lockstep with the producer's.
    gap: usize,
}

impl<'a> Claim<'a> {
    /// The writable region reserved by this claim, including its header.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        let start = self.index;
        let end = start + RECORD_HEADER_LEN + self.len;
        &mut self.guard[start..end]
    }

    /// Writes the record header's session id.
    pub fn set_session_id(&mut self, session_id: u64) {
        let start = self.index;
        self.guard[start..start + 8].copy_from_slice(&session_id.to_be_bytes());
    }

    /// Index this claim should be committed with.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

/// SPSC ring buffer over a fixed-capacity byte region.
pub struct Ring {
    capacity: usize,
    mask: usize,
    storage: Mutex<Vec<u8>>,
    write_cursor: AtomicUsize,
    commit_cursor: AtomicUsize,
    read_cursor: AtomicUsize,
    backpressure: BackpressurePolicy,
    notify: Notify,
}

impl Ring {
    /// Builds a ring over `capacity` bytes, rounded up to the next power of
    /// two, with the given backpressure policy.
    #[must_use]
    pub fn new(capacity: usize, backpressure: BackpressurePolicy) -> Self {
        let capacity = capacity.next_power_of_two();
        Self {
            capacity,
            mask: capacity - 1,
            storage: Mutex::new(vec![0u8; capacity]),
            write_cursor: AtomicUsize::new(0),
            commit_cursor: AtomicUsize::new(0),
            read_cursor: AtomicUsize::new(0),
            backpressure,
            notify: Notify::new(),
        }
    }

    /// Total backing capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Configured backpressure policy.
    #[must_use]
    pub fn backpressure(&self) -> BackpressurePolicy {
        self.backpressure
    }

    /// Attempts to reserve `len` bytes of payload (plus the fixed header)
    /// for writing. Returns `None` if the ring doesn't have room, in which
    /// case the caller should apply its [`BackpressurePolicy`].
    ///
    /// A record is never split across the physical end of the backing
    /// buffer: if `len` wouldn't fit contiguously before wrapping, the
    /// producer skips the remainder of the buffer (recording a gap marker
    /// there when there's room for one) and claims the record at index 0
    /// instead. The skipped bytes count against the claim's space check, so
    /// a claim that can't fit the gap plus the record itself correctly
    /// reports "no room" rather than wrapping.
    pub fn try_claim(&self, len: usize) -> Option<Claim<'_>> {
        let total = RECORD_HEADER_LEN + len;
        if total > self.capacity {
            return None;
        }
        let write = self.write_cursor.load(Ordering::Acquire);
        let read = self.read_cursor.load(Ordering::Acquire);
        let raw_index = write & self.mask;
        let (gap, index) =
            if raw_index + total > self.capacity { (self.capacity - raw_index, 0) } else { (0, raw_index) };
        if write - read + gap + total > self.capacity {
            return None;
        }

        let mut guard = self.storage.lock().expect("ring mutex poisoned");
        if gap >= RECORD_HEADER_LEN {
            guard[raw_index..raw_index + 8].copy_from_slice(&SKIP_MARKER.to_be_bytes());
        }
        self.write_cursor.store(write + gap + total, Ordering::Release);
        Some(Claim { guard, index, len, gap })
    }

    /// Blocks until `len` bytes can be claimed, honoring the ring's
    /// backpressure policy's wait semantics.
    pub async fn claim(&self, len: usize) -> Claim<'_> {
        loop {
            if let Some(claim) = self.try_claim(len) {
                return claim;
            }
            self.notify.notified().await;
        }
    }

    /// Marks a claimed record as visible to the consumer.
    pub fn commit(&self, claim: Claim<'_>) {
        let total = RECORD_HEADER_LEN + claim.len + claim.gap;
        drop(claim);
        self.commit_cursor.fetch_add(total, Ordering::AcqRel);
        self.notify.notify_waiters();
    }

    /// Drains up to `limit` committed records, invoking `handler` with each
    /// record's full byte range (header included). Returns the number of
    /// records read.
    pub fn read(&self, limit: usize, mut handler: impl FnMut(&[u8])) -> usize {
        let mut read = self.read_cursor.load(Ordering::Acquire);
        let committed = self.commit_cursor.load(Ordering::Acquire);
        let mut count = 0;
        let buffer = self.storage.lock().expect("ring mutex poisoned");
        while count < limit && read < committed {
            let mut index = read & self.mask;
            if index + RECORD_HEADER_LEN > self.capacity || Self::is_skip_marker(&buffer, index) {
                read += self.capacity - index;
                if read >= committed {
                    break;
                }
                index = 0;
            }
            let len = u64::from_be_bytes(Self::peek_len(&buffer, index)) as usize;
            let total = RECORD_HEADER_LEN + len;
            if read + total > committed {
                break;
            }
            handler(&buffer[index..index + total]);
            read += total;
            count += 1;
        }
        drop(buffer);
        self.read_cursor.store(read, Ordering::Release);
        self.notify.notify_waiters();
        count
    }

    fn peek_len(buffer: &[u8], index: usize) -> [u8; 8] {
        let slice = &buffer[index + 8..index + 16];
        let mut out = [0u8; 8];
        out.copy_from_slice(slice);
        out
    }

    /// Whether a gap marker was written at `index` by a producer that
    /// skipped ahead to avoid straddling the physical end of the buffer.
    fn is_skip_marker(buffer: &[u8], index: usize) -> bool {
        if index + 8 > buffer.len() {
            return false;
        }
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&buffer[index..index + 8]);
        u64::from_be_bytes(raw) == SKIP_MARKER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_record(ring: &Ring, session_id: u64, payload: &[u8]) {
        let mut claim = ring.try_claim(payload.len()).expect("room for record");
        claim.set_session_id(session_id);
        {
            let slice = claim.as_mut_slice();
            slice[8..16].copy_from_slice(&(payload.len() as u64).to_be_bytes());
            slice[16..].copy_from_slice(payload);
        }
        ring.commit(claim);
    }

    #[test]
    fn claim_commit_and_read_round_trips() {
        let ring = Ring::new(256, BackpressurePolicy::SyncFallback);
        write_record(&ring, 7, b"hello");

        let mut seen = Vec::new();
        let n = ring.read(10, |record| seen.push(record.to_vec()));

        assert_eq!(n, 1);
        assert_eq!(&seen[0][16..], b"hello");
        assert_eq!(u64::from_be_bytes(seen[0][0..8].try_into().unwrap()), 7);
    }

    #[test]
    fn capacity_rounds_up_to_power_of_two() {
        let ring = Ring::new(100, BackpressurePolicy::Block);
        assert_eq!(ring.capacity(), 128);
    }

    #[test]
    fn try_claim_fails_when_full() {
        let ring = Ring::new(32, BackpressurePolicy::DropAndResend);
        assert!(ring.try_claim(100).is_none());
    }

    #[test]
    fn read_limit_stops_early() {
        let ring = Ring::new(256, BackpressurePolicy::SyncFallback);
        write_record(&ring, 1, b"a");
        write_record(&ring, 2, b"b");

        let mut seen = 0;
        let n = ring.read(1, |_| seen += 1);

        assert_eq!(n, 1);
        assert_eq!(seen, 1);
    }

    #[test]
    fn try_claim_wraps_instead_of_panicking_on_noncontiguous_space() {
        // capacity=32, record total = 16 (header) + 4 (payload) = 20 bytes.
        // Claiming a second and third record only has room once the prior
        // record has been read, at which point the next record's index no
        // longer starts at 0 and can't fit before the physical end.
        let ring = Ring::new(32, BackpressurePolicy::SyncFallback);

        for session_id in 1..=3u64 {
            write_record(&ring, session_id, b"abcd");
            let mut seen = Vec::new();
            let n = ring.read(10, |record| seen.push(record.to_vec()));
            assert_eq!(n, 1);
            assert_eq!(&seen[0][16..], b"abcd");
            assert_eq!(u64::from_be_bytes(seen[0][0..8].try_into().unwrap()), session_id);
        }
    }

    #[test]
    fn wraparound_gap_too_small_for_marker_is_still_skipped() {
        // total=20 leaves only 12 bytes before the physical end on the
        // second claim (< RECORD_HEADER_LEN), so no marker can be written
        // there; the reader must fall back to its header-doesn't-fit check.
        let ring = Ring::new(32, BackpressurePolicy::SyncFallback);
        write_record(&ring, 1, b"abcd");
        ring.read(10, |_| {});
        write_record(&ring, 2, b"abcd");

        let mut seen = Vec::new();
        let n = ring.read(10, |record| seen.push(record.to_vec()));
        assert_eq!(n, 1);
        assert_eq!(u64::from_be_bytes(seen[0][0..8].try_into().unwrap()), 2);
    }

    #[tokio::test]
    async fn claim_succeeds_once_space_frees_up() {
        let ring = Ring::new(32, BackpressurePolicy::Block);
        write_record(&ring, 1, b"0123456789abcdef");

        assert!(ring.try_claim(16).is_none());
        ring.read(1, |_| {});

        let claim = ring.claim(16).await;
        assert_eq!(claim.len, 16);
    }
}
