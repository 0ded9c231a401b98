//! C3.1 — frame extraction: `8=FIX...9=...` through `10=NNN<SOH>`.
//!
//! `FrameScanner` owns an accumulation buffer that grows on demand: add
//! data, ask how much more is needed, try to read one frame. Cheapest
//! checks (delimiters, length) run before the checksum pass, over a
//! variable-length, SOH-delimited wire format.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::ProtoError;

/// FIX field delimiter.
pub const SOH: u8 = 0x01;

/// Minimum bytes needed before a header can even be attempted:
/// `8=FIX.4.4` + SOH + `9=0` + SOH is already 14; 25 covers the
/// looser `8=FIXT.1.1` variant plus a multi-digit body length.
pub const MIN_HEADER_SIZE: usize = 25;

/// Outcome of scanning the accumulation buffer for one frame.
enum Scan {
    /// Not enough bytes yet; need `needed` more before re-scanning.
    NeedMore(usize),
    /// A complete, checksum-valid frame of `frame_len` bytes, preceded by
    /// `start` bytes of garbage that must be discarded first.
    Ready { start: usize, frame_len: usize },
}

/// Incremental FIX frame extractor.
///
/// Bytes arrive in arbitrary chunks (including one byte at a time, or
/// larger than a single frame); `add_data` accumulates them and
/// `try_read_frame` extracts complete, checksum-validated frames as they
/// become available.
#[derive(Debug, Default)]
pub struct FrameScanner {
    buf: BytesMut,
}

impl FrameScanner {
    /// A scanner with an empty accumulation buffer.
    #[must_use]
    pub fn new() -> Self {
        Self { buf: BytesMut::new() }
    }

    /// Appends newly received bytes to the accumulation buffer.
    pub fn add_data(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes still needed before the next `try_read_frame` could succeed:
    /// the remaining length of the current frame if the header has been
    /// parsed, otherwise the minimal header size.
    #[must_use]
    pub fn bytes_needed(&self) -> usize {
        match self.scan() {
            Ok(Scan::NeedMore(needed)) => needed,
            Ok(Scan::Ready { .. }) | Err(_) => 0,
        }
    }

    /// Attempts to extract one complete frame.
    ///
    /// Returns `Ok(None)` if more data is needed (not an error). On success
    /// the returned bytes are drained from the accumulation buffer, which is
    /// left positioned at the start of the next frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::InvalidHeader`], [`ProtoError::MisalignedChecksum`],
    /// [`ProtoError::MalformedChecksum`], or [`ProtoError::ChecksumMismatch`]
    /// per the wire-format invariants in spec §4.3.1 / §6. None of these
    /// advance the accumulation buffer — the caller is expected to close
    /// the connection, not retry.
    pub fn try_read_frame(&mut self) -> Result<Option<Bytes>, ProtoError> {
        match self.scan()? {
            Scan::NeedMore(_) => Ok(None),
            Scan::Ready { start, frame_len } => {
                self.buf.advance(start);
                let frame = self.buf.split_to(frame_len).freeze();
                Ok(Some(frame))
            },
        }
    }

    fn scan(&self) -> Result<Scan, ProtoError> {
        let buf = &self.buf[..];

        let Some(start) = memchr::memmem::find(buf, b"8=FIX") else {
            return if buf.len() < MIN_HEADER_SIZE {
                Ok(Scan::NeedMore(MIN_HEADER_SIZE - buf.len()))
            } else {
                Err(ProtoError::InvalidHeader("no `8=FIX` prefix found".to_string()))
            };
        };

        let buf = &buf[start..];

        let Some(soh1) = memchr::memchr(SOH, buf) else {
            return Ok(Scan::NeedMore(MIN_HEADER_SIZE.saturating_sub(buf.len())));
        };

        if buf.len() < soh1 + 3 {
            return Ok(Scan::NeedMore(soh1 + 3 - buf.len()));
        }
        if &buf[soh1 + 1..soh1 + 3] != b"9=" {
            return Err(ProtoError::InvalidHeader(
                "BodyLength tag `9=` did not follow BeginString".to_string(),
            ));
        }

        let Some(soh2_rel) = memchr::memchr(SOH, &buf[soh1 + 3..]) else {
            return Ok(Scan::NeedMore(1));
        };
        let soh2 = soh1 + 3 + soh2_rel;

        let body_length_digits = &buf[soh1 + 3..soh2];
        let body_length: usize = std::str::from_utf8(body_length_digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ProtoError::InvalidHeader("BodyLength is not numeric".to_string()))?;

        let body_start = soh2 + 1;
        let checksum_start = body_start + body_length;
        let frame_len = checksum_start + 7;

        if buf.len() < frame_len {
            return Ok(Scan::NeedMore(frame_len - buf.len()));
        }

        if &buf[checksum_start..checksum_start + 3] != b"10=" {
            return Err(ProtoError::MisalignedChecksum { expected_offset: start + checksum_start });
        }

        let digits: [u8; 3] =
            buf[checksum_start + 3..checksum_start + 6].try_into().expect("slice is length 3");
        if !digits.iter().all(u8::is_ascii_digit) || buf[checksum_start + 6] != SOH {
            return Err(ProtoError::MalformedChecksum(digits));
        }

        let computed: u8 = buf[..checksum_start].iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        let found: u8 = (digits[0] - b'0') * 100 + (digits[1] - b'0') * 10 + (digits[2] - b'0');

        if computed != found {
            return Err(ProtoError::ChecksumMismatch { computed, found });
        }

        Ok(Scan::Ready { start, frame_len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_frame(body: &[u8]) -> Vec<u8> {
        let body_start_marker = b"9=";
        let mut msg = Vec::new();
        msg.extend_from_slice(b"8=FIX.4.4\x01");
        msg.extend_from_slice(body_start_marker);
        msg.extend_from_slice(format!("{}", body.len()).as_bytes());
        msg.push(SOH);
        msg.extend_from_slice(body);
        let checksum: u8 = msg.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        msg.extend_from_slice(format!("10={checksum:03}", checksum = checksum).as_bytes());
        msg.push(SOH);
        msg
    }

    #[test]
    fn reads_one_complete_frame() {
        let body = b"35=0\x0134=1\x0149=A\x0156=B\x0152=20240101-00:00:00.000\x01";
        let frame = build_frame(body);

        let mut scanner = FrameScanner::new();
        scanner.add_data(&frame);

        let parsed = scanner.try_read_frame().unwrap().unwrap();
        assert_eq!(parsed.as_ref(), frame.as_slice());
        assert!(scanner.try_read_frame().unwrap().is_none());
    }

    #[test]
    fn handles_one_byte_at_a_time_chunks() {
        let body = b"35=0\x0134=1\x01";
        let frame = build_frame(body);

        let mut scanner = FrameScanner::new();
        let mut result = None;
        for byte in &frame {
            scanner.add_data(std::slice::from_ref(byte));
            if let Some(frame) = scanner.try_read_frame().unwrap() {
                result = Some(frame);
            }
        }

        assert_eq!(result.unwrap().as_ref(), frame.as_slice());
    }

    #[test]
    fn handles_oversized_chunk_with_two_frames() {
        let frame1 = build_frame(b"35=0\x01");
        let frame2 = build_frame(b"35=1\x01");

        let mut combined = frame1.clone();
        combined.extend_from_slice(&frame2);

        let mut scanner = FrameScanner::new();
        scanner.add_data(&combined);

        let first = scanner.try_read_frame().unwrap().unwrap();
        assert_eq!(first.as_ref(), frame1.as_slice());

        let second = scanner.try_read_frame().unwrap().unwrap();
        assert_eq!(second.as_ref(), frame2.as_slice());
    }

    #[test]
    fn detects_checksum_mismatch() {
        let body = b"35=0\x01";
        let mut frame = build_frame(body);
        let last_soh = frame.len() - 1;
        frame[last_soh - 1] = if frame[last_soh - 1] == b'9' { b'8' } else { b'9' };

        let mut scanner = FrameScanner::new();
        scanner.add_data(&frame);

        let err = scanner.try_read_frame().unwrap_err();
        assert_eq!(err.frame_scan_code(), Some(-4));
    }

    #[test]
    fn discards_garbage_before_prefix() {
        let body = b"35=0\x01";
        let frame = build_frame(body);
        let mut garbage = b"\x02\x03garbage".to_vec();
        garbage.extend_from_slice(&frame);

        let mut scanner = FrameScanner::new();
        scanner.add_data(&garbage);

        let parsed = scanner.try_read_frame().unwrap().unwrap();
        assert_eq!(parsed.as_ref(), frame.as_slice());
    }

    #[test]
    fn need_more_data_returns_none_not_error() {
        let mut scanner = FrameScanner::new();
        scanner.add_data(b"8=FIX.4.4\x019=");
        assert!(scanner.try_read_frame().unwrap().is_none());
    }
}
