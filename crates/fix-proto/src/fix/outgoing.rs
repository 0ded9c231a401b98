//! C3.3 — `OutgoingBuilder`: assembles one outbound message into a
//! pre-allocated buffer, then rewrites SeqNum/SendingTime/BodyLength and
//! appends the checksum in `prepare_for_send`, per spec §4.3.3.

use bytes::{Bytes, BytesMut};

use crate::{
    error::ProtoError,
    fix::frame::SOH,
    fix::incoming::{FixMessageView, TAG_BEGIN_STRING, TAG_BODY_LENGTH, TAG_CHECKSUM, TAG_POSS_DUP},
};

const MAX_TAG: usize = 2048;

/// Builds one outgoing FIX message at a time, reusable across sends via
/// [`OutgoingBuilder::reset`].
///
/// The header prefix (`BeginString`, a placeholder `BodyLength`,
/// `SenderCompID`, `TargetCompID`) is written once at construction and
/// survives resets; everything after it — including `MsgType` — is body
/// content supplied per message.
#[derive(Debug)]
pub struct OutgoingBuilder {
    begin_string: String,
    sender_comp_id: String,
    target_comp_id: String,
    buf: BytesMut,
    header_len: usize,
    seen: Box<[bool; MAX_TAG]>,
}

impl OutgoingBuilder {
    /// Creates a builder with the given session identity. The fixed header
    /// fields are written immediately; `BodyLength` is a placeholder until
    /// [`OutgoingBuilder::prepare_for_send`] rewrites it.
    #[must_use]
    pub fn new(begin_string: &str, sender_comp_id: &str, target_comp_id: &str) -> Self {
        let mut builder = Self {
            begin_string: begin_string.to_string(),
            sender_comp_id: sender_comp_id.to_string(),
            target_comp_id: target_comp_id.to_string(),
            buf: BytesMut::new(),
            header_len: 0,
            seen: Box::new([false; MAX_TAG]),
        };
        builder.write_header_prefix();
        builder
    }

    fn write_header_prefix(&mut self) {
        self.buf.clear();
        write_field(&mut self.buf, 8, self.begin_string.as_bytes());
        write_field(&mut self.buf, 9, b"00000");
        self.header_len = self.buf.len();
    }

    /// Sets `MsgType` (tag 35). Must be called before any [`set_field`] call
    /// for tags that logically follow it; this mirrors the wire order FIX
    /// requires (35 immediately after 8/9).
    ///
    /// [`set_field`]: Self::set_field
    pub fn set_msg_type(&mut self, msg_type: &str) -> Result<(), ProtoError> {
        self.set_field(35, msg_type.as_bytes())
    }

    /// Appends `tag=value` to the message body.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::DuplicateTag`] if `tag` was already set since
    /// the last [`reset`](Self::reset). A `None`/empty `value` is silently
    /// ignored, matching optional-field semantics.
    pub fn set_field(&mut self, tag: u32, value: &[u8]) -> Result<(), ProtoError> {
        if value.is_empty() {
            return Ok(());
        }
        let idx = tag as usize;
        if idx < MAX_TAG {
            if self.seen[idx] {
                return Err(ProtoError::DuplicateTag(tag));
            }
            self.seen[idx] = true;
        }
        write_field(&mut self.buf, tag, value);
        Ok(())
    }

    /// Appends the standard FIX header fields (49/56/34/52) plus the
    /// required trailer framing, in this order: `SenderCompID`,
    /// `TargetCompID`, `MsgSeqNum`, `SendingTime`, then rewrites
    /// `BodyLength` and appends the checksum.
    ///
    /// `epoch_millis` is injected by the caller (from the session's clock
    /// abstraction) rather than read from the system clock directly, keeping
    /// this type free of hidden time dependence.
    ///
    /// # Errors
    ///
    /// Propagates [`ProtoError::DuplicateTag`] if the caller already set one
    /// of 49/56/34/52 explicitly.
    pub fn prepare_for_send(&mut self, seq_num: u64, epoch_millis: i64) -> Result<bytes::Bytes, ProtoError> {
        let sender_comp_id = self.sender_comp_id.clone();
        let target_comp_id = self.target_comp_id.clone();
        self.set_field(49, sender_comp_id.as_bytes())?;
        self.set_field(56, target_comp_id.as_bytes())?;
        self.set_field(34, format!("{seq_num:08}").as_bytes())?;
        self.set_field(52, format_sending_time(epoch_millis).as_bytes())?;

        let body = self.buf[self.header_len..].to_vec();
        let body_length = body.len();

        let mut out = BytesMut::new();
        write_field(&mut out, 8, self.begin_string.as_bytes());
        write_field(&mut out, 9, format!("{body_length}").as_bytes());
        out.extend_from_slice(&body);

        let checksum: u8 = out.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        out.extend_from_slice(format!("10={checksum:03}").as_bytes());
        out.extend_from_slice(&[SOH]);

        Ok(out.freeze())
    }

    /// Clears the message body and tag-seen bitmap, preserving the header
    /// prefix so the builder can be reused for the next message.
    pub fn reset(&mut self) {
        self.write_header_prefix();
        self.seen.iter_mut().for_each(|b| *b = false);
    }
}

/// Rebuilds a previously-sent frame with `PossDupFlag` (tag 43) set to `Y`,
/// preserving every other field's value and wire order — including the
/// original `MsgSeqNum`/`SendingTime`, which a resend must not alter.
///
/// Returns the frame unchanged (as a fresh `Bytes` copy) if `PossDupFlag` is
/// already set, so callers can restamp blindly without double-tagging.
///
/// # Errors
///
/// Returns [`ProtoError`] if `original` is not a well-formed frame.
pub fn restamp_poss_dup(original: &[u8]) -> Result<Bytes, ProtoError> {
    let view = FixMessageView::wrap(original)?;
    if view.poss_dup() {
        return Ok(Bytes::copy_from_slice(original));
    }

    let mut body = BytesMut::new();
    for (tag, value) in view.iter_fields() {
        if matches!(tag, TAG_BEGIN_STRING | TAG_BODY_LENGTH | TAG_CHECKSUM) {
            continue;
        }
        write_field(&mut body, tag, value.as_bytes());
    }
    write_field(&mut body, TAG_POSS_DUP, b"Y");

    let begin_string =
        view.raw(TAG_BEGIN_STRING).ok_or_else(|| ProtoError::InvalidHeader("missing BeginString".to_string()))?;

    let mut out = BytesMut::new();
    write_field(&mut out, TAG_BEGIN_STRING, begin_string.as_bytes());
    write_field(&mut out, TAG_BODY_LENGTH, body.len().to_string().as_bytes());
    out.extend_from_slice(&body);

    let checksum: u8 = out.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    out.extend_from_slice(format!("10={checksum:03}").as_bytes());
    out.extend_from_slice(&[SOH]);

    Ok(out.freeze())
}

fn write_field(buf: &mut BytesMut, tag: u32, value: &[u8]) {
    buf.extend_from_slice(format!("{tag}=").as_bytes());
    buf.extend_from_slice(value);
    buf.extend_from_slice(&[SOH]);
}

/// `YYYYMMDD-HH:MM:SS.sss` in UTC, computed from a Unix epoch millisecond
/// count without pulling in a general-purpose calendar library — this is
/// the only timestamp format the wire format requires.
fn format_sending_time(epoch_millis: i64) -> String {
    let millis = epoch_millis.rem_euclid(1000);
    let total_secs = epoch_millis.div_euclid(1000);
    let days = total_secs.div_euclid(86400);
    let secs_of_day = total_secs.rem_euclid(86400);

    let (year, month, day) = civil_from_days(days);
    let hour = secs_of_day / 3600;
    let minute = (secs_of_day % 3600) / 60;
    let second = secs_of_day % 60;

    format!("{year:04}{month:02}{day:02}-{hour:02}:{minute:02}:{second:02}.{millis:03}")
}

/// Howard Hinnant's days-from-civil / civil-from-days algorithm, valid over
/// the full proleptic Gregorian calendar.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_minimal_logon() {
        let mut builder = OutgoingBuilder::new("FIX.4.4", "CLIENT", "SERVER");
        builder.set_msg_type("A").unwrap();
        builder.set_field(98, b"0").unwrap();
        builder.set_field(108, b"30").unwrap();

        let frame = builder.prepare_for_send(1, 1_704_067_200_000).unwrap();
        let text = String::from_utf8(frame.to_vec()).unwrap();

        assert!(text.starts_with("8=FIX.4.4\u{1}9="));
        assert!(text.contains("35=A\u{1}"));
        assert!(text.contains("49=CLIENT\u{1}"));
        assert!(text.contains("56=SERVER\u{1}"));
        assert!(text.contains("34=00000001\u{1}"));
        assert!(text.contains("52=20240101-00:00:00.000\u{1}"));
        assert!(text.ends_with('\u{1}'));
        assert!(text[text.len() - 7..text.len() - 1].starts_with("10="));
    }

    #[test]
    fn rejects_duplicate_tag() {
        let mut builder = OutgoingBuilder::new("FIX.4.4", "CLIENT", "SERVER");
        builder.set_field(55, b"EUR/USD").unwrap();
        let err = builder.set_field(55, b"GBP/USD").unwrap_err();
        assert!(matches!(err, ProtoError::DuplicateTag(55)));
    }

    #[test]
    fn empty_value_is_ignored_not_duplicate() {
        let mut builder = OutgoingBuilder::new("FIX.4.4", "CLIENT", "SERVER");
        builder.set_field(58, b"").unwrap();
        builder.set_field(58, b"text").unwrap();
    }

    #[test]
    fn reset_clears_body_and_bitmap() {
        let mut builder = OutgoingBuilder::new("FIX.4.4", "CLIENT", "SERVER");
        builder.set_field(55, b"EUR/USD").unwrap();
        builder.reset();
        builder.set_field(55, b"GBP/USD").unwrap();
    }

    #[test]
    fn restamp_poss_dup_preserves_seq_num_and_sets_flag() {
        let mut builder = OutgoingBuilder::new("FIX.4.4", "CLIENT", "SERVER");
        builder.set_msg_type("D").unwrap();
        builder.set_field(55, b"EUR/USD").unwrap();
        let original = builder.prepare_for_send(7, 1_704_067_200_000).unwrap();

        let restamped = restamp_poss_dup(&original).unwrap();
        let view = FixMessageView::wrap(&restamped).unwrap();

        assert!(view.poss_dup());
        assert_eq!(view.int(34), Some(7));
        assert_eq!(view.raw(52).unwrap(), "20240101-00:00:00.000");
        assert_eq!(view.raw(55).unwrap(), "EUR/USD");
    }

    #[test]
    fn restamp_poss_dup_is_idempotent() {
        let mut builder = OutgoingBuilder::new("FIX.4.4", "CLIENT", "SERVER");
        builder.set_msg_type("D").unwrap();
        builder.set_field(43, b"Y").unwrap();
        let original = builder.prepare_for_send(3, 1_704_067_200_000).unwrap();

        let restamped = restamp_poss_dup(&original).unwrap();
        assert_eq!(restamped.as_ref(), original.as_ref());
    }

    #[test]
    fn checksum_is_correct() {
        let mut builder = OutgoingBuilder::new("FIX.4.4", "CLIENT", "SRV");
        builder.set_msg_type("0").unwrap();
        let frame = builder.prepare_for_send(42, 1_704_067_200_000).unwrap();

        let bytes = frame.to_vec();
        let checksum_pos = bytes.len() - 7;
        let computed: u8 = bytes[..checksum_pos].iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        let found_str = std::str::from_utf8(&bytes[checksum_pos + 3..checksum_pos + 6]).unwrap();
        let found: u8 = found_str.parse().unwrap();
        assert_eq!(computed, found);
    }
}
