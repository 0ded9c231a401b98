//! C3.2 — the incoming flyweight: indexes a complete frame's top-level
//! fields in one pass, without copying any field value out of the backing
//! buffer.
//!
//! Field storage follows the zero-copy `RawMessage`/`FieldRef` convention
//! from the IronFix reference (`other_examples/.../ironfix-core-src-message.rs.rs`):
//! an inline `SmallVec` of `(tag, FieldRef)` pairs in wire order, so small
//! messages never heap-allocate the index itself.

use smallvec::SmallVec;

use crate::{
    buffer::ByteSeq,
    dictionary::{Dictionary, GroupDef},
    error::ProtoError,
    fix::frame::SOH,
};

/// `BeginString` tag.
pub const TAG_BEGIN_STRING: u32 = 8;
/// `BodyLength` tag.
pub const TAG_BODY_LENGTH: u32 = 9;
/// `MsgType` tag.
pub const TAG_MSG_TYPE: u32 = 35;
/// `SenderCompID` tag.
pub const TAG_SENDER_COMP_ID: u32 = 49;
/// `TargetCompID` tag.
pub const TAG_TARGET_COMP_ID: u32 = 56;
/// `MsgSeqNum` tag.
pub const TAG_SEQ_NUM: u32 = 34;
/// `SendingTime` tag.
pub const TAG_SENDING_TIME: u32 = 52;
/// `CheckSum` tag.
pub const TAG_CHECKSUM: u32 = 10;
/// `PossDupFlag` tag.
pub const TAG_POSS_DUP: u32 = 43;
/// `GapFillFlag` tag.
pub const TAG_GAP_FILL: u32 = 123;
/// `NewSeqNo` tag.
pub const TAG_NEW_SEQ_NO: u32 = 36;

/// Offset and length of a field's value within the backing buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRef {
    /// Byte offset of the value's first byte.
    pub offset: u32,
    /// Length of the value in bytes.
    pub len: u32,
}

type FieldEntry = (u32, FieldRef);

/// Up to 32 top-level fields are stored inline before spilling to the heap —
/// most session and admin messages fit comfortably within that.
type FieldList = SmallVec<[FieldEntry; 32]>;

/// Zero-copy view over one complete, already-framed FIX message.
#[derive(Debug, Clone)]
pub struct FixMessageView<'a> {
    buf: &'a [u8],
    fields: FieldList,
}

impl<'a> FixMessageView<'a> {
    /// Indexes every top-level field of `buf` in one pass.
    ///
    /// `buf` must be exactly one complete, SOH-terminated frame as produced
    /// by [`crate::fix::frame::FrameScanner`] — this does not re-validate
    /// the checksum or body length.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::InvalidHeader`] if a `tag=value` pair is
    /// malformed (missing `=`, non-numeric tag).
    pub fn wrap(buf: &'a [u8]) -> Result<Self, ProtoError> {
        let mut fields = FieldList::new();
        let mut pos = 0usize;

        while pos < buf.len() {
            let Some(eq) = memchr::memchr(b'=', &buf[pos..]) else {
                break;
            };
            let eq = pos + eq;

            let tag: u32 = std::str::from_utf8(&buf[pos..eq])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ProtoError::InvalidHeader(format!("non-numeric tag at {pos}")))?;

            let value_start = eq + 1;
            let Some(soh_rel) = memchr::memchr(SOH, &buf[value_start..]) else {
                return Err(ProtoError::InvalidHeader("field not SOH-terminated".to_string()));
            };
            let value_end = value_start + soh_rel;

            fields.push((
                tag,
                FieldRef {
                    offset: u32::try_from(value_start).unwrap_or(u32::MAX),
                    len: u32::try_from(value_end - value_start).unwrap_or(u32::MAX),
                },
            ));

            pos = value_end + 1;
        }

        Ok(Self { buf, fields })
    }

    fn field_ref(&self, tag: u32) -> Option<FieldRef> {
        self.fields.iter().find(|(t, _)| *t == tag).map(|(_, r)| *r)
    }

    /// Raw bytes of `tag`'s value, as a zero-copy [`ByteSeq`].
    #[must_use]
    pub fn raw(&self, tag: u32) -> Option<ByteSeq<'a>> {
        let r = self.field_ref(tag)?;
        self.buf.get(r.offset as usize..(r.offset + r.len) as usize).map(ByteSeq::new)
    }

    /// True if `tag` is present.
    #[must_use]
    pub fn has(&self, tag: u32) -> bool {
        self.field_ref(tag).is_some()
    }

    /// Parses `tag`'s value as a signed integer.
    #[must_use]
    pub fn int(&self, tag: u32) -> Option<i64> {
        self.raw(tag)?.parse_i64()
    }

    /// The single character at `tag`, if its value is exactly one byte.
    #[must_use]
    pub fn char(&self, tag: u32) -> Option<u8> {
        let seq = self.raw(tag)?;
        if seq.len() == 1 { seq.get(0) } else { None }
    }

    /// `Y`/`N` boolean fields.
    #[must_use]
    pub fn bool(&self, tag: u32) -> Option<bool> {
        match self.char(tag)? {
            b'Y' => Some(true),
            b'N' => Some(false),
            _ => None,
        }
    }

    /// A fixed-precision decimal, stored as `(numerator, decimal_places)`
    /// so callers never perform floating-point arithmetic on prices.
    #[must_use]
    pub fn decimal(&self, tag: u32) -> Option<(i64, u32)> {
        let seq = self.raw(tag)?;
        let text = std::str::from_utf8(seq.as_bytes()).ok()?;
        match text.split_once('.') {
            Some((whole, frac)) => {
                let scale = u32::try_from(frac.len()).ok()?;
                let combined = format!("{whole}{frac}");
                combined.parse::<i64>().ok().map(|n| (n, scale))
            },
            None => text.parse::<i64>().ok().map(|n| (n, 0)),
        }
    }

    /// `MsgType` (tag 35).
    #[must_use]
    pub fn msg_type(&self) -> Option<ByteSeq<'a>> {
        self.raw(TAG_MSG_TYPE)
    }

    /// `MsgSeqNum` (tag 34).
    #[must_use]
    pub fn seq_num(&self) -> Option<i64> {
        self.int(TAG_SEQ_NUM)
    }

    /// `PossDupFlag` (tag 43).
    #[must_use]
    pub fn poss_dup(&self) -> bool {
        self.bool(TAG_POSS_DUP).unwrap_or(false)
    }

    /// `GapFillFlag` (tag 123).
    #[must_use]
    pub fn gap_fill(&self) -> bool {
        self.bool(TAG_GAP_FILL).unwrap_or(false)
    }

    /// `NewSeqNo` (tag 36).
    #[must_use]
    pub fn new_seq_no(&self) -> Option<i64> {
        self.int(TAG_NEW_SEQ_NO)
    }

    /// `SenderCompID` (tag 49).
    #[must_use]
    pub fn sender_comp_id(&self) -> Option<ByteSeq<'a>> {
        self.raw(TAG_SENDER_COMP_ID)
    }

    /// `TargetCompID` (tag 56).
    #[must_use]
    pub fn target_comp_id(&self) -> Option<ByteSeq<'a>> {
        self.raw(TAG_TARGET_COMP_ID)
    }

    /// `SendingTime` (tag 52).
    #[must_use]
    pub fn sending_time(&self) -> Option<ByteSeq<'a>> {
        self.raw(TAG_SENDING_TIME)
    }

    /// Iterates every top-level field in wire order, including the framing
    /// fields (`BeginString`/`BodyLength`/`CheckSum`).
    pub fn iter_fields(&self) -> impl Iterator<Item = (u32, ByteSeq<'a>)> + '_ {
        let buf = self.buf;
        self.fields.iter().map(move |&(tag, r)| {
            (tag, ByteSeq::new(&buf[r.offset as usize..(r.offset + r.len) as usize]))
        })
    }

    /// Resolves repeating-group instances for the group whose count tag is
    /// `count_tag`, consulting `dict` for the group's first-tag boundary.
    /// Each returned [`GroupInstance`] can itself be queried for nested
    /// groups by calling `repeating_group` again with a narrower dictionary
    /// lookup scoped to the instance's own tags.
    #[must_use]
    pub fn repeating_group(&self, dict: &Dictionary, count_tag: u32) -> Vec<GroupInstance<'_>> {
        let Some(group_def) = dict.group_by_count_tag(count_tag) else {
            return Vec::new();
        };
        let Some(count) = self.int(count_tag) else {
            return Vec::new();
        };
        let Some(start_idx) = self.fields.iter().position(|(t, _)| *t == count_tag) else {
            return Vec::new();
        };

        split_group_instances(&self.fields[start_idx + 1..], group_def, count.max(0) as usize)
    }
}

fn split_group_instances<'b>(
    fields: &'b [FieldEntry],
    group_def: &GroupDef,
    expected_count: usize,
) -> Vec<GroupInstance<'b>> {
    let mut instances = Vec::with_capacity(expected_count);
    let boundaries: Vec<usize> = fields
        .iter()
        .enumerate()
        .filter_map(|(i, (tag, _))| (*tag == group_def.first_tag).then_some(i))
        .collect();

    for (i, &start) in boundaries.iter().enumerate() {
        let end = boundaries.get(i + 1).copied().unwrap_or(fields.len());
        instances.push(GroupInstance { fields: &fields[start..end] });
        if instances.len() == expected_count {
            break;
        }
    }

    instances
}

/// One instance of a repeating group: a contiguous slice of the parent
/// message's field list.
#[derive(Debug, Clone, Copy)]
pub struct GroupInstance<'a> {
    fields: &'a [FieldEntry],
}

impl<'a> GroupInstance<'a> {
    /// Raw value of `tag` within this group instance.
    #[must_use]
    pub fn field(&self, buf: &'a [u8], tag: u32) -> Option<ByteSeq<'a>> {
        let (_, r) = self.fields.iter().find(|(t, _)| *t == tag)?;
        buf.get(r.offset as usize..(r.offset + r.len) as usize).map(ByteSeq::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::GroupDef;

    fn msg(body: &str) -> Vec<u8> {
        body.replace('|', "\u{1}").into_bytes()
    }

    #[test]
    fn indexes_admin_fields() {
        let raw = msg("8=FIX.4.4|9=5|35=0|34=1|49=A|56=B|52=20240101-00:00:00.000|10=000|");
        let view = FixMessageView::wrap(&raw).unwrap();

        assert_eq!(view.msg_type().unwrap(), "0");
        assert_eq!(view.seq_num(), Some(1));
        assert_eq!(view.sender_comp_id().unwrap(), "A");
        assert_eq!(view.target_comp_id().unwrap(), "B");
    }

    #[test]
    fn decimal_preserves_scale() {
        let raw = msg("44=150.25|");
        let view = FixMessageView::wrap(&raw).unwrap();
        assert_eq!(view.decimal(44), Some((15025, 2)));
    }

    #[test]
    fn bool_parses_y_n() {
        let raw = msg("43=Y|123=N|");
        let view = FixMessageView::wrap(&raw).unwrap();
        assert_eq!(view.poss_dup(), true);
        assert_eq!(view.gap_fill(), false);
    }

    #[test]
    fn repeating_group_splits_instances() {
        let mut dict = Dictionary::new();
        dict.add_group(GroupDef {
            name: "NoPartyIDs".to_string(),
            count_tag: 453,
            first_tag: 448,
            member_tags: vec![448, 447],
            nested_groups: vec![],
        });

        let raw = msg("453=2|448=ALICE|447=D|448=BOB|447=D|");
        let view = FixMessageView::wrap(&raw).unwrap();

        let instances = view.repeating_group(&dict, 453);
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].field(&raw, 448).unwrap(), "ALICE");
        assert_eq!(instances[1].field(&raw, 448).unwrap(), "BOB");
    }

    #[test]
    fn rejects_non_numeric_tag() {
        let raw = msg("abc=1|");
        assert!(FixMessageView::wrap(&raw).is_err());
    }
}
