//! C2 — FIX dictionary: tag↔name/type tables, message→tags, and
//! repeating-group membership.
//!
//! Loading the dictionary from an XML document is external-collaborator
//! territory (the core receives a pre-built `Dictionary`, the same way it
//! receives pre-parsed configuration per spec §1); this module only models
//! the in-memory structure and its first-wins import merge.

use std::collections::HashMap;

/// The wire type of a field's value, used to pick an accessor on the
/// incoming flyweight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Plain ASCII string.
    Str,
    /// Signed integer.
    Int,
    /// `Y`/`N` boolean.
    Bool,
    /// Fixed-precision decimal, stored as integer numerator + scale.
    Price,
    /// `YYYYMMDD-HH:MM:SS.sss` UTC timestamp.
    UtcTimestamp,
    /// Single printable character.
    Char,
}

/// A single `<field>` definition.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Numeric tag.
    pub tag: u32,
    /// Field name, e.g. `"SenderCompID"`.
    pub name: String,
    /// Wire type.
    pub field_type: FieldType,
    /// Enumerated value → description, if the field is enumerated.
    pub enum_values: HashMap<String, String>,
}

/// A `<group>` definition: a repeating block introduced by a count tag.
#[derive(Debug, Clone)]
pub struct GroupDef {
    /// Group name.
    pub name: String,
    /// Tag whose value is the repeat count (`NumInGroup`).
    pub count_tag: u32,
    /// First tag of each group instance — delimits group boundaries.
    pub first_tag: u32,
    /// Tags that are members of one group instance, in order.
    pub member_tags: Vec<u32>,
    /// Nested groups referenced from within this one, by name.
    pub nested_groups: Vec<String>,
}

/// A `<message>` definition.
#[derive(Debug, Clone)]
pub struct MessageDef {
    /// `MsgType` (tag 35) value, e.g. `"D"`.
    pub msg_type: String,
    /// Human-readable name, e.g. `"NewOrderSingle"`.
    pub name: String,
    /// Own (non-group) tags.
    pub tags: Vec<u32>,
    /// Names of groups referenced by this message.
    pub group_refs: Vec<String>,
}

/// The full set of field, message, and group definitions for one FIX
/// version.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    fields: HashMap<u32, FieldDef>,
    messages: HashMap<String, MessageDef>,
    groups: HashMap<String, GroupDef>,
    /// `count_tag` → group name, for `is_repeating_group_start`.
    group_by_count_tag: HashMap<u32, String>,
}

impl Dictionary {
    /// An empty dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field definition. A later call with the same tag overwrites
    /// the earlier one (the caller controls import order for first-wins
    /// semantics via [`Dictionary::merge_first_wins`]).
    pub fn add_field(&mut self, field: FieldDef) {
        self.fields.insert(field.tag, field);
    }

    /// Adds a group definition.
    pub fn add_group(&mut self, group: GroupDef) {
        self.group_by_count_tag.insert(group.count_tag, group.name.clone());
        self.groups.insert(group.name.clone(), group);
    }

    /// Adds a message definition.
    pub fn add_message(&mut self, message: MessageDef) {
        self.messages.insert(message.msg_type.clone(), message);
    }

    /// Looks up a field definition by tag.
    #[must_use]
    pub fn field(&self, tag: u32) -> Option<&FieldDef> {
        self.fields.get(&tag)
    }

    /// Looks up a field definition by name.
    #[must_use]
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDef> {
        self.fields.values().find(|f| f.name == name)
    }

    /// Looks up a group definition by name.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&GroupDef> {
        self.groups.get(name)
    }

    /// Looks up the group whose count tag is `tag`.
    #[must_use]
    pub fn group_by_count_tag(&self, tag: u32) -> Option<&GroupDef> {
        self.group_by_count_tag.get(&tag).and_then(|name| self.groups.get(name))
    }

    /// True if `tag` is the count tag of some repeating group.
    #[must_use]
    pub fn is_repeating_group_start(&self, tag: u32) -> bool {
        self.group_by_count_tag.contains_key(&tag)
    }

    /// The name of the repeating group whose count tag is `tag`.
    #[must_use]
    pub fn repeating_group_name(&self, tag: u32) -> Option<&str> {
        self.group_by_count_tag.get(&tag).map(String::as_str)
    }

    /// Looks up a message definition by `MsgType`.
    #[must_use]
    pub fn message(&self, msg_type: &str) -> Option<&MessageDef> {
        self.messages.get(msg_type)
    }

    /// All tags valid for `msg_type`: the message's own tags plus the
    /// count- and member-tags of every group it (transitively) references.
    #[must_use]
    pub fn message_tags(&self, msg_type: &str) -> Vec<u32> {
        let Some(message) = self.messages.get(msg_type) else {
            return Vec::new();
        };

        let mut tags = message.tags.clone();
        let mut seen_groups = Vec::new();
        for group_name in &message.group_refs {
            self.collect_group_tags(group_name, &mut tags, &mut seen_groups);
        }
        tags
    }

    fn collect_group_tags(&self, group_name: &str, tags: &mut Vec<u32>, seen: &mut Vec<String>) {
        if seen.iter().any(|g| g == group_name) {
            return;
        }
        seen.push(group_name.to_string());

        let Some(group) = self.groups.get(group_name) else {
            return;
        };

        tags.push(group.count_tag);
        tags.extend(group.member_tags.iter().copied());
        for nested in &group.nested_groups {
            self.collect_group_tags(nested, tags, seen);
        }
    }

    /// Merges `imported` into `self` using first-wins semantics: entries
    /// already present in `self` are kept; only new keys are copied over.
    /// Matches `<import file="..."/>` resolution, which is parsed
    /// depth-first and merged first-wins.
    pub fn merge_first_wins(&mut self, imported: &Self) {
        for (tag, field) in &imported.fields {
            self.fields.entry(*tag).or_insert_with(|| field.clone());
        }
        for (name, group) in &imported.groups {
            if !self.groups.contains_key(name) {
                self.group_by_count_tag.entry(group.count_tag).or_insert_with(|| name.clone());
                self.groups.insert(name.clone(), group.clone());
            }
        }
        for (msg_type, message) in &imported.messages {
            self.messages.entry(msg_type.clone()).or_insert_with(|| message.clone());
        }
    }
}
