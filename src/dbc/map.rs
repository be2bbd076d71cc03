//! Field mappings: named, typed views over raw record slots

use indexmap::IndexMap;

use crate::dbc::types::{FieldDef, FieldRule, FieldType, TypeTag};

/// Ordered mapping of field names to their type and repeat count
///
/// The raw slot count is kept up to date on every `add`/`remove`, so it
/// can be compared against a DBC's field count at no cost.
///
/// # Example
///
/// ```
/// use wdbc::{FieldMap, FieldType};
///
/// let mut map = FieldMap::new();
/// map.add_field("id", FieldType::Uint);
/// map.add_field("name", FieldType::String);
/// map.add("friend", FieldType::Int, 2);
///
/// assert_eq!(map.field_count(), 4);
/// assert_eq!(map.field_offset("friend2"), Some(3));
/// ```
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    fields: IndexMap<String, FieldRule>,
    /// Raw slots required in the DBC
    field_count: u32,
}

impl FieldMap {
    /// Create an empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, replacing (in place) any field with the same name
    ///
    /// A `count` of 0 is treated as 1 and counts above 255 as 255.
    pub fn add(&mut self, name: impl Into<String>, kind: FieldType, count: u32) {
        let rule = FieldRule::new(kind, count);
        if let Some(previous) = self.fields.insert(name.into(), rule) {
            self.field_count = self.field_count.saturating_sub(previous.raw_slots());
        }
        self.field_count = self.field_count.saturating_add(rule.raw_slots());
    }

    /// Add a single field of the given type
    pub fn add_field(&mut self, name: impl Into<String>, kind: FieldType) {
        self.add(name, kind, 1);
    }

    /// Remove a field if present
    pub fn remove(&mut self, name: &str) {
        if let Some(rule) = self.fields.shift_remove(name) {
            self.field_count = self.field_count.saturating_sub(rule.raw_slots());
        }
    }

    /// Whether a field with this exact name exists
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Rule for the field with this exact name
    pub fn get(&self, name: &str) -> Option<FieldRule> {
        self.fields.get(name).copied()
    }

    /// Number of logical fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the mapping has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in mapping order
    pub fn iter(&self) -> impl Iterator<Item = (&str, FieldRule)> {
        self.fields.iter().map(|(name, rule)| (name.as_str(), *rule))
    }

    /// Raw slot count this mapping requires from a DBC
    pub fn field_count(&self) -> u32 {
        self.field_count
    }

    /// Resolve a field name to its first raw slot
    ///
    /// Besides exact names, a trailing 1-based number addresses a single
    /// repeat of a multi-count field: `friend2` is the second `friend`.
    pub fn field_offset(&self, name: &str) -> Option<u32> {
        let (target, repeat) = if self.fields.contains_key(name) {
            (name, 0)
        } else {
            let (base, suffix) = split_numeric_suffix(name)?;
            let rule = self.fields.get(base)?;
            if suffix == 0 || suffix > rule.count {
                return None;
            }
            (base, suffix - 1)
        };

        let mut offset = 0;
        for (field, rule) in &self.fields {
            if field == target {
                return Some(offset + rule.raw_slots_up_to(repeat));
            }
            offset += rule.raw_slots();
        }
        None
    }

    /// Column names and type tags, with multi-count fields expanded
    pub fn schema(&self) -> Vec<(String, TypeTag)> {
        let mut columns = Vec::with_capacity(self.fields.len());
        for (name, rule) in &self.fields {
            for (key, _) in repeat_names(name, rule.count) {
                columns.push((key, rule.kind.tag()));
            }
        }
        columns
    }

    /// Field definitions in mapping order
    pub fn definitions(&self) -> Vec<FieldDef> {
        self.fields
            .iter()
            .map(|(name, rule)| FieldDef::new(name.clone(), rule.kind, rule.count))
            .collect()
    }
}

impl PartialEq for FieldMap {
    fn eq(&self, other: &Self) -> bool {
        self.field_count == other.field_count && self.fields.iter().eq(other.fields.iter())
    }
}

impl Eq for FieldMap {}

impl FromIterator<FieldDef> for FieldMap {
    fn from_iter<I: IntoIterator<Item = FieldDef>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        map.extend(iter);
        map
    }
}

impl Extend<FieldDef> for FieldMap {
    fn extend<I: IntoIterator<Item = FieldDef>>(&mut self, iter: I) {
        for def in iter {
            self.add(def.name, def.kind, def.count);
        }
    }
}

/// Names for each repeat of a field, with the repeat index
///
/// Single fields keep their name; repeated ones get a 1-based suffix.
pub(crate) fn repeat_names(name: &str, count: u32) -> impl Iterator<Item = (String, u32)> + '_ {
    (0..count).map(move |i| {
        let key = if count > 1 {
            format!("{}{}", name, i + 1)
        } else {
            name.to_string()
        };
        (key, i)
    })
}

/// Split `friend12` into `("friend", 12)`
fn split_numeric_suffix(name: &str) -> Option<(&str, u32)> {
    let digits = name.bytes().rev().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    // keep at least one character of base name
    let split = (name.len() - digits).max(1);
    let (base, suffix) = name.split_at(split);
    Some((base, suffix.parse().ok()?))
}
