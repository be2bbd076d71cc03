//! Field kinds and scalar values for DBC records

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Size of a single raw field slot in bytes
pub const FIELD_SIZE: u32 = 4;

/// Number of extra locale slots that follow every localized string slot
pub const LOCALIZATION: u32 = 16;

/// Largest repeat count a field can have
pub const MAX_REPEATS: u32 = 255;

/// How the four bytes of a field slot are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Unsigned 32-bit integer
    #[default]
    Uint,
    /// Signed 32-bit integer
    Int,
    /// IEEE-754 single precision float
    Float,
    /// Offset into the string block
    String,
    /// Offset into the string block followed by 16 locale offsets
    StringLoc,
}

impl FieldType {
    /// Whether the slot holds a string block offset
    pub fn is_string(self) -> bool {
        matches!(self, FieldType::String | FieldType::StringLoc)
    }

    /// Raw slots consumed by a single repeat of this type
    pub fn slots_per_repeat(self) -> u32 {
        match self {
            FieldType::StringLoc => 1 + LOCALIZATION,
            _ => 1,
        }
    }

    /// Semantic tag handed to exporters
    pub fn tag(self) -> TypeTag {
        match self {
            FieldType::Uint => TypeTag::Uint,
            FieldType::Int => TypeTag::Int,
            FieldType::Float => TypeTag::Float,
            FieldType::String | FieldType::StringLoc => TypeTag::String,
        }
    }

    /// Lowercase type name
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Uint => "uint",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::String => "string",
            FieldType::StringLoc => "string_loc",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uint" | "dbc_uint" => Ok(FieldType::Uint),
            "int" | "dbc_int" => Ok(FieldType::Int),
            "float" | "dbc_float" => Ok(FieldType::Float),
            "string" | "dbc_string" => Ok(FieldType::String),
            "string_loc" | "dbc_string_loc" => Ok(FieldType::StringLoc),
            other => Err(format!("Unknown field type: {}", other)),
        }
    }
}

/// Type tag describing a column of exported data
///
/// Localized strings collapse to [`TypeTag::String`] since only their base
/// slot is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Uint,
    Int,
    Float,
    String,
}

/// Type and repeat count of one logical field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRule {
    pub kind: FieldType,
    /// Number of repeats, never zero
    pub count: u32,
}

impl FieldRule {
    /// Rule with the count clamped to `1..=MAX_REPEATS`
    pub fn new(kind: FieldType, count: u32) -> Self {
        Self {
            kind,
            count: count.clamp(1, MAX_REPEATS),
        }
    }

    /// Raw slots occupied by this field
    pub fn raw_slots(&self) -> u32 {
        self.raw_slots_up_to(self.count)
    }

    /// Raw slots occupied by the first `repeats` repeats (clamped to the count)
    pub fn raw_slots_up_to(&self, repeats: u32) -> u32 {
        repeats
            .min(self.count)
            .saturating_mul(self.kind.slots_per_repeat())
    }
}

/// A `(name, type, count)` triple, the unit mapping definitions are stored as
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldType,
    pub count: u32,
}

impl FieldDef {
    /// Create a definition triple
    pub fn new(name: impl Into<String>, kind: FieldType, count: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            count,
        }
    }
}

/// A decoded field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Uint(u32),
    Int(i32),
    Float(f32),
    String(String),
}

impl Value {
    /// Coerce to an unsigned integer
    pub fn as_u32(&self) -> u32 {
        match self {
            Value::Uint(v) => *v,
            Value::Int(v) => *v as u32,
            Value::Float(v) => *v as u32,
            Value::String(s) => s.trim().parse().unwrap_or(0),
        }
    }

    /// Coerce to a signed integer
    pub fn as_i32(&self) -> i32 {
        match self {
            Value::Uint(v) => *v as i32,
            Value::Int(v) => *v,
            Value::Float(v) => *v as i32,
            Value::String(s) => s.trim().parse().unwrap_or(0),
        }
    }

    /// Coerce to a float
    pub fn as_f32(&self) -> f32 {
        match self {
            Value::Uint(v) => *v as f32,
            Value::Int(v) => *v as f32,
            Value::Float(v) => *v,
            Value::String(s) => s.trim().parse().unwrap_or(0.0),
        }
    }

    /// Borrow the string content, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Encode as the raw little-endian slot value for the given kind
    ///
    /// String kinds are not handled here since they need the string block.
    pub(crate) fn to_slot(&self, kind: FieldType) -> u32 {
        match kind {
            FieldType::Int => self.as_i32() as u32,
            FieldType::Float => self.as_f32().to_bits(),
            _ => self.as_u32(),
        }
    }

    /// Text stored in the string block when written to a string field
    pub(crate) fn to_text(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Uint(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => f.write_str(s),
        }
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Uint(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_slot_counts() {
        assert_eq!(FieldRule::new(FieldType::Uint, 0).raw_slots(), 1);
        assert_eq!(FieldRule::new(FieldType::Int, 3).raw_slots(), 3);
        assert_eq!(FieldRule::new(FieldType::StringLoc, 1).raw_slots(), 17);
        assert_eq!(FieldRule::new(FieldType::StringLoc, 2).raw_slots(), 34);
        assert_eq!(FieldRule::new(FieldType::StringLoc, 2).raw_slots_up_to(1), 17);
        assert_eq!(FieldRule::new(FieldType::Uint, 2).raw_slots_up_to(9), 2);
    }

    #[test]
    fn test_rule_count_is_clamped() {
        let rule = FieldRule::new(FieldType::StringLoc, 300_000_000);
        assert_eq!(rule.count, MAX_REPEATS);
        assert_eq!(rule.raw_slots(), 255 * 17);

        let unchecked = FieldRule {
            kind: FieldType::StringLoc,
            count: u32::MAX,
        };
        assert_eq!(unchecked.raw_slots(), u32::MAX);
    }

    #[test]
    fn test_field_type_from_str() {
        assert_eq!("uint".parse::<FieldType>(), Ok(FieldType::Uint));
        assert_eq!("DBC_STRING_LOC".parse::<FieldType>(), Ok(FieldType::StringLoc));
        assert!("double".parse::<FieldType>().is_err());
        assert_eq!(FieldType::StringLoc.tag(), TypeTag::String);
    }

    #[test]
    fn test_value_coercion() {
        assert_eq!(Value::Int(-1).to_slot(FieldType::Uint), u32::MAX);
        assert_eq!(Value::Uint(7).to_slot(FieldType::Float), 7.0f32.to_bits());
        assert_eq!(Value::from("42").as_u32(), 42);
        assert_eq!(Value::from("abc").as_i32(), 0);
        assert_eq!(Value::Float(1.5).to_text(), "1.5");
    }
}
