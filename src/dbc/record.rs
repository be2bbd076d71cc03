//! Typed access to single DBC records

use byteorder::{ByteOrder, LittleEndian};
use indexmap::IndexMap;
use std::cell::OnceCell;

use crate::dbc::container::Dbc;
use crate::dbc::map::{repeat_names, FieldMap};
use crate::dbc::types::{FieldType, Value, FIELD_SIZE};
use crate::error::{Error, Result};

/// A field addressed by raw slot index or by mapped name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRef<'a> {
    /// Zero-based raw slot
    Index(u32),
    /// Name in the attached mapping, optionally with a repeat suffix
    Name(&'a str),
}

impl From<u32> for FieldRef<'_> {
    fn from(slot: u32) -> Self {
        FieldRef::Index(slot)
    }
}

impl<'a> From<&'a str> for FieldRef<'a> {
    fn from(name: &'a str) -> Self {
        FieldRef::Name(name)
    }
}

/// Read-only view of one record
pub struct Record<'a> {
    dbc: &'a Dbc,
    position: u32,
    id: OnceCell<u32>,
}

impl<'a> Record<'a> {
    pub(crate) fn new(dbc: &'a Dbc, position: u32) -> Self {
        Self {
            dbc,
            position,
            id: OnceCell::new(),
        }
    }

    /// Zero-based position in the DBC
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Absolute byte offset of this record in the file
    pub fn offset(&self) -> u64 {
        self.dbc.header().record_offset(self.position)
    }

    /// Identifier, the first field read as an unsigned integer
    pub fn id(&self) -> u32 {
        *self
            .id
            .get_or_init(|| self.dbc.read_slot(self.position, 0).unwrap_or(0))
    }

    /// Raw record bytes
    pub fn data(&self) -> &'a [u8] {
        self.dbc.record_bytes(self.position)
    }

    /// Read a field as the given type
    ///
    /// Returns `Ok(None)` when the slot lies beyond the end of the record.
    pub fn get<'n>(&self, field: impl Into<FieldRef<'n>>, kind: FieldType) -> Result<Option<Value>> {
        let slot = self.dbc.resolve(field.into())?;
        Ok(decode_slot(self.dbc, self.position, slot, kind))
    }

    /// Read the raw slot as the given type
    pub fn get_by_index(&self, slot: u32, kind: FieldType) -> Result<Option<Value>> {
        self.get(FieldRef::Index(slot), kind)
    }

    /// Read the mapped field as the given type
    pub fn get_by_name(&self, name: &str, kind: FieldType) -> Result<Option<Value>> {
        self.get(FieldRef::Name(name), kind)
    }

    /// Read a field as an unsigned integer
    pub fn get_uint<'n>(&self, field: impl Into<FieldRef<'n>>) -> Result<Option<u32>> {
        Ok(self.get(field, FieldType::Uint)?.map(|v| v.as_u32()))
    }

    /// Read a field as a signed integer
    pub fn get_int<'n>(&self, field: impl Into<FieldRef<'n>>) -> Result<Option<i32>> {
        Ok(self.get(field, FieldType::Int)?.map(|v| v.as_i32()))
    }

    /// Read a field as a float
    pub fn get_float<'n>(&self, field: impl Into<FieldRef<'n>>) -> Result<Option<f32>> {
        Ok(self.get(field, FieldType::Float)?.map(|v| v.as_f32()))
    }

    /// Read a field as a string block offset and resolve it
    pub fn get_string<'n>(&self, field: impl Into<FieldRef<'n>>) -> Result<Option<String>> {
        Ok(self.get(field, FieldType::String)?.map(|v| v.to_text()))
    }

    /// Decode the whole record with the given mapping, or the attached one
    ///
    /// Repeated fields are named `name1..nameN`. Only the base slot of a
    /// localized string is decoded; its locale slots are skipped.
    pub fn extract(&self, map: Option<&FieldMap>) -> Result<IndexMap<String, Value>> {
        let map = map
            .or_else(|| self.dbc.map())
            .ok_or_else(|| Error::NoMapAttached(self.dbc.path().to_path_buf()))?;
        Ok(self.decode(map))
    }

    pub(crate) fn decode(&self, map: &FieldMap) -> IndexMap<String, Value> {
        let mut fields = IndexMap::with_capacity(map.len());
        let mut slot = 0;
        for (name, rule) in map.iter() {
            for (key, _) in repeat_names(name, rule.count) {
                let value = decode_slot(self.dbc, self.position, slot, rule.kind)
                    .unwrap_or_else(|| zero_value(rule.kind));
                fields.insert(key, value);
                slot += rule.kind.slots_per_repeat();
            }
        }
        fields
    }

    /// All slots as unsigned integers, no mapping applied
    pub fn as_raw_slots(&self) -> Vec<u32> {
        self.data()
            .chunks_exact(FIELD_SIZE as usize)
            .map(LittleEndian::read_u32)
            .collect()
    }

    /// Human-readable dump of the record
    ///
    /// Uses the attached mapping when `use_map` is set and one is attached,
    /// raw slots otherwise.
    pub fn dump(&self, use_map: bool) -> String {
        let mut out = format!("Record #{} (position {})\n", self.id(), self.position);
        match self.dbc.map().filter(|_| use_map) {
            Some(map) => {
                for (name, value) in self.decode(map) {
                    out.push_str(&format!("  {} = {:?}\n", name, value));
                }
            }
            None => {
                for (slot, value) in self.as_raw_slots().into_iter().enumerate() {
                    out.push_str(&format!("  [{}] = {}\n", slot, value));
                }
            }
        }
        out
    }
}

impl std::fmt::Debug for Record<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("position", &self.position)
            .field("id", &self.id())
            .finish()
    }
}

impl PartialEq for Record<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.dbc, other.dbc) && self.position == other.position
    }
}

/// Writable view of one record
///
/// Every write goes to disk at the field's byte offset and to the
/// in-memory record array.
pub struct RecordMut<'a> {
    dbc: &'a mut Dbc,
    position: u32,
}

impl<'a> RecordMut<'a> {
    pub(crate) fn new(dbc: &'a mut Dbc, position: u32) -> Self {
        Self { dbc, position }
    }

    /// Read-only view of the same record
    pub fn as_record(&self) -> Record<'_> {
        Record::new(self.dbc, self.position)
    }

    /// Zero-based position in the DBC
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Identifier, the first field read as an unsigned integer
    pub fn id(&self) -> u32 {
        self.dbc.read_slot(self.position, 0).unwrap_or(0)
    }

    /// Write a field as the given type
    ///
    /// String types intern the value first and store its offset. Writing
    /// past the end of the record does nothing.
    pub fn set<'n>(
        &mut self,
        field: impl Into<FieldRef<'n>>,
        value: impl Into<Value>,
        kind: FieldType,
    ) -> Result<()> {
        if !self.dbc.is_writable() {
            return Err(Error::NotWritable(self.dbc.path().to_path_buf()));
        }
        let slot = self.dbc.resolve(field.into())?;
        if (slot as u64 + 1) * FIELD_SIZE as u64 > self.dbc.record_size() as u64 {
            return Ok(());
        }

        let value = value.into();
        let raw = if kind.is_string() {
            self.dbc.add_string(&value.to_text())?
        } else {
            value.to_slot(kind)
        };
        self.dbc.write_slot(self.position, slot, raw)
    }

    /// Write the raw slot as the given type
    pub fn set_by_index(&mut self, slot: u32, value: impl Into<Value>, kind: FieldType) -> Result<()> {
        self.set(FieldRef::Index(slot), value, kind)
    }

    /// Write the mapped field as the given type
    pub fn set_by_name(&mut self, name: &str, value: impl Into<Value>, kind: FieldType) -> Result<()> {
        self.set(FieldRef::Name(name), value, kind)
    }

    /// Write a field as an unsigned integer
    pub fn set_uint<'n>(&mut self, field: impl Into<FieldRef<'n>>, value: u32) -> Result<()> {
        self.set(field, value, FieldType::Uint)
    }

    /// Write a field as a signed integer
    pub fn set_int<'n>(&mut self, field: impl Into<FieldRef<'n>>, value: i32) -> Result<()> {
        self.set(field, value, FieldType::Int)
    }

    /// Write a field as a float
    pub fn set_float<'n>(&mut self, field: impl Into<FieldRef<'n>>, value: f32) -> Result<()> {
        self.set(field, value, FieldType::Float)
    }

    /// Intern a string and write its offset to the field
    pub fn set_string<'n>(&mut self, field: impl Into<FieldRef<'n>>, value: &str) -> Result<()> {
        self.set(field, value, FieldType::String)
    }
}

fn decode_slot(dbc: &Dbc, position: u32, slot: u32, kind: FieldType) -> Option<Value> {
    let raw = dbc.read_slot(position, slot)?;
    Some(match kind {
        FieldType::Uint => Value::Uint(raw),
        FieldType::Int => Value::Int(raw as i32),
        FieldType::Float => Value::Float(f32::from_bits(raw)),
        FieldType::String | FieldType::StringLoc => {
            Value::String(dbc.string_lossy(raw).unwrap_or_default())
        }
    })
}

fn zero_value(kind: FieldType) -> Value {
    match kind {
        FieldType::Uint => Value::Uint(0),
        FieldType::Int => Value::Int(0),
        FieldType::Float => Value::Float(0.0),
        FieldType::String | FieldType::StringLoc => Value::String(String::new()),
    }
}
