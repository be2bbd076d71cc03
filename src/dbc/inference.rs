//! Field mapping inference from raw record bytes
//!
//! Each raw slot gets one `u32` accumulator holding four packed counters,
//! filled by looking at a sample of records:
//!
//! | bits  | evidence                                   |
//! |-------|--------------------------------------------|
//! | 0-7   | sign bit set                               |
//! | 8-15  | value looks like an IEEE-754 float         |
//! | 16-23 | value is zero or the start of a string     |
//! | 24    | a non-zero string start was seen          |
//!
//! The sample is capped at 255 records so no counter can overflow into its
//! neighbour.

use std::collections::HashSet;
use tracing::debug;

use crate::dbc::container::Dbc;
use crate::dbc::map::FieldMap;
use crate::dbc::types::{FieldType, LOCALIZATION};
use crate::error::Result;

/// Largest sample the packed counters can hold
pub const MAX_SAMPLES: u32 = 255;

const SIGN_SHIFT: u32 = 0;
const FLOAT_SHIFT: u32 = 8;
const STRING_SHIFT: u32 = 16;
const STRING_FLAG: u32 = 1 << 24;

const FLOAT_RATIO: f64 = 0.6;
const STRING_RATIO: f64 = 0.99;
const SIGN_RATIO: f64 = 0.01;

/// Options for [`infer_map_with`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferenceOptions {
    /// Records to sample, counted from the first; capped at 255
    pub samples: u32,
    /// Attach the result when the DBC has no mapping yet
    pub attach: bool,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            samples: MAX_SAMPLES,
            attach: true,
        }
    }
}

impl InferenceOptions {
    /// Set the number of records to sample
    pub fn samples(mut self, samples: u32) -> Self {
        self.samples = samples;
        self
    }

    /// Set whether to attach the inferred mapping
    pub fn attach(mut self, attach: bool) -> Self {
        self.attach = attach;
        self
    }
}

/// Guess a field mapping for a DBC from its first 255 records
///
/// Fields are named `field1`, `field2`, ... after their 1-based raw slot.
/// The DBC is not modified.
pub fn infer_map(dbc: &Dbc) -> FieldMap {
    infer(dbc, MAX_SAMPLES)
}

/// Guess a field mapping and optionally attach it
///
/// With `attach` set the result is attached only when the DBC has no
/// mapping; an existing mapping is left alone.
pub fn infer_map_with(dbc: &mut Dbc, options: InferenceOptions) -> Result<FieldMap> {
    let map = infer(dbc, options.samples);
    if options.attach && dbc.map().is_none() {
        dbc.attach(Some(map.clone()))?;
    }
    Ok(map)
}

impl Dbc {
    /// Infer a mapping with default options, attaching it if none is attached
    pub fn infer_map(&mut self) -> Result<FieldMap> {
        infer_map_with(self, InferenceOptions::default())
    }
}

fn infer(dbc: &Dbc, samples: u32) -> FieldMap {
    let fields = dbc.field_count();
    let samples = samples.min(MAX_SAMPLES).min(dbc.record_count());
    let matrix = evidence(dbc, samples);

    let mut map = FieldMap::new();
    let mut i = 1u32;
    while i <= fields {
        let kind = classify(&matrix, i, samples);
        map.add_field(format!("field{}", i), kind);
        if kind == FieldType::StringLoc {
            i += LOCALIZATION;
        }
        i += 1;
    }

    debug!(
        path = %dbc.path().display(),
        samples,
        fields = map.len(),
        "Inferred field mapping"
    );
    map
}

/// Accumulate per-slot evidence over the first `samples` records
fn evidence(dbc: &Dbc, samples: u32) -> Vec<u32> {
    let starts = string_starts(dbc.string_block());
    let mut matrix = vec![0u32; dbc.field_count() as usize];

    for record in dbc.records().take(samples as usize) {
        for (slot, value) in record.as_raw_slots().into_iter().enumerate() {
            let Some(acc) = matrix.get_mut(slot) else {
                break;
            };
            if (value as i32) < 0 {
                *acc += 1 << SIGN_SHIFT;
            }
            if is_probable_float(value) {
                *acc += 1 << FLOAT_SHIFT;
            }
            if value == 0 || starts.contains(&value) {
                *acc += 1 << STRING_SHIFT;
                if value != 0 {
                    *acc |= STRING_FLAG;
                }
            }
        }
    }
    matrix
}

/// Offsets directly after a NUL, excluding the end of the block
fn string_starts(block: &[u8]) -> HashSet<u32> {
    let len = block.len();
    block
        .iter()
        .enumerate()
        .filter(|&(o, &b)| b == 0 && o + 1 < len.saturating_sub(1))
        .map(|(o, _)| (o + 1) as u32)
        .collect()
}

/// Whether the bit pattern looks like a float of sane magnitude
fn is_probable_float(bits: u32) -> bool {
    let exp = ((bits >> 23) & 0xFF) as i32 - 127;
    let mant = bits & 0x7F_FFFF;
    (-30..=30).contains(&exp) || (mant != 0 && mant & 0xFFFF == 0)
}

fn counter(acc: u32, shift: u32) -> u32 {
    (acc >> shift) & 0xFF
}

fn ratio(acc: u32, shift: u32, samples: u32) -> f64 {
    if samples == 0 {
        0.0
    } else {
        counter(acc, shift) as f64 / samples as f64
    }
}

/// Type for the 1-based slot `i`
fn classify(matrix: &[u32], i: u32, samples: u32) -> FieldType {
    let acc = matrix[(i - 1) as usize];

    if ratio(acc, FLOAT_SHIFT, samples) > FLOAT_RATIO {
        return FieldType::Float;
    }
    if acc & STRING_FLAG != 0 && ratio(acc, STRING_SHIFT, samples) > STRING_RATIO {
        let fields = matrix.len() as u32;
        if i + LOCALIZATION > fields {
            return FieldType::String;
        }
        let localized = (i + 1..=i + LOCALIZATION).all(|j| {
            let locale = matrix[(j - 1) as usize];
            counter(locale, STRING_SHIFT) == samples && locale & STRING_FLAG == 0
        });
        return if localized {
            FieldType::StringLoc
        } else {
            FieldType::String
        };
    }
    if ratio(acc, SIGN_SHIFT, samples) > SIGN_RATIO {
        return FieldType::Int;
    }
    FieldType::Uint
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbc::types::Value;
    use tempfile::{tempdir, TempDir};

    fn localized_map() -> FieldMap {
        let mut map = FieldMap::new();
        map.add_field("id", FieldType::Uint);
        map.add_field("name", FieldType::String);
        map.add_field("points", FieldType::Int);
        map.add_field("height", FieldType::Float);
        map.add_field("title", FieldType::StringLoc);
        map.add_field("flags", FieldType::Uint);
        map
    }

    fn sample_dbc() -> (TempDir, Dbc) {
        let dir = tempdir().unwrap();
        let mut dbc = Dbc::create(dir.path().join("Inferred.dbc"), localized_map()).unwrap();
        dbc.add_records([
            vec![Value::Uint(100), Value::from("John"), Value::Int(100), Value::Float(1.80), Value::from("Sir"), Value::Uint(0)],
            vec![Value::Uint(101), Value::from("Tim"), Value::Int(1337), Value::Float(1.75), Value::from("Lord"), Value::Uint(3)],
            vec![Value::Uint(102), Value::from("Pete"), Value::Int(-10), Value::Float(1.55), Value::from("Sir"), Value::Uint(7)],
        ])
        .unwrap();
        dbc.attach(None).unwrap();
        (dir, dbc)
    }

    fn kinds(map: &FieldMap) -> Vec<FieldType> {
        map.iter().map(|(_, rule)| rule.kind).collect()
    }

    #[test]
    fn test_probable_float() {
        assert!(is_probable_float(1.80f32.to_bits()));
        assert!(is_probable_float((-250.5f32).to_bits()));
        assert!(!is_probable_float(0));
        assert!(!is_probable_float(100));
        assert!(!is_probable_float(-10i32 as u32));
        // large exponent but round mantissa
        assert!(is_probable_float(1.0e20f32.to_bits() & !0xFFFF | 0x10000));
    }

    #[test]
    fn test_string_starts() {
        let starts = string_starts(b"\0ab\0c\0");
        assert!(starts.contains(&1));
        assert!(starts.contains(&4));
        assert!(!starts.contains(&6));
        assert!(!starts.contains(&0));
        assert!(string_starts(b"\0").is_empty());
    }

    #[test]
    fn test_infer_detects_types() {
        let (_dir, dbc) = sample_dbc();
        let map = infer_map(&dbc);

        assert_eq!(map.field_count(), dbc.field_count());
        assert_eq!(
            kinds(&map),
            [
                FieldType::Uint,
                FieldType::String,
                FieldType::Int,
                FieldType::Float,
                FieldType::StringLoc,
                FieldType::Uint,
            ]
        );
        let names: Vec<&str> = map.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["field1", "field2", "field3", "field4", "field5", "field22"]);
    }

    #[test]
    fn test_non_zero_locale_slot_demotes() {
        let (_dir, mut dbc) = sample_dbc();
        dbc.record_mut(1).unwrap().set_uint(7u32, 9).unwrap();

        let map = infer_map(&dbc);
        assert_eq!(map.field_count(), dbc.field_count());
        assert_eq!(map.get("field5").unwrap().kind, FieldType::String);
        // locale slots now stand on their own
        assert_eq!(map.get("field6").unwrap().kind, FieldType::Uint);
        assert_eq!(map.get("field8").unwrap().kind, FieldType::Uint);
        assert_eq!(map.len(), 22);
    }

    #[test]
    fn test_sample_is_capped_at_first_records() {
        let dir = tempdir().unwrap();
        let mut map = FieldMap::new();
        map.add_field("id", FieldType::Uint);
        map.add_field("delta", FieldType::Int);

        let mut dbc = Dbc::create(dir.path().join("Capped.dbc"), map).unwrap();
        dbc.add_records((0..300u32).map(|i| {
            let delta = if i < MAX_SAMPLES { 5 } else { -5 };
            vec![Value::Uint(1000 + i), Value::Int(delta)]
        }))
        .unwrap();
        dbc.attach(None).unwrap();
        assert_eq!(dbc.record_count(), 300);

        let map = infer_map(&dbc);
        assert_eq!(kinds(&map), [FieldType::Uint, FieldType::Uint]);

        // asking for more samples changes nothing
        let map = infer_map_with(&mut dbc, InferenceOptions::default().samples(1000)).unwrap();
        assert_eq!(kinds(&map), [FieldType::Uint, FieldType::Uint]);
    }

    #[test]
    fn test_infer_is_deterministic() {
        let (_dir, dbc) = sample_dbc();
        assert_eq!(infer_map(&dbc), infer_map(&dbc));
    }

    #[test]
    fn test_no_records_is_all_uint() {
        let dir = tempdir().unwrap();
        let dbc = Dbc::create(dir.path().join("Empty.dbc"), 5u32).unwrap();
        let map = infer_map(&dbc);
        assert_eq!(map.len(), 5);
        assert!(kinds(&map).iter().all(|&k| k == FieldType::Uint));

        let (_dir, dbc) = sample_dbc();
        let map = infer(&dbc, 0);
        assert!(kinds(&map).iter().all(|&k| k == FieldType::Uint));
    }

    #[test]
    fn test_infer_attaches_only_when_unmapped() {
        let (_dir, mut dbc) = sample_dbc();
        let inferred = dbc.infer_map().unwrap();
        assert_eq!(dbc.map(), Some(&inferred));

        dbc.attach(Some(localized_map())).unwrap();
        infer_map_with(&mut dbc, InferenceOptions::default()).unwrap();
        assert_eq!(dbc.map(), Some(&localized_map()));

        dbc.attach(None).unwrap();
        infer_map_with(&mut dbc, InferenceOptions::default().attach(false)).unwrap();
        assert!(dbc.map().is_none());
    }
}
