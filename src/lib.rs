//! # wdbc
//!
//! A Rust library for reading, editing and creating WDBC (`.dbc`) client
//! database files.
//!
//! ## Overview
//!
//! DBC files hold fixed-size records of 4-byte fields plus a block of
//! NUL-terminated strings. This library provides:
//!
//! - Opening and validating DBC files, read-write or read-only
//! - Creating empty DBC files from a field count or a field mapping
//! - Typed field access by slot index or by mapped name
//! - Lookup of records by position or by id (the first field)
//! - Appending records and strings, with writes going straight to disk
//! - Guessing a field mapping from the raw bytes of an unmapped file
//!
//! ## Example - Reading
//!
//! ```rust,no_run
//! use wdbc::{Dbc, FieldMap, FieldType};
//!
//! fn main() -> wdbc::Result<()> {
//!     let mut map = FieldMap::new();
//!     map.add_field("id", FieldType::Uint);
//!     map.add_field("name", FieldType::String);
//!
//!     let dbc = Dbc::open_with_map("Item.dbc", map)?;
//!     for row in dbc.rows()? {
//!         println!("{:?}", row);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Example - Writing
//!
//! ```rust,no_run
//! use wdbc::{Dbc, FieldMap, FieldType, Value};
//!
//! fn main() -> wdbc::Result<()> {
//!     let mut map = FieldMap::new();
//!     map.add_field("id", FieldType::Uint);
//!     map.add_field("name", FieldType::String);
//!     map.add_field("points", FieldType::Int);
//!
//!     let mut dbc = Dbc::create("Score.dbc", map)?;
//!     dbc.add_record(&[Value::Uint(1), "John".into(), Value::Int(100)])?;
//!
//!     if let Some(mut record) = dbc.record_by_id_mut(1) {
//!         record.set_int("points", 150)?;
//!     }
//!     dbc.finalize()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Example - Inference
//!
//! ```rust,no_run
//! use wdbc::Dbc;
//!
//! fn main() -> wdbc::Result<()> {
//!     let mut dbc = Dbc::open("Unknown.dbc")?;
//!     let map = dbc.infer_map()?;
//!     for (name, rule) in map.iter() {
//!         println!("{} {}", name, rule.kind);
//!     }
//!     Ok(())
//! }
//! ```

pub mod dbc;
pub mod error;

pub use dbc::{
    infer_map, infer_map_with, Dbc, DbcHeader, DbcLayout, DbcOpenOptions, FieldDef, FieldMap,
    FieldRef, FieldRule, FieldType, InferenceOptions, Record, RecordMut, TypeTag, Value,
};
pub use error::{Error, Result};
