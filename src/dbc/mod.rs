//! WDBC client database files
//!
//! DBC files are flat tables of fixed-size records used by the game client.
//! Every field occupies one little-endian 4-byte slot; strings are stored as
//! offsets into a trailing string block.
//!
//! ## Format Overview
//!
//! A DBC file consists of:
//! - 20 byte header: `WDBC` signature, record count, field count, record
//!   size and string block size
//! - Record array of `record_count * record_size` bytes
//! - String block of NUL-terminated strings, starting with a NUL so that
//!   offset 0 is the empty string
//!
//! The file itself carries no field names or types. Those come from a
//! [`FieldMap`], built by hand, from stored definitions, or guessed from the
//! raw bytes with [`infer_map`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use wdbc::dbc::{Dbc, FieldMap, FieldType};
//!
//! let mut map = FieldMap::new();
//! map.add_field("id", FieldType::Uint);
//! map.add_field("name", FieldType::StringLoc);
//!
//! let dbc = Dbc::open_with_map("Spell.dbc", map)?;
//! if let Some(spell) = dbc.record_by_id(133) {
//!     println!("{:?}", spell.get_string("name")?);
//! }
//! # Ok::<(), wdbc::Error>(())
//! ```

mod container;
mod header;
mod inference;
mod map;
mod record;
mod types;

pub use container::{Dbc, DbcLayout, DbcOpenOptions};
pub use header::{DbcHeader, HEADER_SIZE, SIGNATURE};
pub use inference::{infer_map, infer_map_with, InferenceOptions, MAX_SAMPLES};
pub use map::FieldMap;
pub use record::{FieldRef, Record, RecordMut};
pub use types::*;
