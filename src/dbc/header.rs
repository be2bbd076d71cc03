//! DBC file header parsing

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};

use crate::dbc::types::FIELD_SIZE;
use crate::error::Result;

/// File signature: `WDBC`
pub const SIGNATURE: [u8; 4] = *b"WDBC";

/// Size of the signature plus the four header counts
pub const HEADER_SIZE: u64 = 20;

/// Byte offset of the record count field
pub(crate) const RECORD_COUNT_OFFSET: u64 = 4;

/// Byte offset of the string block size field
pub(crate) const STRING_BLOCK_SIZE_OFFSET: u64 = 16;

/// DBC file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbcHeader {
    /// Number of records
    pub record_count: u32,
    /// Raw 4-byte slots per record
    pub field_count: u32,
    /// Record size in bytes
    pub record_size: u32,
    /// String block length in bytes
    pub string_block_size: u32,
}

impl DbcHeader {
    /// Header of an empty file with the given number of slots per record
    ///
    /// Returns `None` when the record size does not fit in a `u32`.
    pub fn empty(field_count: u32) -> Option<Self> {
        Some(Self {
            record_count: 0,
            field_count,
            record_size: field_count.checked_mul(FIELD_SIZE)?,
            string_block_size: 1,
        })
    }

    /// Check the signature at the start of `data`
    pub fn has_signature(data: &[u8]) -> bool {
        data.len() >= SIGNATURE.len() && data[..SIGNATURE.len()] == SIGNATURE
    }

    /// Parse the 16 bytes of counts following the signature
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        Ok(DbcHeader {
            record_count: cursor.read_u32::<LittleEndian>()?,
            field_count: cursor.read_u32::<LittleEndian>()?,
            record_size: cursor.read_u32::<LittleEndian>()?,
            string_block_size: cursor.read_u32::<LittleEndian>()?,
        })
    }

    /// Write signature and counts
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&SIGNATURE)?;
        writer.write_u32::<LittleEndian>(self.record_count)?;
        writer.write_u32::<LittleEndian>(self.field_count)?;
        writer.write_u32::<LittleEndian>(self.record_size)?;
        writer.write_u32::<LittleEndian>(self.string_block_size)?;
        Ok(())
    }

    /// Total bytes taken by the record array
    pub fn records_len(&self) -> u64 {
        self.record_count as u64 * self.record_size as u64
    }

    /// Absolute offset of the string block
    pub fn string_block_offset(&self) -> u64 {
        HEADER_SIZE + self.records_len()
    }

    /// Absolute offset of the record at `position`
    pub fn record_offset(&self, position: u32) -> u64 {
        HEADER_SIZE + position as u64 * self.record_size as u64
    }
}
