//! DBC file container: header, record array and string block

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use indexmap::IndexMap;
use std::cell::OnceCell;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::dbc::header::{
    DbcHeader, HEADER_SIZE, RECORD_COUNT_OFFSET, SIGNATURE, STRING_BLOCK_SIZE_OFFSET,
};
use crate::dbc::map::FieldMap;
use crate::dbc::record::{FieldRef, Record, RecordMut};
use crate::dbc::types::{Value, FIELD_SIZE};
use crate::error::{Error, Result};

/// Options for opening a DBC file
#[derive(Debug, Clone, Default)]
pub struct DbcOpenOptions {
    /// Open read-only even when the file is writable
    pub read_only: bool,
    /// Mapping to attach once the file is parsed
    pub map: Option<FieldMap>,
}

impl DbcOpenOptions {
    /// Open read-only even if the file is writable
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Attach this mapping after opening
    pub fn with_map(mut self, map: FieldMap) -> Self {
        self.map = Some(map);
        self
    }
}

/// Record layout for a newly created DBC
#[derive(Debug, Clone)]
pub enum DbcLayout {
    /// Raw slot count, no mapping attached
    Fields(u32),
    /// Slot count taken from the mapping, which is attached
    Map(FieldMap),
}

impl DbcLayout {
    fn field_count(&self) -> u32 {
        match self {
            DbcLayout::Fields(count) => *count,
            DbcLayout::Map(map) => map.field_count(),
        }
    }
}

impl From<u32> for DbcLayout {
    fn from(count: u32) -> Self {
        DbcLayout::Fields(count)
    }
}

impl From<FieldMap> for DbcLayout {
    fn from(map: FieldMap) -> Self {
        DbcLayout::Map(map)
    }
}

impl From<&FieldMap> for DbcLayout {
    fn from(map: &FieldMap) -> Self {
        DbcLayout::Map(map.clone())
    }
}

/// An open DBC file
///
/// Records are kept in memory and every record write goes straight to
/// disk as well. New strings are staged in memory until [`Dbc::finalize`],
/// which also runs on drop.
pub struct Dbc {
    file: File,
    path: PathBuf,
    writable: bool,
    /// Header as currently stored on disk
    header: DbcHeader,
    records: Vec<u8>,
    string_block: Vec<u8>,
    /// String block differs from (or was overwritten on) disk
    dirty: bool,
    /// id -> position, built on first id lookup
    index: OnceCell<HashMap<u32, u32>>,
    map: Option<FieldMap>,
}

impl Dbc {
    /// Open a DBC file, read-write if permitted, read-only otherwise
    ///
    /// # Example
    /// ```no_run
    /// use wdbc::Dbc;
    /// let dbc = Dbc::open("Spell.dbc")?;
    /// println!("{} records", dbc.record_count());
    /// # Ok::<(), wdbc::Error>(())
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, DbcOpenOptions::default())
    }

    /// Open a DBC file and attach the given mapping
    pub fn open_with_map<P: AsRef<Path>>(path: P, map: FieldMap) -> Result<Self> {
        Self::open_with_options(path, DbcOpenOptions::default().with_map(map))
    }

    /// Open a DBC file with custom options
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: DbcOpenOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(Error::NotFound(path));
        }

        let (file, writable) = Self::open_file(&path, options.read_only)?;
        let size = file.metadata()?.len();
        let mut reader = BufReader::new(&file);

        let mut sig = [0u8; 4];
        match reader.read_exact(&mut sig) {
            Ok(()) if sig == SIGNATURE => {}
            Ok(()) => return Err(Error::InvalidSignature(path)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(Error::InvalidSignature(path))
            }
            Err(e) => return Err(e.into()),
        }
        if size < HEADER_SIZE {
            return Err(Error::MalformedHeader(path));
        }

        let mut counts = [0u8; 16];
        reader.read_exact(&mut counts)?;
        let header = DbcHeader::parse(&counts)?;

        let offset = header.string_block_offset();
        if size < offset {
            return Err(Error::TruncatedRecords {
                path,
                missing: offset - size,
                records: header.record_count,
            });
        }
        let block_end = offset + header.string_block_size as u64;
        if size < block_end {
            return Err(Error::TruncatedStringBlock {
                path,
                missing: block_end - size,
            });
        }

        let mut records = vec![0u8; header.records_len() as usize];
        reader.read_exact(&mut records)?;
        let mut string_block = vec![0u8; header.string_block_size as usize];
        reader.read_exact(&mut string_block)?;
        drop(reader);

        debug!(
            path = %path.display(),
            records = header.record_count,
            fields = header.field_count,
            record_size = header.record_size,
            string_block = header.string_block_size,
            writable,
            "Opened DBC"
        );

        let mut dbc = Dbc {
            file,
            path,
            writable,
            header,
            records,
            string_block,
            dirty: false,
            index: OnceCell::new(),
            map: None,
        };
        dbc.attach(options.map)?;
        Ok(dbc)
    }

    fn open_file(path: &Path, read_only: bool) -> Result<(File, bool)> {
        if !read_only {
            if let Ok(file) = OpenOptions::new().read(true).write(true).open(path) {
                return Ok((file, true));
            }
        }
        match File::open(path) {
            Ok(file) => Ok((file, false)),
            Err(_) => Err(Error::NotReadable(path.to_path_buf())),
        }
    }

    /// Create an empty DBC, overwriting any existing file
    ///
    /// `layout` is either a raw field count or a [`FieldMap`], in which case
    /// the mapping is attached to the returned DBC.
    ///
    /// # Example
    /// ```no_run
    /// use wdbc::{Dbc, FieldMap, FieldType, Value};
    ///
    /// let mut map = FieldMap::new();
    /// map.add_field("id", FieldType::Uint);
    /// map.add_field("name", FieldType::String);
    ///
    /// let mut dbc = Dbc::create("Sample.dbc", map)?;
    /// dbc.add_record(&[Value::Uint(1), Value::from("John")])?;
    /// dbc.finalize()?;
    /// # Ok::<(), wdbc::Error>(())
    /// ```
    pub fn create<P: AsRef<Path>>(path: P, layout: impl Into<DbcLayout>) -> Result<Self> {
        let path = path.as_ref();
        let layout = layout.into();
        let fields = layout.field_count();
        let header = DbcHeader::empty(fields).ok_or_else(|| Error::TooManyFields {
            path: path.to_path_buf(),
            fields,
        })?;

        let mut file = File::create(path).map_err(|_| Error::NotWritable(path.to_path_buf()))?;
        header.write_to(&mut file)?;
        file.write_all(&[0])?;
        file.flush()?;
        drop(file);

        info!(path = %path.display(), fields = header.field_count, "Created DBC");

        let options = match layout {
            DbcLayout::Fields(_) => DbcOpenOptions::default(),
            DbcLayout::Map(map) => DbcOpenOptions::default().with_map(map),
        };
        Self::open_with_options(path, options)
    }

    /// Attach a mapping, or detach with `None`
    ///
    /// The mapping is copied; later changes to the caller's map are not
    /// observed. On a field count mismatch the current mapping is kept.
    pub fn attach(&mut self, map: Option<FieldMap>) -> Result<()> {
        if let Some(map) = &map {
            if map.field_count() != self.header.field_count {
                warn!(
                    path = %self.path.display(),
                    map = map.field_count(),
                    dbc = self.header.field_count,
                    "Mapping does not match DBC field count"
                );
                return Err(Error::FieldCountMismatch {
                    path: self.path.clone(),
                    map: map.field_count(),
                    dbc: self.header.field_count,
                });
            }
        }
        self.map = map;
        Ok(())
    }

    /// Write the string block and its size to disk if they changed
    ///
    /// Safe to call any number of times. Runs automatically on drop.
    pub fn finalize(&mut self) -> Result<()> {
        let size = self.string_block.len() as u32;
        if !self.writable || (!self.dirty && self.header.string_block_size == size) {
            return Ok(());
        }

        let offset = self.header.string_block_offset();
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&self.string_block)?;

        self.header.string_block_size = size;
        self.file.seek(SeekFrom::Start(STRING_BLOCK_SIZE_OFFSET))?;
        self.file.write_u32::<LittleEndian>(size)?;
        self.file.flush()?;
        self.dirty = false;

        debug!(path = %self.path.display(), string_block = size, "Finalized DBC");
        Ok(())
    }

    /// Append a string to the string block and return its offset
    ///
    /// Strings are never deduplicated.
    pub fn add_string(&mut self, string: &str) -> Result<u32> {
        if !self.writable {
            return Err(Error::NotWritable(self.path.clone()));
        }
        let offset = self.string_block.len() as u32;
        self.string_block.extend_from_slice(string.as_bytes());
        self.string_block.push(0);
        self.dirty = true;
        Ok(offset)
    }

    /// String starting at the given string block offset
    ///
    /// Offset 0 is the empty string. Returns `None` past the end of the
    /// block or for invalid UTF-8.
    pub fn string(&self, offset: u32) -> Option<&str> {
        std::str::from_utf8(self.string_bytes(offset)?).ok()
    }

    /// Like [`Dbc::string`], replacing invalid UTF-8 sequences
    pub fn string_lossy(&self, offset: u32) -> Option<String> {
        self.string_bytes(offset)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    fn string_bytes(&self, offset: u32) -> Option<&[u8]> {
        let start = offset as usize;
        if start >= self.string_block.len() {
            return None;
        }
        let end = self.string_block[start..]
            .iter()
            .position(|&b| b == 0)
            .map(|p| start + p)
            .unwrap_or(self.string_block.len());
        Some(&self.string_block[start..end])
    }

    /// Append a record built from the given values using the attached mapping
    ///
    /// Values are consumed in mapping order, one per field repeat. Missing
    /// trailing values are written as zero and surplus values are ignored;
    /// this leniency is intentional. Returns the new record's position.
    pub fn add_record(&mut self, values: &[Value]) -> Result<u32> {
        if !self.writable {
            return Err(Error::NotWritable(self.path.clone()));
        }
        let rules: Vec<_> = match &self.map {
            Some(map) => map.iter().map(|(_, rule)| rule).collect(),
            None => return Err(Error::NoMapAttached(self.path.clone())),
        };

        let mut record = vec![0u8; self.header.record_size as usize];
        let mut values = values.iter();
        let mut slot = 0usize;
        for rule in rules {
            for _ in 0..rule.count {
                let raw = match values.next() {
                    None => 0,
                    Some(value) if rule.kind.is_string() => self.add_string(&value.to_text())?,
                    Some(value) => value.to_slot(rule.kind),
                };
                let start = slot * FIELD_SIZE as usize;
                if let Some(bytes) = record.get_mut(start..start + FIELD_SIZE as usize) {
                    LittleEndian::write_u32(bytes, raw);
                }
                slot += rule.kind.slots_per_repeat() as usize;
            }
        }
        if values.len() > 0 {
            debug!(discarded = values.len(), "Surplus record values discarded");
        }

        let position = self.header.record_count;
        self.file.seek(SeekFrom::Start(self.header.record_offset(position)))?;
        self.file.write_all(&record)?;
        self.records.extend_from_slice(&record);

        // the string block on disk now starts later and was partly overwritten
        self.dirty = true;
        self.header.record_count += 1;
        self.file.seek(SeekFrom::Start(RECORD_COUNT_OFFSET))?;
        self.file.write_u32::<LittleEndian>(self.header.record_count)?;

        if let Some(index) = self.index.get_mut() {
            if record.len() >= FIELD_SIZE as usize {
                index.insert(LittleEndian::read_u32(&record), position);
            }
        }
        Ok(position)
    }

    /// Append several records, see [`Dbc::add_record`]
    pub fn add_records<I, R>(&mut self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[Value]>,
    {
        for record in records {
            self.add_record(record.as_ref())?;
        }
        Ok(())
    }

    /// Record at the zero-based position
    pub fn record(&self, position: u32) -> Option<Record<'_>> {
        self.has_record(position)
            .then(|| Record::new(self, position))
    }

    /// Writable record at the zero-based position
    pub fn record_mut(&mut self, position: u32) -> Option<RecordMut<'_>> {
        if self.has_record(position) {
            Some(RecordMut::new(self, position))
        } else {
            None
        }
    }

    /// Record whose first field equals `id`
    pub fn record_by_id(&self, id: u32) -> Option<Record<'_>> {
        let position = *self.ensure_indexed().get(&id)?;
        Some(Record::new(self, position))
    }

    /// Writable record whose first field equals `id`
    pub fn record_by_id_mut(&mut self, id: u32) -> Option<RecordMut<'_>> {
        let position = *self.ensure_indexed().get(&id)?;
        Some(RecordMut::new(self, position))
    }

    /// Whether a record exists at the zero-based position
    pub fn has_record(&self, position: u32) -> bool {
        position < self.header.record_count
    }

    /// Whether a record with this id exists
    pub fn has_record_by_id(&self, id: u32) -> bool {
        self.ensure_indexed().contains_key(&id)
    }

    /// Iterate all records in file order
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        (0..self.header.record_count).map(move |position| Record::new(self, position))
    }

    /// Extract every record with the attached mapping
    pub fn rows(&self) -> Result<impl Iterator<Item = IndexMap<String, Value>> + '_> {
        let map = self
            .map
            .as_ref()
            .ok_or_else(|| Error::NoMapAttached(self.path.clone()))?;
        Ok(self.records().map(move |record| record.decode(map)))
    }

    /// Build the id index if it does not exist yet
    pub fn ensure_indexed(&self) -> &HashMap<u32, u32> {
        self.index.get_or_init(|| {
            let mut index = HashMap::with_capacity(self.header.record_count as usize);
            if self.header.record_size >= FIELD_SIZE {
                for (position, record) in self
                    .records
                    .chunks_exact(self.header.record_size as usize)
                    .enumerate()
                {
                    index.insert(LittleEndian::read_u32(record), position as u32);
                }
            }
            debug!(path = %self.path.display(), ids = index.len(), "Built id index");
            index
        })
    }

    /// Resolve an index or name to a raw slot
    pub(crate) fn resolve(&self, field: FieldRef<'_>) -> Result<u32> {
        match field {
            FieldRef::Index(slot) => Ok(slot),
            FieldRef::Name(name) => {
                let map = self
                    .map
                    .as_ref()
                    .ok_or_else(|| Error::NoMapAttached(self.path.clone()))?;
                map.field_offset(name)
                    .ok_or_else(|| Error::UnknownField(name.to_string()))
            }
        }
    }

    /// Bytes of the record at `position`
    pub(crate) fn record_bytes(&self, position: u32) -> &[u8] {
        let size = self.header.record_size as usize;
        let start = position as usize * size;
        &self.records[start..start + size]
    }

    /// Raw slot value, `None` past the end of the record
    pub(crate) fn read_slot(&self, position: u32, slot: u32) -> Option<u32> {
        let start = slot as usize * FIELD_SIZE as usize;
        self.record_bytes(position)
            .get(start..start + FIELD_SIZE as usize)
            .map(LittleEndian::read_u32)
    }

    /// Write a raw slot to disk and memory, keeping the id index current
    pub(crate) fn write_slot(&mut self, position: u32, slot: u32, raw: u32) -> Result<()> {
        let previous = self.read_slot(position, slot);
        let offset = self.header.record_offset(position) + slot as u64 * FIELD_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_u32::<LittleEndian>(raw)?;

        let start = position as usize * self.header.record_size as usize
            + slot as usize * FIELD_SIZE as usize;
        LittleEndian::write_u32(&mut self.records[start..start + FIELD_SIZE as usize], raw);

        if slot == 0 {
            if let Some(index) = self.index.get_mut() {
                if let Some(old_id) = previous {
                    if index.get(&old_id) == Some(&position) {
                        index.remove(&old_id);
                    }
                }
                index.insert(raw, position);
            }
        }
        Ok(())
    }

    /// Path the DBC was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file was opened read-write
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Header as currently stored on disk
    pub fn header(&self) -> &DbcHeader {
        &self.header
    }

    /// Number of records
    pub fn record_count(&self) -> u32 {
        self.header.record_count
    }

    /// Raw 4-byte slots per record
    pub fn field_count(&self) -> u32 {
        self.header.field_count
    }

    /// Record size in bytes
    pub fn record_size(&self) -> u32 {
        self.header.record_size
    }

    /// Whether the zero-based raw slot exists
    pub fn has_field(&self, slot: u32) -> bool {
        slot < self.header.field_count
    }

    /// Attached mapping, if any
    pub fn map(&self) -> Option<&FieldMap> {
        self.map.as_ref()
    }

    /// The in-memory string block, including strings not yet finalized
    pub fn string_block(&self) -> &[u8] {
        &self.string_block
    }

    /// Absolute offset of the string block
    pub fn string_block_offset(&self) -> u64 {
        self.header.string_block_offset()
    }
}

impl Drop for Dbc {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            warn!(path = %self.path.display(), error = %e, "Failed to finalize DBC");
        }
    }
}

impl std::fmt::Debug for Dbc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dbc")
            .field("path", &self.path)
            .field("writable", &self.writable)
            .field("header", &self.header)
            .field("string_block_len", &self.string_block.len())
            .field("map", &self.map)
            .finish()
    }
}
