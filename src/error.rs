//! Error types for wdbc

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for DBC operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DBC \"{0}\" could not be found")]
    NotFound(PathBuf),

    #[error("DBC \"{0}\" is not readable")]
    NotReadable(PathBuf),

    #[error("DBC \"{0}\" is not writable")]
    NotWritable(PathBuf),

    #[error("DBC \"{0}\" has an invalid signature and is therefore not valid")]
    InvalidSignature(PathBuf),

    #[error("DBC \"{0}\" has a malformed header")]
    MalformedHeader(PathBuf),

    #[error("DBC \"{path}\" is short of {missing} bytes for {records} records")]
    TruncatedRecords {
        path: PathBuf,
        missing: u64,
        records: u32,
    },

    #[error("DBC \"{path}\" is short of {missing} bytes for string-block")]
    TruncatedStringBlock { path: PathBuf, missing: u64 },

    #[error("DBC \"{path}\" cannot hold {fields} fields, the record size overflows")]
    TooManyFields { path: PathBuf, fields: u32 },

    #[error("Mapping holds {map} fields, but DBC \"{path}\" expects {dbc}")]
    FieldCountMismatch { path: PathBuf, map: u32, dbc: u32 },

    #[error("Addressing fields by name requires DBC \"{0}\" to have a mapping attached")]
    NoMapAttached(PathBuf),

    #[error("Field not found in mapping: {0}")]
    UnknownField(String),
}

/// Result type alias for DBC operations
pub type Result<T> = std::result::Result<T, Error>;
