//! Core traits and error types for the RPM harvest layer.
//!
//! - Store reader abstraction via [`StoreReader`]
//! - Layered errors: [`DecodeError`] for one header, [`RecordError`] for one
//!   record, [`StoreError`] for a whole database, [`CatalogError`] for setup

use thiserror::Error;

use crate::model::RawHeaderBlob;
use crate::traits::ResolverError;

// ============================================================================
// Store Reader Trait
// ============================================================================

/// One on-disk package database format.
///
/// `open` validates the container structure (metadata page, slot table,
/// schema) and fails with a [`StoreError`] when it is unusable. `entries`
/// then yields every header blob lazily; a damaged record surfaces as an
/// `Err` item and iteration carries on with its siblings.
///
/// # Examples
///
/// ```ignore
/// let store = NdbStore::open("var/lib/rpm/Packages.db", bytes)?;
/// for entry in store.entries() {
///     match entry {
///         Ok(blob) => decode(blob),
///         Err(e) => report(e),
///     }
/// }
/// ```
pub trait StoreReader: Sized {
    /// Iterator over the store's records, consumed once.
    type Entries: Iterator<Item = Result<RawHeaderBlob, RecordFailure>>;

    /// Checks magic bytes in the leading part of the file.
    fn can_handle(prefix: &[u8]) -> bool;

    /// Validates the container structure.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store header, index, page table or schema
    /// cannot be read.
    fn open(source: &str, data: Vec<u8>) -> Result<Self, StoreError>;

    /// Yields the store's records in on-disk order.
    fn entries(self) -> Self::Entries;
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while decoding a single header blob.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes than the structure requires
    #[error("Header truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// Header intro magic is wrong
    #[error("Bad header magic: {0:02x?}")]
    BadMagic([u8; 4]),

    /// Index entry count is beyond the format limit
    #[error("Too many index entries: {0}")]
    TooManyEntries(u32),

    /// Data region length is beyond the format limit
    #[error("Data region too large: {0} bytes")]
    DataTooLarge(u32),

    /// Index/data lengths disagree with the blob size
    #[error("Length mismatch: header declares {declared} bytes, blob has {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Type code not in the type table
    #[error("Tag {tag} has unknown type code {type_code}")]
    UnknownType { tag: u32, type_code: u32 },

    /// Offset/count would read past the data region
    #[error("Tag {tag} value at offset {offset} (count {count}) exceeds data region of {data_len} bytes")]
    OutOfBounds {
        tag: u32,
        offset: i64,
        count: u32,
        data_len: usize,
    },

    /// String value lacks its NUL terminator
    #[error("Tag {tag} string is not terminated")]
    UnterminatedString { tag: u32 },
}

/// Errors isolated to one record or one standalone file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// Header blob could not be decoded
    #[error("Header decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// Record framing is cut short
    #[error("Record truncated: {0}")]
    Truncated(String),

    /// Embedded checksum, magic or length check failed
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    /// Name tag is missing or empty
    #[error("Record has no package name")]
    MissingName,

    /// Standalone file lead is not an RPM lead
    #[error("Not an RPM package: {0}")]
    BadLead(String),

    /// Manifest line does not have the expected shape
    #[error("Malformed manifest line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },

    /// Standalone file exceeds the configured size limit
    #[error("File too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },
}

/// A [`RecordError`] tagged with where in the store it happened.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{error}")]
pub struct RecordFailure {
    pub locator: Option<String>,
    #[source]
    pub error: RecordError,
}

impl RecordFailure {
    pub fn at(locator: impl Into<String>, error: impl Into<RecordError>) -> Self {
        Self {
            locator: Some(locator.into()),
            error: error.into(),
        }
    }
}

impl From<RecordError> for RecordFailure {
    fn from(error: RecordError) -> Self {
        Self {
            locator: None,
            error,
        }
    }
}

/// Errors that make a whole store unreadable.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No reader recognizes the file signature
    #[error("Unrecognized package database format (leading bytes {0:02x?})")]
    UnknownFormat(Vec<u8>),

    /// Store header or metadata page is corrupted
    #[error("Corrupted store header: {0}")]
    CorruptHeader(String),

    /// Index, page table or slot table is corrupted
    #[error("Corrupted store index: {0}")]
    CorruptIndex(String),

    /// Store is encrypted
    #[error("Encrypted package database is not supported")]
    Encrypted,

    /// Store uses a layout this crate does not read
    #[error("Unsupported store layout: {0}")]
    Unsupported(String),

    /// Store exceeds the configured size limit
    #[error("Store too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    /// SQLite schema or query failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Spooling the store to disk failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that stop a catalog run before it starts.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Configuration value out of range
    #[error("Invalid configuration: {field}: {reason}")]
    Config { field: String, reason: String },

    /// Resolver could not be constructed
    #[error("Resolver setup failed: {0}")]
    Resolver(#[from] ResolverError),

    /// Pattern table is unusable
    #[error("Invalid pattern table: {0}")]
    Patterns(String),
}

// ============================================================================
// Tests
// ============================================================================
