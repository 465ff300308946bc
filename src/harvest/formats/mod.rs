//! Package database formats and the signature-based dispatcher.
//!
//! - `bdb` - Berkeley DB hash store (`Packages`)
//! - `ndb` - NDB slot store (`Packages.db`)
//! - `sqlite` - SQLite store (`rpmdb.sqlite`)
//! - `manifest` - distroless text manifest (`container-manifest-2`)
//! - `rpm_file` - standalone `.rpm` files

pub mod bdb;
pub mod manifest;
pub mod ndb;
pub mod rpm_file;
pub mod sqlite;

use serde::{Deserialize, Serialize};

use crate::harvest::header;
use crate::harvest::traits::{RecordFailure, StoreError, StoreReader};
use crate::model::{RawHeaderBlob, TagTable};

use bdb::{BdbEntries, BdbStore};
use manifest::{ManifestEntries, ManifestStore};
use ndb::{NdbEntries, NdbStore};
use sqlite::{SqliteEntries, SqliteStore};

/// Bytes inspected when sniffing a store's format.
pub const SIGNATURE_PREFIX_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreFormat {
    BerkeleyDb,
    Ndb,
    Sqlite,
    Manifest,
}

impl StoreFormat {
    pub fn name(&self) -> &'static str {
        match self {
            StoreFormat::BerkeleyDb => "bdb",
            StoreFormat::Ndb => "ndb",
            StoreFormat::Sqlite => "sqlite",
            StoreFormat::Manifest => "manifest",
        }
    }

    /// Picks a format from the file name (manifests) or the leading bytes.
    pub fn detect(path: &str, prefix: &[u8]) -> Option<Self> {
        if manifest::is_manifest_path(path) {
            Some(StoreFormat::Manifest)
        } else if SqliteStore::can_handle(prefix) {
            Some(StoreFormat::Sqlite)
        } else if NdbStore::can_handle(prefix) {
            Some(StoreFormat::Ndb)
        } else if BdbStore::can_handle(prefix) {
            Some(StoreFormat::BerkeleyDb)
        } else {
            None
        }
    }
}

/// An opened package database of any supported format.
pub enum Store {
    BerkeleyDb(BdbStore),
    Ndb(NdbStore),
    Sqlite(SqliteStore),
    Manifest(ManifestStore),
}

impl Store {
    /// Detects the format and validates the container structure.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownFormat`] when no format matches, or the
    /// format reader's error when its structure is unreadable.
    pub fn open(path: &str, data: Vec<u8>) -> Result<Self, StoreError> {
        let prefix = &data[..data.len().min(SIGNATURE_PREFIX_LEN)];
        match StoreFormat::detect(path, prefix) {
            Some(StoreFormat::Manifest) => Ok(Store::Manifest(ManifestStore::open(data))),
            Some(StoreFormat::Sqlite) => SqliteStore::open(path, data).map(Store::Sqlite),
            Some(StoreFormat::Ndb) => NdbStore::open(path, data).map(Store::Ndb),
            Some(StoreFormat::BerkeleyDb) => BdbStore::open(path, data).map(Store::BerkeleyDb),
            None => Err(StoreError::UnknownFormat(
                prefix[..prefix.len().min(16)].to_vec(),
            )),
        }
    }

    pub fn format(&self) -> StoreFormat {
        match self {
            Store::BerkeleyDb(_) => StoreFormat::BerkeleyDb,
            Store::Ndb(_) => StoreFormat::Ndb,
            Store::Sqlite(_) => StoreFormat::Sqlite,
            Store::Manifest(_) => StoreFormat::Manifest,
        }
    }

    /// Decoded tag tables, one per record, consumed once.
    pub fn records(self) -> Records {
        match self {
            Store::BerkeleyDb(store) => Records::BerkeleyDb(store.entries()),
            Store::Ndb(store) => Records::Ndb(store.entries()),
            Store::Sqlite(store) => Records::Sqlite(store.entries()),
            Store::Manifest(store) => Records::Manifest(store.entries()),
        }
    }
}

/// A tag table plus its position inside the artifact.
#[derive(Debug, Clone)]
pub struct DecodedRecord {
    pub table: TagTable,
    pub locator: Option<String>,
}

pub enum Records {
    BerkeleyDb(BdbEntries),
    Ndb(NdbEntries),
    Sqlite(SqliteEntries),
    Manifest(ManifestEntries),
}

fn decode_blob(entry: Result<RawHeaderBlob, RecordFailure>) -> Result<DecodedRecord, RecordFailure> {
    let blob = entry?;
    match header::decode(&blob.bytes) {
        Ok(table) => Ok(DecodedRecord {
            table,
            locator: blob.locator,
        }),
        Err(e) => Err(RecordFailure {
            locator: blob.locator,
            error: e.into(),
        }),
    }
}

impl Iterator for Records {
    type Item = Result<DecodedRecord, RecordFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Records::BerkeleyDb(entries) => entries.next().map(decode_blob),
            Records::Ndb(entries) => entries.next().map(decode_blob),
            Records::Sqlite(entries) => entries.next().map(decode_blob),
            Records::Manifest(entries) => entries.next().map(|entry| {
                entry.map(|table| DecodedRecord {
                    table,
                    locator: None,
                })
            }),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
