//! SQLite package database (`var/lib/rpm/rpmdb.sqlite`).
//!
//! Headers live in `Packages.blob`, keyed by `hnum`. The image is spooled to
//! a temporary file so SQLite can open it read-only; row ids are listed up
//! front and each blob is fetched when the iterator reaches it.

use std::io::Write;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use tempfile::NamedTempFile;

use crate::harvest::traits::{RecordError, RecordFailure, StoreError, StoreReader};
use crate::model::RawHeaderBlob;

const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

const LIST_QUERY: &str = "SELECT hnum FROM Packages ORDER BY hnum";
const BLOB_QUERY: &str = "SELECT blob FROM Packages WHERE hnum = ?1";

pub struct SqliteStore {
    source: String,
    conn: Connection,
    row_ids: Vec<i64>,
    // Keeps the spooled image alive as long as the connection.
    _spool: NamedTempFile,
}

impl SqliteStore {
    fn read_row(&self, hnum: i64) -> Result<Vec<u8>, RecordError> {
        let blob = self
            .conn
            .query_row(BLOB_QUERY, [hnum], |row| {
                Ok(match row.get_ref(0)? {
                    ValueRef::Blob(bytes) => Ok(bytes.to_vec()),
                    other => Err(other.data_type()),
                })
            })
            .optional()
            .map_err(|e| RecordError::Truncated(format!("row read failed: {e}")))?;

        match blob {
            Some(Ok(bytes)) => Ok(bytes),
            Some(Err(kind)) => Err(RecordError::Integrity(format!(
                "blob column holds {kind} instead of BLOB"
            ))),
            None => Err(RecordError::Truncated("row vanished during scan".to_string())),
        }
    }
}

impl StoreReader for SqliteStore {
    type Entries = SqliteEntries;

    fn can_handle(prefix: &[u8]) -> bool {
        prefix.starts_with(SQLITE_MAGIC)
    }

    fn open(source: &str, data: Vec<u8>) -> Result<Self, StoreError> {
        if !data.starts_with(SQLITE_MAGIC) {
            return Err(StoreError::CorruptHeader("missing SQLite magic".to_string()));
        }

        let mut spool = NamedTempFile::new()?;
        spool.write_all(&data)?;
        spool.flush()?;

        // immutable=1: no -wal/-shm siblings exist for a WAL-mode image.
        let uri = format!("file:{}?immutable=1", spool.path().display());
        let conn = Connection::open_with_flags(
            uri,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let row_ids = {
            let mut stmt = conn.prepare(LIST_QUERY)?;
            let ids = stmt
                .query_map([], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };

        Ok(Self {
            source: source.to_string(),
            conn,
            row_ids,
            _spool: spool,
        })
    }

    fn entries(self) -> SqliteEntries {
        SqliteEntries {
            store: self,
            position: 0,
        }
    }
}

pub struct SqliteEntries {
    store: SqliteStore,
    position: usize,
}

impl Iterator for SqliteEntries {
    type Item = Result<RawHeaderBlob, RecordFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        let hnum = *self.store.row_ids.get(self.position)?;
        self.position += 1;

        let locator = format!("row {hnum}");
        Some(
            self.store
                .read_row(hnum)
                .map(|bytes| RawHeaderBlob {
                    bytes,
                    source: self.store.source.clone(),
                    locator: Some(locator.clone()),
                })
                .map_err(|e| RecordFailure::at(locator, e)),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
