//! NDB package database (`var/lib/rpm/Packages.db`).
//!
//! The file opens with a 32-byte header followed by a slot table spanning
//! `slot_pages` 4 KiB pages. Each 16-byte slot maps a package index to a run
//! of 16-byte blocks holding one blob: a head (`BlbS`, package index,
//! generation, length), the header bytes, padding, and a tail (Adler-32 of
//! everything before it, length again, `BlbE`).

use crate::harvest::traits::{RecordError, RecordFailure, StoreError, StoreReader};
use crate::model::RawHeaderBlob;

const DB_MAGIC: &[u8; 4] = b"RpmP";
const SLOT_MAGIC: &[u8; 4] = b"Slot";
const BLOB_HEAD_MAGIC: &[u8; 4] = b"BlbS";
const BLOB_TAIL_MAGIC: &[u8; 4] = b"BlbE";

const DB_VERSION: u32 = 0;
const HEADER_LEN: usize = 32;
const PAGE_SIZE: usize = 4096;
const SLOT_LEN: usize = 16;
const BLOCK_LEN: usize = 16;
const BLOB_HEAD_LEN: usize = 16;
const BLOB_TAIL_LEN: usize = 12;

/// Sanity bound on the slot table (8 MiB of slots).
const MAX_SLOT_PAGES: u32 = 2048;

fn le_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

pub(crate) fn adler32(data: &[u8]) -> u32 {
    const MOD: u32 = 65_521;
    let (mut a, mut b) = (1u32, 0u32);
    // 5552 is the largest run before `b` can overflow.
    for chunk in data.chunks(5552) {
        for &byte in chunk {
            a += u32::from(byte);
            b += a;
        }
        a %= MOD;
        b %= MOD;
    }
    (b << 16) | a
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    index: usize,
    pkg_index: u32,
    blk_offset: u32,
    blk_count: u32,
}

/// Validated NDB image with its occupied slots.
#[derive(Debug)]
pub struct NdbStore {
    source: String,
    data: Vec<u8>,
    slots: Vec<Slot>,
}

impl NdbStore {
    fn read_blob(&self, slot: &Slot) -> Result<Vec<u8>, RecordError> {
        let start = slot.blk_offset as usize * BLOCK_LEN;
        let area_len = slot.blk_count as usize * BLOCK_LEN;
        if area_len < BLOB_HEAD_LEN + BLOB_TAIL_LEN {
            return Err(RecordError::Truncated(format!(
                "{} blocks cannot hold a blob",
                slot.blk_count
            )));
        }
        let end = start + area_len;
        if end > self.data.len() {
            return Err(RecordError::Truncated(format!(
                "blob blocks end at {end}, file holds {} bytes",
                self.data.len()
            )));
        }
        let area = &self.data[start..end];

        if &area[0..4] != BLOB_HEAD_MAGIC {
            return Err(RecordError::Integrity("bad blob head magic".to_string()));
        }
        let head_pkg = le_u32(area, 4);
        if head_pkg != slot.pkg_index {
            return Err(RecordError::Integrity(format!(
                "blob belongs to package {head_pkg}, slot says {}",
                slot.pkg_index
            )));
        }
        let blob_len = le_u32(area, 12) as usize;
        let expected_blocks = (BLOB_HEAD_LEN + blob_len + BLOB_TAIL_LEN).div_ceil(BLOCK_LEN);
        if expected_blocks != slot.blk_count as usize {
            return Err(RecordError::Integrity(format!(
                "blob of {blob_len} bytes needs {expected_blocks} blocks, slot has {}",
                slot.blk_count
            )));
        }

        let tail = area_len - BLOB_TAIL_LEN;
        if &area[tail + 8..tail + 12] != BLOB_TAIL_MAGIC {
            return Err(RecordError::Integrity("bad blob tail magic".to_string()));
        }
        if le_u32(area, tail + 4) as usize != blob_len {
            return Err(RecordError::Integrity(
                "blob tail length disagrees with head".to_string(),
            ));
        }
        let stored = le_u32(area, tail);
        let computed = adler32(&area[..tail]);
        if stored != computed {
            return Err(RecordError::Integrity(format!(
                "adler32 mismatch: stored {stored:#010x}, computed {computed:#010x}"
            )));
        }

        Ok(area[BLOB_HEAD_LEN..BLOB_HEAD_LEN + blob_len].to_vec())
    }
}

impl StoreReader for NdbStore {
    type Entries = NdbEntries;

    fn can_handle(prefix: &[u8]) -> bool {
        prefix.starts_with(DB_MAGIC)
    }

    fn open(source: &str, data: Vec<u8>) -> Result<Self, StoreError> {
        if data.len() < HEADER_LEN || !data.starts_with(DB_MAGIC) {
            return Err(StoreError::CorruptHeader("missing NDB header".to_string()));
        }
        let version = le_u32(&data, 4);
        if version != DB_VERSION {
            return Err(StoreError::Unsupported(format!("NDB version {version}")));
        }
        let slot_pages = le_u32(&data, 12);
        if slot_pages == 0 || slot_pages > MAX_SLOT_PAGES {
            return Err(StoreError::CorruptHeader(format!(
                "invalid slot page count {slot_pages}"
            )));
        }
        let slot_end = slot_pages as usize * PAGE_SIZE;
        if data.len() < slot_end {
            return Err(StoreError::CorruptIndex(format!(
                "slot table needs {slot_end} bytes, file holds {}",
                data.len()
            )));
        }

        let mut slots = Vec::new();
        for (index, raw) in data[HEADER_LEN..slot_end].chunks_exact(SLOT_LEN).enumerate() {
            if &raw[0..4] != SLOT_MAGIC {
                return Err(StoreError::CorruptIndex(format!("bad magic in slot {index}")));
            }
            let pkg_index = le_u32(raw, 4);
            if pkg_index == 0 {
                continue;
            }
            slots.push(Slot {
                index,
                pkg_index,
                blk_offset: le_u32(raw, 8),
                blk_count: le_u32(raw, 12),
            });
        }

        Ok(Self {
            source: source.to_string(),
            data,
            slots,
        })
    }

    fn entries(self) -> NdbEntries {
        NdbEntries {
            store: self,
            position: 0,
        }
    }
}

pub struct NdbEntries {
    store: NdbStore,
    position: usize,
}

impl Iterator for NdbEntries {
    type Item = Result<RawHeaderBlob, RecordFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = *self.store.slots.get(self.position)?;
        self.position += 1;

        let locator = format!("slot {} (package {})", slot.index, slot.pkg_index);
        Some(
            self.store
                .read_blob(&slot)
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
