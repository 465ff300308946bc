//! Berkeley DB hash database (`var/lib/rpm/Packages`).
//!
//! Page 0 is the hash metadata page. Hash pages hold an index of 2-byte item
//! offsets in key/value pairs; every value that is a header points at a chain
//! of overflow pages whose concatenated contents are the header blob.

use std::collections::VecDeque;

use crate::harvest::traits::{RecordError, RecordFailure, StoreError, StoreReader};
use crate::model::RawHeaderBlob;

const HASH_MAGIC: u32 = 0x0006_1561;
const BTREE_MAGIC: u32 = 0x0005_3162;
const MAGIC_OFFSET: usize = 12;

const PAGE_HEADER_LEN: usize = 26;
const OFFPAGE_ITEM_LEN: usize = 12;

const PAGE_HASH_UNSORTED: u8 = 2;
const PAGE_OVERFLOW: u8 = 7;
const PAGE_HASH_META: u8 = 8;
const PAGE_HASH: u8 = 13;

const ITEM_OFFPAGE: u8 = 3;

#[derive(Debug, Clone, Copy)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn u32(self, data: &[u8], at: usize) -> u32 {
        let b = [data[at], data[at + 1], data[at + 2], data[at + 3]];
        match self {
            Endian::Little => u32::from_le_bytes(b),
            Endian::Big => u32::from_be_bytes(b),
        }
    }

    fn u16(self, data: &[u8], at: usize) -> u16 {
        let b = [data[at], data[at + 1]];
        match self {
            Endian::Little => u16::from_le_bytes(b),
            Endian::Big => u16::from_be_bytes(b),
        }
    }
}

fn magic_at(data: &[u8]) -> Option<(u32, Endian)> {
    if data.len() < MAGIC_OFFSET + 4 {
        return None;
    }
    [Endian::Little, Endian::Big]
        .into_iter()
        .map(|endian| (endian.u32(data, MAGIC_OFFSET), endian))
        .find(|(magic, _)| *magic == HASH_MAGIC || *magic == BTREE_MAGIC)
}

/// Validated hash database image.
#[derive(Debug)]
pub struct BdbStore {
    source: String,
    data: Vec<u8>,
    endian: Endian,
    page_size: usize,
    page_count: u32,
}

struct PageHeader {
    next: u32,
    entries: u16,
    used: u16,
    page_type: u8,
}

impl BdbStore {
    fn page(&self, pgno: u32) -> &[u8] {
        let start = pgno as usize * self.page_size;
        &self.data[start..start + self.page_size]
    }

    fn page_header(&self, page: &[u8]) -> PageHeader {
        PageHeader {
            next: self.endian.u32(page, 16),
            entries: self.endian.u16(page, 20),
            used: self.endian.u16(page, 22),
            page_type: page[25],
        }
    }

    /// Every off-page value on one hash page, as blobs or failures.
    fn read_hash_page(&self, pgno: u32) -> Vec<Result<RawHeaderBlob, RecordFailure>> {
        let page = self.page(pgno);
        let header = self.page_header(page);
        let locator = format!("page {pgno}");

        if header.entries % 2 != 0 {
            return vec![Err(RecordFailure::at(
                locator,
                RecordError::Integrity(format!(
                    "hash page has odd item count {}",
                    header.entries
                )),
            ))];
        }
        let index_end = PAGE_HEADER_LEN + header.entries as usize * 2;
        if index_end > self.page_size {
            return vec![Err(RecordFailure::at(
                locator,
                RecordError::Truncated(format!(
                    "{} items do not fit in a {} byte page",
                    header.entries, self.page_size
                )),
            ))];
        }

        // Items come in key/value pairs; only values carry headers.
        let mut out = Vec::new();
        for (pair, item) in page[PAGE_HEADER_LEN..index_end].chunks_exact(4).enumerate() {
            let value_at = self.endian.u16(item, 2) as usize;
            let locator = format!("page {pgno} item {pair}");
            let Some(&item_type) = page.get(value_at) else {
                out.push(Err(RecordFailure::at(
                    locator,
                    RecordError::Truncated(format!("item offset {value_at} past page end")),
                )));
                continue;
            };
            // Inline values (the instance counter) may sit in the last bytes.
            if item_type != ITEM_OFFPAGE {
                continue;
            }
            if value_at + OFFPAGE_ITEM_LEN > self.page_size {
                out.push(Err(RecordFailure::at(
                    locator,
                    RecordError::Truncated(format!(
                        "off-page item at {value_at} runs past page end"
                    )),
                )));
                continue;
            }
            let first = self.endian.u32(page, value_at + 4);
            let total = self.endian.u32(page, value_at + 8) as usize;
            out.push(
                self.read_overflow(first, total)
                    .map(|bytes| RawHeaderBlob {
                        bytes,
                        source: self.source.clone(),
                        locator: Some(locator.clone()),
                    })
                    .map_err(|e| RecordFailure::at(locator, e)),
            );
        }
        out
    }

    /// Concatenates an overflow chain and checks it against the length
    /// recorded in the hash item.
    fn read_overflow(&self, first: u32, total: usize) -> Result<Vec<u8>, RecordError> {
        let mut value = Vec::with_capacity(total);
        let mut pgno = first;
        let mut hops = 0u32;

        while pgno != 0 {
            if pgno >= self.page_count {
                return Err(RecordError::Truncated(format!(
                    "overflow page {pgno} past last page {}",
                    self.page_count - 1
                )));
            }
            hops += 1;
            if hops > self.page_count {
                return Err(RecordError::Integrity(format!(
                    "overflow chain from page {first} loops"
                )));
            }

            let page = self.page(pgno);
            let header = self.page_header(page);
            if header.page_type != PAGE_OVERFLOW {
                return Err(RecordError::Integrity(format!(
                    "page {pgno} has type {} in an overflow chain",
                    header.page_type
                )));
            }
            let end = PAGE_HEADER_LEN + header.used as usize;
            if end > self.page_size {
                return Err(RecordError::Truncated(format!(
                    "overflow page {pgno} claims {} bytes",
                    header.used
                )));
            }
            value.extend_from_slice(&page[PAGE_HEADER_LEN..end]);
            pgno = header.next;
        }

        if value.len() != total {
            return Err(RecordError::Integrity(format!(
                "overflow chain holds {} bytes, item declares {total}",
                value.len()
            )));
        }
        Ok(value)
    }
}

impl StoreReader for BdbStore {
    type Entries = BdbEntries;

    fn can_handle(prefix: &[u8]) -> bool {
        magic_at(prefix).is_some()
    }

    fn open(source: &str, data: Vec<u8>) -> Result<Self, StoreError> {
        let (magic, endian) = magic_at(&data).ok_or_else(|| {
            StoreError::CorruptHeader("missing Berkeley DB magic".to_string())
        })?;
        if magic == BTREE_MAGIC {
            return Err(StoreError::Unsupported(
                "Berkeley DB btree access method".to_string(),
            ));
        }
        if data.len() < PAGE_HEADER_LEN + 12 {
            return Err(StoreError::CorruptHeader("metadata page truncated".to_string()));
        }

        let page_size = endian.u32(&data, 20) as usize;
        if !(512..=65536).contains(&page_size) || !page_size.is_power_of_two() {
            return Err(StoreError::CorruptHeader(format!(
                "invalid page size {page_size}"
            )));
        }
        if data[24] != 0 {
            return Err(StoreError::Encrypted);
        }
        if data[25] != PAGE_HASH_META {
            return Err(StoreError::CorruptHeader(format!(
                "page 0 has type {}, expected hash metadata",
                data[25]
            )));
        }

        let last_page = endian.u32(&data, 32);
        let page_count = last_page.checked_add(1).ok_or_else(|| {
            StoreError::CorruptIndex(format!("invalid last page number {last_page}"))
        })?;
        let needed = page_count as usize * page_size;
        if data.len() < needed {
            return Err(StoreError::CorruptIndex(format!(
                "{page_count} pages of {page_size} bytes declared, file holds {} bytes",
                data.len()
            )));
        }

        Ok(Self {
            source: source.to_string(),
            data,
            endian,
            page_size,
            page_count,
        })
    }

    fn entries(self) -> BdbEntries {
        BdbEntries {
            store: self,
            next_page: 1,
            pending: VecDeque::new(),
        }
    }
}

/// Walks hash pages one at a time.
pub struct BdbEntries {
    store: BdbStore,
    next_page: u32,
    pending: VecDeque<Result<RawHeaderBlob, RecordFailure>>,
}

impl Iterator for BdbEntries {
    type Item = Result<RawHeaderBlob, RecordFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            if self.next_page >= self.store.page_count {
                return None;
            }
            let pgno = self.next_page;
            self.next_page += 1;

            let page_type = self.store.page(pgno)[25];
            if page_type == PAGE_HASH || page_type == PAGE_HASH_UNSORTED {
                self.pending = self.store.read_hash_page(pgno).into();
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
