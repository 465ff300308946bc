//! Builders for synthetic package databases and package files used by the
//! unit tests.

use crate::harvest::formats::ndb::adler32;
use crate::harvest::header::HEADER_MAGIC;
use crate::harvest::tags;

// ============================================================================
// Headers
// ============================================================================

#[derive(Default)]
pub struct HeaderBuilder {
    entries: Vec<(u32, u32, i32, u32)>,
    data: Vec<u8>,
}

impl HeaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, tag: u32, type_code: u32, count: u32, bytes: &[u8]) -> Self {
        let offset = self.data.len() as i32;
        self.entries.push((tag, type_code, offset, count));
        self.data.extend_from_slice(bytes);
        self
    }

    pub fn string(self, tag: u32, value: &str) -> Self {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        self.push(tag, tags::TYPE_STRING, 1, &bytes)
    }

    pub fn string_array(self, tag: u32, values: &[&str]) -> Self {
        let mut bytes = Vec::new();
        for value in values {
            bytes.extend_from_slice(value.as_bytes());
            bytes.push(0);
        }
        self.push(tag, tags::TYPE_STRING_ARRAY, values.len() as u32, &bytes)
    }

    pub fn int16(self, tag: u32, values: &[u16]) -> Self {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.push(tag, tags::TYPE_INT16, values.len() as u32, &bytes)
    }

    pub fn int32(self, tag: u32, values: &[u32]) -> Self {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.push(tag, tags::TYPE_INT32, values.len() as u32, &bytes)
    }

    pub fn int64(self, tag: u32, values: &[u64]) -> Self {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.push(tag, tags::TYPE_INT64, values.len() as u32, &bytes)
    }

    pub fn binary(self, tag: u32, value: &[u8]) -> Self {
        self.push(tag, tags::TYPE_BIN, value.len() as u32, value)
    }

    /// Index entry with arbitrary fields; pair with [`HeaderBuilder::data`].
    pub fn raw_entry(mut self, tag: u32, type_code: u32, offset: i32, count: u32) -> Self {
        self.entries.push((tag, type_code, offset, count));
        self
    }

    pub fn data(mut self, bytes: &[u8]) -> Self {
        self.data.extend_from_slice(bytes);
        self
    }

    /// Database form: no intro magic.
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        out.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
        for (tag, type_code, offset, count) in &self.entries {
            out.extend_from_slice(&tag.to_be_bytes());
            out.extend_from_slice(&type_code.to_be_bytes());
            out.extend_from_slice(&offset.to_be_bytes());
            out.extend_from_slice(&count.to_be_bytes());
        }
        out.extend_from_slice(&self.data);
        out
    }

    /// File form: intro magic plus four reserved bytes.
    pub fn build_with_intro(&self) -> Vec<u8> {
        let mut out = HEADER_MAGIC.to_vec();
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&self.build());
        out
    }
}

/// A typical installed-package header.
pub fn package_header(name: &str, version: &str, release: &str, arch: &str) -> HeaderBuilder {
    HeaderBuilder::new()
        .string(tags::NAME, name)
        .string(tags::VERSION, version)
        .string(tags::RELEASE, release)
        .string(tags::ARCH, arch)
        .string(tags::LICENSE, "MIT")
        .int32(tags::SIZE, &[12_345])
        .string(tags::SOURCERPM, &format!("{name}-{version}-{release}.src.rpm"))
        .int32(tags::BUILDTIME, &[1_600_000_000])
        .int32(tags::INSTALLTIME, &[1_700_000_000])
}

pub fn package_blob(name: &str, version: &str, release: &str) -> Vec<u8> {
    package_header(name, version, release, "x86_64").build()
}

// ============================================================================
// Berkeley DB hash store
// ============================================================================

const BDB_PAGE_HEADER: usize = 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn put_u32(self, buf: &mut [u8], at: usize, value: u32) {
        let bytes = match self {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        };
        buf[at..at + 4].copy_from_slice(&bytes);
    }

    fn put_u16(self, buf: &mut [u8], at: usize, value: u16) {
        let bytes = match self {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        };
        buf[at..at + 2].copy_from_slice(&bytes);
    }
}

/// Hash database layout knobs for [`BdbImage::build`].
pub struct BdbImage {
    pub page_size: usize,
    pub order: ByteOrder,
    /// Stores rpm's key-0 instance counter as an inline pair at the very end
    /// of the hash page, ahead of the package pairs.
    pub instance_counter: bool,
}

impl BdbImage {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            order: ByteOrder::Little,
            instance_counter: false,
        }
    }

    pub fn order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_instance_counter(mut self) -> Self {
        self.instance_counter = true;
        self
    }

    /// Meta page, one hash page, then one overflow chain per blob.
    pub fn build(&self, blobs: &[Vec<u8>]) -> Vec<u8> {
        let page_size = self.page_size;
        let order = self.order;
        let capacity = page_size - BDB_PAGE_HEADER;

        let mut chains = Vec::new();
        let mut next_page = 2u32;
        for blob in blobs {
            let pages = blob.len().div_ceil(capacity).max(1) as u32;
            chains.push(next_page);
            next_page += pages;
        }
        let page_count = next_page as usize;
        let mut out = vec![0u8; page_count * page_size];

        // Meta page.
        order.put_u32(&mut out, 12, 0x0006_1561);
        order.put_u32(&mut out, 16, 9);
        order.put_u32(&mut out, 20, page_size as u32);
        out[25] = 8;
        order.put_u32(&mut out, 32, (page_count - 1) as u32);

        // Hash page: key/value pairs, items packed from the end of the page.
        let hash = page_size;
        let pairs = blobs.len() + usize::from(self.instance_counter);
        order.put_u32(&mut out, hash + 8, 1);
        order.put_u16(&mut out, hash + 20, (pairs * 2) as u16);
        out[hash + 25] = 13;

        let mut item_end = page_size;
        let mut slot = hash + BDB_PAGE_HEADER;

        if self.instance_counter {
            let key_at = item_end - 5;
            out[hash + key_at] = 1;
            let value_at = key_at - 5;
            out[hash + value_at] = 1;
            order.put_u32(&mut out, hash + value_at + 1, blobs.len() as u32 + 1);
            order.put_u16(&mut out, slot, key_at as u16);
            order.put_u16(&mut out, slot + 2, value_at as u16);
            slot += 4;
            item_end = value_at;
        }

        for (i, blob) in blobs.iter().enumerate() {
            let key_at = item_end - 5;
            out[hash + key_at] = 1;
            order.put_u32(&mut out, hash + key_at + 1, i as u32 + 1);
            let value_at = key_at - 12;
            out[hash + value_at] = 3;
            order.put_u32(&mut out, hash + value_at + 4, chains[i]);
            order.put_u32(&mut out, hash + value_at + 8, blob.len() as u32);
            order.put_u16(&mut out, slot, key_at as u16);
            order.put_u16(&mut out, slot + 2, value_at as u16);
            slot += 4;
            item_end = value_at;
        }

        // Overflow chains.
        for (blob, first) in blobs.iter().zip(&chains) {
            let chunks: Vec<&[u8]> = if blob.is_empty() {
                vec![&[][..]]
            } else {
                blob.chunks(capacity).collect()
            };
            for (n, chunk) in chunks.iter().enumerate() {
                let pgno = first + n as u32;
                let page = pgno as usize * page_size;
                order.put_u32(&mut out, page + 8, pgno);
                order.put_u32(&mut out, page + 12, if n == 0 { 0 } else { pgno - 1 });
                let next = if n + 1 == chunks.len() { 0 } else { pgno + 1 };
                order.put_u32(&mut out, page + 16, next);
                order.put_u16(&mut out, page + 22, chunk.len() as u16);
                out[page + 25] = 7;
                out[page + BDB_PAGE_HEADER..page + BDB_PAGE_HEADER + chunk.len()]
                    .copy_from_slice(chunk);
            }
        }
        out
    }
}

/// Little-endian hash database without the instance counter.
pub fn bdb_store(blobs: &[Vec<u8>], page_size: usize) -> Vec<u8> {
    BdbImage::new(page_size).build(blobs)
}

/// Page number of the first overflow page of blob `index` in a
/// [`bdb_store`] image, for tests that damage a chain.
pub fn bdb_chain_start(blobs: &[Vec<u8>], page_size: usize, index: usize) -> usize {
    let capacity = page_size - BDB_PAGE_HEADER;
    2 + blobs[..index]
        .iter()
        .map(|b| b.len().div_ceil(capacity).max(1))
        .sum::<usize>()
}

// ============================================================================
// NDB store
// ============================================================================

pub const NDB_SLOT_AREA: usize = 4096;

/// NDB image with one slot page; blob `i` gets package index `i + 1`.
pub fn ndb_store(blobs: &[Vec<u8>]) -> Vec<u8> {
    let mut out = vec![0u8; NDB_SLOT_AREA];
    out[0..4].copy_from_slice(b"RpmP");
    put_le(&mut out, 4, 0);
    put_le(&mut out, 8, 1);
    put_le(&mut out, 12, 1);
    put_le(&mut out, 16, blobs.len() as u32 + 1);

    for slot in 0..(NDB_SLOT_AREA - 32) / 16 {
        out[32 + slot * 16..36 + slot * 16].copy_from_slice(b"Slot");
    }

    for (i, blob) in blobs.iter().enumerate() {
        let pkg_index = i as u32 + 1;
        let blk_offset = out.len() / 16;
        let blk_count = (16 + blob.len() + 12).div_ceil(16);

        let mut area = vec![0u8; blk_count * 16];
        area[0..4].copy_from_slice(b"BlbS");
        put_le(&mut area, 4, pkg_index);
        put_le(&mut area, 8, 0);
        put_le(&mut area, 12, blob.len() as u32);
        area[16..16 + blob.len()].copy_from_slice(blob);
        let tail = area.len() - 12;
        let checksum = adler32(&area[..tail]);
        put_le(&mut area, tail, checksum);
        put_le(&mut area, tail + 4, blob.len() as u32);
        area[tail + 8..tail + 12].copy_from_slice(b"BlbE");

        let slot = 32 + i * 16;
        put_le(&mut out, slot + 4, pkg_index);
        put_le(&mut out, slot + 8, blk_offset as u32);
        put_le(&mut out, slot + 12, blk_count as u32);
        out.extend_from_slice(&area);
    }
    out
}

/// Byte offset of blob `index`'s head in an [`ndb_store`] image.
pub fn ndb_blob_offset(image: &[u8], index: usize) -> usize {
    let slot = 32 + index * 16;
    u32::from_le_bytes([
        image[slot + 8],
        image[slot + 9],
        image[slot + 10],
        image[slot + 11],
    ]) as usize
        * 16
}

// ============================================================================
// SQLite store
// ============================================================================

pub fn sqlite_store(blobs: &[Vec<u8>]) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rpmdb.sqlite");
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE Packages (hnum INTEGER PRIMARY KEY AUTOINCREMENT, blob BLOB NOT NULL);",
        )
        .unwrap();
        for blob in blobs {
            conn.execute("INSERT INTO Packages (blob) VALUES (?1)", [blob])
                .unwrap();
        }
    }
    std::fs::read(&path).unwrap()
}

// ============================================================================
// Package files
// ============================================================================

/// Lead + signature header + main header + a stand-in payload.
pub fn rpm_file(header: &HeaderBuilder) -> Vec<u8> {
    let main = header.build_with_intro();
    let payload = b"\x1f\x8b\x08\x00 not really a payload";

    let mut lead = vec![0u8; 96];
    lead[0..4].copy_from_slice(&[0xed, 0xab, 0xee, 0xdb]);
    lead[4] = 3;
    lead[8..10].copy_from_slice(&1u16.to_be_bytes());
    lead[10..14].copy_from_slice(b"test");
    lead[76..78].copy_from_slice(&1u16.to_be_bytes());
    lead[78..80].copy_from_slice(&5u16.to_be_bytes());

    let signature = HeaderBuilder::new()
        .int32(tags::SIG_SIZE, &[(main.len() + payload.len()) as u32])
        .binary(tags::SIG_MD5, &[0xab; 16])
        .build_with_intro();

    let mut out = lead;
    out.extend_from_slice(&signature);
    out.resize(out.len() + (8 - signature.len() % 8) % 8, 0);
    out.extend_from_slice(&main);
    out.extend_from_slice(payload);
    out
}

pub fn rpm_file_for(name: &str, version: &str, release: &str, arch: &str) -> Vec<u8> {
    rpm_file(&package_header(name, version, release, arch))
}

fn put_le(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}
