//! RPM header decoding.
//!
//! A header is an index region of 16-byte `(tag, type, offset, count)`
//! entries followed by a data region holding the values. Blobs kept in a
//! package database start directly with the two big-endian length words;
//! headers inside `.rpm` files are preceded by an 8-byte intro (magic plus
//! reserved bytes), and the file carries a signature header in front of the
//! main header.

use crate::harvest::tags;
use crate::harvest::traits::DecodeError;
use crate::model::{TagTable, TagValue};

/// Intro magic: `8E AD E8` followed by header version 1.
pub const HEADER_MAGIC: [u8; 4] = [0x8e, 0xad, 0xe8, 0x01];

const INTRO_LEN: usize = 8;
const PREAMBLE_LEN: usize = 8;
const ENTRY_LEN: usize = 16;

/// Upper bound on index entries.
pub const MAX_INDEX_ENTRIES: u32 = 0xffff;
/// Upper bound on the data region.
pub const MAX_DATA_LEN: u32 = 256 * 1024 * 1024;

/// Signature and main header of a package file.
#[derive(Debug, Clone)]
pub struct PackageHeaders {
    pub signature: TagTable,
    pub header: TagTable,
    /// Bytes occupied by the signature header, padding included.
    pub signature_len: usize,
    /// Bytes occupied by the main header.
    pub header_len: usize,
}

/// Decodes a complete header blob. The blob may start with the intro magic;
/// its length must match what the header declares.
pub fn decode(blob: &[u8]) -> Result<TagTable, DecodeError> {
    let (table, consumed) = decode_prefix(blob)?;
    if consumed != blob.len() {
        return Err(DecodeError::LengthMismatch {
            declared: consumed,
            actual: blob.len(),
        });
    }
    Ok(table)
}

/// Decodes the header at the start of `data` and returns it with the number
/// of bytes it occupies. Trailing bytes are left alone.
pub fn decode_prefix(data: &[u8]) -> Result<(TagTable, usize), DecodeError> {
    let start = if data.starts_with(&HEADER_MAGIC) {
        INTRO_LEN
    } else {
        0
    };
    let body = &data[start.min(data.len())..];

    require(body, PREAMBLE_LEN)?;
    let index_count = read_u32(body, 0);
    let data_len = read_u32(body, 4);
    if index_count > MAX_INDEX_ENTRIES {
        return Err(DecodeError::TooManyEntries(index_count));
    }
    if data_len > MAX_DATA_LEN {
        return Err(DecodeError::DataTooLarge(data_len));
    }

    let data_start = PREAMBLE_LEN + index_count as usize * ENTRY_LEN;
    let end = data_start + data_len as usize;
    require(body, end)?;

    let index = &body[PREAMBLE_LEN..data_start];
    let store = &body[data_start..end];

    let mut values = Vec::with_capacity(index_count as usize);
    for entry in index.chunks_exact(ENTRY_LEN) {
        let tag = read_u32(entry, 0);
        let type_code = read_u32(entry, 4);
        let offset = read_u32(entry, 8) as i32;
        let count = read_u32(entry, 12);
        values.push((tag, read_value(store, tag, type_code, offset, count)?));
    }

    Ok((values.into_iter().collect(), start + end))
}

/// Decodes the signature header and the main header that follows it.
///
/// The signature header is padded to an 8-byte boundary. Its tags live in a
/// separate table so they never shadow main header tags with the same id.
pub fn decode_package(data: &[u8]) -> Result<PackageHeaders, DecodeError> {
    expect_magic(data)?;
    let (signature, sig_len) = decode_prefix(data)?;
    let padded = sig_len + (8 - sig_len % 8) % 8;
    require(data, padded)?;

    let rest = &data[padded..];
    expect_magic(rest)?;
    let (header, header_len) = decode_prefix(rest)?;
    Ok(PackageHeaders {
        signature,
        header,
        signature_len: padded,
        header_len,
    })
}

fn read_value(
    store: &[u8],
    tag: u32,
    type_code: u32,
    offset: i32,
    count: u32,
) -> Result<TagValue, DecodeError> {
    let out_of_bounds = || DecodeError::OutOfBounds {
        tag,
        offset: i64::from(offset),
        count,
        data_len: store.len(),
    };

    if type_code == tags::TYPE_NULL {
        return Ok(TagValue::Null);
    }
    if offset < 0 || offset as usize > store.len() {
        return Err(out_of_bounds());
    }
    let offset = offset as usize;
    let rest = &store[offset..];

    let width = match type_code {
        tags::TYPE_CHAR | tags::TYPE_INT8 | tags::TYPE_BIN => 1,
        tags::TYPE_INT16 => 2,
        tags::TYPE_INT32 => 4,
        tags::TYPE_INT64 => 8,
        tags::TYPE_STRING | tags::TYPE_STRING_ARRAY | tags::TYPE_I18NSTRING => {
            return read_strings(rest, type_code, count).map_err(|e| match e {
                StringsError::OutOfBounds => out_of_bounds(),
                StringsError::Unterminated => DecodeError::UnterminatedString { tag },
            });
        }
        _ => return Err(DecodeError::UnknownType { tag, type_code }),
    };

    let len = (count as usize)
        .checked_mul(width)
        .filter(|&len| len <= rest.len())
        .ok_or_else(out_of_bounds)?;
    let raw = &rest[..len];

    Ok(match type_code {
        tags::TYPE_CHAR => TagValue::Char(raw.to_vec()),
        tags::TYPE_INT8 => TagValue::Int8(raw.to_vec()),
        tags::TYPE_BIN => TagValue::Binary(raw.to_vec()),
        tags::TYPE_INT16 => TagValue::Int16(
            raw.chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect(),
        ),
        tags::TYPE_INT32 => TagValue::Int32(raw.chunks_exact(4).map(|c| read_u32(c, 0)).collect()),
        _ => TagValue::Int64(
            raw.chunks_exact(8)
                .map(|c| u64::from_be_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect(),
        ),
    })
}

enum StringsError {
    OutOfBounds,
    Unterminated,
}

fn read_strings(mut rest: &[u8], type_code: u32, count: u32) -> Result<TagValue, StringsError> {
    // Every string takes at least its terminator.
    if count as usize > rest.len() {
        return Err(StringsError::OutOfBounds);
    }
    let wanted = if type_code == tags::TYPE_STRING {
        1
    } else {
        count as usize
    };

    let mut items = Vec::with_capacity(wanted);
    for _ in 0..wanted {
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(StringsError::Unterminated)?;
        items.push(String::from_utf8_lossy(&rest[..nul]).into_owned());
        rest = &rest[nul + 1..];
    }

    Ok(match type_code {
        tags::TYPE_STRING => TagValue::String(items.pop().unwrap_or_default()),
        tags::TYPE_STRING_ARRAY => TagValue::StringArray(items),
        _ => TagValue::I18nString(items),
    })
}

fn expect_magic(data: &[u8]) -> Result<(), DecodeError> {
    require(data, INTRO_LEN)?;
    let found = [data[0], data[1], data[2], data[3]];
    if found != HEADER_MAGIC {
        return Err(DecodeError::BadMagic(found));
    }
    Ok(())
}

fn require(data: &[u8], needed: usize) -> Result<(), DecodeError> {
    if data.len() < needed {
        return Err(DecodeError::Truncated {
            needed,
            available: data.len(),
        });
    }
    Ok(())
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

// ============================================================================
// Tests
// ============================================================================
