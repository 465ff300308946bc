//! Standalone `.rpm` package files: a 96-byte lead, the signature header
//! (padded to 8 bytes), the main header, then the payload.

use tracing::debug;

use crate::harvest::header;
use crate::harvest::tags;
use crate::harvest::traits::RecordError;
use crate::model::TagTable;

const LEAD_MAGIC: [u8; 4] = [0xed, 0xab, 0xee, 0xdb];
const LEAD_LEN: usize = 96;
const LEAD_NAME: std::ops::Range<usize> = 10..76;
const LEAD_SIGNATURE_TYPE: usize = 78;
/// Signature stored as a header structure; the only kind still produced.
const SIGNATURE_TYPE_HEADER: u16 = 5;

/// Byte accounting for a decoded package file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFileLayout {
    /// `name-version-release` from the lead, informational only.
    pub lead_name: String,
    pub signature_len: usize,
    pub header_len: usize,
    /// Everything after the main header.
    pub payload_len: usize,
}

pub fn is_package_lead(prefix: &[u8]) -> bool {
    prefix.starts_with(&LEAD_MAGIC)
}

/// Decodes a package file into its main header's tag table.
pub fn read_package(path: &str, data: &[u8]) -> Result<(TagTable, PackageFileLayout), RecordError> {
    if data.len() < LEAD_LEN {
        return Err(RecordError::BadLead(format!(
            "{} bytes is shorter than a lead",
            data.len()
        )));
    }
    if !is_package_lead(data) {
        return Err(RecordError::BadLead(format!(
            "lead magic {:02x?}",
            &data[..4]
        )));
    }
    let signature_type = u16::from_be_bytes([data[LEAD_SIGNATURE_TYPE], data[LEAD_SIGNATURE_TYPE + 1]]);
    if signature_type != SIGNATURE_TYPE_HEADER {
        return Err(RecordError::BadLead(format!(
            "unsupported signature type {signature_type}"
        )));
    }

    let lead_name = String::from_utf8_lossy(&data[LEAD_NAME])
        .trim_end_matches('\0')
        .to_string();

    let headers = header::decode_package(&data[LEAD_LEN..])?;
    let consumed = LEAD_LEN + headers.signature_len + headers.header_len;
    let layout = PackageFileLayout {
        lead_name,
        signature_len: headers.signature_len,
        header_len: headers.header_len,
        payload_len: data.len() - consumed,
    };

    // SIG_SIZE covers main header plus payload.
    if let Some(declared) = headers.signature.int(tags::SIG_SIZE) {
        let actual = (layout.header_len + layout.payload_len) as u64;
        if declared != actual {
            debug!(path, declared, actual, "signature size disagrees with file size");
        }
    }

    Ok((headers.header, layout))
}

// ============================================================================
// Tests
// ============================================================================
