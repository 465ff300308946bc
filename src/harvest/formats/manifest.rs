//! Distroless container manifest (`var/lib/rpmmanifest/container-manifest-2`).
//!
//! One package per line, tab separated, as written by
//! `rpm -qa --qf "%{NAME}\t%{VERSION}-%{RELEASE}\t%{INSTALLTIME}\t%{BUILDTIME}\t%{VENDOR}\t%{EPOCH}\t%{SIZE}\t%{ARCH}\t%{EPOCHNUM}\t%{SOURCERPM}\n"`.
//! Lines are turned into tag tables so they share the header normalizer.

use crate::harvest::tags;
use crate::harvest::traits::{RecordError, RecordFailure};
use crate::model::{TagTable, TagValue};

/// File name that identifies a manifest candidate.
pub const MANIFEST_FILE_NAME: &str = "container-manifest-2";

const FIELD_COUNT: usize = 10;

pub fn is_manifest_path(path: &str) -> bool {
    path.rsplit('/').next() == Some(MANIFEST_FILE_NAME)
}

pub struct ManifestStore {
    text: String,
}

impl ManifestStore {
    /// Manifests have no container structure to validate; invalid UTF-8 is
    /// replaced rather than rejected.
    pub fn open(data: Vec<u8>) -> Self {
        let text = match String::from_utf8(data) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };
        Self { text }
    }

    pub fn entries(self) -> ManifestEntries {
        ManifestEntries {
            lines: self
                .text
                .lines()
                .map(str::to_string)
                .collect::<Vec<_>>()
                .into_iter()
                .enumerate(),
        }
    }
}

pub struct ManifestEntries {
    lines: std::iter::Enumerate<std::vec::IntoIter<String>>,
}

impl Iterator for ManifestEntries {
    type Item = Result<TagTable, RecordFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        for (index, line) in self.lines.by_ref() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let number = index + 1;
            return Some(
                parse_line(line, number).map_err(|e| RecordFailure::at(format!("line {number}"), e)),
            );
        }
        None
    }
}

fn parse_line(line: &str, number: usize) -> Result<TagTable, RecordError> {
    let malformed = |reason: String| RecordError::MalformedLine {
        line: number,
        reason,
    };

    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < FIELD_COUNT {
        return Err(malformed(format!(
            "expected {FIELD_COUNT} fields, found {}",
            fields.len()
        )));
    }

    let (version, release) = match fields[1].split('-').collect::<Vec<_>>()[..] {
        [version, release] => (version, release),
        _ => {
            return Err(malformed(format!(
                "version field '{}' is not VERSION-RELEASE",
                fields[1]
            )))
        }
    };

    let string = |value: &str| TagValue::String(value.to_string());
    let mut entries = vec![
        (tags::NAME, string(fields[0])),
        (tags::VERSION, string(version)),
        (tags::RELEASE, string(release)),
        (tags::ARCH, string(fields[7])),
    ];

    if let Ok(installed) = fields[2].parse::<u32>() {
        entries.push((tags::INSTALLTIME, TagValue::Int32(vec![installed])));
    }
    if let Ok(built) = fields[3].parse::<u32>() {
        entries.push((tags::BUILDTIME, TagValue::Int32(vec![built])));
    }
    if !fields[4].is_empty() && fields[4] != "(none)" {
        entries.push((tags::VENDOR, string(fields[4])));
    }
    // EPOCH prints "(none)" when unset; EPOCHNUM prints 0 in that case.
    if fields[5] != "(none)" {
        if let Ok(epoch) = fields[8].parse::<u32>() {
            entries.push((tags::EPOCH, TagValue::Int32(vec![epoch])));
        }
    }
    if let Ok(size) = fields[6].parse::<u64>() {
        entries.push((tags::LONGSIZE, TagValue::Int64(vec![size])));
    }
    if !fields[9].is_empty() && fields[9] != "(none)" {
        entries.push((tags::SOURCERPM, string(fields[9])));
    }

    Ok(entries.into_iter().collect())
}

// ============================================================================
// Tests
// ============================================================================
