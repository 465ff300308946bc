use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Discovery
// ============================================================================

/// Which reader a discovered path is handed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidateKind {
    /// A package database (`Packages`, `Packages.db`, `rpmdb.sqlite`, manifest).
    DatabaseStore,
    /// A single `.rpm` package file.
    StandaloneFile,
}

impl CandidateKind {
    /// Cataloger name stamped on records found through this kind of candidate.
    pub fn cataloger_name(&self) -> &'static str {
        match self {
            CandidateKind::DatabaseStore => "rpm-db-cataloger",
            CandidateKind::StandaloneFile => "rpm-file-cataloger",
        }
    }
}

/// A resolver-relative path matched by a discovery glob, not yet known to
/// contain valid data.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidatePath {
    pub path: String,
    pub kind: CandidateKind,
}

// ============================================================================
// Decoded headers
// ============================================================================

/// Bytes believed to hold one package header, with where they came from.
#[derive(Debug, Clone)]
pub struct RawHeaderBlob {
    pub bytes: Vec<u8>,
    pub source: String,
    /// Position inside the store ("page 12", "slot 3", "row 7"), if any.
    pub locator: Option<String>,
}

/// A typed header value. Numeric and string tags may carry several items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TagValue {
    Null,
    Char(Vec<u8>),
    Int8(Vec<u8>),
    Int16(Vec<u16>),
    Int32(Vec<u32>),
    Int64(Vec<u64>),
    String(String),
    Binary(Vec<u8>),
    StringArray(Vec<String>),
    I18nString(Vec<String>),
}

impl TagValue {
    /// First string item, for both scalar and list string types.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::String(s) => Some(s),
            TagValue::StringArray(v) | TagValue::I18nString(v) => v.first().map(String::as_str),
            _ => None,
        }
    }

    /// All string items.
    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            TagValue::StringArray(v) | TagValue::I18nString(v) => Some(v),
            TagValue::String(s) => Some(std::slice::from_ref(s)),
            _ => None,
        }
    }

    /// All integer items widened to `u64`.
    pub fn as_ints(&self) -> Option<Vec<u64>> {
        match self {
            TagValue::Int8(v) | TagValue::Char(v) => Some(v.iter().map(|&x| u64::from(x)).collect()),
            TagValue::Int16(v) => Some(v.iter().map(|&x| u64::from(x)).collect()),
            TagValue::Int32(v) => Some(v.iter().map(|&x| u64::from(x)).collect()),
            TagValue::Int64(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// First integer item.
    pub fn as_int(&self) -> Option<u64> {
        self.as_ints().and_then(|v| v.first().copied())
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            TagValue::Binary(b) | TagValue::Char(b) | TagValue::Int8(b) => Some(b),
            _ => None,
        }
    }
}

/// Tag id → value map decoded from one header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagTable {
    entries: BTreeMap<u32, TagValue>,
}

impl TagTable {
    pub fn get(&self, tag: u32) -> Option<&TagValue> {
        self.entries.get(&tag)
    }

    pub fn contains(&self, tag: u32) -> bool {
        self.entries.contains_key(&tag)
    }

    pub fn string(&self, tag: u32) -> Option<&str> {
        self.get(tag).and_then(TagValue::as_str)
    }

    pub fn strings(&self, tag: u32) -> Option<&[String]> {
        self.get(tag).and_then(TagValue::as_strings)
    }

    pub fn int(&self, tag: u32) -> Option<u64> {
        self.get(tag).and_then(TagValue::as_int)
    }

    pub fn ints(&self, tag: u32) -> Option<Vec<u64>> {
        self.get(tag).and_then(TagValue::as_ints)
    }

    pub fn bytes(&self, tag: u32) -> Option<&[u8]> {
        self.get(tag).and_then(TagValue::as_bytes)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &TagValue)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }
}

/// Builds a table; a repeated tag keeps its first value.
impl FromIterator<(u32, TagValue)> for TagTable {
    fn from_iter<I: IntoIterator<Item = (u32, TagValue)>>(iter: I) -> Self {
        let mut entries = BTreeMap::new();
        for (tag, value) in iter {
            entries.entry(tag).or_insert(value);
        }
        Self { entries }
    }
}

// ============================================================================
// Package records
// ============================================================================

/// Normalized architecture. `noarch`, `(none)` and missing values all map to
/// [`Architecture::NoArch`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    NoArch,
    Named(String),
}

impl Architecture {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") | Some("noarch") | Some("(none)") => Architecture::NoArch,
            Some(arch) => Architecture::Named(arch.to_string()),
        }
    }

    pub fn is_noarch(&self) -> bool {
        matches!(self, Architecture::NoArch)
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::NoArch => f.write_str("noarch"),
            Architecture::Named(arch) => f.write_str(arch),
        }
    }
}

/// Deduplication key: (name, version, release, architecture, epoch).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdentityKey {
    pub name: String,
    pub version: String,
    pub release: String,
    pub arch: Architecture,
    pub epoch: Option<i32>,
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        f.write_str("-")?;
        if let Some(epoch) = self.epoch {
            write!(f, "{epoch}:")?;
        }
        write!(f, "{}-{}.{}", self.version, self.release, self.arch)
    }
}

/// Header and payload digests, hex encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digests {
    pub sigmd5: Option<String>,
    pub sha1_header: Option<String>,
    pub sha256_header: Option<String>,
    pub payload: Option<String>,
}

/// Summary of the package's file list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub count: usize,
    pub total_size: u64,
    /// File digest algorithm name (`md5`, `sha256`, ...).
    pub digest_algorithm: Option<String>,
}

/// Canonical installed-package record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub release: String,
    pub epoch: Option<i32>,
    pub arch: Architecture,
    pub license: Option<String>,
    /// Installed size in bytes.
    pub size: Option<u64>,
    /// Source package file name, e.g. `bash-5.1-2.src.rpm`.
    pub source_rpm: Option<String>,
    pub vendor: Option<String>,
    pub summary: Option<String>,
    pub url: Option<String>,
    pub modularity_label: Option<String>,
    /// Seconds since the Unix epoch.
    pub build_time: Option<i64>,
    pub install_time: Option<i64>,
    pub digests: Digests,
    pub files: FileSummary,
    /// Resolver path of the artifact the record was read from.
    pub location: String,
    pub found_by: String,
    /// Tags outside the normalized dictionary, carried through untouched.
    pub extra_tags: BTreeMap<u32, TagValue>,
}

impl PackageRecord {
    pub fn identity(&self) -> IdentityKey {
        IdentityKey {
            name: self.name.clone(),
            version: self.version.clone(),
            release: self.release.clone(),
            arch: self.arch.clone(),
            epoch: self.epoch,
        }
    }
}

// ============================================================================
// Errors and results
// ============================================================================

/// How far a scan failure reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// The resolver could not answer a query or read.
    ResolverFailure,
    /// A store's container structure is unreadable; nothing was read from it.
    StoreFatal,
    /// One record or one standalone file was skipped.
    RecordFatal,
    /// The caller cancelled the scan.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::ResolverFailure => "resolver failure",
            ErrorKind::StoreFatal => "store fatal",
            ErrorKind::RecordFatal => "record fatal",
            ErrorKind::Cancelled => "cancelled",
        })
    }
}

/// A non-aborting failure collected during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanError {
    /// Artifact path, or the glob pattern for failed discovery queries.
    pub path: String,
    pub kind: ErrorKind,
    pub cause: String,
    pub locator: Option<String>,
}

impl ScanError {
    pub fn new(path: impl Into<String>, kind: ErrorKind, cause: impl fmt::Display) -> Self {
        Self {
            path: path.into(),
            kind,
            cause: cause.to_string(),
            locator: None,
        }
    }

    pub fn with_locator(mut self, locator: Option<String>) -> Self {
        self.locator = locator;
        self
    }

    /// True when only one record or file was lost.
    pub fn is_isolated(&self) -> bool {
        self.kind == ErrorKind::RecordFatal
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.path)?;
        if let Some(locator) = &self.locator {
            write!(f, " ({locator})")?;
        }
        write!(f, ": {}", self.cause)
    }
}

/// Deduplicated records plus every error met on the way.
#[derive(Debug, Clone, Default)]
pub struct CatalogResult {
    records: BTreeMap<IdentityKey, PackageRecord>,
    errors: Vec<ScanError>,
}

impl CatalogResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts unless a record with the same identity is already present.
    /// Returns `false` for a discarded duplicate.
    pub fn insert(&mut self, record: PackageRecord) -> bool {
        match self.records.entry(record.identity()) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    pub fn push_error(&mut self, error: ScanError) {
        self.errors.push(error);
    }

    pub fn records(&self) -> impl Iterator<Item = &PackageRecord> {
        self.records.values()
    }

    pub fn get(&self, key: &IdentityKey) -> Option<&PackageRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn errors(&self) -> &[ScanError] {
        &self.errors
    }

    pub fn errors_of(&self, kind: ErrorKind) -> impl Iterator<Item = &ScanError> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }

    pub fn was_cancelled(&self) -> bool {
        self.errors.iter().any(|e| e.kind == ErrorKind::Cancelled)
    }

    pub fn into_parts(self) -> (Vec<PackageRecord>, Vec<ScanError>) {
        (self.records.into_values().collect(), self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, arch: &str) -> PackageRecord {
        PackageRecord {
            name: name.to_string(),
            version: "1.0".to_string(),
            release: "1".to_string(),
            epoch: None,
            arch: Architecture::parse(Some(arch)),
            license: None,
            size: None,
            source_rpm: None,
            vendor: None,
            summary: None,
            url: None,
            modularity_label: None,
            build_time: None,
            install_time: None,
            digests: Digests::default(),
            files: FileSummary::default(),
            location: "var/lib/rpm/Packages".to_string(),
            found_by: "rpm-db-cataloger".to_string(),
            extra_tags: BTreeMap::new(),
        }
    }

    #[test]
    fn test_architecture_sentinels() {
        assert_eq!(Architecture::parse(Some("noarch")), Architecture::NoArch);
        assert_eq!(Architecture::parse(Some("(none)")), Architecture::NoArch);
        assert_eq!(Architecture::parse(None), Architecture::NoArch);
        assert_eq!(
            Architecture::parse(Some("x86_64")),
            Architecture::Named("x86_64".to_string())
        );
    }

    #[test]
    fn test_identity_display() {
        let mut rec = record("bash", "x86_64");
        rec.epoch = Some(1);
        assert_eq!(rec.identity().to_string(), "bash-1:1.0-1.x86_64");
    }

    #[test]
    fn test_catalog_result_keeps_first() {
        let mut result = CatalogResult::new();
        assert!(result.insert(record("bash", "x86_64")));

        let mut dup = record("bash", "x86_64");
        dup.location = "bash-1.0-1.x86_64.rpm".to_string();
        assert!(!result.insert(dup));

        assert_eq!(result.len(), 1);
        let kept = result.records().next().unwrap();
        assert_eq!(kept.location, "var/lib/rpm/Packages");
    }

    #[test]
    fn test_noarch_and_none_share_identity() {
        let mut result = CatalogResult::new();
        assert!(result.insert(record("tzdata", "noarch")));
        assert!(!result.insert(record("tzdata", "(none)")));
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_tag_table_first_value_wins() {
        let table: TagTable = vec![
            (1000, TagValue::String("first".to_string())),
            (1000, TagValue::String("second".to_string())),
        ]
        .into_iter()
        .collect();
        assert_eq!(table.string(1000), Some("first"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_scan_error_display() {
        let err = ScanError::new("var/lib/rpm/Packages", ErrorKind::RecordFatal, "truncated")
            .with_locator(Some("page 3".to_string()));
        let msg = err.to_string();
        assert!(msg.contains("page 3"));
        assert!(msg.contains("truncated"));
        assert!(err.is_isolated());
    }
}
