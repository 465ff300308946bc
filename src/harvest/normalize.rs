//! Tag table → [`PackageRecord`] mapping.

use crate::harvest::tags;
use crate::harvest::traits::RecordError;
use crate::model::{Architecture, CandidateKind, Digests, FileSummary, PackageRecord, TagTable};

/// Builds a record from a decoded header.
///
/// # Errors
///
/// Returns [`RecordError::MissingName`] when the name tag is absent or blank.
pub fn normalize(
    table: &TagTable,
    location: &str,
    kind: CandidateKind,
) -> Result<PackageRecord, RecordError> {
    let name = text(table, tags::NAME).ok_or(RecordError::MissingName)?;

    let size = table
        .int(tags::LONGSIZE)
        .or_else(|| table.int(tags::SIZE));

    let extra_tags = table
        .iter()
        .filter(|(tag, _)| !tags::NORMALIZED.contains(tag))
        .map(|(tag, value)| (tag, value.clone()))
        .collect();

    Ok(PackageRecord {
        name,
        version: text(table, tags::VERSION).unwrap_or_default(),
        release: text(table, tags::RELEASE).unwrap_or_default(),
        epoch: table.int(tags::EPOCH).and_then(|e| i32::try_from(e).ok()),
        arch: Architecture::parse(text(table, tags::ARCH).as_deref()),
        license: text(table, tags::LICENSE),
        size,
        source_rpm: text(table, tags::SOURCERPM).filter(|s| s != "(none)"),
        vendor: text(table, tags::VENDOR),
        summary: text(table, tags::SUMMARY),
        url: text(table, tags::URL),
        modularity_label: text(table, tags::MODULARITYLABEL),
        build_time: timestamp(table, tags::BUILDTIME),
        install_time: timestamp(table, tags::INSTALLTIME),
        digests: digests(table),
        files: file_summary(table),
        location: location.to_string(),
        found_by: kind.cataloger_name().to_string(),
        extra_tags,
    })
}

/// String value with NUL terminators and surrounding whitespace removed;
/// `None` when nothing is left.
fn text(table: &TagTable, tag: u32) -> Option<String> {
    let cleaned = table
        .string(tag)?
        .trim_matches(|c: char| c == '\0' || c.is_whitespace());
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

fn timestamp(table: &TagTable, tag: u32) -> Option<i64> {
    table.int(tag).and_then(|t| i64::try_from(t).ok())
}

fn digests(table: &TagTable) -> Digests {
    Digests {
        sigmd5: table.bytes(tags::SIGMD5).filter(|b| !b.is_empty()).map(hex::encode),
        sha1_header: text(table, tags::SHA1HEADER),
        sha256_header: text(table, tags::SHA256HEADER),
        payload: text(table, tags::PAYLOADDIGEST),
    }
}

fn file_summary(table: &TagTable) -> FileSummary {
    let sizes = table
        .ints(tags::LONGFILESIZES)
        .or_else(|| table.ints(tags::FILESIZES))
        .unwrap_or_default();
    let count = table
        .strings(tags::BASENAMES)
        .map(<[String]>::len)
        .unwrap_or(sizes.len());

    // Headers without FILEDIGESTALGO predate it and use MD5.
    let digest_algorithm = match table.int(tags::FILEDIGESTALGO) {
        Some(id) => tags::digest_algorithm_name(id).map(str::to_string),
        None if count > 0 && table.contains(tags::FILEDIGESTS) => Some("md5".to_string()),
        None => None,
    };

    FileSummary {
        count,
        total_size: sizes.iter().sum(),
        digest_algorithm,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TagValue;

    fn table(entries: Vec<(u32, TagValue)>) -> TagTable {
        entries.into_iter().collect()
    }

    fn s(value: &str) -> TagValue {
        TagValue::String(value.to_string())
    }

    #[test]
    fn test_full_record() {
        let t = table(vec![
            (tags::NAME, s("openssl-libs")),
            (tags::VERSION, s("3.0.7")),
            (tags::RELEASE, s("16.el9")),
            (tags::EPOCH, TagValue::Int32(vec![1])),
            (tags::ARCH, s("x86_64")),
            (tags::LICENSE, s("ASL 2.0")),
            (tags::SIZE, TagValue::Int32(vec![6_000_000])),
            (tags::SOURCERPM, s("openssl-3.0.7-16.el9.src.rpm")),
            (tags::VENDOR, s("Red Hat, Inc.")),
            (tags::BUILDTIME, TagValue::Int32(vec![1_690_000_000])),
            (tags::INSTALLTIME, TagValue::Int32(vec![1_700_000_000])),
            (tags::SIGMD5, TagValue::Binary(vec![0x0a, 0xff])),
            (tags::SHA256HEADER, s("abc123")),
            (
                tags::BASENAMES,
                TagValue::StringArray(vec!["libssl.so.3".into(), "libcrypto.so.3".into()]),
            ),
            (tags::FILESIZES, TagValue::Int32(vec![700, 4_000])),
            (tags::FILEDIGESTALGO, TagValue::Int32(vec![8])),
            (tags::BUILDHOST, s("x86-64-01.build.example")),
        ]);

        let rec = normalize(&t, "var/lib/rpm/rpmdb.sqlite", CandidateKind::DatabaseStore).unwrap();
        assert_eq!(rec.name, "openssl-libs");
        assert_eq!(rec.epoch, Some(1));
        assert_eq!(rec.arch, Architecture::Named("x86_64".to_string()));
        assert_eq!(rec.size, Some(6_000_000));
        assert_eq!(rec.source_rpm.as_deref(), Some("openssl-3.0.7-16.el9.src.rpm"));
        assert_eq!(rec.install_time, Some(1_700_000_000));
        assert_eq!(rec.digests.sigmd5.as_deref(), Some("0aff"));
        assert_eq!(rec.digests.sha256_header.as_deref(), Some("abc123"));
        assert_eq!(rec.files.count, 2);
        assert_eq!(rec.files.total_size, 4_700);
        assert_eq!(rec.files.digest_algorithm.as_deref(), Some("sha256"));
        assert_eq!(rec.found_by, "rpm-db-cataloger");
        assert!(rec.extra_tags.contains_key(&tags::BUILDHOST));
        assert!(!rec.extra_tags.contains_key(&tags::NAME));
    }

    #[test]
    fn test_missing_name_is_rejected() {
        let t = table(vec![(tags::VERSION, s("1.0")), (tags::RELEASE, s("1"))]);
        assert_eq!(
            normalize(&t, "x.rpm", CandidateKind::StandaloneFile),
            Err(RecordError::MissingName)
        );
    }

    #[test]
    fn test_blank_name_is_rejected() {
        let t = table(vec![(tags::NAME, s("\0 \0"))]);
        assert_eq!(
            normalize(&t, "x.rpm", CandidateKind::StandaloneFile),
            Err(RecordError::MissingName)
        );
    }

    #[test]
    fn test_terminators_trimmed_and_sentinels_normalized() {
        let t = table(vec![
            (tags::NAME, s("tzdata\0")),
            (tags::VERSION, s("2023c\0\0")),
            (tags::ARCH, s("noarch\0")),
            (tags::SOURCERPM, s("(none)")),
        ]);
        let rec = normalize(&t, "Packages", CandidateKind::DatabaseStore).unwrap();
        assert_eq!(rec.name, "tzdata");
        assert_eq!(rec.version, "2023c");
        assert_eq!(rec.arch, Architecture::NoArch);
        assert_eq!(rec.source_rpm, None);
        assert_eq!(rec.epoch, None);
        assert_eq!(rec.release, "");
    }

    #[test]
    fn test_none_arch_matches_noarch_identity() {
        let a = normalize(
            &table(vec![(tags::NAME, s("x")), (tags::ARCH, s("(none)"))]),
            "a",
            CandidateKind::DatabaseStore,
        )
        .unwrap();
        let b = normalize(
            &table(vec![(tags::NAME, s("x")), (tags::ARCH, s("noarch"))]),
            "b",
            CandidateKind::StandaloneFile,
        )
        .unwrap();
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn test_long_size_preferred() {
        let t = table(vec![
            (tags::NAME, s("kernel-core")),
            (tags::SIZE, TagValue::Int32(vec![1])),
            (tags::LONGSIZE, TagValue::Int64(vec![5_000_000_000])),
        ]);
        let rec = normalize(&t, "Packages", CandidateKind::DatabaseStore).unwrap();
        assert_eq!(rec.size, Some(5_000_000_000));
    }

    #[test]
    fn test_legacy_file_digests_default_to_md5() {
        let t = table(vec![
            (tags::NAME, s("bash")),
            (tags::BASENAMES, TagValue::StringArray(vec!["bash".into()])),
            (tags::FILEDIGESTS, TagValue::StringArray(vec!["d41d8cd9".into()])),
        ]);
        let rec = normalize(&t, "Packages", CandidateKind::DatabaseStore).unwrap();
        assert_eq!(rec.files.digest_algorithm.as_deref(), Some("md5"));
    }
}
