//! Candidate discovery: glob queries against the resolver, one per pattern.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::harvest::traits::CatalogError;
use crate::model::{CandidateKind, CandidatePath, ErrorKind, ScanError};
use crate::traits::ContentResolver;

/// A set of glob patterns whose matches share one classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternGroup {
    pub kind: CandidateKind,
    pub patterns: &'static [&'static str],
}

pub const DATABASE_PATTERNS: PatternGroup = PatternGroup {
    kind: CandidateKind::DatabaseStore,
    patterns: &[
        "var/lib/rpm/Packages",
        "var/lib/rpm/Packages.db",
        "var/lib/rpm/rpmdb.sqlite",
        "var/lib/rpmmanifest/container-manifest-2",
    ],
};

pub const STANDALONE_PATTERNS: PatternGroup = PatternGroup {
    kind: CandidateKind::StandaloneFile,
    patterns: &["*.rpm"],
};

/// Groups in precedence order: a path matched by both is a database store.
pub const DEFAULT_PATTERN_GROUPS: &[PatternGroup] = &[DATABASE_PATTERNS, STANDALONE_PATTERNS];

/// Rejects tables that cannot discover anything.
pub fn validate_groups(groups: &[PatternGroup]) -> Result<(), CatalogError> {
    if groups.is_empty() {
        return Err(CatalogError::Patterns("no pattern groups".to_string()));
    }
    for group in groups {
        if group.patterns.is_empty() {
            return Err(CatalogError::Patterns(format!(
                "{:?} group has no patterns",
                group.kind
            )));
        }
        if group.patterns.iter().any(|p| p.trim().is_empty()) {
            return Err(CatalogError::Patterns(format!(
                "{:?} group contains an empty pattern",
                group.kind
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct DiscoveryOutcome {
    /// Ordered by group precedence, then path.
    pub candidates: Vec<CandidatePath>,
    /// Failed queries, recorded against their pattern.
    pub errors: Vec<ScanError>,
}

/// Runs every pattern query concurrently and classifies the union.
///
/// Results are folded in table order so the outcome does not depend on which
/// query finishes first or on the order the resolver returns paths.
pub async fn discover(
    resolver: Arc<dyn ContentResolver>,
    groups: &[PatternGroup],
) -> DiscoveryOutcome {
    let queries: Vec<_> = groups
        .iter()
        .enumerate()
        .flat_map(|(rank, group)| {
            group.patterns.iter().map(move |&pattern| (rank, group.kind, pattern))
        })
        .map(|(rank, kind, pattern)| {
            let resolver = Arc::clone(&resolver);
            let handle =
                tokio::spawn(async move { resolver.files_by_glob(&[pattern]).await });
            (rank, kind, pattern, handle)
        })
        .collect();

    let mut outcome = DiscoveryOutcome::default();
    let mut seen: BTreeMap<String, (usize, CandidateKind)> = BTreeMap::new();

    for (rank, kind, pattern, handle) in queries {
        let paths = match handle.await {
            Ok(Ok(paths)) => paths,
            Ok(Err(e)) => {
                warn!(pattern, error = %e, "Glob query failed");
                outcome
                    .errors
                    .push(ScanError::new(pattern, ErrorKind::ResolverFailure, e));
                continue;
            }
            Err(e) => {
                warn!(pattern, error = %e, "Glob query task failed");
                outcome.errors.push(ScanError::new(
                    pattern,
                    ErrorKind::ResolverFailure,
                    format!("query task failed: {e}"),
                ));
                continue;
            }
        };
        debug!(pattern, matches = paths.len(), "Glob query finished");
        for path in paths {
            seen.entry(path).or_insert((rank, kind));
        }
    }

    let mut ranked: Vec<_> = seen.into_iter().collect();
    ranked.sort_by(|(a_path, (a_rank, _)), (b_path, (b_rank, _))| {
        a_rank.cmp(b_rank).then_with(|| a_path.cmp(b_path))
    });
    outcome.candidates = ranked
        .into_iter()
        .map(|(path, (_, kind))| CandidatePath { path, kind })
        .collect();
    outcome
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::MemoryResolver;
    use crate::traits::ResolverError;
    use async_trait::async_trait;

    fn tree() -> MemoryResolver {
        MemoryResolver::new()
            .with_file("var/lib/rpm/Packages", b"bdb".to_vec())
            .with_file("var/lib/rpm/rpmdb.sqlite", b"sqlite".to_vec())
            .with_file("tmp/dive-0.10.0.rpm", b"rpm".to_vec())
            .with_file("etc/os-release", b"ID=fedora".to_vec())
    }

    #[tokio::test]
    async fn test_classifies_by_group() {
        let outcome = discover(Arc::new(tree()), DEFAULT_PATTERN_GROUPS).await;

        assert!(outcome.errors.is_empty());
        assert_eq!(
            outcome.candidates,
            vec![
                CandidatePath {
                    path: "var/lib/rpm/Packages".to_string(),
                    kind: CandidateKind::DatabaseStore,
                },
                CandidatePath {
                    path: "var/lib/rpm/rpmdb.sqlite".to_string(),
                    kind: CandidateKind::DatabaseStore,
                },
                CandidatePath {
                    path: "tmp/dive-0.10.0.rpm".to_string(),
                    kind: CandidateKind::StandaloneFile,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_path_in_both_groups_goes_to_first() {
        const ODD: PatternGroup = PatternGroup {
            kind: CandidateKind::DatabaseStore,
            patterns: &["weird/Packages.rpm"],
        };
        let resolver = MemoryResolver::new().with_file("weird/Packages.rpm", Vec::new());

        let outcome = discover(Arc::new(resolver), &[ODD, STANDALONE_PATTERNS]).await;
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].kind, CandidateKind::DatabaseStore);
    }

    #[tokio::test]
    async fn test_repeat_runs_agree() {
        let resolver: Arc<dyn ContentResolver> = Arc::new(tree());
        let first = discover(Arc::clone(&resolver), DEFAULT_PATTERN_GROUPS).await;
        let second = discover(resolver, DEFAULT_PATTERN_GROUPS).await;
        assert_eq!(first.candidates, second.candidates);
    }

    struct FailingOn(&'static str);

    #[async_trait]
    impl ContentResolver for FailingOn {
        async fn files_by_glob(&self, patterns: &[&str]) -> Result<Vec<String>, ResolverError> {
            if patterns.contains(&self.0) {
                return Err(ResolverError::Unavailable("index offline".to_string()));
            }
            Ok(patterns
                .iter()
                .filter(|p| !p.contains('*'))
                .map(|p| p.to_string())
                .collect())
        }

        async fn read(&self, path: &str) -> Result<Vec<u8>, ResolverError> {
            Err(ResolverError::NotFound(path.to_string()))
        }
    }

    #[tokio::test]
    async fn test_failed_query_is_recorded_and_others_continue() {
        let outcome = discover(
            Arc::new(FailingOn("var/lib/rpm/Packages.db")),
            DEFAULT_PATTERN_GROUPS,
        )
        .await;

        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].path, "var/lib/rpm/Packages.db");
        assert_eq!(outcome.errors[0].kind, ErrorKind::ResolverFailure);
        assert_eq!(outcome.candidates.len(), 3);
    }

    #[test]
    fn test_validate_groups() {
        assert!(validate_groups(DEFAULT_PATTERN_GROUPS).is_ok());
        assert!(matches!(validate_groups(&[]), Err(CatalogError::Patterns(_))));
        const EMPTY: PatternGroup = PatternGroup {
            kind: CandidateKind::StandaloneFile,
            patterns: &[" "],
        };
        assert!(validate_groups(&[EMPTY]).is_err());
    }
}
