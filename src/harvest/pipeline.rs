//! Catalog aggregator.
//!
//! [`RpmCataloger`] drives one scan end to end:
//! - Discovery of candidate paths through the resolver
//! - Bounded, cancellable reads with a per-read timeout
//! - Decoding on the blocking pool (`spawn_blocking`)
//! - A single merge loop that deduplicates by package identity
//!
//! Candidates are processed concurrently but merged in candidate order, so
//! which copy of a duplicated package survives does not depend on timing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::CatalogerConfig;
use crate::executor::CatalogExecutor;
use crate::harvest::discovery::{self, PatternGroup, DEFAULT_PATTERN_GROUPS};
use crate::harvest::formats::rpm_file;
use crate::harvest::formats::Store;
use crate::harvest::normalize::normalize;
use crate::harvest::traits::{CatalogError, RecordError, StoreError};
use crate::model::{CandidateKind, CandidatePath, CatalogResult, ErrorKind, PackageRecord, ScanError};
use crate::traits::ContentResolver;

// ============================================================================
// Worker Outcomes
// ============================================================================

/// Everything one candidate contributed.
#[derive(Debug, Default)]
struct CandidateOutcome {
    records: Vec<PackageRecord>,
    errors: Vec<ScanError>,
    /// Cancellation was observed before the read finished.
    skipped: bool,
}

impl CandidateOutcome {
    fn failed(error: ScanError) -> Self {
        Self {
            errors: vec![error],
            ..Self::default()
        }
    }

    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Shared, read-only state handed to every worker.
struct WorkerContext {
    resolver: Arc<dyn ContentResolver>,
    cancel: CancellationToken,
    read_timeout: Duration,
    max_artifact_size: usize,
}

// ============================================================================
// Cataloger
// ============================================================================

/// Finds every RPM package recorded in a tree.
///
/// ```ignore
/// use std::sync::Arc;
/// use rpm_harvester::{DirectoryResolver, RpmCataloger};
/// use tokio_util::sync::CancellationToken;
///
/// let resolver = Arc::new(DirectoryResolver::new("/mnt/rootfs")?);
/// let result = RpmCataloger::new()
///     .with_concurrency(4)
///     .catalog(resolver, CancellationToken::new())
///     .await?;
/// for record in result.records() {
///     println!("{}", record.identity());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RpmCataloger {
    config: CatalogerConfig,
    groups: Vec<PatternGroup>,
}

impl Default for RpmCataloger {
    fn default() -> Self {
        Self::new()
    }
}

impl RpmCataloger {
    /// Default configuration with the standard pattern table.
    pub fn new() -> Self {
        Self {
            config: CatalogerConfig::default(),
            groups: DEFAULT_PATTERN_GROUPS.to_vec(),
        }
    }

    pub fn with_config(mut self, config: CatalogerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the pattern table. Earlier groups take precedence.
    pub fn with_pattern_groups(mut self, groups: &[PatternGroup]) -> Self {
        self.groups = groups.to_vec();
        self
    }

    /// Sets the bound on each resolver read (whole seconds, at least one).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.config.concurrency = workers;
        self
    }

    pub fn with_max_artifact_size(mut self, bytes: usize) -> Self {
        self.config.max_artifact_size = bytes;
        self
    }

    pub fn with_standalone_files(mut self, include: bool) -> Self {
        self.config.include_standalone_files = include;
        self
    }

    pub fn config(&self) -> &CatalogerConfig {
        &self.config
    }

    fn active_groups(&self) -> Vec<PatternGroup> {
        self.groups
            .iter()
            .filter(|g| {
                self.config.include_standalone_files || g.kind != CandidateKind::StandaloneFile
            })
            .copied()
            .collect()
    }

    /// Runs a complete scan.
    ///
    /// Failures while scanning are collected in the result; only setup
    /// problems are returned as `Err`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the configuration or pattern table is
    /// invalid.
    #[instrument(skip_all)]
    pub async fn catalog(
        &self,
        resolver: Arc<dyn ContentResolver>,
        cancel: CancellationToken,
    ) -> Result<CatalogResult, CatalogError> {
        self.config.validate()?;
        let groups = self.active_groups();
        discovery::validate_groups(&groups)?;

        let mut result = CatalogResult::new();
        if cancel.is_cancelled() {
            warn!("Scan cancelled before discovery");
            result.push_error(ScanError::new(
                "",
                ErrorKind::Cancelled,
                "scan cancelled before discovery",
            ));
            return Ok(result);
        }

        // ====================================================================
        // Discovery
        // ====================================================================

        let found = discovery::discover(Arc::clone(&resolver), &groups).await;
        info!(
            candidates = found.candidates.len(),
            failed_queries = found.errors.len(),
            "Discovery completed"
        );
        for error in found.errors {
            result.push_error(error);
        }
        let candidates = found.candidates;

        // ====================================================================
        // Read, decode and merge
        // ====================================================================

        let executor = CatalogExecutor::new(self.config.effective_concurrency());
        let ctx = Arc::new(WorkerContext {
            resolver,
            cancel: cancel.clone(),
            read_timeout: self.config.read_timeout(),
            max_artifact_size: self.config.max_artifact_size,
        });
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, CandidateOutcome)>();

        let dispatch = executor.dispatch(
            candidates.iter().cloned().enumerate(),
            &cancel,
            move |(index, candidate)| {
                let ctx = Arc::clone(&ctx);
                let tx = tx.clone();
                async move {
                    let outcome = process_candidate(&ctx, &candidate).await;
                    // The receiver outlives every sender.
                    let _ = tx.send((index, outcome));
                }
            },
        );

        let merge = async {
            let mut pending: BTreeMap<usize, CandidateOutcome> = BTreeMap::new();
            let mut next = 0usize;
            let mut skipped = BTreeSet::new();

            while let Some((index, outcome)) = rx.recv().await {
                pending.insert(index, outcome);
                while let Some(outcome) = pending.remove(&next) {
                    if merge_outcome(&mut result, outcome) {
                        skipped.insert(next);
                    }
                    next += 1;
                }
            }
            // Only reachable if a worker died without reporting.
            for (index, outcome) in pending {
                if merge_outcome(&mut result, outcome) {
                    skipped.insert(index);
                }
            }
            skipped
        };

        let (started, skipped) = tokio::join!(dispatch, merge);

        if cancel.is_cancelled() {
            // Workers that started together may skip in any order, so the
            // first unread candidate is the lowest skipped or undispatched index.
            let unread = candidates.len() - started + skipped.len();
            let first_unread = skipped.first().copied().unwrap_or(started);
            let path = candidates
                .get(first_unread)
                .map(|c| c.path.clone())
                .unwrap_or_default();
            warn!(unread, first_unread = %path, "Scan cancelled");
            result.push_error(ScanError::new(
                path,
                ErrorKind::Cancelled,
                format!("scan cancelled with {unread} of {} candidates unread", candidates.len()),
            ));
        }

        info!(
            records = result.len(),
            errors = result.errors().len(),
            "Catalog completed"
        );
        Ok(result)
    }
}

/// Folds one candidate into the result; returns whether it was skipped.
fn merge_outcome(result: &mut CatalogResult, outcome: CandidateOutcome) -> bool {
    for record in outcome.records {
        let identity = record.identity();
        if !result.insert(record) {
            debug!(package = %identity, "Duplicate package discarded");
        }
    }
    for error in outcome.errors {
        warn!(
            path = %error.path,
            kind = %error.kind,
            locator = error.locator.as_deref().unwrap_or(""),
            cause = %error.cause,
            "Scan error"
        );
        result.push_error(error);
    }
    outcome.skipped
}

// ============================================================================
// Per-candidate Work
// ============================================================================

async fn process_candidate(ctx: &WorkerContext, candidate: &CandidatePath) -> CandidateOutcome {
    // Re-checked here because the permit may have been granted just before
    // cancellation.
    if ctx.cancel.is_cancelled() {
        return CandidateOutcome::skipped();
    }

    let path = candidate.path.clone();
    let read = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => {
            debug!(path = %path, "Read abandoned on cancellation");
            return CandidateOutcome::skipped();
        }
        read = timeout(ctx.read_timeout, ctx.resolver.read(&path)) => read,
    };
    let data = match read {
        Ok(Ok(data)) => data,
        Ok(Err(e)) => {
            return CandidateOutcome::failed(ScanError::new(path, ErrorKind::ResolverFailure, e))
        }
        Err(_) => {
            return CandidateOutcome::failed(ScanError::new(
                path,
                ErrorKind::ResolverFailure,
                format!("read timed out after {}s", ctx.read_timeout.as_secs()),
            ))
        }
    };
    debug!(path = %path, bytes = data.len(), kind = ?candidate.kind, "Candidate read");

    if data.len() > ctx.max_artifact_size {
        let size = data.len();
        let max = ctx.max_artifact_size;
        return CandidateOutcome::failed(match candidate.kind {
            CandidateKind::DatabaseStore => ScanError::new(
                path,
                ErrorKind::StoreFatal,
                StoreError::TooLarge { size, max },
            ),
            CandidateKind::StandaloneFile => ScanError::new(
                path,
                ErrorKind::RecordFatal,
                RecordError::TooLarge { size, max },
            ),
        });
    }

    let kind = candidate.kind;
    let blocking_path = path.clone();
    match tokio::task::spawn_blocking(move || decode_candidate(&blocking_path, kind, data)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let error_kind = match kind {
                CandidateKind::DatabaseStore => ErrorKind::StoreFatal,
                CandidateKind::StandaloneFile => ErrorKind::RecordFatal,
            };
            CandidateOutcome::failed(ScanError::new(
                path,
                error_kind,
                format!("decoder task failed: {e}"),
            ))
        }
    }
}

fn decode_candidate(path: &str, kind: CandidateKind, data: Vec<u8>) -> CandidateOutcome {
    match kind {
        CandidateKind::DatabaseStore => decode_store(path, data),
        CandidateKind::StandaloneFile => decode_file(path, &data),
    }
}

fn decode_store(path: &str, data: Vec<u8>) -> CandidateOutcome {
    let store = match Store::open(path, data) {
        Ok(store) => store,
        Err(e) => return CandidateOutcome::failed(ScanError::new(path, ErrorKind::StoreFatal, e)),
    };
    let format = store.format();

    let mut outcome = CandidateOutcome::default();
    for item in store.records() {
        let (table, locator) = match item {
            Ok(decoded) => (decoded.table, decoded.locator),
            Err(failure) => {
                outcome.errors.push(
                    ScanError::new(path, ErrorKind::RecordFatal, &failure.error)
                        .with_locator(failure.locator),
                );
                continue;
            }
        };
        match normalize(&table, path, CandidateKind::DatabaseStore) {
            Ok(record) => outcome.records.push(record),
            Err(e) => outcome
                .errors
                .push(ScanError::new(path, ErrorKind::RecordFatal, e).with_locator(locator)),
        }
    }

    debug!(
        path,
        format = format.name(),
        records = outcome.records.len(),
        failed = outcome.errors.len(),
        "Store decoded"
    );
    outcome
}

fn decode_file(path: &str, data: &[u8]) -> CandidateOutcome {
    let record = rpm_file::read_package(path, data).and_then(|(table, layout)| {
        debug!(
            path,
            lead = %layout.lead_name,
            payload_bytes = layout.payload_len,
            "Package file decoded"
        );
        normalize(&table, path, CandidateKind::StandaloneFile)
    });
    match record {
        Ok(record) => CandidateOutcome {
            records: vec![record],
            ..CandidateOutcome::default()
        },
        Err(e) => CandidateOutcome::failed(ScanError::new(path, ErrorKind::RecordFatal, e)),
    }
}

// ============================================================================
// Tests
// ============================================================================
