//! Reference [`ContentResolver`] implementations.
//!
//! Glob semantics follow `fast_glob`: `*` stays within one path segment and
//! `**` crosses segments. A pattern without a `/` is matched against the
//! final path segment, so `*.rpm` finds package files at any depth.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::traits::{ContentResolver, ResolverError};

fn check_patterns(patterns: &[&str]) -> Result<(), ResolverError> {
    match patterns.iter().find(|p| p.trim().is_empty()) {
        Some(pattern) => Err(ResolverError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "pattern is empty".to_string(),
        }),
        None => Ok(()),
    }
}

fn glob_matches(pattern: &str, path: &str) -> bool {
    if pattern.contains('/') {
        fast_glob::glob_match(pattern, path)
    } else {
        let name = path.rsplit('/').next().unwrap_or(path);
        fast_glob::glob_match(pattern, name)
    }
}

fn matches_any(patterns: &[&str], path: &str) -> bool {
    patterns.iter().any(|pattern| glob_matches(pattern, path))
}

// ============================================================================
// Directory
// ============================================================================

/// Resolves paths inside a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    root: PathBuf,
}

impl DirectoryResolver {
    /// # Errors
    ///
    /// Returns [`ResolverError::NotFound`] if `root` is not a directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ResolverError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ResolverError::NotFound(root.display().to_string()));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Joins a resolver path onto the root, refusing anything that would
    /// leave it.
    fn resolve(&self, path: &str) -> Result<PathBuf, ResolverError> {
        let relative = Path::new(path);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(ResolverError::NotFound(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn walk(root: &Path, patterns: &[String]) -> Vec<String> {
        let patterns: Vec<&str> = patterns.iter().map(String::as_str).collect();
        let mut found: Vec<String> = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let relative = e.path().strip_prefix(root).ok()?;
                let joined = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                matches_any(&patterns, &joined).then_some(joined)
            })
            .collect();
        found.sort();
        found
    }
}

#[async_trait]
impl ContentResolver for DirectoryResolver {
    async fn files_by_glob(&self, patterns: &[&str]) -> Result<Vec<String>, ResolverError> {
        check_patterns(patterns)?;
        let root = self.root.clone();
        let owned: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        tokio::task::spawn_blocking(move || Self::walk(&root, &owned))
            .await
            .map_err(|e| ResolverError::Unavailable(format!("directory walk failed: {e}")))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, ResolverError> {
        let full = self.resolve(path)?;
        tokio::fs::read(&full).await.map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => ResolverError::NotFound(path.to_string()),
            _ => ResolverError::Io {
                path: path.to_string(),
                source,
            },
        })
    }
}

// ============================================================================
// Memory
// ============================================================================

/// Path → contents map, for embedding hosts and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, contents: Vec<u8>) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, contents: Vec<u8>) {
        self.files.insert(path.into(), contents);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
impl ContentResolver for MemoryResolver {
    async fn files_by_glob(&self, patterns: &[&str]) -> Result<Vec<String>, ResolverError> {
        check_patterns(patterns)?;
        Ok(self
            .files
            .keys()
            .filter(|path| matches_any(patterns, path))
            .cloned()
            .collect())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, ResolverError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| ResolverError::NotFound(path.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
