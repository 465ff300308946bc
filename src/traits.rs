use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("Path not found: {0}")]
    NotFound(String),
    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("IO error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Resolver unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view of the tree being scanned (a directory, an image, an archive).
///
/// Paths are relative to the tree root and use `/` separators.
#[async_trait]
pub trait ContentResolver: Send + Sync {
    /// Returns every existing path matching any of `patterns`.
    async fn files_by_glob(&self, patterns: &[&str]) -> Result<Vec<String>, ResolverError>;

    /// Returns the full contents of `path`.
    async fn read(&self, path: &str) -> Result<Vec<u8>, ResolverError>;
}
