//! Cataloger settings.
//!
//! ```
//! use rpm_harvester::config::CatalogerConfig;
//!
//! let config = CatalogerConfig::from_json(r#"{ "concurrency": 4 }"#).unwrap();
//! assert_eq!(config.effective_concurrency(), 4);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::harvest::traits::CatalogError;

const MAX_CONCURRENCY: usize = 256;
const MAX_READ_TIMEOUT_SECS: u64 = 3_600;
const MAX_ARTIFACT_SIZE_LIMIT: usize = 2 * 1024 * 1024 * 1024; // 2 GiB

/// Tunables for one [`RpmCataloger`](crate::harvest::pipeline::RpmCataloger).
///
/// Missing fields take their defaults, so partial documents load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogerConfig {
    /// Worker count; 0 uses the available parallelism.
    pub concurrency: usize,
    /// Bound on each resolver read.
    pub read_timeout_secs: u64,
    /// Artifacts larger than this are rejected without decoding.
    pub max_artifact_size: usize,
    /// Whether the standalone `.rpm` group is queried at all.
    pub include_standalone_files: bool,
}

impl Default for CatalogerConfig {
    fn default() -> Self {
        Self {
            concurrency: 0,
            read_timeout_secs: 300,
            max_artifact_size: 1024 * 1024 * 1024, // 1 GiB
            include_standalone_files: true,
        }
    }
}

impl CatalogerConfig {
    /// Parses a JSON document and validates it.
    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let config: Self = serde_json::from_str(text).map_err(|e| CatalogError::Config {
            field: "<document>".to_owned(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field against its allowed range.
    ///
    /// - `concurrency`: 0 (auto) or 1-256
    /// - `read_timeout_secs`: 1-3600
    /// - `max_artifact_size`: 1 byte to 2 GiB
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.concurrency > MAX_CONCURRENCY {
            return Err(CatalogError::Config {
                field: "concurrency".to_owned(),
                reason: format!("must be 0 (auto) or 1-{MAX_CONCURRENCY}"),
            });
        }

        if self.read_timeout_secs == 0 || self.read_timeout_secs > MAX_READ_TIMEOUT_SECS {
            return Err(CatalogError::Config {
                field: "read_timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_READ_TIMEOUT_SECS}"),
            });
        }

        if self.max_artifact_size == 0 || self.max_artifact_size > MAX_ARTIFACT_SIZE_LIMIT {
            return Err(CatalogError::Config {
                field: "max_artifact_size".to_owned(),
                reason: format!("must be 1-{MAX_ARTIFACT_SIZE_LIMIT}"),
            });
        }

        Ok(())
    }

    /// Worker count with `0` resolved against the host.
    pub fn effective_concurrency(&self) -> usize {
        match self.concurrency {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}
