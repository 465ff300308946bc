//! Harvest module - RPM package database discovery and decoding.
//!
//! - **Discovery**: pattern table and glob queries via [`discovery`]
//! - **Formats**: Berkeley DB, NDB, SQLite, manifest and `.rpm` readers
//!   behind the [`StoreReader`] trait
//! - **Headers**: binary header decoding in [`header`], tag ids in [`tags`]
//! - **Normalization**: tag table to [`PackageRecord`](crate::model::PackageRecord)
//! - **Pipeline**: the [`RpmCataloger`] aggregator

pub mod discovery;
pub mod formats;
pub mod header;
pub mod normalize;
pub mod pipeline;
pub mod tags;
pub mod traits;

// Re-export commonly used types
pub use traits::{
    CatalogError, DecodeError, RecordError, RecordFailure, StoreError, StoreReader,
};

pub use discovery::{PatternGroup, DEFAULT_PATTERN_GROUPS};
pub use formats::{Store, StoreFormat};
pub use pipeline::RpmCataloger;
