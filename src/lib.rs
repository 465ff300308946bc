pub mod config;
pub mod executor;
pub mod harvest;
pub mod logging;
pub mod model;
pub mod resolver;
pub mod traits;

#[cfg(test)]
mod fixtures;

// Re-export common types for convenience
pub use config::CatalogerConfig;
pub use executor::*;
pub use harvest::pipeline::RpmCataloger;
pub use model::*;
pub use resolver::{DirectoryResolver, MemoryResolver};
pub use traits::*;
