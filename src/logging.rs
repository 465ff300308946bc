//! Tracing setup for hosts that embed the cataloger.
//!
//! The library itself only emits `tracing` events; nothing is printed unless
//! a subscriber is installed, either by the host or through [`init_tracing`].

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("unknown log format '{0}', expected 'json' or 'pretty'")]
    UnknownFormat(String),

    #[error("failed to initialize {format} tracing subscriber: {reason}")]
    Init { format: LogFormat, reason: String },
}

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON lines
    #[default]
    Json,
    /// Human-readable multi-line output
    Pretty,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        })
    }
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(LoggingError::UnknownFormat(s.to_owned())),
        }
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over `filter` when set. Fails if a global
/// subscriber is already installed.
pub fn init_tracing(filter: &str, format: LogFormat) -> Result<(), LoggingError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
    };

    installed.map_err(|e| LoggingError::Init {
        format,
        reason: e.to_string(),
    })
}
