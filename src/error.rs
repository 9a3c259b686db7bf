//! Error types for curve loading, trace ingestion and scoring
//!
//! Only structural problems are errors. Numeric edge cases met while scoring
//! (overshoot, bandwidth below the first recorded point, zero bandwidth,
//! ratio mismatch) are represented as values and logged as warnings.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by the memstress library
#[derive(Error, Debug)]
pub enum StressError {
    /// A curve, row or trace file failed structural validation
    #[error("Bad format in {}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    /// A requested read ratio is outside 0-100
    #[error("Read ratio {read_ratio} out of range (write ratio {write_ratio}%): must be within 0-100")]
    Range { read_ratio: f64, write_ratio: f64 },

    /// A measurement that must be non-negative was not
    #[error("{name} must be non-negative, got {value}")]
    Negative { name: &'static str, value: f64 },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("TOML error in {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for memstress operations
pub type Result<T> = std::result::Result<T, StressError>;

impl StressError {
    pub fn format(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        StressError::Format {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        StressError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn range(read_ratio: f64) -> Self {
        StressError::Range {
            read_ratio,
            write_ratio: 100.0 - read_ratio,
        }
    }

    /// True for errors scoped to a single request rather than a whole file
    pub fn is_per_sample(&self) -> bool {
        matches!(self, StressError::Range { .. } | StressError::Negative { .. })
    }
}
