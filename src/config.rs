// Analysis configuration
//
// Hardware facts that cannot be read from the trace itself (CPU clock,
// fixed-point precision of the counters) plus the knobs of the analysis.
// Loaded from JSON, or TOML when the file ends in `.toml`.

use crate::counters::CounterConfig;
use crate::curve_set::DEFAULT_RATIO_TOLERANCE;
use crate::error::{Result, StressError};
use crate::sample::Partitioning;
use crate::sampler::DEFAULT_MAX_ELEMENTS;
use crate::score::ScoreWeights;
use crate::trace::{IngestOptions, DEFAULT_UNDERSAMPLE_THRESHOLD_MB};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest supported fixed-point precision (decimal digits)
const MAX_PRECISION: u32 = 15;

/// Configuration for one analysis run
///
/// # Example
/// ```
/// use memstress::config::AnalysisConfig;
///
/// let config: AnalysisConfig =
///     serde_json::from_str(r#"{"cpu_freq": 2.1, "precision": 2}"#).unwrap();
/// assert_eq!(config.max_elements, 10_000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// CPU clock in GHz, converts curve cycles to nanoseconds
    pub cpu_freq: f64,

    /// Trace metric values are integers scaled by `10^precision`
    pub precision: u32,

    /// Sample budget handed to visualization
    #[serde(default = "default_max_elements")]
    pub max_elements: usize,

    /// Trace size (MiB) above which lines are randomly undersampled
    #[serde(default = "default_undersample_threshold_mb")]
    pub undersample_threshold_mb: f64,

    /// Read ratio distance substituted without a warning
    #[serde(default = "default_ratio_tolerance")]
    pub ratio_tolerance: f64,

    #[serde(default)]
    pub score_weights: ScoreWeights,

    #[serde(default)]
    pub partitioning: Partitioning,

    /// Drop the original trace's node (id 1)
    #[serde(default)]
    pub exclude_original: bool,

    /// Scale per-channel bandwidth to the socket before curve lookup
    #[serde(default)]
    pub group_by_mc: bool,

    #[serde(default = "default_mcs_per_socket")]
    pub mcs_per_socket: u32,

    #[serde(default = "default_display_warnings")]
    pub display_warnings: bool,

    /// Fixed seed for trace undersampling
    #[serde(default)]
    pub seed: Option<u64>,

    /// CAS counter events, needed to annotate counter traces
    #[serde(default)]
    pub counters: Option<CounterConfig>,
}

fn default_max_elements() -> usize {
    DEFAULT_MAX_ELEMENTS
}

fn default_undersample_threshold_mb() -> f64 {
    DEFAULT_UNDERSAMPLE_THRESHOLD_MB
}

fn default_ratio_tolerance() -> f64 {
    DEFAULT_RATIO_TOLERANCE
}

fn default_mcs_per_socket() -> u32 {
    1
}

fn default_display_warnings() -> bool {
    true
}

impl AnalysisConfig {
    /// Configuration with the given hardware facts and default knobs
    pub fn new(cpu_freq: f64, precision: u32) -> Self {
        Self {
            cpu_freq,
            precision,
            max_elements: default_max_elements(),
            undersample_threshold_mb: default_undersample_threshold_mb(),
            ratio_tolerance: default_ratio_tolerance(),
            score_weights: ScoreWeights::default(),
            partitioning: Partitioning::default(),
            exclude_original: false,
            group_by_mc: false,
            mcs_per_socket: default_mcs_per_socket(),
            display_warnings: default_display_warnings(),
            seed: None,
            counters: None,
        }
    }

    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| StressError::io(path, e))?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let config: Self = if is_toml {
            toml::from_str(&content).map_err(|source| StressError::Toml {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            serde_json::from_str(&content).map_err(|source| StressError::Json {
                path: path.to_path_buf(),
                source,
            })?
        };

        config.validate().map_err(StressError::Config)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.cpu_freq.is_finite() || self.cpu_freq <= 0.0 {
            return Err(format!("cpu_freq must be positive, got {}", self.cpu_freq));
        }

        if self.precision > MAX_PRECISION {
            return Err(format!(
                "precision must be <= {}, got {}",
                MAX_PRECISION, self.precision
            ));
        }

        if self.max_elements == 0 {
            return Err("max_elements must be >= 1".to_string());
        }

        if !self.undersample_threshold_mb.is_finite() || self.undersample_threshold_mb <= 0.0 {
            return Err(format!(
                "undersample_threshold_mb must be positive, got {}",
                self.undersample_threshold_mb
            ));
        }

        if self.ratio_tolerance.is_nan() || self.ratio_tolerance < 0.0 {
            return Err(format!(
                "ratio_tolerance must be non-negative, got {}",
                self.ratio_tolerance
            ));
        }

        if self.mcs_per_socket == 0 {
            return Err("mcs_per_socket must be >= 1".to_string());
        }

        self.score_weights.validate()?;

        match &self.counters {
            Some(counters) => counters.validate(),
            None => Ok(()),
        }
    }

    /// Trace ingestion options derived from this configuration
    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            precision: self.precision,
            exclude_original: self.exclude_original,
            undersample_threshold_mb: Some(self.undersample_threshold_mb),
            seed: self.seed,
        }
    }
}
