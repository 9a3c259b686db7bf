//! memstress - memory stress analysis for per-channel counter traces
//!
//! This library scores observed (bandwidth, latency) samples of memory
//! channels against measured bandwidth-latency curves, producing a stress
//! score between 0 (unloaded) and 1 (saturated). It covers curve loading and
//! read-ratio resolution, streaming ingestion of Paraver counter traces with
//! forward fill, bandwidth derivation from raw CAS counters, parallel
//! scoring, annotated trace output, and stress-preserving undersampling for
//! visualization.

pub mod cli;
pub mod config;
pub mod counters;
pub mod curve;
pub mod curve_set;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod sample;
pub mod sampler;
pub mod score;
pub mod snapshot;
pub mod summary;
pub mod trace;

pub use config::AnalysisConfig;
pub use counters::{CasEvent, CasKind, CounterConfig};
pub use curve::{Curve, LatencyEstimate};
pub use curve_set::CurveSet;
pub use error::{Result, StressError};
pub use sample::{Partitioning, Sample, ScoredSample};
pub use sampler::StressSampler;
pub use score::{MemoryProperties, ScoreResult, ScoreWeights, StressScorer};
