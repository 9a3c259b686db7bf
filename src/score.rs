//! Stress scoring against a bandwidth-latency curve
//!
//! The stress score places an observed (bandwidth, latency) point on a
//! 0 (unstressed) to 1 (saturated) scale:
//!
//! ```text
//! score_latency = (latency - lead_off) / (max_latency - lead_off)
//! score_angle   = degrees(atan2(lat_post - lat_prev, bw_post - bw_prev)) / 90
//! score         = w_latency * score_latency + w_angle * score_angle
//! ```
//!
//! The default weights are 0.8 / 0.2. Traces annotated by earlier tooling
//! used an even 0.5 / 0.5 blend, available as [`ScoreWeights::even`].
//! `score_latency` is not clamped: latencies outside the curve envelope
//! yield scores slightly outside `[0, 1]`.

use crate::curve::{Curve, LatencyEstimate};
use crate::curve_set::CurveSet;
use crate::error::{Result, StressError};
use serde::{Deserialize, Serialize};

/// Blend weights for the latency and slope components of the score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub latency: f64,
    pub angle: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            latency: 0.8,
            angle: 0.2,
        }
    }
}

impl ScoreWeights {
    /// Equal weighting of both components
    pub fn even() -> Self {
        Self {
            latency: 0.5,
            angle: 0.5,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        for (name, w) in [("latency", self.latency), ("angle", self.angle)] {
            if !w.is_finite() || w < 0.0 {
                return Err(format!(
                    "score weight '{}' must be a non-negative number, got {}",
                    name, w
                ));
            }
        }
        if self.latency + self.angle == 0.0 {
            return Err("score weights cannot both be zero".to_string());
        }
        Ok(())
    }
}

/// Per-sample scoring output, latencies in curve units (cycles)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Read ratio of the curve actually used
    pub curve_read_ratio: u32,
    /// `None` when the bandwidth is zero or overshoots the curve
    pub predicted_latency: Option<f64>,
    /// GB/s
    pub max_bandwidth: f64,
    pub max_latency: f64,
    pub lead_off_latency: f64,
    /// `None` when the bandwidth overshoots the curve
    pub stress_score: Option<f64>,
}

impl ScoreResult {
    /// Convert cycle latencies to nanoseconds for a CPU clock in GHz
    pub fn in_nanoseconds(mut self, cpu_freq_ghz: f64) -> Self {
        self.predicted_latency = self.predicted_latency.map(|l| l / cpu_freq_ghz);
        self.max_latency /= cpu_freq_ghz;
        self.lead_off_latency /= cpu_freq_ghz;
        self
    }
}

/// Computes stress scores with a fixed set of weights
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StressScorer {
    weights: ScoreWeights,
}

impl StressScorer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> ScoreWeights {
        self.weights
    }

    /// Score a (bandwidth GB/s, latency cycles) point against `curve`
    ///
    /// Returns `Some(0.0)` for zero bandwidth and `None` when the bandwidth
    /// is at or beyond the last recorded point of the curve.
    pub fn score(&self, curve: &Curve, bandwidth_gbs: f64, latency: f64) -> Option<f64> {
        if bandwidth_gbs == 0.0 {
            return Some(0.0);
        }

        let segment = curve.segment(bandwidth_gbs)?;
        let score_angle = segment.angle_degrees() / 90.0;

        let lead_off = curve.lead_off_latency();
        let span = curve.max_latency() - lead_off;
        // Flat curves have no latency headroom to measure against
        let score_latency = if span > 0.0 {
            (latency - lead_off) / span
        } else {
            0.0
        };

        Some(self.weights.latency * score_latency + self.weights.angle * score_angle)
    }

    /// Full evaluation of one observation against `curve`
    pub fn evaluate(&self, curve: &Curve, bandwidth_gbs: f64, observed_latency: f64) -> ScoreResult {
        let predicted = curve.latency(bandwidth_gbs);
        ScoreResult {
            curve_read_ratio: curve.read_ratio(),
            predicted_latency: predicted.value(),
            max_bandwidth: curve.max_bandwidth(),
            max_latency: curve.max_latency(),
            lead_off_latency: curve.lead_off_latency(),
            stress_score: match predicted {
                LatencyEstimate::Overshoot => None,
                _ => self.score(curve, bandwidth_gbs, observed_latency),
            },
        }
    }
}

/// Memory behavior implied by a bandwidth alone, latencies in nanoseconds
///
/// Used when annotating traces that carry bandwidth but no latency: the
/// latency is predicted from the curve and the score is computed against
/// that prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryProperties {
    pub write_ratio: f64,
    pub curve_read_ratio: u32,
    /// Per-channel GB/s, clamped to what the curve can sustain
    pub bandwidth: f64,
    /// GB/s
    pub max_bandwidth: f64,
    /// `None` for zero bandwidth
    pub latency: Option<f64>,
    pub lead_off_latency: f64,
    pub max_latency: f64,
    pub stress_score: f64,
}

impl MemoryProperties {
    /// Derive memory properties for a channel running at `bandwidth_gbs`
    ///
    /// With `group_by_mc` the bandwidth is scaled by `mcs_per_socket` before
    /// the curve lookup. A bandwidth at or beyond the curve maximum saturates:
    /// it is clamped, the latency becomes the maximum latency and the score 1.
    pub fn compute(
        curves: &CurveSet,
        cpu_freq_ghz: f64,
        write_ratio: f64,
        bandwidth_gbs: f64,
        group_by_mc: bool,
        mcs_per_socket: u32,
    ) -> Result<Self> {
        for (name, value) in [("Write ratio", write_ratio), ("Bandwidth", bandwidth_gbs)] {
            if value.is_nan() || value < 0.0 {
                return Err(StressError::Negative { name, value });
            }
        }

        let curve = curves.resolve(100.0 - write_ratio)?;
        let factor = if group_by_mc {
            f64::from(mcs_per_socket.max(1))
        } else {
            1.0
        };
        let lookup = bandwidth_gbs * factor;
        let max_bandwidth = curve.max_bandwidth();

        let (bandwidth, latency, stress_score) = if lookup >= max_bandwidth {
            (max_bandwidth / factor, Some(curve.max_latency()), 1.0)
        } else {
            let latency = curve.latency(lookup).value();
            let observed = latency.unwrap_or_else(|| curve.lead_off_latency());
            let score = curves.scorer().score(curve, lookup, observed).unwrap_or(1.0);
            (bandwidth_gbs, latency, score)
        };

        Ok(Self {
            write_ratio,
            curve_read_ratio: curve.read_ratio(),
            bandwidth,
            max_bandwidth,
            latency: latency.map(|l| l / cpu_freq_ghz),
            lead_off_latency: curve.lead_off_latency() / cpu_freq_ghz,
            max_latency: curve.max_latency() / cpu_freq_ghz,
            stress_score,
        })
    }
}
