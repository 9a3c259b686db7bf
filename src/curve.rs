//! Bandwidth-latency curve for a single read ratio
//!
//! A curve is a measured envelope of (bandwidth, latency) points for one
//! read/write mix. Bandwidths are stored in MB/s in non-decreasing order and
//! latencies in CPU cycles. The public API takes bandwidth in GB/s.
//!
//! # Lookup policy
//!
//! | Query bandwidth                 | Result                          |
//! |---------------------------------|---------------------------------|
//! | exactly 0, NaN or infinite      | `Undefined`                     |
//! | below the first recorded point  | `BelowMinimum(first latency)`   |
//! | inside the recorded range       | `Interpolated(linear)`          |
//! | at or above the last point      | `Overshoot`                     |

/// MB/s per GB/s
pub const MB_PER_GB: f64 = 1000.0;

/// Value written in place of a latency or score that cannot be computed
pub const SENTINEL: f64 = -1.0;

/// Outcome of a latency lookup on a curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LatencyEstimate {
    /// Zero or non-finite bandwidth has no defined latency
    Undefined,
    /// Bandwidth lower than the first recorded point; the curve is flat there
    BelowMinimum(f64),
    /// Linear interpolation between two recorded points
    Interpolated(f64),
    /// Bandwidth at or beyond the last recorded point
    Overshoot,
}

impl LatencyEstimate {
    /// Latency in curve units, if one could be estimated
    pub fn value(&self) -> Option<f64> {
        match self {
            LatencyEstimate::BelowMinimum(lat) | LatencyEstimate::Interpolated(lat) => Some(*lat),
            LatencyEstimate::Undefined | LatencyEstimate::Overshoot => None,
        }
    }

    /// Latency or [`SENTINEL`] for the undefined and overshoot cases
    pub fn or_sentinel(&self) -> f64 {
        self.value().unwrap_or(SENTINEL)
    }

    pub fn is_overshoot(&self) -> bool {
        matches!(self, LatencyEstimate::Overshoot)
    }
}

/// The two recorded points bracketing a query bandwidth (MB/s, cycles)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub bw_prev: f64,
    pub lat_prev: f64,
    pub bw_post: f64,
    pub lat_post: f64,
}

impl Segment {
    /// Slope angle of the segment in degrees
    pub fn angle_degrees(&self) -> f64 {
        (self.lat_post - self.lat_prev)
            .atan2(self.bw_post - self.bw_prev)
            .to_degrees()
    }
}

/// Immutable bandwidth-latency curve
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    read_ratio: u32,
    /// MB/s, non-decreasing
    bandwidths: Vec<f64>,
    /// CPU cycles, parallel to `bandwidths`
    latencies: Vec<f64>,
    display_warnings: bool,
}

impl Curve {
    /// Build a curve from parallel bandwidth (MB/s) and latency columns
    ///
    /// Columns stored bandwidth-descending are reversed; any other ordering
    /// is stably sorted by bandwidth. Fails when the columns are empty, have
    /// different lengths or contain non-finite values.
    pub fn new(
        read_ratio: u32,
        bandwidths: Vec<f64>,
        latencies: Vec<f64>,
    ) -> std::result::Result<Self, String> {
        if read_ratio > 100 {
            return Err(format!("read ratio {} is above 100", read_ratio));
        }
        if bandwidths.len() != latencies.len() {
            return Err(format!(
                "{} bandwidth samples but {} latency samples",
                bandwidths.len(),
                latencies.len()
            ));
        }
        if bandwidths.is_empty() {
            return Err("curve has no samples".to_string());
        }
        if let Some(bad) = bandwidths
            .iter()
            .chain(latencies.iter())
            .find(|v| !v.is_finite())
        {
            return Err(format!("non-finite sample value {}", bad));
        }

        let mut points: Vec<(f64, f64)> = bandwidths.into_iter().zip(latencies).collect();
        if is_non_increasing(&points) {
            points.reverse();
        } else if !is_non_decreasing(&points) {
            points.sort_by(|a, b| a.0.total_cmp(&b.0));
        }

        let (bandwidths, latencies) = points.into_iter().unzip();
        Ok(Self {
            read_ratio,
            bandwidths,
            latencies,
            display_warnings: true,
        })
    }

    /// Enable or silence overshoot warnings for this curve
    pub fn with_warnings(mut self, display_warnings: bool) -> Self {
        self.display_warnings = display_warnings;
        self
    }

    pub fn read_ratio(&self) -> u32 {
        self.read_ratio
    }

    pub fn write_ratio(&self) -> u32 {
        100 - self.read_ratio
    }

    /// Recorded bandwidths in MB/s, ascending
    pub fn bandwidths(&self) -> &[f64] {
        &self.bandwidths
    }

    /// Recorded latencies in cycles, parallel to [`Curve::bandwidths`]
    pub fn latencies(&self) -> &[f64] {
        &self.latencies
    }

    pub fn len(&self) -> usize {
        self.bandwidths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bandwidths.is_empty()
    }

    /// Index of the first recorded bandwidth strictly greater than `bw_mbs`
    fn posterior_index(&self, bw_mbs: f64) -> usize {
        self.bandwidths.partition_point(|&b| b <= bw_mbs)
    }

    /// Estimate the latency (cycles) for a bandwidth in GB/s
    pub fn latency(&self, bandwidth_gbs: f64) -> LatencyEstimate {
        if bandwidth_gbs == 0.0 || !bandwidth_gbs.is_finite() {
            return LatencyEstimate::Undefined;
        }

        let bw = bandwidth_gbs * MB_PER_GB;
        if bw < self.bandwidths[0] {
            tracing::debug!(
                "Bandwidth {} MB/s below minimum recorded {} MB/s for write ratio {}%",
                bw,
                self.bandwidths[0],
                self.write_ratio()
            );
            return LatencyEstimate::BelowMinimum(self.latencies[0]);
        }

        let i = self.posterior_index(bw);
        if i >= self.len() {
            if self.display_warnings {
                tracing::warn!(
                    "Cannot estimate latency for bandwidth {} GB/s using bandwidth-latency curve for a write ratio of {}%: \
                     provided bandwidth is not below the largest recorded bandwidth ({} GB/s)",
                    bandwidth_gbs,
                    self.write_ratio(),
                    self.max_bandwidth()
                );
            }
            return LatencyEstimate::Overshoot;
        }

        let Some(prev) = i.checked_sub(1) else {
            return LatencyEstimate::Undefined;
        };
        let (x1, y1) = (self.bandwidths[prev], self.latencies[prev]);
        let (x2, y2) = (self.bandwidths[i], self.latencies[i]);
        LatencyEstimate::Interpolated(y1 + (bw - x1) / (x2 - x1) * (y2 - y1))
    }

    /// Bracketing points around a bandwidth in GB/s
    ///
    /// Below the first recorded point both ends collapse onto that point.
    /// `None` on overshoot or for a non-finite bandwidth.
    pub fn segment(&self, bandwidth_gbs: f64) -> Option<Segment> {
        if !bandwidth_gbs.is_finite() {
            return None;
        }
        let i = self.posterior_index(bandwidth_gbs * MB_PER_GB);
        if i >= self.len() {
            return None;
        }
        let prev = i.saturating_sub(1);
        Some(Segment {
            bw_prev: self.bandwidths[prev],
            lat_prev: self.latencies[prev],
            bw_post: self.bandwidths[i],
            lat_post: self.latencies[i],
        })
    }

    /// Largest recorded bandwidth in GB/s
    pub fn max_bandwidth(&self) -> f64 {
        self.bandwidths[self.len() - 1] / MB_PER_GB
    }

    /// Largest recorded latency in cycles
    pub fn max_latency(&self) -> f64 {
        self.latencies
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Latency at the smallest recorded bandwidth
    pub fn lead_off_latency(&self) -> f64 {
        self.latencies[0]
    }
}

fn is_non_decreasing(points: &[(f64, f64)]) -> bool {
    points.windows(2).all(|w| w[0].0 <= w[1].0)
}

fn is_non_increasing(points: &[(f64, f64)]) -> bool {
    points.len() > 1 && points.windows(2).all(|w| w[0].0 >= w[1].0) && !is_non_decreasing(points)
}
