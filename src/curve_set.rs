//! Curve repository: loading and read-ratio resolution
//!
//! Curves come either from a directory of `bwlat_<read_ratio>.txt` files
//! (two whitespace-separated columns, bandwidth-descending) or from a single
//! JSON bundle mapping read ratio to `[bandwidth, latency]` pairs.
//!
//! Measured curves rarely cover every read ratio. [`CurveSet::resolve`]
//! substitutes the closest available ratio and every accessor goes through
//! it, so curve selection behaves identically everywhere.

use crate::curve::{Curve, LatencyEstimate};
use crate::error::{Result, StressError};
use crate::score::{ScoreResult, ScoreWeights, StressScorer};
use std::collections::BTreeMap;
use std::path::Path;

/// Largest ratio distance (percentage points) substituted without a warning
pub const DEFAULT_RATIO_TOLERANCE: f64 = 2.0;

const CURVE_FILE_PREFIX: &str = "bwlat_";
const CURVE_FILE_SUFFIX: &str = ".txt";

/// Immutable collection of curves keyed by integer read ratio
#[derive(Debug, Clone)]
pub struct CurveSet {
    curves: BTreeMap<u32, Curve>,
    tolerance: f64,
    display_warnings: bool,
    scorer: StressScorer,
}

impl CurveSet {
    /// Build a set from already constructed curves
    pub fn from_curves(curves: impl IntoIterator<Item = Curve>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for curve in curves {
            let ratio = curve.read_ratio();
            if map.insert(ratio, curve).is_some() {
                return Err(StressError::Config(format!(
                    "duplicate curve for read ratio {}",
                    ratio
                )));
            }
        }
        if map.is_empty() {
            return Err(StressError::Config("curve set is empty".to_string()));
        }
        Ok(Self {
            curves: map,
            tolerance: DEFAULT_RATIO_TOLERANCE,
            display_warnings: true,
            scorer: StressScorer::default(),
        })
    }

    /// Load curves from a `bwlat_*.txt` directory or a JSON bundle file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let curves = if path.is_dir() {
            load_directory(path)?
        } else {
            load_json(path)?
        };
        tracing::debug!("Loaded {} curves from {}", curves.len(), path.display());
        Self::from_curves(curves)
    }

    /// Ratio distance above which a substitution is reported
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Enable or silence mismatch and overshoot warnings
    pub fn with_warnings(mut self, display_warnings: bool) -> Self {
        self.display_warnings = display_warnings;
        self.curves = self
            .curves
            .into_iter()
            .map(|(ratio, curve)| (ratio, curve.with_warnings(display_warnings)))
            .collect();
        self
    }

    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.scorer = StressScorer::new(weights);
        self
    }

    pub fn scorer(&self) -> &StressScorer {
        &self.scorer
    }

    /// Read ratios with a recorded curve, ascending
    pub fn read_ratios(&self) -> Vec<u32> {
        self.curves.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.curves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }

    /// Curve recorded for exactly `read_ratio`, without substitution
    pub fn get(&self, read_ratio: u32) -> Option<&Curve> {
        self.curves.get(&read_ratio)
    }

    /// Highest bandwidth (GB/s) across all curves
    pub fn peak_bandwidth(&self) -> f64 {
        self.curves
            .values()
            .map(Curve::max_bandwidth)
            .fold(0.0, f64::max)
    }

    /// Curve for `read_ratio`, or the closest available one
    ///
    /// Ties are broken toward the smaller ratio. Ratios outside 0-100 are a
    /// range error.
    pub fn resolve(&self, read_ratio: f64) -> Result<&Curve> {
        if !(0.0..=100.0).contains(&read_ratio) {
            return Err(StressError::range(read_ratio));
        }

        let mut best: Option<(&u32, &Curve)> = None;
        for (ratio, curve) in &self.curves {
            let distance = (f64::from(*ratio) - read_ratio).abs();
            match best {
                Some((best_ratio, _)) if distance >= (f64::from(*best_ratio) - read_ratio).abs() => {}
                _ => best = Some((ratio, curve)),
            }
        }

        let (ratio, curve) = best.ok_or_else(|| StressError::Config("curve set is empty".to_string()))?;
        if self.display_warnings && (f64::from(*ratio) - read_ratio).abs() > self.tolerance {
            tracing::warn!(
                "The given write ratio of {}% may be too far from the ones computed in the curves. \
                 Using closest write ratio of {}%.",
                100.0 - read_ratio,
                curve.write_ratio()
            );
        }
        Ok(curve)
    }

    pub fn latency(&self, read_ratio: f64, bandwidth_gbs: f64) -> Result<LatencyEstimate> {
        Ok(self.resolve(read_ratio)?.latency(bandwidth_gbs))
    }

    pub fn max_bandwidth(&self, read_ratio: f64) -> Result<f64> {
        Ok(self.resolve(read_ratio)?.max_bandwidth())
    }

    pub fn max_latency(&self, read_ratio: f64) -> Result<f64> {
        Ok(self.resolve(read_ratio)?.max_latency())
    }

    pub fn lead_off_latency(&self, read_ratio: f64) -> Result<f64> {
        Ok(self.resolve(read_ratio)?.lead_off_latency())
    }

    pub fn stress_score(&self, read_ratio: f64, bandwidth_gbs: f64, latency: f64) -> Result<Option<f64>> {
        let curve = self.resolve(read_ratio)?;
        Ok(self.scorer.score(curve, bandwidth_gbs, latency))
    }

    /// Full [`ScoreResult`] for one observation, latencies in cycles
    pub fn evaluate(&self, read_ratio: f64, bandwidth_gbs: f64, observed_latency: f64) -> Result<ScoreResult> {
        let curve = self.resolve(read_ratio)?;
        Ok(self.scorer.evaluate(curve, bandwidth_gbs, observed_latency))
    }
}

/// Parse the read ratio out of a `bwlat_<ratio>.txt` file name
fn curve_file_ratio(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix(CURVE_FILE_PREFIX)?
        .strip_suffix(CURVE_FILE_SUFFIX)?
        .parse()
        .ok()
}

fn load_directory(dir: &Path) -> Result<Vec<Curve>> {
    let entries = std::fs::read_dir(dir).map_err(|e| StressError::io(dir, e))?;

    let mut curves = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StressError::io(dir, e))?;
        let file_name = entry.file_name();
        let Some(ratio) = file_name.to_str().and_then(curve_file_ratio) else {
            continue;
        };
        curves.push(load_text_curve(&entry.path(), ratio)?);
    }

    if curves.is_empty() {
        return Err(StressError::format(
            dir,
            "no bwlat_<ratio>.txt curve files found",
        ));
    }
    Ok(curves)
}

/// Parse one legacy text curve file
pub fn load_text_curve(path: &Path, read_ratio: u32) -> Result<Curve> {
    let content = std::fs::read_to_string(path).map_err(|e| StressError::io(path, e))?;
    parse_text_curve(&content, read_ratio).map_err(|reason| StressError::format(path, reason))
}

fn parse_text_curve(content: &str, read_ratio: u32) -> std::result::Result<Curve, String> {
    let mut bandwidths = Vec::new();
    let mut latencies = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let (Some(bw), Some(lat)) = (tokens.next(), tokens.next()) else {
            return Err(format!("line {}: expected two columns, got '{}'", idx + 1, line));
        };
        let bw: f64 = bw
            .parse()
            .map_err(|_| format!("line {}: invalid bandwidth '{}'", idx + 1, bw))?;
        let lat: f64 = lat
            .parse()
            .map_err(|_| format!("line {}: invalid latency '{}'", idx + 1, lat))?;
        bandwidths.push(bw);
        latencies.push(lat);
    }

    Curve::new(read_ratio, bandwidths, latencies)
}

fn load_json(path: &Path) -> Result<Vec<Curve>> {
    let content = std::fs::read_to_string(path).map_err(|e| StressError::io(path, e))?;
    let bundle: BTreeMap<String, Vec<[f64; 2]>> =
        serde_json::from_str(&content).map_err(|source| StressError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    if bundle.is_empty() {
        return Err(StressError::format(path, "curve bundle is empty"));
    }

    bundle
        .into_iter()
        .map(|(key, pairs)| {
            let ratio: u32 = key
                .trim()
                .parse()
                .map_err(|_| StressError::format(path, format!("invalid read ratio key '{}'", key)))?;
            let (bandwidths, latencies) = pairs.into_iter().map(|[bw, lat]| (bw, lat)).unzip();
            Curve::new(ratio, bandwidths, latencies)
                .map_err(|reason| StressError::format(path, format!("read ratio {}: {}", ratio, reason)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve(ratio: u32) -> Curve {
        Curve::new(ratio, vec![1000.0, 2000.0, 3000.0], vec![100.0, 150.0, 400.0]).unwrap()
    }

    fn set(ratios: &[u32]) -> CurveSet {
        CurveSet::from_curves(ratios.iter().map(|&r| curve(r))).unwrap()
    }

    #[test]
    fn test_curve_file_ratio() {
        assert_eq!(curve_file_ratio("bwlat_50.txt"), Some(50));
        assert_eq!(curve_file_ratio("bwlat_0.txt"), Some(0));
        assert_eq!(curve_file_ratio("bwlat_x.txt"), None);
        assert_eq!(curve_file_ratio("bwlat_50.csv"), None);
        assert_eq!(curve_file_ratio("README.md"), None);
    }

    #[test]
    fn test_parse_text_curve_skips_comments() {
        let curve = parse_text_curve("# bw lat\n3000 400\n\n2000 150\n1000 100\n", 50).unwrap();
        assert_eq!(curve.bandwidths(), &[1000.0, 2000.0, 3000.0]);
        assert_eq!(curve.latencies(), &[100.0, 150.0, 400.0]);
    }

    #[test]
    fn test_parse_text_curve_single_column_fails() {
        let err = parse_text_curve("3000 400\n2000\n", 50).unwrap_err();
        assert!(err.contains("line 2"));
    }

    #[test]
    fn test_parse_text_curve_empty_fails() {
        assert!(parse_text_curve("# only a comment\n", 50).is_err());
    }

    #[test]
    fn test_resolve_exact() {
        let curves = set(&[40, 50, 60]);
        assert_eq!(curves.resolve(50.0).unwrap().read_ratio(), 50);
    }

    #[test]
    fn test_resolve_closest() {
        let curves = set(&[40, 50, 60]);
        assert_eq!(curves.resolve(47.0).unwrap().read_ratio(), 50);
        assert_eq!(curves.resolve(58.5).unwrap().read_ratio(), 60);
        assert_eq!(curves.resolve(100.0).unwrap().read_ratio(), 60);
    }

    #[test]
    fn test_resolve_tie_prefers_smaller_ratio() {
        let curves = set(&[40, 50, 60]);
        assert_eq!(curves.resolve(45.0).unwrap().read_ratio(), 40);
        assert_eq!(curves.resolve(55.0).unwrap().read_ratio(), 50);
    }

    #[test]
    fn test_resolve_out_of_range() {
        let curves = set(&[50]);
        assert!(matches!(curves.resolve(-1.0), Err(StressError::Range { .. })));
        assert!(matches!(curves.resolve(100.5), Err(StressError::Range { .. })));
        assert!(curves.resolve(f64::NAN).is_err());
    }

    #[test]
    fn test_accessors_use_resolution() {
        let curves = set(&[40, 50]);
        assert_eq!(curves.max_bandwidth(44.0).unwrap(), 3.0);
        assert_eq!(curves.max_latency(44.0).unwrap(), 400.0);
        assert_eq!(curves.lead_off_latency(44.0).unwrap(), 100.0);
        assert_eq!(curves.latency(44.0, 1.5).unwrap().value(), Some(125.0));
        assert!(curves.stress_score(44.0, 1.5, 125.0).unwrap().is_some());
        assert_eq!(curves.evaluate(44.0, 1.5, 125.0).unwrap().curve_read_ratio, 40);
    }

    #[test]
    fn test_duplicate_ratio_rejected() {
        assert!(CurveSet::from_curves([curve(50), curve(50)]).is_err());
    }

    #[test]
    fn test_empty_set_rejected() {
        assert!(CurveSet::from_curves(Vec::<Curve>::new()).is_err());
    }

    #[test]
    fn test_read_ratios_sorted() {
        let curves = set(&[60, 40, 50]);
        assert_eq!(curves.read_ratios(), vec![40, 50, 60]);
    }

    #[test]
    fn test_peak_bandwidth() {
        let curves = CurveSet::from_curves([
            curve(50),
            Curve::new(100, vec![1000.0, 5000.0], vec![90.0, 300.0]).unwrap(),
        ])
        .unwrap();
        assert_eq!(curves.peak_bandwidth(), 5.0);
    }
}
