//! Curve repository integration tests: loading from disk, ratio resolution
//! and the reference lookup scenarios.

mod utils;

use memstress::curve::{LatencyEstimate, SENTINEL};
use memstress::{CurveSet, MemoryProperties, StressError};
use std::fs;
use tempfile::TempDir;

// =============================================================================
// Loading
// =============================================================================

#[test]
fn test_load_curve_directory() {
    let dir = TempDir::new().unwrap();
    let curves = utils::write_curve_dir(dir.path(), &[40, 50, 60]);
    // Unrelated files are ignored
    fs::write(curves.join("README"), "not a curve").unwrap();

    let set = CurveSet::load(&curves).unwrap();
    assert_eq!(set.read_ratios(), vec![40, 50, 60]);

    // Files are bandwidth-descending on disk; curves are ascending after load
    let curve = set.get(50).unwrap();
    assert_eq!(curve.bandwidths(), &[1000.0, 2000.0, 3000.0]);
    assert_eq!(curve.latencies(), &[100.0, 150.0, 400.0]);
}

#[test]
fn test_load_json_bundle() {
    let dir = TempDir::new().unwrap();
    let bundle = utils::write_curve_bundle(dir.path(), &[0, 100]);

    let set = CurveSet::load(&bundle).unwrap();
    assert_eq!(set.read_ratios(), vec![0, 100]);
    assert_eq!(set.get(100).unwrap().write_ratio(), 0);
}

#[test]
fn test_empty_directory_is_format_error() {
    let dir = TempDir::new().unwrap();
    let err = CurveSet::load(dir.path()).unwrap_err();
    assert!(matches!(err, StressError::Format { .. }));
}

#[test]
fn test_malformed_curve_file_names_path_and_line() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("bwlat_50.txt"), "3000 400\n2000\n").unwrap();

    let err = CurveSet::load(dir.path()).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("bwlat_50.txt"));
    assert!(msg.contains("line 2"));
}

#[test]
fn test_missing_curve_source_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = CurveSet::load(dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, StressError::Io { .. }));
}

#[test]
fn test_invalid_bundle_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("curves.json");
    fs::write(&path, r#"{"50": [[1000, 100], [2000]]}"#).unwrap();
    assert!(matches!(
        CurveSet::load(&path).unwrap_err(),
        StressError::Json { .. }
    ));
}

// =============================================================================
// Reference scenarios
// =============================================================================

#[test]
fn test_reference_curve_lookups() {
    let dir = TempDir::new().unwrap();
    let set = CurveSet::load(utils::write_curve_dir(dir.path(), &[50])).unwrap();
    let curve = set.get(50).unwrap();

    assert_eq!(curve.latency(2500.0), LatencyEstimate::Overshoot);
    assert_eq!(curve.latency(2500.0).or_sentinel(), SENTINEL);
    assert_eq!(curve.latency(1.5), LatencyEstimate::Interpolated(125.0));
    assert_eq!(curve.latency(0.0).or_sentinel(), SENTINEL);
    assert_eq!(curve.max_bandwidth(), 3.0);
    assert_eq!(curve.lead_off_latency(), 100.0);
    assert_eq!(curve.max_latency(), 400.0);
}

#[test]
fn test_ratio_47_resolves_to_50() {
    let dir = TempDir::new().unwrap();
    let set = CurveSet::load(utils::write_curve_dir(dir.path(), &[40, 50, 60])).unwrap();

    assert_eq!(set.resolve(47.0).unwrap().read_ratio(), 50);
    assert_eq!(set.resolve(45.0).unwrap().read_ratio(), 40);
    assert_eq!(set.resolve(60.0).unwrap().read_ratio(), 60);
    assert_eq!(set.resolve(100.0).unwrap().read_ratio(), 60);
}

#[test]
fn test_out_of_range_ratio_rejected_by_every_accessor() {
    let dir = TempDir::new().unwrap();
    let set = CurveSet::load(utils::write_curve_dir(dir.path(), &[50])).unwrap();

    assert!(matches!(set.resolve(101.0), Err(StressError::Range { .. })));
    assert!(set.latency(-1.0, 1.0).is_err());
    assert!(set.max_bandwidth(150.0).is_err());
    assert!(set.max_latency(f64::NAN).is_err());
    assert!(set.lead_off_latency(-0.5).is_err());
    assert!(set.stress_score(200.0, 1.0, 100.0).is_err());
}

#[test]
fn test_accessors_go_through_resolution() {
    let dir = TempDir::new().unwrap();
    let set = CurveSet::load(utils::write_curve_dir(dir.path(), &[50])).unwrap();

    assert_eq!(set.latency(52.0, 1.5).unwrap(), LatencyEstimate::Interpolated(125.0));
    assert_eq!(set.max_bandwidth(48.0).unwrap(), 3.0);
    assert_eq!(set.lead_off_latency(90.0).unwrap(), 100.0);
    assert_eq!(set.stress_score(50.0, 0.0, 999.0).unwrap(), Some(0.0));
    assert_eq!(set.stress_score(50.0, 3.5, 999.0).unwrap(), None);
    assert_eq!(set.peak_bandwidth(), 3.0);
}

#[test]
fn test_memory_properties_from_loaded_curves() {
    let dir = TempDir::new().unwrap();
    let set = CurveSet::load(utils::write_curve_dir(dir.path(), &[50])).unwrap();

    let props = MemoryProperties::compute(&set, 2.0, 50.0, 1.5, false, 1).unwrap();
    assert_eq!(props.curve_read_ratio, 50);
    assert_eq!(props.latency, Some(62.5));
    assert!(props.stress_score > 0.0 && props.stress_score < 1.0);

    let saturated = MemoryProperties::compute(&set, 2.0, 50.0, 10.0, false, 1).unwrap();
    assert_eq!(saturated.bandwidth, 3.0);
    assert_eq!(saturated.stress_score, 1.0);
}
