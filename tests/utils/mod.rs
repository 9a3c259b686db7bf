// Integration test utilities
//
// On-disk fixtures: curve directories, curve bundles, traces with their
// row files and analysis configs.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

/// Paraver header line; always the first trace line
pub const TRACE_HEADER: &str = "#Paraver (01/01/2024 at 10:00):5000000000_ns:1(2):2:2(1:1,1:1)";

/// Metric ids (last digit selects the metric)
pub const WRITE_RATIO: u64 = 1;
pub const BANDWIDTH: u64 = 2;
pub const MAX_BANDWIDTH: u64 = 3;
pub const LATENCY: u64 = 4;

/// Curve points in MB/s and cycles, bandwidth-descending as written by the curve tools
pub fn curve_text(points: &[(f64, f64)]) -> String {
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| b.0.total_cmp(&a.0));
    sorted
        .iter()
        .map(|(bw, lat)| format!("{} {}\n", bw, lat))
        .collect()
}

/// The reference curve: (1000,100) (2000,150) (3000,400)
pub fn reference_points() -> Vec<(f64, f64)> {
    vec![(1000.0, 100.0), (2000.0, 150.0), (3000.0, 400.0)]
}

/// Write `bwlat_<ratio>.txt` files for each read ratio, all with the reference curve
pub fn write_curve_dir(dir: &Path, ratios: &[u32]) -> PathBuf {
    let curves = dir.join("curves");
    fs::create_dir_all(&curves).unwrap();
    for ratio in ratios {
        fs::write(
            curves.join(format!("bwlat_{}.txt", ratio)),
            curve_text(&reference_points()),
        )
        .unwrap();
    }
    curves
}

/// Write a JSON curve bundle with the reference curve for each read ratio
pub fn write_curve_bundle(dir: &Path, ratios: &[u32]) -> PathBuf {
    let bundle: serde_json::Map<String, serde_json::Value> = ratios
        .iter()
        .map(|r| {
            let pairs: Vec<[f64; 2]> = reference_points().iter().map(|&(b, l)| [b, l]).collect();
            (r.to_string(), serde_json::json!(pairs))
        })
        .collect();
    let path = dir.join("curves.json");
    fs::write(&path, serde_json::to_string(&bundle).unwrap()).unwrap();
    path
}

/// One trace event line
pub fn trace_line(node: u32, socket: u32, mc: u32, ts: u64, metrics: &[(u64, i64)]) -> String {
    let mut line = format!("2:0:{}:{}:{}:{}", node, socket, mc, ts);
    for (id, value) in metrics {
        line.push_str(&format!(":{}:{}", id, value));
    }
    line
}

/// Write `<name>.prv` and `<name>.row` with the given node names and event lines
pub fn write_trace(dir: &Path, name: &str, node_names: &[&str], lines: &[String]) -> PathBuf {
    let trace = dir.join(format!("{}.prv", name));
    let mut content = String::from(TRACE_HEADER);
    content.push('\n');
    for line in lines {
        content.push_str(line);
        content.push('\n');
    }
    fs::write(&trace, content).unwrap();

    let mut row = format!("LEVEL CPU SIZE 1\ncpu1\n\nLEVEL APPL SIZE {}\n", node_names.len());
    for node in node_names {
        row.push_str(node);
        row.push('\n');
    }
    fs::write(dir.join(format!("{}.row", name)), row).unwrap();
    trace
}

/// Config with 2 GHz clock and one decimal digit of precision
pub fn write_config(dir: &Path, extra: &str) -> PathBuf {
    let path = dir.join("config.json");
    let body = if extra.is_empty() {
        r#"{"cpu_freq": 2.0, "precision": 1}"#.to_string()
    } else {
        format!(r#"{{"cpu_freq": 2.0, "precision": 1, {}}}"#, extra)
    };
    fs::write(&path, body).unwrap();
    path
}

/// A small two-socket trace on node 2 ("node-a"), write ratio 50%
///
/// With precision 1: bandwidth 1.5 GB/s and latency 62.5 ns (125 cycles at 2 GHz).
pub fn standard_trace(dir: &Path) -> PathBuf {
    let lines = vec![
        trace_line(2, 0, 0, 1_000_000_000, &[(WRITE_RATIO, 500), (BANDWIDTH, 15), (LATENCY, 625)]),
        trace_line(2, 1, 0, 1_000_000_000, &[(WRITE_RATIO, 500), (BANDWIDTH, 25), (LATENCY, 1000)]),
        trace_line(2, 0, 0, 2_000_000_000, &[(LATENCY, 700)]),
        trace_line(2, 1, 0, 2_000_000_000, &[(BANDWIDTH, 0), (LATENCY, 0)]),
        trace_line(2, 0, 1, 3_000_000_000, &[(BANDWIDTH, 12), (LATENCY, 550)]),
    ];
    write_trace(dir, "app", &["original", "node-a"], &lines)
}

/// CAS counter event ids of socket 0, channel 0
pub const CAS_READ: u64 = 42_000_001;
pub const CAS_WRITE: u64 = 42_000_002;

/// Config entry declaring the CAS events of socket 0, channel 0
pub fn counters_section() -> String {
    format!(
        r#""counters": {{"events": [
            {{"id": {}, "socket": 0, "mc": 0, "kind": "read"}},
            {{"id": {}, "socket": 0, "mc": 0, "kind": "write"}}]}}"#,
        CAS_READ, CAS_WRITE
    )
}

/// Write `<name>.prv` with CAS counts `(timestamp, reads, writes)` of node 1
/// and a `.row` naming it `host-a`
pub fn write_counter_trace(dir: &Path, name: &str, counts: &[(u64, u64, u64)]) -> PathBuf {
    let trace = dir.join(format!("{}.prv", name));
    let mut content = String::from(TRACE_HEADER);
    content.push('\n');
    content.push_str("1:1:1:1:1:0:500:1\n");
    for (ts, reads, writes) in counts {
        content.push_str(&format!("2:1:1:1:1:{}:{}:{}:{}:{}\n", ts, CAS_READ, reads, CAS_WRITE, writes));
    }
    fs::write(&trace, content).unwrap();

    let row = "LEVEL NODE SIZE 1\nhost-a\n\nLEVEL APPL SIZE 1\napp\n";
    fs::write(dir.join(format!("{}.row", name)), row).unwrap();
    trace
}

/// Counts giving 1.536 GB/s at 1 ms and 2.0 GB/s at 2 ms, both 50% writes
pub fn standard_counts() -> Vec<(u64, u64, u64)> {
    vec![(1_000_000, 12_000, 12_000), (2_000_000, 15_625, 15_625)]
}
