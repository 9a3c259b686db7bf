//! Annotated trace output
//!
//! Scored samples are written back as a counter trace that the ingestor
//! reads: one event line per sample carrying the seven stress metrics as
//! `94000000 + k` events, `k` being the metric's 1-based position. Values are
//! fixed-point integers scaled by `10^precision`.
//!
//! A metric is omitted when its encoded value equals the one last written,
//! so readers recover it by forward fill. Omission follows file order across
//! all channels, the same order the ingestor fills in. Records of the
//! original node are always written in full and restart omission, so the
//! trace reads back the same with or without the original node excluded.
//!
//! The `.row` companion lists node names (`APPL`), sockets as
//! `<node>.Skt<s>` (`TASK`) and channels as `<node>.Skt<s>.MC<c>` (`THREAD`).

use super::ingest::ORIGINAL_NODE;
use super::record::MetricKey;
use super::row_file::{row_file_path, APPL_LEVEL};
use crate::error::{Result, StressError};
use crate::sample::{Sample, ScoredSample};
use crate::summary::SystemLayout;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Event type the metric ids are offset from
pub const METRIC_EVENT_BASE: u64 = 94_000_000;

/// Raw value reserved for absent metrics
const ABSENT_RAW: i64 = -1;

/// Trace event id of a metric
pub fn metric_event_id(key: MetricKey) -> u64 {
    METRIC_EVENT_BASE + key.index() as u64 + 1
}

/// Metric values a scored sample is annotated with, in [`MetricKey`] order
///
/// An unavailable stress score is written as 1 (saturated).
fn metric_values(scored: &ScoredSample) -> [f64; MetricKey::COUNT] {
    let sample = &scored.sample;
    let score = &scored.score;
    [
        sample.write_ratio,
        sample.bandwidth_gbs,
        score.max_bandwidth,
        sample.latency_ns,
        score.lead_off_latency,
        score.max_latency,
        sample.stress_score.unwrap_or(1.0),
    ]
}

/// The sample an annotated record reads back as
pub fn annotated_sample(scored: &ScoredSample) -> Sample {
    let [write_ratio, bandwidth_gbs, max_bandwidth, latency_ns, min_latency, max_latency, stress] =
        metric_values(scored);
    Sample {
        write_ratio,
        bandwidth_gbs,
        latency_ns,
        max_bandwidth_gbs: Some(max_bandwidth),
        min_latency_ns: Some(min_latency),
        max_latency_ns: Some(max_latency),
        stress_score: Some(stress),
        ..scored.sample.clone()
    }
}

/// Writes scored samples as an annotated trace with its row file
#[derive(Debug, Clone)]
pub struct AnnotatedTraceWriter {
    precision: u32,
}

impl AnnotatedTraceWriter {
    pub fn new(precision: u32) -> Self {
        Self { precision }
    }

    /// Fixed-point value of `value`, `None` when it is not finite
    ///
    /// Negative values stay negative so they read back as irregular; `-1`
    /// is reserved for absent metrics and becomes `-2`.
    pub fn encode(&self, value: f64) -> Option<i64> {
        if !value.is_finite() {
            return None;
        }
        let raw = (value * 10f64.powi(self.precision as i32)).round() as i64;
        if value < 0.0 {
            Some(raw.min(ABSENT_RAW - 1))
        } else {
            Some(raw)
        }
    }

    /// Write `trace` and its `.row` file; returns the number of metric events
    ///
    /// `node_names` labels node ids from 1 in order, as the row file of an
    /// ingested trace does. Nodes it does not cover take the name carried by
    /// their samples.
    pub fn write(&self, trace: &Path, node_names: &[String], samples: &[ScoredSample]) -> Result<u64> {
        if let Some(s) = samples.iter().find(|s| s.sample.node == 0) {
            return Err(StressError::format(
                trace,
                format!("sample at {} ns has node id 0, node ids start at 1", s.sample.timestamp_ns),
            ));
        }

        let file = File::create(trace).map_err(|e| StressError::io(trace, e))?;
        let mut out = BufWriter::new(file);
        let events = self.write_records(&mut out, trace, samples)?;
        out.flush().map_err(|e| StressError::io(trace, e))?;

        let row_file = row_file_path(trace);
        std::fs::write(&row_file, row_file_content(node_names, samples))
            .map_err(|e| StressError::io(&row_file, e))?;

        tracing::info!(
            "Wrote {} records ({} metric events) to {}",
            samples.len(),
            events,
            trace.display()
        );
        Ok(events)
    }

    fn write_records<W: Write>(&self, out: &mut W, trace: &Path, samples: &[ScoredSample]) -> Result<u64> {
        let end_ns = samples.iter().map(|s| s.sample.timestamp_ns).max().unwrap_or(0);
        let applications = samples.iter().map(|s| s.sample.node).max().unwrap_or(0);
        writeln!(out, "#Paraver (memstress):{}_ns:0:{}", end_ns, applications)
            .map_err(|e| StressError::io(trace, e))?;

        let mut last: Option<[i64; MetricKey::COUNT]> = None;
        let mut events = 0u64;
        for (idx, scored) in samples.iter().enumerate() {
            let values = self.encode_all(scored).map_err(|reason| {
                StressError::format(trace, format!("record {}: {}", idx + 1, reason))
            })?;

            let sample = &scored.sample;
            let mut line = format!(
                "2:0:{}:{}:{}:{}",
                sample.node, sample.socket, sample.memory_channel, sample.timestamp_ns
            );
            let full = sample.node == ORIGINAL_NODE;
            for key in MetricKey::ALL {
                let raw = values[key.index()];
                let unchanged = !full && last.is_some_and(|prev| prev[key.index()] == raw);
                if !unchanged {
                    line.push_str(&format!(":{}:{}", metric_event_id(key), raw));
                    events += 1;
                }
            }
            writeln!(out, "{}", line).map_err(|e| StressError::io(trace, e))?;

            last = if full { None } else { Some(values) };
        }
        Ok(events)
    }

    fn encode_all(&self, scored: &ScoredSample) -> std::result::Result<[i64; MetricKey::COUNT], String> {
        let values = metric_values(scored);
        let mut raw = [0i64; MetricKey::COUNT];
        for key in MetricKey::ALL {
            let value = values[key.index()];
            raw[key.index()] = self
                .encode(value)
                .ok_or_else(|| format!("non-finite {} value {}", key.name(), value))?;
        }
        Ok(raw)
    }
}

/// Row file content for an annotated trace
pub fn row_file_content(node_names: &[String], samples: &[ScoredSample]) -> String {
    let layout = SystemLayout::from_samples(samples.iter().map(|s| &s.sample));
    let max_node = layout.nodes.keys().max().copied().unwrap_or(0) as usize;

    let names: Vec<String> = (1..=max_node.max(node_names.len()))
        .map(|id| match node_names.get(id - 1) {
            Some(name) => name.clone(),
            None => layout
                .nodes
                .get(&(id as u32))
                .map_or_else(|| format!("node{}", id), |n| n.name.clone()),
        })
        .collect();

    let mut tasks = Vec::new();
    let mut threads = Vec::new();
    for (id, node) in &layout.nodes {
        let Some(name) = (*id as usize).checked_sub(1).and_then(|i| names.get(i)) else {
            continue;
        };
        for (socket, channels) in &node.sockets {
            let socket_label = format!("{}.Skt{}", name, socket);
            for channel in channels {
                threads.push(format!("{}.MC{}", socket_label, channel));
            }
            tasks.push(socket_label);
        }
    }

    let mut content = String::new();
    for (level, labels) in [(APPL_LEVEL, &names), ("TASK", &tasks), ("THREAD", &threads)] {
        content.push_str(&format!("LEVEL {} SIZE {}\n", level, labels.len()));
        for label in labels {
            content.push_str(label);
            content.push('\n');
        }
        content.push('\n');
    }
    content
}
