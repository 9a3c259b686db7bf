//! Scored sample snapshots
//!
//! A CSV snapshot stores one scored sample per row so an analysis can be
//! reloaded without re-ingesting the raw trace. Absent values are empty
//! fields. The JSON report bundles the summary with the samples for
//! machine consumption.

use crate::error::{Result, StressError};
use crate::sample::{Sample, ScoredSample};
use crate::score::ScoreResult;
use crate::summary::TraceSummary;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Snapshot column names, in file order
pub const COLUMNS: [&str; 17] = [
    "node",
    "node_name",
    "socket",
    "mc",
    "timestamp_ns",
    "write_ratio",
    "bandwidth_gbs",
    "latency_ns",
    "trace_max_bandwidth_gbs",
    "trace_min_latency_ns",
    "trace_max_latency_ns",
    "stress_score",
    "curve_read_ratio",
    "predicted_latency_ns",
    "max_bandwidth_gbs",
    "max_latency_ns",
    "lead_off_latency_ns",
];

/// Snapshot path next to a trace: same path with a `.csv` extension
pub fn snapshot_path(trace_path: &Path) -> PathBuf {
    trace_path.with_extension("csv")
}

/// Escape CSV field (handle commas, quotes, newlines)
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn format_row(s: &ScoredSample) -> String {
    let sample = &s.sample;
    let score = &s.score;
    [
        sample.node.to_string(),
        escape_field(&sample.node_name),
        sample.socket.to_string(),
        sample.memory_channel.to_string(),
        sample.timestamp_ns.to_string(),
        sample.write_ratio.to_string(),
        sample.bandwidth_gbs.to_string(),
        sample.latency_ns.to_string(),
        optional(sample.max_bandwidth_gbs),
        optional(sample.min_latency_ns),
        optional(sample.max_latency_ns),
        optional(sample.stress_score),
        score.curve_read_ratio.to_string(),
        optional(score.predicted_latency),
        score.max_bandwidth.to_string(),
        score.max_latency.to_string(),
        score.lead_off_latency.to_string(),
    ]
    .join(",")
}

/// Render scored samples as CSV
pub fn to_csv(samples: &[ScoredSample]) -> String {
    let mut output = String::new();
    output.push_str(&COLUMNS.join(","));
    output.push('\n');
    for sample in samples {
        output.push_str(&format_row(sample));
        output.push('\n');
    }
    output
}

/// Write a CSV snapshot
pub fn write_csv(path: &Path, samples: &[ScoredSample]) -> Result<()> {
    std::fs::write(path, to_csv(samples)).map_err(|e| StressError::io(path, e))?;
    tracing::info!("Wrote snapshot of {} samples to {}", samples.len(), path.display());
    Ok(())
}

/// Read a CSV snapshot written by [`write_csv`]
pub fn read_csv(path: &Path) -> Result<Vec<ScoredSample>> {
    let content = std::fs::read_to_string(path).map_err(|e| StressError::io(path, e))?;
    parse_csv(&content).map_err(|reason| StressError::format(path, reason))
}

/// Parse snapshot CSV content
pub fn parse_csv(content: &str) -> std::result::Result<Vec<ScoredSample>, String> {
    let mut lines = content.lines().enumerate();

    let header = lines
        .next()
        .map(|(_, line)| line)
        .ok_or_else(|| "empty snapshot".to_string())?;
    if split_fields(header)? != COLUMNS {
        return Err(format!("unexpected snapshot header '{}'", header));
    }

    lines
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| parse_row(line).map_err(|reason| format!("line {}: {}", idx + 1, reason)))
        .collect()
}

fn parse_row(line: &str) -> std::result::Result<ScoredSample, String> {
    let fields = split_fields(line)?;
    if fields.len() != COLUMNS.len() {
        return Err(format!(
            "expected {} fields, got {}",
            COLUMNS.len(),
            fields.len()
        ));
    }

    let sample = Sample {
        node: parse(&fields, 0)?,
        node_name: fields[1].clone(),
        socket: parse(&fields, 2)?,
        memory_channel: parse(&fields, 3)?,
        timestamp_ns: parse(&fields, 4)?,
        write_ratio: parse_number(&fields, 5)?,
        bandwidth_gbs: parse_number(&fields, 6)?,
        latency_ns: parse_number(&fields, 7)?,
        max_bandwidth_gbs: parse_optional(&fields, 8)?,
        min_latency_ns: parse_optional(&fields, 9)?,
        max_latency_ns: parse_optional(&fields, 10)?,
        stress_score: parse_optional(&fields, 11)?,
    };
    let score = ScoreResult {
        curve_read_ratio: parse(&fields, 12)?,
        predicted_latency: parse_optional(&fields, 13)?,
        max_bandwidth: parse_number(&fields, 14)?,
        max_latency: parse_number(&fields, 15)?,
        lead_off_latency: parse_number(&fields, 16)?,
        stress_score: sample.stress_score,
    };
    Ok(ScoredSample { sample, score })
}

fn parse<T: std::str::FromStr>(fields: &[String], idx: usize) -> std::result::Result<T, String> {
    fields[idx]
        .parse()
        .map_err(|_| format!("invalid {} '{}'", COLUMNS[idx], fields[idx]))
}

/// Numeric column; NaN and infinities are rejected
fn parse_number(fields: &[String], idx: usize) -> std::result::Result<f64, String> {
    let value: f64 = parse(fields, idx)?;
    if !value.is_finite() {
        return Err(format!("non-finite {} '{}'", COLUMNS[idx], fields[idx]));
    }
    Ok(value)
}

fn parse_optional(fields: &[String], idx: usize) -> std::result::Result<Option<f64>, String> {
    if fields[idx].is_empty() {
        Ok(None)
    } else {
        parse_number(fields, idx).map(Some)
    }
}

/// Split one CSV line, honoring quoted fields
fn split_fields(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if current.is_empty() => in_quotes = true,
            (',', false) => fields.push(std::mem::take(&mut current)),
            (c, _) => current.push(c),
        }
    }
    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    fields.push(current);
    Ok(fields)
}

/// Complete analysis result in JSON form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonReport {
    pub summary: TraceSummary,
    pub samples: Vec<ScoredSample>,
}

impl JsonReport {
    pub fn new(summary: TraceSummary, samples: Vec<ScoredSample>) -> Self {
        Self { summary, samples }
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
