//! Sample selection for focused views
//!
//! Supports filter expressions of comma-separated `key=value` terms:
//! - Exact matches: `node=<name>`, `socket=<n>`, `mc=<n>`
//! - Half-open ranges `lo..hi`: `time` (seconds), `bw` (GB/s), `lat` (ns)
//!
//! Example: `node=node-a,socket=0,time=1.5..3,bw=10..20`

use crate::sample::Sample;
use std::ops::Range;

/// Conjunction of optional constraints on samples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleFilter {
    node_name: Option<String>,
    socket: Option<u32>,
    memory_channel: Option<u32>,
    /// Seconds
    time: Option<Range<f64>>,
    /// GB/s
    bandwidth: Option<Range<f64>>,
    /// ns
    latency: Option<Range<f64>>,
}

impl SampleFilter {
    /// Filter that accepts every sample
    pub fn all() -> Self {
        Self::default()
    }

    pub fn node(mut self, name: impl Into<String>) -> Self {
        self.node_name = Some(name.into());
        self
    }

    pub fn socket(mut self, socket: u32) -> Self {
        self.socket = Some(socket);
        self
    }

    pub fn memory_channel(mut self, channel: u32) -> Self {
        self.memory_channel = Some(channel);
        self
    }

    pub fn time_secs(mut self, range: Range<f64>) -> Self {
        self.time = Some(range);
        self
    }

    pub fn bandwidth(mut self, range: Range<f64>) -> Self {
        self.bandwidth = Some(range);
        self
    }

    pub fn latency(mut self, range: Range<f64>) -> Self {
        self.latency = Some(range);
        self
    }

    /// Parse an expression like `node=node-a,bw=1..3`
    pub fn from_expr(expr: &str) -> Result<Self, String> {
        let mut filter = Self::all();

        for term in expr.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (key, value) = term
                .split_once('=')
                .ok_or_else(|| format!("Invalid filter term '{}'. Expected KEY=VALUE", term))?;
            let value = value.trim();

            filter = match key.trim() {
                "node" => filter.node(value),
                "socket" => filter.socket(parse_index(key, value)?),
                "mc" | "channel" => filter.memory_channel(parse_index(key, value)?),
                "time" => filter.time_secs(parse_range(key, value)?),
                "bw" => filter.bandwidth(parse_range(key, value)?),
                "lat" => filter.latency(parse_range(key, value)?),
                other => {
                    return Err(format!(
                        "Unknown filter key '{}'. Expected node, socket, mc, time, bw or lat",
                        other
                    ))
                }
            };
        }

        Ok(filter)
    }

    /// Whether no constraint is set
    pub fn is_all(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, sample: &Sample) -> bool {
        if let Some(name) = &self.node_name {
            if sample.node_name != *name {
                return false;
            }
        }
        if self.socket.is_some_and(|s| s != sample.socket) {
            return false;
        }
        if self.memory_channel.is_some_and(|mc| mc != sample.memory_channel) {
            return false;
        }

        // Time bounds compare in ns, like the trace itself
        if let Some(time) = &self.time {
            let ts = sample.timestamp_ns as f64;
            if !(time.start * 1e9..time.end * 1e9).contains(&ts) {
                return false;
            }
        }
        if self.bandwidth.as_ref().is_some_and(|r| !r.contains(&sample.bandwidth_gbs)) {
            return false;
        }
        if self.latency.as_ref().is_some_and(|r| !r.contains(&sample.latency_ns)) {
            return false;
        }
        true
    }

    /// Keep matching items, in order
    pub fn apply<T, F>(&self, items: Vec<T>, sample_of: F) -> Vec<T>
    where
        F: Fn(&T) -> &Sample,
    {
        if self.is_all() {
            return items;
        }
        items.into_iter().filter(|item| self.matches(sample_of(item))).collect()
    }
}

fn parse_index(key: &str, value: &str) -> Result<u32, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid {} '{}': expected a non-negative integer", key, value))
}

fn parse_range(key: &str, value: &str) -> Result<Range<f64>, String> {
    let (lo, hi) = value
        .split_once("..")
        .ok_or_else(|| format!("Invalid {} range '{}'. Expected LO..HI", key, value))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<f64>()
            .map_err(|_| format!("Invalid {} bound '{}'", key, s))
    };
    let (lo, hi) = (parse(lo)?, parse(hi)?);
    if lo.is_nan() || hi.is_nan() || lo > hi {
        return Err(format!("Invalid {} range '{}': lower bound exceeds upper", key, value));
    }
    Ok(lo..hi)
}
