//! Trace summaries: system layout, memory profile and stress distribution

use crate::sample::{Partitioning, Sample, ScoredSample};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Sockets and memory channels observed for one node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLayout {
    pub name: String,
    /// Socket id to sorted memory channel ids
    pub sockets: BTreeMap<u32, BTreeSet<u32>>,
}

/// Node → socket → memory channel hierarchy seen in a trace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemLayout {
    /// Keyed by node id, so nodes keep their trace order
    pub nodes: BTreeMap<u32, NodeLayout>,
}

impl SystemLayout {
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a Sample>) -> Self {
        let mut nodes: BTreeMap<u32, NodeLayout> = BTreeMap::new();
        for sample in samples {
            let node = nodes.entry(sample.node).or_insert_with(|| NodeLayout {
                name: sample.node_name.clone(),
                sockets: BTreeMap::new(),
            });
            node.sockets
                .entry(sample.socket)
                .or_default()
                .insert(sample.memory_channel);
        }
        Self { nodes }
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_labels(&self) -> Vec<&str> {
        self.nodes.values().map(|n| n.name.as_str()).collect()
    }

    /// Socket count per node, in node order
    pub fn sockets_per_node(&self) -> Vec<usize> {
        self.nodes.values().map(|n| n.sockets.len()).collect()
    }

    /// Number of partitions the sampler would form
    pub fn num_partitions(&self, partitioning: Partitioning) -> usize {
        self.nodes
            .values()
            .map(|n| match partitioning {
                Partitioning::NodeSocket => n.sockets.len(),
                Partitioning::NodeSocketChannel => n.sockets.values().map(BTreeSet::len).sum(),
            })
            .sum()
    }
}

/// Distribution statistics of stress scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StressDistribution {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
}

impl StressDistribution {
    /// Statistics over the finite scores; `None` when there are none
    pub fn from_scores(scores: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut sorted: Vec<f64> = scores.into_iter().filter(|s| s.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
        Some(Self {
            count: sorted.len(),
            mean,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            p50: percentile(&sorted, 50.0),
            p90: percentile(&sorted, 90.0),
            p99: percentile(&sorted, 99.0),
        })
    }
}

/// Linear interpolation between closest ranks of sorted data
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let index = (pct / 100.0) * (n - 1) as f64;
            let lower = index.floor() as usize;
            let upper = index.ceil() as usize;
            let weight = index - lower as f64;
            sorted[lower] * (1.0 - weight) + sorted[upper] * weight
        }
    }
}

/// Headline facts about an analyzed trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub samples: usize,
    pub duration_secs: f64,
    pub num_nodes: usize,
    pub node_labels: Vec<String>,
    pub sockets_per_node: Vec<usize>,
    /// Smallest observed latency (ns), an estimate of lead-off latency
    pub min_latency_ns: Option<f64>,
    /// Largest observed bandwidth (GB/s)
    pub max_bandwidth_gbs: Option<f64>,
    pub cpu_freq_ghz: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stress: Option<StressDistribution>,
}

impl TraceSummary {
    pub fn from_scored(samples: &[ScoredSample], cpu_freq_ghz: f64) -> Self {
        let layout = SystemLayout::from_samples(samples.iter().map(|s| &s.sample));

        let (first, last) = samples
            .iter()
            .map(|s| s.sample.timestamp_ns)
            .fold((u64::MAX, u64::MIN), |(lo, hi), ts| (lo.min(ts), hi.max(ts)));
        let duration_secs = if samples.is_empty() {
            0.0
        } else {
            (last - first) as f64 / 1e9
        };

        let min_latency_ns = samples
            .iter()
            .map(|s| s.sample.latency_ns)
            .min_by(f64::total_cmp);
        let max_bandwidth_gbs = samples
            .iter()
            .map(|s| s.sample.bandwidth_gbs)
            .max_by(f64::total_cmp);

        Self {
            samples: samples.len(),
            duration_secs,
            num_nodes: layout.num_nodes(),
            node_labels: layout.node_labels().into_iter().map(String::from).collect(),
            sockets_per_node: layout.sockets_per_node(),
            min_latency_ns,
            max_bandwidth_gbs,
            cpu_freq_ghz,
            stress: StressDistribution::from_scores(samples.iter().filter_map(|s| s.sample.stress_score)),
        }
    }

    /// Sockets per node as one number when uniform, else a list
    fn sockets_per_node_label(&self) -> String {
        let first = self.sockets_per_node.first();
        if first.is_some_and(|f| self.sockets_per_node.iter().all(|n| n == f)) {
            first.map(ToString::to_string).unwrap_or_default()
        } else {
            self.sockets_per_node
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        }
    }
}

impl fmt::Display for TraceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Trace ===")?;
        writeln!(f, "  Samples:          {}", self.samples)?;
        writeln!(f, "  Duration:         {:.1} s", self.duration_secs)?;
        writeln!(f, "  Number of nodes:  {}", self.num_nodes)?;
        writeln!(f, "  Node labels:      {}", self.node_labels.join(", "))?;
        writeln!(f, "  Sockets per node: {}", self.sockets_per_node_label())?;
        writeln!(f, "  CPU frequency:    {:.1} GHz", self.cpu_freq_ghz)?;

        writeln!(f, "\n=== Memory profile ===")?;
        match self.min_latency_ns {
            Some(lat) => writeln!(f, "  Lead-off latency:        {:.1} ns", lat)?,
            None => writeln!(f, "  Lead-off latency:        -")?,
        }
        match self.max_bandwidth_gbs {
            Some(bw) => writeln!(f, "  Max. measured bandwidth: {:.1} GB/s", bw)?,
            None => writeln!(f, "  Max. measured bandwidth: -")?,
        }

        writeln!(f, "\n=== Stress score ===")?;
        match &self.stress {
            Some(s) => {
                writeln!(f, "  Scored:       {}", s.count)?;
                writeln!(f, "  Mean:         {:.3}", s.mean)?;
                writeln!(f, "  Min:          {:.3}", s.min)?;
                writeln!(f, "  Max:          {:.3}", s.max)?;
                writeln!(f, "  Median (P50): {:.3}", s.p50)?;
                writeln!(f, "  P90:          {:.3}", s.p90)?;
                writeln!(f, "  P99:          {:.3}", s.p99)?;
            }
            None => writeln!(f, "  No stress scores available.")?,
        }
        Ok(())
    }
}
