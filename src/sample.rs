//! Observed per-channel memory samples

use crate::score::ScoreResult;
use serde::{Deserialize, Serialize};

/// Architectural grouping used when thinning sample sets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partitioning {
    /// One partition per (node, socket)
    #[default]
    NodeSocket,
    /// One partition per (node, socket, memory channel)
    NodeSocketChannel,
}

/// Identity of the partition a sample belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey {
    pub node: u32,
    pub socket: u32,
    pub memory_channel: Option<u32>,
}

/// One measurement for a memory channel at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// 1-based application/node id from the trace
    pub node: u32,
    pub node_name: String,
    pub socket: u32,
    pub memory_channel: u32,
    pub timestamp_ns: u64,
    /// Percent of memory traffic that is writes, 0-100
    pub write_ratio: f64,
    pub bandwidth_gbs: f64,
    pub latency_ns: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bandwidth_gbs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_latency_ns: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_latency_ns: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stress_score: Option<f64>,
}

impl Sample {
    pub fn read_ratio(&self) -> f64 {
        100.0 - self.write_ratio
    }

    pub fn partition_key(&self, partitioning: Partitioning) -> PartitionKey {
        PartitionKey {
            node: self.node,
            socket: self.socket,
            memory_channel: match partitioning {
                Partitioning::NodeSocket => None,
                Partitioning::NodeSocketChannel => Some(self.memory_channel),
            },
        }
    }

    /// Timestamp in seconds
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp_ns as f64 / 1e9
    }
}

/// A sample together with its curve evaluation (latencies in ns)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSample {
    #[serde(flatten)]
    pub sample: Sample,
    pub score: ScoreResult,
}

/// Anything the sampler can partition and rank
pub trait Partitioned {
    fn partition_key(&self, partitioning: Partitioning) -> PartitionKey;
    fn stress_score(&self) -> Option<f64>;
}

impl Partitioned for Sample {
    fn partition_key(&self, partitioning: Partitioning) -> PartitionKey {
        Sample::partition_key(self, partitioning)
    }

    fn stress_score(&self) -> Option<f64> {
        self.stress_score
    }
}

impl Partitioned for ScoredSample {
    fn partition_key(&self, partitioning: Partitioning) -> PartitionKey {
        self.sample.partition_key(partitioning)
    }

    fn stress_score(&self) -> Option<f64> {
        self.sample.stress_score
    }
}

#[cfg(test)]
pub(crate) fn test_sample(node: u32, socket: u32, mc: u32, ts: u64, stress: Option<f64>) -> Sample {
    Sample {
        node,
        node_name: format!("node{}", node),
        socket,
        memory_channel: mc,
        timestamp_ns: ts,
        write_ratio: 50.0,
        bandwidth_gbs: 1.5,
        latency_ns: 100.0,
        max_bandwidth_gbs: None,
        min_latency_ns: None,
        max_latency_ns: None,
        stress_score: stress,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_ratio_derived_from_write_ratio() {
        let mut s = test_sample(2, 0, 0, 0, None);
        s.write_ratio = 30.0;
        assert_eq!(s.read_ratio(), 70.0);
    }

    #[test]
    fn test_partition_keys() {
        let s = test_sample(3, 1, 4, 0, None);
        assert_eq!(s.partition_key(Partitioning::NodeSocket).memory_channel, None);
        assert_eq!(
            s.partition_key(Partitioning::NodeSocketChannel).memory_channel,
            Some(4)
        );
    }

    #[test]
    fn test_partitioning_serde_names() {
        let p: Partitioning = serde_json::from_str("\"node_socket_channel\"").unwrap();
        assert_eq!(p, Partitioning::NodeSocketChannel);
    }

    #[test]
    fn test_timestamp_secs() {
        let s = test_sample(2, 0, 0, 2_500_000_000, None);
        assert_eq!(s.timestamp_secs(), 2.5);
    }
}
