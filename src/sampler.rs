//! Stress-preserving undersampling of sample sets
//!
//! Downstream plotting cannot handle millions of points, so oversized sample
//! sets are reduced to a fixed element budget. The budget is split evenly
//! across architectural partitions and each partition keeps an even spread
//! of its stress-score distribution rather than a time-uniform subset.
//!
//! # Algorithm
//!
//! 1. `per_partition = budget / partitions` (at least 1)
//! 2. Partitions smaller than `per_partition` are kept whole
//! 3. Larger partitions are ranked by stress score and every `k`-th ranked
//!    sample is kept, `k = ceil(size / per_partition)`
//! 4. Kept samples are emitted in their original order

use crate::sample::{PartitionKey, Partitioned, Partitioning};
use std::collections::BTreeMap;

/// Default maximum number of samples handed to visualization
pub const DEFAULT_MAX_ELEMENTS: usize = 10_000;

/// Budgeted sampler that keeps the stress distribution of each partition
#[derive(Debug, Clone)]
pub struct StressSampler {
    /// Maximum number of samples to keep
    budget: usize,
    /// How samples are grouped before thinning
    partitioning: Partitioning,
}

impl StressSampler {
    /// Create a sampler with the default budget, partitioned by node and socket
    pub fn new() -> Self {
        StressSampler {
            budget: DEFAULT_MAX_ELEMENTS,
            partitioning: Partitioning::NodeSocket,
        }
    }

    /// Create a sampler with a custom element budget
    pub fn with_budget(budget: usize) -> Self {
        StressSampler {
            budget,
            partitioning: Partitioning::NodeSocket,
        }
    }

    /// Set the partitioning scheme
    pub fn partitioned_by(mut self, partitioning: Partitioning) -> Self {
        self.partitioning = partitioning;
        self
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn partitioning(&self) -> Partitioning {
        self.partitioning
    }

    /// Whether a set of `len` samples exceeds the budget
    pub fn needs_sampling(&self, len: usize) -> bool {
        len > self.budget
    }

    /// Budget share of each partition
    ///
    /// Never below one, so a budget smaller than the number of partitions
    /// still keeps one sample per partition.
    pub fn per_partition_budget(&self, num_partitions: usize) -> usize {
        if num_partitions == 0 {
            return self.budget.max(1);
        }
        (self.budget / num_partitions).max(1)
    }

    /// Indices (ascending) of the samples to keep
    pub fn select<T: Partitioned>(&self, items: &[T]) -> Vec<usize> {
        if !self.needs_sampling(items.len()) {
            return (0..items.len()).collect();
        }

        let mut partitions: BTreeMap<PartitionKey, Vec<usize>> = BTreeMap::new();
        for (idx, item) in items.iter().enumerate() {
            partitions
                .entry(item.partition_key(self.partitioning))
                .or_default()
                .push(idx);
        }

        let per_partition = self.per_partition_budget(partitions.len());
        let mut kept = Vec::with_capacity(self.budget.min(items.len()));

        for (key, mut indices) in partitions {
            if indices.len() < per_partition {
                kept.extend(indices);
                continue;
            }

            // Missing scores rank lowest
            indices.sort_by(|&a, &b| {
                let sa = items[a].stress_score().unwrap_or(f64::NEG_INFINITY);
                let sb = items[b].stress_score().unwrap_or(f64::NEG_INFINITY);
                sa.total_cmp(&sb)
            });
            let k = indices.len().div_ceil(per_partition).max(1);
            tracing::debug!(
                "Partition {:?}: keeping every {}th of {} samples",
                key,
                k,
                indices.len()
            );
            kept.extend(indices.into_iter().step_by(k));
        }

        kept.sort_unstable();
        kept
    }

    /// Keep only the selected samples, preserving their order
    pub fn reduce<T: Partitioned>(&self, items: Vec<T>) -> Vec<T> {
        if !self.needs_sampling(items.len()) {
            return items;
        }

        let keep = self.select(&items);
        let total = items.len();
        let mut wanted = keep.into_iter().peekable();
        let reduced: Vec<T> = items
            .into_iter()
            .enumerate()
            .filter_map(|(idx, item)| {
                if wanted.peek() == Some(&idx) {
                    wanted.next();
                    Some(item)
                } else {
                    None
                }
            })
            .collect();

        tracing::info!(
            "Undersampled {} samples to {} (budget {})",
            total,
            reduced.len(),
            self.budget
        );
        reduced
    }
}

impl Default for StressSampler {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{test_sample, Sample};

    fn partition(node: u32, socket: u32, n: usize, offset: u64) -> Vec<Sample> {
        (0..n)
            .map(|i| test_sample(node, socket, 0, offset + i as u64, Some((n - i) as f64 / n as f64)))
            .collect()
    }

    // Test 1: Default sampler configuration
    #[test]
    fn test_default_sampler() {
        let sampler = StressSampler::new();
        assert_eq!(sampler.budget(), DEFAULT_MAX_ELEMENTS);
        assert_eq!(sampler.partitioning(), Partitioning::NodeSocket);
    }

    // Test 2: Small sets pass through untouched
    #[test]
    fn test_under_budget_keeps_everything() {
        let sampler = StressSampler::with_budget(10);
        let samples = partition(2, 0, 10, 0);
        assert_eq!(sampler.select(&samples), (0..10).collect::<Vec<_>>());
        assert_eq!(sampler.reduce(samples.clone()), samples);
    }

    // Test 3: Per-partition budget uses integer division
    #[test]
    fn test_per_partition_budget() {
        let sampler = StressSampler::with_budget(10);
        assert_eq!(sampler.per_partition_budget(3), 3);
        assert_eq!(sampler.per_partition_budget(20), 1);
        assert_eq!(sampler.per_partition_budget(0), 10);
    }

    // Test 4: Output respects the budget
    #[test]
    fn test_output_within_budget() {
        let sampler = StressSampler::with_budget(20);
        let mut samples = partition(2, 0, 100, 0);
        samples.extend(partition(2, 1, 50, 1000));
        let kept = sampler.select(&samples);
        assert!(kept.len() <= 20);
        assert!(kept.iter().any(|&i| samples[i].socket == 0));
        assert!(kept.iter().any(|&i| samples[i].socket == 1));
    }

    // Test 5: Small partitions survive whole
    #[test]
    fn test_small_partition_preserved() {
        let sampler = StressSampler::with_budget(20);
        let mut samples = partition(2, 0, 100, 0);
        samples.extend(partition(3, 0, 4, 1000));
        let kept = sampler.select(&samples);
        let small: Vec<_> = kept.iter().filter(|&&i| samples[i].node == 3).collect();
        assert_eq!(small.len(), 4);
    }

    // Test 6: Selection spreads over the stress range
    #[test]
    fn test_spread_over_stress_range() {
        let sampler = StressSampler::with_budget(10);
        let samples = partition(2, 0, 100, 0);
        let kept = sampler.select(&samples);
        assert_eq!(kept.len(), 10);
        let scores: Vec<f64> = kept.iter().map(|&i| samples[i].stress_score.unwrap()).collect();
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!(min <= 0.02);
        assert!(max >= 0.9);
    }

    // Test 7: Emission order is original order
    #[test]
    fn test_original_order_preserved() {
        let sampler = StressSampler::with_budget(10);
        let samples = partition(2, 0, 100, 0);
        let reduced = sampler.reduce(samples);
        assert!(reduced.windows(2).all(|w| w[0].timestamp_ns < w[1].timestamp_ns));
    }

    // Test 8: Channel partitioning splits sockets further
    #[test]
    fn test_channel_partitioning() {
        let sampler = StressSampler::with_budget(4).partitioned_by(Partitioning::NodeSocketChannel);
        let samples: Vec<Sample> = (0..40)
            .map(|i| test_sample(2, 0, (i % 4) as u32, i as u64, Some(i as f64)))
            .collect();
        let kept = sampler.select(&samples);
        let mut channels: Vec<u32> = kept.iter().map(|&i| samples[i].memory_channel).collect();
        channels.sort_unstable();
        channels.dedup();
        assert_eq!(channels, vec![0, 1, 2, 3]);
    }

    // Test 9: Missing scores do not panic and still count
    #[test]
    fn test_missing_scores() {
        let sampler = StressSampler::with_budget(5);
        let samples: Vec<Sample> = (0..50).map(|i| test_sample(2, 0, 0, i, None)).collect();
        let kept = sampler.select(&samples);
        assert_eq!(kept.len(), 5);
    }

    // Test 10: Budget below partition count keeps one per partition
    #[test]
    fn test_tiny_budget() {
        let sampler = StressSampler::with_budget(1);
        let mut samples = partition(2, 0, 3, 0);
        samples.extend(partition(3, 0, 3, 100));
        let kept = sampler.select(&samples);
        assert_eq!(kept.len(), 2);
    }
}
