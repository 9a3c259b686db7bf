//! Curve evaluation of ingested samples
//!
//! Every sample is scored against the curve of its read ratio. Scoring is
//! read-only over the [`CurveSet`], so large sample sets are split into
//! contiguous chunks scored on scoped worker threads and reassembled in
//! input order.

use crate::config::AnalysisConfig;
use crate::curve_set::CurveSet;
use crate::error::Result;
use crate::sample::{Sample, ScoredSample};

/// Below this many samples per worker, threading is not worth it
const MIN_CHUNK: usize = 4096;

/// Options for [`annotate`]
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotateOptions {
    /// CPU clock in GHz
    pub cpu_freq: f64,
    /// Scale per-channel bandwidth to the socket before lookup
    pub group_by_mc: bool,
    pub mcs_per_socket: u32,
    /// Worker threads; 0 uses the available parallelism
    pub threads: usize,
}

impl AnnotateOptions {
    pub fn new(cpu_freq: f64) -> Self {
        Self {
            cpu_freq,
            group_by_mc: false,
            mcs_per_socket: 1,
            threads: 1,
        }
    }

    pub fn from_config(config: &AnalysisConfig, threads: usize) -> Self {
        Self {
            cpu_freq: config.cpu_freq,
            group_by_mc: config.group_by_mc,
            mcs_per_socket: config.mcs_per_socket,
            threads,
        }
    }

    fn worker_count(&self, len: usize) -> usize {
        let requested = match self.threads {
            0 => std::thread::available_parallelism().map_or(1, |n| n.get()),
            n => n,
        };
        requested.min(len.div_ceil(MIN_CHUNK)).max(1)
    }
}

/// Score one sample
///
/// Errors scoped to the sample (ratio out of range, negative measurement)
/// are logged and yield `Ok(None)`; anything else is propagated.
pub fn score_sample(sample: Sample, curves: &CurveSet, options: &AnnotateOptions) -> Result<Option<ScoredSample>> {
    let bandwidth = if options.group_by_mc {
        sample.bandwidth_gbs * f64::from(options.mcs_per_socket.max(1))
    } else {
        sample.bandwidth_gbs
    };
    let observed_cycles = sample.latency_ns * options.cpu_freq;

    match curves.evaluate(sample.read_ratio(), bandwidth, observed_cycles) {
        Ok(result) => {
            let mut sample = sample;
            sample.stress_score = result.stress_score;
            Ok(Some(ScoredSample {
                sample,
                score: result.in_nanoseconds(options.cpu_freq),
            }))
        }
        Err(e) if e.is_per_sample() => {
            tracing::warn!(
                "Skipping sample of node {} at {} ns: {}",
                sample.node_name,
                sample.timestamp_ns,
                e
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn score_chunk(chunk: Vec<Sample>, curves: &CurveSet, options: &AnnotateOptions) -> Result<Vec<ScoredSample>> {
    let mut out = Vec::with_capacity(chunk.len());
    for sample in chunk {
        if let Some(scored) = score_sample(sample, curves, options)? {
            out.push(scored);
        }
    }
    Ok(out)
}

/// Score all samples, preserving their order
///
/// Samples whose write ratio is out of range are logged and skipped.
pub fn annotate(samples: Vec<Sample>, curves: &CurveSet, options: &AnnotateOptions) -> Result<Vec<ScoredSample>> {
    let total = samples.len();
    let workers = options.worker_count(total);

    let scored: Vec<ScoredSample> = if workers <= 1 {
        score_chunk(samples, curves, options)?
    } else {
        let chunk_size = total.div_ceil(workers);
        let mut chunks: Vec<Vec<Sample>> = Vec::with_capacity(workers);
        let mut rest = samples;
        while rest.len() > chunk_size {
            let tail = rest.split_off(chunk_size);
            chunks.push(rest);
            rest = tail;
        }
        chunks.push(rest);

        tracing::debug!("Scoring {} samples on {} threads", total, chunks.len());
        let result = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = chunks
                .into_iter()
                .map(|chunk| {
                    scope.spawn(move |_| score_chunk(chunk, curves, options))
                })
                .collect();

            let mut out = Vec::with_capacity(total);
            for handle in handles {
                match handle.join() {
                    Ok(part) => out.extend(part?),
                    Err(payload) => std::panic::resume_unwind(payload),
                }
            }
            Ok(out)
        });
        match result {
            Ok(out) => out?,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    };

    if scored.len() < total {
        tracing::warn!("Skipped {} of {} samples", total - scored.len(), total);
    }
    Ok(scored)
}
