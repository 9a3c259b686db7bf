//! Trace ingestion: raw counter trace to validated samples
//!
//! Ingestion is a single streaming pass. Lines are parsed into records,
//! forward-filled against earlier records, validated and emitted as
//! [`Sample`]s in file order. Structural problems abort ingestion; invalid
//! measurements only drop the affected row.
//!
//! Traces larger than the undersampling threshold are thinned before
//! parsing by selecting a random subset of line indices. Skipped lines never
//! become records, so they take no part in forward fill.

use super::fill::ForwardFill;
use super::record::{parse_record, MetricKey, RawRecord};
use super::row_file::read_node_names;
use crate::error::{Result, StressError};
use crate::sample::Sample;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Trace size (MiB) above which lines are undersampled
pub const DEFAULT_UNDERSAMPLE_THRESHOLD_MB: f64 = 100.0;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const PROGRESS_INTERVAL: u64 = 100_000;

/// Node id of the original (unprocessed) trace application
pub(crate) const ORIGINAL_NODE: u32 = 1;

/// Options controlling trace ingestion
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Decimal digits the fixed-point metric values are scaled by
    pub precision: u32,
    /// Drop records of node 1 (the original trace values)
    pub exclude_original: bool,
    /// `None` disables undersampling
    pub undersample_threshold_mb: Option<f64>,
    /// Seed for line selection when undersampling
    pub seed: Option<u64>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            precision: 0,
            exclude_original: false,
            undersample_threshold_mb: Some(DEFAULT_UNDERSAMPLE_THRESHOLD_MB),
            seed: None,
        }
    }
}

impl IngestOptions {
    pub fn new(precision: u32) -> Self {
        Self {
            precision,
            ..Self::default()
        }
    }

    fn scale(&self) -> f64 {
        10f64.powi(self.precision as i32)
    }
}

/// Counters describing what happened to each trace line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Physical lines read
    pub lines_read: u64,
    /// Header, comment, communicator and blank lines
    pub lines_skipped: u64,
    /// Lines not selected by undersampling
    pub lines_unsampled: u64,
    /// Event records parsed and forward-filled
    pub records: u64,
    /// Records dropped because they belong to the original trace
    pub excluded: u64,
    /// Rows dropped for a negative (irregular) value after fill
    pub irregular: u64,
    /// Rows dropped because a core metric never appeared
    pub incomplete: u64,
    /// Rows dropped with zero bandwidth and zero latency
    pub idle: u64,
    /// Samples emitted
    pub emitted: u64,
    /// Whether undersampling was applied
    pub undersampled: bool,
}

/// Result of ingesting a whole trace
#[derive(Debug, Clone)]
pub struct IngestedTrace {
    pub samples: Vec<Sample>,
    pub node_names: Vec<String>,
    pub stats: IngestStats,
}

/// Why a filled row did not become a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Irregular,
    Incomplete,
    Idle,
}

/// Turns trace files into samples
#[derive(Debug, Clone, Default)]
pub struct TraceIngestor {
    options: IngestOptions,
}

impl TraceIngestor {
    pub fn new(options: IngestOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Ingest `trace` using node names from `row_file`
    pub fn ingest(&self, trace: &Path, row_file: &Path) -> Result<IngestedTrace> {
        let node_names = read_node_names(row_file)?;
        let selection = self.line_selection(trace)?;

        let file = File::open(trace).map_err(|e| StressError::io(trace, e))?;
        let mut stream = self.stream(BufReader::new(file), trace, node_names.clone(), selection);
        let samples = stream.by_ref().collect::<Result<Vec<_>>>()?;
        let stats = stream.stats().clone();

        tracing::info!(
            "Ingested {} samples from {} ({} records, {} irregular, {} incomplete, {} idle)",
            stats.emitted,
            trace.display(),
            stats.records,
            stats.irregular,
            stats.incomplete,
            stats.idle
        );

        Ok(IngestedTrace {
            samples,
            node_names,
            stats,
        })
    }

    /// Stream samples from any line reader
    ///
    /// `selection` lists the 0-based line indices to keep; `None` keeps all.
    pub fn stream<R: BufRead>(
        &self,
        reader: R,
        path: &Path,
        node_names: Vec<String>,
        selection: Option<Vec<usize>>,
    ) -> SampleStream<R> {
        let selection = selection.map(|mut lines| {
            // Descending so the next wanted index is always at the end
            lines.sort_unstable_by(|a, b| b.cmp(a));
            lines
        });
        let stats = IngestStats {
            undersampled: selection.is_some(),
            ..IngestStats::default()
        };

        SampleStream {
            lines: reader.lines(),
            path: path.to_path_buf(),
            node_names,
            scale: self.options.scale(),
            exclude_original: self.options.exclude_original,
            selection,
            fill: ForwardFill::new(),
            line_no: 0,
            last_timestamps: HashMap::new(),
            stats,
            failed: false,
        }
    }

    /// Random line indices to keep when the trace exceeds the size threshold
    fn line_selection(&self, trace: &Path) -> Result<Option<Vec<usize>>> {
        let Some(threshold_mb) = self.options.undersample_threshold_mb else {
            return Ok(None);
        };

        let size_mb = std::fs::metadata(trace)
            .map_err(|e| StressError::io(trace, e))?
            .len() as f64
            / BYTES_PER_MB;
        if size_mb <= threshold_mb {
            return Ok(None);
        }

        let num_lines = count_lines(trace)?;
        let keep = ((threshold_mb / size_mb) * num_lines as f64) as usize;
        tracing::info!(
            "File size is {:.2} MB, with {} lines. Undersampling to {:.0}% of original file.",
            size_mb,
            num_lines,
            threshold_mb / size_mb * 100.0
        );

        let mut rng = match self.options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let picked = rand::seq::index::sample(&mut rng, num_lines, keep.min(num_lines));
        Ok(Some(picked.into_vec()))
    }
}

fn count_lines(path: &Path) -> Result<usize> {
    let file = File::open(path).map_err(|e| StressError::io(path, e))?;
    let mut count = 0;
    for chunk in BufReader::new(file).split(b'\n') {
        chunk.map_err(|e| StressError::io(path, e))?;
        count += 1;
    }
    Ok(count)
}

/// Iterator of samples over trace lines
///
/// Yields at most one error; iteration ends after it.
pub struct SampleStream<R> {
    lines: std::io::Lines<R>,
    path: PathBuf,
    node_names: Vec<String>,
    scale: f64,
    exclude_original: bool,
    selection: Option<Vec<usize>>,
    fill: ForwardFill,
    line_no: usize,
    last_timestamps: HashMap<u32, u64>,
    stats: IngestStats,
    failed: bool,
}

impl<R> SampleStream<R> {
    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    fn fail(&mut self, err: StressError) -> Option<Result<Sample>> {
        self.failed = true;
        Some(Err(err))
    }

    /// Whether the line at `idx` survives undersampling
    fn selected(&mut self, idx: usize) -> bool {
        match &mut self.selection {
            None => true,
            Some(lines) if lines.last() == Some(&idx) => {
                lines.pop();
                true
            }
            Some(_) => false,
        }
    }

    fn check_timestamp(&mut self, record: &RawRecord) {
        let last = self.last_timestamps.entry(record.node).or_insert(0);
        if record.timestamp_ns < *last {
            tracing::debug!(
                "Timestamp {} of node {} goes back in time (previous {})",
                record.timestamp_ns,
                record.node,
                last
            );
        }
        *last = record.timestamp_ns;
    }
}

impl<R: BufRead> Iterator for SampleStream<R> {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    let err = StressError::io(&self.path, e);
                    return self.fail(err);
                }
            };
            let idx = self.line_no;
            self.line_no += 1;
            self.stats.lines_read += 1;
            if self.stats.lines_read % PROGRESS_INTERVAL == 0 {
                tracing::debug!("Processed {} trace lines", self.stats.lines_read);
            }

            if !self.selected(idx) {
                self.stats.lines_unsampled += 1;
                continue;
            }

            // Header, comments, communicator records
            if idx == 0 || line.starts_with('#') || line.starts_with('c') || line.trim().is_empty() {
                self.stats.lines_skipped += 1;
                continue;
            }

            let mut record = match parse_record(&line, self.scale) {
                Ok(record) => record,
                Err(reason) => {
                    let err = StressError::format(&self.path, format!("line {}: {}", idx + 1, reason));
                    return self.fail(err);
                }
            };

            if self.exclude_original && record.node == ORIGINAL_NODE {
                self.stats.excluded += 1;
                continue;
            }

            let Some(node_name) = (record.node as usize)
                .checked_sub(1)
                .and_then(|i| self.node_names.get(i))
                .cloned()
            else {
                let err = StressError::format(
                    &self.path,
                    format!(
                        "line {}: node id {} has no entry in the row file ({} nodes listed)",
                        idx + 1,
                        record.node,
                        self.node_names.len()
                    ),
                );
                return self.fail(err);
            };

            self.stats.records += 1;
            self.check_timestamp(&record);
            self.fill.apply(&mut record.metrics);

            match into_sample(record, node_name) {
                Ok(sample) => {
                    self.stats.emitted += 1;
                    return Some(Ok(sample));
                }
                Err(Rejection::Irregular) => self.stats.irregular += 1,
                Err(Rejection::Incomplete) => self.stats.incomplete += 1,
                Err(Rejection::Idle) => self.stats.idle += 1,
            }
        }
    }
}

/// Validate a filled record and build the sample
fn into_sample(record: RawRecord, node_name: String) -> std::result::Result<Sample, Rejection> {
    let m = &record.metrics;
    if m.has_negative() {
        return Err(Rejection::Irregular);
    }

    let (Some(write_ratio), Some(bandwidth_gbs), Some(latency_ns)) = (
        m.get(MetricKey::WriteRatio),
        m.get(MetricKey::Bandwidth),
        m.get(MetricKey::Latency),
    ) else {
        return Err(Rejection::Incomplete);
    };

    if bandwidth_gbs == 0.0 && latency_ns == 0.0 {
        return Err(Rejection::Idle);
    }

    Ok(Sample {
        node: record.node,
        node_name,
        socket: record.socket,
        memory_channel: record.memory_channel,
        timestamp_ns: record.timestamp_ns,
        write_ratio,
        bandwidth_gbs,
        latency_ns,
        max_bandwidth_gbs: m.get(MetricKey::MaxBandwidth),
        min_latency_ns: m.get(MetricKey::MinLatency),
        max_latency_ns: m.get(MetricKey::MaxLatency),
        stress_score: m.get(MetricKey::StressScore),
    })
}
