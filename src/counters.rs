//! Channel bandwidth from CAS counter traces
//!
//! Uncore counter traces report, per memory channel, how many read and write
//! column accesses (CAS) happened since the previous sample of the same
//! counter. Each count becomes an interval ending at its event's timestamp
//! and starting where the previous interval of that kind ended, or where the
//! channel was last consumed.
//!
//! Read and write intervals of a channel are paired front to front. The pair
//! yields read and write bandwidth; the older interval (both on a tie) is
//! consumed and the record takes its end time. Channels are drained in
//! global time order, and only while both of their queues hold an interval,
//! except at the end of the trace where a missing side counts as zero.
//!
//! Counter lines use the event layout of annotated traces with the node id
//! in the third field. Which event ids count reads or writes of which
//! channel comes from the `counters` section of the analysis config.

use crate::config::AnalysisConfig;
use crate::curve_set::CurveSet;
use crate::error::{Result, StressError};
use crate::sample::{Sample, ScoredSample};
use crate::score::{MemoryProperties, ScoreResult};
use crate::trace::{parse_field, parse_level, split_event, APPL_LEVEL, NODE_LEVEL};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Bytes moved per column access
pub const DEFAULT_CACHE_LINE_BYTES: u32 = 64;

/// Row label used for the original application when the row file has none
const DEFAULT_APPLICATION_LABEL: &str = "original";

/// Direction counted by a CAS event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CasKind {
    Read,
    Write,
}

/// A CAS counter event type and the channel it counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasEvent {
    /// Trace event id
    pub id: u64,
    pub socket: u32,
    /// Hardware channel id; channels need not be numbered contiguously
    pub mc: u32,
    pub kind: CasKind,
}

/// Counter trace section of the analysis config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterConfig {
    #[serde(default = "default_cache_line_bytes")]
    pub cache_line_bytes: u32,

    pub events: Vec<CasEvent>,
}

fn default_cache_line_bytes() -> u32 {
    DEFAULT_CACHE_LINE_BYTES
}

impl CounterConfig {
    pub fn new(events: Vec<CasEvent>) -> Self {
        Self {
            cache_line_bytes: DEFAULT_CACHE_LINE_BYTES,
            events,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.cache_line_bytes == 0 {
            return Err("counters.cache_line_bytes must be >= 1".to_string());
        }
        if self.events.is_empty() {
            return Err("counters.events must list at least one CAS event".to_string());
        }

        let mut ids = HashSet::new();
        let mut kinds: BTreeMap<(u32, u32), HashSet<CasKind>> = BTreeMap::new();
        for event in &self.events {
            if !ids.insert(event.id) {
                return Err(format!("counters.events lists event id {} twice", event.id));
            }
            if !kinds.entry((event.socket, event.mc)).or_default().insert(event.kind) {
                return Err(format!(
                    "counters.events has two {:?} events for socket {} channel {}",
                    event.kind, event.socket, event.mc
                ));
            }
        }

        for ((socket, mc), seen) in &kinds {
            if seen.len() != 2 {
                return Err(format!(
                    "socket {} channel {} needs both a read and a write event",
                    socket, mc
                ));
            }
        }
        Ok(())
    }
}

/// Accesses counted over `(t0_ns, t1_ns]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CasInterval {
    pub t0_ns: u64,
    pub t1_ns: u64,
    pub count: u64,
}

impl CasInterval {
    /// Bandwidth in GB/s over the interval
    ///
    /// A zero-length interval at time 0 is a counter's first sample and has
    /// no rate: `Ok(None)`. Other zero-length intervals with accesses, and
    /// intervals ending before they start, are errors.
    pub fn bandwidth_gbs(&self, cache_line_bytes: u32) -> std::result::Result<Option<f64>, String> {
        if self.t0_ns > self.t1_ns {
            return Err(format!(
                "interval ends before it starts ({} ns > {} ns)",
                self.t0_ns, self.t1_ns
            ));
        }
        if self.count == 0 {
            return Ok(Some(0.0));
        }
        if self.t0_ns == self.t1_ns {
            if self.t0_ns == 0 {
                return Ok(None);
            }
            return Err(format!(
                "zero-length interval at {} ns with {} accesses",
                self.t1_ns, self.count
            ));
        }

        // Bytes per nanosecond is GB/s
        let bytes = f64::from(cache_line_bytes) * self.count as f64;
        Ok(Some(bytes / (self.t1_ns - self.t0_ns) as f64))
    }
}

/// Read and write intervals consumed together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IntervalPair {
    read: Option<CasInterval>,
    write: Option<CasInterval>,
    timestamp_ns: u64,
}

/// Pending intervals of one channel
#[derive(Debug, Default)]
struct ChannelQueues {
    reads: VecDeque<CasInterval>,
    writes: VecDeque<CasInterval>,
    last_popped_ns: Option<u64>,
}

impl ChannelQueues {
    fn push(&mut self, kind: CasKind, t1_ns: u64, count: u64) {
        let last_popped = self.last_popped_ns;
        let queue = match kind {
            CasKind::Read => &mut self.reads,
            CasKind::Write => &mut self.writes,
        };
        let t0_ns = queue.back().map(|i| i.t1_ns).or(last_popped).unwrap_or(0);
        queue.push_back(CasInterval { t0_ns, t1_ns, count });
    }

    fn is_paired(&self) -> bool {
        !self.reads.is_empty() && !self.writes.is_empty()
    }

    /// End time of the oldest pending interval
    fn oldest_ns(&self) -> Option<u64> {
        let read = self.reads.front().map(|i| i.t1_ns);
        let write = self.writes.front().map(|i| i.t1_ns);
        match (read, write) {
            (Some(r), Some(w)) => Some(r.min(w)),
            (r, w) => r.or(w),
        }
    }

    /// Consume the oldest interval, or both fronts when they end together
    fn pop_pair(&mut self) -> Option<IntervalPair> {
        let read = self.reads.front().copied();
        let write = self.writes.front().copied();
        let timestamp_ns = match (read, write) {
            (Some(r), Some(w)) => {
                if r.t1_ns <= w.t1_ns {
                    self.reads.pop_front();
                }
                if w.t1_ns <= r.t1_ns {
                    self.writes.pop_front();
                }
                r.t1_ns.min(w.t1_ns)
            }
            (Some(r), None) => {
                self.reads.pop_front();
                r.t1_ns
            }
            (None, Some(w)) => {
                self.writes.pop_front();
                w.t1_ns
            }
            (None, None) => return None,
        };

        self.last_popped_ns = Some(timestamp_ns);
        Some(IntervalPair {
            read,
            write,
            timestamp_ns,
        })
    }
}

/// Node, socket and hardware channel of a counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct ChannelKey {
    node: u32,
    socket: u32,
    mc: u32,
}

/// Options for [`CounterAnnotator`]
#[derive(Debug, Clone, PartialEq)]
pub struct CounterOptions {
    /// CPU clock in GHz
    pub cpu_freq: f64,
    /// Scale channel bandwidth by the socket's channel count before lookup
    pub group_by_mc: bool,
    pub cache_line_bytes: u32,
    pub display_warnings: bool,
}

impl CounterOptions {
    pub fn from_config(config: &AnalysisConfig, counters: &CounterConfig) -> Self {
        Self {
            cpu_freq: config.cpu_freq,
            group_by_mc: config.group_by_mc,
            cache_line_bytes: counters.cache_line_bytes,
            display_warnings: config.display_warnings,
        }
    }
}

/// What happened to the counter events of a trace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterStats {
    pub lines_read: u64,
    /// CAS events queued
    pub events: u64,
    /// Interval pairs consumed
    pub intervals: u64,
    /// First intervals of a counter, which carry no rate
    pub ignored: u64,
    /// Intervals without any access
    pub idle: u64,
    /// Intervals whose ratio or bandwidth could not be scored
    pub skipped: u64,
    pub emitted: u64,
}

/// Annotated samples of a counter trace
#[derive(Debug, Clone)]
pub struct CounterAnnotation {
    pub samples: Vec<ScoredSample>,
    /// Labels of output node ids from 1; id 1 is the original application
    pub node_names: Vec<String>,
    pub stats: CounterStats,
}

/// Turns CAS counts into scored per-channel samples
///
/// Output node ids are the counter trace's node ids plus one, so id 1
/// stays reserved for the original application. Output channel ids are
/// the channel's position among its socket's sorted hardware ids.
pub struct CounterAnnotator<'a> {
    curves: &'a CurveSet,
    options: CounterOptions,
    events: HashMap<u64, CasEvent>,
    /// Socket to its sorted hardware channel ids
    channels: BTreeMap<u32, Vec<u32>>,
    node_names: Vec<String>,
    queues: BTreeMap<ChannelKey, ChannelQueues>,
    samples: Vec<ScoredSample>,
    stats: CounterStats,
}

impl<'a> CounterAnnotator<'a> {
    /// `node_names` labels counter trace node ids from 1
    pub fn new(curves: &'a CurveSet, options: CounterOptions, events: &[CasEvent], node_names: Vec<String>) -> Self {
        let mut channels: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for event in events.iter().filter(|e| e.kind == CasKind::Read) {
            channels.entry(event.socket).or_default().push(event.mc);
        }
        for ids in channels.values_mut() {
            ids.sort_unstable();
            ids.dedup();
        }

        Self {
            curves,
            options,
            events: events.iter().map(|e| (e.id, *e)).collect(),
            channels,
            node_names,
            queues: BTreeMap::new(),
            samples: Vec::new(),
            stats: CounterStats::default(),
        }
    }

    pub fn is_cas_event(&self, id: u64) -> bool {
        self.events.contains_key(&id)
    }

    pub fn stats(&self) -> &CounterStats {
        &self.stats
    }

    /// Queue a counter sample and score every interval it completes
    ///
    /// Ids that are not CAS events are ignored.
    pub fn push(&mut self, node: u32, event_id: u64, timestamp_ns: u64, count: u64) -> std::result::Result<(), String> {
        let Some(event) = self.events.get(&event_id).copied() else {
            return Ok(());
        };
        if node == 0 || node as usize > self.node_names.len() {
            return Err(format!(
                "node id {} has no entry in the row file ({} nodes listed)",
                node,
                self.node_names.len()
            ));
        }

        self.stats.events += 1;
        let key = ChannelKey {
            node,
            socket: event.socket,
            mc: event.mc,
        };
        self.queues.entry(key).or_default().push(event.kind, timestamp_ns, count);
        self.drain(false)
    }

    /// Score the remaining intervals and return the samples in time order
    pub fn finish(mut self) -> std::result::Result<(Vec<ScoredSample>, CounterStats), String> {
        self.drain(true)?;
        Ok((self.samples, self.stats))
    }

    fn drain(&mut self, allow_unpaired: bool) -> std::result::Result<(), String> {
        loop {
            let Some(key) = self
                .queues
                .iter()
                .filter_map(|(key, q)| q.oldest_ns().map(|t| (*key, t)))
                .min_by_key(|(_, t)| *t)
                .map(|(key, _)| key)
            else {
                return Ok(());
            };

            let pair = match self.queues.get_mut(&key) {
                Some(q) if allow_unpaired || q.is_paired() => q.pop_pair(),
                _ => None,
            };
            let Some(pair) = pair else {
                return Ok(());
            };
            self.score_interval(key, pair)?;
        }
    }

    fn score_interval(&mut self, key: ChannelKey, pair: IntervalPair) -> std::result::Result<(), String> {
        self.stats.intervals += 1;
        let line_bytes = self.options.cache_line_bytes;
        let read = pair.read.map(|i| i.bandwidth_gbs(line_bytes)).transpose()?;
        let write = pair.write.map(|i| i.bandwidth_gbs(line_bytes)).transpose()?;

        let (Some(read_bw), Some(write_bw)) = (read.unwrap_or(Some(0.0)), write.unwrap_or(Some(0.0))) else {
            self.stats.ignored += 1;
            if self.options.display_warnings {
                tracing::warn!(
                    "Ignoring the first interval of node {} socket {} channel {}: it has zero length",
                    key.node,
                    key.socket,
                    key.mc
                );
            }
            return Ok(());
        };

        let bandwidth = read_bw + write_bw;
        if bandwidth == 0.0 {
            self.stats.idle += 1;
            return Ok(());
        }
        let write_ratio = 100.0 * (write_bw / bandwidth);

        let socket_channels = self.channels.get(&key.socket).map_or(&[][..], Vec::as_slice);
        let channel_index = socket_channels.iter().position(|&mc| mc == key.mc).unwrap_or(0);
        let props = match MemoryProperties::compute(
            self.curves,
            self.options.cpu_freq,
            write_ratio,
            bandwidth,
            self.options.group_by_mc,
            socket_channels.len().max(1) as u32,
        ) {
            Ok(props) => props,
            Err(e) if e.is_per_sample() => {
                tracing::warn!(
                    "Skipping interval of node {} socket {} channel {} at {} ns: {}",
                    key.node,
                    key.socket,
                    key.mc,
                    pair.timestamp_ns,
                    e
                );
                self.stats.skipped += 1;
                return Ok(());
            }
            Err(e) => return Err(e.to_string()),
        };

        let node_name = self.node_names[key.node as usize - 1].clone();
        self.samples.push(ScoredSample {
            sample: Sample {
                node: key.node + 1,
                node_name,
                socket: key.socket,
                memory_channel: channel_index as u32,
                timestamp_ns: pair.timestamp_ns,
                write_ratio,
                bandwidth_gbs: props.bandwidth,
                latency_ns: props.latency.unwrap_or(props.lead_off_latency),
                max_bandwidth_gbs: Some(props.max_bandwidth),
                min_latency_ns: Some(props.lead_off_latency),
                max_latency_ns: Some(props.max_latency),
                stress_score: Some(props.stress_score),
            },
            score: ScoreResult {
                curve_read_ratio: props.curve_read_ratio,
                predicted_latency: props.latency,
                max_bandwidth: props.max_bandwidth,
                max_latency: props.max_latency,
                lead_off_latency: props.lead_off_latency,
                stress_score: Some(props.stress_score),
            },
        });
        self.stats.emitted += 1;
        Ok(())
    }
}

/// Annotate the CAS counter trace `trace` using node names from `row_file`
///
/// Node names come from the row file's `NODE` section; the label of its
/// first `APPL` entry names the original application.
pub fn annotate_counters(
    trace: &Path,
    row_file: &Path,
    curves: &CurveSet,
    config: &AnalysisConfig,
) -> Result<CounterAnnotation> {
    let counters = config.counters.as_ref().ok_or_else(|| {
        StressError::Config("counter traces need a 'counters' section listing the CAS events".to_string())
    })?;

    let row = std::fs::read_to_string(row_file).map_err(|e| StressError::io(row_file, e))?;
    let nodes = parse_level(&row, NODE_LEVEL).map_err(|reason| StressError::format(row_file, reason))?;
    let application = parse_level(&row, APPL_LEVEL)
        .ok()
        .and_then(|names| names.into_iter().next())
        .unwrap_or_else(|| DEFAULT_APPLICATION_LABEL.to_string());

    let options = CounterOptions::from_config(config, counters);
    let mut annotator = CounterAnnotator::new(curves, options, &counters.events, nodes.clone());

    let file = File::open(trace).map_err(|e| StressError::io(trace, e))?;
    let mut lines_read = 0;
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| StressError::io(trace, e))?;
        lines_read += 1;
        // Header, states, communications and comments carry no counters
        if idx == 0 || !line.starts_with("2:") {
            continue;
        }

        let at_line = |reason: String| StressError::format(trace, format!("line {}: {}", idx + 1, reason));
        let event = split_event(&line).map_err(at_line)?;
        for (id, value) in &event.pairs {
            let id: u64 = parse_field(id, "event id").map_err(at_line)?;
            if !annotator.is_cas_event(id) {
                continue;
            }
            let count: u64 = parse_field(value, "counter value").map_err(at_line)?;
            annotator
                .push(event.node, id, event.timestamp_ns, count)
                .map_err(at_line)?;
        }
    }

    let (samples, mut stats) = annotator
        .finish()
        .map_err(|reason| StressError::format(trace, format!("end of trace: {}", reason)))?;
    stats.lines_read = lines_read;

    tracing::info!(
        "Annotated {} samples from {} ({} CAS events, {} idle, {} ignored, {} skipped)",
        stats.emitted,
        trace.display(),
        stats.events,
        stats.idle,
        stats.ignored,
        stats.skipped
    );

    let mut node_names = vec![application];
    node_names.extend(nodes);
    Ok(CounterAnnotation {
        samples,
        node_names,
        stats,
    })
}
