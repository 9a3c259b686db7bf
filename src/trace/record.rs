//! Event records of the colon-delimited counter trace
//!
//! Each event line has the layout
//!
//! ```text
//! kind:cpu:node:socket:channel:timestamp[:metric_id:raw_value]*
//! ```
//!
//! Metric values are fixed-point integers scaled by `10^precision`. A raw
//! value of exactly `-1` means the metric is absent from the record; other
//! negative values flag irregular measurements and are scaled like any
//! other value.

/// Index of the first metric id field
const METRICS_OFFSET: usize = 6;

/// Raw value marking a metric as absent from a record
const ABSENT: f64 = -1.0;

/// Metrics carried by the trace, in metric-id order (`id % 10 == index + 1`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKey {
    WriteRatio,
    Bandwidth,
    MaxBandwidth,
    Latency,
    MinLatency,
    MaxLatency,
    StressScore,
}

impl MetricKey {
    pub const COUNT: usize = 7;

    pub const ALL: [MetricKey; Self::COUNT] = [
        MetricKey::WriteRatio,
        MetricKey::Bandwidth,
        MetricKey::MaxBandwidth,
        MetricKey::Latency,
        MetricKey::MinLatency,
        MetricKey::MaxLatency,
        MetricKey::StressScore,
    ];

    /// Map a trace metric id to its key via the id's last decimal digit
    pub fn from_metric_id(id: u64) -> Option<Self> {
        match (id % 10) as usize {
            0 => None,
            d => Self::ALL.get(d - 1).copied(),
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            MetricKey::WriteRatio => "wr",
            MetricKey::Bandwidth => "bw",
            MetricKey::MaxBandwidth => "max_bw",
            MetricKey::Latency => "lat",
            MetricKey::MinLatency => "min_lat",
            MetricKey::MaxLatency => "max_lat",
            MetricKey::StressScore => "stress_score",
        }
    }

    /// Last key of interest; metric parsing stops once it is seen
    pub fn is_last(self) -> bool {
        self == MetricKey::StressScore
    }
}

/// Per-record metric slots, `None` when the record does not carry the metric
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricValues([Option<f64>; MetricKey::COUNT]);

impl MetricValues {
    pub fn get(&self, key: MetricKey) -> Option<f64> {
        self.0[key.index()]
    }

    pub fn set(&mut self, key: MetricKey, value: Option<f64>) {
        self.0[key.index()] = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetricKey, Option<f64>)> + '_ {
        MetricKey::ALL.iter().map(move |&key| (key, self.get(key)))
    }

    /// True when any present value is negative
    pub fn has_negative(&self) -> bool {
        self.0.iter().flatten().any(|v| *v < 0.0)
    }
}

/// One parsed event line, before forward fill
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub node: u32,
    pub socket: u32,
    pub memory_channel: u32,
    pub timestamp_ns: u64,
    pub metrics: MetricValues,
}

/// Positional fields of an event line and its unparsed `id:value` pairs
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EventLine<'a> {
    pub node: u32,
    pub socket: u32,
    pub memory_channel: u32,
    pub timestamp_ns: u64,
    pub pairs: Vec<(&'a str, &'a str)>,
}

/// Split an event line into its positional fields and metric pairs
pub(crate) fn split_event(line: &str) -> Result<EventLine<'_>, String> {
    let fields: Vec<&str> = line.trim_end().split(':').collect();
    if fields.len() < METRICS_OFFSET {
        return Err(format!(
            "expected at least {} colon-separated fields, got {}",
            METRICS_OFFSET,
            fields.len()
        ));
    }
    if (fields.len() - METRICS_OFFSET) % 2 != 0 {
        return Err(format!(
            "metric ids and values must come in pairs, got {} trailing fields",
            fields.len() - METRICS_OFFSET
        ));
    }

    Ok(EventLine {
        node: parse_field(fields[2], "node")?,
        socket: parse_field(fields[3], "socket")?,
        memory_channel: parse_field(fields[4], "memory channel")?,
        timestamp_ns: parse_field(fields[5], "timestamp")?,
        pairs: fields[METRICS_OFFSET..]
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
            .collect(),
    })
}

/// Parse an event line, dividing metric values by `scale`
pub fn parse_record(line: &str, scale: f64) -> Result<RawRecord, String> {
    let event = split_event(line)?;
    let mut record = RawRecord {
        node: event.node,
        socket: event.socket,
        memory_channel: event.memory_channel,
        timestamp_ns: event.timestamp_ns,
        metrics: MetricValues::default(),
    };

    for (id, value) in event.pairs {
        let id: u64 = parse_field(id, "metric id")?;
        let Some(key) = MetricKey::from_metric_id(id) else {
            break;
        };

        let raw: f64 = parse_field(value, "metric value")?;
        if !raw.is_finite() {
            return Err(format!("non-finite metric value '{}'", value.trim()));
        }
        if raw != ABSENT {
            record.metrics.set(key, Some(raw / scale));
        }

        if key.is_last() {
            break;
        }
    }

    Ok(record)
}

pub(crate) fn parse_field<T: std::str::FromStr>(field: &str, name: &str) -> Result<T, String> {
    field
        .trim()
        .parse()
        .map_err(|_| format!("invalid {} '{}'", name, field.trim()))
}
