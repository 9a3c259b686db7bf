// Raw counter trace ingestion and output
//
// Parses the colon-delimited per-channel counter trace and its `.row`
// companion file into validated samples. Omitted metrics are forward-filled
// in a single streaming pass so arbitrarily large traces never need to be
// materialized as a table before filling. Scored samples are written back
// in the same format.

mod fill;
mod ingest;
mod record;
mod row_file;
mod writer;

pub use fill::ForwardFill;
pub use ingest::{
    IngestOptions, IngestStats, IngestedTrace, SampleStream, TraceIngestor,
    DEFAULT_UNDERSAMPLE_THRESHOLD_MB,
};
pub use record::{parse_record, MetricKey, MetricValues, RawRecord};
pub use row_file::{parse_level, parse_node_names, read_node_names, row_file_path};
pub use writer::{
    annotated_sample, metric_event_id, row_file_content, AnnotatedTraceWriter, METRIC_EVENT_BASE,
};

pub(crate) use ingest::ORIGINAL_NODE;
pub(crate) use record::{parse_field, split_event};
pub(crate) use row_file::{APPL_LEVEL, NODE_LEVEL};
