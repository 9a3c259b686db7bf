//! CLI argument parsing for memstress

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for analysis results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary (default)
    Text,
    /// Summary and samples as JSON
    Json,
    /// Scored samples as CSV
    Csv,
}

#[derive(Parser, Debug)]
#[command(name = "memstress")]
#[command(version)]
#[command(about = "Memory stress analysis of per-channel bandwidth/latency traces", long_about = None)]
pub struct Cli {
    /// Paraver trace (.prv) or a CSV snapshot of a previous run (.csv)
    #[arg(value_name = "TRACE")]
    pub trace: PathBuf,

    /// Directory of bwlat_<ratio>.txt curves or a JSON curve bundle
    #[arg(value_name = "CURVES")]
    pub curves: PathBuf,

    /// Analysis configuration (JSON, or TOML with a .toml extension)
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Exclude the original trace's values (node 1)
    #[arg(short = 'x', long = "exclude-original")]
    pub exclude_original: bool,

    /// Maximum number of samples to output (overrides the config)
    #[arg(long = "max-elements", value_name = "N")]
    pub max_elements: Option<usize>,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Write output to FILE instead of stdout
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Save scored samples as a CSV snapshot next to the trace
    #[arg(long = "save-snapshot")]
    pub save_snapshot: bool,

    /// TRACE holds raw CAS counters (events listed in the config's counters section)
    #[arg(long = "counters")]
    pub counters: bool,

    /// Write the scored samples as an annotated trace FILE (plus its .row)
    #[arg(long = "annotate", value_name = "FILE")]
    pub annotate: Option<PathBuf>,

    /// Restrict samples (e.g., --filter node=n1,socket=0,time=1..2,bw=10..20)
    #[arg(long = "filter", value_name = "EXPR")]
    pub filter: Option<String>,

    /// Worker threads for scoring (0 = all available cores)
    #[arg(long = "threads", value_name = "N", default_value = "1")]
    pub threads: usize,

    /// Suppress curve warnings (ratio substitution, overshoot)
    #[arg(long = "no-warnings")]
    pub no_warnings: bool,

    /// Enable debug tracing output to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}
