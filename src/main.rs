use anyhow::{Context, Result};
use clap::Parser;
use memstress::cli::{Cli, OutputFormat};
use memstress::config::AnalysisConfig;
use memstress::counters::annotate_counters;
use memstress::curve_set::CurveSet;
use memstress::filter::SampleFilter;
use memstress::pipeline::{annotate, AnnotateOptions};
use memstress::sample::ScoredSample;
use memstress::sampler::StressSampler;
use memstress::snapshot::{self, JsonReport};
use memstress::summary::TraceSummary;
use memstress::trace::{row_file_path, AnnotatedTraceWriter, TraceIngestor};
use std::io::Write;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber: warnings by default, everything with --debug
fn init_tracing(debug: bool) {
    let level = if debug {
        tracing::Level::TRACE
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Apply command line overrides on top of the config file
fn load_config(args: &Cli) -> Result<AnalysisConfig> {
    let mut config = AnalysisConfig::load(&args.config)?;

    if args.exclude_original {
        config.exclude_original = true;
    }
    if let Some(max_elements) = args.max_elements {
        if max_elements == 0 {
            anyhow::bail!("Invalid value for --max-elements: 0 (must be >= 1)");
        }
        config.max_elements = max_elements;
    }
    if args.no_warnings {
        config.display_warnings = false;
    }
    Ok(config)
}

fn is_snapshot(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

/// Ingest and score a raw trace, or reload a snapshot
///
/// Also returns the node labels of the samples' node ids, counted from 1;
/// snapshots carry their labels in the samples and return none.
fn scored_samples(
    args: &Cli,
    config: &AnalysisConfig,
    curves: &CurveSet,
) -> Result<(Vec<ScoredSample>, Vec<String>)> {
    if is_snapshot(&args.trace) {
        if args.counters {
            anyhow::bail!("--counters needs a raw counter trace, not a snapshot");
        }
        let samples = snapshot::read_csv(&args.trace)?;
        tracing::info!("Loaded {} samples from snapshot {}", samples.len(), args.trace.display());
        return Ok((samples, Vec::new()));
    }

    let row_file = row_file_path(&args.trace);
    if !row_file.is_file() {
        anyhow::bail!(
            "Row file {} not found. It must sit next to the trace with a .row extension",
            row_file.display()
        );
    }

    let (scored, node_names) = if args.counters {
        let annotation = annotate_counters(&args.trace, &row_file, curves, config)?;
        (annotation.samples, annotation.node_names)
    } else {
        let ingested = TraceIngestor::new(config.ingest_options()).ingest(&args.trace, &row_file)?;
        if ingested.stats.undersampled {
            tracing::info!("Trace was undersampled; results cover a random subset of events");
        }
        let options = AnnotateOptions::from_config(config, args.threads);
        (annotate(ingested.samples, curves, &options)?, ingested.node_names)
    };

    if args.save_snapshot {
        snapshot::write_csv(&snapshot::snapshot_path(&args.trace), &scored)?;
    }
    Ok((scored, node_names))
}

fn render(args: &Cli, summary: TraceSummary, samples: Vec<ScoredSample>) -> Result<String> {
    Ok(match args.format {
        OutputFormat::Text => summary.to_string(),
        OutputFormat::Json => JsonReport::new(summary, samples)
            .to_json()
            .context("Failed to serialize JSON report")?,
        OutputFormat::Csv => snapshot::to_csv(&samples),
    })
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let config = load_config(&args)?;
    let filter = match &args.filter {
        Some(expr) => SampleFilter::from_expr(expr).map_err(anyhow::Error::msg)?,
        None => SampleFilter::all(),
    };

    let curves = CurveSet::load(&args.curves)?
        .with_tolerance(config.ratio_tolerance)
        .with_weights(config.score_weights)
        .with_warnings(config.display_warnings);

    if args.annotate.as_deref() == Some(args.trace.as_path()) {
        anyhow::bail!("--annotate would overwrite the input trace {}", args.trace.display());
    }

    let (scored, node_names) = scored_samples(&args, &config, &curves)?;
    if let Some(path) = &args.annotate {
        AnnotatedTraceWriter::new(config.precision)
            .write(path, &node_names, &scored)
            .with_context(|| format!("Failed to write annotated trace {}", path.display()))?;
    }
    let scored = filter.apply(scored, |s| &s.sample);

    let summary = TraceSummary::from_scored(&scored, config.cpu_freq);
    let sampler = StressSampler::with_budget(config.max_elements).partitioned_by(config.partitioning);
    let samples = sampler.reduce(scored);

    let output = render(&args, summary, samples)?;
    match &args.output {
        Some(path) => std::fs::write(path, output)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => std::io::stdout()
            .write_all(output.as_bytes())
            .context("Failed to write to stdout")?,
    }
    Ok(())
}
