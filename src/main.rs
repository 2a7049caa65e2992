//! Segmill CLI
//!
//! Benchmark driver for the segment build pipeline:
//! - Ingest generated rows (add, persist or merge runs)
//! - Run filtered-count queries over the mutable index or a persisted segment
//! - Print a default configuration file

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use segmill::aggregation::{AggregatorDef, AggregatorKind};
use segmill::config::{generate_default_config, Config, LoggingConfig};
use segmill::datagen::{benchmark_filter, RowGenerator, SchemaInfo};
use segmill::index::{IncrementalIndex, IndexSchema};
use segmill::pipeline::{BenchSummary, Pipeline, RunMode, RunReport, Toolbox};
use segmill::query::{
    parse_filter, QueryOutput, QueryRunner, QuerySource, TimeseriesQuery, VectorizeMode,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "segmill")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Segment build pipeline benchmarks")]
#[command(long_about = "Segmill ingests generated rows into a rollup index, persists it to immutable segments,\nmerges them, and measures filtered-count queries over both forms.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: searched in the usual locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run ingestion benchmarks
    Ingest {
        /// Run mode (add, persist, merge); overrides the config
        #[arg(short, long)]
        mode: Option<String>,
        /// Print one JSON report per run
        #[arg(long)]
        json: bool,
    },

    /// Run filtered-count query benchmarks
    Query {
        /// What to query (index, segment)
        #[arg(short, long, default_value = "segment")]
        target: String,
        /// Filter expression; overrides the config
        #[arg(short, long)]
        filter: Option<String>,
        /// Vectorize mode (false, true, force); overrides the config
        #[arg(short, long)]
        vectorize: Option<String>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a default configuration file
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config = cli.command {
        print!("{}", generate_default_config());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load_default(),
    };
    init_logging(&config.logging);

    tracing::info!("Segmill v{}", env!("CARGO_PKG_VERSION"));

    let toolbox = Toolbox::new(config.storage.index_spec())
        .install()
        .context("installing segment toolbox")?;

    match cli.command {
        Commands::Ingest { mode, json } => {
            let mode = match mode {
                Some(m) => RunMode::from_str(&m)
                    .with_context(|| format!("unknown run mode '{}'", m))?,
                None => config.pipeline.mode,
            };
            ingest(&config, toolbox, mode, json).await
        }
        Commands::Query {
            target,
            filter,
            vectorize,
            json,
        } => {
            let vectorize = match vectorize {
                Some(v) => VectorizeMode::from_str(&v)
                    .with_context(|| format!("unknown vectorize mode '{}'", v))?,
                None => config.query.vectorize,
            };
            let filter = filter.or_else(|| config.query.filter.clone());
            let config = config.clone();
            tokio::task::spawn_blocking(move || {
                query(&config, toolbox, &target, filter.as_deref(), vectorize, json)
            })
            .await?
        }
        Commands::Config => Ok(()),
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("segmill={}", logging.level)),
    );

    if logging.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Warm up, then run the configured iterations on the blocking pool
async fn ingest(
    config: &Config,
    toolbox: &'static Toolbox,
    mode: RunMode,
    json: bool,
) -> anyhow::Result<()> {
    let pipeline_config = config.pipeline.clone();
    pipeline_config.validate()?;
    if SchemaInfo::by_name(&pipeline_config.schema).is_none() {
        bail!("unknown schema '{}'", pipeline_config.schema);
    }

    tracing::info!(
        "Ingesting {} rows per run ({} mode, persist at {} facts, rollup {})",
        pipeline_config.rows_per_run,
        mode,
        pipeline_config.max_rows_before_persist,
        pipeline_config.rollup
    );

    let semaphore = Arc::new(Semaphore::new(config.bench.concurrency.max(1)));
    let total = config.bench.warmup_iterations + config.bench.iterations;
    let mut handles = Vec::with_capacity(total);

    for iteration in 0..total {
        let permit = semaphore.clone().acquire_owned().await?;
        let pipeline_config = pipeline_config.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let report = run_once(pipeline_config, toolbox, mode)?;
            Ok::<_, anyhow::Error>((iteration, report))
        }));
    }

    let mut reports = Vec::with_capacity(config.bench.iterations);
    for handle in handles {
        let (iteration, report) = handle.await??;
        if iteration < config.bench.warmup_iterations {
            tracing::debug!("Warmup run {} done", iteration);
            continue;
        }
        if json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!("{}", report);
        }
        reports.push(report);
    }

    if let Some(summary) = BenchSummary::from_reports(&reports) {
        if json {
            println!("{}", serde_json::to_string(&summary)?);
        } else {
            println!("{}", summary);
        }
    }
    Ok(())
}

fn run_once(
    config: segmill::config::PipelineConfig,
    toolbox: &'static Toolbox,
    mode: RunMode,
) -> anyhow::Result<RunReport> {
    let info = SchemaInfo::by_name(&config.schema)
        .with_context(|| format!("unknown schema '{}'", config.schema))?;
    let rows = RowGenerator::new(info, config.seed)
        .with_rollup_opportunity(config.rollup_opportunity)
        .take(config.rows_per_run);

    let pipeline = Pipeline::for_schema(config, toolbox)?;
    Ok(pipeline.run(rows, mode)?)
}

/// Load generated rows, optionally persist them, and time the query
fn query(
    config: &Config,
    toolbox: &'static Toolbox,
    target: &str,
    filter: Option<&str>,
    vectorize: VectorizeMode,
    json: bool,
) -> anyhow::Result<()> {
    let info = SchemaInfo::by_name(&config.pipeline.schema)
        .with_context(|| format!("unknown schema '{}'", config.pipeline.schema))?;
    let rows = config.query.rows.max(1);

    let schema = IndexSchema::new(info.dimensions(), info.aggregators.clone())
        .with_rollup(config.pipeline.rollup)
        .with_granularity(config.pipeline.granularity);
    let mut index = IncrementalIndex::new(Arc::new(schema), config.pipeline.index_type, rows)?;

    let started = Instant::now();
    let interval = info.data_interval;
    for row in RowGenerator::spread(info, config.pipeline.seed, interval, rows).take(rows) {
        index.append(&row)?;
    }
    tracing::info!(
        "Loaded {} rows into {} facts in {:?}",
        rows,
        index.size(),
        started.elapsed()
    );

    let filter = match filter {
        Some(expr) => parse_filter(expr).context("parsing filter")?,
        None => benchmark_filter(),
    };
    let query = TimeseriesQuery::builder(interval)
        .aggregator(AggregatorDef::count("rows"))
        .aggregator(AggregatorDef::filtered("filteredCount", filter, AggregatorKind::Count))
        .descending(config.query.descending)
        .vectorize(vectorize)
        .vector_size(config.query.vector_size)
        .build()?;

    match target {
        "index" => time_query(&query, &index, config.bench.iterations, json),
        "segment" => {
            let dir = tempfile::Builder::new()
                .prefix("segmill-query-")
                .tempdir()
                .context("creating segment directory")?;
            let segment = toolbox
                .writer()
                .persist(&index, dir.path(), toolbox.index_spec())?;
            index.close()?;
            tracing::info!(
                "Persisted {} facts in {} blocks ({} bytes)",
                segment.fact_count(),
                segment.blocks().len(),
                segment.size_bytes()
            );

            let result = time_query(&query, &segment, config.bench.iterations, json);
            drop(segment);
            dir.close()?;
            result
        }
        other => bail!("unknown query target '{}' (expected index or segment)", other),
    }
}

fn time_query(
    query: &TimeseriesQuery,
    source: &dyn QuerySource,
    iterations: usize,
    json: bool,
) -> anyhow::Result<()> {
    let runner = QueryRunner::new();
    let mut elapsed = Vec::with_capacity(iterations.max(1));
    let mut last: Option<QueryOutput> = None;

    for _ in 0..iterations.max(1) {
        let started = Instant::now();
        let output = runner.run(query, source)?;
        elapsed.push(started.elapsed());
        last = Some(output);
    }

    let output = last.context("no query iterations ran")?;
    if json {
        println!("{}", serde_json::to_string(&output)?);
    } else {
        for row in &output.rows {
            let values: Vec<String> = output
                .columns
                .iter()
                .map(|c| format!("{}={}", c, row.get(c).unwrap_or(0.0)))
                .collect();
            println!("{} {}", row.timestamp, values.join(" "));
        }
    }

    let total: Duration = elapsed.iter().sum();
    println!(
        "{}: {} runs, mean {:?}, {} facts scanned, vectorized {}",
        source.describe(),
        elapsed.len(),
        total / elapsed.len() as u32,
        output.rows_scanned,
        output.vectorized
    );
    Ok(())
}
