//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and `SEGMILL_*` environment variable overrides.

use crate::index::IndexType;
use crate::pipeline::RunMode;
use crate::query::{VectorizeMode, DEFAULT_VECTOR_SIZE};
use crate::storage::{CompressionType, Granularity, IndexSpec, StorageError, StorageResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub bench: BenchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Ingestion run configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Rows generated per run
    #[serde(default = "default_rows_per_run")]
    pub rows_per_run: usize,

    /// Fact count at which the mutable index is persisted
    #[serde(default = "default_max_rows_before_persist")]
    pub max_rows_before_persist: usize,

    /// Index capacity; defaults to twice `rows_per_run`
    #[serde(default)]
    pub max_row_count: Option<usize>,

    #[serde(default = "default_rollup")]
    pub rollup: bool,

    /// Consecutive generated rows sharing a rollup key
    #[serde(default = "default_rollup_opportunity")]
    pub rollup_opportunity: usize,

    /// Generator schema name
    #[serde(default = "default_schema")]
    pub schema: String,

    #[serde(default)]
    pub index_type: IndexType,

    /// Timestamp truncation applied at ingest
    #[serde(default)]
    pub granularity: Granularity,

    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default)]
    pub mode: RunMode,

    /// Parent of per-run scratch directories; the system temp dir if unset
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

fn default_rows_per_run() -> usize {
    100_000
}

fn default_max_rows_before_persist() -> usize {
    25_000
}

fn default_rollup() -> bool {
    true
}

fn default_rollup_opportunity() -> usize {
    1
}

fn default_schema() -> String {
    "basic".to_string()
}

fn default_seed() -> u64 {
    crate::datagen::DEFAULT_SEED
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rows_per_run: default_rows_per_run(),
            max_rows_before_persist: default_max_rows_before_persist(),
            max_row_count: None,
            rollup: default_rollup(),
            rollup_opportunity: default_rollup_opportunity(),
            schema: default_schema(),
            index_type: IndexType::default(),
            granularity: Granularity::default(),
            seed: default_seed(),
            mode: RunMode::default(),
            scratch_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Capacity of each mutable index
    pub fn effective_max_row_count(&self) -> usize {
        self.max_row_count
            .unwrap_or_else(|| self.rows_per_run.saturating_mul(2))
    }

    /// Reject settings a run cannot honour
    pub fn validate(&self) -> StorageResult<()> {
        if self.rows_per_run == 0 {
            return Err(StorageError::Config("rows_per_run must be positive".into()));
        }
        if self.max_rows_before_persist == 0 {
            return Err(StorageError::Config(
                "max_rows_before_persist must be positive".into(),
            ));
        }
        if self.granularity == Granularity::All {
            return Err(StorageError::Config(
                "granularity 'all' cannot be used at ingest".into(),
            ));
        }
        let capacity = self.effective_max_row_count();
        if self.max_rows_before_persist > capacity {
            return Err(StorageError::Config(format!(
                "max_rows_before_persist ({}) exceeds max_row_count ({})",
                self.max_rows_before_persist, capacity
            )));
        }
        Ok(())
    }
}

/// Filtered-count query configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Rows loaded before querying
    #[serde(default = "default_query_rows")]
    pub rows: usize,

    #[serde(default)]
    pub vectorize: VectorizeMode,

    #[serde(default)]
    pub descending: bool,

    /// Filter expression; the benchmark filter when unset
    #[serde(default)]
    pub filter: Option<String>,

    #[serde(default = "default_vector_size")]
    pub vector_size: usize,
}

fn default_query_rows() -> usize {
    100_000
}

fn default_vector_size() -> usize {
    DEFAULT_VECTOR_SIZE
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            rows: default_query_rows(),
            vectorize: VectorizeMode::default(),
            descending: false,
            filter: None,
            vector_size: default_vector_size(),
        }
    }
}

/// Segment encoding configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub compression: CompressionType,

    /// Facts per block
    #[serde(default = "default_block_rows")]
    pub block_rows: usize,
}

fn default_block_rows() -> usize {
    IndexSpec::default().block_rows
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            compression: CompressionType::default(),
            block_rows: default_block_rows(),
        }
    }
}

impl StorageConfig {
    pub fn index_spec(&self) -> IndexSpec {
        IndexSpec {
            compression: self.compression,
            block_rows: self.block_rows.max(1),
        }
    }
}

/// Benchmark repetition configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BenchConfig {
    #[serde(default = "default_iterations")]
    pub iterations: usize,

    /// Runs executed and discarded before measuring
    #[serde(default = "default_warmup_iterations")]
    pub warmup_iterations: usize,

    /// Runs allowed in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_iterations() -> usize {
    5
}

fn default_warmup_iterations() -> usize {
    1
}

fn default_concurrency() -> usize {
    1
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            warmup_iterations: default_warmup_iterations(),
            concurrency: default_concurrency(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("segmill").join("config.toml")),
            Some(PathBuf::from("/etc/segmill/config.toml")),
            Some(PathBuf::from("./segmill.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup; unparseable values are ignored
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
            value.and_then(|v| v.trim().parse().ok())
        }

        // Pipeline overrides
        if let Some(rows) = parsed(var("SEGMILL_ROWS_PER_RUN")) {
            self.pipeline.rows_per_run = rows;
        }
        if let Some(rows) = parsed(var("SEGMILL_MAX_ROWS_BEFORE_PERSIST")) {
            self.pipeline.max_rows_before_persist = rows;
        }
        if let Some(rows) = parsed(var("SEGMILL_MAX_ROW_COUNT")) {
            self.pipeline.max_row_count = Some(rows);
        }
        if let Some(rollup) = parsed(var("SEGMILL_ROLLUP")) {
            self.pipeline.rollup = rollup;
        }
        if let Some(k) = parsed(var("SEGMILL_ROLLUP_OPPORTUNITY")) {
            self.pipeline.rollup_opportunity = k;
        }
        if let Some(schema) = var("SEGMILL_SCHEMA") {
            self.pipeline.schema = schema;
        }
        if let Some(index_type) = var("SEGMILL_INDEX_TYPE").and_then(|v| IndexType::from_str(&v)) {
            self.pipeline.index_type = index_type;
        }
        if let Some(granularity) =
            var("SEGMILL_GRANULARITY").and_then(|v| Granularity::from_str(&v))
        {
            self.pipeline.granularity = granularity;
        }
        if let Some(seed) = parsed(var("SEGMILL_SEED")) {
            self.pipeline.seed = seed;
        }
        if let Some(mode) = var("SEGMILL_MODE").and_then(|v| RunMode::from_str(&v)) {
            self.pipeline.mode = mode;
        }
        if let Some(dir) = var("SEGMILL_SCRATCH_DIR") {
            self.pipeline.scratch_dir = Some(PathBuf::from(dir));
        }

        // Query overrides
        if let Some(mode) = var("SEGMILL_VECTORIZE").and_then(|v| VectorizeMode::from_str(&v)) {
            self.query.vectorize = mode;
        }
        if let Some(filter) = var("SEGMILL_FILTER") {
            self.query.filter = Some(filter);
        }

        // Storage overrides
        if let Some(compression) = var("SEGMILL_COMPRESSION") {
            match compression.to_lowercase().as_str() {
                "none" => self.storage.compression = CompressionType::None,
                "lz4" => self.storage.compression = CompressionType::Lz4,
                other => tracing::warn!("Ignoring unknown compression '{}'", other),
            }
        }

        // Bench overrides
        if let Some(iterations) = parsed(var("SEGMILL_ITERATIONS")) {
            self.bench.iterations = iterations;
        }
        if let Some(concurrency) = parsed(var("SEGMILL_CONCURRENCY")) {
            self.bench.concurrency = concurrency;
        }

        // Logging overrides
        if let Some(level) = var("SEGMILL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("SEGMILL_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Segmill Configuration
#
# Environment variables override these settings:
# - SEGMILL_ROWS_PER_RUN, SEGMILL_MAX_ROWS_BEFORE_PERSIST, SEGMILL_MAX_ROW_COUNT
# - SEGMILL_ROLLUP, SEGMILL_ROLLUP_OPPORTUNITY, SEGMILL_SCHEMA
# - SEGMILL_INDEX_TYPE, SEGMILL_GRANULARITY, SEGMILL_SEED, SEGMILL_MODE
# - SEGMILL_SCRATCH_DIR, SEGMILL_VECTORIZE, SEGMILL_FILTER, SEGMILL_COMPRESSION
# - SEGMILL_ITERATIONS, SEGMILL_CONCURRENCY
# - SEGMILL_LOG_LEVEL, SEGMILL_LOG_FORMAT

[pipeline]
# Rows generated per run
rows_per_run = 100000

# Persist the mutable index once it holds this many facts
max_rows_before_persist = 25000

# Mutable index capacity (default: 2 x rows_per_run)
# max_row_count = 200000

# Fold rows sharing a timestamp and dimensions into one fact
rollup = true

# Consecutive generated rows sharing a rollup key
rollup_opportunity = 1

# Generator schema: basic or simple
schema = "basic"

# Mutable index backend: onheap or sorted
index_type = "onheap"

# Ingest timestamp truncation: none, second, minute, hour, day, week, month
granularity = "none"

seed = 9999

# add (ingest only), persist, or merge
mode = "merge"

# Parent directory for per-run scratch space (default: system temp dir)
# scratch_dir = "/tmp"

[query]
# Rows loaded before querying
rows = 100000

# Vectorized execution: false, true, or force
vectorize = "false"

descending = false

# Filter expression (default: the benchmark filter)
# filter = "dimSequential = '-1' OR dimZipf IN ('X')"

vector_size = 512

[storage]
# Block compression: none or lz4
compression = "lz4"

# Facts per block
block_rows = 4096

[bench]
iterations = 5
warmup_iterations = 1

# Runs in flight at once
concurrency = 1

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
