use crate::fetch::DEFAULT_MAX_FETCH_ROWS;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Default ceiling for the blocking worker pool
pub const DEFAULT_MAX_WORKERS: usize = 32;

/// Database engine to benchmark
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    /// PostgreSQL via a non-blocking driver
    Postgres,
    /// SQLite via a blocking driver
    Sqlite,
}

/// Report rendering
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// qbench - run SQL statements concurrently and time every instance
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Database type
    #[arg(long, env = "QBENCH_DATABASE", value_enum, default_value_t = DatabaseKind::Postgres)]
    pub database: DatabaseKind,

    /// Data source name: a libpq connection string for PostgreSQL, a file path for SQLite
    #[arg(short = 'd', long, env = "QBENCH_DSN")]
    pub dsn: String,

    /// Database user (overrides the DSN)
    #[arg(short = 'u', long, env = "QBENCH_USER")]
    pub user: Option<String>,

    /// Database password (overrides the DSN)
    #[arg(long, env = "QBENCH_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Path to a .sql file, or to a folder of .sql files run in name order
    #[arg(short = 's', long, env = "QBENCH_SQL")]
    pub sql: PathBuf,

    /// Number of concurrent instances of each statement
    #[arg(short = 'n', long, env = "QBENCH_INSTANCES")]
    pub instances: usize,

    /// Rows per fetch: 0 skips rows, -1 fetches everything at once, N fetches in batches of N
    #[arg(
        short = 'f',
        long,
        env = "QBENCH_FETCH_SIZE",
        default_value = "0",
        allow_negative_numbers = true
    )]
    pub fetch_size: i64,

    /// Worker cap for blocking backends
    #[arg(short = 'w', long, env = "QBENCH_WORKERS")]
    pub workers: Option<usize>,

    /// Use exactly --workers threads, ignoring hardware and --max-workers limits
    #[arg(long, requires = "workers")]
    pub override_workers: bool,

    /// Upper bound on the blocking worker pool
    #[arg(long, env = "MAX_THREADS", default_value_t = DEFAULT_MAX_WORKERS)]
    pub max_workers: usize,

    /// Row ceiling when fetching everything at once
    #[arg(long, env = "QBENCH_MAX_FETCH_ROWS", default_value_t = DEFAULT_MAX_FETCH_ROWS)]
    pub max_fetch_rows: u64,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl Config {
    /// Validate configuration
    ///
    /// Fetch size and instance count are checked where they are used, by
    /// `FetchPolicy::resolve` and `task::expand`.
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_dsn(&self.dsn)?;

        if let Some(workers) = self.workers {
            validate_worker_count(workers)?;
        } else if self.override_workers {
            anyhow::bail!("--override-workers requires --workers");
        }

        if self.max_workers == 0 {
            anyhow::bail!("Max workers must be greater than 0");
        }

        if self.max_fetch_rows == 0 {
            anyhow::bail!("Max fetch rows must be greater than 0");
        }

        if self.database == DatabaseKind::Postgres {
            validate_postgres_fetch_count("Fetch size", self.fetch_size)?;
            validate_postgres_fetch_count(
                "Max fetch rows",
                i64::try_from(self.max_fetch_rows).unwrap_or(i64::MAX),
            )?;
        }

        Ok(())
    }

    /// Worker settings for the runner
    #[must_use]
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            requested_workers: self.workers,
            hard_cap: Some(self.max_workers),
            override_workers: self.override_workers,
        }
    }
}

/// Worker-count settings, fixed for the whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunConfig {
    /// Caller-requested worker cap
    pub requested_workers: Option<usize>,
    /// Environment ceiling on the pool size
    pub hard_cap: Option<usize>,
    /// Use `requested_workers` exactly, skipping every clamp
    pub override_workers: bool,
}

impl RunConfig {
    /// Resolve the pool size for a given hardware parallelism
    ///
    /// The base is twice the hardware parallelism, limited by `hard_cap` and
    /// then by `requested_workers`. With `override_workers` the requested
    /// count wins unclamped. Never returns 0.
    #[must_use]
    pub fn resolve_workers(&self, parallelism: usize) -> usize {
        if self.override_workers {
            if let Some(requested) = self.requested_workers {
                return requested.max(1);
            }
        }

        let mut workers = parallelism.saturating_mul(2);
        if let Some(cap) = self.hard_cap {
            workers = workers.min(cap);
        }
        if let Some(requested) = self.requested_workers {
            workers = workers.min(requested);
        }
        workers.max(1)
    }

    /// Resolve the pool size for this machine
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        let parallelism = std::thread::available_parallelism().map_or(1, usize::from);
        self.resolve_workers(parallelism)
    }
}

/// Validate DSN format
pub fn validate_dsn(dsn: &str) -> anyhow::Result<()> {
    if dsn.trim().is_empty() {
        anyhow::bail!("DSN cannot be empty");
    }

    // Check for control characters (null bytes, etc.)
    if dsn.chars().any(char::is_control) {
        anyhow::bail!("DSN contains invalid characters");
    }

    Ok(())
}

/// Validate a requested worker count
pub fn validate_worker_count(workers: usize) -> anyhow::Result<()> {
    if workers == 0 {
        anyhow::bail!("Worker count must be greater than 0");
    }

    Ok(())
}

/// PostgreSQL's `FETCH FORWARD` count is a 32-bit integer
pub fn validate_postgres_fetch_count(name: &str, count: i64) -> anyhow::Result<()> {
    if count > i64::from(i32::MAX) {
        anyhow::bail!("{name} {count} exceeds PostgreSQL's limit of {}", i32::MAX);
    }

    Ok(())
}
