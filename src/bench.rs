use crate::backend::Backend;
use crate::config::{Config, OutputFormat};
use crate::error::{BenchError, BenchResult};
use crate::fetch::FetchPolicy;
use crate::report::{self, Report};
use crate::runner::Runner;
use crate::source;
use crate::task::{self, Task};
use std::time::Instant;
use tracing::{debug, info};

/// A fully prepared benchmark run
///
/// Everything that can reject the run happens in [`Bench::new`], before any
/// connection is opened.
pub struct Bench {
    tasks: Vec<Task>,
    backend: Backend,
    runner: Runner,
    format: OutputFormat,
}

impl Bench {
    /// Prepare a benchmark run
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails, the fetch size or
    /// instance count is invalid, the statement source is unreadable or
    /// empty, or the connection settings cannot be parsed
    pub fn new(config: &Config) -> BenchResult<Self> {
        config
            .validate()
            .map_err(|e| BenchError::InvalidConfig(e.to_string()))?;

        let policy = FetchPolicy::resolve(config.fetch_size)?;
        let queries = source::load(&config.sql)?;
        let tasks = task::expand(&queries, config.instances)?;
        let backend = Backend::from_config(config)?;

        info!(
            "Prepared {} tasks ({} statements x {} instances) against {:?}, fetch policy {:?}",
            tasks.len(),
            queries.len(),
            config.instances,
            config.database,
            policy
        );

        Ok(Self::from_parts(
            tasks,
            backend,
            Runner::new(config.run_config(), policy),
            config.format,
        ))
    }

    /// Assemble a run from already prepared parts
    #[must_use]
    pub fn from_parts(
        tasks: Vec<Task>,
        backend: Backend,
        runner: Runner,
        format: OutputFormat,
    ) -> Self {
        Self {
            tasks,
            backend,
            runner,
            format,
        }
    }

    /// Execute every task and aggregate the timings
    pub async fn run(self) -> Report {
        let submitted = self.tasks.len();
        debug!(
            "Submitting {submitted} tasks to a {:?} backend",
            self.backend.capability()
        );

        let started = Instant::now();
        let results = self.runner.run_all(self.tasks, &self.backend).await;
        let wall_clock = started.elapsed();

        let report = report::aggregate(&results);
        info!(
            "Batch finished in {:.2}s wall-clock: {} of {} instances succeeded",
            wall_clock.as_secs_f64(),
            submitted - report.failed(),
            submitted
        );

        report
    }

    /// Report format requested for this run
    #[must_use]
    pub fn format(&self) -> OutputFormat {
        self.format
    }
}

/// Render a report in the requested format
///
/// # Errors
///
/// Returns an error if JSON serialization fails
pub fn render(report: &Report, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Text => Ok(report.to_string()),
        OutputFormat::Json => report.to_json(),
    }
}
