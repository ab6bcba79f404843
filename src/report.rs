use crate::error::TaskError;
use crate::executor::ExecutionResult;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Timing of one successful instance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceTiming {
    /// 1-based position among successful instances, used for display
    pub index: usize,
    /// Instance id assigned at expansion
    pub instance_id: u64,
    pub seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
}

/// Error of one failed instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceFailure {
    pub instance_id: u64,
    pub error: TaskError,
}

/// Final outcome of a benchmark run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Report {
    /// Every instance failed; there is nothing to sum
    NoSuccessfulInstances { failures: Vec<InstanceFailure> },
    Completed {
        instances: Vec<InstanceTiming>,
        /// Sum of instance durations, not the batch's wall-clock time
        total_seconds: f64,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        failures: Vec<InstanceFailure>,
    },
}

/// Collect successful durations into a report
///
/// Failed instances are dropped from both the sum and the display numbering;
/// the remaining instances keep their submission order.
#[must_use]
pub fn aggregate(results: &[ExecutionResult]) -> Report {
    let successes: Vec<(u64, Duration, Option<u64>)> = results
        .iter()
        .filter_map(|r| r.duration().map(|d| (r.instance_id, d, r.rows())))
        .collect();
    let failures: Vec<InstanceFailure> = results
        .iter()
        .filter_map(|r| {
            r.error().map(|error| InstanceFailure {
                instance_id: r.instance_id,
                error: error.clone(),
            })
        })
        .collect();

    if successes.is_empty() {
        return Report::NoSuccessfulInstances { failures };
    }

    let total: Duration = successes.iter().map(|(_, d, _)| *d).sum();
    let instances = successes
        .into_iter()
        .enumerate()
        .map(|(i, (instance_id, duration, rows))| InstanceTiming {
            index: i + 1,
            instance_id,
            seconds: duration.as_secs_f64(),
            rows,
        })
        .collect();

    Report::Completed {
        instances,
        total_seconds: total.as_secs_f64(),
        failures,
    }
}

impl Report {
    /// Sum of successful durations, if any instance succeeded
    #[must_use]
    pub fn total_seconds(&self) -> Option<f64> {
        match self {
            Self::NoSuccessfulInstances { .. } => None,
            Self::Completed { total_seconds, .. } => Some(*total_seconds),
        }
    }

    /// Failed instances in submission order
    #[must_use]
    pub fn failures(&self) -> &[InstanceFailure] {
        match self {
            Self::NoSuccessfulInstances { failures } | Self::Completed { failures, .. } => failures,
        }
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures().len()
    }

    /// Render as JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuccessfulInstances { .. } => write!(f, "No instances completed successfully"),
            Self::Completed {
                instances,
                total_seconds,
                ..
            } => {
                for instance in instances {
                    writeln!(
                        f,
                        "Instance {}: Execution time: {:.2} seconds",
                        instance.index, instance.seconds
                    )?;
                }
                write!(f, "Total execution time: {total_seconds:.2} seconds")
            }
        }
    }
}
