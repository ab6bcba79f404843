//! Timed execution of a single task
//!
//! Every backend failure stops here: it is logged with the instance id and
//! turned into an [`ExecutionResult`] without a duration, so one broken
//! instance never takes the rest of the batch down with it.

use crate::backend::{AsyncBackend, BlockingBackend};
use crate::error::TaskError;
use crate::fetch::FetchPolicy;
use crate::task::Task;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Measurements from an instance that finished normally
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    /// Wall-clock time from before connecting until the connection was released
    pub elapsed: Duration,
    /// Rows pulled to the client, `None` when the fetch policy skipped them
    pub rows: Option<u64>,
}

/// Terminal state of one instance
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// Instance this result belongs to
    pub instance_id: u64,
    /// Timing on success, the caught failure otherwise
    pub outcome: Result<Timing, TaskError>,
}

impl ExecutionResult {
    /// Create a successful result
    #[must_use]
    pub fn succeeded(instance_id: u64, elapsed: Duration, rows: Option<u64>) -> Self {
        Self {
            instance_id,
            outcome: Ok(Timing { elapsed, rows }),
        }
    }

    /// Create a failed result
    #[must_use]
    pub fn failed(instance_id: u64, error: TaskError) -> Self {
        Self {
            instance_id,
            outcome: Err(error),
        }
    }

    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.outcome.as_ref().ok().map(|t| t.elapsed)
    }

    #[must_use]
    pub fn rows(&self) -> Option<u64> {
        self.outcome.as_ref().ok().and_then(|t| t.rows)
    }

    #[must_use]
    pub fn error(&self) -> Option<&TaskError> {
        self.outcome.as_ref().err()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Run one task on a blocking backend, on the calling thread
///
/// Panics raised by the backend are caught and reported as
/// [`TaskError::Panicked`].
pub fn run_blocking(
    task: Task,
    backend: &dyn BlockingBackend,
    policy: FetchPolicy,
) -> ExecutionResult {
    debug!("Instance {}: starting", task.instance_id);

    let start = Instant::now();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        backend.execute_one(&task.statement, task.instance_id, policy)
    }));
    let elapsed = start.elapsed();

    let outcome = match outcome {
        Ok(Ok(rows)) => Ok(Timing { elapsed, rows }),
        Ok(Err(e)) => Err(e),
        Err(payload) => Err(TaskError::Panicked {
            message: panic_message(payload.as_ref()),
        }),
    };

    complete(task.instance_id, outcome)
}

/// Run one task on a non-blocking backend
///
/// Panics are not caught here; the runner spawns each call as its own unit
/// and recovers them from the join handle.
pub async fn run_async(
    task: Task,
    backend: &dyn AsyncBackend,
    policy: FetchPolicy,
) -> ExecutionResult {
    debug!("Instance {}: starting", task.instance_id);

    let start = Instant::now();
    let outcome = backend
        .execute_one(&task.statement, task.instance_id, policy)
        .await
        .map(|rows| Timing {
            elapsed: start.elapsed(),
            rows,
        });

    complete(task.instance_id, outcome)
}

/// Build the terminal result, logging failures with the instance id
pub(crate) fn complete(instance_id: u64, outcome: Result<Timing, TaskError>) -> ExecutionResult {
    match outcome {
        Ok(timing) => {
            debug!(
                "Instance {instance_id}: finished in {:.3}s",
                timing.elapsed.as_secs_f64()
            );
            ExecutionResult {
                instance_id,
                outcome: Ok(timing),
            }
        }
        Err(e) => {
            error!("Instance {instance_id}: {e}");
            ExecutionResult::failed(instance_id, e)
        }
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FixedBackend(Result<Option<u64>, TaskError>);

    impl BlockingBackend for FixedBackend {
        fn execute_one(
            &self,
            _statement: &str,
            _instance_id: u64,
            _policy: FetchPolicy,
        ) -> Result<Option<u64>, TaskError> {
            self.0.clone()
        }
    }

    #[async_trait]
    impl AsyncBackend for FixedBackend {
        async fn execute_one(
            &self,
            _statement: &str,
            _instance_id: u64,
            _policy: FetchPolicy,
        ) -> Result<Option<u64>, TaskError> {
            self.0.clone()
        }
    }

    struct PanickingBackend;

    impl BlockingBackend for PanickingBackend {
        fn execute_one(
            &self,
            _statement: &str,
            instance_id: u64,
            _policy: FetchPolicy,
        ) -> Result<Option<u64>, TaskError> {
            panic!("driver exploded on instance {instance_id}");
        }
    }

    fn task(instance_id: u64) -> Task {
        Task {
            statement: Arc::from("SELECT 1"),
            instance_id,
        }
    }

    #[test]
    fn test_run_blocking_success_records_duration_and_rows() {
        let result = run_blocking(task(3), &FixedBackend(Ok(Some(42))), FetchPolicy::All);

        assert_eq!(result.instance_id, 3);
        assert!(result.is_success());
        assert!(result.duration().is_some());
        assert_eq!(result.rows(), Some(42));
        assert!(result.error().is_none());
    }

    #[test]
    fn test_run_blocking_failure_has_no_duration() {
        let err = TaskError::connection(Some("08001".to_string()), "refused");
        let result = run_blocking(task(2), &FixedBackend(Err(err.clone())), FetchPolicy::None);

        assert_eq!(result.instance_id, 2);
        assert!(result.duration().is_none());
        assert_eq!(result.error(), Some(&err));
    }

    #[test]
    fn test_run_blocking_catches_panic() {
        let result = run_blocking(task(5), &PanickingBackend, FetchPolicy::None);

        assert!(result.duration().is_none());
        match result.error() {
            Some(TaskError::Panicked { message }) => {
                assert_eq!(message, "driver exploded on instance 5");
            }
            other => panic!("expected panic error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_async_success_and_failure() {
        let ok = run_async(task(1), &FixedBackend(Ok(None)), FetchPolicy::None).await;
        assert!(ok.is_success());
        assert_eq!(ok.rows(), None);

        let err = TaskError::statement(None, "syntax error");
        let failed = run_async(task(2), &FixedBackend(Err(err.clone())), FetchPolicy::None).await;
        assert_eq!(failed.error(), Some(&err));
        assert!(failed.duration().is_none());
    }

    #[test]
    fn test_panic_message_payloads() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");

        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic payload");
    }
}
