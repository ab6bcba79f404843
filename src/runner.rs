//! Bounded concurrent execution of tasks
//!
//! Blocking backends run on a fixed-size rayon pool; non-blocking backends
//! run as independently spawned units on the current tokio runtime. Either
//! way the runner returns only once every task is terminal, and results come
//! back in submission order no matter which instance finishes first.

use crate::backend::{AsyncBackend, Backend, BlockingBackend};
use crate::config::RunConfig;
use crate::error::TaskError;
use crate::executor::{self, ExecutionResult};
use crate::fetch::FetchPolicy;
use crate::task::Task;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Executes expanded tasks under the backend's scheduling model
#[derive(Debug, Clone)]
pub struct Runner {
    config: RunConfig,
    policy: FetchPolicy,
}

impl Runner {
    /// Create a runner for one benchmark run
    #[must_use]
    pub fn new(config: RunConfig, policy: FetchPolicy) -> Self {
        Self { config, policy }
    }

    /// Run every task and wait for all of them
    ///
    /// The returned vector has one entry per task, in submission order.
    pub async fn run_all(&self, tasks: Vec<Task>, backend: &Backend) -> Vec<ExecutionResult> {
        match backend {
            Backend::Blocking(backend) => {
                let workers = self.config.effective_workers();
                self.run_blocking_off_runtime(tasks, Arc::clone(backend), workers)
                    .await
            }
            Backend::NonBlocking(backend) => self.run_non_blocking(tasks, Arc::clone(backend)).await,
        }
    }

    /// Run tasks on a blocking backend with a pool of `workers` threads
    ///
    /// With a single worker, or a single task, everything runs on the calling
    /// thread and no pool is built.
    pub fn run_pooled(
        &self,
        tasks: Vec<Task>,
        backend: &dyn BlockingBackend,
        workers: usize,
    ) -> Vec<ExecutionResult> {
        if workers <= 1 || tasks.len() <= 1 {
            debug!("Running {} tasks sequentially", tasks.len());
            return self.run_sequential(tasks, backend);
        }

        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("qbench-worker-{i}"))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!("Failed to build worker pool ({e}), running tasks sequentially");
                return self.run_sequential(tasks, backend);
            }
        };

        info!("Running {} tasks on {} workers", tasks.len(), workers);

        let policy = self.policy;
        let ids: Vec<u64> = tasks.iter().map(|t| t.instance_id).collect();
        let mut slots: Vec<Option<ExecutionResult>> = vec![None; tasks.len()];

        pool.scope(|scope| {
            for (slot, task) in slots.iter_mut().zip(tasks) {
                scope.spawn(move |_| {
                    *slot = Some(executor::run_blocking(task, backend, policy));
                });
            }
        });

        slots
            .into_iter()
            .zip(ids)
            .map(|(slot, instance_id)| {
                slot.unwrap_or_else(|| {
                    ExecutionResult::failed(
                        instance_id,
                        TaskError::Panicked {
                            message: "worker exited without a result".to_string(),
                        },
                    )
                })
            })
            .collect()
    }

    fn run_sequential(
        &self,
        tasks: Vec<Task>,
        backend: &dyn BlockingBackend,
    ) -> Vec<ExecutionResult> {
        tasks
            .into_iter()
            .map(|task| executor::run_blocking(task, backend, self.policy))
            .collect()
    }

    /// Keep the async scheduler free while the blocking pool works
    async fn run_blocking_off_runtime(
        &self,
        tasks: Vec<Task>,
        backend: Arc<dyn BlockingBackend>,
        workers: usize,
    ) -> Vec<ExecutionResult> {
        let ids: Vec<u64> = tasks.iter().map(|t| t.instance_id).collect();
        let runner = self.clone();

        match tokio::task::spawn_blocking(move || {
            runner.run_pooled(tasks, backend.as_ref(), workers)
        })
        .await
        {
            Ok(results) => results,
            Err(e) => {
                error!("Blocking runner failed: {e}");
                let message = e.to_string();
                ids.into_iter()
                    .map(|id| {
                        ExecutionResult::failed(
                            id,
                            TaskError::Panicked {
                                message: message.clone(),
                            },
                        )
                    })
                    .collect()
            }
        }
    }

    /// Spawn every task as its own unit and join them in submission order
    async fn run_non_blocking(
        &self,
        tasks: Vec<Task>,
        backend: Arc<dyn AsyncBackend>,
    ) -> Vec<ExecutionResult> {
        info!("Running {} tasks concurrently", tasks.len());

        let handles: Vec<(u64, JoinHandle<ExecutionResult>)> = tasks
            .into_iter()
            .map(|task| {
                let instance_id = task.instance_id;
                let backend = Arc::clone(&backend);
                let policy = self.policy;
                let handle = tokio::spawn(async move {
                    executor::run_async(task, backend.as_ref(), policy).await
                });
                (instance_id, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (instance_id, handle) in handles {
            // Await the handle to recover panics instead of losing the instance
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    let message = if e.is_panic() {
                        executor::panic_message(e.into_panic().as_ref())
                    } else {
                        format!("task was cancelled: {e}")
                    };
                    executor::complete(instance_id, Err(TaskError::Panicked { message }))
                }
            };
            results.push(result);
        }

        results
    }
}
