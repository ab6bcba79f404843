use crate::error::{BenchError, BenchResult};
use std::sync::Arc;

/// One or more SQL statements to benchmark
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySet {
    Single(String),
    /// Statements run in this order within every repetition
    Many(Vec<String>),
}

impl QuerySet {
    /// Number of distinct statements
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Many(statements) => statements.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Single(statement) => statement.trim().is_empty(),
            Self::Many(statements) => statements.is_empty(),
        }
    }
}

/// A single statement execution, consumed exactly once by the runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// SQL text, shared between every instance of the same statement
    pub statement: Arc<str>,
    /// 1-based id, unique within a run
    pub instance_id: u64,
}

/// Expand a query set into independent tasks
///
/// Instance ids start at 1 and increase monotonically across the whole
/// expansion. With several statements, each repetition emits one task per
/// statement in order, so ids never reset between repetitions.
///
/// # Errors
///
/// Returns [`BenchError::EmptyQuerySet`] when there is nothing to run and
/// [`BenchError::InvalidInstanceCount`] when `instance_count` is zero
pub fn expand(queries: &QuerySet, instance_count: usize) -> BenchResult<Vec<Task>> {
    if queries.is_empty() {
        return Err(BenchError::EmptyQuerySet);
    }
    if instance_count == 0 {
        return Err(BenchError::InvalidInstanceCount(instance_count));
    }

    let statements: Vec<Arc<str>> = match queries {
        QuerySet::Single(statement) => vec![Arc::from(statement.as_str())],
        QuerySet::Many(statements) => statements.iter().map(|s| Arc::from(s.as_str())).collect(),
    };

    let tasks = (0..instance_count)
        .flat_map(|_| statements.iter().cloned())
        .zip(1u64..)
        .map(|(statement, instance_id)| Task {
            statement,
            instance_id,
        })
        .collect();

    Ok(tasks)
}
