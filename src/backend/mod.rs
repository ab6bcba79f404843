//! Database backends
//!
//! A backend owns everything about one instance's trip to the database:
//! acquiring a connection, executing the statement, pulling rows according
//! to the [`FetchPolicy`] and releasing the connection on every exit path.
//! The runner only cares about the backend's [`Capability`], which decides
//! the scheduling model.

pub mod postgres;
pub mod sqlite;

use crate::config::{Config, DatabaseKind};
use crate::error::{BenchResult, TaskError};
use crate::fetch::FetchPolicy;
use async_trait::async_trait;
use std::sync::Arc;

pub use postgres::PostgresBackend;
pub use sqlite::SqliteBackend;

/// Concurrency model a backend's driver calls require
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Driver calls occupy an OS thread for their full duration
    Blocking,
    /// Driver calls yield to the scheduler while waiting on I/O
    NonBlocking,
}

/// Backend whose driver blocks the calling thread
pub trait BlockingBackend: Send + Sync {
    /// Run one statement on a fresh connection
    ///
    /// Returns the number of rows pulled, or `None` when the policy skipped them.
    ///
    /// # Errors
    ///
    /// Returns a [`TaskError`] for connection or statement failures
    fn execute_one(
        &self,
        statement: &str,
        instance_id: u64,
        policy: FetchPolicy,
    ) -> Result<Option<u64>, TaskError>;
}

/// Backend whose driver suspends at every I/O point
#[async_trait]
pub trait AsyncBackend: Send + Sync {
    /// Run one statement on a fresh connection
    ///
    /// # Errors
    ///
    /// Returns a [`TaskError`] for connection or statement failures
    async fn execute_one(
        &self,
        statement: &str,
        instance_id: u64,
        policy: FetchPolicy,
    ) -> Result<Option<u64>, TaskError>;
}

/// A backend tagged with its capability
#[derive(Clone)]
pub enum Backend {
    Blocking(Arc<dyn BlockingBackend>),
    NonBlocking(Arc<dyn AsyncBackend>),
}

impl Backend {
    pub fn blocking(backend: impl BlockingBackend + 'static) -> Self {
        Self::Blocking(Arc::new(backend))
    }

    pub fn non_blocking(backend: impl AsyncBackend + 'static) -> Self {
        Self::NonBlocking(Arc::new(backend))
    }

    /// Build the backend selected by the configuration
    ///
    /// Only parses connection settings; no connection is opened here.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection settings are invalid
    pub fn from_config(config: &Config) -> BenchResult<Self> {
        match config.database {
            DatabaseKind::Postgres => Ok(Self::non_blocking(PostgresBackend::new(
                &config.dsn,
                config.user.as_deref(),
                config.password.as_deref(),
                config.max_fetch_rows,
            )?)),
            DatabaseKind::Sqlite => Ok(Self::blocking(SqliteBackend::new(
                &config.dsn,
                config.max_fetch_rows,
            ))),
        }
    }

    #[must_use]
    pub fn capability(&self) -> Capability {
        match self {
            Self::Blocking(_) => Capability::Blocking,
            Self::NonBlocking(_) => Capability::NonBlocking,
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Backend").field(&self.capability()).finish()
    }
}
