use super::AsyncBackend;
use crate::error::{BenchError, BenchResult, TaskError};
use crate::fetch::{AsyncRowSource, FetchPolicy};
use async_trait::async_trait;
use tokio_postgres::{Client, Config as PgConfig, NoTls, SimpleQueryMessage, Transaction};
use tracing::{debug, info, warn};

const CURSOR_NAME: &str = "qbench_cursor";

/// PostgreSQL through `tokio-postgres`
///
/// Every instance opens its own session, declares a server-side cursor over
/// the statement inside a transaction and drives it with `FETCH`/`MOVE`.
pub struct PostgresBackend {
    config: PgConfig,
    max_fetch_rows: u64,
}

impl PostgresBackend {
    /// Parse connection settings
    ///
    /// `user` and `password` override whatever the DSN carries.
    ///
    /// # Errors
    ///
    /// Returns an error if the DSN cannot be parsed
    pub fn new(
        dsn: &str,
        user: Option<&str>,
        password: Option<&str>,
        max_fetch_rows: u64,
    ) -> BenchResult<Self> {
        let mut config: PgConfig = dsn
            .parse()
            .map_err(|e| BenchError::InvalidConfig(format!("Invalid PostgreSQL DSN: {e}")))?;

        if let Some(user) = user {
            config.user(user);
        }
        if let Some(password) = password {
            config.password(password);
        }

        Ok(Self {
            config,
            max_fetch_rows,
        })
    }
}

#[async_trait]
impl AsyncBackend for PostgresBackend {
    async fn execute_one(
        &self,
        statement: &str,
        instance_id: u64,
        policy: FetchPolicy,
    ) -> Result<Option<u64>, TaskError> {
        let (mut client, connection) = self
            .config
            .connect(NoTls)
            .await
            .map_err(|e| {
                let (code, message) = describe(&e);
                TaskError::connection(code, message)
            })?;

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("Connection error: {e}");
            }
        });

        info!("Instance {instance_id}: Connected");

        let result = run_statement(
            &mut client,
            statement,
            instance_id,
            policy,
            self.max_fetch_rows,
        )
        .await;

        // Dropping the client terminates the session, which ends the driver task
        drop(client);
        if let Err(e) = driver.await {
            warn!("Instance {instance_id}: connection task failed: {e}");
        }
        debug!("Instance {instance_id}: Connection closed");

        result
    }
}

async fn run_statement(
    client: &mut Client,
    statement: &str,
    instance_id: u64,
    policy: FetchPolicy,
    max_fetch_rows: u64,
) -> Result<Option<u64>, TaskError> {
    let tx = client.transaction().await.map_err(statement_error)?;

    tx.batch_execute(&declare_cursor(statement))
        .await
        .map_err(statement_error)?;

    let mut cursor = PgCursor { tx: &tx };
    let rows = policy.drain_async(&mut cursor, max_fetch_rows).await?;

    if let Some(rows) = rows {
        info!("Instance {instance_id}: Fetched {rows} rows");
    }

    tx.commit().await.map_err(statement_error)?;
    Ok(rows)
}

struct PgCursor<'a, 'client> {
    tx: &'a Transaction<'client>,
}

#[async_trait]
impl<'a, 'client> AsyncRowSource for PgCursor<'a, 'client> {
    async fn fetch(&mut self, max_rows: u64) -> Result<u64, TaskError> {
        let messages = self
            .tx
            .simple_query(&format!("FETCH FORWARD {max_rows} FROM {CURSOR_NAME}"))
            .await
            .map_err(statement_error)?;

        let rows = messages
            .iter()
            .filter(|m| matches!(m, SimpleQueryMessage::Row(_)))
            .count();
        Ok(rows as u64)
    }

    async fn skip_remaining(&mut self) -> Result<(), TaskError> {
        self.tx
            .batch_execute(&format!("MOVE FORWARD ALL IN {CURSOR_NAME}"))
            .await
            .map_err(statement_error)
    }
}

/// Wrap a statement in a cursor declaration
///
/// Trailing semicolons are not valid inside `DECLARE ... FOR`.
fn declare_cursor(statement: &str) -> String {
    let body = statement.trim().trim_end_matches(';').trim_end();
    format!("DECLARE {CURSOR_NAME} NO SCROLL CURSOR FOR {body}")
}

fn statement_error(e: tokio_postgres::Error) -> TaskError {
    let (code, message) = describe(&e);
    TaskError::statement(code, message)
}

/// SQLSTATE and server message, falling back to the driver's own text
fn describe(e: &tokio_postgres::Error) -> (Option<String>, String) {
    let code = e.code().map(|state| state.code().to_string());
    let message = e
        .as_db_error()
        .map_or_else(|| e.to_string(), |db| db.message().to_string());
    (code, message)
}
