use super::BlockingBackend;
use crate::error::TaskError;
use crate::fetch::{FetchPolicy, RowSource};
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags, Rows, Statement};
use std::path::PathBuf;
use tracing::{debug, info};

/// SQLite through `rusqlite`
///
/// Each instance opens the database file on its own connection and steps
/// the prepared statement's row cursor.
pub struct SqliteBackend {
    path: PathBuf,
    max_fetch_rows: u64,
}

impl SqliteBackend {
    pub fn new(path: impl Into<PathBuf>, max_fetch_rows: u64) -> Self {
        Self {
            path: path.into(),
            max_fetch_rows,
        }
    }

    fn open(&self) -> Result<Connection, TaskError> {
        // No SQLITE_OPEN_CREATE: a missing database is a connection failure
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        Connection::open_with_flags(&self.path, flags).map_err(|e| {
            let (code, message) = describe(&e);
            TaskError::connection(code, message)
        })
    }
}

impl BlockingBackend for SqliteBackend {
    fn execute_one(
        &self,
        statement: &str,
        instance_id: u64,
        policy: FetchPolicy,
    ) -> Result<Option<u64>, TaskError> {
        let conn = self.open()?;
        info!("Instance {instance_id}: Connected");

        let mut stmt = conn.prepare(statement).map_err(statement_error)?;
        let mut cursor = SqliteCursor::open(&mut stmt)?;
        let rows = policy.drain(&mut cursor, self.max_fetch_rows)?;

        if let Some(rows) = rows {
            info!("Instance {instance_id}: Fetched {rows} rows");
        }
        debug!("Instance {instance_id}: Connection closed");

        Ok(rows)
    }
}

struct SqliteCursor<'stmt> {
    rows: Rows<'stmt>,
    columns: usize,
    /// Owned values of the last fetched row
    values: Vec<Value>,
}

impl<'stmt> SqliteCursor<'stmt> {
    fn open(stmt: &'stmt mut Statement<'_>) -> Result<Self, TaskError> {
        let columns = stmt.column_count();
        Ok(Self {
            rows: stmt.query([]).map_err(statement_error)?,
            columns,
            values: Vec::with_capacity(columns),
        })
    }
}

impl RowSource for SqliteCursor<'_> {
    fn fetch(&mut self, max_rows: u64) -> Result<u64, TaskError> {
        let mut fetched = 0;
        while fetched < max_rows {
            let Some(row) = self.rows.next().map_err(statement_error)? else {
                break;
            };

            // Copy every column out of SQLite's buffers, as a client would
            self.values.clear();
            for i in 0..self.columns {
                let value = row.get_ref(i).map_err(statement_error)?;
                self.values.push(Value::from(value));
            }
            fetched += 1;
        }
        Ok(fetched)
    }

    fn skip_remaining(&mut self) -> Result<(), TaskError> {
        // Step without reading any column values
        while self.rows.next().map_err(statement_error)?.is_some() {}
        Ok(())
    }
}

fn statement_error(e: rusqlite::Error) -> TaskError {
    let (code, message) = describe(&e);
    TaskError::statement(code, message)
}

/// Extended result code and message for SQLite failures
fn describe(e: &rusqlite::Error) -> (Option<String>, String) {
    match e {
        rusqlite::Error::SqliteFailure(err, message) => (
            Some(err.extended_code.to_string()),
            message.clone().unwrap_or_else(|| err.to_string()),
        ),
        other => (None, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seeded_db(rows: u32) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bench.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)", [])
            .unwrap();
        for i in 0..rows {
            conn.execute("INSERT INTO items (name) VALUES (?1)", [format!("item-{i}")])
                .unwrap();
        }
        (dir, path)
    }

    #[test]
    fn test_chunked_fetch_counts_all_rows() {
        let (_dir, path) = seeded_db(25);
        let backend = SqliteBackend::new(&path, 1_000);

        let rows = backend
            .execute_one("SELECT * FROM items", 1, FetchPolicy::Chunked(10))
            .unwrap();
        assert_eq!(rows, Some(25));
    }

    #[test]
    fn test_all_is_bounded_by_ceiling() {
        let (_dir, path) = seeded_db(25);

        let rows = SqliteBackend::new(&path, 1_000)
            .execute_one("SELECT * FROM items", 1, FetchPolicy::All)
            .unwrap();
        assert_eq!(rows, Some(25));

        let rows = SqliteBackend::new(&path, 7)
            .execute_one("SELECT * FROM items", 1, FetchPolicy::All)
            .unwrap();
        assert_eq!(rows, Some(7));
    }

    #[test]
    fn test_none_policy_reports_no_row_count() {
        let (_dir, path) = seeded_db(5);
        let rows = SqliteBackend::new(&path, 1_000)
            .execute_one("SELECT * FROM items ORDER BY name DESC", 1, FetchPolicy::None)
            .unwrap();
        assert_eq!(rows, None);
    }

    #[test]
    fn test_fetch_converts_column_values() {
        let dir = TempDir::new().unwrap();
        let conn = Connection::open(dir.path().join("docs.db")).unwrap();
        conn.execute_batch(
            "CREATE TABLE docs (title TEXT, body BLOB, pages INTEGER);
             INSERT INTO docs VALUES ('first', x'00ff10', 3), ('second', x'abcd', NULL);",
        )
        .unwrap();

        let mut stmt = conn
            .prepare("SELECT title, body, pages FROM docs ORDER BY rowid")
            .unwrap();
        let mut cursor = SqliteCursor::open(&mut stmt).unwrap();

        assert_eq!(cursor.fetch(1).unwrap(), 1);
        assert_eq!(
            cursor.values,
            vec![
                Value::Text("first".to_string()),
                Value::Blob(vec![0x00, 0xff, 0x10]),
                Value::Integer(3),
            ]
        );

        assert_eq!(cursor.fetch(10).unwrap(), 1);
        assert_eq!(
            cursor.values,
            vec![
                Value::Text("second".to_string()),
                Value::Blob(vec![0xab, 0xcd]),
                Value::Null,
            ]
        );
        assert_eq!(cursor.fetch(10).unwrap(), 0);
    }

    #[test]
    fn test_skip_remaining_reads_no_values() {
        let (_dir, path) = seeded_db(4);
        let conn = Connection::open(&path).unwrap();
        let mut stmt = conn.prepare("SELECT id, name FROM items").unwrap();
        let mut cursor = SqliteCursor::open(&mut stmt).unwrap();

        cursor.skip_remaining().unwrap();
        assert!(cursor.values.is_empty());
        assert_eq!(cursor.fetch(10).unwrap(), 0);
    }

    #[test]
    fn test_missing_database_is_connection_failure() {
        let dir = TempDir::new().unwrap();
        let backend = SqliteBackend::new(dir.path().join("missing.db"), 10);

        let err = backend
            .execute_one("SELECT 1", 1, FetchPolicy::None)
            .unwrap_err();
        assert!(matches!(err, TaskError::ConnectionFailure { .. }));
        assert!(err.code().is_some());
    }

    #[test]
    fn test_bad_statement_is_execution_failure() {
        let (_dir, path) = seeded_db(1);
        let err = SqliteBackend::new(&path, 10)
            .execute_one("SELECT * FROM no_such_table", 3, FetchPolicy::All)
            .unwrap_err();

        assert!(matches!(err, TaskError::StatementExecutionFailure { .. }));
        assert!(err.to_string().contains("no_such_table"));
    }
}
