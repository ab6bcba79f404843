use crate::error::{BenchError, BenchResult};
use crate::task::QuerySet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const SQL_EXTENSION: &str = "sql";

/// Load statements from a `.sql` file or a folder of them
///
/// A folder yields every `.sql` file directly inside it, ordered by file
/// name, with blank files skipped.
///
/// # Errors
///
/// Returns an error if the path cannot be read or holds no statements
pub fn load(path: &Path) -> BenchResult<QuerySet> {
    let metadata = fs::metadata(path)
        .map_err(|e| BenchError::Source(format!("Cannot read '{}': {e}", path.display())))?;

    if metadata.is_dir() {
        load_folder(path)
    } else {
        let text = fs::read_to_string(path)?;
        let statement = text.trim();
        if statement.is_empty() {
            return Err(BenchError::EmptyQuerySet);
        }
        info!("Loaded statement from {}", path.display());
        Ok(QuerySet::Single(statement.to_string()))
    }
}

fn load_folder(dir: &Path) -> BenchResult<QuerySet> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == SQL_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();

    let mut statements = Vec::with_capacity(files.len());
    for file in &files {
        let text = fs::read_to_string(file)?;
        let statement = text.trim();
        if statement.is_empty() {
            debug!("Skipping empty file {}", file.display());
            continue;
        }
        statements.push(statement.to_string());
    }

    if statements.is_empty() {
        return Err(BenchError::EmptyQuerySet);
    }

    info!(
        "Loaded {} statements from {}",
        statements.len(),
        dir.display()
    );
    Ok(QuerySet::Many(statements))
}
