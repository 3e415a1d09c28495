//! SQL script loading and batch execution
//!
//! DDL and procedure-creation scripts are plain text files whose statements
//! are grouped into batches separated by a standalone, case-insensitive `GO`
//! line. Each batch commits independently; a failing batch is rolled back,
//! logged, and skipped so that idempotent "create if not exists" DDL never
//! takes the whole script down.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{DatabaseBackend, DatabaseError, DatabaseResult};

/// Matches a batch-separator keyword alone on its own line
static BATCH_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^[ \t]*GO[ \t]*;?[ \t]*\r?$").expect("valid separator pattern"));

/// A SQL script split into executable batches
#[derive(Debug, Clone)]
pub struct SqlScript {
    /// Where the script was loaded from
    pub path: PathBuf,
    /// Non-empty batches in file order
    pub batches: Vec<String>,
}

impl SqlScript {
    /// Load a script file and split it into batches
    pub fn load(path: impl AsRef<Path>) -> DatabaseResult<Self> {
        let path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            DatabaseError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Ok(Self {
            batches: split_batches(&content),
            path,
        })
    }

    /// Build a script from in-memory SQL text
    pub fn from_text(name: impl Into<PathBuf>, content: &str) -> Self {
        Self {
            path: name.into(),
            batches: split_batches(content),
        }
    }
}

/// Split script text on standalone batch-separator lines
pub fn split_batches(content: &str) -> Vec<String> {
    BATCH_SEPARATOR
        .split(content)
        .map(str::trim)
        .filter(|batch| !batch.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split a SQL body into individual statements on `;`, respecting
/// single-quoted literals (with `''` escapes)
pub fn split_statements(body: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = body.chars().peekable();
    let mut in_literal = false;

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                if in_literal && chars.peek() == Some(&'\'') {
                    // Doubled quote inside a literal
                    current.push(c);
                    current.push(chars.next().expect("peeked quote"));
                    continue;
                }
                in_literal = !in_literal;
                current.push(c);
            }
            ';' if !in_literal => {
                let statement = current.trim();
                if !statement.is_empty() {
                    statements.push(statement.to_string());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }

    let statement = current.trim();
    if !statement.is_empty() {
        statements.push(statement.to_string());
    }

    statements
}

/// Outcome of running one script
#[derive(Debug, Clone, Default)]
pub struct ScriptReport {
    /// Script path, for the run log
    pub script: PathBuf,
    /// Number of batches that committed
    pub executed: usize,
    /// (batch index, error text) for batches that were rolled back and skipped
    pub failed: Vec<(usize, String)>,
}

/// Execute every batch of a script, committing each independently
///
/// A failing batch rolls back, is logged, and the remaining batches still
/// run. The report records both sides.
pub async fn run_script(
    backend: &dyn DatabaseBackend,
    script: &SqlScript,
) -> DatabaseResult<ScriptReport> {
    let mut report = ScriptReport {
        script: script.path.clone(),
        ..Default::default()
    };

    for (index, batch) in script.batches.iter().enumerate() {
        backend.begin().await?;
        match backend.execute_batch(batch).await {
            Ok(()) => {
                backend.commit().await?;
                report.executed += 1;
                debug!(script = %script.path.display(), batch = index + 1, "batch committed");
            }
            Err(e) => {
                backend.rollback().await?;
                warn!(
                    script = %script.path.display(),
                    batch = index + 1,
                    error = %e,
                    "batch failed, skipping"
                );
                report.failed.push((index + 1, e.to_string()));
            }
        }
    }

    Ok(report)
}
