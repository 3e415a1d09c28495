//! Database backend abstraction for the ETL pipeline
//!
//! This module provides a backend layer that supports:
//! - DuckDB: embedded database, the default for local runs and tests
//! - PostgreSQL: for server deployments
//!
//! All units of work run on one exclusively-owned connection with explicit
//! `begin`/`commit`/`rollback`, so each logical step either fully commits or
//! fully rolls back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[cfg(feature = "duckdb-backend")]
pub mod duckdb;

#[cfg(feature = "postgres-backend")]
pub mod postgres;

pub mod script;

#[cfg(feature = "duckdb-backend")]
pub use self::duckdb::DuckDbBackend;

#[cfg(feature = "postgres-backend")]
pub use self::postgres::PostgresBackend;

pub use script::{ScriptReport, SqlScript, run_script};

use crate::config::{BackendType, EtlConfig};

/// Error type for database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Failed to connect to the database
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction control failed
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// A named stored procedure is not defined in the database
    #[error("Procedure not found: {0}")]
    ProcedureMissing(String),

    /// A stored procedure invocation failed
    #[error("Procedure {name} failed: {message}")]
    ProcedureFailed { name: String, message: String },

    /// Identifier failed validation before being spliced into SQL
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// The requested backend is not compiled in
    #[error("Backend not available: {0}. Rebuild with the matching feature.")]
    BackendUnavailable(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),
}

/// Result type for database operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Query result row as a JSON value
pub type QueryRow = serde_json::Value;

/// Query result set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names
    pub columns: Vec<String>,
    /// Rows of data
    pub rows: Vec<QueryRow>,
}

impl QueryResult {
    /// Create a new query result
    pub fn new(columns: Vec<String>, rows: Vec<QueryRow>) -> Self {
        Self { columns, rows }
    }

    /// Create an empty result
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Read column `idx` of the first row as an integer
    ///
    /// NULL and absent cells read as 0, matching how the quality counters
    /// treat empty aggregates.
    pub fn first_row_i64(&self, idx: usize) -> i64 {
        self.rows
            .first()
            .and_then(|row| row.get(self.columns.get(idx)?.as_str()))
            .and_then(value_as_i64)
            .unwrap_or(0)
    }
}

fn value_as_i64(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// SQL dialect spoken by a backend, for the few places where inline SQL
/// differs between engines (the data-quality fallback query).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    DuckDb,
    Postgres,
}

/// Database backend trait
///
/// One instance owns one connection. The connection is never shared across
/// logical owners, so no pooling is involved.
#[async_trait(?Send)]
pub trait DatabaseBackend {
    /// Execute a SQL statement that does not return rows
    async fn execute(&self, sql: &str) -> DatabaseResult<u64>;

    /// Execute multiple SQL statements in one go
    async fn execute_batch(&self, sql: &str) -> DatabaseResult<()>;

    /// Execute a SQL query and return its rows
    async fn query(&self, sql: &str) -> DatabaseResult<QueryResult>;

    /// Execute a parameterized SQL query
    ///
    /// Parameters are passed as JSON values; backends bind them as text,
    /// which is all the staging layer ever stores.
    async fn query_params(
        &self,
        sql: &str,
        params: &[serde_json::Value],
    ) -> DatabaseResult<QueryResult>;

    /// Open an explicit transaction
    async fn begin(&self) -> DatabaseResult<()>;

    /// Commit the current transaction
    async fn commit(&self) -> DatabaseResult<()>;

    /// Roll back the current transaction
    async fn rollback(&self) -> DatabaseResult<()>;

    /// Remove all rows from a table
    async fn truncate_table(&self, table: &str) -> DatabaseResult<()>;

    /// Bulk-insert text rows into a table
    ///
    /// Every row must have exactly `columns.len()` values.
    async fn insert_rows(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<String>],
    ) -> DatabaseResult<u64>;

    /// Invoke a stored procedure by name, returning any rows it produces
    async fn call_procedure(&self, name: &str) -> DatabaseResult<QueryResult>;

    /// Check whether a stored procedure is defined
    async fn procedure_exists(&self, name: &str) -> DatabaseResult<bool>;

    /// The SQL dialect this backend speaks
    fn dialect(&self) -> SqlDialect;

    /// The backend type name ("duckdb" or "postgres")
    fn backend_type(&self) -> &'static str;

    /// Close the connection
    async fn close(&self) -> DatabaseResult<()>;
}

/// Validate an identifier before splicing it into SQL text
///
/// Table and procedure names come from code and configuration, never from
/// data rows, but they still pass through here before interpolation.
pub fn validate_identifier(name: &str) -> DatabaseResult<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(DatabaseError::InvalidIdentifier(name.to_string()))
    }
}

/// Opens the backend selected by the configuration
///
/// Each logical owner (orchestrator during DDL, each ETL step during its own
/// run) opens its own connection through this and closes it when done.
#[derive(Debug, Clone)]
pub struct Connector {
    config: EtlConfig,
    base_dir: std::path::PathBuf,
}

impl Connector {
    /// Create a connector resolving relative paths against `base_dir`
    pub fn new(config: EtlConfig, base_dir: impl AsRef<Path>) -> Self {
        Self {
            config,
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// The configuration this connector was built from
    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    /// Open a connection to the configured backend
    pub async fn connect(&self) -> DatabaseResult<Box<dyn DatabaseBackend>> {
        match self.config.database.backend {
            BackendType::DuckDb => {
                #[cfg(feature = "duckdb-backend")]
                {
                    let path = self.config.duckdb_path(&self.base_dir);
                    tracing::info!(path = %path.display(), "opening DuckDB database");
                    let backend = DuckDbBackend::open(&path)?;
                    Ok(Box::new(backend))
                }
                #[cfg(not(feature = "duckdb-backend"))]
                {
                    Err(DatabaseError::BackendUnavailable("duckdb".to_string()))
                }
            }
            BackendType::Postgres => {
                #[cfg(feature = "postgres-backend")]
                {
                    let conn = self.config.postgres_connection_string();
                    let backend = PostgresBackend::connect(&conn).await?;
                    tracing::info!(
                        connection = %backend.connection_string_masked(),
                        driver = %self.config.postgres.driver,
                        "connected to PostgreSQL"
                    );
                    Ok(Box::new(backend))
                }
                #[cfg(not(feature = "postgres-backend"))]
                {
                    Err(DatabaseError::BackendUnavailable("postgres".to_string()))
                }
            }
        }
    }
}

/// Format a query result as an ASCII table for diagnostic output
pub fn format_as_table(result: &QueryResult) -> String {
    if result.is_empty() {
        return "(0 rows)".to_string();
    }

    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.len()).collect();

    let cell = |row: &QueryRow, col: &str| -> String {
        match row.get(col).unwrap_or(&serde_json::Value::Null) {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => "null".to_string(),
            other => other.to_string(),
        }
    };

    for row in &result.rows {
        for (i, col) in result.columns.iter().enumerate() {
            widths[i] = widths[i].max(cell(row, col).len());
        }
    }

    let mut output = String::new();

    let header: Vec<String> = result
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{:width$}", c, width = widths[i]))
        .collect();
    output.push_str(&header.join(" | "));
    output.push('\n');

    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    output.push_str(&separator.join("-+-"));
    output.push('\n');

    for row in &result.rows {
        let values: Vec<String> = result
            .columns
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{:width$}", cell(row, col), width = widths[i]))
            .collect();
        output.push_str(&values.join(" | "));
        output.push('\n');
    }

    output.push_str(&format!("({} rows)", result.row_count()));
    output
}
