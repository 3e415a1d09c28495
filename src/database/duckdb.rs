//! DuckDB database backend implementation
//!
//! Embedded backend used for local runs and the test suite. DuckDB has no
//! server-side procedures, so the procedure-creation script populates a
//! name-to-body registry table and `call_procedure` executes the stored body
//! inside the caller's transaction, returning the rows of a trailing SELECT.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::script::split_statements;
use super::{DatabaseBackend, DatabaseError, DatabaseResult, QueryResult, SqlDialect};

/// Table mapping procedure names to their SQL bodies
pub const PROCEDURE_REGISTRY: &str = "etl_procedures";

/// DuckDB database backend
///
/// Supports both file-based persistence and in-memory mode.
pub struct DuckDbBackend {
    /// Path to the database file (None for in-memory)
    db_path: Option<PathBuf>,
    /// DuckDB connection (wrapped in Mutex for thread safety)
    connection: Mutex<duckdb::Connection>,
}

impl DuckDbBackend {
    /// Open a file-based DuckDB database
    pub fn open(db_path: impl AsRef<Path>) -> DatabaseResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let connection = duckdb::Connection::open(&path).map_err(|e| {
            DatabaseError::ConnectionFailed(format!("Failed to open DuckDB: {}", e))
        })?;

        Ok(Self {
            db_path: Some(path),
            connection: Mutex::new(connection),
        })
    }

    /// Open an in-memory DuckDB database
    ///
    /// Useful for tests where persistence is not needed.
    pub fn in_memory() -> DatabaseResult<Self> {
        let connection = duckdb::Connection::open_in_memory().map_err(|e| {
            DatabaseError::ConnectionFailed(format!("Failed to create in-memory DuckDB: {}", e))
        })?;

        Ok(Self {
            db_path: None,
            connection: Mutex::new(connection),
        })
    }

    /// Get the database file path (None for in-memory)
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> DatabaseResult<std::sync::MutexGuard<'_, duckdb::Connection>> {
        self.connection
            .lock()
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Lock error: {}", e)))
    }

    /// Convert a DuckDB row to a JSON object keyed by column name
    fn row_to_json(row: &duckdb::Row, columns: &[String]) -> serde_json::Value {
        let mut map = serde_json::Map::new();

        for (i, col_name) in columns.iter().enumerate() {
            let value = match row.get_ref(i) {
                Ok(value_ref) => Self::value_ref_to_json(value_ref),
                Err(_) => serde_json::Value::Null,
            };
            map.insert(col_name.clone(), value);
        }

        serde_json::Value::Object(map)
    }

    fn value_ref_to_json(value: duckdb::types::ValueRef) -> serde_json::Value {
        use duckdb::types::ValueRef;

        match value {
            ValueRef::Null => serde_json::Value::Null,
            ValueRef::Boolean(b) => serde_json::Value::Bool(b),
            ValueRef::TinyInt(i) => serde_json::Value::Number(i.into()),
            ValueRef::SmallInt(i) => serde_json::Value::Number(i.into()),
            ValueRef::Int(i) => serde_json::Value::Number(i.into()),
            ValueRef::BigInt(i) => serde_json::Value::Number(i.into()),
            ValueRef::HugeInt(i) => serde_json::Value::String(i.to_string()),
            ValueRef::UTinyInt(i) => serde_json::Value::Number(i.into()),
            ValueRef::USmallInt(i) => serde_json::Value::Number(i.into()),
            ValueRef::UInt(i) => serde_json::Value::Number(i.into()),
            ValueRef::UBigInt(i) => serde_json::Value::Number(i.into()),
            ValueRef::Float(f) => serde_json::Number::from_f64(f as f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ValueRef::Double(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned().into(),
            ValueRef::Decimal(d) => serde_json::Value::String(d.to_string()),
            other => serde_json::Value::String(format!("{:?}", other)),
        }
    }

    /// Run a prepared statement and collect its rows
    fn collect_rows(
        stmt: &mut duckdb::Statement,
        params: &[&dyn duckdb::ToSql],
    ) -> DatabaseResult<QueryResult> {
        let mut result_rows = stmt
            .query(params)
            .map_err(|e| DatabaseError::QueryFailed(format!("Query failed: {}", e)))?;

        // In DuckDB 1.4+ the query must run before column metadata is available
        let column_count = result_rows.as_ref().map(|r| r.column_count()).unwrap_or(0);
        let columns: Vec<String> = (0..column_count)
            .map(|i| {
                result_rows
                    .as_ref()
                    .and_then(|r| r.column_name(i).ok())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("col{}", i))
            })
            .collect();

        let mut rows = Vec::new();
        while let Some(row) = result_rows
            .next()
            .map_err(|e| DatabaseError::QueryFailed(format!("Row fetch error: {}", e)))?
        {
            rows.push(Self::row_to_json(row, &columns));
        }

        Ok(QueryResult::new(columns, rows))
    }

    fn query_inner(&self, sql: &str, params: &[&dyn duckdb::ToSql]) -> DatabaseResult<QueryResult> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| DatabaseError::QueryFailed(format!("Prepare failed: {}", e)))?;
        Self::collect_rows(&mut stmt, params)
    }

    fn registry_exists(&self) -> DatabaseResult<bool> {
        let result = self.query_inner(
            "SELECT COUNT(*) AS n FROM information_schema.tables WHERE table_name = ?",
            &[&PROCEDURE_REGISTRY],
        )?;
        Ok(result.first_row_i64(0) > 0)
    }

    /// Look up a procedure body in the registry
    fn procedure_body(&self, name: &str) -> DatabaseResult<Option<String>> {
        if !self.registry_exists()? {
            return Ok(None);
        }

        let sql = format!("SELECT body FROM {} WHERE name = ?", PROCEDURE_REGISTRY);
        let result = self.query_inner(&sql, &[&name])?;
        Ok(result
            .rows
            .first()
            .and_then(|row| row.get("body"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()))
    }
}

#[async_trait(?Send)]
impl DatabaseBackend for DuckDbBackend {
    async fn execute(&self, sql: &str) -> DatabaseResult<u64> {
        let conn = self.lock()?;
        conn.execute(sql, [])
            .map(|n| n as u64)
            .map_err(|e| DatabaseError::QueryFailed(format!("Execute failed: {}", e)))
    }

    async fn execute_batch(&self, sql: &str) -> DatabaseResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql)
            .map_err(|e| DatabaseError::QueryFailed(format!("Batch execute failed: {}", e)))
    }

    async fn query(&self, sql: &str) -> DatabaseResult<QueryResult> {
        self.query_inner(sql, &[])
    }

    async fn query_params(
        &self,
        sql: &str,
        params: &[serde_json::Value],
    ) -> DatabaseResult<QueryResult> {
        // Bind every parameter as text; staging stores nothing else
        let string_params: Vec<String> = params
            .iter()
            .map(|p| match p {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect();
        let param_refs: Vec<&dyn duckdb::ToSql> = string_params
            .iter()
            .map(|s| s as &dyn duckdb::ToSql)
            .collect();

        self.query_inner(sql, param_refs.as_slice())
    }

    async fn begin(&self) -> DatabaseResult<()> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN TRANSACTION")
            .map_err(|e| DatabaseError::TransactionFailed(format!("BEGIN failed: {}", e)))
    }

    async fn commit(&self) -> DatabaseResult<()> {
        let conn = self.lock()?;
        conn.execute_batch("COMMIT")
            .map_err(|e| DatabaseError::TransactionFailed(format!("COMMIT failed: {}", e)))
    }

    async fn rollback(&self) -> DatabaseResult<()> {
        let conn = self.lock()?;
        conn.execute_batch("ROLLBACK")
            .map_err(|e| DatabaseError::TransactionFailed(format!("ROLLBACK failed: {}", e)))
    }

    async fn truncate_table(&self, table: &str) -> DatabaseResult<()> {
        super::validate_identifier(table)?;
        // DELETE rather than TRUNCATE: rolls back cleanly inside the staging
        // run's enclosing transaction
        self.execute(&format!("DELETE FROM {}", table)).await?;
        Ok(())
    }

    async fn insert_rows(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<String>],
    ) -> DatabaseResult<u64> {
        super::validate_identifier(table)?;
        for column in columns {
            super::validate_identifier(column)?;
        }

        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders
        );

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| DatabaseError::QueryFailed(format!("Prepare failed: {}", e)))?;

        let mut inserted = 0u64;
        for row in rows {
            if row.len() != columns.len() {
                return Err(DatabaseError::QueryFailed(format!(
                    "Row has {} values, table {} expects {}",
                    row.len(),
                    table,
                    columns.len()
                )));
            }
            let param_refs: Vec<&dyn duckdb::ToSql> =
                row.iter().map(|s| s as &dyn duckdb::ToSql).collect();
            stmt.execute(param_refs.as_slice())
                .map_err(|e| DatabaseError::QueryFailed(format!("Insert failed: {}", e)))?;
            inserted += 1;
        }

        Ok(inserted)
    }

    async fn call_procedure(&self, name: &str) -> DatabaseResult<QueryResult> {
        super::validate_identifier(name)?;

        let body = self
            .procedure_body(name)?
            .ok_or_else(|| DatabaseError::ProcedureMissing(name.to_string()))?;

        let statements = split_statements(&body);
        let mut result = QueryResult::empty();

        for (i, statement) in statements.iter().enumerate() {
            let is_last = i + 1 == statements.len();
            let is_select = statement
                .trim_start()
                .get(..6)
                .is_some_and(|s| s.eq_ignore_ascii_case("select"));

            if is_last && is_select {
                result =
                    self.query_inner(statement, &[])
                        .map_err(|e| DatabaseError::ProcedureFailed {
                            name: name.to_string(),
                            message: e.to_string(),
                        })?;
            } else {
                let conn = self.lock()?;
                conn.execute_batch(statement)
                    .map_err(|e| DatabaseError::ProcedureFailed {
                        name: name.to_string(),
                        message: e.to_string(),
                    })?;
            }
        }

        Ok(result)
    }

    async fn procedure_exists(&self, name: &str) -> DatabaseResult<bool> {
        super::validate_identifier(name)?;
        Ok(self.procedure_body(name)?.is_some())
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::DuckDb
    }

    fn backend_type(&self) -> &'static str {
        "duckdb"
    }

    async fn close(&self) -> DatabaseResult<()> {
        // Connection closes when dropped
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> DuckDbBackend {
        DuckDbBackend::in_memory().unwrap()
    }

    #[tokio::test]
    async fn test_execute_and_query() {
        let db = backend();
        db.execute_batch("CREATE TABLE t (a INTEGER, b TEXT)")
            .await
            .unwrap();
        db.execute("INSERT INTO t VALUES (1, 'one'), (2, 'two')")
            .await
            .unwrap();

        let result = db.query("SELECT a, b FROM t ORDER BY a").await.unwrap();
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.columns, vec!["a", "b"]);
        assert_eq!(result.rows[0]["b"], "one");
    }

    #[tokio::test]
    async fn test_transaction_rollback() {
        let db = backend();
        db.execute_batch("CREATE TABLE t (a INTEGER)").await.unwrap();

        db.begin().await.unwrap();
        db.execute("INSERT INTO t VALUES (1)").await.unwrap();
        db.rollback().await.unwrap();

        let result = db.query("SELECT COUNT(*) AS n FROM t").await.unwrap();
        assert_eq!(result.first_row_i64(0), 0);
    }

    #[tokio::test]
    async fn test_insert_rows_and_truncate() {
        let db = backend();
        db.execute_batch("CREATE TABLE t (a TEXT, b TEXT)")
            .await
            .unwrap();

        let columns = vec!["a".to_string(), "b".to_string()];
        let rows = vec![
            vec!["1".to_string(), "x".to_string()],
            vec!["2".to_string(), "y".to_string()],
        ];
        let inserted = db.insert_rows("t", &columns, &rows).await.unwrap();
        assert_eq!(inserted, 2);

        db.truncate_table("t").await.unwrap();
        let result = db.query("SELECT COUNT(*) AS n FROM t").await.unwrap();
        assert_eq!(result.first_row_i64(0), 0);
    }

    #[tokio::test]
    async fn test_procedure_registry() {
        let db = backend();
        assert!(!db.procedure_exists("sp_nothing").await.unwrap());

        db.execute_batch(
            "CREATE TABLE etl_procedures (name TEXT PRIMARY KEY, body TEXT NOT NULL);
             CREATE TABLE t (a INTEGER);
             INSERT INTO etl_procedures VALUES
               ('sp_fill', 'DELETE FROM t; INSERT INTO t VALUES (41), (42);'),
               ('sp_count', 'SELECT COUNT(*) AS n FROM t');",
        )
        .await
        .unwrap();

        assert!(db.procedure_exists("sp_fill").await.unwrap());

        let result = db.call_procedure("sp_fill").await.unwrap();
        assert!(result.is_empty());

        let result = db.call_procedure("sp_count").await.unwrap();
        assert_eq!(result.first_row_i64(0), 2);

        let err = db.call_procedure("sp_missing").await.unwrap_err();
        assert!(matches!(err, DatabaseError::ProcedureMissing(_)));
    }
}
