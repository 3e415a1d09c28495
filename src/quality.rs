//! Data-quality checks over the sales staging tables
//!
//! Counts rows whose quantity, amount, or date would not survive the typed
//! integration load. The server-side `sp_check_sales_quality` procedure is
//! preferred; when it is not installed an equivalent inline aggregate runs
//! instead. The resulting count gates the load but never blocks it
//! programmatically; the caller applies its own policy.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::database::{DatabaseBackend, DatabaseError, DatabaseResult, SqlDialect};

/// Server-side check returning the fixed-order five-count row
pub const CHECK_PROCEDURE: &str = "sp_check_sales_quality";

/// Server-side procedure returning labeled example problem rows
pub const EXAMPLES_PROCEDURE: &str = "sp_sales_quality_examples";

/// Largest amount the integration layer accepts (DECIMAL(16,2) headroom)
pub const MAX_SALE_AMOUNT: &str = "99999999999999.99";

/// Problem counts over the combined sales staging tables
///
/// Field order matches the procedure's wire contract: total, bad quantity,
/// bad price, oversized price, bad date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReport {
    pub total: i64,
    pub bad_quantity: i64,
    pub bad_price: i64,
    pub oversized_price: i64,
    pub bad_date: i64,
}

impl QualityReport {
    /// Whether any problem row was found
    pub fn has_problems(&self) -> bool {
        self.total > 0
    }
}

/// One offending staging row with a human-readable problem label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemExample {
    pub product_code: String,
    pub sale_date: String,
    pub quantity: String,
    pub sale_amount: String,
    pub problem: String,
}

/// Runs the data-quality check against a backend
pub struct QualityChecker<'a> {
    backend: &'a dyn DatabaseBackend,
    example_limit: usize,
}

impl<'a> QualityChecker<'a> {
    pub fn new(backend: &'a dyn DatabaseBackend, example_limit: usize) -> Self {
        Self {
            backend,
            example_limit,
        }
    }

    /// Count problem rows, preferring the server-side check procedure
    pub async fn check(&self) -> DatabaseResult<QualityReport> {
        match self.backend.call_procedure(CHECK_PROCEDURE).await {
            Ok(result) if !result.is_empty() => Ok(QualityReport {
                total: result.first_row_i64(0),
                bad_quantity: result.first_row_i64(1),
                bad_price: result.first_row_i64(2),
                oversized_price: result.first_row_i64(3),
                bad_date: result.first_row_i64(4),
            }),
            Ok(_) => {
                warn!("quality procedure returned no rows, using inline check");
                self.check_fallback().await
            }
            Err(DatabaseError::ProcedureMissing(_)) => {
                debug!("quality procedure not installed, using inline check");
                self.check_fallback().await
            }
            Err(DatabaseError::ProcedureFailed { message, .. }) => {
                warn!(error = %message, "quality procedure failed, using inline check");
                self.check_fallback().await
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch a bounded sample of offending rows with problem labels
    ///
    /// Returns an empty list when the check reports no problems.
    pub async fn examples(&self) -> DatabaseResult<Vec<ProblemExample>> {
        let result = match self.backend.call_procedure(EXAMPLES_PROCEDURE).await {
            Ok(result) => result,
            Err(DatabaseError::ProcedureMissing(_))
            | Err(DatabaseError::ProcedureFailed { .. }) => {
                self.backend.query(&self.examples_fallback_sql()).await?
            }
            Err(e) => return Err(e),
        };

        let examples = result
            .rows
            .iter()
            .take(self.example_limit)
            .map(|row| {
                let text = |key: &str| -> String {
                    match row.get(key) {
                        Some(serde_json::Value::String(s)) => s.clone(),
                        Some(serde_json::Value::Null) | None => String::new(),
                        Some(other) => other.to_string(),
                    }
                };
                ProblemExample {
                    product_code: text("product_code"),
                    sale_date: text("sale_date"),
                    quantity: text("quantity"),
                    sale_amount: text("sale_amount"),
                    problem: text("problem"),
                }
            })
            .collect();

        Ok(examples)
    }

    async fn check_fallback(&self) -> DatabaseResult<QualityReport> {
        let result = self.backend.query(&self.check_fallback_sql()).await?;
        Ok(QualityReport {
            total: result.first_row_i64(0),
            bad_quantity: result.first_row_i64(1),
            bad_price: result.first_row_i64(2),
            oversized_price: result.first_row_i64(3),
            bad_date: result.first_row_i64(4),
        })
    }

    fn check_fallback_sql(&self) -> String {
        match self.backend.dialect() {
            SqlDialect::DuckDb => format!(
                r#"
SELECT
    COALESCE(SUM(CASE WHEN TRY_CAST(quantity AS INTEGER) IS NULL
        OR TRY_CAST(sale_amount AS DECIMAL(30,10)) IS NULL
        OR TRY_CAST(sale_amount AS DECIMAL(30,10)) > {max}
        OR TRY_CAST(sale_date AS TIMESTAMP) IS NULL THEN 1 ELSE 0 END), 0) AS total,
    COALESCE(SUM(CASE WHEN TRY_CAST(quantity AS INTEGER) IS NULL THEN 1 ELSE 0 END), 0) AS bad_quantity,
    COALESCE(SUM(CASE WHEN TRY_CAST(sale_amount AS DECIMAL(30,10)) IS NULL THEN 1 ELSE 0 END), 0) AS bad_price,
    COALESCE(SUM(CASE WHEN TRY_CAST(sale_amount AS DECIMAL(30,10)) > {max} THEN 1 ELSE 0 END), 0) AS oversized_price,
    COALESCE(SUM(CASE WHEN TRY_CAST(sale_date AS TIMESTAMP) IS NULL THEN 1 ELSE 0 END), 0) AS bad_date
FROM (SELECT * FROM stg_sales UNION ALL SELECT * FROM stg_sales_add) AS sales
"#,
                max = MAX_SALE_AMOUNT
            ),
            // No TRY_CAST in PostgreSQL: format-level checks are the
            // conservative equivalent for text staging columns
            // SUM yields NUMERIC in PostgreSQL; cast to BIGINT so the counts
            // read back as integers
            SqlDialect::Postgres => format!(
                r#"
SELECT
    CAST(COALESCE(SUM(CASE WHEN {bad_qty} OR {bad_amt} OR {big_amt} OR {bad_date} THEN 1 ELSE 0 END), 0) AS BIGINT) AS total,
    CAST(COALESCE(SUM(CASE WHEN {bad_qty} THEN 1 ELSE 0 END), 0) AS BIGINT) AS bad_quantity,
    CAST(COALESCE(SUM(CASE WHEN {bad_amt} THEN 1 ELSE 0 END), 0) AS BIGINT) AS bad_price,
    CAST(COALESCE(SUM(CASE WHEN {big_amt} THEN 1 ELSE 0 END), 0) AS BIGINT) AS oversized_price,
    CAST(COALESCE(SUM(CASE WHEN {bad_date} THEN 1 ELSE 0 END), 0) AS BIGINT) AS bad_date
FROM (SELECT * FROM stg_sales UNION ALL SELECT * FROM stg_sales_add) AS sales
"#,
                bad_qty = PG_BAD_QUANTITY,
                bad_amt = PG_BAD_AMOUNT,
                big_amt = PG_OVERSIZED_AMOUNT,
                bad_date = PG_BAD_DATE
            ),
        }
    }

    fn examples_fallback_sql(&self) -> String {
        match self.backend.dialect() {
            SqlDialect::DuckDb => format!(
                r#"
SELECT product_code, sale_date, quantity, sale_amount,
    CASE
        WHEN TRY_CAST(quantity AS INTEGER) IS NULL THEN 'invalid quantity'
        WHEN TRY_CAST(sale_amount AS DECIMAL(30,10)) IS NULL THEN 'invalid amount'
        WHEN TRY_CAST(sale_amount AS DECIMAL(30,10)) > {max} THEN 'amount too large'
        ELSE 'invalid date'
    END AS problem
FROM (SELECT * FROM stg_sales UNION ALL SELECT * FROM stg_sales_add) AS sales
WHERE TRY_CAST(quantity AS INTEGER) IS NULL
    OR TRY_CAST(sale_amount AS DECIMAL(30,10)) IS NULL
    OR TRY_CAST(sale_amount AS DECIMAL(30,10)) > {max}
    OR TRY_CAST(sale_date AS TIMESTAMP) IS NULL
LIMIT {limit}
"#,
                max = MAX_SALE_AMOUNT,
                limit = self.example_limit
            ),
            SqlDialect::Postgres => format!(
                r#"
SELECT product_code, sale_date, quantity, sale_amount,
    CASE
        WHEN {bad_qty} THEN 'invalid quantity'
        WHEN {bad_amt} THEN 'invalid amount'
        WHEN {big_amt} THEN 'amount too large'
        ELSE 'invalid date'
    END AS problem
FROM (SELECT * FROM stg_sales UNION ALL SELECT * FROM stg_sales_add) AS sales
WHERE {bad_qty} OR {bad_amt} OR {big_amt} OR {bad_date}
LIMIT {limit}
"#,
                bad_qty = PG_BAD_QUANTITY,
                bad_amt = PG_BAD_AMOUNT,
                big_amt = PG_OVERSIZED_AMOUNT,
                bad_date = PG_BAD_DATE,
                limit = self.example_limit
            ),
        }
    }
}

const PG_BAD_QUANTITY: &str = r"quantity !~ '^[+-]?[0-9]+$'";

const PG_BAD_AMOUNT: &str = r"sale_amount !~ '^[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)$'";

const PG_OVERSIZED_AMOUNT: &str = r"(CASE WHEN sale_amount ~ '^[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)$' THEN sale_amount::numeric > 99999999999999.99 ELSE false END)";

const PG_BAD_DATE: &str =
    r"sale_date !~ '^[0-9]{4}-[0-9]{2}-[0-9]{2}([ T][0-9]{2}:[0-9]{2}:[0-9]{2})?$'";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_has_problems() {
        let clean = QualityReport::default();
        assert!(!clean.has_problems());

        let dirty = QualityReport {
            total: 3,
            bad_quantity: 1,
            bad_price: 1,
            oversized_price: 0,
            bad_date: 1,
        };
        assert!(dirty.has_problems());
    }
}
