//! Staging-layer integration tests against an in-memory DuckDB
#![cfg(feature = "duckdb-backend")]

use std::path::{Path, PathBuf};

use retail_dw_etl::database::{DatabaseBackend, DuckDbBackend, SqlScript, run_script};
use retail_dw_etl::staging::CsvStager;

fn sql_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("sql").join(name)
}

async fn backend_with_staging_tables() -> DuckDbBackend {
    let backend = DuckDbBackend::in_memory().unwrap();
    let script = SqlScript::load(sql_path("staging.sql")).unwrap();
    let report = run_script(&backend, &script).await.unwrap();
    assert!(report.failed.is_empty(), "staging DDL should not fail");
    backend
}

async fn count(backend: &DuckDbBackend, sql: &str) -> i64 {
    backend.query(sql).await.unwrap().first_row_i64(0)
}

const CUSTOMERS_CSV: &str = "\
customer_code,business_name,phone,email,address,city,region,postal_code,loyalty_tier
C001,Acme Corp 1,5550000001,c1@example.com,101 Main St,Riverton,North,1001,gold
C002,Globex Trading 2,5550000002,c2@example.com,102 Main St,Oakfield,South,1002,silver
C003,Delta Holdings 3,5550000003,c3@example.com,103 Main St,Lakeside,East,1003,bronze
";

const SALES_CSV: &str = "\
sale_date,product_code,product_name,quantity,sale_amount,customer_code,customer_name,store_code,store_name
2024-01-02 10:15:00,P001,65-inch OLED TV,1,1699.99,C001,Acme Corp 1,S01,Downtown Store 1
2024-01-03 11:20:30,P002,G-Series Smartphone,2,1599.98,C002,Globex Trading 2,S02,Outlet Store 2
";

#[tokio::test]
async fn test_staged_row_counts_match_csv_and_carry_load_ts() {
    let backend = backend_with_staging_tables().await;
    let dataset = tempfile::tempdir().unwrap();
    std::fs::write(dataset.path().join("customers.csv"), CUSTOMERS_CSV).unwrap();
    std::fs::write(dataset.path().join("sales.csv"), SALES_CSV).unwrap();

    let stager = CsvStager::new(&backend, dataset.path());
    let report = stager.stage_all().await.unwrap();

    // Header excluded; the extra loyalty_tier column is ignored
    assert_eq!(
        count(&backend, "SELECT COUNT(*) FROM stg_customers").await,
        3
    );
    assert_eq!(count(&backend, "SELECT COUNT(*) FROM stg_sales").await, 2);
    assert_eq!(report.total_rows(), 5);

    // Every staged row carries a non-empty load timestamp
    assert_eq!(
        count(
            &backend,
            "SELECT COUNT(*) FROM stg_customers WHERE load_ts IS NULL OR load_ts = ''"
        )
        .await,
        0
    );
    assert_eq!(
        count(
            &backend,
            "SELECT COUNT(*) FROM stg_sales WHERE load_ts IS NULL OR load_ts = ''"
        )
        .await,
        0
    );

    // Absent files were skipped, not fatal
    assert_eq!(report.files_skipped.len(), 3);
    assert!(report.files_skipped.contains(&"products.csv".to_string()));
}

#[tokio::test]
async fn test_absent_file_leaves_table_untouched() {
    let backend = backend_with_staging_tables().await;
    backend
        .execute(
            "INSERT INTO stg_products (product_code, load_ts) VALUES ('P999', '2024-01-01 00:00:00')",
        )
        .await
        .unwrap();

    let dataset = tempfile::tempdir().unwrap();
    std::fs::write(dataset.path().join("customers.csv"), CUSTOMERS_CSV).unwrap();

    let stager = CsvStager::new(&backend, dataset.path());
    let report = stager.stage_all().await.unwrap();

    // products.csv was absent: no truncate, the old row survives, and the
    // run still staged the files that were present
    assert_eq!(
        count(&backend, "SELECT COUNT(*) FROM stg_products").await,
        1
    );
    assert_eq!(
        count(&backend, "SELECT COUNT(*) FROM stg_customers").await,
        3
    );
    assert!(report.files_skipped.contains(&"products.csv".to_string()));
}

#[tokio::test]
async fn test_missing_required_column_rolls_back_whole_run() {
    let backend = backend_with_staging_tables().await;
    let dataset = tempfile::tempdir().unwrap();
    std::fs::write(dataset.path().join("customers.csv"), CUSTOMERS_CSV).unwrap();
    // sales.csv lacks quantity and sale_amount
    std::fs::write(
        dataset.path().join("sales.csv"),
        "sale_date,product_code\n2024-01-02,P001\n",
    )
    .unwrap();

    let stager = CsvStager::new(&backend, dataset.path());
    let err = stager.stage_all().await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("quantity"), "error was: {message}");

    // Customers were staged before the failure, then rolled back with it
    assert_eq!(
        count(&backend, "SELECT COUNT(*) FROM stg_customers").await,
        0
    );
}

#[tokio::test]
async fn test_restaging_replaces_previous_rows() {
    let backend = backend_with_staging_tables().await;
    let dataset = tempfile::tempdir().unwrap();
    std::fs::write(dataset.path().join("customers.csv"), CUSTOMERS_CSV).unwrap();

    let stager = CsvStager::new(&backend, dataset.path());
    stager.stage_all().await.unwrap();
    stager.stage_all().await.unwrap();

    // Truncate-then-insert: staging is idempotent, not additive
    assert_eq!(
        count(&backend, "SELECT COUNT(*) FROM stg_customers").await,
        3
    );
}
