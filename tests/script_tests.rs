//! SQL script execution integration tests against an in-memory DuckDB
#![cfg(feature = "duckdb-backend")]

use retail_dw_etl::database::{DatabaseBackend, DuckDbBackend, SqlScript, run_script};

#[tokio::test]
async fn test_failing_batch_is_skipped_not_fatal() {
    let backend = DuckDbBackend::in_memory().unwrap();
    let script = SqlScript::from_text(
        "setup.sql",
        "CREATE TABLE a (x INTEGER);\n\
         GO\n\
         INSERT INTO no_such_table VALUES (1);\n\
         GO\n\
         INSERT INTO a VALUES (1);\n\
         GO\n",
    );

    let report = run_script(&backend, &script).await.unwrap();

    assert_eq!(report.executed, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, 2);

    // The batch after the failure still ran and committed
    let count = backend
        .query("SELECT COUNT(*) FROM a")
        .await
        .unwrap()
        .first_row_i64(0);
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_failing_batch_rolls_back_its_own_writes() {
    let backend = DuckDbBackend::in_memory().unwrap();
    backend
        .execute_batch("CREATE TABLE a (x INTEGER)")
        .await
        .unwrap();

    // Second statement of the batch fails; the first must not survive
    let script = SqlScript::from_text(
        "partial.sql",
        "INSERT INTO a VALUES (1);\nINSERT INTO no_such_table VALUES (1);\n",
    );
    let report = run_script(&backend, &script).await.unwrap();

    assert_eq!(report.executed, 0);
    assert_eq!(report.failed.len(), 1);

    let count = backend
        .query("SELECT COUNT(*) FROM a")
        .await
        .unwrap()
        .first_row_i64(0);
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_idempotent_ddl_reruns_cleanly() {
    let backend = DuckDbBackend::in_memory().unwrap();
    let script = SqlScript::from_text(
        "ddl.sql",
        "CREATE TABLE IF NOT EXISTS a (x INTEGER);\nGO\nCREATE TABLE IF NOT EXISTS b (y TEXT);\nGO\n",
    );

    for _ in 0..2 {
        let report = run_script(&backend, &script).await.unwrap();
        assert_eq!(report.executed, 2);
        assert!(report.failed.is_empty());
    }
}
