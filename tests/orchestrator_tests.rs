//! End-to-end orchestration tests: scripts, staging, integration, warehouse
#![cfg(all(feature = "duckdb-backend", feature = "cli"))]

use std::path::{Path, PathBuf};

use retail_dw_etl::cli::commands::seed::{SeedArgs, handle_seed};
use retail_dw_etl::config::EtlConfig;
use retail_dw_etl::database::{DatabaseBackend, DuckDbBackend};
use retail_dw_etl::pipeline::orchestrator::Orchestrator;
use retail_dw_etl::pipeline::{
    EtlError, FailurePolicy, PolicyHandler, QualityPolicy, StepOutcome,
};

fn sql_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("sql")
}

fn test_config(dir: &Path) -> EtlConfig {
    let mut config = EtlConfig::duckdb(dir.join("dw.duckdb").display().to_string());
    config.pipeline.sql_scripts = ["staging.sql", "integration.sql", "warehouse.sql", "procedures.sql"]
        .iter()
        .map(|name| sql_dir().join(name).display().to_string())
        .collect();
    config.pipeline.dataset_dir = dir.join("dataset").display().to_string();
    config
}

fn seed_dataset(dir: &Path, dirty: usize) {
    handle_seed(&SeedArgs {
        out: dir.join("dataset"),
        customers: 12,
        days: 15,
        seed: 99,
        dirty,
    })
    .unwrap();
}

fn handler(on_quality: QualityPolicy) -> PolicyHandler {
    PolicyHandler {
        on_failure: FailurePolicy::ContinueExceptLast,
        on_quality,
    }
}

async fn count(backend: &DuckDbBackend, sql: &str) -> i64 {
    backend.query(sql).await.unwrap().first_row_i64(0)
}

#[tokio::test]
async fn test_missing_script_fails_before_any_connection() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config
        .pipeline
        .sql_scripts
        .push(dir.path().join("no_such_script.sql").display().to_string());

    let orchestrator = Orchestrator::new(config, dir.path());
    let err = orchestrator.run(&handler(QualityPolicy::Abort)).await.unwrap_err();

    match err {
        EtlError::MissingFiles(files) => {
            assert_eq!(files.len(), 1);
            assert!(files[0].contains("no_such_script.sql"));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Failing the file check must happen before any connection is opened
    assert!(!dir.path().join("dw.duckdb").exists());
}

#[tokio::test]
async fn test_full_round_trip_resolves_warehouse_keys() {
    let dir = tempfile::tempdir().unwrap();
    seed_dataset(dir.path(), 0);
    let config = test_config(dir.path());

    let orchestrator = Orchestrator::new(config, dir.path());
    let summary = orchestrator.run(&handler(QualityPolicy::Abort)).await.unwrap();

    assert_eq!(summary.scripts.len(), 4);
    assert_eq!(summary.batches_failed(), 0);
    assert_eq!(summary.steps.len(), 3);
    for (name, outcome) in &summary.steps {
        assert_eq!(outcome, &StepOutcome::Completed, "step {name}");
    }

    let backend = DuckDbBackend::open(dir.path().join("dw.duckdb")).unwrap();

    let staged = count(
        &backend,
        "SELECT (SELECT COUNT(*) FROM stg_sales) + (SELECT COUNT(*) FROM stg_sales_add)",
    )
    .await;
    let integrated = count(&backend, "SELECT COUNT(*) FROM int_sales").await;
    let facts = count(&backend, "SELECT COUNT(*) FROM fact_sales").await;

    // Clean data: nothing is dropped anywhere along the pipeline
    assert!(staged > 0);
    assert_eq!(staged, integrated);
    assert_eq!(integrated, facts);

    // Every fact row resolves all three dimension keys
    let resolved = count(
        &backend,
        "SELECT COUNT(*) FROM fact_sales f
         JOIN dim_customer dc ON dc.customer_key = f.customer_key
         JOIN dim_product  dp ON dp.product_key = f.product_key
         JOIN dim_store    ds ON ds.store_key = f.store_key",
    )
    .await;
    assert_eq!(resolved, facts);

    assert_eq!(count(&backend, "SELECT COUNT(*) FROM dim_customer").await, 12);
    assert_eq!(count(&backend, "SELECT COUNT(*) FROM dim_store").await, 8);
}

#[tokio::test]
async fn test_dirty_data_stops_run_under_abort_policy() {
    let dir = tempfile::tempdir().unwrap();
    seed_dataset(dir.path(), 5);
    let config = test_config(dir.path());

    let orchestrator = Orchestrator::new(config, dir.path());
    let err = orchestrator.run(&handler(QualityPolicy::Abort)).await.unwrap_err();

    assert!(matches!(err, EtlError::QualityRejected { problems } if problems > 0));

    // The load never ran: staging committed, the warehouse stayed empty
    let backend = DuckDbBackend::open(dir.path().join("dw.duckdb")).unwrap();
    assert!(count(&backend, "SELECT COUNT(*) FROM stg_sales").await > 0);
    assert_eq!(count(&backend, "SELECT COUNT(*) FROM fact_sales").await, 0);
}

#[tokio::test]
async fn test_dirty_data_loads_clean_subset_under_continue_policy() {
    let dir = tempfile::tempdir().unwrap();
    seed_dataset(dir.path(), 5);
    let config = test_config(dir.path());

    let orchestrator = Orchestrator::new(config, dir.path());
    let summary = orchestrator
        .run(&handler(QualityPolicy::Continue))
        .await
        .unwrap();

    let integration = summary
        .steps
        .iter()
        .find(|(name, _)| name == "load-integration")
        .map(|(_, outcome)| outcome.clone())
        .unwrap();
    assert!(matches!(integration, StepOutcome::CompletedWithWarnings(_)));

    let backend = DuckDbBackend::open(dir.path().join("dw.duckdb")).unwrap();
    let staged = count(
        &backend,
        "SELECT (SELECT COUNT(*) FROM stg_sales) + (SELECT COUNT(*) FROM stg_sales_add)",
    )
    .await;
    let facts = count(&backend, "SELECT COUNT(*) FROM fact_sales").await;

    // Malformed rows are left behind in staging; the rest load through
    assert!(facts > 0);
    assert!(facts < staged);
}

#[tokio::test]
async fn test_missing_dataset_directory_skips_staging_step() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let orchestrator = Orchestrator::new(config, dir.path());
    let summary = orchestrator.run(&handler(QualityPolicy::Abort)).await.unwrap();

    let staging = &summary.steps[0];
    assert!(matches!(staging.1, StepOutcome::Skipped(_)));

    // Empty staging tables are clean: the rest of the pipeline still ran
    let backend = DuckDbBackend::open(dir.path().join("dw.duckdb")).unwrap();
    assert_eq!(count(&backend, "SELECT COUNT(*) FROM fact_sales").await, 0);
    assert_eq!(count(&backend, "SELECT COUNT(*) FROM dim_customer").await, 0);
}
