//! The three ETL stages, in the order the orchestrator runs them

use async_trait::async_trait;
use tracing::{info, warn};

use super::procedures::{
    INTEGRATION_DIAGNOSTICS, INTEGRATION_PROCEDURES, ProcedureRunner, WAREHOUSE_PROCEDURES,
};
use super::{EtlError, EtlStep, GateDecision, StepContext, StepOutcome};
use crate::database::DatabaseBackend;
use crate::quality::QualityChecker;
use crate::staging::CsvStager;

/// Stage the source CSV files into the staging tables
pub struct StagingStep;

#[async_trait(?Send)]
impl EtlStep for StagingStep {
    fn name(&self) -> &'static str {
        "stage-csv"
    }

    async fn run(
        &self,
        ctx: &StepContext<'_>,
        backend: &dyn DatabaseBackend,
    ) -> Result<StepOutcome, EtlError> {
        let dataset_dir = ctx.config.dataset_dir(ctx.base_dir);

        if !dataset_dir.exists() {
            return Ok(StepOutcome::Skipped(format!(
                "dataset directory not found: {}",
                dataset_dir.display()
            )));
        }

        let stager = CsvStager::new(backend, &dataset_dir);
        let report = stager.stage_all().await?;

        for (file, rows) in &report.files_loaded {
            info!(file, rows, "staged");
        }

        if report.files_skipped.is_empty() {
            Ok(StepOutcome::Completed)
        } else {
            Ok(StepOutcome::CompletedWithWarnings(
                report
                    .files_skipped
                    .iter()
                    .map(|f| format!("{} not found, table left untouched", f))
                    .collect(),
            ))
        }
    }
}

/// Load staging into the integration layer via stored procedures, gated by
/// the data-quality check
pub struct IntegrationStep;

#[async_trait(?Send)]
impl EtlStep for IntegrationStep {
    fn name(&self) -> &'static str {
        "load-integration"
    }

    async fn run(
        &self,
        ctx: &StepContext<'_>,
        backend: &dyn DatabaseBackend,
    ) -> Result<StepOutcome, EtlError> {
        let runner = ProcedureRunner::new(backend, ctx.handler);

        let expected: Vec<_> = INTEGRATION_PROCEDURES
            .iter()
            .chain(INTEGRATION_DIAGNOSTICS)
            .copied()
            .collect();
        runner.preflight(&expected).await?;

        let checker = QualityChecker::new(backend, ctx.config.pipeline.quality_example_limit);
        let report = checker.check().await?;
        let mut warnings = Vec::new();

        if report.has_problems() {
            let examples = checker.examples().await?;
            warn!(
                total = report.total,
                bad_quantity = report.bad_quantity,
                bad_price = report.bad_price,
                oversized_price = report.oversized_price,
                bad_date = report.bad_date,
                "problem rows in the sales staging tables"
            );
            for example in &examples {
                warn!(
                    product = %example.product_code,
                    date = %example.sale_date,
                    quantity = %example.quantity,
                    amount = %example.sale_amount,
                    problem = %example.problem,
                    "example"
                );
            }

            match ctx.handler.on_quality_problems(&report, &examples) {
                GateDecision::Continue => {
                    warnings.push(format!(
                        "proceeded past {} data-quality problem(s)",
                        report.total
                    ));
                }
                GateDecision::Abort => {
                    return Err(EtlError::QualityRejected {
                        problems: report.total,
                    });
                }
            }
        } else {
            info!("no problem rows in the sales staging tables");
        }

        let sequence = runner.run_sequence(INTEGRATION_PROCEDURES).await?;
        warnings.extend(sequence.failed.iter().map(|p| format!("{} failed", p)));

        if warnings.is_empty() {
            Ok(StepOutcome::Completed)
        } else {
            Ok(StepOutcome::CompletedWithWarnings(warnings))
        }
    }
}

/// Load the warehouse: dimension procedures first, then the fact procedure
pub struct WarehouseStep;

#[async_trait(?Send)]
impl EtlStep for WarehouseStep {
    fn name(&self) -> &'static str {
        "load-warehouse"
    }

    async fn run(
        &self,
        ctx: &StepContext<'_>,
        backend: &dyn DatabaseBackend,
    ) -> Result<StepOutcome, EtlError> {
        let runner = ProcedureRunner::new(backend, ctx.handler);

        runner.preflight(WAREHOUSE_PROCEDURES).await?;
        let sequence = runner.run_sequence(WAREHOUSE_PROCEDURES).await?;

        if sequence.failed.is_empty() {
            Ok(StepOutcome::Completed)
        } else {
            Ok(StepOutcome::CompletedWithWarnings(
                sequence.failed.iter().map(|p| format!("{} failed", p)).collect(),
            ))
        }
    }
}
