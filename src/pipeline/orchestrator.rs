//! Master orchestration of a full ETL run
//!
//! Order of operations: verify every required script file exists (fatal
//! before any side effect), execute the DDL/procedure-creation scripts
//! batch-by-batch on one connection, close it, then run the staging,
//! integration, and warehouse steps in sequence, each on a fresh connection.
//! The first step failure stops the run.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::steps::{IntegrationStep, StagingStep, WarehouseStep};
use super::{DecisionHandler, EtlError, EtlStep, StepContext, StepOutcome};
use crate::config::EtlConfig;
use crate::database::{Connector, ScriptReport, SqlScript, run_script};

/// Aggregate result of one orchestrated run
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Per-script batch reports from the DDL phase
    pub scripts: Vec<ScriptReport>,
    /// (step name, outcome) in execution order
    pub steps: Vec<(String, StepOutcome)>,
}

impl RunSummary {
    /// Total committed batches across all scripts
    pub fn batches_executed(&self) -> usize {
        self.scripts.iter().map(|r| r.executed).sum()
    }

    /// Total rolled-back batches across all scripts
    pub fn batches_failed(&self) -> usize {
        self.scripts.iter().map(|r| r.failed.len()).sum()
    }
}

/// Runs the whole pipeline in a fixed order
pub struct Orchestrator {
    config: EtlConfig,
    base_dir: PathBuf,
}

impl Orchestrator {
    /// Create an orchestrator resolving relative config paths against
    /// `base_dir`
    pub fn new(config: EtlConfig, base_dir: impl AsRef<Path>) -> Self {
        Self {
            config,
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Verify that every configured SQL script exists
    ///
    /// Runs before any database connection is opened; the error names
    /// exactly the missing files.
    pub fn verify_files(&self) -> Result<(), EtlError> {
        let mut missing = Vec::new();

        for path in self.config.sql_script_paths(&self.base_dir) {
            if path.exists() {
                info!(file = %path.display(), "found");
            } else {
                warn!(file = %path.display(), "NOT FOUND");
                missing.push(path.display().to_string());
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(EtlError::MissingFiles(missing))
        }
    }

    /// Execute the full run
    pub async fn run(&self, handler: &dyn DecisionHandler) -> Result<RunSummary, EtlError> {
        let mut summary = RunSummary::default();

        info!("verifying required files");
        self.verify_files()?;

        let connector = Connector::new(self.config.clone(), &self.base_dir);

        // DDL phase: one connection for all scripts, closed before the steps
        {
            info!("executing setup scripts");
            let backend = connector.connect().await?;

            for path in self.config.sql_script_paths(&self.base_dir) {
                let script = SqlScript::load(&path)?;
                let report = run_script(backend.as_ref(), &script).await?;
                info!(
                    script = %path.display(),
                    executed = report.executed,
                    failed = report.failed.len(),
                    "script finished"
                );
                summary.scripts.push(report);
            }

            backend.close().await?;
        }

        // ETL phase: fixed order, fresh connection per step, first failure
        // stops the run
        let steps: [&dyn EtlStep; 3] = [&StagingStep, &IntegrationStep, &WarehouseStep];
        let ctx = StepContext {
            config: &self.config,
            base_dir: &self.base_dir,
            handler,
        };

        for step in steps {
            info!(step = step.name(), "starting");
            let backend = connector.connect().await?;
            let result = step.run(&ctx, backend.as_ref()).await;
            backend.close().await?;
            drop(backend);

            match result {
                Ok(outcome) => {
                    info!(step = step.name(), outcome = %outcome.describe(), "finished");
                    summary.steps.push((step.name().to_string(), outcome));
                }
                Err(e) => {
                    warn!(step = step.name(), error = %e, "failed, stopping run");
                    return Err(e);
                }
            }
        }

        info!(
            scripts = summary.scripts.len(),
            batches = summary.batches_executed(),
            steps = summary.steps.len(),
            "orchestration completed"
        );
        Ok(summary)
    }
}
