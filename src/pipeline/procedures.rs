//! Stored-procedure sequencing
//!
//! Runs a fixed ordered list of procedures, each in its own transaction:
//! success commits immediately, failure rolls back immediately. A preflight
//! pass confirms every expected procedure exists and fails fast listing the
//! missing load-stage ones; diagnostic procedures may be absent.

use tracing::{info, warn};

use super::{DecisionHandler, EtlError, GateDecision};
use crate::database::DatabaseBackend;

/// Whether a procedure loads data or only diagnoses it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureKind {
    /// Load-stage procedure; must exist before the sequence runs
    Load,
    /// Verification/diagnostic procedure; absence is tolerated
    Diagnostic,
}

/// A named procedure in an execution sequence
#[derive(Debug, Clone, Copy)]
pub struct ProcedureSpec {
    pub name: &'static str,
    pub kind: ProcedureKind,
}

impl ProcedureSpec {
    pub const fn load(name: &'static str) -> Self {
        Self {
            name,
            kind: ProcedureKind::Load,
        }
    }

    pub const fn diagnostic(name: &'static str) -> Self {
        Self {
            name,
            kind: ProcedureKind::Diagnostic,
        }
    }
}

/// Staging-to-integration load sequence
pub const INTEGRATION_PROCEDURES: &[ProcedureSpec] = &[
    ProcedureSpec::load("sp_load_int_customers"),
    ProcedureSpec::load("sp_load_int_products"),
    ProcedureSpec::load("sp_load_int_stores"),
    ProcedureSpec::load("sp_load_int_sales"),
];

/// Diagnostic procedures expected alongside the integration loads
pub const INTEGRATION_DIAGNOSTICS: &[ProcedureSpec] = &[
    ProcedureSpec::diagnostic("sp_check_sales_quality"),
    ProcedureSpec::diagnostic("sp_sales_quality_examples"),
    ProcedureSpec::diagnostic("sp_procedure_exists"),
];

/// Warehouse load sequence: dimensions first, so the fact loader can resolve
/// their keys
pub const WAREHOUSE_PROCEDURES: &[ProcedureSpec] = &[
    ProcedureSpec::load("sp_load_dim_customer"),
    ProcedureSpec::load("sp_load_dim_product"),
    ProcedureSpec::load("sp_load_dim_store"),
    ProcedureSpec::load("sp_load_fact_sales"),
];

/// Outcome of running one procedure sequence
#[derive(Debug, Clone, Default)]
pub struct SequenceReport {
    /// Procedures that ran and committed
    pub succeeded: usize,
    /// Procedures that failed and were rolled back but tolerated
    pub failed: Vec<String>,
}

/// Executes procedure sequences with per-procedure transactions
pub struct ProcedureRunner<'a> {
    backend: &'a dyn DatabaseBackend,
    handler: &'a dyn DecisionHandler,
}

impl<'a> ProcedureRunner<'a> {
    pub fn new(backend: &'a dyn DatabaseBackend, handler: &'a dyn DecisionHandler) -> Self {
        Self { backend, handler }
    }

    /// Confirm every expected procedure exists before running anything
    ///
    /// Fails fast listing missing load-stage procedures; missing diagnostics
    /// are only logged.
    pub async fn preflight(&self, specs: &[ProcedureSpec]) -> Result<(), EtlError> {
        let mut missing = Vec::new();

        for spec in specs {
            let exists = self.backend.procedure_exists(spec.name).await?;
            if exists {
                info!(procedure = spec.name, "found");
            } else {
                warn!(procedure = spec.name, "not found");
                if spec.kind == ProcedureKind::Load {
                    missing.push(spec.name.to_string());
                }
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(EtlError::MissingProcedures(missing))
        }
    }

    /// Run a sequence in order, one transaction per procedure
    ///
    /// On failure the transaction rolls back and the decision handler picks
    /// continue or abort; abort surfaces the underlying error.
    pub async fn run_sequence(&self, specs: &[ProcedureSpec]) -> Result<SequenceReport, EtlError> {
        let mut report = SequenceReport::default();

        for (index, spec) in specs.iter().enumerate() {
            let is_last = index + 1 == specs.len();

            info!(procedure = spec.name, "executing");
            self.backend.begin().await?;

            match self.backend.call_procedure(spec.name).await {
                Ok(_) => {
                    self.backend.commit().await?;
                    info!(procedure = spec.name, "committed");
                    report.succeeded += 1;
                }
                Err(e) => {
                    self.backend.rollback().await?;
                    warn!(procedure = spec.name, error = %e, "failed, rolled back");

                    match self.handler.on_procedure_failure(spec.name, is_last, &e) {
                        GateDecision::Continue => {
                            report.failed.push(spec.name.to_string());
                        }
                        GateDecision::Abort => {
                            return Err(EtlError::Aborted {
                                procedure: spec.name.to_string(),
                                message: e.to_string(),
                            });
                        }
                    }
                }
            }
        }

        info!(
            succeeded = report.succeeded,
            total = specs.len(),
            "sequence finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequences_are_load_stage() {
        assert!(
            INTEGRATION_PROCEDURES
                .iter()
                .chain(WAREHOUSE_PROCEDURES)
                .all(|p| p.kind == ProcedureKind::Load)
        );
        assert!(
            INTEGRATION_DIAGNOSTICS
                .iter()
                .all(|p| p.kind == ProcedureKind::Diagnostic)
        );
    }

    #[test]
    fn test_warehouse_loads_dimensions_before_fact() {
        let fact_pos = WAREHOUSE_PROCEDURES
            .iter()
            .position(|p| p.name == "sp_load_fact_sales")
            .unwrap();
        assert_eq!(fact_pos, WAREHOUSE_PROCEDURES.len() - 1);
    }
}
