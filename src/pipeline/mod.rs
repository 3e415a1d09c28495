//! ETL step abstraction and run policies
//!
//! ETL stages run in-process behind a shared step interface instead of as
//! child processes, and the continue/abort decisions that used to be
//! interactive prompts are supplied as policies at invocation time. An
//! interactive handler can still be plugged in for attended runs.

pub mod orchestrator;
pub mod procedures;
pub mod steps;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::config::{ConfigError, EtlConfig};
use crate::database::{DatabaseBackend, DatabaseError};
use crate::quality::{ProblemExample, QualityReport};
use crate::staging::CsvError;

/// Error type for pipeline execution
///
/// Fatal conditions are errors; recoverable conditions surface as
/// [`StepOutcome`] variants so callers can apply policy without parsing
/// error text.
#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Required script/configuration files absent; raised before any side
    /// effect
    #[error("Missing required files: {}", .0.join(", "))]
    MissingFiles(Vec<String>),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Csv(#[from] CsvError),

    /// Load-stage procedures absent from the database; raised by preflight
    #[error("Missing load procedures: {}", .0.join(", "))]
    MissingProcedures(Vec<String>),

    /// A procedure failed and the policy or operator chose to abort
    #[error("Run aborted after {procedure} failed: {message}")]
    Aborted { procedure: String, message: String },

    /// The quality gate stopped the load
    #[error("Load cancelled: {problems} data-quality problem(s) in the sales staging tables")]
    QualityRejected { problems: i64 },
}

/// How a step finished when it did not fail outright
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    /// Everything ran
    Completed,
    /// The step ran but parts of it were tolerated failures or skips
    CompletedWithWarnings(Vec<String>),
    /// The step had nothing to do and was skipped entirely
    Skipped(String),
}

impl StepOutcome {
    /// One-line description for the run log
    pub fn describe(&self) -> String {
        match self {
            StepOutcome::Completed => "completed".to_string(),
            StepOutcome::CompletedWithWarnings(warnings) => {
                format!("completed with warnings: {}", warnings.join("; "))
            }
            StepOutcome::Skipped(reason) => format!("skipped: {}", reason),
        }
    }
}

/// What to do when a procedure in a load sequence fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Any failure aborts the run
    Abort,
    /// Failures are logged and the sequence continues
    Continue,
    /// Failures abort the run, except the last procedure in the sequence,
    /// whose failure is logged and tolerated
    #[default]
    ContinueExceptLast,
}

/// What to do when the data-quality check finds problems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPolicy {
    /// Proceed with the load, logging the findings
    Continue,
    /// Stop before the load
    #[default]
    Abort,
    /// Ask the operator (interactive runs only; unattended runs abort)
    Prompt,
}

/// A continue/abort decision at a gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Continue,
    Abort,
}

/// Supplies gate decisions during a run
///
/// The policy-driven implementation serves unattended runs; the CLI swaps in
/// a prompting implementation for attended ones.
pub trait DecisionHandler {
    /// A procedure in a load sequence failed
    fn on_procedure_failure(
        &self,
        procedure: &str,
        is_last: bool,
        error: &DatabaseError,
    ) -> GateDecision;

    /// The quality check reported problems
    fn on_quality_problems(
        &self,
        report: &QualityReport,
        examples: &[ProblemExample],
    ) -> GateDecision;
}

/// Decision handler driven purely by configured policies
#[derive(Debug, Clone, Copy)]
pub struct PolicyHandler {
    pub on_failure: FailurePolicy,
    pub on_quality: QualityPolicy,
}

impl PolicyHandler {
    /// Build from the pipeline configuration section
    pub fn from_config(config: &EtlConfig) -> Self {
        Self {
            on_failure: config.pipeline.on_procedure_failure,
            on_quality: config.pipeline.on_quality_problems,
        }
    }
}

impl DecisionHandler for PolicyHandler {
    fn on_procedure_failure(
        &self,
        _procedure: &str,
        is_last: bool,
        _error: &DatabaseError,
    ) -> GateDecision {
        match self.on_failure {
            FailurePolicy::Abort => GateDecision::Abort,
            FailurePolicy::Continue => GateDecision::Continue,
            FailurePolicy::ContinueExceptLast => {
                if is_last {
                    GateDecision::Continue
                } else {
                    GateDecision::Abort
                }
            }
        }
    }

    fn on_quality_problems(
        &self,
        _report: &QualityReport,
        _examples: &[ProblemExample],
    ) -> GateDecision {
        match self.on_quality {
            QualityPolicy::Continue => GateDecision::Continue,
            QualityPolicy::Abort => GateDecision::Abort,
            QualityPolicy::Prompt => {
                warn!("quality policy is 'prompt' but the run is unattended, aborting");
                GateDecision::Abort
            }
        }
    }
}

/// Shared context passed to each step
pub struct StepContext<'a> {
    pub config: &'a EtlConfig,
    /// Directory that relative config paths resolve against
    pub base_dir: &'a Path,
    pub handler: &'a dyn DecisionHandler,
}

/// One ETL stage, run in-process on its own connection
#[async_trait(?Send)]
pub trait EtlStep {
    /// Stage name for logs and the run summary
    fn name(&self) -> &'static str;

    /// Run the stage to completion or failure
    async fn run(
        &self,
        ctx: &StepContext<'_>,
        backend: &dyn DatabaseBackend,
    ) -> Result<StepOutcome, EtlError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_error() -> DatabaseError {
        DatabaseError::ProcedureFailed {
            name: "sp_x".to_string(),
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_policy_abort() {
        let handler = PolicyHandler {
            on_failure: FailurePolicy::Abort,
            on_quality: QualityPolicy::Abort,
        };
        assert_eq!(
            handler.on_procedure_failure("sp_x", false, &db_error()),
            GateDecision::Abort
        );
        assert_eq!(
            handler.on_procedure_failure("sp_x", true, &db_error()),
            GateDecision::Abort
        );
    }

    #[test]
    fn test_policy_continue() {
        let handler = PolicyHandler {
            on_failure: FailurePolicy::Continue,
            on_quality: QualityPolicy::Continue,
        };
        assert_eq!(
            handler.on_procedure_failure("sp_x", false, &db_error()),
            GateDecision::Continue
        );
    }

    #[test]
    fn test_policy_continue_except_last_tolerates_only_terminal() {
        let handler = PolicyHandler {
            on_failure: FailurePolicy::ContinueExceptLast,
            on_quality: QualityPolicy::Abort,
        };
        assert_eq!(
            handler.on_procedure_failure("sp_x", false, &db_error()),
            GateDecision::Abort
        );
        assert_eq!(
            handler.on_procedure_failure("sp_x", true, &db_error()),
            GateDecision::Continue
        );
    }

    #[test]
    fn test_prompt_policy_aborts_unattended() {
        let handler = PolicyHandler {
            on_failure: FailurePolicy::ContinueExceptLast,
            on_quality: QualityPolicy::Prompt,
        };
        assert_eq!(
            handler.on_quality_problems(&QualityReport::default(), &[]),
            GateDecision::Abort
        );
    }

    #[test]
    fn test_policies_parse_from_config_values() {
        #[derive(serde::Deserialize)]
        struct Wrapper {
            failure: FailurePolicy,
            quality: QualityPolicy,
        }
        let w: Wrapper =
            toml::from_str("failure = \"continue_except_last\"\nquality = \"prompt\"").unwrap();
        assert_eq!(w.failure, FailurePolicy::ContinueExceptLast);
        assert_eq!(w.quality, QualityPolicy::Prompt);
    }

    #[test]
    fn test_outcome_describe() {
        assert_eq!(StepOutcome::Completed.describe(), "completed");
        assert!(
            StepOutcome::Skipped("no dataset".to_string())
                .describe()
                .contains("no dataset")
        );
    }
}
