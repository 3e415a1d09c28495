//! Interactive decision handler for attended runs
//!
//! Restores the continue/abort prompts for operators at a terminal. If a
//! prompt cannot be shown (closed stdin, dumb terminal) the configured
//! policies decide instead.

use dialoguer::Confirm;
use tracing::warn;

use crate::database::DatabaseError;
use crate::pipeline::{DecisionHandler, GateDecision, PolicyHandler};
use crate::quality::{ProblemExample, QualityReport};

/// Prompts the operator at each gate, falling back to policy on prompt errors
pub struct InteractiveHandler {
    fallback: PolicyHandler,
}

impl InteractiveHandler {
    pub fn new(fallback: PolicyHandler) -> Self {
        Self { fallback }
    }

    fn confirm(&self, prompt: &str) -> Option<bool> {
        match Confirm::new().with_prompt(prompt).default(false).interact() {
            Ok(answer) => Some(answer),
            Err(e) => {
                warn!(error = %e, "prompt unavailable, falling back to configured policy");
                None
            }
        }
    }
}

impl DecisionHandler for InteractiveHandler {
    fn on_procedure_failure(
        &self,
        procedure: &str,
        is_last: bool,
        error: &DatabaseError,
    ) -> GateDecision {
        if is_last {
            println!("  Last procedure {} failed, continuing: {}", procedure, error);
            return GateDecision::Continue;
        }

        println!("  ERROR in {}: {}", procedure, error);
        match self.confirm("Continue with the remaining procedures?") {
            Some(true) => GateDecision::Continue,
            Some(false) => GateDecision::Abort,
            None => self
                .fallback
                .on_procedure_failure(procedure, is_last, error),
        }
    }

    fn on_quality_problems(
        &self,
        report: &QualityReport,
        examples: &[ProblemExample],
    ) -> GateDecision {
        println!("  Problem rows found: {}", report.total);
        println!("    invalid quantity: {}", report.bad_quantity);
        println!("    invalid amount:   {}", report.bad_price);
        println!("    amount too large: {}", report.oversized_price);
        println!("    invalid date:     {}", report.bad_date);
        if !examples.is_empty() {
            println!("  Examples:");
            for example in examples {
                println!(
                    "    - {}: date='{}', quantity='{}', amount='{}' ({})",
                    example.product_code,
                    example.sale_date,
                    example.quantity,
                    example.sale_amount,
                    example.problem
                );
            }
        }

        match self.confirm("Proceed with the load anyway?") {
            Some(true) => GateDecision::Continue,
            Some(false) => GateDecision::Abort,
            None => self.fallback.on_quality_problems(report, examples),
        }
    }
}
