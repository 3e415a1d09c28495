//! Full pipeline run command

use std::path::PathBuf;

use crate::cli::error::CliError;
use crate::pipeline::orchestrator::Orchestrator;

/// Run command arguments
#[derive(Debug, Clone)]
pub struct RunArgs {
    /// Configuration file path
    pub config: PathBuf,
    /// Prompt on failures instead of applying policies
    pub interactive: bool,
}

/// Execute the full orchestrated run
pub fn handle_run(args: &RunArgs) -> Result<(), CliError> {
    let (config, base_dir) = super::load_config(&args.config)?;
    let handler = super::decision_handler(&config, args.interactive);
    let rt = super::runtime()?;

    let summary = rt.block_on(async {
        let orchestrator = Orchestrator::new(config, &base_dir);
        orchestrator.run(handler.as_ref()).await
    })?;

    println!("Run completed");
    println!(
        "  Scripts executed: {} ({} batches committed, {} skipped)",
        summary.scripts.len(),
        summary.batches_executed(),
        summary.batches_failed()
    );
    for (name, outcome) in &summary.steps {
        println!("  {}: {}", name, outcome.describe());
    }

    Ok(())
}
