//! Integration and warehouse load commands
//!
//! Each runs a single pipeline step on its own connection, mirroring how a
//! full run executes them.

use std::path::PathBuf;

use crate::cli::error::CliError;
use crate::database::Connector;
use crate::pipeline::steps::{IntegrationStep, WarehouseStep};
use crate::pipeline::{EtlStep, StepContext};

/// Single-step command arguments
#[derive(Debug, Clone)]
pub struct StepArgs {
    /// Configuration file path
    pub config: PathBuf,
    /// Prompt on failures instead of applying policies
    pub interactive: bool,
}

/// Load staging into the integration layer
pub fn handle_integrate(args: &StepArgs) -> Result<(), CliError> {
    run_step(args, &IntegrationStep)
}

/// Load the dimensional warehouse
pub fn handle_warehouse(args: &StepArgs) -> Result<(), CliError> {
    run_step(args, &WarehouseStep)
}

fn run_step(args: &StepArgs, step: &dyn EtlStep) -> Result<(), CliError> {
    let (config, base_dir) = super::load_config(&args.config)?;
    let handler = super::decision_handler(&config, args.interactive);
    let rt = super::runtime()?;

    let outcome = rt.block_on(async {
        let connector = Connector::new(config.clone(), &base_dir);
        let backend = connector.connect().await?;

        let ctx = StepContext {
            config: &config,
            base_dir: &base_dir,
            handler: handler.as_ref(),
        };
        let outcome = step.run(&ctx, backend.as_ref()).await?;
        backend.close().await.map_err(CliError::from)?;
        Ok::<_, CliError>(outcome)
    })?;

    println!("{}: {}", step.name(), outcome.describe());
    Ok(())
}
