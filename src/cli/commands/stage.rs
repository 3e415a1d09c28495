//! CSV staging command

use std::path::PathBuf;

use crate::cli::error::CliError;
use crate::database::Connector;
use crate::pipeline::steps::StagingStep;
use crate::pipeline::{EtlStep, StepContext};

/// Stage command arguments
#[derive(Debug, Clone)]
pub struct StageArgs {
    /// Configuration file path
    pub config: PathBuf,
    /// Prompt on failures instead of applying policies
    pub interactive: bool,
}

/// Stage the source CSV files into the staging tables
pub fn handle_stage(args: &StageArgs) -> Result<(), CliError> {
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
        let outcome = StagingStep.run(&ctx, backend.as_ref()).await?;
        backend.close().await.map_err(CliError::from)?;
        Ok::<_, CliError>(outcome)
    })?;

    println!("{}: {}", StagingStep.name(), outcome.describe());
    Ok(())
}
