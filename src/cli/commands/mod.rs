//! CLI command handlers

pub mod check;
pub mod init;
pub mod run;
pub mod seed;
pub mod stage;
pub mod step;

use std::path::{Path, PathBuf};

use crate::cli::error::CliError;
use crate::cli::interactive::InteractiveHandler;
use crate::config::EtlConfig;
use crate::pipeline::{DecisionHandler, PolicyHandler};

/// Load and validate the configuration, returning it with the directory
/// relative paths resolve against
pub(crate) fn load_config(config_path: &Path) -> Result<(EtlConfig, PathBuf), CliError> {
    let config = EtlConfig::load(config_path)?;
    let base_dir = match config_path.parent() {
        Some(parent) if parent != Path::new("") => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((config, base_dir))
}

/// Build the configured decision handler, interactive or policy-driven
pub(crate) fn decision_handler(
    config: &EtlConfig,
    interactive: bool,
) -> Box<dyn DecisionHandler> {
    let policy = PolicyHandler::from_config(config);
    if interactive {
        Box::new(InteractiveHandler::new(policy))
    } else {
        Box::new(policy)
    }
}

/// Build the runtime the async handlers block on
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CliError::IoError(format!("Failed to create runtime: {}", e)))
}
