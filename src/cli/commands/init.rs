//! Configuration bootstrap command

use std::path::PathBuf;

use crate::cli::error::CliError;
use crate::config::sample_config;

/// Init command arguments
#[derive(Debug, Clone)]
pub struct InitArgs {
    /// Where to write the configuration file
    pub config: PathBuf,
    /// Overwrite an existing file
    pub force: bool,
}

/// Write a sample configuration file
pub fn handle_init(args: &InitArgs) -> Result<(), CliError> {
    if args.config.exists() && !args.force {
        return Err(CliError::InvalidArgument(format!(
            "{} already exists, use --force to overwrite",
            args.config.display()
        )));
    }

    std::fs::write(&args.config, sample_config())
        .map_err(|e| CliError::FileWriteError(args.config.clone(), e.to_string()))?;

    println!("Wrote {}", args.config.display());
    println!("Edit the [database] section, then run 'retail-etl run'.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_refuses_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etl.toml");

        let args = InitArgs {
            config: path.clone(),
            force: false,
        };
        handle_init(&args).unwrap();
        assert!(path.exists());

        assert!(matches!(
            handle_init(&args),
            Err(CliError::InvalidArgument(_))
        ));
        assert!(
            handle_init(&InitArgs {
                config: path,
                force: true
            })
            .is_ok()
        );
    }
}
