//! CLI binary entry point for retail-etl

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use retail_dw_etl::cli::commands::check::{CheckArgs, handle_check};
use retail_dw_etl::cli::commands::init::{InitArgs, handle_init};
use retail_dw_etl::cli::commands::run::{RunArgs, handle_run};
use retail_dw_etl::cli::commands::seed::{SeedArgs, handle_seed};
use retail_dw_etl::cli::commands::stage::{StageArgs, handle_stage};
use retail_dw_etl::cli::commands::step::{StepArgs, handle_integrate, handle_warehouse};
use retail_dw_etl::config::CONFIG_FILENAME;

#[derive(Parser)]
#[command(name = "retail-etl")]
#[command(about = "Retail data-warehouse ETL pipeline")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = CONFIG_FILENAME)]
    config: PathBuf,

    /// Prompt on procedure failures and data-quality findings instead of
    /// applying the configured policies
    #[arg(long, global = true)]
    interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: setup scripts, staging, integration, warehouse
    Run,
    /// Stage the source CSV files into the staging tables
    Stage,
    /// Load staging into the integration layer via stored procedures
    Integrate,
    /// Load the dimensional warehouse (dimensions, then the fact)
    Warehouse,
    /// Report data-quality problems in the sales staging tables
    Check,
    /// Write a sample configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Generate a sample dataset
    Seed {
        /// Output directory for the CSV files
        #[arg(short, long, default_value = "dataset")]
        out: PathBuf,
        /// Number of customers
        #[arg(long, default_value_t = 50)]
        customers: usize,
        /// Number of calendar days of sales
        #[arg(long, default_value_t = 60)]
        days: u32,
        /// RNG seed
        #[arg(long, default_value_t = 7)]
        seed: u64,
        /// Number of malformed sales rows to inject
        #[arg(long, default_value_t = 0)]
        dirty: usize,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run => handle_run(&RunArgs {
            config: cli.config,
            interactive: cli.interactive,
        }),
        Commands::Stage => handle_stage(&StageArgs {
            config: cli.config,
            interactive: cli.interactive,
        }),
        Commands::Integrate => handle_integrate(&StepArgs {
            config: cli.config,
            interactive: cli.interactive,
        }),
        Commands::Warehouse => handle_warehouse(&StepArgs {
            config: cli.config,
            interactive: cli.interactive,
        }),
        Commands::Check => handle_check(&CheckArgs { config: cli.config }),
        Commands::Init { force } => handle_init(&InitArgs {
            config: cli.config,
            force,
        }),
        Commands::Seed {
            out,
            customers,
            days,
            seed,
            dirty,
        } => handle_seed(&SeedArgs {
            out,
            customers,
            days,
            seed,
            dirty,
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
