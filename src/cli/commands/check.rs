//! Data-quality report command

use std::path::PathBuf;

use crate::cli::error::CliError;
use crate::database::{Connector, QueryResult, format_as_table};
use crate::quality::QualityChecker;

/// Check command arguments
#[derive(Debug, Clone)]
pub struct CheckArgs {
    /// Configuration file path
    pub config: PathBuf,
}

/// Report data-quality problems in the sales staging tables
///
/// Reporting only: the exit status does not depend on the problem count.
pub fn handle_check(args: &CheckArgs) -> Result<(), CliError> {
    let (config, base_dir) = super::load_config(&args.config)?;
    let rt = super::runtime()?;

    rt.block_on(async {
        let connector = Connector::new(config.clone(), &base_dir);
        let backend = connector.connect().await?;

        let checker =
            QualityChecker::new(backend.as_ref(), config.pipeline.quality_example_limit);
        let report = checker.check().await?;

        if !report.has_problems() {
            println!("No problem rows in the sales staging tables");
        } else {
            println!("Problem rows found: {}", report.total);
            println!("  invalid quantity: {}", report.bad_quantity);
            println!("  invalid amount:   {}", report.bad_price);
            println!("  amount too large: {}", report.oversized_price);
            println!("  invalid date:     {}", report.bad_date);

            let examples = checker.examples().await?;
            if !examples.is_empty() {
                let columns = ["product_code", "sale_date", "quantity", "sale_amount", "problem"];
                let result = QueryResult::new(
                    columns.iter().map(|c| c.to_string()).collect(),
                    examples
                        .iter()
                        .map(|e| {
                            serde_json::json!({
                                "product_code": e.product_code,
                                "sale_date": e.sale_date,
                                "quantity": e.quantity,
                                "sale_amount": e.sale_amount,
                                "problem": e.problem,
                            })
                        })
                        .collect(),
                );
                println!("Examples:");
                println!("{}", format_as_table(&result));
            }
        }

        backend.close().await.map_err(CliError::from)
    })
}
