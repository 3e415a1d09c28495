//! CSV staging layer
//!
//! Loads the source CSV files into their staging tables. Every value is
//! staged as text with an appended load timestamp; parsing and validation
//! are deferred to the server-side load procedures. One run is one
//! transaction: a failure in any file rolls back every staged insert.

pub mod csv;

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::database::DatabaseBackend;
use crate::pipeline::EtlError;

pub use csv::{CsvError, CsvTable};

/// Column appended to every staging row with the load wall-clock time
pub const LOAD_TS_COLUMN: &str = "load_ts";

/// One source-file-to-table mapping with its column allowlist
#[derive(Debug, Clone)]
pub struct FileMapping {
    /// CSV file name inside the dataset directory
    pub file_name: &'static str,
    /// Destination staging table
    pub table: &'static str,
    /// Columns read from the CSV, in staging-table order
    pub columns: &'static [&'static str],
}

/// Customer master file
pub const CUSTOMER_COLUMNS: &[&str] = &[
    "customer_code",
    "business_name",
    "phone",
    "email",
    "address",
    "city",
    "region",
    "postal_code",
];

/// Product catalog file
pub const PRODUCT_COLUMNS: &[&str] = &[
    "product_code",
    "description",
    "category",
    "brand",
    "cost_price",
    "list_price",
];

/// Store master file
pub const STORE_COLUMNS: &[&str] = &[
    "store_code",
    "description",
    "address",
    "city",
    "region",
    "postal_code",
    "store_type",
];

/// Sales transaction files (main period and additional period)
pub const SALES_COLUMNS: &[&str] = &[
    "sale_date",
    "product_code",
    "product_name",
    "quantity",
    "sale_amount",
    "customer_code",
    "customer_name",
    "store_code",
    "store_name",
];

/// The fixed retail source-file mappings
pub fn default_mappings() -> Vec<FileMapping> {
    vec![
        FileMapping {
            file_name: "customers.csv",
            table: "stg_customers",
            columns: CUSTOMER_COLUMNS,
        },
        FileMapping {
            file_name: "products.csv",
            table: "stg_products",
            columns: PRODUCT_COLUMNS,
        },
        FileMapping {
            file_name: "stores.csv",
            table: "stg_stores",
            columns: STORE_COLUMNS,
        },
        FileMapping {
            file_name: "sales.csv",
            table: "stg_sales",
            columns: SALES_COLUMNS,
        },
        FileMapping {
            file_name: "sales_add.csv",
            table: "stg_sales_add",
            columns: SALES_COLUMNS,
        },
    ]
}

/// Outcome of one staging run
#[derive(Debug, Clone, Default)]
pub struct StagingReport {
    /// (file name, rows staged) per loaded file
    pub files_loaded: Vec<(String, usize)>,
    /// Files that were absent and skipped
    pub files_skipped: Vec<String>,
}

impl StagingReport {
    /// Total rows staged across all files
    pub fn total_rows(&self) -> usize {
        self.files_loaded.iter().map(|(_, n)| n).sum()
    }
}

/// Stages CSV files into their staging tables
pub struct CsvStager<'a> {
    backend: &'a dyn DatabaseBackend,
    dataset_dir: PathBuf,
    mappings: Vec<FileMapping>,
}

impl<'a> CsvStager<'a> {
    /// Create a stager over the default retail mappings
    pub fn new(backend: &'a dyn DatabaseBackend, dataset_dir: impl AsRef<Path>) -> Self {
        Self {
            backend,
            dataset_dir: dataset_dir.as_ref().to_path_buf(),
            mappings: default_mappings(),
        }
    }

    /// Replace the mappings (used by tests)
    pub fn with_mappings(mut self, mappings: Vec<FileMapping>) -> Self {
        self.mappings = mappings;
        self
    }

    /// Stage every mapped file inside one transaction
    ///
    /// Absent files are skipped with a warning. Any other failure rolls back
    /// all inserts staged so far and aborts the remaining files.
    pub async fn stage_all(&self) -> Result<StagingReport, EtlError> {
        self.backend.begin().await?;

        match self.stage_inner().await {
            Ok(report) => {
                self.backend.commit().await?;
                info!(
                    files = report.files_loaded.len(),
                    rows = report.total_rows(),
                    "staging committed"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "staging failed, rolling back all files");
                self.backend.rollback().await?;
                Err(e)
            }
        }
    }

    async fn stage_inner(&self) -> Result<StagingReport, EtlError> {
        let mut report = StagingReport::default();
        let load_ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        for mapping in &self.mappings {
            let csv_path = self.dataset_dir.join(mapping.file_name);

            if !csv_path.exists() {
                warn!(file = mapping.file_name, "source file not found, skipping");
                report.files_skipped.push(mapping.file_name.to_string());
                continue;
            }

            let allowlist: Vec<String> = mapping.columns.iter().map(|c| c.to_string()).collect();
            let table = CsvTable::read(&csv_path).map_err(EtlError::from)?;
            let mut rows = table.project(&allowlist).map_err(EtlError::from)?;

            for row in &mut rows {
                row.push(load_ts.clone());
            }

            let mut insert_columns = allowlist;
            insert_columns.push(LOAD_TS_COLUMN.to_string());

            self.backend.truncate_table(mapping.table).await?;
            let inserted = self
                .backend
                .insert_rows(mapping.table, &insert_columns, &rows)
                .await?;

            info!(
                file = mapping.file_name,
                table = mapping.table,
                rows = inserted,
                "file staged"
            );
            report
                .files_loaded
                .push((mapping.file_name.to_string(), inserted as usize));
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mappings_cover_all_files() {
        let mappings = default_mappings();
        assert_eq!(mappings.len(), 5);
        let files: Vec<_> = mappings.iter().map(|m| m.file_name).collect();
        assert!(files.contains(&"sales.csv"));
        assert!(files.contains(&"sales_add.csv"));
        // Both sales files share one schema
        assert_eq!(mappings[3].columns, mappings[4].columns);
    }

    #[test]
    fn test_report_total_rows() {
        let report = StagingReport {
            files_loaded: vec![("a.csv".to_string(), 10), ("b.csv".to_string(), 5)],
            files_skipped: vec![],
        };
        assert_eq!(report.total_rows(), 15);
    }
}
