//! Retail data-warehouse ETL pipeline
//!
//! Moves retail sales data from CSV flat files through staging, integration,
//! and dimensional-warehouse layers in a relational database, invoking
//! server-side stored procedures for the actual transformations.
//!
//! Provides:
//! - Configuration loading/validation (TOML + environment overrides)
//! - Database backend abstraction (embedded DuckDB, PostgreSQL)
//! - SQL script execution with batch-separator splitting
//! - CSV staging with fixed column allowlists
//! - Data-quality checks over the sales staging tables
//! - Policy-driven stored-procedure sequencing and run orchestration

pub mod config;
pub mod database;
pub mod pipeline;
pub mod quality;
pub mod staging;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export commonly used types
pub use config::{BackendType, ConfigError, EtlConfig};
pub use database::{Connector, DatabaseBackend, DatabaseError, DatabaseResult, QueryResult};
pub use pipeline::orchestrator::{Orchestrator, RunSummary};
pub use pipeline::procedures::{ProcedureKind, ProcedureRunner, ProcedureSpec};
pub use pipeline::{
    DecisionHandler, EtlError, EtlStep, FailurePolicy, GateDecision, PolicyHandler, QualityPolicy,
    StepContext, StepOutcome,
};
pub use quality::{ProblemExample, QualityChecker, QualityReport};
pub use staging::{CsvStager, FileMapping, StagingReport};
