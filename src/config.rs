//! ETL configuration file support
//!
//! Handles parsing of `etl.toml` configuration files and environment
//! variable overrides. Validation runs before any database or file I/O and
//! reports every missing required key at once.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::pipeline::{FailurePolicy, QualityPolicy};

/// Default configuration filename
pub const CONFIG_FILENAME: &str = "etl.toml";

/// Default database filename for DuckDB
pub const DEFAULT_DUCKDB_FILENAME: &str = "retail-dw.duckdb";

/// Default directory holding the source CSV files
pub const DEFAULT_DATASET_DIR: &str = "dataset";

/// Default driver label reported in connection logs
pub const DEFAULT_DRIVER: &str = "ODBC Driver 17 for SQL Server";

/// Environment variable for database backend
pub const ENV_BACKEND: &str = "RETAIL_ETL_BACKEND";

/// Environment variable for DuckDB path
pub const ENV_DUCKDB_PATH: &str = "RETAIL_ETL_DUCKDB_PATH";

/// Environment variable for the database server address
pub const ENV_SERVER: &str = "RETAIL_ETL_SERVER";

/// Environment variable for the database name
pub const ENV_DATABASE: &str = "RETAIL_ETL_DATABASE";

/// Environment variable for the dataset directory
pub const ENV_DATASET_DIR: &str = "RETAIL_ETL_DATASET_DIR";

/// Error type for configuration handling
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration: {0}")]
    ReadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required configuration keys: {}", .0.join(", "))]
    MissingKeys(Vec<String>),

    #[error("Failed to serialize configuration: {0}")]
    SerializationError(String),
}

/// Database backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// DuckDB embedded database (default)
    #[default]
    DuckDb,
    /// PostgreSQL database
    Postgres,
}

impl std::str::FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "duckdb" => Ok(BackendType::DuckDb),
            "postgres" | "postgresql" => Ok(BackendType::Postgres),
            _ => Err(format!(
                "Unknown database backend: {}. Use 'duckdb' or 'postgres'.",
                s
            )),
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::DuckDb => write!(f, "duckdb"),
            BackendType::Postgres => write!(f, "postgres"),
        }
    }
}

/// Database configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// Database backend type
    #[serde(default)]
    pub backend: BackendType,

    /// Path to the DuckDB database file (relative to the working directory)
    #[serde(default = "default_duckdb_path")]
    pub path: String,
}

fn default_duckdb_path() -> String {
    DEFAULT_DUCKDB_FILENAME.to_string()
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            backend: BackendType::default(),
            path: default_duckdb_path(),
        }
    }
}

/// PostgreSQL connection section
///
/// `server`, `database`, and `trusted_connection` are required whenever the
/// backend is `postgres`; `user` and `password` are required only when
/// `trusted_connection` is false.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostgresSection {
    /// Server address, e.g. "localhost" or "db.internal:5432"
    #[serde(default)]
    pub server: Option<String>,

    /// Database name
    #[serde(default)]
    pub database: Option<String>,

    /// Use OS-level (peer/trusted) authentication instead of credentials
    #[serde(default)]
    pub trusted_connection: Option<bool>,

    /// Login user (credential mode only)
    #[serde(default)]
    pub user: Option<String>,

    /// Login password (credential mode only)
    #[serde(default)]
    pub password: Option<String>,

    /// Driver label, reported in connection logs
    #[serde(default = "default_driver")]
    pub driver: String,
}

fn default_driver() -> String {
    DEFAULT_DRIVER.to_string()
}

/// Pipeline configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Ordered list of DDL / procedure-creation scripts executed before the
    /// ETL steps
    #[serde(default = "default_sql_scripts")]
    pub sql_scripts: Vec<String>,

    /// Directory holding the source CSV files
    #[serde(default = "default_dataset_dir")]
    pub dataset_dir: String,

    /// What to do when a stored procedure in a load sequence fails
    #[serde(default)]
    pub on_procedure_failure: FailurePolicy,

    /// What to do when the data-quality check reports problems
    #[serde(default)]
    pub on_quality_problems: QualityPolicy,

    /// Maximum number of example problem rows to fetch
    #[serde(default = "default_example_limit")]
    pub quality_example_limit: usize,
}

fn default_sql_scripts() -> Vec<String> {
    vec![
        "sql/staging.sql".to_string(),
        "sql/integration.sql".to_string(),
        "sql/warehouse.sql".to_string(),
        "sql/procedures.sql".to_string(),
    ]
}

fn default_dataset_dir() -> String {
    DEFAULT_DATASET_DIR.to_string()
}

fn default_example_limit() -> usize {
    5
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            sql_scripts: default_sql_scripts(),
            dataset_dir: default_dataset_dir(),
            on_procedure_failure: FailurePolicy::default(),
            on_quality_problems: QualityPolicy::default(),
            quality_example_limit: default_example_limit(),
        }
    }
}

/// Main configuration structure
///
/// Represents the `etl.toml` configuration file format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EtlConfig {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseSection,

    /// PostgreSQL-specific configuration
    #[serde(default)]
    pub postgres: PostgresSection,

    /// Pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineSection,
}

impl EtlConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a DuckDB configuration
    pub fn duckdb(path: impl Into<String>) -> Self {
        Self {
            database: DatabaseSection {
                backend: BackendType::DuckDb,
                path: path.into(),
            },
            ..Default::default()
        }
    }

    /// Load and validate configuration from a file path
    ///
    /// Missing file or missing required keys fail here, before any database
    /// or dataset I/O has happened.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::FileNotFound(config_path.to_path_buf()));
        }

        let content = std::fs::read_to_string(config_path)
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let mut config = Self::parse(&content)?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a file path
    pub fn save(&self, config_path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml()?;
        std::fs::write(config_path, content).map_err(|e| ConfigError::ReadError(e.to_string()))
    }

    /// Convert configuration to a TOML string
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializationError(e.to_string()))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(backend) = std::env::var(ENV_BACKEND)
            && let Ok(backend_type) = backend.parse()
        {
            self.database.backend = backend_type;
        }

        if let Ok(path) = std::env::var(ENV_DUCKDB_PATH) {
            self.database.path = path;
        }

        if let Ok(server) = std::env::var(ENV_SERVER) {
            self.postgres.server = Some(server);
        }

        if let Ok(database) = std::env::var(ENV_DATABASE) {
            self.postgres.database = Some(database);
        }

        if let Ok(dir) = std::env::var(ENV_DATASET_DIR) {
            self.pipeline.dataset_dir = dir;
        }
    }

    /// Validate that every key required by the selected backend is present
    ///
    /// All missing keys are reported together rather than one at a time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();

        match self.database.backend {
            BackendType::DuckDb => {
                if self.database.path.trim().is_empty() {
                    missing.push("database.path".to_string());
                }
            }
            BackendType::Postgres => {
                if self
                    .postgres
                    .server
                    .as_deref()
                    .is_none_or(|s| s.trim().is_empty())
                {
                    missing.push("postgres.server".to_string());
                }
                if self
                    .postgres
                    .database
                    .as_deref()
                    .is_none_or(|s| s.trim().is_empty())
                {
                    missing.push("postgres.database".to_string());
                }
                match self.postgres.trusted_connection {
                    None => missing.push("postgres.trusted_connection".to_string()),
                    Some(false) => {
                        if self.postgres.user.as_deref().is_none_or(str::is_empty) {
                            missing.push("postgres.user".to_string());
                        }
                        if self.postgres.password.as_deref().is_none_or(str::is_empty) {
                            missing.push("postgres.password".to_string());
                        }
                    }
                    Some(true) => {}
                }
            }
        }

        if self.pipeline.sql_scripts.is_empty() {
            missing.push("pipeline.sql_scripts".to_string());
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingKeys(missing))
        }
    }

    /// Resolve the DuckDB database path against a base directory
    pub fn duckdb_path(&self, base_dir: &Path) -> PathBuf {
        if Path::new(&self.database.path).is_absolute() {
            PathBuf::from(&self.database.path)
        } else {
            base_dir.join(&self.database.path)
        }
    }

    /// Resolve the dataset directory against a base directory
    pub fn dataset_dir(&self, base_dir: &Path) -> PathBuf {
        if Path::new(&self.pipeline.dataset_dir).is_absolute() {
            PathBuf::from(&self.pipeline.dataset_dir)
        } else {
            base_dir.join(&self.pipeline.dataset_dir)
        }
    }

    /// Resolve the configured SQL script paths against a base directory
    pub fn sql_script_paths(&self, base_dir: &Path) -> Vec<PathBuf> {
        self.pipeline
            .sql_scripts
            .iter()
            .map(|s| {
                if Path::new(s).is_absolute() {
                    PathBuf::from(s)
                } else {
                    base_dir.join(s)
                }
            })
            .collect()
    }

    /// Build a PostgreSQL connection string from the configured keys
    ///
    /// Only valid after `validate()` has passed for the postgres backend.
    pub fn postgres_connection_string(&self) -> String {
        let server = self.postgres.server.as_deref().unwrap_or_default();
        let (host, port) = match server.rsplit_once(':') {
            Some((h, p)) if p.chars().all(|c| c.is_ascii_digit()) => (h, p),
            _ => (server, "5432"),
        };
        let database = self.postgres.database.as_deref().unwrap_or_default();

        let mut conn = format!("host={} port={} dbname={}", host, port, database);
        if self.postgres.trusted_connection == Some(false) {
            if let Some(user) = &self.postgres.user {
                conn.push_str(&format!(" user={}", user));
            }
            if let Some(password) = &self.postgres.password {
                conn.push_str(&format!(" password={}", password));
            }
        }
        conn
    }
}

/// Generate a sample configuration file content
pub fn sample_config() -> &'static str {
    r#"# Retail DW ETL configuration

[database]
# Database backend: "duckdb" (default) or "postgres"
backend = "duckdb"

# Path to the DuckDB database file (relative to the working directory)
path = "retail-dw.duckdb"

# PostgreSQL connection (used when backend = "postgres")
[postgres]
# server = "localhost:5432"
# database = "retail_dw"
# trusted_connection = true
# user = "etl"
# password = "secret"

[pipeline]
# DDL / procedure-creation scripts, executed in order before the ETL steps
sql_scripts = [
    "sql/staging.sql",
    "sql/integration.sql",
    "sql/warehouse.sql",
    "sql/procedures.sql",
]

# Directory holding the source CSV files
dataset_dir = "dataset"

# Procedure failure policy: "abort", "continue", or "continue_except_last"
on_procedure_failure = "continue_except_last"

# Data-quality gate: "continue", "abort", or "prompt"
on_quality_problems = "abort"

# Maximum number of example problem rows to show
quality_example_limit = 5
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = EtlConfig::new();
        assert_eq!(config.database.backend, BackendType::DuckDb);
        assert_eq!(config.database.path, DEFAULT_DUCKDB_FILENAME);
        assert_eq!(config.pipeline.sql_scripts.len(), 4);
        assert_eq!(config.pipeline.quality_example_limit, 5);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[database]
backend = "duckdb"
path = "custom.duckdb"

[pipeline]
dataset_dir = "data"
on_procedure_failure = "abort"
"#;
        let config = EtlConfig::parse(toml).unwrap();
        assert_eq!(config.database.backend, BackendType::DuckDb);
        assert_eq!(config.database.path, "custom.duckdb");
        assert_eq!(config.pipeline.dataset_dir, "data");
        assert_eq!(config.pipeline.on_procedure_failure, FailurePolicy::Abort);
    }

    #[test]
    fn test_valid_config_accepted() {
        let toml = r#"
[database]
backend = "postgres"

[postgres]
server = "localhost"
database = "retail_dw"
trusted_connection = true
"#;
        let config = EtlConfig::parse(toml).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_postgres_keys_reported_together() {
        let toml = r#"
[database]
backend = "postgres"
"#;
        let config = EtlConfig::parse(toml).unwrap();
        let err = config.validate().unwrap_err();
        match err {
            ConfigError::MissingKeys(keys) => {
                assert!(keys.contains(&"postgres.server".to_string()));
                assert!(keys.contains(&"postgres.database".to_string()));
                assert!(keys.contains(&"postgres.trusted_connection".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_credential_mode_requires_user_and_password() {
        let toml = r#"
[database]
backend = "postgres"

[postgres]
server = "localhost"
database = "retail_dw"
trusted_connection = false
"#;
        let config = EtlConfig::parse(toml).unwrap();
        let err = config.validate().unwrap_err();
        match err {
            ConfigError::MissingKeys(keys) => {
                assert_eq!(keys, vec!["postgres.user", "postgres.password"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = tempdir().unwrap();
        let err = EtlConfig::load(&dir.path().join("etl.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        let config = EtlConfig::duckdb("my-dw.duckdb");

        config.save(&path).unwrap();
        let loaded = EtlConfig::load(&path).unwrap();
        assert_eq!(loaded.database.path, "my-dw.duckdb");
    }

    #[test]
    fn test_backend_type_from_str() {
        assert_eq!("duckdb".parse::<BackendType>().unwrap(), BackendType::DuckDb);
        assert_eq!(
            "postgres".parse::<BackendType>().unwrap(),
            BackendType::Postgres
        );
        assert_eq!(
            "postgresql".parse::<BackendType>().unwrap(),
            BackendType::Postgres
        );
        assert!("invalid".parse::<BackendType>().is_err());
    }

    #[test]
    fn test_postgres_connection_string() {
        let toml = r#"
[database]
backend = "postgres"

[postgres]
server = "db.internal:6432"
database = "retail_dw"
trusted_connection = false
user = "etl"
password = "secret"
"#;
        let config = EtlConfig::parse(toml).unwrap();
        assert_eq!(
            config.postgres_connection_string(),
            "host=db.internal port=6432 dbname=retail_dw user=etl password=secret"
        );
    }

    #[test]
    fn test_sample_config_is_valid() {
        let sample = sample_config();
        let config = EtlConfig::parse(sample).unwrap();
        assert!(config.validate().is_ok());
    }
}
