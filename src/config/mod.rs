use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

fn default_migrations_path() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_ledger_path() -> PathBuf {
    crate::ledger::default_ledger_path(Path::new(""))
}

fn default_database_path() -> PathBuf {
    PathBuf::from("migrator.db")
}

fn default_php_binary() -> PathBuf {
    PathBuf::from("php")
}

fn default_auto_rollback() -> bool {
    true
}

/// Migrator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigratorConfig {
    /// Directory holding the `YYYY-MM-DD` migration folders.
    #[serde(default = "default_migrations_path")]
    pub migrations_path: PathBuf,
    /// JSON ledger file.
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
    /// SQLite database SQL migrations run against.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Interpreter used for script migrations.
    #[serde(default = "default_php_binary")]
    pub php_binary: PathBuf,
    /// Unwind a migration's completed operations when one of them fails.
    #[serde(default = "default_auto_rollback")]
    pub auto_rollback: bool,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            migrations_path: default_migrations_path(),
            ledger_path: default_ledger_path(),
            database_path: default_database_path(),
            php_binary: default_php_binary(),
            auto_rollback: default_auto_rollback(),
        }
    }
}

/// Read the configuration file
pub fn read_config(config_path: &Path) -> Result<Option<MigratorConfig>, ConfigError> {
    if !config_path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(config_path)?;
    let config: MigratorConfig = serde_json::from_str(&content)?;
    Ok(Some(config))
}

/// Write the configuration file
pub fn write_config(config_path: &Path, config: &MigratorConfig) -> Result<(), ConfigError> {
    let content = serde_json::to_string_pretty(config)?;
    fs::write(config_path, content)?;
    Ok(())
}
