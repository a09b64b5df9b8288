use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use cinegraph_core::error::EngineError;

use crate::config::Config;

/// Open the normalized store. The file must already exist.
///
/// Foreign keys stay off: the store may hold orphaned edge rows until
/// repair removes them.
pub async fn connect_normalized(config: &Config) -> Result<SqlitePool> {
    let path = &config.normalized.path;
    if !path.exists() {
        return Err(EngineError::configuration(format!(
            "normalized store not found at {}",
            path.display()
        ))
        .into());
    }
    let options = options_for(path)?
        .create_if_missing(false)
        .foreign_keys(false);
    open(options, config, "normalized").await
}

/// Open the document store, creating the file if needed.
pub async fn connect_documents(config: &Config) -> Result<SqlitePool> {
    let path = &config.documents.path;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = options_for(path)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
    open(options, config, "document").await
}

fn options_for(path: &Path) -> Result<SqliteConnectOptions> {
    Ok(SqliteConnectOptions::from_str(&format!(
        "sqlite:{}",
        path.display()
    ))?)
}

async fn open(options: SqliteConnectOptions, config: &Config, what: &str) -> Result<SqlitePool> {
    // One connection: operations run strictly in sequence.
    SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(config.connect.timeout_secs))
        .connect_with(options)
        .await
        .map_err(|e| {
            EngineError::configuration(format!("cannot open {} store: {}", what, e)).into()
        })
}
