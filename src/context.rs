//! Shared handles for every engine operation.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

use cinegraph_core::executor::{QueryExecutor, Representation};

use crate::config::Config;
use crate::db;
use crate::docstore::DocumentStore;
use crate::embedded::EmbeddedExecutor;
use crate::flat::FlatExecutor;
use crate::normalized::NormalizedExecutor;

/// Configuration plus open connections to both stores.
///
/// Built once by the binary (or a test) and passed by reference to repair,
/// rebuild, executors, index management and benchmarks.
pub struct EngineContext {
    pub config: Config,
    pub normalized: SqlitePool,
    pub documents: DocumentStore,
}

impl EngineContext {
    pub async fn open(config: &Config) -> Result<Self> {
        config.validate()?;
        let normalized = db::connect_normalized(config).await?;
        let documents = DocumentStore::new(db::connect_documents(config).await?);
        info!(
            normalized = %config.normalized.path.display(),
            documents = %config.documents.path.display(),
            "stores opened"
        );
        Ok(Self {
            config: config.clone(),
            normalized,
            documents,
        })
    }

    pub fn embedded_collection(&self) -> &str {
        &self.config.documents.embedded_collection
    }

    /// Fail with a configuration error unless `table` exists in the
    /// normalized store.
    pub async fn require_table(&self, table: &str) -> Result<()> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_optional(&self.normalized)
                .await?;
        if found.is_none() {
            anyhow::bail!(cinegraph_core::error::EngineError::missing("table", table));
        }
        Ok(())
    }

    pub fn flat(&self) -> FlatExecutor {
        FlatExecutor::new(self.documents.clone())
    }

    pub fn embedded(&self) -> EmbeddedExecutor {
        EmbeddedExecutor::new(self.documents.clone(), self.embedded_collection())
    }

    pub async fn close(self) {
        self.normalized.close().await;
        self.documents.pool().close().await;
    }
}

/// Select the executor for one representation.
pub fn executor_for(ctx: &EngineContext, repr: Representation) -> Box<dyn QueryExecutor> {
    match repr {
        Representation::Normalized => Box::new(NormalizedExecutor::new(ctx.normalized.clone())),
        Representation::Flat => Box::new(ctx.flat()),
        Representation::Embedded => Box::new(ctx.embedded()),
    }
}
