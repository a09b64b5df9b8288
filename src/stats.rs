//! Store statistics overview.
//!
//! Prints row counts for every normalized table, document counts for the
//! flat and embedded collections, and the storage footprint of both
//! databases. Used by `cine stats` to confirm that repair, mirror and
//! rebuild left the stores in the expected shape.

use anyhow::Result;
use serde::Serialize;

use cinegraph_core::error::{engine_error, EngineError};

use crate::context::EngineContext;
use crate::docstore::{database_bytes, Filter};
use crate::mirror::ENTITY_TABLES;

#[derive(Debug, Clone, Serialize)]
pub struct EntityCount {
    pub entity: String,
    /// `None` when the table does not exist.
    pub normalized: Option<i64>,
    /// `None` when the flat collection does not exist.
    pub flat: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub entities: Vec<EntityCount>,
    pub embedded_collection: String,
    pub embedded_documents: Option<i64>,
    pub normalized_bytes: i64,
    pub documents_bytes: i64,
}

async fn table_count(ctx: &EngineContext, table: &str) -> Result<Option<i64>> {
    match ctx.require_table(table).await {
        Ok(()) => {}
        Err(e) if matches!(engine_error(&e), Some(EngineError::Configuration(_))) => return Ok(None),
        Err(e) => return Err(e),
    }
    let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{}\"", table))
        .fetch_one(&ctx.normalized)
        .await?;
    Ok(Some(n))
}

async fn collection_count(ctx: &EngineContext, collection: &str) -> Result<Option<i64>> {
    if !ctx.documents.collection_exists(collection).await? {
        return Ok(None);
    }
    Ok(Some(ctx.documents.count(collection, &Filter::All).await?))
}

pub async fn collect_stats(ctx: &EngineContext) -> Result<StoreStats> {
    let mut entities = Vec::with_capacity(ENTITY_TABLES.len());
    for table in ENTITY_TABLES {
        entities.push(EntityCount {
            entity: table.to_string(),
            normalized: table_count(ctx, table).await?,
            flat: collection_count(ctx, table).await?,
        });
    }
    Ok(StoreStats {
        entities,
        embedded_collection: ctx.embedded_collection().to_string(),
        embedded_documents: collection_count(ctx, ctx.embedded_collection()).await?,
        normalized_bytes: database_bytes(&ctx.normalized).await?,
        documents_bytes: ctx.documents.storage_bytes().await?,
    })
}

/// Run the stats command: query both stores and print a summary.
pub async fn run_stats(ctx: &EngineContext) -> Result<()> {
    let stats = collect_stats(ctx).await?;
    let config = &ctx.config;

    println!("Cinegraph Store Stats");
    println!("=====================");
    println!();
    println!("  Normalized:  {}", config.normalized.path.display());
    println!("  Size:        {}", format_bytes(stats.normalized_bytes));
    println!("  Documents:   {}", config.documents.path.display());
    println!("  Size:        {}", format_bytes(stats.documents_bytes));
    println!();
    println!("  {:<14} {:>12} {:>12}", "ENTITY", "NORMALIZED", "FLAT");
    println!("  {}", "-".repeat(40));
    for e in &stats.entities {
        println!(
            "  {:<14} {:>12} {:>12}",
            e.entity,
            count_cell(e.normalized),
            count_cell(e.flat)
        );
    }
    println!();
    println!(
        "  Embedded ({}): {}",
        stats.embedded_collection,
        count_cell(stats.embedded_documents)
    );
    println!();
    Ok(())
}

fn count_cell(n: Option<i64>) -> String {
    match n {
        Some(n) => n.to_string(),
        None => "missing".to_string(),
    }
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: i64) -> String {
    let b = bytes.unsigned_abs();
    let sign = if bytes < 0 { "-" } else { "" };
    if b < 1024 {
        format!("{}{} B", sign, b)
    } else if b < 1024 * 1024 {
        format!("{}{:.1} KB", sign, b as f64 / 1024.0)
    } else if b < 1024 * 1024 * 1024 {
        format!("{}{:.1} MB", sign, b as f64 / (1024.0 * 1024.0))
    } else {
        format!("{}{:.2} GB", sign, b as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn missing_table_counts_as_absent_but_failures_propagate() {
        let tmp = tempfile::TempDir::new().unwrap();
        let normalized = tmp.path().join("empty.sqlite");
        std::fs::write(&normalized, b"").unwrap();
        let config = Config::with_paths(&normalized, tmp.path().join("docs.sqlite"));
        let ctx = EngineContext::open(&config).await.unwrap();

        assert_eq!(table_count(&ctx, "movies").await.unwrap(), None);

        ctx.normalized.close().await;
        let err = table_count(&ctx, "movies").await.unwrap_err();
        assert!(engine_error(&err).is_none(), "{:#}", err);
    }

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(-3 * 1024 * 1024), "-3.0 MB");
    }
}
