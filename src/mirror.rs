//! Copy the normalized tables into flat document collections.
//!
//! Every table becomes a collection of the same name with one document per
//! row, keyed by column name. SQL NULL becomes JSON null, so the flat store
//! holds exactly the same facts as the normalized one.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use sqlx::Row;
use tracing::info;

use crate::context::EngineContext;

/// The ten entity and edge tables, in dependency order.
pub const ENTITY_TABLES: [&str; 10] = [
    "movies",
    "persons",
    "ratings",
    "genres",
    "titles",
    "principals",
    "characters",
    "directors",
    "writers",
    "professions",
];

#[derive(Debug, Clone, Serialize)]
pub struct MirrorCount {
    pub collection: String,
    pub documents: i64,
}

async fn table_columns(ctx: &EngineContext, table: &str) -> Result<Vec<String>> {
    ctx.require_table(table).await?;
    let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?)")
        .bind(table)
        .fetch_all(&ctx.normalized)
        .await?;
    Ok(columns)
}

fn json_object_expr(columns: &[String]) -> String {
    let pairs: Vec<String> = columns
        .iter()
        .map(|c| format!("'{}', \"{}\"", c.replace('\'', "''"), c.replace('"', "\"\"")))
        .collect();
    format!("json_object({})", pairs.join(", "))
}

/// Drop and refill one flat collection from its table.
pub async fn mirror_table(ctx: &EngineContext, table: &str) -> Result<i64> {
    let columns = table_columns(ctx, table).await?;
    let docs = &ctx.documents;
    docs.drop_collection(table).await?;
    docs.create_collection(table).await?;

    let sql = format!(
        "SELECT rowid AS rid, {} AS doc FROM \"{}\" WHERE rowid > ? ORDER BY rowid LIMIT ?",
        json_object_expr(&columns),
        table
    );
    let batch = ctx.config.rebuild.batch_size as i64;
    let mut last = i64::MIN;
    let mut copied = 0i64;
    loop {
        let rows = sqlx::query(&sql)
            .bind(last)
            .bind(batch)
            .fetch_all(&ctx.normalized)
            .await?;
        if rows.is_empty() {
            break;
        }
        let mut values = Vec::with_capacity(rows.len());
        for row in &rows {
            last = row.get("rid");
            let text: String = row.get("doc");
            values.push(serde_json::from_str::<Value>(&text)?);
        }
        copied += docs.insert_many(table, values).await? as i64;
    }
    info!(collection = table, documents = copied, "mirrored table");
    Ok(copied)
}

/// Mirror every entity table into the document store.
pub async fn mirror_flat(ctx: &EngineContext) -> Result<Vec<MirrorCount>> {
    let mut counts = Vec::with_capacity(ENTITY_TABLES.len());
    for table in ENTITY_TABLES {
        let documents = mirror_table(ctx, table).await?;
        counts.push(MirrorCount {
            collection: table.to_string(),
            documents,
        });
    }
    Ok(counts)
}

pub fn print_counts(counts: &[MirrorCount]) {
    println!("{:<16} {:>12}", "Collection", "Documents");
    println!("{}", "-".repeat(29));
    for c in counts {
        println!("{:<16} {:>12}", c.collection, c.documents);
    }
}
