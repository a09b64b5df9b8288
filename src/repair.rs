//! Orphan repair for the normalized store.
//!
//! Each [`RepairRule`] names a child edge column and the parent key it
//! must reference. A child row is orphaned when its foreign key is not
//! null and no parent row carries that key. Repair deletes orphaned rows
//! rule by rule; a second run finds nothing left to delete.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use cinegraph_core::error::EngineError;

use crate::context::EngineContext;

/// One child-column → parent-key reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairRule {
    pub child_table: &'static str,
    pub child_column: &'static str,
    pub parent_table: &'static str,
    pub parent_column: &'static str,
}

const fn rule(
    child_table: &'static str,
    child_column: &'static str,
    parent_table: &'static str,
    parent_column: &'static str,
) -> RepairRule {
    RepairRule {
        child_table,
        child_column,
        parent_table,
        parent_column,
    }
}

/// Every edge foreign key of the normalized schema.
pub const REPAIR_RULES: [RepairRule; 12] = [
    rule("writers", "person_id", "persons", "person_id"),
    rule("directors", "person_id", "persons", "person_id"),
    rule("principals", "person_id", "persons", "person_id"),
    rule("characters", "person_id", "persons", "person_id"),
    rule("professions", "person_id", "persons", "person_id"),
    rule("ratings", "movie_id", "movies", "movie_id"),
    rule("characters", "movie_id", "movies", "movie_id"),
    rule("titles", "movie_id", "movies", "movie_id"),
    rule("genres", "movie_id", "movies", "movie_id"),
    rule("principals", "movie_id", "movies", "movie_id"),
    rule("directors", "movie_id", "movies", "movie_id"),
    rule("writers", "movie_id", "movies", "movie_id"),
];

impl RepairRule {
    pub fn label(&self) -> String {
        format!(
            "{}.{} -> {}.{}",
            self.child_table, self.child_column, self.parent_table, self.parent_column
        )
    }

    fn orphan_predicate(&self) -> String {
        format!(
            "\"{c}\".\"{cc}\" IS NOT NULL AND NOT EXISTS (SELECT 1 FROM \"{p}\" WHERE \"{p}\".\"{pc}\" = \"{c}\".\"{cc}\")",
            c = self.child_table,
            cc = self.child_column,
            p = self.parent_table,
            pc = self.parent_column
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepairOutcome {
    pub rule: String,
    pub orphans: i64,
    pub deleted: i64,
}

async fn require_column(pool: &SqlitePool, table: &str, column: &str) -> Result<()> {
    let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?)")
        .bind(table)
        .fetch_all(pool)
        .await?;
    if columns.is_empty() {
        anyhow::bail!(EngineError::missing("table", table));
    }
    if !columns.iter().any(|c| c == column) {
        anyhow::bail!(EngineError::configuration(format!(
            "column '{}.{}' does not exist",
            table, column
        )));
    }
    Ok(())
}

/// Check that every table and column the rules touch exists.
pub async fn validate_schema(pool: &SqlitePool) -> Result<()> {
    for r in REPAIR_RULES.iter() {
        require_column(pool, r.child_table, r.child_column).await?;
        require_column(pool, r.parent_table, r.parent_column).await?;
    }
    Ok(())
}

async fn count_orphans(pool: &SqlitePool, r: &RepairRule) -> Result<i64> {
    let n: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM \"{}\" WHERE {}",
        r.child_table,
        r.orphan_predicate()
    ))
    .fetch_one(pool)
    .await?;
    Ok(n)
}

/// Delete orphaned edge rows, rule by rule.
///
/// The schema is validated before any row is touched, so a missing table
/// or column leaves the store unchanged.
pub async fn repair_orphans(ctx: &EngineContext) -> Result<Vec<RepairOutcome>> {
    let pool = &ctx.normalized;
    validate_schema(pool).await?;

    let mut outcomes = Vec::with_capacity(REPAIR_RULES.len());
    for r in REPAIR_RULES.iter() {
        let mut tx = pool.begin().await?;
        let orphans: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM \"{}\" WHERE {}",
            r.child_table,
            r.orphan_predicate()
        ))
        .fetch_one(&mut *tx)
        .await?;
        let deleted = if orphans > 0 {
            sqlx::query(&format!(
                "DELETE FROM \"{}\" WHERE {}",
                r.child_table,
                r.orphan_predicate()
            ))
            .execute(&mut *tx)
            .await?
            .rows_affected() as i64
        } else {
            0
        };
        tx.commit().await?;

        if deleted > 0 {
            info!(rule = %r.label(), orphans, deleted, "removed orphaned rows");
        }
        outcomes.push(RepairOutcome {
            rule: r.label(),
            orphans,
            deleted,
        });
    }
    Ok(outcomes)
}

/// Count orphans without deleting anything.
///
/// Fails with [`EngineError::Integrity`] naming the first rule that has
/// orphaned rows.
pub async fn check_integrity(ctx: &EngineContext) -> Result<Vec<RepairOutcome>> {
    let pool = &ctx.normalized;
    validate_schema(pool).await?;

    let mut outcomes = Vec::with_capacity(REPAIR_RULES.len());
    for r in REPAIR_RULES.iter() {
        let orphans = count_orphans(pool, r).await?;
        if orphans > 0 {
            warn!(rule = %r.label(), orphans, "orphaned rows present");
            anyhow::bail!(EngineError::Integrity {
                rule: r.label(),
                orphans,
            });
        }
        outcomes.push(RepairOutcome {
            rule: r.label(),
            orphans,
            deleted: 0,
        });
    }
    Ok(outcomes)
}

pub fn print_report(outcomes: &[RepairOutcome]) {
    println!("{:<40} {:>10} {:>10}", "Rule", "Orphans", "Deleted");
    println!("{}", "-".repeat(62));
    for o in outcomes {
        println!("{:<40} {:>10} {:>10}", o.rule, o.orphans, o.deleted);
    }
    let total: i64 = outcomes.iter().map(|o| o.deleted).sum();
    println!();
    println!("Total deleted: {}", total);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_cover_every_edge_table() {
        for table in [
            "ratings",
            "genres",
            "titles",
            "principals",
            "characters",
            "directors",
            "writers",
        ] {
            assert!(REPAIR_RULES
                .iter()
                .any(|r| r.child_table == table && r.parent_table == "movies"));
        }
        assert_eq!(
            REPAIR_RULES.iter().filter(|r| r.parent_table == "persons").count(),
            5
        );
    }

    #[test]
    fn predicate_guards_null_keys() {
        let p = REPAIR_RULES[0].orphan_predicate();
        assert!(p.starts_with("\"writers\".\"person_id\" IS NOT NULL"));
        assert!(p.contains("NOT EXISTS"));
    }
}
