//! Secondary index management per representation.
//!
//! Every index this module creates is recorded in a `_managed_indexes`
//! table inside the same database. `drop` removes only recorded names, and
//! `create` never adopts an index that already existed under one of our
//! names, so indexes created by anyone else survive both operations.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use cinegraph_core::executor::Representation;

use crate::context::EngineContext;

pub const REGISTRY: &str = "_managed_indexes";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub target: String,
    pub fields: Vec<&'static str>,
}

fn def(target: &str, suffix: &str, fields: &[&'static str]) -> IndexDef {
    IndexDef {
        name: format!("idx_{}_{}", target, suffix),
        target: target.to_string(),
        fields: fields.to_vec(),
    }
}

const MOVIE_EDGES: [&str; 7] = [
    "ratings",
    "genres",
    "titles",
    "principals",
    "characters",
    "directors",
    "writers",
];
const PERSON_EDGES: [&str; 5] = ["principals", "characters", "directors", "writers", "professions"];

/// Foreign keys on every edge table, person name, genre value and the
/// composite (movie, person) indexes shared by both tabular stores.
fn edge_indexes() -> Vec<IndexDef> {
    let mut defs: Vec<IndexDef> = MOVIE_EDGES
        .iter()
        .map(|t| def(t, "movie", &["movie_id"]))
        .collect();
    defs.extend(PERSON_EDGES.iter().map(|t| def(t, "person", &["person_id"])));
    defs.push(def("principals", "movie_person", &["movie_id", "person_id"]));
    defs.push(def("characters", "movie_person", &["movie_id", "person_id"]));
    defs.push(def("persons", "name", &["name"]));
    defs.push(def("genres", "genre", &["genre"]));
    defs
}

/// The documented index set of one representation.
pub fn index_set(repr: Representation, embedded_collection: &str) -> Vec<IndexDef> {
    match repr {
        Representation::Normalized => {
            let mut defs = edge_indexes();
            defs.push(def("principals", "cat", &["category"]));
            defs.push(def("movies", "year", &["year"]));
            defs.push(def("ratings", "perf", &["average_rating", "num_votes"]));
            defs
        }
        Representation::Flat => {
            // Flat collections only carry a primary key on `_id`.
            let mut defs = vec![
                def("movies", "movie", &["movie_id"]),
                def("persons", "person", &["person_id"]),
            ];
            defs.extend(edge_indexes());
            defs
        }
        Representation::Embedded => vec![
            def(embedded_collection, "year", &["year"]),
            def(embedded_collection, "rating_average", &["rating.average"]),
            def(embedded_collection, "rating_votes", &["rating.votes"]),
        ],
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub representation: String,
    pub created: Vec<String>,
    pub already_managed: Vec<String>,
    /// Names taken by indexes we did not create; left untouched.
    pub foreign: Vec<String>,
    pub dropped: Vec<String>,
}

pub struct IndexManager<'a> {
    ctx: &'a EngineContext,
    repr: Representation,
}

impl<'a> IndexManager<'a> {
    pub fn new(ctx: &'a EngineContext, repr: Representation) -> Self {
        Self { ctx, repr }
    }

    fn pool(&self) -> &SqlitePool {
        match self.repr {
            Representation::Normalized => &self.ctx.normalized,
            Representation::Flat | Representation::Embedded => self.ctx.documents.pool(),
        }
    }

    fn defs(&self) -> Vec<IndexDef> {
        index_set(self.repr, self.ctx.embedded_collection())
    }

    async fn ensure_registry(&self) -> Result<()> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (name TEXT PRIMARY KEY, representation TEXT NOT NULL, target TEXT NOT NULL)",
            REGISTRY
        ))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn is_managed(&self, name: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT 1 FROM {} WHERE name = ? AND representation = ?",
            REGISTRY
        ))
        .bind(name)
        .bind(self.repr.as_str())
        .fetch_optional(self.pool())
        .await?;
        Ok(found.is_some())
    }

    async fn index_exists(&self, name: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?")
                .bind(name)
                .fetch_optional(self.pool())
                .await?;
        Ok(found.is_some())
    }

    async fn require_target(&self, target: &str) -> Result<()> {
        match self.repr {
            Representation::Normalized => self.ctx.require_table(target).await,
            _ => self.ctx.documents.require_collection(target).await,
        }
    }

    async fn create_one(&self, d: &IndexDef) -> Result<()> {
        match self.repr {
            Representation::Normalized => {
                let cols: Vec<String> = d.fields.iter().map(|f| format!("\"{}\"", f)).collect();
                sqlx::query(&format!(
                    "CREATE INDEX \"{}\" ON \"{}\" ({})",
                    d.name,
                    d.target,
                    cols.join(", ")
                ))
                .execute(self.pool())
                .await?;
            }
            _ => {
                self.ctx
                    .documents
                    .create_index(&d.name, &d.target, &d.fields)
                    .await?
            }
        }
        sqlx::query(&format!(
            "INSERT INTO {} (name, representation, target) VALUES (?, ?, ?)",
            REGISTRY
        ))
        .bind(&d.name)
        .bind(self.repr.as_str())
        .bind(&d.target)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Create the representation's index set. Idempotent.
    pub async fn create(&self) -> Result<IndexReport> {
        self.ensure_registry().await?;
        let defs = self.defs();
        for d in &defs {
            self.require_target(&d.target).await?;
        }

        let mut report = IndexReport {
            representation: self.repr.to_string(),
            ..Default::default()
        };
        for d in &defs {
            if self.is_managed(&d.name).await? {
                if self.index_exists(&d.name).await? {
                    report.already_managed.push(d.name.clone());
                    continue;
                }
                // Registered but gone (dropped by hand): forget and recreate.
                self.forget(&d.name).await?;
            } else if self.index_exists(&d.name).await? {
                warn!(index = %d.name, "index exists but is not managed, leaving it alone");
                report.foreign.push(d.name.clone());
                continue;
            }
            self.create_one(d).await?;
            report.created.push(d.name.clone());
        }
        info!(
            representation = %self.repr,
            created = report.created.len(),
            "indexes created"
        );
        Ok(report)
    }

    /// Whether the registry lists any index for this representation.
    pub async fn has_managed(&self) -> Result<bool> {
        self.ensure_registry().await?;
        let found: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT 1 FROM {} WHERE representation = ? LIMIT 1",
            REGISTRY
        ))
        .bind(self.repr.as_str())
        .fetch_optional(self.pool())
        .await?;
        Ok(found.is_some())
    }

    /// Recreate the index set if it was under management, e.g. after its
    /// collection was replaced. Returns `None` when nothing is managed.
    pub async fn restore(&self) -> Result<Option<IndexReport>> {
        if !self.has_managed().await? {
            return Ok(None);
        }
        self.create().await.map(Some)
    }

    async fn forget(&self, name: &str) -> Result<()> {
        sqlx::query(&format!(
            "DELETE FROM {} WHERE name = ? AND representation = ?",
            REGISTRY
        ))
        .bind(name)
        .bind(self.repr.as_str())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Drop every index this manager created for the representation.
    pub async fn drop(&self) -> Result<IndexReport> {
        self.ensure_registry().await?;
        let names: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT name FROM {} WHERE representation = ? ORDER BY name",
            REGISTRY
        ))
        .bind(self.repr.as_str())
        .fetch_all(self.pool())
        .await?;

        let mut report = IndexReport {
            representation: self.repr.to_string(),
            ..Default::default()
        };
        for name in names {
            sqlx::query(&format!("DROP INDEX IF EXISTS \"{}\"", name))
                .execute(self.pool())
                .await?;
            self.forget(&name).await?;
            report.dropped.push(name);
        }
        info!(
            representation = %self.repr,
            dropped = report.dropped.len(),
            "indexes dropped"
        );
        Ok(report)
    }
}

pub fn print_report(report: &IndexReport) {
    println!("Representation: {}", report.representation);
    let sections = [
        ("created", &report.created),
        ("already present", &report.already_managed),
        ("not managed (untouched)", &report.foreign),
        ("dropped", &report.dropped),
    ];
    for (label, names) in sections {
        if names.is_empty() {
            continue;
        }
        println!("  {} ({}):", label, names.len());
        for n in names {
            println!("    {}", n);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relational_set_covers_edges_and_composites() {
        let names: Vec<String> = index_set(Representation::Normalized, "movies_complete")
            .into_iter()
            .map(|d| d.name)
            .collect();
        for expected in [
            "idx_principals_movie",
            "idx_principals_person",
            "idx_characters_movie_person",
            "idx_persons_name",
            "idx_genres_genre",
            "idx_ratings_perf",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {}", expected);
        }
    }

    #[test]
    fn embedded_names_follow_collection() {
        let defs = index_set(Representation::Embedded, "movies_complete");
        assert!(defs.iter().all(|d| d.target == "movies_complete"));
        assert_eq!(defs[0].name, "idx_movies_complete_year");
    }

    #[test]
    fn index_names_are_unique() {
        for repr in Representation::ALL {
            let defs = index_set(repr, "movies_complete");
            let mut names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
            names.sort();
            names.dedup();
            assert_eq!(names.len(), defs.len());
        }
    }
}
