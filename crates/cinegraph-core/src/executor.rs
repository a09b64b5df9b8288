//! Execution abstraction over the three physical representations.
//!
//! The [`QueryExecutor`] trait is the single seam between the catalog and
//! storage: every representation answers every [`Query`] and returns rows
//! in the catalog's final ordering.
//!
//! Implementations must be `Send + Sync` so they can be boxed and driven
//! from the async benchmark harness.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::{Query, QueryRow};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    /// Relational tables joined by SQL.
    Normalized,
    /// One document collection per table, joined in the application.
    Flat,
    /// One self-contained document per movie.
    Embedded,
}

impl Representation {
    pub const ALL: [Representation; 3] = [
        Representation::Normalized,
        Representation::Flat,
        Representation::Embedded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Representation::Normalized => "normalized",
            Representation::Flat => "flat",
            Representation::Embedded => "embedded",
        }
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Representation {
    type Err = EngineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normalized" | "sql" => Ok(Representation::Normalized),
            "flat" => Ok(Representation::Flat),
            "embedded" => Ok(Representation::Embedded),
            other => Err(EngineError::configuration(format!(
                "unknown representation '{}' (expected normalized, flat or embedded)",
                other
            ))),
        }
    }
}

/// Runs catalog queries against one representation.
///
/// # Errors
///
/// Implementations return [`EngineError::Configuration`] when a table or
/// collection they need is missing, and [`EngineError::Query`] for
/// malformed parameters (raised by [`Query::parse`] before `run`).
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    fn representation(&self) -> Representation;

    /// Run an already validated query.
    async fn run(&self, query: &Query) -> Result<Vec<QueryRow>>;

    /// Parse `query_id` and `params`, then run.
    async fn execute(&self, query_id: &str, params: &[(String, String)]) -> Result<Vec<QueryRow>> {
        let query = Query::parse(query_id, params)?;
        self.run(&query).await
    }
}
