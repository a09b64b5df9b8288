//! TOML configuration for the `cine` binary and the engine context.
//!
//! ```toml
//! [normalized]
//! path = "./data/imdb.sqlite"
//!
//! [documents]
//! path = "./data/imdb_docs.sqlite"
//! embedded_collection = "movies_complete"
//!
//! [benchmark.params]
//! actor = "Brad Pitt"
//! ```
//!
//! Everything except the two store paths has a default.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use cinegraph_core::error::EngineError;

use crate::indexes::REGISTRY;
use crate::mirror::ENTITY_TABLES;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub normalized: NormalizedConfig,
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub connect: ConnectConfig,
    #[serde(default)]
    pub rebuild: RebuildConfig,
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NormalizedConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    pub path: PathBuf,
    #[serde(default = "default_embedded_collection")]
    pub embedded_collection: String,
}

fn default_embedded_collection() -> String {
    "movies_complete".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConnectConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RebuildConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct BenchmarkConfig {
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    #[serde(default = "default_sample_min_year")]
    pub sample_min_year: i64,
    #[serde(default)]
    pub params: BenchmarkParams,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
            sample_min_year: default_sample_min_year(),
            params: BenchmarkParams::default(),
        }
    }
}

fn default_sample_size() -> usize {
    50
}
fn default_sample_min_year() -> i64 {
    2000
}

/// Parameters fed to the parameterized queries during benchmarks and
/// equivalence checks.
#[derive(Debug, Deserialize, Clone)]
pub struct BenchmarkParams {
    /// Q1 actor name.
    #[serde(default = "default_actor")]
    pub actor: String,
    #[serde(default = "default_genre")]
    pub genre: String,
    #[serde(default = "default_year_from")]
    pub year_from: i64,
    #[serde(default = "default_year_to")]
    pub year_to: i64,
    #[serde(default = "default_top_n")]
    pub top_n: i64,
    /// Q4 actor name.
    #[serde(default = "default_collaborator")]
    pub collaborator: String,
    /// Q6 actor name.
    #[serde(default = "default_career_actor")]
    pub career_actor: String,
}

impl Default for BenchmarkParams {
    fn default() -> Self {
        Self {
            actor: default_actor(),
            genre: default_genre(),
            year_from: default_year_from(),
            year_to: default_year_to(),
            top_n: default_top_n(),
            collaborator: default_collaborator(),
            career_actor: default_career_actor(),
        }
    }
}

fn default_actor() -> String {
    "Brad Pitt".to_string()
}
fn default_genre() -> String {
    "Action".to_string()
}
fn default_year_from() -> i64 {
    2000
}
fn default_year_to() -> i64 {
    2010
}
fn default_top_n() -> i64 {
    10
}
fn default_collaborator() -> String {
    "Johnny Depp".to_string()
}
fn default_career_actor() -> String {
    "Tom Hanks".to_string()
}

impl BenchmarkParams {
    /// `key=value` parameters for one catalog query id.
    pub fn for_query(&self, code: &str) -> Vec<(String, String)> {
        let kv = |k: &str, v: String| (k.to_string(), v);
        match code {
            "q1" => vec![kv("name", self.actor.clone())],
            "q2" => vec![
                kv("genre", self.genre.clone()),
                kv("year_from", self.year_from.to_string()),
                kv("year_to", self.year_to.to_string()),
                kv("n", self.top_n.to_string()),
            ],
            "q4" => vec![kv("name", self.collaborator.clone())],
            "q6" => vec![kv("name", self.career_actor.clone())],
            _ => Vec::new(),
        }
    }
}

impl Config {
    /// Configuration with defaults for everything but the store paths.
    pub fn with_paths(normalized: impl Into<PathBuf>, documents: impl Into<PathBuf>) -> Self {
        Self {
            normalized: NormalizedConfig {
                path: normalized.into(),
            },
            documents: DocumentsConfig {
                path: documents.into(),
                embedded_collection: default_embedded_collection(),
            },
            connect: ConnectConfig::default(),
            rebuild: RebuildConfig::default(),
            benchmark: BenchmarkConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(EngineError::configuration(msg).into()) };

        if self.rebuild.batch_size == 0 {
            return invalid("rebuild.batch_size must be > 0".into());
        }
        if self.benchmark.sample_size == 0 {
            return invalid("benchmark.sample_size must be > 0".into());
        }
        let p = &self.benchmark.params;
        if p.year_from > p.year_to {
            return invalid(format!(
                "benchmark.params.year_from ({}) must be <= year_to ({})",
                p.year_from, p.year_to
            ));
        }
        if p.top_n < 1 {
            return invalid("benchmark.params.top_n must be >= 1".into());
        }
        let collection = &self.documents.embedded_collection;
        if !crate::docstore::is_identifier(collection) {
            return invalid(format!(
                "documents.embedded_collection '{}' is not a valid collection name",
                collection
            ));
        }
        // SQLite table names compare case-insensitively.
        let reserved = ENTITY_TABLES
            .iter()
            .chain(std::iter::once(&REGISTRY))
            .any(|t| t.eq_ignore_ascii_case(collection));
        if reserved || collection.to_ascii_lowercase().ends_with("_build") {
            return invalid(format!(
                "documents.embedded_collection '{}' clashes with a flat, registry or build collection",
                collection
            ));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| {
            EngineError::configuration(format!("cannot read {}: {}", path.display(), e))
        })
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}
