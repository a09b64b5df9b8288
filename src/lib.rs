//! # Cinegraph
//!
//! Cross-model analytical queries over a movie and person graph.
//!
//! The same data lives in three representations:
//!
//! - **normalized**: relational tables in a SQLite file, queried with SQL
//!   joins;
//! - **flat**: one document collection per table, joined in the
//!   application;
//! - **embedded**: one self-contained document per movie (rating, genres,
//!   titles, cast, directors, writers) rebuilt from the normalized store.
//!
//! Nine catalog queries are answered by every representation with
//! equivalent, totally ordered results, so their cost and the effect of
//! secondary indexes can be benchmarked side by side.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐ repair  ┌──────────────┐ mirror  ┌──────────────┐
//! │  normalized  │────────▶│  normalized  │────────▶│     flat     │
//! │  (raw load)  │         │   (clean)    │         │ collections  │
//! └──────────────┘         └──────┬───────┘         └──────────────┘
//!                                 │ rebuild (build aside + swap)
//!                                 ▼
//!                          ┌──────────────┐
//!                          │   embedded   │
//!                          │  collection  │
//!                          └──────────────┘
//!
//!        QueryExecutor ── normalized │ flat │ embedded ── bench, verify
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | Connection pools for both SQLite files |
//! | [`docstore`] | JSON document collections on SQLite |
//! | [`context`] | Shared handles and executor selection |
//! | [`repair`] | Orphan repair and integrity check |
//! | [`mirror`] | Normalized tables into flat collections |
//! | [`rebuild`] | Embedded collection rebuild with atomic swap |
//! | [`normalized`] | SQL executor |
//! | [`flat`] | Application-join executor |
//! | [`embedded`] | Single-collection executor |
//! | [`indexes`] | Secondary index sets per representation |
//! | [`bench`] | Index and representation benchmarks |
//! | [`verify`] | Cross-representation equivalence |
//! | [`stats`] | Store statistics |
//!
//! Store-agnostic types (entities, catalog, executor trait, ranking,
//! document assembly) live in the `cinegraph-core` crate.

pub mod bench;
pub mod config;
pub mod context;
pub mod db;
pub mod docstore;
pub mod embedded;
pub mod flat;
pub mod indexes;
pub mod mirror;
pub mod normalized;
pub mod rebuild;
pub mod repair;
pub mod stats;
pub mod verify;
