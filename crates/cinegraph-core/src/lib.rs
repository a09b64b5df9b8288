//! # Cinegraph Core
//!
//! Store-agnostic logic for Cinegraph: the entity model, the nine-query
//! catalog with its result rows and orderings, the executor trait, tie-aware
//! ranking, per-person analytics and embedded document assembly.
//!
//! This crate contains no tokio, sqlx or filesystem I/O. Everything that
//! touches a database lives in the `cinegraph` crate.

pub mod analytics;
pub mod catalog;
pub mod document;
pub mod error;
pub mod executor;
pub mod models;
pub mod ranking;
