//! Entity graph model shared by every representation.
//!
//! Row types mirror the normalized tables column for column, so the same
//! structs deserialize from SQL rows (mapped by hand in the native crate)
//! and from flat-collection JSON documents (via serde).
//!
//! [`MovieDocument`] is the derived embedded aggregate: one self-contained
//! document per movie, readable without any secondary lookup.

use serde::{Deserialize, Serialize};

/// Principal categories that count as acting credits.
pub const ACTING_CATEGORIES: [&str; 2] = ["actor", "actress"];

pub fn is_acting(category: Option<&str>) -> bool {
    matches!(category, Some(c) if ACTING_CATEGORIES.contains(&c))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub movie_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub year: Option<i64>,
    #[serde(default)]
    pub runtime: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub person_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub birth_year: Option<i64>,
    #[serde(default)]
    pub death_year: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub movie_id: String,
    #[serde(default)]
    pub average_rating: Option<f64>,
    #[serde(default)]
    pub num_votes: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub movie_id: String,
    pub genre: String,
}

/// Alternative title of a movie (`titles` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleAlias {
    pub movie_id: String,
    #[serde(default)]
    pub ordering: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Cast/crew edge with attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub movie_id: String,
    pub person_id: String,
    #[serde(default)]
    pub ordering: Option<i64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub job: Option<String>,
}

impl Principal {
    pub fn is_acting(&self) -> bool {
        is_acting(self.category.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub movie_id: String,
    pub person_id: String,
    #[serde(default)]
    pub character_name: Option<String>,
}

/// Director or writer edge (`directors` / `writers` tables).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credit {
    pub movie_id: String,
    pub person_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profession {
    pub person_id: String,
    #[serde(default)]
    pub job_name: Option<String>,
}

// ─── Embedded representation ────────────────────────────────────────

/// Rating block of an embedded movie. Always present; fields are null
/// when the movie has no rating row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    pub average: Option<f64>,
    pub votes: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub region: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastEntry {
    pub person_id: String,
    pub name: Option<String>,
    pub ordering: Option<i64>,
    pub characters: Vec<String>,
}

/// One self-contained document per movie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieDocument {
    #[serde(rename = "_id")]
    pub movie_id: String,
    pub title: Option<String>,
    pub original_title: Option<String>,
    pub year: Option<i64>,
    pub runtime: Option<i64>,
    pub rating: RatingSummary,
    pub genres: Vec<String>,
    pub titles: Vec<AliasEntry>,
    pub directors: Vec<String>,
    pub writers: Vec<String>,
    pub cast: Vec<CastEntry>,
}
