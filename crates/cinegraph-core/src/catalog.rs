//! The query catalog: nine analytical questions, defined once.
//!
//! A [`Query`] is the typed, validated form of a `(query_id, params)` pair.
//! Each representation implements every query in its own module, but all of
//! them share the result row types, thresholds, and final orderings below,
//! so results can be compared row for row.
//!
//! | Id | Name | Parameters |
//! |----|------|------------|
//! | q1 | `filmography` | `name` |
//! | q2 | `top-by-genre` | `genre`, `year_from`, `year_to`, `n` |
//! | q3 | `multi-role-actors` | none |
//! | q4 | `collaborations` | `name` |
//! | q5 | `popular-genres` | none |
//! | q6 | `career-by-decade` | `name` |
//! | q7 | `top3-per-genre` | none |
//! | q8 | `breakthrough` | none |
//! | q9 | `longest-careers` | none |
//!
//! Every ordering below is total (ties broken by ids), which keeps `LIMIT`
//! deterministic across stores.

use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use serde::Serialize;

use crate::error::EngineError;

pub const FILMOGRAPHY_LIMIT: usize = 20;
pub const MULTI_ROLE_LIMIT: usize = 20;
pub const COLLABORATION_LIMIT: usize = 10;
pub const POPULAR_GENRE_MIN_AVERAGE: f64 = 7.0;
pub const POPULAR_GENRE_MIN_MOVIES: i64 = 50;
pub const RANK_MIN_VOTES: i64 = 1000;
pub const RANK_CUTOFF: i64 = 3;
pub const BREAKTHROUGH_VOTES: i64 = 200_000;
pub const BREAKTHROUGH_MIN_PRIOR: usize = 3;
pub const BREAKTHROUGH_LIMIT: usize = 10;
pub const CAREER_MIN_MOVIES: i64 = 10;
pub const CAREER_LIMIT: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum QueryId {
    Filmography,
    TopByGenre,
    MultiRoleActors,
    Collaborations,
    PopularGenres,
    CareerByDecade,
    Top3PerGenre,
    Breakthrough,
    LongestCareers,
}

impl QueryId {
    pub const ALL: [QueryId; 9] = [
        QueryId::Filmography,
        QueryId::TopByGenre,
        QueryId::MultiRoleActors,
        QueryId::Collaborations,
        QueryId::PopularGenres,
        QueryId::CareerByDecade,
        QueryId::Top3PerGenre,
        QueryId::Breakthrough,
        QueryId::LongestCareers,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            QueryId::Filmography => "q1",
            QueryId::TopByGenre => "q2",
            QueryId::MultiRoleActors => "q3",
            QueryId::Collaborations => "q4",
            QueryId::PopularGenres => "q5",
            QueryId::CareerByDecade => "q6",
            QueryId::Top3PerGenre => "q7",
            QueryId::Breakthrough => "q8",
            QueryId::LongestCareers => "q9",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            QueryId::Filmography => "filmography",
            QueryId::TopByGenre => "top-by-genre",
            QueryId::MultiRoleActors => "multi-role-actors",
            QueryId::Collaborations => "collaborations",
            QueryId::PopularGenres => "popular-genres",
            QueryId::CareerByDecade => "career-by-decade",
            QueryId::Top3PerGenre => "top3-per-genre",
            QueryId::Breakthrough => "breakthrough",
            QueryId::LongestCareers => "longest-careers",
        }
    }

    /// Entity tables (or flat collections of the same name) the query reads.
    pub fn sources(&self) -> &'static [&'static str] {
        match self {
            QueryId::Filmography => &["persons", "principals", "movies", "characters"],
            QueryId::TopByGenre => &["movies", "genres", "ratings"],
            QueryId::MultiRoleActors => &["characters", "persons", "movies"],
            QueryId::Collaborations => &["persons", "principals", "directors"],
            QueryId::PopularGenres => &["genres", "ratings", "movies"],
            QueryId::CareerByDecade => &["persons", "principals", "movies", "ratings"],
            QueryId::Top3PerGenre => &["genres", "movies", "ratings"],
            QueryId::Breakthrough => &["principals", "persons", "movies", "ratings"],
            QueryId::LongestCareers => &["principals", "persons", "movies"],
        }
    }

    /// Accepts `q1`..`q9` or the query name, case-insensitively.
    pub fn parse(s: &str) -> Result<QueryId> {
        let wanted = s.trim().to_ascii_lowercase();
        QueryId::ALL
            .iter()
            .copied()
            .find(|id| id.code() == wanted || id.name() == wanted)
            .ok_or_else(|| EngineError::query(s, "unknown query id").into())
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.name())
    }
}

/// A validated query with its parameters bound.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Query {
    Filmography {
        name: String,
    },
    TopByGenre {
        genre: String,
        year_from: i64,
        year_to: i64,
        n: i64,
    },
    MultiRoleActors,
    Collaborations {
        name: String,
    },
    PopularGenres,
    CareerByDecade {
        name: String,
    },
    Top3PerGenre,
    Breakthrough,
    LongestCareers,
}

impl Query {
    pub fn id(&self) -> QueryId {
        match self {
            Query::Filmography { .. } => QueryId::Filmography,
            Query::TopByGenre { .. } => QueryId::TopByGenre,
            Query::MultiRoleActors => QueryId::MultiRoleActors,
            Query::Collaborations { .. } => QueryId::Collaborations,
            Query::PopularGenres => QueryId::PopularGenres,
            Query::CareerByDecade { .. } => QueryId::CareerByDecade,
            Query::Top3PerGenre => QueryId::Top3PerGenre,
            Query::Breakthrough => QueryId::Breakthrough,
            Query::LongestCareers => QueryId::LongestCareers,
        }
    }

    /// Parse a query id plus `key=value` parameters into a [`Query`].
    ///
    /// Unknown ids, missing parameters, unparsable numbers, an empty name
    /// or an inverted year range all fail with [`EngineError::Query`].
    pub fn parse(query_id: &str, params: &[(String, String)]) -> Result<Query> {
        let id = QueryId::parse(query_id)?;
        let params = QueryParams::new(id, params);
        let query = match id {
            QueryId::Filmography => Query::Filmography {
                name: params.name()?,
            },
            QueryId::TopByGenre => {
                let year_from = params.int("year_from")?;
                let year_to = params.int("year_to")?;
                if year_from > year_to {
                    return Err(EngineError::query(
                        id.code(),
                        format!("year_from {} is after year_to {}", year_from, year_to),
                    )
                    .into());
                }
                let n = params.int("n")?;
                if n < 1 {
                    return Err(EngineError::query(id.code(), "n must be >= 1").into());
                }
                Query::TopByGenre {
                    genre: params.text("genre")?,
                    year_from,
                    year_to,
                    n,
                }
            }
            QueryId::MultiRoleActors => Query::MultiRoleActors,
            QueryId::Collaborations => Query::Collaborations {
                name: params.name()?,
            },
            QueryId::PopularGenres => Query::PopularGenres,
            QueryId::CareerByDecade => Query::CareerByDecade {
                name: params.name()?,
            },
            QueryId::Top3PerGenre => Query::Top3PerGenre,
            QueryId::Breakthrough => Query::Breakthrough,
            QueryId::LongestCareers => Query::LongestCareers,
        };
        Ok(query)
    }
}

struct QueryParams {
    id: QueryId,
    values: BTreeMap<String, String>,
}

impl QueryParams {
    fn new(id: QueryId, params: &[(String, String)]) -> Self {
        let values = params
            .iter()
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.clone()))
            .collect();
        Self { id, values }
    }

    fn text(&self, key: &str) -> Result<String> {
        match self.values.get(key) {
            Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
            Some(_) => Err(EngineError::query(self.id.code(), format!("'{}' is empty", key)).into()),
            None => Err(EngineError::query(
                self.id.code(),
                format!("missing parameter '{}'", key),
            )
            .into()),
        }
    }

    fn name(&self) -> Result<String> {
        self.text("name")
    }

    fn int(&self, key: &str) -> Result<i64> {
        let raw = self.text(key)?;
        raw.parse::<i64>().map_err(|_| {
            EngineError::query(
                self.id.code(),
                format!("'{}' must be an integer, got '{}'", key, raw),
            )
            .into()
        })
    }
}

// ─── Matching and arithmetic shared by every representation ─────────

/// ASCII case-insensitive substring match, the same rule the SQL side
/// expresses as `instr(lower(name), lower(?)) > 0`.
pub fn name_matches(name: Option<&str>, needle: &str) -> bool {
    match name {
        Some(n) => n
            .to_ascii_lowercase()
            .contains(&needle.to_ascii_lowercase()),
        None => false,
    }
}

/// Round to two decimals, half away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn decade_of(year: i64) -> i64 {
    year.div_euclid(10) * 10
}

// ─── Result rows ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilmographyRow {
    pub movie_id: String,
    pub title: Option<String>,
    pub year: Option<i64>,
    pub character: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopMovieRow {
    pub movie_id: String,
    pub title: Option<String>,
    pub year: Option<i64>,
    pub rating: f64,
    pub votes: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiRoleRow {
    pub person_id: String,
    pub name: Option<String>,
    pub movie_id: String,
    pub title: Option<String>,
    pub roles: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollaborationRow {
    pub director: String,
    pub movies: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreAverageRow {
    pub genre: String,
    pub average: f64,
    pub movies: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecadeRow {
    pub decade: i64,
    pub movies: i64,
    pub average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreRankRow {
    pub genre: String,
    pub rank: i64,
    pub movie_id: String,
    pub title: Option<String>,
    pub rating: f64,
    pub votes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakthroughRow {
    pub person_id: String,
    pub name: Option<String>,
    pub movie_id: String,
    pub title: Option<String>,
    pub year: i64,
    pub votes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CareerRow {
    pub person_id: String,
    pub name: Option<String>,
    pub span: i64,
    pub movies: i64,
}

/// One ordered result row of any catalog query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryRow {
    Filmography(FilmographyRow),
    TopMovie(TopMovieRow),
    MultiRole(MultiRoleRow),
    Collaboration(CollaborationRow),
    GenreAverage(GenreAverageRow),
    Decade(DecadeRow),
    GenreRank(GenreRankRow),
    Breakthrough(BreakthroughRow),
    Career(CareerRow),
}

fn opt<T: fmt::Display>(v: &Option<T>) -> String {
    match v {
        Some(v) => v.to_string(),
        None => "-".to_string(),
    }
}

impl fmt::Display for QueryRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryRow::Filmography(r) => write!(
                f,
                "{} ({}) as {}",
                opt(&r.title),
                opt(&r.year),
                opt(&r.character)
            ),
            QueryRow::TopMovie(r) => write!(
                f,
                "{} ({}) rating {:.1} votes {}",
                opt(&r.title),
                opt(&r.year),
                r.rating,
                opt(&r.votes)
            ),
            QueryRow::MultiRole(r) => write!(
                f,
                "{} in '{}': {} roles",
                opt(&r.name),
                opt(&r.title),
                r.roles
            ),
            QueryRow::Collaboration(r) => write!(f, "{}: {} movies", r.director, r.movies),
            QueryRow::GenreAverage(r) => {
                write!(f, "{}: {:.2}/10 over {} movies", r.genre, r.average, r.movies)
            }
            QueryRow::Decade(r) => write!(
                f,
                "{}s: {} movies (average {})",
                r.decade,
                r.movies,
                opt(&r.average)
            ),
            QueryRow::GenreRank(r) => write!(
                f,
                "{} #{}: {} (rating {:.1}, {} votes)",
                r.genre,
                r.rank,
                opt(&r.title),
                r.rating,
                r.votes
            ),
            QueryRow::Breakthrough(r) => write!(
                f,
                "{} broke through with '{}' ({})",
                opt(&r.name),
                opt(&r.title),
                r.year
            ),
            QueryRow::Career(r) => write!(
                f,
                "{}: {} years over {} movies",
                opt(&r.name),
                r.span,
                r.movies
            ),
        }
    }
}

// ─── Final orderings ────────────────────────────────────────────────

fn desc_f64(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

pub fn cmp_filmography(a: &FilmographyRow, b: &FilmographyRow) -> Ordering {
    Reverse(a.year)
        .cmp(&Reverse(b.year))
        .then_with(|| a.title.cmp(&b.title))
        .then_with(|| a.movie_id.cmp(&b.movie_id))
        .then_with(|| a.character.cmp(&b.character))
}

pub fn cmp_top_movie(a: &TopMovieRow, b: &TopMovieRow) -> Ordering {
    desc_f64(a.rating, b.rating)
        .then_with(|| Reverse(a.votes).cmp(&Reverse(b.votes)))
        .then_with(|| a.movie_id.cmp(&b.movie_id))
}

pub fn cmp_multi_role(a: &MultiRoleRow, b: &MultiRoleRow) -> Ordering {
    b.roles
        .cmp(&a.roles)
        .then_with(|| a.person_id.cmp(&b.person_id))
        .then_with(|| a.movie_id.cmp(&b.movie_id))
}

pub fn cmp_collaboration(a: &CollaborationRow, b: &CollaborationRow) -> Ordering {
    b.movies
        .cmp(&a.movies)
        .then_with(|| a.director.cmp(&b.director))
}

pub fn cmp_genre_average(a: &GenreAverageRow, b: &GenreAverageRow) -> Ordering {
    desc_f64(a.average, b.average).then_with(|| a.genre.cmp(&b.genre))
}

pub fn cmp_genre_rank(a: &GenreRankRow, b: &GenreRankRow) -> Ordering {
    a.genre
        .cmp(&b.genre)
        .then_with(|| a.rank.cmp(&b.rank))
        .then_with(|| a.movie_id.cmp(&b.movie_id))
}

pub fn cmp_breakthrough(a: &BreakthroughRow, b: &BreakthroughRow) -> Ordering {
    a.year
        .cmp(&b.year)
        .then_with(|| a.person_id.cmp(&b.person_id))
}

pub fn cmp_career(a: &CareerRow, b: &CareerRow) -> Ordering {
    b.span
        .cmp(&a.span)
        .then_with(|| a.person_id.cmp(&b.person_id))
}

/// Sort by `cmp`, truncate to `limit` (if any) and wrap each row.
pub fn finish<T>(
    mut rows: Vec<T>,
    cmp: fn(&T, &T) -> Ordering,
    limit: Option<usize>,
    wrap: fn(T) -> QueryRow,
) -> Vec<QueryRow> {
    rows.sort_by(cmp);
    if let Some(limit) = limit {
        rows.truncate(limit);
    }
    rows.into_iter().map(wrap).collect()
}

/// Apply the popular-genres thresholds to raw `(genre, sum, count)`
/// aggregates: round the average, keep `avg > 7.0 && count > 50`.
pub fn popular_genres_from_sums(sums: impl IntoIterator<Item = (String, f64, i64)>) -> Vec<QueryRow> {
    let rows: Vec<GenreAverageRow> = sums
        .into_iter()
        .filter(|(_, _, count)| *count > 0)
        .map(|(genre, sum, count)| GenreAverageRow {
            genre,
            average: round2(sum / count as f64),
            movies: count,
        })
        .filter(|r| r.average > POPULAR_GENRE_MIN_AVERAGE && r.movies > POPULAR_GENRE_MIN_MOVIES)
        .collect();
    finish(rows, cmp_genre_average, None, QueryRow::GenreAverage)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parse_by_code_and_name() {
        assert_eq!(QueryId::parse("Q7").unwrap(), QueryId::Top3PerGenre);
        assert_eq!(QueryId::parse("breakthrough").unwrap(), QueryId::Breakthrough);
    }

    #[test]
    fn unknown_id_is_query_error() {
        let err = Query::parse("q10", &[]).unwrap_err();
        match crate::error::engine_error(&err) {
            Some(EngineError::Query { query, .. }) => assert_eq!(query, "q10"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn top_by_genre_params() {
        let q = Query::parse(
            "q2",
            &kv(&[("genre", "Horror"), ("year_from", "1980"), ("year_to", "1990"), ("n", "5")]),
        )
        .unwrap();
        assert_eq!(
            q,
            Query::TopByGenre {
                genre: "Horror".into(),
                year_from: 1980,
                year_to: 1990,
                n: 5
            }
        );
    }

    #[test]
    fn malformed_params_rejected() {
        assert!(Query::parse("q1", &[]).is_err());
        assert!(Query::parse("q1", &kv(&[("name", "  ")])).is_err());
        assert!(Query::parse(
            "q2",
            &kv(&[("genre", "Drama"), ("year_from", "abc"), ("year_to", "1990"), ("n", "5")])
        )
        .is_err());
        assert!(Query::parse(
            "q2",
            &kv(&[("genre", "Drama"), ("year_from", "2000"), ("year_to", "1990"), ("n", "5")])
        )
        .is_err());
        assert!(Query::parse(
            "q2",
            &kv(&[("genre", "Drama"), ("year_from", "1990"), ("year_to", "2000"), ("n", "0")])
        )
        .is_err());
    }

    #[test]
    fn name_matching_is_case_insensitive_substring() {
        assert!(name_matches(Some("Harrison Ford"), "harrison"));
        assert!(name_matches(Some("Harrison Ford"), "ON FO"));
        assert!(!name_matches(Some("Harrison Ford"), "Fordham"));
        assert!(!name_matches(None, "x"));
    }

    #[test]
    fn decades_and_rounding() {
        assert_eq!(decade_of(1988), 1980);
        assert_eq!(decade_of(1990), 1990);
        assert_eq!(round2(7.125), 7.13);
        assert_eq!(round2(7.0), 7.0);
    }

    #[test]
    fn filmography_nulls_sort_last_for_year() {
        let row = |id: &str, year: Option<i64>| FilmographyRow {
            movie_id: id.into(),
            title: None,
            year,
            character: None,
        };
        let rows = vec![row("a", None), row("b", Some(1990)), row("c", Some(2001))];
        let out = finish(rows, cmp_filmography, None, QueryRow::Filmography);
        let ids: Vec<_> = out
            .iter()
            .map(|r| match r {
                QueryRow::Filmography(f) => f.movie_id.as_str(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn popular_genres_thresholds() {
        let rows = popular_genres_from_sums(vec![
            ("Drama".to_string(), 8.0 * 51.0, 51),
            ("Horror".to_string(), 8.0 * 50.0, 50),
            ("Comedy".to_string(), 7.0 * 60.0, 60),
        ]);
        assert_eq!(rows.len(), 1);
        match &rows[0] {
            QueryRow::GenreAverage(r) => {
                assert_eq!(r.genre, "Drama");
                assert_eq!(r.average, 8.0);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
