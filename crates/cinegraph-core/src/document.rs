//! Per-movie assembly of the embedded document.
//!
//! The rebuild in the native crate gathers every row that belongs to one
//! movie into a [`MovieSources`] and calls [`assemble`]. Person names are
//! resolved through a caller-supplied lookup so this module stays free of
//! any storage access.
//!
//! Rules applied here:
//!
//! - `rating` is always present; its fields are null without a rating row.
//! - `genres` are sorted and deduplicated; `titles` follow alias
//!   `ordering` (nulls last).
//! - `directors` / `writers` hold resolved names; credits whose person is
//!   missing or unnamed are skipped.
//! - `cast` holds actor/actress principals only, sorted by `ordering`
//!   (nulls last, then person id). A principal whose person is missing is
//!   skipped. `characters` lists the non-null character names of that
//!   person in that movie.

use std::cmp::Ordering;

use crate::models::{
    AliasEntry, CastEntry, Character, Movie, MovieDocument, Principal, Rating, RatingSummary,
    TitleAlias,
};

/// Every source row belonging to one movie.
#[derive(Debug, Clone)]
pub struct MovieSources {
    pub movie: Movie,
    pub rating: Option<Rating>,
    pub genres: Vec<String>,
    pub titles: Vec<TitleAlias>,
    /// Director person ids.
    pub directors: Vec<String>,
    /// Writer person ids.
    pub writers: Vec<String>,
    pub principals: Vec<Principal>,
    pub characters: Vec<Character>,
}

impl MovieSources {
    pub fn new(movie: Movie) -> Self {
        Self {
            movie,
            rating: None,
            genres: Vec::new(),
            titles: Vec::new(),
            directors: Vec::new(),
            writers: Vec::new(),
            principals: Vec::new(),
            characters: Vec::new(),
        }
    }
}

/// Resolves a person id.
///
/// Returns `None` when the person does not exist and `Some(None)` when it
/// exists without a name.
pub trait PersonLookup {
    fn person_name(&self, person_id: &str) -> Option<Option<&str>>;
}

impl PersonLookup for std::collections::HashMap<String, Option<String>> {
    fn person_name(&self, person_id: &str) -> Option<Option<&str>> {
        self.get(person_id).map(|n| n.as_deref())
    }
}

fn nulls_last(a: Option<i64>, b: Option<i64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn resolve_names(ids: &[String], people: &impl PersonLookup) -> Vec<String> {
    ids.iter()
        .filter_map(|id| people.person_name(id).flatten())
        .map(str::to_string)
        .collect()
}

/// Build the embedded document for one movie.
pub fn assemble(sources: MovieSources, people: &impl PersonLookup) -> MovieDocument {
    let MovieSources {
        movie,
        rating,
        mut genres,
        mut titles,
        directors,
        writers,
        mut principals,
        characters,
    } = sources;

    genres.sort();
    genres.dedup();

    titles.sort_by(|a, b| {
        nulls_last(a.ordering, b.ordering).then_with(|| a.title.cmp(&b.title))
    });
    let titles = titles
        .into_iter()
        .map(|t| AliasEntry {
            region: t.region,
            title: t.title,
        })
        .collect();

    principals.retain(|p| p.is_acting());
    principals.sort_by(|a, b| {
        nulls_last(a.ordering, b.ordering).then_with(|| a.person_id.cmp(&b.person_id))
    });
    let cast = principals
        .into_iter()
        .filter_map(|p| {
            let name = people.person_name(&p.person_id)?;
            let roles = characters
                .iter()
                .filter(|c| c.person_id == p.person_id)
                .filter_map(|c| c.character_name.clone())
                .collect();
            Some(CastEntry {
                name: name.map(str::to_string),
                person_id: p.person_id,
                ordering: p.ordering,
                characters: roles,
            })
        })
        .collect();

    let rating = rating
        .map(|r| RatingSummary {
            average: r.average_rating,
            votes: r.num_votes,
        })
        .unwrap_or_default();

    MovieDocument {
        movie_id: movie.movie_id,
        title: movie.title,
        original_title: movie.original_title,
        year: movie.year,
        runtime: movie.runtime,
        rating,
        genres,
        titles,
        directors: resolve_names(&directors, people),
        writers: resolve_names(&writers, people),
        cast,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn people() -> HashMap<String, Option<String>> {
        let mut m = HashMap::new();
        m.insert("nm1".to_string(), Some("Ana Lopez".to_string()));
        m.insert("nm2".to_string(), Some("Ben Ode".to_string()));
        m.insert("nm3".to_string(), None);
        m
    }

    fn movie() -> Movie {
        Movie {
            movie_id: "tt1".into(),
            title: Some("Harbor".into()),
            original_title: None,
            year: Some(1999),
            runtime: Some(101),
        }
    }

    fn principal(person: &str, ordering: Option<i64>, category: &str) -> Principal {
        Principal {
            movie_id: "tt1".into(),
            person_id: person.into(),
            ordering,
            category: Some(category.into()),
            job: None,
        }
    }

    #[test]
    fn cast_is_ordered_and_filtered() {
        let mut src = MovieSources::new(movie());
        src.principals = vec![
            principal("nm2", Some(3), "actor"),
            principal("nm9", Some(1), "actor"),
            principal("nm1", Some(2), "actress"),
            principal("nm3", None, "actor"),
            principal("nm2", Some(4), "director"),
        ];
        src.characters = vec![
            Character {
                movie_id: "tt1".into(),
                person_id: "nm1".into(),
                character_name: Some("Mara".into()),
            },
            Character {
                movie_id: "tt1".into(),
                person_id: "nm1".into(),
                character_name: None,
            },
        ];
        let doc = assemble(src, &people());
        let ids: Vec<&str> = doc.cast.iter().map(|c| c.person_id.as_str()).collect();
        assert_eq!(ids, vec!["nm1", "nm2", "nm3"]);
        assert_eq!(doc.cast[0].characters, vec!["Mara".to_string()]);
        assert!(doc.cast[1].characters.is_empty());
        assert_eq!(doc.cast[2].name, None);
    }

    #[test]
    fn missing_rating_yields_null_fields() {
        let doc = assemble(MovieSources::new(movie()), &people());
        assert_eq!(doc.rating, RatingSummary::default());
        assert!(doc.cast.is_empty());
    }

    #[test]
    fn crew_names_skip_missing_and_unnamed() {
        let mut src = MovieSources::new(movie());
        src.directors = vec!["nm2".into(), "nm3".into(), "nm404".into()];
        src.writers = vec!["nm1".into()];
        src.genres = vec!["Drama".into(), "Crime".into()];
        let doc = assemble(src, &people());
        assert_eq!(doc.directors, vec!["Ben Ode".to_string()]);
        assert_eq!(doc.writers, vec!["Ana Lopez".to_string()]);
        assert_eq!(doc.genres, vec!["Crime".to_string(), "Drama".to_string()]);
    }
}
