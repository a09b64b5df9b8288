//! Catalog queries over the embedded collection.
//!
//! Filters that the document store can evaluate (genre membership, year
//! range, cast name match) are pushed down; the remaining work unwinds the
//! `cast`, `genres` and `directors` arrays in memory.
//!
//! Two answers are approximations of the normalized ones because the
//! document keeps less than the tables do:
//!
//! - `multi-role-actors` only sees characters attached to actor/actress
//!   cast entries.
//! - `collaborations` groups directors by name, so namesakes merge.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use cinegraph_core::analytics::{self, Appearance, Timelines};
use cinegraph_core::catalog::{
    cmp_collaboration, cmp_filmography, cmp_multi_role, cmp_top_movie, finish, name_matches,
    popular_genres_from_sums, CollaborationRow, FilmographyRow, GenreRankRow, MultiRoleRow, Query,
    QueryRow, TopMovieRow, COLLABORATION_LIMIT, FILMOGRAPHY_LIMIT, MULTI_ROLE_LIMIT,
    RANK_MIN_VOTES,
};
use cinegraph_core::executor::{QueryExecutor, Representation};
use cinegraph_core::models::MovieDocument;

use crate::docstore::{DocumentStore, Filter};

pub struct EmbeddedExecutor {
    docs: DocumentStore,
    collection: String,
}

fn cast_name_contains(name: &str) -> Filter {
    Filter::ArrayAnyContainsIgnoreCase {
        array: "cast".into(),
        field: "name".into(),
        needle: name.into(),
    }
}

fn appearance(doc: &MovieDocument) -> Appearance {
    Appearance {
        movie_id: doc.movie_id.clone(),
        title: doc.title.clone(),
        year: doc.year,
        rating: doc.rating.average,
        votes: doc.rating.votes,
    }
}

impl EmbeddedExecutor {
    pub fn new(docs: DocumentStore, collection: impl Into<String>) -> Self {
        Self {
            docs,
            collection: collection.into(),
        }
    }

    async fn movies(&self, filter: &Filter) -> Result<Vec<MovieDocument>> {
        self.docs.find_as(&self.collection, filter).await
    }

    async fn filmography(&self, name: &str) -> Result<Vec<QueryRow>> {
        let mut rows = Vec::new();
        for doc in self.movies(&cast_name_contains(name)).await? {
            for entry in doc.cast.iter().filter(|c| name_matches(c.name.as_deref(), name)) {
                let row = |character: Option<String>| FilmographyRow {
                    movie_id: doc.movie_id.clone(),
                    title: doc.title.clone(),
                    year: doc.year,
                    character,
                };
                if entry.characters.is_empty() {
                    rows.push(row(None));
                } else {
                    rows.extend(entry.characters.iter().map(|c| row(Some(c.clone()))));
                }
            }
        }
        Ok(finish(
            rows,
            cmp_filmography,
            Some(FILMOGRAPHY_LIMIT),
            QueryRow::Filmography,
        ))
    }

    async fn top_by_genre(&self, genre: &str, from: i64, to: i64, n: i64) -> Result<Vec<QueryRow>> {
        let filter = Filter::And(vec![
            Filter::ArrayContains("genres".into(), json!(genre)),
            Filter::Gte("year".into(), json!(from)),
            Filter::Lte("year".into(), json!(to)),
        ]);
        let rows = self
            .movies(&filter)
            .await?
            .into_iter()
            .filter_map(|doc| {
                Some(TopMovieRow {
                    rating: doc.rating.average?,
                    votes: doc.rating.votes,
                    movie_id: doc.movie_id,
                    title: doc.title,
                    year: doc.year,
                })
            })
            .collect();
        Ok(finish(rows, cmp_top_movie, Some(n as usize), QueryRow::TopMovie))
    }

    async fn multi_role_actors(&self) -> Result<Vec<QueryRow>> {
        let mut rows = Vec::new();
        for doc in self.movies(&Filter::All).await? {
            let mut seen = HashSet::new();
            for entry in &doc.cast {
                if !seen.insert(entry.person_id.as_str()) || entry.characters.len() < 2 {
                    continue;
                }
                rows.push(MultiRoleRow {
                    person_id: entry.person_id.clone(),
                    name: entry.name.clone(),
                    movie_id: doc.movie_id.clone(),
                    title: doc.title.clone(),
                    roles: entry.characters.len() as i64,
                });
            }
        }
        Ok(finish(
            rows,
            cmp_multi_role,
            Some(MULTI_ROLE_LIMIT),
            QueryRow::MultiRole,
        ))
    }

    async fn collaborations(&self, name: &str) -> Result<Vec<QueryRow>> {
        let mut movies_per_director: HashMap<String, HashSet<String>> = HashMap::new();
        for doc in self.movies(&cast_name_contains(name)).await? {
            if !doc.cast.iter().any(|c| name_matches(c.name.as_deref(), name)) {
                continue;
            }
            for director in &doc.directors {
                movies_per_director
                    .entry(director.clone())
                    .or_default()
                    .insert(doc.movie_id.clone());
            }
        }
        let rows = movies_per_director
            .into_iter()
            .map(|(director, movies)| CollaborationRow {
                director,
                movies: movies.len() as i64,
            })
            .collect();
        Ok(finish(
            rows,
            cmp_collaboration,
            Some(COLLABORATION_LIMIT),
            QueryRow::Collaboration,
        ))
    }

    async fn popular_genres(&self) -> Result<Vec<QueryRow>> {
        let mut sums: HashMap<String, (f64, i64)> = HashMap::new();
        for doc in self.movies(&Filter::All).await? {
            let Some(avg) = doc.rating.average else { continue };
            for genre in doc.genres {
                let e = sums.entry(genre).or_insert((0.0, 0));
                e.0 += avg;
                e.1 += 1;
            }
        }
        Ok(popular_genres_from_sums(
            sums.into_iter().map(|(g, (sum, n))| (g, sum, n)),
        ))
    }

    async fn career_by_decade(&self, name: &str) -> Result<Vec<QueryRow>> {
        let docs = self.movies(&cast_name_contains(name)).await?;
        let appearances = docs
            .iter()
            .filter(|d| d.cast.iter().any(|c| name_matches(c.name.as_deref(), name)))
            .map(appearance)
            .collect::<Vec<_>>();
        Ok(analytics::career_by_decade(appearances))
    }

    async fn top3_per_genre(&self) -> Result<Vec<QueryRow>> {
        let filter = Filter::Gt("rating.votes".into(), json!(RANK_MIN_VOTES));
        let mut candidates = Vec::new();
        for doc in self.movies(&filter).await? {
            let (Some(rating), Some(votes)) = (doc.rating.average, doc.rating.votes) else {
                continue;
            };
            for genre in &doc.genres {
                candidates.push(GenreRankRow {
                    genre: genre.clone(),
                    rank: 0,
                    movie_id: doc.movie_id.clone(),
                    title: doc.title.clone(),
                    rating,
                    votes,
                });
            }
        }
        Ok(analytics::top_ranked_per_genre(candidates))
    }

    async fn timelines(&self) -> Result<Timelines> {
        let mut timelines = Timelines::new();
        for doc in self.movies(&Filter::All).await? {
            let a = appearance(&doc);
            for entry in &doc.cast {
                analytics::push_appearance(
                    &mut timelines,
                    &entry.person_id,
                    entry.name.as_deref(),
                    a.clone(),
                );
            }
        }
        Ok(timelines)
    }

    async fn breakthrough(&self) -> Result<Vec<QueryRow>> {
        let timelines = self.timelines().await?;
        let hits = timelines
            .iter()
            .flat_map(|(pid, t)| analytics::breakthrough_hits(pid, t))
            .collect();
        Ok(analytics::breakthroughs(hits))
    }

    async fn longest_careers(&self) -> Result<Vec<QueryRow>> {
        let timelines = self.timelines().await?;
        Ok(analytics::longest_careers(&timelines))
    }

    /// Full read of one movie: a single primary-key lookup.
    pub async fn read_movie(&self, movie_id: &str) -> Result<Option<MovieDocument>> {
        self.docs
            .find_by_id(&self.collection, movie_id)
            .await?
            .map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }
}

#[async_trait]
impl QueryExecutor for EmbeddedExecutor {
    fn representation(&self) -> Representation {
        Representation::Embedded
    }

    async fn run(&self, query: &Query) -> Result<Vec<QueryRow>> {
        self.docs.require_collection(&self.collection).await?;
        match query {
            Query::Filmography { name } => self.filmography(name).await,
            Query::TopByGenre {
                genre,
                year_from,
                year_to,
                n,
            } => self.top_by_genre(genre, *year_from, *year_to, *n).await,
            Query::MultiRoleActors => self.multi_role_actors().await,
            Query::Collaborations { name } => self.collaborations(name).await,
            Query::PopularGenres => self.popular_genres().await,
            Query::CareerByDecade { name } => self.career_by_decade(name).await,
            Query::Top3PerGenre => self.top3_per_genre().await,
            Query::Breakthrough => self.breakthrough().await,
            Query::LongestCareers => self.longest_careers().await,
        }
    }
}
