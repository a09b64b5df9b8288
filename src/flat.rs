//! Catalog queries over flat collections, joined in the application.
//!
//! Each query runs as a short sequence of filtered lookups (`In` lists of
//! ids carry the join keys) followed by hash joins and aggregation in
//! memory.

use std::collections::{BTreeSet, HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use cinegraph_core::analytics::{self, Appearance, Timelines};
use cinegraph_core::catalog::{
    cmp_collaboration, cmp_filmography, cmp_multi_role, cmp_top_movie, finish,
    popular_genres_from_sums, CollaborationRow, FilmographyRow, GenreRankRow, MultiRoleRow, Query,
    QueryId, QueryRow, TopMovieRow, COLLABORATION_LIMIT, FILMOGRAPHY_LIMIT, MULTI_ROLE_LIMIT,
    RANK_MIN_VOTES,
};
use cinegraph_core::document::{assemble, MovieSources};
use cinegraph_core::executor::{QueryExecutor, Representation};
use cinegraph_core::models::{
    Character, Credit, Genre, Movie, MovieDocument, Person, Principal, Rating, TitleAlias,
    ACTING_CATEGORIES,
};

use crate::docstore::{DocumentStore, Filter};

pub struct FlatExecutor {
    docs: DocumentStore,
}

fn acting() -> Filter {
    Filter::is_in("category", ACTING_CATEGORIES)
}

/// `None` selects every document.
fn ids_filter(path: &str, ids: Option<&BTreeSet<String>>) -> Filter {
    match ids {
        Some(ids) => Filter::is_in(path, ids.iter().cloned()),
        None => Filter::All,
    }
}

impl FlatExecutor {
    pub fn new(docs: DocumentStore) -> Self {
        Self { docs }
    }

    async fn require_collections(&self, id: QueryId) -> Result<()> {
        for name in id.sources() {
            self.docs.require_collection(name).await?;
        }
        Ok(())
    }

    async fn matching_persons(&self, name: &str) -> Result<Vec<Person>> {
        self.docs
            .find_as("persons", &Filter::ContainsIgnoreCase("name".into(), name.into()))
            .await
    }

    async fn acting_principals(&self, person_ids: Option<&BTreeSet<String>>) -> Result<Vec<Principal>> {
        let filter = Filter::And(vec![ids_filter("person_id", person_ids), acting()]);
        self.docs.find_as("principals", &filter).await
    }

    async fn movies_by_id(&self, ids: Option<&BTreeSet<String>>) -> Result<HashMap<String, Movie>> {
        let movies: Vec<Movie> = self
            .docs
            .find_as("movies", &ids_filter("movie_id", ids))
            .await?;
        Ok(movies.into_iter().map(|m| (m.movie_id.clone(), m)).collect())
    }

    async fn ratings_by_movie(&self, ids: Option<&BTreeSet<String>>) -> Result<HashMap<String, Rating>> {
        let ratings: Vec<Rating> = self
            .docs
            .find_as("ratings", &ids_filter("movie_id", ids))
            .await?;
        let mut map = HashMap::with_capacity(ratings.len());
        for r in ratings {
            map.entry(r.movie_id.clone()).or_insert(r);
        }
        Ok(map)
    }

    async fn persons_by_id(&self, ids: Option<&BTreeSet<String>>) -> Result<HashMap<String, Person>> {
        let persons: Vec<Person> = self
            .docs
            .find_as("persons", &ids_filter("person_id", ids))
            .await?;
        Ok(persons
            .into_iter()
            .map(|p| (p.person_id.clone(), p))
            .collect())
    }

    async fn filmography(&self, name: &str) -> Result<Vec<QueryRow>> {
        let pids: BTreeSet<String> = self
            .matching_persons(name)
            .await?
            .into_iter()
            .map(|p| p.person_id)
            .collect();
        if pids.is_empty() {
            return Ok(Vec::new());
        }
        let principals = self.acting_principals(Some(&pids)).await?;
        let mids: BTreeSet<String> = principals.iter().map(|p| p.movie_id.clone()).collect();
        let movies = self.movies_by_id(Some(&mids)).await?;
        let characters: Vec<Character> = self
            .docs
            .find_as(
                "characters",
                &Filter::And(vec![
                    ids_filter("person_id", Some(&pids)),
                    ids_filter("movie_id", Some(&mids)),
                ]),
            )
            .await?;
        let mut roles: HashMap<(&str, &str), Vec<&str>> = HashMap::new();
        for c in &characters {
            if let Some(n) = c.character_name.as_deref() {
                roles
                    .entry((c.movie_id.as_str(), c.person_id.as_str()))
                    .or_default()
                    .push(n);
            }
        }

        let mut rows = Vec::new();
        for p in &principals {
            let Some(m) = movies.get(&p.movie_id) else { continue };
            let row = |character: Option<String>| FilmographyRow {
                movie_id: m.movie_id.clone(),
                title: m.title.clone(),
                year: m.year,
                character,
            };
            match roles.get(&(p.movie_id.as_str(), p.person_id.as_str())) {
                Some(names) => rows.extend(names.iter().map(|n| row(Some(n.to_string())))),
                None => rows.push(row(None)),
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
        let genres: Vec<Genre> = self.docs.find_as("genres", &Filter::eq("genre", genre)).await?;
        let ids: BTreeSet<String> = genres.into_iter().map(|g| g.movie_id).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let movies: Vec<Movie> = self
            .docs
            .find_as(
                "movies",
                &Filter::And(vec![
                    ids_filter("movie_id", Some(&ids)),
                    Filter::Gte("year".into(), json!(from)),
                    Filter::Lte("year".into(), json!(to)),
                ]),
            )
            .await?;
        let in_range: BTreeSet<String> = movies.iter().map(|m| m.movie_id.clone()).collect();
        let ratings = self.ratings_by_movie(Some(&in_range)).await?;

        let mut seen = HashSet::new();
        let rows = movies
            .into_iter()
            .filter(|m| seen.insert(m.movie_id.clone()))
            .filter_map(|m| {
                let r = ratings.get(&m.movie_id)?;
                Some(TopMovieRow {
                    rating: r.average_rating?,
                    votes: r.num_votes,
                    movie_id: m.movie_id,
                    title: m.title,
                    year: m.year,
                })
            })
            .collect();
        Ok(finish(rows, cmp_top_movie, Some(n as usize), QueryRow::TopMovie))
    }

    async fn multi_role_actors(&self) -> Result<Vec<QueryRow>> {
        let characters: Vec<Character> = self.docs.find_as("characters", &Filter::All).await?;
        let mut counts: HashMap<(String, String), i64> = HashMap::new();
        for c in characters {
            if c.character_name.is_some() {
                *counts.entry((c.person_id, c.movie_id)).or_insert(0) += 1;
            }
        }
        counts.retain(|_, n| *n > 1);
        let pids: BTreeSet<String> = counts.keys().map(|(p, _)| p.clone()).collect();
        let mids: BTreeSet<String> = counts.keys().map(|(_, m)| m.clone()).collect();
        if counts.is_empty() {
            return Ok(Vec::new());
        }
        let persons = self.persons_by_id(Some(&pids)).await?;
        let movies = self.movies_by_id(Some(&mids)).await?;

        let rows = counts
            .into_iter()
            .filter_map(|((pid, mid), roles)| {
                let person = persons.get(&pid)?;
                let movie = movies.get(&mid)?;
                Some(MultiRoleRow {
                    name: person.name.clone(),
                    title: movie.title.clone(),
                    person_id: pid,
                    movie_id: mid,
                    roles,
                })
            })
            .collect();
        Ok(finish(
            rows,
            cmp_multi_role,
            Some(MULTI_ROLE_LIMIT),
            QueryRow::MultiRole,
        ))
    }

    async fn collaborations(&self, name: &str) -> Result<Vec<QueryRow>> {
        let pids: BTreeSet<String> = self
            .matching_persons(name)
            .await?
            .into_iter()
            .map(|p| p.person_id)
            .collect();
        if pids.is_empty() {
            return Ok(Vec::new());
        }
        let mids: BTreeSet<String> = self
            .acting_principals(Some(&pids))
            .await?
            .into_iter()
            .map(|p| p.movie_id)
            .collect();
        let directors: Vec<Credit> = self
            .docs
            .find_as("directors", &ids_filter("movie_id", Some(&mids)))
            .await?;
        let dids: BTreeSet<String> = directors.iter().map(|d| d.person_id.clone()).collect();
        let persons = self.persons_by_id(Some(&dids)).await?;

        let mut movies_per_director: HashMap<String, HashSet<String>> = HashMap::new();
        for d in directors {
            if matches!(persons.get(&d.person_id), Some(p) if p.name.is_some()) {
                movies_per_director
                    .entry(d.person_id)
                    .or_default()
                    .insert(d.movie_id);
            }
        }
        let rows = movies_per_director
            .into_iter()
            .filter_map(|(pid, movies)| {
                Some(CollaborationRow {
                    director: persons.get(&pid)?.name.clone()?,
                    movies: movies.len() as i64,
                })
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
        let averages: HashMap<String, f64> = self
            .ratings_by_movie(None)
            .await?
            .into_iter()
            .filter_map(|(id, r)| Some((id, r.average_rating?)))
            .collect();
        let movies: HashSet<String> = self
            .docs
            .distinct("movies", "movie_id", &Filter::All)
            .await?
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        let genres: Vec<Genre> = self.docs.find_as("genres", &Filter::All).await?;

        let mut seen = HashSet::new();
        let mut sums: HashMap<String, (f64, i64)> = HashMap::new();
        for g in genres {
            if !movies.contains(&g.movie_id) || !seen.insert((g.movie_id.clone(), g.genre.clone())) {
                continue;
            }
            if let Some(avg) = averages.get(&g.movie_id) {
                let e = sums.entry(g.genre).or_insert((0.0, 0));
                e.0 += avg;
                e.1 += 1;
            }
        }
        Ok(popular_genres_from_sums(
            sums.into_iter().map(|(g, (sum, n))| (g, sum, n)),
        ))
    }

    async fn career_by_decade(&self, name: &str) -> Result<Vec<QueryRow>> {
        let pids: BTreeSet<String> = self
            .matching_persons(name)
            .await?
            .into_iter()
            .map(|p| p.person_id)
            .collect();
        if pids.is_empty() {
            return Ok(Vec::new());
        }
        let mids: BTreeSet<String> = self
            .acting_principals(Some(&pids))
            .await?
            .into_iter()
            .map(|p| p.movie_id)
            .collect();
        let movies = self.movies_by_id(Some(&mids)).await?;
        let ratings = self.ratings_by_movie(Some(&mids)).await?;
        let appearances = movies.into_values().map(|m| {
            let r = ratings.get(&m.movie_id);
            Appearance {
                rating: r.and_then(|r| r.average_rating),
                votes: r.and_then(|r| r.num_votes),
                movie_id: m.movie_id,
                title: m.title,
                year: m.year,
            }
        });
        Ok(analytics::career_by_decade(appearances))
    }

    async fn top3_per_genre(&self) -> Result<Vec<QueryRow>> {
        let ratings: Vec<Rating> = self
            .docs
            .find_as("ratings", &Filter::Gt("num_votes".into(), json!(RANK_MIN_VOTES)))
            .await?;
        let rated: HashMap<String, (f64, i64)> = ratings
            .into_iter()
            .filter_map(|r| Some((r.movie_id, (r.average_rating?, r.num_votes?))))
            .collect();
        let ids: BTreeSet<String> = rated.keys().cloned().collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let movies = self.movies_by_id(Some(&ids)).await?;
        let genres: Vec<Genre> = self
            .docs
            .find_as("genres", &ids_filter("movie_id", Some(&ids)))
            .await?;

        let mut seen = HashSet::new();
        let candidates = genres
            .into_iter()
            .filter(|g| seen.insert((g.genre.clone(), g.movie_id.clone())))
            .filter_map(|g| {
                let movie = movies.get(&g.movie_id)?;
                let (rating, votes) = *rated.get(&g.movie_id)?;
                Some(GenreRankRow {
                    genre: g.genre,
                    rank: 0,
                    movie_id: g.movie_id,
                    title: movie.title.clone(),
                    rating,
                    votes,
                })
            })
            .collect();
        Ok(analytics::top_ranked_per_genre(candidates))
    }

    /// Acting appearances of every existing person in every existing movie.
    async fn all_timelines(&self) -> Result<Timelines> {
        let principals = self.acting_principals(None).await?;
        let movies = self.movies_by_id(None).await?;
        let ratings = self.ratings_by_movie(None).await?;
        let pids: BTreeSet<String> = principals.iter().map(|p| p.person_id.clone()).collect();
        let persons = self.persons_by_id(Some(&pids)).await?;

        let mut timelines = Timelines::new();
        for p in principals {
            let (Some(person), Some(movie)) = (persons.get(&p.person_id), movies.get(&p.movie_id)) else {
                continue;
            };
            let r = ratings.get(&p.movie_id);
            analytics::push_appearance(
                &mut timelines,
                &p.person_id,
                person.name.as_deref(),
                Appearance {
                    movie_id: movie.movie_id.clone(),
                    title: movie.title.clone(),
                    year: movie.year,
                    rating: r.and_then(|r| r.average_rating),
                    votes: r.and_then(|r| r.num_votes),
                },
            );
        }
        Ok(timelines)
    }

    async fn breakthrough(&self) -> Result<Vec<QueryRow>> {
        let timelines = self.all_timelines().await?;
        let hits = timelines
            .iter()
            .flat_map(|(pid, t)| analytics::breakthrough_hits(pid, t))
            .collect();
        Ok(analytics::breakthroughs(hits))
    }

    async fn longest_careers(&self) -> Result<Vec<QueryRow>> {
        let timelines = self.all_timelines().await?;
        Ok(analytics::longest_careers(&timelines))
    }

    /// Full read of one movie from the flat collections: one lookup per
    /// related collection, then one person lookup per credit.
    pub async fn read_movie(&self, movie_id: &str) -> Result<Option<MovieDocument>> {
        let by_movie = Filter::eq("movie_id", movie_id);
        let Some(movie) = self.docs.find_one("movies", &by_movie).await? else {
            return Ok(None);
        };
        let movie: Movie = serde_json::from_value(movie)?;
        let rating: Option<Rating> = self
            .docs
            .find_one("ratings", &by_movie)
            .await?
            .map(serde_json::from_value)
            .transpose()?;
        let genres: Vec<Genre> = self.docs.find_as("genres", &by_movie).await?;
        let titles: Vec<TitleAlias> = self.docs.find_as("titles", &by_movie).await?;
        let directors: Vec<Credit> = self.docs.find_as("directors", &by_movie).await?;
        let writers: Vec<Credit> = self.docs.find_as("writers", &by_movie).await?;
        let principals: Vec<Principal> = self
            .docs
            .find_as("principals", &Filter::And(vec![by_movie.clone(), acting()]))
            .await?;
        let characters: Vec<Character> = self.docs.find_as("characters", &by_movie).await?;

        let mut people: HashMap<String, Option<String>> = HashMap::new();
        let credited = directors
            .iter()
            .chain(writers.iter())
            .map(|c| c.person_id.as_str())
            .chain(principals.iter().map(|p| p.person_id.as_str()));
        for pid in credited {
            if let Some(v) = self.docs.find_one("persons", &Filter::eq("person_id", pid)).await? {
                let person: Person = serde_json::from_value::<Person>(v)?;
                people.insert(person.person_id, person.name);
            }
        }

        let sources = MovieSources {
            movie,
            rating,
            genres: genres.into_iter().map(|g| g.genre).collect(),
            titles,
            directors: directors.into_iter().map(|d| d.person_id).collect(),
            writers: writers.into_iter().map(|w| w.person_id).collect(),
            principals,
            characters,
        };
        Ok(Some(assemble(sources, &people)))
    }
}

#[async_trait]
impl QueryExecutor for FlatExecutor {
    fn representation(&self) -> Representation {
        Representation::Flat
    }

    async fn run(&self, query: &Query) -> Result<Vec<QueryRow>> {
        self.require_collections(query.id()).await?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn ids_filter_selects_all_without_ids() {
        assert_eq!(ids_filter("movie_id", None), Filter::All);
        let ids: BTreeSet<String> = ["tt2", "tt1"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            ids_filter("movie_id", Some(&ids)),
            Filter::In("movie_id".into(), vec![Value::from("tt1"), Value::from("tt2")])
        );
    }
}
