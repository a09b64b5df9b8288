//! Rebuild of the embedded collection from the normalized store.
//!
//! Movies are read in `rebuild.batch_size` batches by rowid, and only the
//! related rows of the current batch are loaded. Documents are written into
//! `<collection>_build`. Only when every movie has been assembled and
//! inserted is the build swapped in, in a single transaction, for the live
//! collection. Any failure before the swap drops the build and leaves the
//! previous collection untouched.
//!
//! Dropping the live collection during the swap also drops its indexes, so
//! managed embedded indexes are recreated on the new generation afterwards.

use std::collections::HashMap;
use std::time::Instant;

use anyhow::Result;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use cinegraph_core::document::{assemble, MovieSources};
use cinegraph_core::error::EngineError;
use cinegraph_core::executor::Representation;
use cinegraph_core::models::{Character, Movie, Principal, Rating, TitleAlias};

use crate::context::EngineContext;
use crate::indexes::IndexManager;
use crate::normalized::acting_list;

/// Tables the rebuild reads.
pub const SOURCE_TABLES: [&str; 9] = [
    "movies",
    "persons",
    "ratings",
    "genres",
    "titles",
    "principals",
    "characters",
    "directors",
    "writers",
];

#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    pub collection: String,
    pub movies: i64,
    pub elapsed_ms: f64,
}

pub fn build_collection_name(collection: &str) -> String {
    format!("{}_build", collection)
}

/// Per-movie source rows, grouped by `movie_id`.
#[derive(Default)]
struct Grouped {
    ratings: HashMap<String, Rating>,
    genres: HashMap<String, Vec<String>>,
    titles: HashMap<String, Vec<TitleAlias>>,
    directors: HashMap<String, Vec<String>>,
    writers: HashMap<String, Vec<String>>,
    principals: HashMap<String, Vec<Principal>>,
    characters: HashMap<String, Vec<Character>>,
}

impl Grouped {
    fn take(&mut self, movie: Movie) -> MovieSources {
        let id = movie.movie_id.clone();
        MovieSources {
            rating: self.ratings.remove(&id),
            genres: self.genres.remove(&id).unwrap_or_default(),
            titles: self.titles.remove(&id).unwrap_or_default(),
            directors: self.directors.remove(&id).unwrap_or_default(),
            writers: self.writers.remove(&id).unwrap_or_default(),
            principals: self.principals.remove(&id).unwrap_or_default(),
            characters: self.characters.remove(&id).unwrap_or_default(),
            movie,
        }
    }
}

fn movie_row(r: &SqliteRow) -> Result<Movie> {
    Ok(Movie {
        movie_id: r.try_get("movie_id")?,
        title: r.try_get("title")?,
        original_title: r.try_get("original_title")?,
        year: r.try_get("year")?,
        runtime: r.try_get("runtime")?,
    })
}

/// Restricts a source query to the movies of one batch, given as the
/// half-open rowid range `(lo, hi]` of the `movies` table.
const IN_BATCH: &str = "movie_id IN (SELECT movie_id FROM movies WHERE rowid > ? AND rowid <= ?)";

async fn fetch_grouped<T>(
    pool: &SqlitePool,
    sql: &str,
    (lo, hi): (i64, i64),
    map: fn(&SqliteRow) -> Result<T>,
) -> Result<HashMap<String, Vec<T>>> {
    let rows = sqlx::query(sql).bind(lo).bind(hi).fetch_all(pool).await?;
    let mut grouped: HashMap<String, Vec<T>> = HashMap::new();
    for r in &rows {
        let movie_id: String = r.try_get("movie_id")?;
        grouped.entry(movie_id).or_default().push(map(r)?);
    }
    Ok(grouped)
}

/// Names of every person credited on a movie of the batch.
async fn load_people(pool: &SqlitePool, (lo, hi): (i64, i64)) -> Result<HashMap<String, Option<String>>> {
    let sql = format!(
        "SELECT person_id, name FROM persons WHERE person_id IN ( \
         SELECT person_id FROM principals WHERE {b} \
         UNION SELECT person_id FROM directors WHERE {b} \
         UNION SELECT person_id FROM writers WHERE {b})",
        b = IN_BATCH
    );
    let mut query = sqlx::query(&sql);
    for _ in 0..3 {
        query = query.bind(lo).bind(hi);
    }
    let mut people = HashMap::new();
    for r in query.fetch_all(pool).await? {
        people.insert(r.try_get("person_id")?, r.try_get("name")?);
    }
    Ok(people)
}

/// Load the related rows of one batch of movies.
async fn load_sources(pool: &SqlitePool, range: (i64, i64)) -> Result<(HashMap<String, Option<String>>, Grouped)> {
    let people = load_people(pool, range).await?;

    let mut ratings = HashMap::new();
    for r in sqlx::query(&format!(
        "SELECT movie_id, average_rating, num_votes FROM ratings WHERE {}",
        IN_BATCH
    ))
    .bind(range.0)
    .bind(range.1)
    .fetch_all(pool)
    .await?
    {
        let rating = Rating {
            movie_id: r.try_get("movie_id")?,
            average_rating: r.try_get("average_rating")?,
            num_votes: r.try_get("num_votes")?,
        };
        ratings.entry(rating.movie_id.clone()).or_insert(rating);
    }

    let grouped = Grouped {
        ratings,
        genres: fetch_grouped(
            pool,
            &format!("SELECT movie_id, genre FROM genres WHERE {}", IN_BATCH),
            range,
            |r| Ok(r.try_get("genre")?),
        )
        .await?,
        titles: fetch_grouped(
            pool,
            &format!(
                "SELECT movie_id, ordering, title, region, language FROM titles WHERE {}",
                IN_BATCH
            ),
            range,
            |r| {
                Ok(TitleAlias {
                    movie_id: r.try_get("movie_id")?,
                    ordering: r.try_get("ordering")?,
                    title: r.try_get("title")?,
                    region: r.try_get("region")?,
                    language: r.try_get("language")?,
                })
            },
        )
        .await?,
        directors: fetch_grouped(
            pool,
            &format!("SELECT movie_id, person_id FROM directors WHERE {}", IN_BATCH),
            range,
            |r| Ok(r.try_get("person_id")?),
        )
        .await?,
        writers: fetch_grouped(
            pool,
            &format!("SELECT movie_id, person_id FROM writers WHERE {}", IN_BATCH),
            range,
            |r| Ok(r.try_get("person_id")?),
        )
        .await?,
        principals: fetch_grouped(
            pool,
            &format!(
                "SELECT movie_id, person_id, ordering, category, job FROM principals \
                 WHERE {} AND category IN {}",
                IN_BATCH,
                acting_list()
            ),
            range,
            |r| {
                Ok(Principal {
                    movie_id: r.try_get("movie_id")?,
                    person_id: r.try_get("person_id")?,
                    ordering: r.try_get("ordering")?,
                    category: r.try_get("category")?,
                    job: r.try_get("job")?,
                })
            },
        )
        .await?,
        characters: fetch_grouped(
            pool,
            &format!(
                "SELECT movie_id, person_id, character_name FROM characters WHERE {} ORDER BY rowid",
                IN_BATCH
            ),
            range,
            |r| {
                Ok(Character {
                    movie_id: r.try_get("movie_id")?,
                    person_id: r.try_get("person_id")?,
                    character_name: r.try_get("character_name")?,
                })
            },
        )
        .await?,
    };
    Ok((people, grouped))
}

/// Assemble every movie into the build collection. Returns the count.
async fn build_into(ctx: &EngineContext, build: &str) -> Result<i64> {
    let pool = &ctx.normalized;
    let docs = &ctx.documents;
    docs.create_collection(build).await?;

    let batch = ctx.config.rebuild.batch_size as i64;
    let mut last = i64::MIN;
    let mut built = 0i64;
    loop {
        let rows = sqlx::query(
            "SELECT rowid AS rid, movie_id, title, original_title, year, runtime \
             FROM movies WHERE rowid > ? ORDER BY rowid LIMIT ?",
        )
        .bind(last)
        .bind(batch)
        .fetch_all(pool)
        .await?;
        let Some(tail) = rows.last() else {
            break;
        };
        let range: (i64, i64) = (last, tail.try_get("rid")?);
        let (people, mut grouped) = load_sources(pool, range).await?;
        debug!(persons = people.len(), movies = rows.len(), "loaded batch source rows");

        let mut documents = Vec::with_capacity(rows.len());
        for r in &rows {
            let movie = movie_row(r)?;
            documents.push(assemble(grouped.take(movie), &people));
        }
        last = range.1;
        built += docs.insert_all(build, &documents).await? as i64;
        debug!(built, "embedded batch written");
    }
    Ok(built)
}

/// Rebuild the embedded collection and swap it in atomically.
///
/// # Errors
///
/// - [`EngineError::Configuration`] when a source table is missing (checked
///   before anything is written).
/// - [`EngineError::RebuildIncomplete`] when building or swapping fails;
///   the previous collection is still in place.
pub async fn rebuild_embedded(ctx: &EngineContext) -> Result<RebuildReport> {
    for table in SOURCE_TABLES {
        ctx.require_table(table).await?;
    }
    let collection = ctx.embedded_collection().to_string();
    let build = build_collection_name(&collection);
    let docs = &ctx.documents;
    let start = Instant::now();

    // Leftover from an interrupted run.
    docs.drop_collection(&build).await?;

    let built = match build_into(ctx, &build).await {
        Ok(n) => n,
        Err(e) => return Err(abandon(ctx, &collection, &build, e).await),
    };
    if let Err(e) = docs.replace_collection(&build, &collection).await {
        return Err(abandon(ctx, &collection, &build, e).await);
    }

    if let Some(report) = IndexManager::new(ctx, Representation::Embedded).restore().await? {
        info!(indexes = report.created.len(), "managed embedded indexes restored");
    }

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    info!(collection = %collection, movies = built, elapsed_ms, "embedded collection rebuilt");
    Ok(RebuildReport {
        collection,
        movies: built,
        elapsed_ms,
    })
}

async fn abandon(ctx: &EngineContext, collection: &str, build: &str, cause: anyhow::Error) -> anyhow::Error {
    warn!(collection, error = %cause, "rebuild failed, dropping build");
    if let Err(e) = ctx.documents.drop_collection(build).await {
        warn!(build, error = %e, "could not drop build collection");
    }
    EngineError::RebuildIncomplete {
        collection: collection.to_string(),
        reason: format!("{:#}", cause),
    }
    .into()
}
