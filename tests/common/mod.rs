#![allow(dead_code)]

//! Deterministic movie graph shared by the integration tests.
//!
//! Every rating is a multiple of 0.5 so sums and averages are exact in
//! `f64` whatever order a store adds them in.

use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tempfile::TempDir;

use cinegraph::config::Config;
use cinegraph::context::EngineContext;

pub const SCHEMA: [&str; 10] = [
    "CREATE TABLE movies (movie_id TEXT PRIMARY KEY, title TEXT, original_title TEXT, year INTEGER, runtime INTEGER)",
    "CREATE TABLE persons (person_id TEXT PRIMARY KEY, name TEXT, birth_year INTEGER, death_year INTEGER)",
    "CREATE TABLE ratings (movie_id TEXT PRIMARY KEY, average_rating REAL, num_votes INTEGER)",
    "CREATE TABLE genres (movie_id TEXT NOT NULL, genre TEXT NOT NULL)",
    "CREATE TABLE titles (movie_id TEXT NOT NULL, ordering INTEGER, title TEXT, region TEXT, language TEXT)",
    "CREATE TABLE principals (movie_id TEXT NOT NULL, person_id TEXT NOT NULL, ordering INTEGER, category TEXT, job TEXT)",
    "CREATE TABLE characters (movie_id TEXT NOT NULL, person_id TEXT NOT NULL, character_name TEXT)",
    "CREATE TABLE directors (movie_id TEXT NOT NULL, person_id TEXT NOT NULL)",
    "CREATE TABLE writers (movie_id TEXT NOT NULL, person_id TEXT NOT NULL)",
    "CREATE TABLE professions (person_id TEXT NOT NULL, job_name TEXT)",
];

/// Orphaned rows planted by [`load_fixture`], one per affected rule.
pub const PLANTED_ORPHANS: i64 = 5;

/// Movies in the fixture (orphans excluded).
pub const FIXTURE_MOVIES: i64 = 60 + 3 + 5 + 5 + 1 + 4 + 5;

pub struct Fixture {
    pub tmp: TempDir,
    pub normalized: PathBuf,
    pub documents: PathBuf,
}

impl Fixture {
    pub fn config(&self) -> Config {
        Config::with_paths(&self.normalized, &self.documents)
    }
}

pub async fn raw_pool(path: &Path) -> SqlitePool {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap()
}

async fn exec(pool: &SqlitePool, sql: &str) {
    sqlx::query(sql).execute(pool).await.unwrap();
}

async fn person(pool: &SqlitePool, id: &str, name: Option<&str>) {
    sqlx::query("INSERT INTO persons (person_id, name) VALUES (?, ?)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await
        .unwrap();
}

async fn movie(
    pool: &SqlitePool,
    id: &str,
    title: &str,
    year: Option<i64>,
    rating: Option<(f64, i64)>,
    genres: &[&str],
) {
    sqlx::query("INSERT INTO movies (movie_id, title, original_title, year, runtime) VALUES (?, ?, ?, ?, 100)")
        .bind(id)
        .bind(title)
        .bind(title)
        .bind(year)
        .execute(pool)
        .await
        .unwrap();
    if let Some((avg, votes)) = rating {
        sqlx::query("INSERT INTO ratings (movie_id, average_rating, num_votes) VALUES (?, ?, ?)")
            .bind(id)
            .bind(avg)
            .bind(votes)
            .execute(pool)
            .await
            .unwrap();
    }
    for g in genres {
        sqlx::query("INSERT INTO genres (movie_id, genre) VALUES (?, ?)")
            .bind(id)
            .bind(*g)
            .execute(pool)
            .await
            .unwrap();
    }
}

async fn acts(pool: &SqlitePool, movie_id: &str, person_id: &str, ordering: i64, category: &str) {
    sqlx::query("INSERT INTO principals (movie_id, person_id, ordering, category) VALUES (?, ?, ?, ?)")
        .bind(movie_id)
        .bind(person_id)
        .bind(ordering)
        .bind(category)
        .execute(pool)
        .await
        .unwrap();
}

async fn plays(pool: &SqlitePool, movie_id: &str, person_id: &str, character: &str) {
    sqlx::query("INSERT INTO characters (movie_id, person_id, character_name) VALUES (?, ?, ?)")
        .bind(movie_id)
        .bind(person_id)
        .bind(character)
        .execute(pool)
        .await
        .unwrap();
}

async fn credit(pool: &SqlitePool, table: &str, movie_id: &str, person_id: &str) {
    sqlx::query(&format!("INSERT INTO {} (movie_id, person_id) VALUES (?, ?)", table))
        .bind(movie_id)
        .bind(person_id)
        .execute(pool)
        .await
        .unwrap();
}

/// Create the schema and load the fixture graph.
///
/// | Scenario | Data |
/// |----------|------|
/// | popular genres | 60 Drama fillers rated 7.5, the only qualifying genre |
/// | longest careers | Veteran Actor in 12 fillers, 1960..1971 |
/// | filmography, multi-role | Brad Pitt in 3 Action movies, two roles in tt4003 |
/// | collaborations | Johnny Depp: Tim Burton twice, Ridley Scott once, one unnamed director |
/// | career by decade | Tom Hanks in 1988, 1991 and an unrated 1999 movie |
/// | breakthrough | Riser Rookie: three small movies, then 300k votes in 1995 |
/// | top 3 per genre | Noir with a tie at rank 2 |
pub async fn load_fixture(pool: &SqlitePool) {
    for ddl in SCHEMA {
        exec(pool, ddl).await;
    }

    for (id, name) in [
        ("nm001", Some("Brad Pitt")),
        ("nm002", Some("Johnny Depp")),
        ("nm003", Some("Tom Hanks")),
        ("nm010", Some("Ridley Scott")),
        ("nm011", Some("Tim Burton")),
        ("nm012", None),
        ("nm020", Some("Riser Rookie")),
        ("nm030", Some("Veteran Actor")),
        ("nm040", Some("Multi Role")),
        ("nm050", Some("Writer One")),
        ("nm060", Some("Support Player")),
        ("nm061", Some("Extra Person")),
    ] {
        person(pool, id, name).await;
    }

    // Drama fillers; 1000 votes keeps them out of top-3-per-genre.
    for i in 0..60 {
        let id = format!("tt{}", 1000 + i);
        movie(pool, &id, &format!("Drama {}", i), Some(1960 + i), Some((7.5, 1000)), &["Drama"]).await;
        if i < 12 {
            acts(pool, &id, "nm030", 1, "actor").await;
        }
    }
    acts(pool, "tt1000", "nm001", 5, "producer").await;

    // Tom Hanks by decade.
    movie(pool, "tt2001", "Big Start", Some(1988), Some((8.0, 10_000)), &["Comedy"]).await;
    movie(pool, "tt2002", "Middle Run", Some(1991), Some((7.0, 20_000)), &["Comedy"]).await;
    movie(pool, "tt2003", "Quiet Year", Some(1999), None, &["Comedy"]).await;
    for id in ["tt2001", "tt2002", "tt2003"] {
        acts(pool, id, "nm003", 1, "actor").await;
    }

    // Riser Rookie.
    for (id, year, votes) in [
        ("tt3001", 1990, 1_000),
        ("tt3002", 1991, 2_000),
        ("tt3003", 1992, 3_000),
        ("tt3004", 1995, 300_000),
        ("tt3005", 1997, 400_000),
    ] {
        movie(pool, id, &format!("Rise {}", year), Some(year), Some((6.0, votes)), &["Thriller"]).await;
        acts(pool, id, "nm020", 1, "actor").await;
    }

    // Brad Pitt, Action.
    movie(pool, "tt4001", "Ocean Heist", Some(2001), Some((8.0, 250_000)), &["Action", "Action"]).await;
    movie(pool, "tt4002", "Quiet Road", Some(2005), Some((8.0, 150_000)), &["Action"]).await;
    movie(pool, "tt4003", "Fight Club", Some(2008), Some((8.5, 900_000)), &["Action"]).await;
    movie(pool, "tt4004", "Old Action", Some(1999), Some((9.0, 50_000)), &["Action"]).await;
    movie(pool, "tt4005", "No Votes", Some(2003), None, &["Action"]).await;
    acts(pool, "tt4001", "nm001", 1, "actor").await;
    acts(pool, "tt4002", "nm001", 1, "actor").await;
    // Inserted out of order; the embedded cast must come back 1, 2, 3.
    acts(pool, "tt4003", "nm061", 3, "actress").await;
    acts(pool, "tt4003", "nm060", 1, "actor").await;
    acts(pool, "tt4003", "nm001", 2, "actor").await;
    acts(pool, "tt4003", "nm010", 4, "director").await;
    plays(pool, "tt4001", "nm001", "Rusty").await;
    plays(pool, "tt4003", "nm001", "Tyler").await;
    plays(pool, "tt4003", "nm001", "Jack").await;
    credit(pool, "directors", "tt4003", "nm010").await;
    credit(pool, "writers", "tt4003", "nm050").await;
    for (ordering, title, region) in [(2, "Fight Klub", "DE"), (1, "Fight Club", "US")] {
        sqlx::query("INSERT INTO titles (movie_id, ordering, title, region) VALUES ('tt4003', ?, ?, ?)")
            .bind(ordering)
            .bind(title)
            .bind(region)
            .execute(pool)
            .await
            .unwrap();
    }

    // Multi Role plays three parts.
    movie(pool, "tt5001", "Triple", Some(1963), Some((6.5, 800)), &["Comedy"]).await;
    acts(pool, "tt5001", "nm040", 1, "actor").await;
    for c in ["Ann", "Bea", "Cid"] {
        plays(pool, "tt5001", "nm040", c).await;
    }

    // Johnny Depp and his directors.
    for (id, director) in [
        ("tt6001", "nm011"),
        ("tt6002", "nm011"),
        ("tt6003", "nm010"),
        ("tt6004", "nm012"),
    ] {
        movie(pool, id, &format!("Depp {}", id), Some(2000), Some((6.0, 5_000)), &["Fantasy"]).await;
        acts(pool, id, "nm002", 1, "actor").await;
        credit(pool, "directors", id, director).await;
    }

    // Noir ranking: 9.0, then a tie at 8.0, then 7.0 at rank 4.
    for (id, rating, votes) in [
        ("tt7001", 9.0, 5_000),
        ("tt7002", 8.0, 4_000),
        ("tt7003", 8.0, 4_000),
        ("tt7004", 7.0, 3_000),
        ("tt7005", 9.5, 500),
    ] {
        movie(pool, id, &format!("Noir {}", id), Some(1950), Some((rating, votes)), &["Noir"]).await;
    }

    sqlx::query("INSERT INTO professions (person_id, job_name) VALUES ('nm001', 'actor')")
        .execute(pool)
        .await
        .unwrap();

    // Orphans.
    acts(pool, "tt9999", "nm001", 1, "actor").await;
    plays(pool, "tt4001", "nm999", "Ghost").await;
    sqlx::query("INSERT INTO ratings (movie_id, average_rating, num_votes) VALUES ('tt9998', 5.0, 10)")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO genres (movie_id, genre) VALUES ('tt9999', 'Action')")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO professions (person_id, job_name) VALUES ('nm998', 'actor')")
        .execute(pool)
        .await
        .unwrap();
}

/// Temp dir with a loaded normalized store and an empty documents path.
pub async fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let normalized = tmp.path().join("normalized.sqlite");
    let documents = tmp.path().join("docs").join("documents.sqlite");
    let pool = raw_pool(&normalized).await;
    load_fixture(&pool).await;
    pool.close().await;
    Fixture {
        tmp,
        normalized,
        documents,
    }
}

pub async fn open(fx: &Fixture) -> EngineContext {
    EngineContext::open(&fx.config()).await.unwrap()
}

/// Repair, mirror and rebuild: every representation ready to query.
pub async fn prepared() -> (Fixture, EngineContext) {
    let fx = fixture().await;
    let ctx = open(&fx).await;
    cinegraph::repair::repair_orphans(&ctx).await.unwrap();
    cinegraph::mirror::mirror_flat(&ctx).await.unwrap();
    cinegraph::rebuild::rebuild_embedded(&ctx).await.unwrap();
    (fx, ctx)
}

pub fn kv(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
