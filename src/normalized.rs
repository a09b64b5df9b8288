//! Catalog queries as SQL joins over the normalized store.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use cinegraph_core::analytics::{self, Appearance};
use cinegraph_core::catalog::{
    cmp_collaboration, cmp_filmography, cmp_multi_role, cmp_top_movie, finish,
    popular_genres_from_sums, BreakthroughRow, CareerRow, CollaborationRow, FilmographyRow,
    GenreRankRow, MultiRoleRow, Query, QueryId, QueryRow, TopMovieRow, BREAKTHROUGH_MIN_PRIOR,
    BREAKTHROUGH_VOTES, CAREER_LIMIT, CAREER_MIN_MOVIES, COLLABORATION_LIMIT, FILMOGRAPHY_LIMIT,
    MULTI_ROLE_LIMIT, RANK_MIN_VOTES,
};
use cinegraph_core::error::EngineError;
use cinegraph_core::executor::{QueryExecutor, Representation};
use cinegraph_core::models::ACTING_CATEGORIES;

pub struct NormalizedExecutor {
    pool: SqlitePool,
}

/// `('actor', 'actress')`
/// `('actor', 'actress')` for SQL `IN` clauses.
pub(crate) fn acting_list() -> String {
    let quoted: Vec<String> = ACTING_CATEGORIES
        .iter()
        .map(|c| format!("'{}'", c))
        .collect();
    format!("({})", quoted.join(", "))
}

impl NormalizedExecutor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn require_tables(&self, id: QueryId) -> Result<()> {
        for table in id.sources() {
            let found: Option<i64> = sqlx::query_scalar(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(*table)
            .fetch_optional(&self.pool)
            .await?;
            if found.is_none() {
                anyhow::bail!(EngineError::missing("table", table));
            }
        }
        Ok(())
    }

    async fn filmography(&self, name: &str) -> Result<Vec<QueryRow>> {
        let sql = format!(
            r#"
            SELECT m.movie_id, m.title, m.year, c.character_name
            FROM persons p
            JOIN principals pr ON pr.person_id = p.person_id
            JOIN movies m ON m.movie_id = pr.movie_id
            LEFT JOIN characters c
                   ON c.movie_id = pr.movie_id
                  AND c.person_id = pr.person_id
                  AND c.character_name IS NOT NULL
            WHERE instr(lower(p.name), lower(?)) > 0
              AND pr.category IN {}
            "#,
            acting_list()
        );
        let rows = sqlx::query(&sql).bind(name).fetch_all(&self.pool).await?;
        let rows = rows
            .iter()
            .map(|r| FilmographyRow {
                movie_id: r.get("movie_id"),
                title: r.get("title"),
                year: r.get("year"),
                character: r.get("character_name"),
            })
            .collect();
        Ok(finish(
            rows,
            cmp_filmography,
            Some(FILMOGRAPHY_LIMIT),
            QueryRow::Filmography,
        ))
    }

    async fn top_by_genre(&self, genre: &str, from: i64, to: i64, n: i64) -> Result<Vec<QueryRow>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT m.movie_id, m.title, m.year, r.average_rating, r.num_votes
            FROM genres g
            JOIN movies m ON m.movie_id = g.movie_id
            JOIN ratings r ON r.movie_id = g.movie_id
            WHERE g.genre = ?
              AND m.year BETWEEN ? AND ?
              AND r.average_rating IS NOT NULL
            ORDER BY r.average_rating DESC, r.num_votes DESC, m.movie_id
            LIMIT ?
            "#,
        )
        .bind(genre)
        .bind(from)
        .bind(to)
        .bind(n)
        .fetch_all(&self.pool)
        .await?;
        let rows = rows
            .iter()
            .map(|r| TopMovieRow {
                movie_id: r.get("movie_id"),
                title: r.get("title"),
                year: r.get("year"),
                rating: r.get("average_rating"),
                votes: r.get("num_votes"),
            })
            .collect();
        Ok(finish(rows, cmp_top_movie, Some(n as usize), QueryRow::TopMovie))
    }

    async fn multi_role_actors(&self) -> Result<Vec<QueryRow>> {
        let rows = sqlx::query(
            r#"
            SELECT c.person_id, p.name, c.movie_id, m.title, COUNT(c.character_name) AS roles
            FROM characters c
            JOIN persons p ON p.person_id = c.person_id
            JOIN movies m ON m.movie_id = c.movie_id
            GROUP BY c.person_id, c.movie_id
            HAVING COUNT(c.character_name) > 1
            ORDER BY roles DESC, c.person_id, c.movie_id
            LIMIT ?
            "#,
        )
        .bind(MULTI_ROLE_LIMIT as i64)
        .fetch_all(&self.pool)
        .await?;
        let rows = rows
            .iter()
            .map(|r| MultiRoleRow {
                person_id: r.get("person_id"),
                name: r.get("name"),
                movie_id: r.get("movie_id"),
                title: r.get("title"),
                roles: r.get("roles"),
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
        let sql = format!(
            r#"
            SELECT d.person_id, dp.name AS director, COUNT(DISTINCT d.movie_id) AS movies
            FROM persons a
            JOIN principals pr ON pr.person_id = a.person_id AND pr.category IN {}
            JOIN directors d ON d.movie_id = pr.movie_id
            JOIN persons dp ON dp.person_id = d.person_id
            WHERE instr(lower(a.name), lower(?)) > 0
              AND dp.name IS NOT NULL
            GROUP BY d.person_id
            "#,
            acting_list()
        );
        let rows = sqlx::query(&sql).bind(name).fetch_all(&self.pool).await?;
        let rows = rows
            .iter()
            .map(|r| CollaborationRow {
                director: r.get("director"),
                movies: r.get("movies"),
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
        let rows = sqlx::query(
            r#"
            SELECT g.genre, SUM(r.average_rating) AS total, COUNT(*) AS movies
            FROM (SELECT DISTINCT movie_id, genre FROM genres) g
            JOIN movies m ON m.movie_id = g.movie_id
            JOIN ratings r ON r.movie_id = g.movie_id
            WHERE r.average_rating IS NOT NULL
            GROUP BY g.genre
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(popular_genres_from_sums(rows.iter().map(|r| {
            (
                r.get::<String, _>("genre"),
                r.get::<f64, _>("total"),
                r.get::<i64, _>("movies"),
            )
        })))
    }

    async fn career_by_decade(&self, name: &str) -> Result<Vec<QueryRow>> {
        let sql = format!(
            r#"
            SELECT DISTINCT m.movie_id, m.title, m.year, r.average_rating, r.num_votes
            FROM persons p
            JOIN principals pr ON pr.person_id = p.person_id AND pr.category IN {}
            JOIN movies m ON m.movie_id = pr.movie_id
            LEFT JOIN ratings r ON r.movie_id = m.movie_id
            WHERE instr(lower(p.name), lower(?)) > 0
              AND m.year IS NOT NULL
            "#,
            acting_list()
        );
        let rows = sqlx::query(&sql).bind(name).fetch_all(&self.pool).await?;
        Ok(analytics::career_by_decade(rows.iter().map(appearance)))
    }

    async fn top3_per_genre(&self) -> Result<Vec<QueryRow>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT g.genre, m.movie_id, m.title, r.average_rating, r.num_votes
            FROM genres g
            JOIN movies m ON m.movie_id = g.movie_id
            JOIN ratings r ON r.movie_id = g.movie_id
            WHERE r.average_rating IS NOT NULL
              AND r.num_votes > ?
            ORDER BY g.genre, r.average_rating DESC, r.num_votes DESC
            "#,
        )
        .bind(RANK_MIN_VOTES)
        .fetch_all(&self.pool)
        .await?;
        let candidates: Vec<GenreRankRow> = rows
            .iter()
            .map(|r| GenreRankRow {
                genre: r.get("genre"),
                rank: 0,
                movie_id: r.get("movie_id"),
                title: r.get("title"),
                rating: r.get("average_rating"),
                votes: r.get("num_votes"),
            })
            .collect();
        Ok(analytics::top_ranked_per_genre(candidates))
    }

    async fn breakthrough(&self) -> Result<Vec<QueryRow>> {
        let acting = acting_list();
        let sql = format!(
            r#"
            SELECT p.person_id, p.name, m.movie_id, m.title, m.year, r.num_votes
            FROM principals pr
            JOIN persons p ON p.person_id = pr.person_id
            JOIN movies m ON m.movie_id = pr.movie_id
            JOIN ratings r ON r.movie_id = pr.movie_id
            WHERE pr.category IN {acting}
              AND m.year IS NOT NULL
              AND r.num_votes > ?1
              AND (
                  SELECT COUNT(DISTINCT m2.movie_id)
                  FROM principals pr2
                  JOIN movies m2 ON m2.movie_id = pr2.movie_id
                  JOIN ratings r2 ON r2.movie_id = pr2.movie_id
                  WHERE pr2.person_id = pr.person_id
                    AND pr2.category IN {acting}
                    AND m2.year < m.year
                    AND r2.num_votes < ?1
              ) >= ?2
            ORDER BY p.person_id, m.year, m.movie_id
            "#,
        );
        let rows = sqlx::query(&sql)
            .bind(BREAKTHROUGH_VOTES)
            .bind(BREAKTHROUGH_MIN_PRIOR as i64)
            .fetch_all(&self.pool)
            .await?;
        let candidates = rows
            .iter()
            .map(|r| BreakthroughRow {
                person_id: r.get("person_id"),
                name: r.get("name"),
                movie_id: r.get("movie_id"),
                title: r.get("title"),
                year: r.get("year"),
                votes: r.get("num_votes"),
            })
            .collect();
        Ok(analytics::breakthroughs(candidates))
    }

    async fn longest_careers(&self) -> Result<Vec<QueryRow>> {
        let sql = format!(
            r#"
            SELECT p.person_id, p.name,
                   MAX(m.year) - MIN(m.year) AS span,
                   COUNT(DISTINCT m.movie_id) AS movies
            FROM principals pr
            JOIN persons p ON p.person_id = pr.person_id
            JOIN movies m ON m.movie_id = pr.movie_id
            WHERE pr.category IN {}
              AND m.year IS NOT NULL
            GROUP BY p.person_id
            HAVING span > 0 AND movies > ?
            ORDER BY span DESC, p.person_id
            LIMIT ?
            "#,
            acting_list()
        );
        let rows = sqlx::query(&sql)
            .bind(CAREER_MIN_MOVIES)
            .bind(CAREER_LIMIT as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| {
                QueryRow::Career(CareerRow {
                    person_id: r.get("person_id"),
                    name: r.get("name"),
                    span: r.get("span"),
                    movies: r.get("movies"),
                })
            })
            .collect())
    }
}

fn appearance(r: &SqliteRow) -> Appearance {
    Appearance {
        movie_id: r.get("movie_id"),
        title: r.get("title"),
        year: r.get("year"),
        rating: r.get("average_rating"),
        votes: r.get("num_votes"),
    }
}

#[async_trait]
impl QueryExecutor for NormalizedExecutor {
    fn representation(&self) -> Representation {
        Representation::Normalized
    }

    async fn run(&self, query: &Query) -> Result<Vec<QueryRow>> {
        self.require_tables(query.id()).await?;
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
