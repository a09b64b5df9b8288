//! Aggregation steps shared by the executors.
//!
//! The flat and embedded stores gather acting [`Appearance`]s per person
//! and hand them to the functions below. The normalized executor does most
//! of this in SQL but reuses the final steps (decade buckets, genre ranks,
//! earliest breakthrough) so every store shapes results the same way.

use std::collections::{BTreeMap, HashMap};

use crate::catalog::{
    cmp_breakthrough, cmp_career, cmp_genre_rank, decade_of, finish, round2, BreakthroughRow,
    CareerRow, DecadeRow, GenreRankRow, QueryRow, BREAKTHROUGH_LIMIT, BREAKTHROUGH_MIN_PRIOR,
    BREAKTHROUGH_VOTES, CAREER_LIMIT, CAREER_MIN_MOVIES, RANK_CUTOFF,
};
use crate::ranking::{first_per_group, rank_with_ties};

/// One acting credit joined with its movie and rating.
#[derive(Debug, Clone, PartialEq)]
pub struct Appearance {
    pub movie_id: String,
    pub title: Option<String>,
    pub year: Option<i64>,
    pub rating: Option<f64>,
    pub votes: Option<i64>,
}

/// All acting appearances of one person.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    pub name: Option<String>,
    pub appearances: Vec<Appearance>,
}

/// Timelines keyed by person id.
pub type Timelines = HashMap<String, Timeline>;

pub fn push_appearance(timelines: &mut Timelines, person_id: &str, name: Option<&str>, appearance: Appearance) {
    let entry = timelines.entry(person_id.to_string()).or_default();
    if entry.name.is_none() {
        entry.name = name.map(str::to_string);
    }
    entry.appearances.push(appearance);
}

fn distinct_by_movie(appearances: impl IntoIterator<Item = Appearance>) -> Vec<Appearance> {
    let mut seen: BTreeMap<String, Appearance> = BTreeMap::new();
    for a in appearances {
        seen.entry(a.movie_id.clone()).or_insert(a);
    }
    seen.into_values().collect()
}

/// Count distinct dated movies and average their ratings per decade.
pub fn career_by_decade(appearances: impl IntoIterator<Item = Appearance>) -> Vec<QueryRow> {
    let mut buckets: BTreeMap<i64, (i64, f64, i64)> = BTreeMap::new();
    for a in distinct_by_movie(appearances) {
        let Some(year) = a.year else { continue };
        let bucket = buckets.entry(decade_of(year)).or_insert((0, 0.0, 0));
        bucket.0 += 1;
        if let Some(r) = a.rating {
            bucket.1 += r;
            bucket.2 += 1;
        }
    }
    buckets
        .into_iter()
        .map(|(decade, (movies, sum, rated))| {
            QueryRow::Decade(DecadeRow {
                decade,
                movies,
                average: (rated > 0).then(|| round2(sum / rated as f64)),
            })
        })
        .collect()
}

/// Every movie that qualifies as a breakthrough for one person.
///
/// A hit has more than [`BREAKTHROUGH_VOTES`] votes and at least
/// [`BREAKTHROUGH_MIN_PRIOR`] distinct movies with fewer votes in strictly
/// earlier years. Undated or unrated movies never count.
pub fn breakthrough_hits(person_id: &str, timeline: &Timeline) -> Vec<BreakthroughRow> {
    let mut dated: Vec<Appearance> = distinct_by_movie(timeline.appearances.iter().cloned())
        .into_iter()
        .filter(|a| a.year.is_some() && a.votes.is_some())
        .collect();
    dated.sort_by_key(|a| a.year);

    let mut hits = Vec::new();
    let mut prior_low = 0usize;
    let mut i = 0;
    while i < dated.len() {
        let year = dated[i].year;
        let mut j = i;
        while j < dated.len() && dated[j].year == year {
            j += 1;
        }
        let group = &dated[i..j];
        if prior_low >= BREAKTHROUGH_MIN_PRIOR {
            for a in group {
                if let (Some(year), Some(votes)) = (a.year, a.votes) {
                    if votes > BREAKTHROUGH_VOTES {
                        hits.push(BreakthroughRow {
                            person_id: person_id.to_string(),
                            name: timeline.name.clone(),
                            movie_id: a.movie_id.clone(),
                            title: a.title.clone(),
                            year,
                            votes,
                        });
                    }
                }
            }
        }
        prior_low += group
            .iter()
            .filter(|a| matches!(a.votes, Some(v) if v < BREAKTHROUGH_VOTES))
            .count();
        i = j;
    }
    hits
}

/// Earliest breakthrough per person, limited overall.
pub fn breakthroughs(candidates: Vec<BreakthroughRow>) -> Vec<QueryRow> {
    let firsts = first_per_group(
        candidates,
        |r| r.person_id.clone(),
        |a, b| a.year.cmp(&b.year).then_with(|| a.movie_id.cmp(&b.movie_id)),
    );
    finish(
        firsts,
        cmp_breakthrough,
        Some(BREAKTHROUGH_LIMIT),
        QueryRow::Breakthrough,
    )
}

/// Career span over distinct dated movies, if it passes the Q9 filters.
pub fn career_span(person_id: &str, timeline: &Timeline) -> Option<CareerRow> {
    let dated: Vec<i64> = distinct_by_movie(timeline.appearances.iter().cloned())
        .into_iter()
        .filter_map(|a| a.year)
        .collect();
    let min = *dated.iter().min()?;
    let max = *dated.iter().max()?;
    let movies = dated.len() as i64;
    let span = max - min;
    (span > 0 && movies > CAREER_MIN_MOVIES).then(|| CareerRow {
        person_id: person_id.to_string(),
        name: timeline.name.clone(),
        span,
        movies,
    })
}

pub fn longest_careers(timelines: &Timelines) -> Vec<QueryRow> {
    let rows: Vec<CareerRow> = timelines
        .iter()
        .filter_map(|(pid, t)| career_span(pid, t))
        .collect();
    finish(rows, cmp_career, Some(CAREER_LIMIT), QueryRow::Career)
}

/// Rank candidates within each genre by (rating desc, votes desc) and keep
/// every row whose rank is within the cutoff, ties included.
pub fn top_ranked_per_genre(candidates: Vec<GenreRankRow>) -> Vec<QueryRow> {
    let ranked = rank_with_ties(
        candidates,
        |r| r.genre.clone(),
        |a, b| {
            b.rating
                .total_cmp(&a.rating)
                .then_with(|| b.votes.cmp(&a.votes))
        },
    );
    let kept: Vec<GenreRankRow> = ranked
        .into_iter()
        .filter(|r| r.rank <= RANK_CUTOFF)
        .map(|r| GenreRankRow {
            rank: r.rank,
            ..r.item
        })
        .collect();
    finish(kept, cmp_genre_rank, None, QueryRow::GenreRank)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(id: &str, year: i64, votes: i64) -> Appearance {
        Appearance {
            movie_id: id.to_string(),
            title: Some(format!("Movie {}", id)),
            year: Some(year),
            rating: Some(7.0),
            votes: Some(votes),
        }
    }

    fn timeline(apps: Vec<Appearance>) -> Timeline {
        Timeline {
            name: Some("P".into()),
            appearances: apps,
        }
    }

    #[test]
    fn breakthrough_after_three_small_movies() {
        let t = timeline(vec![
            app("a", 1990, 1000),
            app("b", 1991, 5000),
            app("c", 1993, 150_000),
            app("hit", 1995, 300_000),
        ]);
        let hits = breakthrough_hits("p", &t);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].movie_id, "hit");
        assert_eq!(hits[0].year, 1995);
    }

    #[test]
    fn same_year_priors_do_not_count() {
        let t = timeline(vec![
            app("a", 1990, 1000),
            app("b", 1991, 5000),
            app("c", 1995, 150_000),
            app("hit", 1995, 300_000),
        ]);
        assert!(breakthrough_hits("p", &t).is_empty());
    }

    #[test]
    fn duplicate_credits_count_once() {
        let t = timeline(vec![
            app("a", 1990, 1000),
            app("a", 1990, 1000),
            app("b", 1991, 5000),
            app("hit", 1995, 300_000),
        ]);
        assert!(breakthrough_hits("p", &t).is_empty());
    }

    #[test]
    fn exactly_threshold_votes_is_neither() {
        let t = timeline(vec![
            app("a", 1990, 1000),
            app("b", 1991, 200_000),
            app("c", 1992, 5000),
            app("d", 1996, 200_000),
        ]);
        assert!(breakthrough_hits("p", &t).is_empty());
    }

    #[test]
    fn only_earliest_hit_per_person() {
        let t = timeline(vec![
            app("a", 1990, 1000),
            app("b", 1991, 5000),
            app("c", 1992, 5000),
            app("hit1", 1995, 300_000),
            app("hit2", 1999, 900_000),
        ]);
        let rows = breakthroughs(breakthrough_hits("p", &t));
        assert_eq!(rows.len(), 1);
        match &rows[0] {
            QueryRow::Breakthrough(r) => assert_eq!(r.movie_id, "hit1"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn decades_from_scenario() {
        let rows = career_by_decade(vec![
            app("a", 1988, 1),
            app("b", 1991, 1),
            app("c", 1999, 1),
        ]);
        assert_eq!(
            rows,
            vec![
                QueryRow::Decade(DecadeRow {
                    decade: 1980,
                    movies: 1,
                    average: Some(7.0)
                }),
                QueryRow::Decade(DecadeRow {
                    decade: 1990,
                    movies: 2,
                    average: Some(7.0)
                }),
            ]
        );
    }

    #[test]
    fn unrated_decade_has_no_average() {
        let mut a = app("a", 2004, 1);
        a.rating = None;
        let rows = career_by_decade(vec![a]);
        assert_eq!(
            rows,
            vec![QueryRow::Decade(DecadeRow {
                decade: 2000,
                movies: 1,
                average: None
            })]
        );
    }

    fn candidate(genre: &str, id: &str, rating: f64, votes: i64) -> GenreRankRow {
        GenreRankRow {
            genre: genre.into(),
            rank: 0,
            movie_id: id.into(),
            title: None,
            rating,
            votes,
        }
    }

    #[test]
    fn ties_at_cutoff_are_all_kept() {
        let rows = top_ranked_per_genre(vec![
            candidate("Drama", "a", 9.0, 5000),
            candidate("Drama", "b", 8.5, 5000),
            candidate("Drama", "c", 8.0, 5000),
            candidate("Drama", "d", 8.0, 5000),
            candidate("Drama", "e", 7.5, 5000),
        ]);
        let got: Vec<(String, i64)> = rows
            .iter()
            .map(|r| match r {
                QueryRow::GenreRank(g) => (g.movie_id.clone(), g.rank),
                other => panic!("unexpected: {:?}", other),
            })
            .collect();
        assert_eq!(
            got,
            vec![
                ("a".to_string(), 1),
                ("b".to_string(), 2),
                ("c".to_string(), 3),
                ("d".to_string(), 3)
            ]
        );
    }

    #[test]
    fn career_span_requires_more_than_ten_movies() {
        let apps: Vec<Appearance> = (0..10).map(|i| app(&format!("m{}", i), 1980 + i, 1)).collect();
        assert!(career_span("p", &timeline(apps.clone())).is_none());

        let mut more = apps;
        more.push(app("m10", 2020, 1));
        let row = career_span("p", &timeline(more)).unwrap();
        assert_eq!(row.span, 40);
        assert_eq!(row.movies, 11);
    }
}
