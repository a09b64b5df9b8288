//! Partitioned ranking and first-occurrence selection.
//!
//! Both algorithms sort by `(partition, order)` and then make a single pass,
//! so they behave identically whatever store produced the input rows.

use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<T> {
    pub rank: i64,
    pub item: T,
}

/// Rank items within each partition, sharing ranks on ties.
///
/// Items comparing `Equal` under `order` share a rank; the next distinct
/// item's rank is its 1-based position in the partition, so ranks skip
/// the tied count (1, 1, 3, ...).
pub fn rank_with_ties<T, P, F, O>(mut items: Vec<T>, partition: F, order: O) -> Vec<Ranked<T>>
where
    P: Ord,
    F: Fn(&T) -> P,
    O: Fn(&T, &T) -> Ordering,
{
    items.sort_by(|a, b| partition(a).cmp(&partition(b)).then_with(|| order(a, b)));

    let mut out: Vec<Ranked<T>> = Vec::with_capacity(items.len());
    let mut position = 0i64;
    let mut rank = 0i64;
    for item in items {
        match out.last() {
            Some(prev) if partition(&prev.item) == partition(&item) => {
                position += 1;
                if order(&prev.item, &item) != Ordering::Equal {
                    rank = position;
                }
            }
            _ => {
                position = 1;
                rank = 1;
            }
        }
        out.push(Ranked { rank, item });
    }
    out
}

/// Keep the first item of each group under `order`.
pub fn first_per_group<T, G, F, O>(mut items: Vec<T>, group: F, order: O) -> Vec<T>
where
    G: Ord,
    F: Fn(&T) -> G,
    O: Fn(&T, &T) -> Ordering,
{
    items.sort_by(|a, b| group(a).cmp(&group(b)).then_with(|| order(a, b)));

    let mut out: Vec<T> = Vec::new();
    for item in items {
        let is_new = match out.last() {
            Some(prev) => group(prev) != group(&item),
            None => true,
        };
        if is_new {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry {
        genre: &'static str,
        id: &'static str,
        rating: f64,
        votes: i64,
    }

    fn e(genre: &'static str, id: &'static str, rating: f64, votes: i64) -> Entry {
        Entry {
            genre,
            id,
            rating,
            votes,
        }
    }

    fn by_rating(a: &Entry, b: &Entry) -> Ordering {
        b.rating
            .total_cmp(&a.rating)
            .then_with(|| b.votes.cmp(&a.votes))
    }

    #[test]
    fn ties_share_rank_and_next_rank_skips() {
        let ranked = rank_with_ties(
            vec![
                e("Drama", "a", 8.0, 5000),
                e("Drama", "b", 9.0, 2000),
                e("Drama", "c", 8.0, 5000),
                e("Drama", "d", 7.5, 9000),
            ],
            |x| x.genre,
            by_rating,
        );
        let ranks: Vec<(&str, i64)> = ranked.iter().map(|r| (r.item.id, r.rank)).collect();
        assert_eq!(ranks[0], ("b", 1));
        assert_eq!(ranks[1].1, 2);
        assert_eq!(ranks[2].1, 2);
        assert_eq!(ranks[3], ("d", 4));
    }

    #[test]
    fn votes_break_rating_ties() {
        let ranked = rank_with_ties(
            vec![e("Horror", "a", 8.0, 100), e("Horror", "b", 8.0, 200)],
            |x| x.genre,
            by_rating,
        );
        assert_eq!(ranked[0].item.id, "b");
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].rank, 2);
    }

    #[test]
    fn ranks_restart_per_partition() {
        let ranked = rank_with_ties(
            vec![
                e("Comedy", "a", 6.0, 1),
                e("Action", "b", 9.0, 1),
                e("Comedy", "c", 7.0, 1),
            ],
            |x| x.genre,
            by_rating,
        );
        let got: Vec<(&str, &str, i64)> = ranked
            .iter()
            .map(|r| (r.item.genre, r.item.id, r.rank))
            .collect();
        assert_eq!(
            got,
            vec![("Action", "b", 1), ("Comedy", "c", 1), ("Comedy", "a", 2)]
        );
    }

    #[test]
    fn first_per_group_keeps_earliest() {
        let rows = vec![("p1", 2001, "m3"), ("p2", 1999, "m9"), ("p1", 1995, "m1"), ("p1", 1995, "m0")];
        let firsts = first_per_group(rows, |r| r.0, |a, b| a.1.cmp(&b.1).then_with(|| a.2.cmp(b.2)));
        assert_eq!(firsts, vec![("p1", 1995, "m0"), ("p2", 1999, "m9")]);
    }

    #[test]
    fn empty_inputs() {
        let ranked: Vec<Ranked<Entry>> = rank_with_ties(vec![], |x: &Entry| x.genre, by_rating);
        assert!(ranked.is_empty());
        let firsts: Vec<(i32, i32)> = first_per_group(vec![], |r: &(i32, i32)| r.0, |a, b| a.1.cmp(&b.1));
        assert!(firsts.is_empty());
    }
}
