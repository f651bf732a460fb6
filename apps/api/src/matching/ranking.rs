//! Shared ordering rules for search hits.
//!
//! Primary key: descending score. Scores within `SCORE_TIE_EPSILON` of the first hit of
//! their run are ties; ties are ordered by descending `created_at` (missing timestamps
//! last), then ascending id. The result is a total order, identical across backends.

use std::cmp::Ordering;

use crate::matching::store::ScoredResult;

/// Two scores closer than this are treated as equal.
pub const SCORE_TIE_EPSILON: f32 = 1e-4;

/// Sorts `results` in place into the canonical ranking order.
pub fn rank_results(results: &mut [ScoredResult]) {
    results.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));

    // Group runs anchored at their leader so grouping stays transitive.
    let mut start = 0;
    while start < results.len() {
        let leader = results[start].score;
        let mut end = start + 1;
        while end < results.len() && (leader - results[end].score).abs() < SCORE_TIE_EPSILON {
            end += 1;
        }
        if end - start > 1 {
            results[start..end].sort_by(tie_break);
        }
        start = end;
    }
}

/// Ranks and keeps the first `k` hits.
pub fn top_k(mut results: Vec<ScoredResult>, k: usize) -> Vec<ScoredResult> {
    rank_results(&mut results);
    results.truncate(k);
    results
}

fn tie_break(a: &ScoredResult, b: &ScoredResult) -> Ordering {
    let by_time = match (a.created_at, b.created_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_time.then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::Value;

    fn hit(id: &str, score: f32, created_at: Option<DateTime<Utc>>) -> ScoredResult {
        ScoredResult {
            id: id.to_string(),
            score,
            created_at,
            payload: Value::Null,
        }
    }

    fn ts(day: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap())
    }

    fn ids(results: &[ScoredResult]) -> Vec<&str> {
        results.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn orders_by_descending_score() {
        let mut results = vec![hit("a", 0.1, None), hit("b", 0.9, None), hit("c", 0.5, None)];
        rank_results(&mut results);
        assert_eq!(ids(&results), vec!["b", "c", "a"]);
    }

    #[test]
    fn near_ties_prefer_newer_records() {
        let mut results = vec![
            hit("old", 0.80005, ts(1)),
            hit("new", 0.80000, ts(9)),
            hit("low", 0.5, ts(20)),
        ];
        rank_results(&mut results);
        assert_eq!(ids(&results), vec!["new", "old", "low"]);
    }

    #[test]
    fn exact_ties_with_same_time_fall_back_to_id() {
        let mut results = vec![hit("c", 0.7, ts(3)), hit("a", 0.7, ts(3)), hit("b", 0.7, ts(3))];
        rank_results(&mut results);
        assert_eq!(ids(&results), vec!["a", "b", "c"]);
    }

    #[test]
    fn missing_timestamps_sort_after_known_ones_within_a_tie() {
        let mut results = vec![hit("a", 0.6, None), hit("b", 0.6, ts(1))];
        rank_results(&mut results);
        assert_eq!(ids(&results), vec!["b", "a"]);
    }

    #[test]
    fn scores_beyond_epsilon_are_not_ties() {
        let mut results = vec![hit("newer", 0.7, ts(9)), hit("better", 0.7002, ts(1))];
        rank_results(&mut results);
        assert_eq!(ids(&results), vec!["better", "newer"]);
    }

    #[test]
    fn ranking_is_independent_of_input_order() {
        let base = vec![
            hit("a", 0.5, ts(2)),
            hit("b", 0.50001, ts(2)),
            hit("c", 0.9, ts(1)),
            hit("d", 0.2, None),
            hit("e", 0.50002, ts(5)),
        ];
        let mut forward = base.clone();
        let mut backward: Vec<_> = base.into_iter().rev().collect();
        rank_results(&mut forward);
        rank_results(&mut backward);
        assert_eq!(ids(&forward), ids(&backward));
        assert_eq!(ids(&forward), vec!["c", "e", "a", "b", "d"]);
    }

    #[test]
    fn top_k_truncates_after_ranking() {
        let results = vec![hit("a", 0.1, None), hit("b", 0.9, None), hit("c", 0.5, None)];
        let top = top_k(results, 2);
        assert_eq!(ids(&top), vec!["b", "c"]);
    }
}
