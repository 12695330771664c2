//! Reciprocal rank fusion.
//!
//! Merges any number of independently ranked result lists into one
//! combined ranking. Each id scores the sum over the lists it appears in
//! of `1 / (k_constant + rank)`, rank being its 1-based position in that
//! list. Items unseen in a list contribute nothing for that list.

use std::collections::HashMap;

/// Default smoothing constant from the original RRF paper.
pub const DEFAULT_RRF_K: u32 = 60;

/// One fused result: the shared id, its combined score and the
/// first-seen payload for that id.
#[derive(Debug, Clone, PartialEq)]
pub struct Fused<T> {
    pub id: u64,
    pub score: f64,
    pub item: T,
}

/// Fuse ranked lists into a single ranking by reciprocal rank.
///
/// `id_of` extracts the shared id from an item. Output is sorted by
/// descending fused score; ties keep the relative order in which ids were
/// first seen (stable sort, no separate tie-break). Deterministic given
/// deterministic inputs.
pub fn reciprocal_rank_fusion<T>(
    lists: Vec<Vec<T>>,
    id_of: impl Fn(&T) -> u64,
    k_constant: u32,
) -> Vec<Fused<T>> {
    let mut fused: Vec<Fused<T>> = Vec::new();
    let mut positions: HashMap<u64, usize> = HashMap::new();

    for list in lists {
        for (index, item) in list.into_iter().enumerate() {
            let rank = index as u32 + 1;
            let contribution = 1.0 / f64::from(k_constant + rank);
            let id = id_of(&item);

            match positions.get(&id) {
                Some(&pos) => fused[pos].score += contribution,
                None => {
                    positions.insert(id, fused.len());
                    fused.push(Fused {
                        id,
                        score: contribution,
                        item,
                    });
                }
            }
        }
    }

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused
}

/// [`reciprocal_rank_fusion`] with the default `k_constant` of 60.
pub fn rrf<T>(lists: Vec<Vec<T>>, id_of: impl Fn(&T) -> u64) -> Vec<Fused<T>> {
    reciprocal_rank_fusion(lists, id_of, DEFAULT_RRF_K)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn post(id: u64, title: &str, description: &str) -> Value {
        json!({"id": id, "title": title, "description": description})
    }

    fn id_of(item: &Value) -> u64 {
        item["id"].as_u64().expect("fixture items carry an id")
    }

    #[test]
    fn test_rrf_reference_fixture() {
        let list1 = vec![
            post(1, "Post 1", "First post"),
            post(2, "Post 2", "Second post"),
            post(3, "Post 3", "Third post"),
        ];
        let list2 = vec![
            post(2, "Post 2", "Second post"),
            post(3, "Post 3", "Third post"),
            post(4, "Post 4", "Fourth post"),
        ];
        let list3 = vec![
            post(3, "Post 3", "Third post"),
            post(1, "Post 1", "First post"),
            post(4, "Post 4", "Fourth post"),
            post(5, "Post 5", "Fifth post"),
        ];

        let result = reciprocal_rank_fusion(vec![list1, list2, list3], id_of, 60);

        let expected: Vec<(u64, f64)> = vec![
            (3, 1.0 / 63.0 + 1.0 / 62.0 + 1.0 / 61.0),
            (1, 1.0 / 61.0 + 1.0 / 62.0),
            (2, 1.0 / 62.0 + 1.0 / 61.0),
            (4, 1.0 / 63.0 + 1.0 / 63.0),
            (5, 1.0 / 64.0),
        ];

        assert_eq!(result.len(), expected.len());
        for (fused, (id, score)) in result.iter().zip(&expected) {
            assert_eq!(fused.id, *id);
            assert!(
                (fused.score - score).abs() < 1e-12,
                "id {} expected {} got {}",
                id,
                score,
                fused.score
            );
        }

        // id=3 appears in all three lists at good positions, id=5 once at
        // the worst rank.
        assert_eq!(result[0].id, 3);
        assert_eq!(result.last().unwrap().id, 5);
    }

    #[test]
    fn test_first_seen_payload_wins() {
        let list1 = vec![post(1, "original title", "from list one")];
        let list2 = vec![post(1, "other title", "from list two")];

        let result = rrf(vec![list1, list2], id_of);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].item["title"], "original title");
        // Both appearances contributed to the score.
        assert!((result[0].score - 2.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn test_score_ties_keep_first_seen_order() {
        // Two ids at the same rank in disjoint lists score identically.
        let list1 = vec![post(10, "a", "-")];
        let list2 = vec![post(20, "b", "-")];

        let result = rrf(vec![list1, list2], id_of);
        assert_eq!(result[0].id, 10);
        assert_eq!(result[1].id, 20);
    }

    #[test]
    fn test_empty_and_single_list() {
        let empty: Vec<Vec<Value>> = vec![];
        assert!(rrf(empty, id_of).is_empty());

        let single = vec![vec![post(1, "only", "-"), post(2, "second", "-")]];
        let result = rrf(single, id_of);
        assert_eq!(result[0].id, 1);
        assert!(result[0].score > result[1].score);
    }
}
