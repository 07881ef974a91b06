//! Closed-interval algebra over block ranges.
//!
//! Filter coverage is bookkept as closed `[start, end]` block intervals.
//! Ranges that merely touch (`end + 1 == start'`) describe contiguous
//! coverage and must collapse into one row.

/// A closed block range `[start, end]` with `start <= end`.
pub type BlockRange = (u64, u64);

/// Collapse a list of closed intervals into the minimal disjoint,
/// non-touching list with the same union.
pub fn interval_union(intervals: &[BlockRange]) -> Vec<BlockRange> {
    let mut sorted = intervals.to_vec();
    sorted.sort_unstable();

    let mut merged: Vec<BlockRange> = Vec::with_capacity(sorted.len());
    for (start, end) in sorted {
        match merged.last_mut() {
            Some((_, prev_end)) if start <= prev_end.saturating_add(1) => {
                *prev_end = (*prev_end).max(end);
            }
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Intersect `k` interval lists by an ascending two-pointer sweep.
///
/// Returns the empty list when `lists` is empty or any list is empty.
pub fn interval_intersection_many(lists: &[Vec<BlockRange>]) -> Vec<BlockRange> {
    let Some((first, rest)) = lists.split_first() else {
        return Vec::new();
    };

    let mut acc = interval_union(first);
    for list in rest {
        if acc.is_empty() {
            return acc;
        }
        acc = intersect_pair(&acc, &interval_union(list));
    }
    acc
}

fn intersect_pair(a: &[BlockRange], b: &[BlockRange]) -> Vec<BlockRange> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let start = a[i].0.max(b[j].0);
        let end = a[i].1.min(b[j].1);
        if start <= end {
            out.push((start, end));
        }
        if a[i].1 < b[j].1 {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_union_merges_overlapping() {
        assert_eq!(interval_union(&[(0, 5), (3, 10)]), vec![(0, 10)]);
    }

    #[test]
    fn test_union_merges_touching() {
        assert_eq!(interval_union(&[(0, 5), (6, 10)]), vec![(0, 10)]);
        assert_eq!(interval_union(&[(6, 10), (0, 5)]), vec![(0, 10)]);
    }

    #[test]
    fn test_union_keeps_gaps() {
        assert_eq!(interval_union(&[(0, 4), (6, 10)]), vec![(0, 4), (6, 10)]);
    }

    #[test]
    fn test_union_empty() {
        assert!(interval_union(&[]).is_empty());
    }

    #[test]
    fn test_intersection_basic() {
        let a = vec![(0, 10)];
        let b = vec![(5, 15)];
        assert_eq!(interval_intersection_many(&[a, b]), vec![(5, 10)]);
    }

    #[test]
    fn test_intersection_disjoint_lists() {
        let a = vec![(0, 4)];
        let b = vec![(6, 10)];
        assert!(interval_intersection_many(&[a, b]).is_empty());
    }

    #[test]
    fn test_intersection_with_empty_list() {
        let a = vec![(0, 10)];
        assert!(interval_intersection_many(&[a, Vec::new()]).is_empty());
        assert!(interval_intersection_many(&[]).is_empty());
    }

    #[test]
    fn test_intersection_three_way() {
        let a = vec![(0, 100)];
        let b = vec![(10, 40), (60, 90)];
        let c = vec![(20, 70)];
        assert_eq!(
            interval_intersection_many(&[a, b, c]),
            vec![(20, 40), (60, 70)]
        );
    }

    fn arb_ranges() -> impl Strategy<Value = Vec<BlockRange>> {
        proptest::collection::vec(
            (0u64..500, 0u64..50).prop_map(|(start, len)| (start, start + len)),
            0..12,
        )
    }

    /// Reference membership check against the raw input intervals.
    fn covers(ranges: &[BlockRange], point: u64) -> bool {
        ranges.iter().any(|&(s, e)| s <= point && point <= e)
    }

    proptest! {
        #[test]
        fn prop_union_is_idempotent(ranges in arb_ranges()) {
            let once = interval_union(&ranges);
            prop_assert_eq!(interval_union(&once), once.clone());
        }

        #[test]
        fn prop_union_preserves_membership(ranges in arb_ranges(), point in 0u64..600) {
            let merged = interval_union(&ranges);
            prop_assert_eq!(covers(&merged, point), covers(&ranges, point));
        }

        #[test]
        fn prop_union_output_is_disjoint_and_sorted(ranges in arb_ranges()) {
            let merged = interval_union(&ranges);
            for pair in merged.windows(2) {
                // Strictly increasing with a gap of at least one block.
                prop_assert!(pair[0].1 + 1 < pair[1].0);
            }
        }

        #[test]
        fn prop_single_list_intersection_is_union(ranges in arb_ranges()) {
            prop_assert_eq!(
                interval_intersection_many(std::slice::from_ref(&ranges)),
                interval_union(&ranges)
            );
        }

        #[test]
        fn prop_self_intersection_is_union(ranges in arb_ranges()) {
            prop_assert_eq!(
                interval_intersection_many(&[ranges.clone(), ranges.clone()]),
                interval_union(&ranges)
            );
        }

        #[test]
        fn prop_intersection_membership(
            a in arb_ranges(),
            b in arb_ranges(),
            point in 0u64..600,
        ) {
            let both = interval_intersection_many(&[a.clone(), b.clone()]);
            prop_assert_eq!(covers(&both, point), covers(&a, point) && covers(&b, point));
        }
    }
}
