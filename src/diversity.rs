//! Greedy temporal-diversity filter over a score-ordered candidate list.

use std::collections::BTreeSet;

use crate::candidate::{CandidateList, FrameIndex, ScoreOrder};

/// Walks `ranked` best-first and accepts a candidate only if it lies at least
/// `min_distance` frames from every candidate accepted so far. The result keeps
/// score order.
pub fn filter(ranked: &CandidateList<ScoreOrder>, min_distance: u64) -> CandidateList<ScoreOrder> {
    let mut accepted_at: BTreeSet<FrameIndex> = BTreeSet::new();
    let mut accepted = Vec::new();
    for candidate in ranked {
        if min_distance > 0 {
            let reach = min_distance - 1;
            let lo = candidate.frame_index.saturating_sub(reach);
            let hi = candidate.frame_index.saturating_add(reach);
            if accepted_at.range(lo..=hi).next().is_some() {
                continue;
            }
        }
        accepted_at.insert(candidate.frame_index);
        accepted.push(*candidate);
    }
    log::debug!(
        target: "sharp_frames::diversity",
        "Kept {} of {} candidates at min distance {}",
        accepted.len(),
        ranked.len(),
        min_distance
    );
    CandidateList::retain_ordered(accepted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::Candidate;

    fn ranked(pairs: &[(u64, f64)]) -> CandidateList<ScoreOrder> {
        CandidateList::from_unsorted(pairs.iter().map(|&(i, s)| Candidate::new(i, s)).collect())
    }

    /// Deterministic pseudo-random list with unique indices.
    fn scattered(n: u64, seed: u64) -> CandidateList<ScoreOrder> {
        let mut state = seed;
        let mut next = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            state >> 33
        };
        let mut indices: Vec<u64> = (0..n * 3).collect();
        for i in (1..indices.len()).rev() {
            let j = (next() % (i as u64 + 1)) as usize;
            indices.swap(i, j);
        }
        let items = indices
            .into_iter()
            .take(n as usize)
            .map(|i| Candidate::new(i, (next() % 10_000) as f64 / 10.0 + 10.5))
            .collect();
        CandidateList::from_unsorted(items)
    }

    fn reference_filter(list: &CandidateList<ScoreOrder>, d: u64) -> Vec<u64> {
        let mut accepted: Vec<u64> = Vec::new();
        for c in list {
            if accepted.iter().all(|&a| a.abs_diff(c.frame_index) >= d) {
                accepted.push(c.frame_index);
            }
        }
        accepted
    }

    #[test]
    fn collapses_burst_to_best_frame() {
        let list = ranked(&[(40, 50.0), (41, 55.0), (42, 90.0), (43, 60.0), (44, 20.0), (45, 11.0)]);
        assert_eq!(filter(&list, 15).frame_indices(), vec![42]);
    }

    #[test]
    fn compares_against_every_accepted_candidate() {
        // 110 is far enough from 130, the previous acceptance, but not from 100.
        let list = ranked(&[(100, 90.0), (130, 80.0), (110, 70.0)]);
        assert_eq!(filter(&list, 15).frame_indices(), vec![100, 130]);
    }

    #[test]
    fn exact_distance_is_accepted() {
        let list = ranked(&[(0, 90.0), (15, 80.0), (29, 70.0)]);
        assert_eq!(filter(&list, 15).frame_indices(), vec![0, 15]);
    }

    #[test]
    fn zero_distance_keeps_everything() {
        let list = scattered(40, 7);
        assert_eq!(filter(&list, 0).as_slice(), list.as_slice());
    }

    #[test]
    fn matches_all_pairs_reference() {
        for seed in 1..20 {
            let list = scattered(120, seed);
            for d in [1, 2, 15, 40] {
                assert_eq!(filter(&list, d).frame_indices(), reference_filter(&list, d));
            }
        }
    }

    #[test]
    fn output_is_spread_and_idempotent() {
        for seed in 1..10 {
            let list = scattered(200, seed);
            let once = filter(&list, 15);
            let indices = once.frame_indices();
            for (i, a) in indices.iter().enumerate() {
                for b in &indices[i + 1..] {
                    assert!(a.abs_diff(*b) >= 15, "{} and {} too close", a, b);
                }
            }
            assert_eq!(filter(&once, 15).as_slice(), once.as_slice());
        }
    }
}
