//! Candidates and candidate lists whose ordering is part of the type.
//!
//! A `CandidateList<ScoreOrder>` is sorted by score descending (ties by ascending
//! frame index); a `CandidateList<TimeOrder>` by frame index ascending. The only
//! way to go between them is an explicit conversion, so display code cannot be
//! handed a ranking by accident.

use std::cmp::Ordering;
use std::marker::PhantomData;

/// 0-based decode position of a frame within one video.
pub type FrameIndex = u64;

/// Non-negative sharpness; only comparable within one video.
pub type Score = f64;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub frame_index: FrameIndex,
    pub score: Score,
}

impl Candidate {
    pub fn new(frame_index: FrameIndex, score: Score) -> Self {
        Self { frame_index, score }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Marker for the ordering a `CandidateList` holds.
pub trait ListOrder: sealed::Sealed {
    fn compare(a: &Candidate, b: &Candidate) -> Ordering;
}

/// Score descending, frame index ascending on ties.
#[derive(Debug, Clone, Copy)]
pub struct ScoreOrder;

/// Frame index ascending.
#[derive(Debug, Clone, Copy)]
pub struct TimeOrder;

impl sealed::Sealed for ScoreOrder {}
impl sealed::Sealed for TimeOrder {}

impl ListOrder for ScoreOrder {
    fn compare(a: &Candidate, b: &Candidate) -> Ordering {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.frame_index.cmp(&b.frame_index))
    }
}

impl ListOrder for TimeOrder {
    fn compare(a: &Candidate, b: &Candidate) -> Ordering {
        a.frame_index.cmp(&b.frame_index)
    }
}

#[derive(Debug, Clone)]
pub struct CandidateList<O: ListOrder> {
    items: Vec<Candidate>,
    _order: PhantomData<O>,
}

impl<O: ListOrder> CandidateList<O> {
    /// Sorts `items` into this list's ordering.
    pub fn from_unsorted(mut items: Vec<Candidate>) -> Self {
        items.sort_by(O::compare);
        Self::from_sorted_unchecked(items)
    }

    fn from_sorted_unchecked(items: Vec<Candidate>) -> Self {
        debug_assert!(items.windows(2).all(|w| O::compare(&w[0], &w[1]).is_le()));
        Self {
            items,
            _order: PhantomData,
        }
    }

    pub fn empty() -> Self {
        Self::from_sorted_unchecked(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[Candidate] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
        self.items.iter()
    }

    pub fn frame_indices(&self) -> Vec<FrameIndex> {
        self.items.iter().map(|c| c.frame_index).collect()
    }
}

impl CandidateList<ScoreOrder> {
    /// Wraps a subsequence of a score-ordered list, which is itself score-ordered.
    pub(crate) fn retain_ordered(items: Vec<Candidate>) -> Self {
        Self::from_sorted_unchecked(items)
    }

    /// Score-rank positions `[page * size, page * size + size)`. Empty past the end.
    pub fn page(&self, page: usize, size: usize) -> CandidateList<ScoreOrder> {
        let start = page.saturating_mul(size).min(self.items.len());
        let end = start.saturating_add(size).min(self.items.len());
        Self::from_sorted_unchecked(self.items[start..end].to_vec())
    }

    /// Whether a page after `page` has at least one candidate.
    pub fn has_page_after(&self, page: usize, size: usize) -> bool {
        page.saturating_add(1).saturating_mul(size) < self.items.len()
    }

    pub fn to_time_order(&self) -> CandidateList<TimeOrder> {
        CandidateList::from_unsorted(self.items.clone())
    }
}

impl<'a, O: ListOrder> IntoIterator for &'a CandidateList<O> {
    type Item = &'a Candidate;
    type IntoIter = std::slice::Iter<'a, Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(pairs: &[(u64, f64)]) -> CandidateList<ScoreOrder> {
        CandidateList::from_unsorted(pairs.iter().map(|&(i, s)| Candidate::new(i, s)).collect())
    }

    #[test]
    fn score_order_breaks_ties_by_index() {
        let list = ranked(&[(9, 50.0), (3, 80.0), (1, 50.0), (7, 80.0)]);
        assert_eq!(list.frame_indices(), vec![3, 7, 1, 9]);
    }

    #[test]
    fn time_order_sorts_by_index() {
        let list = ranked(&[(9, 50.0), (3, 80.0), (1, 20.0)]);
        assert_eq!(list.to_time_order().frame_indices(), vec![1, 3, 9]);
    }

    #[test]
    fn pages_concatenate_to_full_list() {
        let pairs: Vec<(u64, f64)> = (0..23).map(|i| (i * 20, 1000.0 - i as f64)).collect();
        let list = ranked(&pairs);
        let mut joined = Vec::new();
        let mut page = 0;
        loop {
            let slice = list.page(page, 10);
            assert_eq!(list.has_page_after(page, 10), !list.page(page + 1, 10).is_empty());
            if slice.is_empty() {
                break;
            }
            joined.extend(slice.frame_indices());
            page += 1;
        }
        assert_eq!(page, 3);
        assert_eq!(joined, list.frame_indices());
    }

    #[test]
    fn page_past_end_is_empty() {
        let list = ranked(&[(1, 20.0), (40, 30.0)]);
        assert!(list.page(1, 10).is_empty());
        assert!(list.page(usize::MAX, 10).is_empty());
        assert!(!list.has_page_after(0, 10));
    }
}
