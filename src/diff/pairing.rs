// SPDX-License-Identifier: MIT

//! Greedy pairing of removed and added lines within one change block.
//!
//! All (removed, added) candidates at or above the modification threshold are
//! sorted by descending similarity and accepted best-first while both lines
//! are still free. This is deliberately not an optimal assignment. Equal
//! similarities are ordered by removed index, then added index.

use super::cancel::{CancelToken, Cancelled};
use super::similarity::SimilarityScorer;

/// Greedily select pairs from a similarity matrix indexed `[removed][added]`.
///
/// Returns `(removed, added, similarity)` triples in acceptance order.
pub fn greedy_pairs(matrix: &[Vec<f64>], threshold: f64) -> Vec<(usize, usize, f64)> {
    let mut candidates: Vec<(usize, usize, f64)> = matrix
        .iter()
        .enumerate()
        .flat_map(|(r, row)| {
            row.iter()
                .enumerate()
                .filter(move |&(_, &sim)| sim >= threshold)
                .map(move |(a, &sim)| (r, a, sim))
        })
        .collect();
    // Candidates are generated in (removed, added) order and the sort is
    // stable, which fixes the tie-break.
    candidates.sort_by(|x, y| y.2.total_cmp(&x.2));

    let removed_count = matrix.len();
    let added_count = matrix.first().map_or(0, Vec::len);
    let mut removed_used = vec![false; removed_count];
    let mut added_used = vec![false; added_count];

    let mut pairs = Vec::new();
    for (r, a, sim) in candidates {
        if removed_used[r] || added_used[a] {
            continue;
        }
        removed_used[r] = true;
        added_used[a] = true;
        pairs.push((r, a, sim));
    }
    pairs
}

/// Pair the removed and added lines of one block.
///
/// Returns the accepted `(removed, added, similarity)` pairs; indices refer to
/// the given slices. Lines that are not part of a pair stay removed or added.
pub fn pair_lines(
    scorer: &SimilarityScorer<'_>,
    removed: &[&str],
    added: &[&str],
    cancel: &CancelToken,
) -> Result<Vec<(usize, usize, f64)>, Cancelled> {
    if removed.is_empty() || added.is_empty() {
        return Ok(Vec::new());
    }

    let matrix = scorer.score_matrix(removed, added, cancel)?;
    let pairs = greedy_pairs(&matrix, scorer.thresholds().modified);
    log::trace!(
        "paired {} of {} removed / {} added lines",
        pairs.len(),
        removed.len(),
        added.len()
    );
    Ok(pairs)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::diff::hasher::ContentHasher;
    use crate::diff::similarity::{Thresholds, MODIFIED_THRESHOLD};

    #[test]
    fn test_greedy_is_not_optimal() {
        // The optimal assignment would be (0,1) + (1,0) for a total of 1.6,
        // greedy takes the single best pair first.
        let matrix = vec![vec![0.9, 0.8], vec![0.8, 0.1]];
        assert_eq!(greedy_pairs(&matrix, 0.5), vec![(0, 0, 0.9)]);
    }

    #[test]
    fn test_tie_break() {
        let matrix = vec![vec![0.7, 0.7], vec![0.7, 0.7]];
        assert_eq!(greedy_pairs(&matrix, 0.5), vec![(0, 0, 0.7), (1, 1, 0.7)]);

        let matrix = vec![vec![0.4, 0.6], vec![0.6, 0.6]];
        assert_eq!(greedy_pairs(&matrix, 0.5), vec![(0, 1, 0.6), (1, 0, 0.6)]);
    }

    #[test]
    fn test_pair_lines() {
        let hasher = ContentHasher::new();
        let scorer = SimilarityScorer::new(&hasher, Thresholds::default());
        let removed = ["let total = price * count;", "import os"];
        let added = ["print('done')", "let total = price * count * tax;"];

        let pairs = pair_lines(&scorer, &removed, &added, &CancelToken::new()).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].0, pairs[0].1), (0, 1));
        assert!(pairs[0].2 >= MODIFIED_THRESHOLD);

        assert!(pair_lines(&scorer, &removed, &[], &CancelToken::new()).unwrap().is_empty());
    }
}
