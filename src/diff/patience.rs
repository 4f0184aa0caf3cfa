// SPDX-License-Identifier: MIT

//! Patience LCS: the longest order-preserving chain of lines that occur
//! exactly once on both sides.

use std::collections::HashMap;

use diff_utils::prelude::*;

use super::differ::DiffAlgorithm;

/// Pairs `(old, new)` of lines that are unique on both sides, ordered by the
/// old index.
pub fn unique_matches(old: &[&str], new: &[&str]) -> Vec<(usize, usize)> {
    // (count in old, index in old, count in new, index in new)
    let mut counts: HashMap<&str, (u32, usize, u32, usize)> = HashMap::new();
    for (idx, line) in old.iter().enumerate() {
        let entry = counts.entry(*line).or_insert((0, idx, 0, 0));
        entry.0 += 1;
    }
    for (idx, line) in new.iter().enumerate() {
        if let Some(entry) = counts.get_mut(line) {
            entry.2 += 1;
            entry.3 = idx;
        }
    }

    let mut matches: Vec<(usize, usize)> = counts
        .values()
        .filter(|(old_count, _, new_count, _)| *old_count == 1 && *new_count == 1)
        .map(|&(_, o, _, n)| (o, n))
        .collect();
    matches.sort_unstable();
    matches
}

/// Longest subsequence of `pairs` (sorted by old index) whose new indices are
/// strictly increasing, found by patience sorting.
pub fn longest_increasing(pairs: &[(usize, usize)]) -> Vec<(usize, usize)> {
    // New index on top of each pile, and the pair index placed there.
    let mut tops: Vec<usize> = Vec::new();
    let mut top_items: Vec<usize> = Vec::new();
    let mut backptrs: Vec<Option<usize>> = Vec::with_capacity(pairs.len());

    for (item, &(_, n)) in pairs.iter().enumerate() {
        let pile = match tops.last() {
            None => 0,
            Some(&last) => {
                // Most cards land on the last pile or just before it.
                let hint = tops.len() - 1;
                tops.partition_point_with_hint(hint, last < n, |&top| top < n)
            }
        };

        backptrs.push(if pile > 0 { Some(top_items[pile - 1]) } else { None });
        if pile == tops.len() {
            tops.push(n);
            top_items.push(item);
        } else {
            tops[pile] = n;
            top_items[pile] = item;
        }
    }

    let mut chain = Vec::with_capacity(tops.len());
    let mut cursor = top_items.last().copied();
    while let Some(item) = cursor {
        chain.push(pairs[item]);
        cursor = backptrs[item];
    }
    chain.reverse();
    chain
}

/// Anchors between `old` and `new`: the patience chain of unique lines, or a
/// classic LCS when no line is unique on both sides.
pub fn patience_lcs(old: &[&str], new: &[&str]) -> Vec<(usize, usize)> {
    let unique = unique_matches(old, new);
    if unique.is_empty() {
        log::trace!("no unique common lines, falling back to a full LCS");
        return DiffAlgorithm::Myers.matches(old, new);
    }
    longest_increasing(&unique)
}
