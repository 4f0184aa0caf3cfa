// SPDX-License-Identifier: MIT

//! Detection of moved lines and blocks.
//!
//! Matching happens in several passes, each one only looking at lines that
//! earlier passes left unclaimed:
//!
//!  1. Virtual moves: unchanged runs whose position shifted relative to both
//!     neighbouring anchors, while the change blocks around them exchange
//!     lines. The line differ kept these lines and moved their surroundings
//!     instead. The run is reported as moved only when it is no longer than
//!     the exchanged lines (or than a minimal block); the exchanged lines are
//!     then displaced, i.e. turned back into unchanged lines. Otherwise the
//!     run stays unchanged and the later passes match the exchanged lines.
//!  2. Block moves: windows of at least [`MIN_BLOCK_SIZE`] removed lines that
//!     reappear as added lines in a different change block. Candidates are
//!     found through banded fingerprint buckets, largest window size first,
//!     and verified line by line.
//!  3. Single-line moves between different change blocks.
//!
//! After the caller has paired the remaining lines within their own blocks,
//! [`detect_cross_block`] matches leftovers across blocks at the lower
//! modification threshold.
//!
//! Line positions (`pos`) refer to the flattened run list. A virtual move
//! claims an unchanged position, which is its own partner.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;

use super::blocks::{BlockLine, ChangeBlock};
use super::cancel::{CancelToken, Cancelled};
use super::differ::{RunKind, RunLine};
use super::pairing::greedy_pairs;
use super::similarity::SimilarityScorer;

pub const MIN_BLOCK_SIZE: usize = 3;
pub const MIN_LINES_FOR_MOVE_DETECTION: usize = 10;
pub const MAX_LINES_FOR_MOVE_DETECTION: usize = 50_000;

/// Windows larger than this are found at this size and then extended.
const MAX_WINDOW: usize = 32;

/// Cross-block matching is skipped when it would score more pairs than this.
const MAX_CROSS_BLOCK_PAIRS: usize = 250_000;

/// Buckets stop accepting entries at this size; those lines are too common
/// to be useful move evidence.
const MAX_BUCKET: usize = 512;

const BLOCK_BANDS: u32 = 8;
const LINE_BANDS: u32 = 4;
const KEY_MULTIPLIER: u64 = 0x100000001b3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockMove {
    /// First old line of the block.
    pub old_start: usize,
    /// First new line of the block.
    pub new_start: usize,
    pub size: usize,
    /// Mean per-line similarity.
    pub similarity: f64,
    pub is_virtual: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineMove {
    pub old_line: usize,
    pub new_line: usize,
    pub similarity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossBlockModification {
    pub old_line: usize,
    pub new_line: usize,
    pub similarity: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveSummary {
    pub block_moves: Vec<BlockMove>,
    pub line_moves: Vec<LineMove>,
    pub cross_block: Vec<CrossBlockModification>,
}
impl MoveSummary {
    pub fn is_empty(&self) -> bool {
        self.block_moves.is_empty() && self.line_moves.is_empty() && self.cross_block.is_empty()
    }

    /// Shift all line numbers, used when merging independently classified
    /// regions.
    pub fn offset(&mut self, old_offset: usize, new_offset: usize) {
        for m in &mut self.block_moves {
            m.old_start += old_offset;
            m.new_start += new_offset;
        }
        for m in &mut self.line_moves {
            m.old_line += old_offset;
            m.new_line += new_offset;
        }
        for m in &mut self.cross_block {
            m.old_line += old_offset;
            m.new_line += new_offset;
        }
    }

    pub fn append(&mut self, other: MoveSummary) {
        self.block_moves.extend(other.block_moves);
        self.line_moves.extend(other.line_moves);
        self.cross_block.extend(other.cross_block);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveKind {
    Virtual,
    Block,
    Line,
    CrossBlock,
}

/// How a line was matched outside of its own change block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Claim {
    pub partner: usize,
    pub kind: MoveKind,
    pub similarity: f64,
    /// Index into [`MoveSummary::block_moves`] for block and virtual moves.
    pub block_move: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct MoveDetection {
    pub summary: MoveSummary,
    pub claims: HashMap<usize, Claim>,
    /// Lines a virtual move turned back into unchanged lines, mapped to their
    /// partner position and similarity. Both directions are present.
    pub displaced: HashMap<usize, (usize, f64)>,
    /// Positions that are already settled and must not be matched.
    reserved: HashSet<usize>,
}
impl MoveDetection {
    pub fn is_claimed(&self, pos: usize) -> bool {
        self.claims.contains_key(&pos) || self.displaced.contains_key(&pos) || self.reserved.contains(&pos)
    }

    /// Keep `pos` out of every pass.
    pub fn reserve(&mut self, pos: usize) {
        self.reserved.insert(pos);
    }

    fn add_virtual(&mut self, virtual_move: &VirtualMove<'_>) {
        let block = &virtual_move.block;
        let (Some(first_old), Some(first_new)) = (block.removed.first(), block.added.first()) else {
            return;
        };
        let idx = self.summary.block_moves.len();
        self.summary.block_moves.push(BlockMove {
            old_start: first_old.line,
            new_start: first_new.line,
            size: block.removed.len(),
            similarity: 1.0,
            is_virtual: true,
        });
        for line in &block.removed {
            self.claims.insert(
                line.pos,
                Claim {
                    partner: line.pos,
                    kind: MoveKind::Virtual,
                    similarity: 1.0,
                    block_move: Some(idx),
                },
            );
        }
        for (removed, added, sim) in &virtual_move.displaced {
            self.displaced.insert(removed.pos, (added.pos, *sim));
            self.displaced.insert(added.pos, (removed.pos, *sim));
        }
    }

    /// Run the block and single-line passes over the lines that are still
    /// free.
    pub fn detect(
        &mut self,
        blocks: &[ChangeBlock<'_>],
        scorer: &SimilarityScorer<'_>,
        cancel: &CancelToken,
    ) -> Result<(), Cancelled> {
        cancel.check()?;
        detect_block_moves(blocks, scorer, self, cancel)?;
        cancel.check()?;
        detect_line_moves(blocks, scorer, self);

        log::debug!(
            "moves: {} blocks, {} lines",
            self.summary.block_moves.len(),
            self.summary.line_moves.len()
        );
        Ok(())
    }

    fn claim_pair(&mut self, removed: usize, added: usize, kind: MoveKind, similarity: f64, block_move: Option<usize>) {
        self.claims.insert(
            removed,
            Claim {
                partner: added,
                kind,
                similarity,
                block_move,
            },
        );
        self.claims.insert(
            added,
            Claim {
                partner: removed,
                kind,
                similarity,
                block_move,
            },
        );
    }

    fn add_line_move(&mut self, removed: &BlockLine<'_>, added: &BlockLine<'_>, similarity: f64) {
        self.summary.line_moves.push(LineMove {
            old_line: removed.line,
            new_line: added.line,
            similarity,
        });
        self.claim_pair(removed.pos, added.pos, MoveKind::Line, similarity, None);
    }
}

/// A line carries enough content to be used as move evidence.
pub fn is_significant(text: &str) -> bool {
    text.chars().filter(|c| !c.is_whitespace()).nth(2).is_some()
}

/// Whether the amount of changed material justifies move detection.
pub fn should_detect(blocks: &[ChangeBlock<'_>], virtual_moves: &[VirtualMove<'_>]) -> bool {
    let total: usize = blocks
        .iter()
        .chain(virtual_moves.iter().map(|m| &m.block))
        .map(ChangeBlock::line_count)
        .sum();
    let detect = (MIN_LINES_FOR_MOVE_DETECTION..=MAX_LINES_FOR_MOVE_DETECTION).contains(&total);
    if !detect {
        log::debug!("move detection skipped for {} changed lines", total);
    }
    detect
}

/// An unchanged run reported as moved, with the removed and added lines
/// around it that it turns back into unchanged lines.
#[derive(Debug, Clone)]
pub struct VirtualMove<'a> {
    pub block: ChangeBlock<'a>,
    /// `(removed, added, similarity)` pairs exchanged across the run.
    pub displaced: Vec<(BlockLine<'a>, BlockLine<'a>, f64)>,
}

/// Find unchanged runs that moved relative to their surroundings.
pub fn find_virtual_moves<'a>(
    lines: &[RunLine<'a>],
    blocks: &[ChangeBlock<'a>],
    scorer: &SimilarityScorer<'_>,
) -> Vec<VirtualMove<'a>> {
    struct UnchangedRun {
        start: usize,
        end: usize,
        shift: isize,
    }

    let mut runs: Vec<UnchangedRun> = Vec::new();
    for (pos, line) in lines.iter().enumerate() {
        let (RunKind::Unchanged, Some(old), Some(new)) = (line.kind, line.old_line, line.new_line) else {
            continue;
        };
        let shift = new as isize - old as isize;
        let extends = runs.last().is_some_and(|run| run.end == pos && run.shift == shift);
        if extends {
            if let Some(run) = runs.last_mut() {
                run.end = pos + 1;
            }
        } else {
            runs.push(UnchangedRun {
                start: pos,
                end: pos + 1,
                shift,
            });
        }
    }

    let (old_len, new_len) = lines.iter().fold((0, 0), |(o, n), line| {
        (o + line.old_line.is_some() as usize, n + line.new_line.is_some() as usize)
    });
    let end_shift = new_len as isize - old_len as isize;

    // Blocks whose lines lie within the flat range [begin, end).
    let blocks_between = |begin: usize, end: usize| -> Vec<&ChangeBlock<'a>> {
        blocks
            .iter()
            .filter(|b| {
                let first = b.removed.first().or(b.added.first()).map_or(usize::MAX, |l| l.pos);
                first >= begin && first < end
            })
            .collect()
    };

    let mut virtual_moves = Vec::new();
    let mut used: HashSet<usize> = HashSet::new();
    for (idx, run) in runs.iter().enumerate() {
        if run.end - run.start < MIN_BLOCK_SIZE {
            continue;
        }
        let (prev_shift, gap_begin) = match idx.checked_sub(1).map(|i| &runs[i]) {
            Some(prev) => (prev.shift, prev.end),
            None => (0, 0),
        };
        let (next_shift, gap_end) = match runs.get(idx + 1) {
            Some(next) => (next.shift, next.start),
            None => (end_shift, lines.len()),
        };
        if run.shift == prev_shift || run.shift == next_shift {
            continue;
        }

        let before = blocks_between(gap_begin, run.start);
        let after = blocks_between(run.end, gap_end);
        let displaced = exchanged_lines(&before, &after, scorer, &used);
        if displaced.is_empty() {
            continue;
        }
        let len = run.end - run.start;
        if len > displaced.len().max(MIN_BLOCK_SIZE) {
            log::trace!(
                "{} unchanged lines stay in place, {} lines moved around them",
                len,
                displaced.len()
            );
            continue;
        }

        log::trace!("virtual move of {} unchanged lines shifted by {}", len, run.shift);
        used.extend(displaced.iter().flat_map(|(r, a, _)| [r.pos, a.pos]));
        let run_lines = &lines[run.start..run.end];
        let block = ChangeBlock {
            removed: run_lines
                .iter()
                .zip(run.start..)
                .filter_map(|(l, pos)| {
                    Some(BlockLine {
                        text: l.text,
                        pos,
                        line: l.old_line?,
                    })
                })
                .collect(),
            added: run_lines
                .iter()
                .zip(run.start..)
                .filter_map(|(l, pos)| {
                    Some(BlockLine {
                        text: l.text,
                        pos,
                        line: l.new_line?,
                    })
                })
                .collect(),
            is_virtual: true,
        };
        virtual_moves.push(VirtualMove { block, displaced });
    }

    virtual_moves
}

/// Lines added on one side of an unchanged run that reappear removed on the
/// other side, or vice versa, paired greedily at the move threshold.
fn exchanged_lines<'a>(
    before: &[&ChangeBlock<'a>],
    after: &[&ChangeBlock<'a>],
    scorer: &SimilarityScorer<'_>,
    used: &HashSet<usize>,
) -> Vec<(BlockLine<'a>, BlockLine<'a>, f64)> {
    fn side<'a>(blocks: &[&ChangeBlock<'a>], removed: bool, used: &HashSet<usize>) -> Vec<BlockLine<'a>> {
        blocks
            .iter()
            .flat_map(|b| if removed { &b.removed } else { &b.added })
            .filter(|l| !used.contains(&l.pos) && is_significant(l.text))
            .copied()
            .collect()
    }

    let moved = scorer.thresholds().moved;
    let mut pairs = Vec::new();
    let directions = [
        (side(after, true, used), side(before, false, used)),
        (side(before, true, used), side(after, false, used)),
    ];
    for (removed, added) in directions {
        if removed.is_empty() || added.is_empty() || removed.len() * added.len() > MAX_CROSS_BLOCK_PAIRS {
            continue;
        }
        let matrix: Vec<Vec<f64>> = removed
            .iter()
            .map(|r| added.iter().map(|a| scorer.score(r.text, a.text)).collect())
            .collect();
        pairs.extend(
            greedy_pairs(&matrix, moved)
                .into_iter()
                .map(|(r, a, sim)| (removed[r], added[a], sim)),
        );
    }
    pairs
}

/// Rolling multiply-accumulate over one fingerprint band of each line.
fn window_key(fingerprints: &[u64], band: u32, bits: u32) -> u64 {
    let mask = (1u64 << bits) - 1;
    fingerprints.iter().fold(0u64, |acc, fp| {
        acc.wrapping_mul(KEY_MULTIPLIER)
            .wrapping_add((fp >> (band * bits)) & mask)
            .wrapping_add(1)
    })
}

/// Run the virtual, block and single-line passes.
pub fn detect_moves(
    blocks: &[ChangeBlock<'_>],
    virtual_moves: &[VirtualMove<'_>],
    scorer: &SimilarityScorer<'_>,
    cancel: &CancelToken,
) -> Result<MoveDetection, Cancelled> {
    let mut detection = MoveDetection::default();
    for virtual_move in virtual_moves {
        detection.add_virtual(virtual_move);
    }
    detection.detect(blocks, scorer, cancel)?;
    Ok(detection)
}

fn detect_block_moves(
    blocks: &[ChangeBlock<'_>],
    scorer: &SimilarityScorer<'_>,
    detection: &mut MoveDetection,
    cancel: &CancelToken,
) -> Result<(), Cancelled> {
    let hasher = scorer.hasher();
    let fingerprints = |lines: &[BlockLine<'_>]| -> Vec<u64> {
        lines
            .iter()
            .map(|l| hasher.fingerprint(&scorer.normalize(l.text)).0)
            .collect()
    };
    let removed_fps: Vec<Vec<u64>> = blocks.iter().map(|b| fingerprints(&b.removed)).collect();
    let added_fps: Vec<Vec<u64>> = blocks.iter().map(|b| fingerprints(&b.added)).collect();

    let longest_removed = blocks.iter().map(|b| b.removed.len()).max().unwrap_or(0);
    let longest_added = blocks.iter().map(|b| b.added.len()).max().unwrap_or(0);
    let max_size = longest_removed.min(longest_added).min(MAX_WINDOW);
    let bits = 64 / BLOCK_BANDS;
    let moved = scorer.thresholds().moved;

    for size in (MIN_BLOCK_SIZE..=max_size).rev() {
        cancel.check()?;

        let mut buckets: HashMap<(u32, u64), Vec<(usize, usize)>> = HashMap::new();
        for (b, block) in blocks.iter().enumerate() {
            if block.removed.len() < size {
                continue;
            }
            for start in 0..=block.removed.len() - size {
                if block.removed[start..start + size].iter().any(|l| detection.is_claimed(l.pos)) {
                    continue;
                }
                for band in 0..BLOCK_BANDS {
                    let key = window_key(&removed_fps[b][start..start + size], band, bits);
                    let bucket = buckets.entry((band, key)).or_default();
                    if bucket.len() < MAX_BUCKET {
                        bucket.push((b, start));
                    }
                }
            }
        }
        if buckets.is_empty() {
            continue;
        }

        #[cfg(feature = "debug-diff")]
        log::trace!("window size {}: {} buckets", size, buckets.len());

        for (b, block) in blocks.iter().enumerate() {
            if block.added.len() < size {
                continue;
            }
            let mut start = 0;
            while start + size <= block.added.len() {
                let window = &block.added[start..start + size];
                if window.iter().any(|l| detection.is_claimed(l.pos)) {
                    start += 1;
                    continue;
                }

                let candidates: Vec<(usize, usize)> = (0..BLOCK_BANDS)
                    .filter_map(|band| {
                        let key = window_key(&added_fps[b][start..start + size], band, bits);
                        buckets.get(&(band, key))
                    })
                    .flatten()
                    .copied()
                    .filter(|&(rb, _)| rb != b)
                    .sorted()
                    .dedup()
                    .collect();

                let mut matched = None;
                for (rb, rstart) in candidates {
                    let removed = &blocks[rb].removed[rstart..rstart + size];
                    if removed.iter().any(|l| detection.is_claimed(l.pos)) {
                        continue;
                    }
                    if !removed.iter().chain(window).any(|l| is_significant(l.text)) {
                        continue;
                    }
                    let sims: Vec<f64> = removed
                        .iter()
                        .zip(window)
                        .map(|(r, a)| scorer.score(r.text, a.text))
                        .collect();
                    if sims.iter().all(|&s| s >= moved) {
                        matched = Some((rb, rstart, sims));
                        break;
                    }
                }

                let Some((rb, rstart, mut sims)) = matched else {
                    start += 1;
                    continue;
                };

                // Extend the match as far as it goes.
                let removed_lines = &blocks[rb].removed;
                loop {
                    let (r, a) = (rstart + sims.len(), start + sims.len());
                    let (Some(rl), Some(al)) = (removed_lines.get(r), block.added.get(a)) else {
                        break;
                    };
                    if detection.is_claimed(rl.pos) || detection.is_claimed(al.pos) {
                        break;
                    }
                    let sim = scorer.score(rl.text, al.text);
                    if sim < moved {
                        break;
                    }
                    sims.push(sim);
                }

                let len = sims.len();
                let idx = detection.summary.block_moves.len();
                detection.summary.block_moves.push(BlockMove {
                    old_start: removed_lines[rstart].line,
                    new_start: block.added[start].line,
                    size: len,
                    similarity: sims.iter().sum::<f64>() / len as f64,
                    is_virtual: false,
                });
                for (k, sim) in sims.into_iter().enumerate() {
                    detection.claim_pair(
                        removed_lines[rstart + k].pos,
                        block.added[start + k].pos,
                        MoveKind::Block,
                        sim,
                        Some(idx),
                    );
                }
                log::trace!("block move of {} lines", len);
                start += len;
            }
        }
    }

    Ok(())
}

/// Candidate (block, line) references for unclaimed significant lines.
fn free_lines<'b, 'a>(
    blocks: &'b [ChangeBlock<'a>],
    detection: &MoveDetection,
    side: fn(&'b ChangeBlock<'a>) -> &'b Vec<BlockLine<'a>>,
) -> Vec<(usize, &'b BlockLine<'a>)> {
    blocks
        .iter()
        .enumerate()
        .flat_map(|(b, block)| side(block).iter().map(move |l| (b, l)))
        .filter(|(_, l)| !detection.is_claimed(l.pos) && is_significant(l.text))
        .collect()
}

fn detect_line_moves(blocks: &[ChangeBlock<'_>], scorer: &SimilarityScorer<'_>, detection: &mut MoveDetection) {
    let removed = free_lines(blocks, detection, |b| &b.removed);
    let added = free_lines(blocks, detection, |b| &b.added);
    if removed.is_empty() || added.is_empty() {
        return;
    }

    let hasher = scorer.hasher();
    let bits = 64 / LINE_BANDS;
    let added_fps: Vec<u64> = added
        .iter()
        .map(|(_, l)| hasher.fingerprint(&scorer.normalize(l.text)).0)
        .collect();

    let mut buckets: HashMap<(u32, u64), Vec<usize>> = HashMap::new();
    for (idx, fp) in added_fps.iter().enumerate() {
        for band in 0..LINE_BANDS {
            let bucket = buckets.entry((band, window_key(&[*fp], band, bits))).or_default();
            if bucket.len() < MAX_BUCKET {
                bucket.push(idx);
            }
        }
    }

    let moved = scorer.thresholds().moved;
    let mut candidates = Vec::new();
    for (ri, (rb, rl)) in removed.iter().enumerate() {
        let fp = hasher.fingerprint(&scorer.normalize(rl.text)).0;
        let targets: Vec<usize> = (0..LINE_BANDS)
            .filter_map(|band| buckets.get(&(band, window_key(&[fp], band, bits))))
            .flatten()
            .copied()
            .filter(|&ai| added[ai].0 != *rb)
            .sorted()
            .dedup()
            .collect();
        for ai in targets {
            let sim = scorer.score(rl.text, added[ai].1.text);
            if sim >= moved {
                candidates.push((ri, ai, sim));
            }
        }
    }

    // Same tie-break as within-block pairing.
    candidates.sort_by(|x, y| y.2.total_cmp(&x.2));
    let mut removed_used = vec![false; removed.len()];
    let mut added_used = vec![false; added.len()];
    for (ri, ai, sim) in candidates {
        if removed_used[ri] || added_used[ai] {
            continue;
        }
        removed_used[ri] = true;
        added_used[ai] = true;
        detection.add_line_move(removed[ri].1, added[ai].1, sim);
    }
}

/// Match lines left over after within-block pairing across different blocks.
///
/// Pairs at or above the move threshold become line moves, the others
/// cross-block modifications.
pub fn detect_cross_block(
    removed: &[(usize, BlockLine<'_>)],
    added: &[(usize, BlockLine<'_>)],
    scorer: &SimilarityScorer<'_>,
    detection: &mut MoveDetection,
    cancel: &CancelToken,
) -> Result<(), Cancelled> {
    let removed: Vec<&(usize, BlockLine<'_>)> = removed.iter().filter(|(_, l)| is_significant(l.text)).collect();
    let added: Vec<&(usize, BlockLine<'_>)> = added.iter().filter(|(_, l)| is_significant(l.text)).collect();
    if removed.is_empty() || added.is_empty() {
        return Ok(());
    }
    if removed.len() * added.len() > MAX_CROSS_BLOCK_PAIRS {
        log::debug!(
            "cross-block matching skipped for {} x {} lines",
            removed.len(),
            added.len()
        );
        return Ok(());
    }

    let removed_texts: Vec<&str> = removed.iter().map(|(_, l)| l.text).collect();
    let added_texts: Vec<&str> = added.iter().map(|(_, l)| l.text).collect();
    let mut matrix = scorer.score_matrix(&removed_texts, &added_texts, cancel)?;
    for (row, (rb, _)) in matrix.iter_mut().zip(&removed) {
        for (sim, (ab, _)) in row.iter_mut().zip(&added) {
            if rb == ab {
                *sim = 0.0;
            }
        }
    }

    let thresholds = *scorer.thresholds();
    for (r, a, sim) in greedy_pairs(&matrix, thresholds.modified) {
        let (rl, al) = (&removed[r].1, &added[a].1);
        if sim >= thresholds.moved {
            detection.add_line_move(rl, al, sim);
        } else {
            detection.summary.cross_block.push(CrossBlockModification {
                old_line: rl.line,
                new_line: al.line,
                similarity: sim,
            });
            detection.claim_pair(rl.pos, al.pos, MoveKind::CrossBlock, sim, None);
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::diff::blocks::build_blocks;
    use crate::diff::differ::{flatten_runs, DiffAlgorithm};
    use crate::diff::hasher::ContentHasher;
    use crate::diff::similarity::Thresholds;

    #[test]
    fn test_significant() {
        assert!(is_significant("x = 1"));
        assert!(!is_significant("  }  "));
        assert!(!is_significant("})"));
        assert!(is_significant(" });"));
    }

    #[test]
    fn test_window_key_depends_on_order() {
        let a = window_key(&[0x0102, 0x0304], 0, 8);
        let b = window_key(&[0x0304, 0x0102], 0, 8);
        assert_ne!(a, b);
        assert_eq!(a, window_key(&[0xff02, 0xff04], 0, 8));
    }

    #[test]
    fn test_virtual_move() {
        let old = ["line 1", "line 2", "function f(){", "  x();", "}", "line 6", "line 7"];
        let new = ["line 1", "line 2", "line 6", "line 7", "function f(){", "  x();", "}"];
        let runs = DiffAlgorithm::default().run(&old, &new);
        let flat = flatten_runs(&runs);
        let blocks = build_blocks(&flat);

        let hasher = ContentHasher::new();
        let scorer = SimilarityScorer::new(&hasher, Thresholds::default());
        let virtual_moves = find_virtual_moves(&flat, &blocks, &scorer);
        assert_eq!(virtual_moves.len(), 1);
        let block = &virtual_moves[0].block;
        assert_eq!(block.removed_texts(), vec!["function f(){", "  x();", "}"]);
        assert_eq!(block.added[0].line, 4);
        // "line 6" and "line 7" were removed after the run and added before
        // it; the virtual move puts them back.
        let displaced: Vec<(usize, usize)> = virtual_moves[0]
            .displaced
            .iter()
            .map(|(r, a, _)| (r.line, a.line))
            .collect();
        assert_eq!(displaced, vec![(5, 2), (6, 3)]);
        assert!(should_detect(&blocks, &virtual_moves));

        let detection = detect_moves(&blocks, &virtual_moves, &scorer, &CancelToken::new()).unwrap();
        assert_eq!(detection.summary.block_moves.len(), 1);
        assert_eq!(detection.summary.block_moves[0].size, 3);
        assert!(detection.summary.block_moves[0].is_virtual);
        assert!(detection.summary.line_moves.is_empty());
        assert_eq!(detection.displaced.len(), 4);
    }

    #[test]
    fn test_block_move_prefers_larger_window() {
        let moved: Vec<String> = (0..5).map(|i| format!("    step_{}(context, {});", i, i * 7)).collect();
        let filler: Vec<String> = (0..8).map(|i| format!("keep_line_{}();", i)).collect();

        let old: Vec<&str> = moved.iter().chain(&filler).map(String::as_str).collect();
        let new: Vec<&str> = filler.iter().chain(&moved).map(String::as_str).collect();
        let runs = DiffAlgorithm::default().run(&old, &new);
        let flat = flatten_runs(&runs);
        let blocks = build_blocks(&flat);

        let hasher = ContentHasher::new();
        let scorer = SimilarityScorer::new(&hasher, Thresholds::default());
        // The filler run is longer than the block that moved around it, so it
        // stays unchanged.
        let virtual_moves = find_virtual_moves(&flat, &blocks, &scorer);
        assert!(virtual_moves.is_empty());
        let detection = detect_moves(&blocks, &virtual_moves, &scorer, &CancelToken::new()).unwrap();

        assert_eq!(detection.summary.block_moves.len(), 1);
        let block = detection.summary.block_moves[0];
        assert_eq!((block.old_start, block.new_start, block.size), (0, 8, 5));
        assert!(detection.summary.line_moves.is_empty());
        assert_eq!(detection.claims.len(), 10);
    }

    #[test]
    fn test_detection_bounds() {
        let block = |removed: usize, added: usize| ChangeBlock {
            removed: (0..removed).map(|i| BlockLine { text: "x = 1;", pos: i, line: i }).collect(),
            added: (0..added).map(|i| BlockLine { text: "x = 1;", pos: removed + i, line: i }).collect(),
            is_virtual: false,
        };
        let half = MAX_LINES_FOR_MOVE_DETECTION / 2;

        assert!(!should_detect(&[block(5, 4)], &[]));
        assert!(should_detect(&[block(5, 5)], &[]));
        assert!(should_detect(&[block(half, half)], &[]));
        assert!(!should_detect(&[block(half, half + 1)], &[]));
        assert!(!should_detect(&[block(half, half), block(1, 0)], &[]));
    }

    #[test]
    fn test_reserved_lines_are_not_matched() {
        let hasher = ContentHasher::new();
        let scorer = SimilarityScorer::new(&hasher, Thresholds::default());
        let line = |text, pos, line| BlockLine { text, pos, line };
        let blocks = [
            ChangeBlock {
                removed: vec![line("let a = compute(1);", 0, 0), line("let b = compute(2);", 1, 1)],
                ..ChangeBlock::default()
            },
            ChangeBlock {
                added: vec![line("let a = compute(1);", 2, 5), line("let b = compute(2);", 3, 6)],
                ..ChangeBlock::default()
            },
        ];

        let mut detection = MoveDetection::default();
        detection.reserve(0);
        detection.detect(&blocks, &scorer, &CancelToken::new()).unwrap();
        assert_eq!(detection.summary.line_moves.len(), 1);
        assert_eq!(detection.claims[&1].partner, 3);
        assert!(!detection.claims.contains_key(&0));
        assert!(!detection.claims.contains_key(&2));
    }

    #[test]
    fn test_cross_block() {
        let hasher = ContentHasher::new();
        let scorer = SimilarityScorer::new(&hasher, Thresholds::default());
        let line = |text, pos, line| BlockLine { text, pos, line };

        let removed = [
            (0, line("function processData(items, options) {", 0, 0)),
            (1, line("}", 5, 3)),
        ];
        let added = [
            (0, line("let unrelated = 0;", 1, 0)),
            (1, line("function processData(items, config, extra) {", 6, 4)),
        ];
        let mut detection = MoveDetection::default();
        detect_cross_block(&removed, &added, &scorer, &mut detection, &CancelToken::new()).unwrap();

        assert_eq!(detection.summary.cross_block.len(), 1);
        let cross = detection.summary.cross_block[0];
        assert_eq!((cross.old_line, cross.new_line), (0, 4));
        assert!(cross.similarity >= 0.5 && cross.similarity < 0.9);
        assert_eq!(detection.claims[&0].partner, 6);
    }
}
