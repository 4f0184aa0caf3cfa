// SPDX-License-Identifier: MIT

//! Single-pass classification of one diff: blocks, moves, pairing, and the
//! final list of classified entries.

use std::collections::{HashMap, HashSet};

use super::blocks::{build_blocks, BlockLine, ChangeBlock};
use super::cancel::{CancelToken, Cancelled};
use super::differ::{flatten_runs, DiffRun, RunKind, RunLine};
use super::moves::{
    detect_cross_block, detect_moves, find_virtual_moves, should_detect, Claim, MoveDetection, MoveKind,
    MoveSummary,
};
use super::pairing::pair_lines;
use super::pipeline::ModeToggles;
use super::similarity::SimilarityScorer;
use super::sub_diff::{diff_chars, diff_words, SubDiffPart};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineClass {
    Unchanged,
    Added,
    Removed,
    Modified,
    /// Part of a move at or above the move threshold.
    Moved,
    /// Moved to a different block and changed.
    MovedModified,
}
impl LineClass {
    pub fn as_str(self) -> &'static str {
        match self {
            LineClass::Unchanged => "unchanged",
            LineClass::Added => "added",
            LineClass::Removed => "removed",
            LineClass::Modified => "modified",
            LineClass::Moved => "moved",
            LineClass::MovedModified => "moved-modified",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveRole {
    /// The old position of a moved line.
    Source,
    /// The new position of a moved line.
    Destination,
    /// An unchanged line that moved relative to its surroundings.
    InPlace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveInfo {
    pub kind: MoveKind,
    pub role: MoveRole,
    /// Old line index of the moved line.
    pub from_line: usize,
    /// New line index of the moved line.
    pub to_line: usize,
    /// Index into the block move list, for lines moved as part of a block.
    pub block_move: Option<usize>,
}

/// One line of output.
///
/// Entries with both line indices cover one old and one new line; the others
/// cover a single side.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedEntry {
    pub class: LineClass,
    /// The new text, or the old text for entries without a new side.
    pub value: String,
    /// The old text of a pair whose sides differ.
    pub old_value: Option<String>,
    pub old_line: Option<usize>,
    pub new_line: Option<usize>,
    /// Result index of the other half of a move.
    pub paired_index: Option<usize>,
    pub similarity: Option<f64>,
    pub word_diff: Option<Vec<SubDiffPart>>,
    pub char_diff: Option<Vec<SubDiffPart>>,
    pub move_info: Option<MoveInfo>,
    /// Set by slider correction.
    pub corrected: bool,
}
impl ClassifiedEntry {
    fn new(class: LineClass, value: &str, old_line: Option<usize>, new_line: Option<usize>) -> Self {
        Self {
            class,
            value: value.to_string(),
            old_value: None,
            old_line,
            new_line,
            paired_index: None,
            similarity: None,
            word_diff: None,
            char_diff: None,
            move_info: None,
            corrected: false,
        }
    }

    pub fn unchanged(text: &str, old_line: usize, new_line: usize) -> Self {
        Self::new(LineClass::Unchanged, text, Some(old_line), Some(new_line))
    }

    pub fn added(text: &str, new_line: usize) -> Self {
        Self::new(LineClass::Added, text, None, Some(new_line))
    }

    pub fn removed(text: &str, old_line: usize) -> Self {
        Self::new(LineClass::Removed, text, Some(old_line), None)
    }

    pub fn modified(old_text: &str, new_text: &str, old_line: usize, new_line: usize, similarity: Option<f64>) -> Self {
        let mut entry = Self::new(LineClass::Modified, new_text, Some(old_line), Some(new_line));
        entry.old_value = Some(old_text.to_string());
        entry.similarity = similarity;
        entry
    }

    /// The old-side text, if the entry has an old side.
    pub fn old_text(&self) -> Option<&str> {
        self.old_line?;
        Some(self.old_value.as_deref().unwrap_or(&self.value))
    }

    /// The new-side text, if the entry has a new side.
    pub fn new_text(&self) -> Option<&str> {
        self.new_line.map(|_| self.value.as_str())
    }

    /// Compute the requested sub-line diffs between `old_value` and `value`.
    pub fn attach_sub_diffs(&mut self, modes: &ModeToggles) {
        self.word_diff = None;
        self.char_diff = None;
        let Some(old) = self.old_value.as_deref() else {
            return;
        };
        if old == self.value {
            return;
        }
        if modes.words {
            self.word_diff = diff_words(old, &self.value);
        }
        if modes.chars {
            self.char_diff = diff_chars(old, &self.value);
        }
    }

    /// Shift line indices by the start of the region the entry came from.
    pub fn offset(&mut self, old_offset: usize, new_offset: usize) {
        if let Some(line) = &mut self.old_line {
            *line += old_offset;
        }
        if let Some(line) = &mut self.new_line {
            *line += new_offset;
        }
        if let Some(info) = &mut self.move_info {
            info.from_line += old_offset;
            info.to_line += new_offset;
        }
    }
}

/// Point the two halves of every move at each other.
pub fn link_move_halves(entries: &mut [ClassifiedEntry]) {
    let sources: HashMap<usize, usize> = entries
        .iter()
        .enumerate()
        .filter_map(|(idx, e)| match e.move_info {
            Some(info) if info.role == MoveRole::Source => Some((info.from_line, idx)),
            _ => None,
        })
        .collect();

    for idx in 0..entries.len() {
        let Some(info) = entries[idx].move_info else {
            continue;
        };
        if info.role != MoveRole::Destination {
            continue;
        }
        if let Some(&source) = sources.get(&info.from_line) {
            entries[idx].paired_index = Some(source);
            entries[source].paired_index = Some(idx);
        }
    }
}

/// Everything single-pass classification needs besides the runs.
pub struct ClassifyContext<'a> {
    pub scorer: SimilarityScorer<'a>,
    pub detect_moves: bool,
    pub modes: ModeToggles,
    pub cancel: &'a CancelToken,
}

#[derive(Debug, Clone, Default)]
pub struct Classified {
    pub entries: Vec<ClassifiedEntry>,
    pub moves: MoveSummary,
}

/// Within-block pairs, keyed by the position of the removed line.
#[derive(Debug, Default)]
struct Pairs {
    by_removed: HashMap<usize, (usize, f64)>,
    added: HashSet<usize>,
}

pub fn classify_runs(runs: &[DiffRun], ctx: &ClassifyContext<'_>) -> Result<Classified, Cancelled> {
    let scorer = &ctx.scorer;
    let flat = flatten_runs(runs);
    let blocks = build_blocks(&flat);

    let mut detection = MoveDetection::default();
    let mut moves_enabled = false;
    if ctx.detect_moves {
        let virtual_moves = find_virtual_moves(&flat, &blocks, scorer);
        if should_detect(&blocks, &virtual_moves) {
            detection = detect_moves(&blocks, &virtual_moves, scorer, ctx.cancel)?;
            moves_enabled = true;
        }
    }

    let mut pairs = Pairs::default();
    for block in &blocks {
        ctx.cancel.check()?;
        let removed: Vec<&BlockLine<'_>> = block.removed.iter().filter(|l| !detection.is_claimed(l.pos)).collect();
        let added: Vec<&BlockLine<'_>> = block.added.iter().filter(|l| !detection.is_claimed(l.pos)).collect();
        let removed_texts: Vec<&str> = removed.iter().map(|l| l.text).collect();
        let added_texts: Vec<&str> = added.iter().map(|l| l.text).collect();

        for (r, a, sim) in pair_lines(scorer, &removed_texts, &added_texts, ctx.cancel)? {
            pairs.by_removed.insert(removed[r].pos, (added[a].pos, sim));
            pairs.added.insert(added[a].pos);
        }
    }

    if moves_enabled {
        let taken = |pos: usize| {
            detection.is_claimed(pos) || pairs.by_removed.contains_key(&pos) || pairs.added.contains(&pos)
        };
        let mut removed = Vec::new();
        let mut added = Vec::new();
        for (b, block) in blocks.iter().enumerate() {
            removed.extend(block.removed.iter().filter(|l| !taken(l.pos)).map(|l| (b, *l)));
            added.extend(block.added.iter().filter(|l| !taken(l.pos)).map(|l| (b, *l)));
        }
        detect_cross_block(&removed, &added, scorer, &mut detection, ctx.cancel)?;
    }

    let mut entries = Vec::with_capacity(flat.len());
    let mut blocks_iter = blocks.iter();
    let mut pos = 0;
    while pos < flat.len() {
        let line = &flat[pos];
        if line.kind == RunKind::Unchanged {
            if let (Some(old), Some(new)) = (line.old_line, line.new_line) {
                let mut entry = ClassifiedEntry::unchanged(line.text, old, new);
                if let Some(claim) = detection.claims.get(&pos) {
                    entry.class = LineClass::Moved;
                    entry.similarity = Some(claim.similarity);
                    entry.move_info = Some(MoveInfo {
                        kind: MoveKind::Virtual,
                        role: MoveRole::InPlace,
                        from_line: old,
                        to_line: new,
                        block_move: claim.block_move,
                    });
                }
                entries.push(entry);
            }
            pos += 1;
            continue;
        }

        let Some(block) = blocks_iter.next() else {
            break;
        };
        emit_block(block, &flat, &detection, &pairs, &ctx.modes, &mut entries);
        pos += block.line_count();
    }

    link_move_halves(&mut entries);
    Ok(Classified {
        entries,
        moves: detection.summary,
    })
}

/// Match moves between independently classified parts of one diff.
///
/// Removed and added entries that no part could explain are offered to block,
/// line and cross-block detection together. Entry `idx` contributes position
/// `2 * idx` for its old side and `2 * idx + 1` for its new side; sides that
/// are already settled stay in their blocks but are never matched.
pub fn match_across_regions(classified: &mut Classified, ctx: &ClassifyContext<'_>) -> Result<(), Cancelled> {
    if !ctx.detect_moves {
        return Ok(());
    }

    let entries = &classified.entries;
    let mut detection = MoveDetection::default();
    let mut blocks: Vec<ChangeBlock<'_>> = Vec::new();
    let mut current = ChangeBlock::default();
    for (idx, entry) in entries.iter().enumerate() {
        let in_place = entry.move_info.is_some_and(|info| info.role == MoveRole::InPlace);
        if entry.class == LineClass::Unchanged || in_place {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            continue;
        }

        let settled = !matches!(entry.class, LineClass::Added | LineClass::Removed);
        if let (Some(text), Some(line)) = (entry.old_text(), entry.old_line) {
            current.removed.push(BlockLine { text, pos: 2 * idx, line });
            if settled {
                detection.reserve(2 * idx);
            }
        }
        if let (Some(text), Some(line)) = (entry.new_text(), entry.new_line) {
            current.added.push(BlockLine { text, pos: 2 * idx + 1, line });
            if settled {
                detection.reserve(2 * idx + 1);
            }
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    if blocks.len() < 2 || !should_detect(&blocks, &[]) {
        return Ok(());
    }

    let scorer = &ctx.scorer;
    detection.detect(&blocks, scorer, ctx.cancel)?;
    let mut removed = Vec::new();
    let mut added = Vec::new();
    for (b, block) in blocks.iter().enumerate() {
        removed.extend(block.removed.iter().filter(|l| !detection.is_claimed(l.pos)).map(|l| (b, *l)));
        added.extend(block.added.iter().filter(|l| !detection.is_claimed(l.pos)).map(|l| (b, *l)));
    }
    detect_cross_block(&removed, &added, scorer, &mut detection, ctx.cancel)?;
    if detection.claims.is_empty() {
        return Ok(());
    }

    let block_base = classified.moves.block_moves.len();
    let mut rewrites = Vec::with_capacity(detection.claims.len());
    for (&pos, claim) in &detection.claims {
        let claim = Claim {
            block_move: claim.block_move.map(|b| b + block_base),
            ..*claim
        };
        let (entry, partner) = (&entries[pos / 2], &entries[claim.partner / 2]);
        let rewritten = if pos % 2 == 0 {
            let (Some(text), Some(line)) = (entry.old_text(), entry.old_line) else {
                continue;
            };
            source_half(text, line, partner.new_line, &claim)
        } else {
            let (Some(text), Some(line)) = (entry.new_text(), entry.new_line) else {
                continue;
            };
            let from = partner.old_text().zip(partner.old_line);
            destination_half(text, line, from, &claim, &ctx.modes)
        };
        rewrites.push((pos / 2, rewritten));
    }

    log::debug!("{} lines matched across regions", rewrites.len());
    for (idx, entry) in rewrites {
        classified.entries[idx] = entry;
    }
    classified.moves.append(detection.summary);
    link_move_halves(&mut classified.entries);
    Ok(())
}

fn move_class(kind: MoveKind) -> LineClass {
    match kind {
        MoveKind::CrossBlock => LineClass::MovedModified,
        MoveKind::Virtual | MoveKind::Block | MoveKind::Line => LineClass::Moved,
    }
}

fn source_half(text: &str, old_line: usize, to_line: Option<usize>, claim: &Claim) -> ClassifiedEntry {
    let mut entry = ClassifiedEntry::new(move_class(claim.kind), text, Some(old_line), None);
    entry.similarity = Some(claim.similarity);
    entry.move_info = Some(MoveInfo {
        kind: claim.kind,
        role: MoveRole::Source,
        from_line: old_line,
        to_line: to_line.unwrap_or_default(),
        block_move: claim.block_move,
    });
    entry
}

/// `from` is the text and old line of the source half.
fn destination_half(
    text: &str,
    new_line: usize,
    from: Option<(&str, usize)>,
    claim: &Claim,
    modes: &ModeToggles,
) -> ClassifiedEntry {
    let mut entry = ClassifiedEntry::new(move_class(claim.kind), text, None, Some(new_line));
    entry.similarity = Some(claim.similarity);
    entry.old_value = from.map(|(old, _)| old.to_string()).filter(|old| old != text);
    entry.move_info = Some(MoveInfo {
        kind: claim.kind,
        role: MoveRole::Destination,
        from_line: from.map(|(_, line)| line).unwrap_or_default(),
        to_line: new_line,
        block_move: claim.block_move,
    });
    entry.attach_sub_diffs(modes);
    entry
}

/// An added line that a virtual move paired back up with the removed line
/// `old`.
fn restored_entry(old: (&str, usize), line: &BlockLine<'_>, similarity: f64, modes: &ModeToggles) -> ClassifiedEntry {
    let (old_text, old_line) = old;
    if old_text == line.text {
        return ClassifiedEntry::unchanged(line.text, old_line, line.line);
    }
    let mut entry = ClassifiedEntry::modified(old_text, line.text, old_line, line.line, Some(similarity));
    entry.attach_sub_diffs(modes);
    entry
}

/// Emit the entries of one change block.
///
/// Removed lines keep their order; an added line that is not paired within
/// the block is emitted before the first modified line whose added side comes
/// after it.
fn emit_block(
    block: &ChangeBlock<'_>,
    flat: &[RunLine<'_>],
    detection: &MoveDetection,
    pairs: &Pairs,
    modes: &ModeToggles,
    entries: &mut Vec<ClassifiedEntry>,
) {
    let old_side = |pos: usize| flat.get(pos).and_then(|p| Some((p.text, p.old_line?)));
    let added_entry = |line: &BlockLine<'_>| {
        if let Some(claim) = detection.claims.get(&line.pos) {
            return destination_half(line.text, line.line, old_side(claim.partner), claim, modes);
        }
        let restored = detection
            .displaced
            .get(&line.pos)
            .and_then(|&(partner, sim)| Some((old_side(partner)?, sim)));
        match restored {
            Some((old, sim)) => restored_entry(old, line, sim, modes),
            None => ClassifiedEntry::added(line.text, line.line),
        }
    };

    let added_base = block.added.first().map_or(0, |l| l.pos);
    let mut added_emitted = vec![false; block.added.len()];

    for line in &block.removed {
        if detection.displaced.contains_key(&line.pos) {
            // Emitted with its added partner.
            continue;
        }
        if let Some(&(added_pos, sim)) = pairs.by_removed.get(&line.pos) {
            let Some(partner_idx) = added_pos.checked_sub(added_base).filter(|&i| i < block.added.len()) else {
                debug_assert!(false, "within-block pair leaves its block");
                log::warn!("dropping inconsistent pairing at position {}", line.pos);
                entries.push(ClassifiedEntry::removed(line.text, line.line));
                continue;
            };
            for k in 0..partner_idx {
                if !added_emitted[k] && !pairs.added.contains(&block.added[k].pos) {
                    added_emitted[k] = true;
                    entries.push(added_entry(&block.added[k]));
                }
            }
            added_emitted[partner_idx] = true;

            let partner = &block.added[partner_idx];
            let mut entry = ClassifiedEntry::modified(line.text, partner.text, line.line, partner.line, Some(sim));
            entry.attach_sub_diffs(modes);
            entries.push(entry);
            continue;
        }

        entries.push(match detection.claims.get(&line.pos) {
            Some(claim) => {
                let to_line = flat.get(claim.partner).and_then(|p| p.new_line);
                source_half(line.text, line.line, to_line, claim)
            }
            None => ClassifiedEntry::removed(line.text, line.line),
        });
    }

    for (k, line) in block.added.iter().enumerate() {
        if !added_emitted[k] {
            entries.push(added_entry(line));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::diff::differ::DiffAlgorithm;
    use crate::diff::hasher::ContentHasher;
    use crate::diff::similarity::Thresholds;

    fn classify(old: &[&str], new: &[&str], modes: ModeToggles) -> Classified {
        let hasher = ContentHasher::new();
        let cancel = CancelToken::new();
        let ctx = ClassifyContext {
            scorer: SimilarityScorer::new(&hasher, Thresholds::default()),
            detect_moves: true,
            modes,
            cancel: &cancel,
        };
        let runs = DiffAlgorithm::default().run(old, new);
        classify_runs(&runs, &ctx).unwrap()
    }

    #[test]
    fn test_modified_pair() {
        let old = ["fn main() {", "    let total = price * count;", "}"];
        let new = ["fn main() {", "    let total = price * count * tax;", "    println!(\"{}\", total);", "}"];
        let modes = ModeToggles {
            words: true,
            ..ModeToggles::default()
        };
        let out = classify(&old, &new, modes);

        let classes: Vec<LineClass> = out.entries.iter().map(|e| e.class).collect();
        assert_eq!(
            classes,
            vec![LineClass::Unchanged, LineClass::Modified, LineClass::Added, LineClass::Unchanged]
        );
        let modified = &out.entries[1];
        assert_eq!(modified.old_text(), Some("    let total = price * count;"));
        assert_eq!(modified.new_text(), Some("    let total = price * count * tax;"));
        assert!(modified.word_diff.is_some());
        assert!(modified.char_diff.is_none());
        assert!(out.moves.is_empty());
    }

    #[test]
    fn test_move_halves_are_linked() {
        let old = ["line 1", "line 2", "function f(){", "  x();", "}", "line 6", "line 7"];
        let new = ["line 1", "line 2", "line 6", "line 7", "function f(){", "  x();", "}"];
        let out = classify(&old, &new, ModeToggles::default());

        assert_eq!(out.moves.block_moves.len(), 1);
        for (idx, entry) in out.entries.iter().enumerate() {
            let Some(info) = entry.move_info else {
                continue;
            };
            match info.role {
                MoveRole::InPlace => assert_eq!(entry.paired_index, None),
                MoveRole::Source | MoveRole::Destination => {
                    let other = entry.paired_index.unwrap();
                    assert_eq!(out.entries[other].paired_index, Some(idx));
                    assert_eq!(out.entries[other].value, entry.value);
                }
            }
        }
    }

    #[test]
    fn test_match_across_regions() {
        let moved = [
            "let first = load(config);",
            "let second = parse(first);",
            "let third = check(second);",
            "store(third);",
        ];
        let mut classified = Classified::default();
        for (k, text) in moved.iter().enumerate() {
            classified.entries.push(ClassifiedEntry::removed(text, k));
        }
        for k in 0..8 {
            classified.entries.push(ClassifiedEntry::unchanged("keep();", 4 + k, k));
        }
        classified.entries.push(ClassifiedEntry::modified("let x = 1;", "let x = 2;", 12, 8, Some(0.7)));
        for (k, text) in moved.iter().enumerate() {
            classified.entries.push(ClassifiedEntry::added(text, 9 + k));
        }

        let hasher = ContentHasher::new();
        let cancel = CancelToken::new();
        let ctx = ClassifyContext {
            scorer: SimilarityScorer::new(&hasher, Thresholds::default()),
            detect_moves: true,
            modes: ModeToggles::default(),
            cancel: &cancel,
        };
        match_across_regions(&mut classified, &ctx).unwrap();

        assert_eq!(classified.moves.block_moves.len(), 1);
        let block = classified.moves.block_moves[0];
        assert_eq!((block.old_start, block.new_start, block.size), (0, 9, 4));
        assert_eq!(classified.entries[12].class, LineClass::Modified);
        for idx in 0..4 {
            let source = &classified.entries[idx];
            assert_eq!(source.class, LineClass::Moved);
            assert_eq!(source.paired_index, Some(13 + idx));
            assert_eq!(source.move_info.unwrap().to_line, 9 + idx);
            assert_eq!(classified.entries[13 + idx].move_info.unwrap().role, MoveRole::Destination);
        }
    }

    #[test]
    fn test_offset() {
        let mut entry = ClassifiedEntry::modified("a", "b", 1, 2, Some(0.6));
        entry.offset(10, 20);
        assert_eq!((entry.old_line, entry.new_line), (Some(11), Some(22)));
        assert_eq!(ClassifiedEntry::added("x", 0).old_text(), None);
    }
}
