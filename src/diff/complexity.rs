// SPDX-License-Identifier: MIT

//! Pre-flight cost estimate, and the bounded-cost classification used when
//! the estimate is too high.

use std::fmt;

use super::classify::ClassifiedEntry;
use super::differ::{flatten_runs, DiffRun, RunKind};
use super::blocks::build_blocks;
use super::pipeline::ModeToggles;

pub const MAX_LINES: usize = 50_000;
pub const MAX_GRAPH_VERTICES: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComplexityConfig {
    pub max_lines: usize,
    pub max_graph_vertices: usize,
    pub enable_fast_mode: bool,
}
impl Default for ComplexityConfig {
    fn default() -> Self {
        Self {
            max_lines: MAX_LINES,
            max_graph_vertices: MAX_GRAPH_VERTICES,
            enable_fast_mode: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitReason {
    None,
    LineCount,
    GraphSize,
}
impl LimitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            LimitReason::None => "none",
            LimitReason::LineCount => "line_count",
            LimitReason::GraphSize => "graph_size",
        }
    }
}
impl fmt::Display for LimitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComplexityDecision {
    pub exceeded: bool,
    pub reason: LimitReason,
    pub fast_mode: bool,
    /// Larger of the two line counts.
    pub line_count: usize,
    /// Removed times added line count, when it was computed.
    pub graph_size: Option<usize>,
}
impl ComplexityDecision {
    fn new(config: &ComplexityConfig, reason: LimitReason, line_count: usize, graph_size: Option<usize>) -> Self {
        let exceeded = reason != LimitReason::None;
        Self {
            exceeded,
            reason,
            fast_mode: exceeded && config.enable_fast_mode,
            line_count,
            graph_size,
        }
    }
}

/// First check, before the line differ ran.
pub fn check_line_count(config: &ComplexityConfig, old_len: usize, new_len: usize) -> Option<ComplexityDecision> {
    let line_count = old_len.max(new_len);
    if line_count > config.max_lines {
        Some(ComplexityDecision::new(config, LimitReason::LineCount, line_count, None))
    } else {
        None
    }
}

/// Second check, on the output of the line differ.
pub fn check_graph_size(
    config: &ComplexityConfig,
    old_len: usize,
    new_len: usize,
    runs: &[DiffRun],
) -> ComplexityDecision {
    let (removed, added) = super::differ::count_changes(runs);
    let graph_size = removed.saturating_mul(added);
    let reason = if graph_size > config.max_graph_vertices {
        LimitReason::GraphSize
    } else {
        LimitReason::None
    };
    ComplexityDecision::new(config, reason, old_len.max(new_len), Some(graph_size))
}

/// Classify straight from the differ output, without similarity scoring.
///
/// When word or character diffs are requested, removed and added lines of a
/// block are zipped up in order and reported as modified, without a
/// similarity.
pub fn fast_classify(runs: &[DiffRun], modes: &ModeToggles) -> Vec<ClassifiedEntry> {
    let flat = flatten_runs(runs);
    let pair_up = modes.words || modes.chars;
    let mut entries = Vec::with_capacity(flat.len());

    let mut blocks = build_blocks(&flat).into_iter().peekable();
    let mut pos = 0;
    while pos < flat.len() {
        let line = &flat[pos];
        if line.kind == RunKind::Unchanged {
            if let (Some(old), Some(new)) = (line.old_line, line.new_line) {
                entries.push(ClassifiedEntry::unchanged(line.text, old, new));
            }
            pos += 1;
            continue;
        }

        let Some(block) = blocks.next() else {
            break;
        };
        let paired = if pair_up {
            block.removed.len().min(block.added.len())
        } else {
            0
        };
        for (r, a) in block.removed.iter().zip(&block.added).take(paired) {
            let mut entry = ClassifiedEntry::modified(r.text, a.text, r.line, a.line, None);
            entry.attach_sub_diffs(modes);
            entries.push(entry);
        }
        for r in &block.removed[paired..] {
            entries.push(ClassifiedEntry::removed(r.text, r.line));
        }
        for a in &block.added[paired..] {
            entries.push(ClassifiedEntry::added(a.text, a.line));
        }
        pos += block.line_count();
    }

    entries
}
