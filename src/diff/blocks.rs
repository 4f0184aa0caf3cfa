// SPDX-License-Identifier: MIT

//! Grouping of the flat line list into change blocks.

use super::differ::{RunKind, RunLine};

/// A changed line inside a [`ChangeBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLine<'a> {
    pub text: &'a str,
    /// Position in the flattened run list.
    pub pos: usize,
    /// Line index on the line's own side (old for removed, new for added).
    pub line: usize,
}

/// A run of removed lines followed by a run of added lines.
///
/// Either side may be empty, but not both. Virtual blocks describe unchanged
/// lines that shifted position; both sides hold the same positions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBlock<'a> {
    pub removed: Vec<BlockLine<'a>>,
    pub added: Vec<BlockLine<'a>>,
    pub is_virtual: bool,
}
impl<'a> ChangeBlock<'a> {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }

    /// Number of lines on both sides.
    pub fn line_count(&self) -> usize {
        self.removed.len() + self.added.len()
    }

    pub fn removed_texts(&self) -> Vec<&'a str> {
        self.removed.iter().map(|l| l.text).collect()
    }

    pub fn added_texts(&self) -> Vec<&'a str> {
        self.added.iter().map(|l| l.text).collect()
    }
}

pub fn build_blocks<'a>(lines: &[RunLine<'a>]) -> Vec<ChangeBlock<'a>> {
    let mut blocks = Vec::new();
    let mut current = ChangeBlock::default();

    for (pos, line) in lines.iter().enumerate() {
        match (line.kind, line.old_line, line.new_line) {
            (RunKind::Removed, Some(old_line), _) => {
                if !current.added.is_empty() {
                    blocks.push(std::mem::take(&mut current));
                }
                current.removed.push(BlockLine {
                    text: line.text,
                    pos,
                    line: old_line,
                });
            }
            (RunKind::Added, _, Some(new_line)) => {
                current.added.push(BlockLine {
                    text: line.text,
                    pos,
                    line: new_line,
                });
            }
            _ => {
                if !current.is_empty() {
                    blocks.push(std::mem::take(&mut current));
                }
            }
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }

    blocks
}
