// SPDX-License-Identifier: MIT

//! Word and character level diffs between the two sides of a paired line.

use similar::{ChangeTag, TextDiff};

use super::similarity::WORD_DIFF_BUDGET;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubDiffTag {
    Equal,
    Added,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubDiffPart {
    pub tag: SubDiffTag,
    pub value: String,
}

fn collect<'a>(diff: &TextDiff<'a, 'a, 'a, str>) -> Vec<SubDiffPart> {
    let mut parts: Vec<SubDiffPart> = Vec::new();
    for change in diff.iter_all_changes() {
        let tag = match change.tag() {
            ChangeTag::Equal => SubDiffTag::Equal,
            ChangeTag::Insert => SubDiffTag::Added,
            ChangeTag::Delete => SubDiffTag::Removed,
        };
        if let Some(last) = parts.last_mut().filter(|last| last.tag == tag) {
            last.value.push_str(change.value());
            continue;
        }
        parts.push(SubDiffPart {
            tag,
            value: change.value().to_string(),
        });
    }
    parts
}

/// Word-level diff, or `None` for lines above the size budget.
pub fn diff_words(old: &str, new: &str) -> Option<Vec<SubDiffPart>> {
    if old.len() + new.len() > WORD_DIFF_BUDGET {
        return None;
    }
    Some(collect(&TextDiff::from_words(old, new)))
}

/// Character-level diff, or `None` for lines above the size budget.
pub fn diff_chars(old: &str, new: &str) -> Option<Vec<SubDiffPart>> {
    if old.len() + new.len() > WORD_DIFF_BUDGET {
        return None;
    }
    Some(collect(&TextDiff::from_chars(old, new)))
}

/// Reassemble one side of a sub-diff.
pub fn side_text(parts: &[SubDiffPart], tag: SubDiffTag) -> String {
    parts
        .iter()
        .filter(|p| p.tag == SubDiffTag::Equal || p.tag == tag)
        .map(|p| p.value.as_str())
        .collect()
}
