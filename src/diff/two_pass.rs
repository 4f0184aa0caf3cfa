// SPDX-License-Identifier: MIT

//! Two-pass classification: anchor the texts on patience matches, then
//! classify the regions between anchors independently.

use rayon::prelude::*;

use super::cancel::CancelToken;
use super::classify::{link_move_halves, ClassifiedEntry, Classified};
use super::patience::patience_lcs;
use super::pipeline::ClassifyError;

/// Below this share of anchored lines the texts are classified in one pass.
pub const MIN_ANCHOR_RATIO: f64 = 0.05;

/// Span between two anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region<'a> {
    pub old_start: usize,
    pub old_end: usize,
    pub new_start: usize,
    pub new_end: usize,
    pub old_lines: &'a [&'a str],
    pub new_lines: &'a [&'a str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Anchor(usize, usize),
    Region(usize),
}

#[derive(Debug, Clone)]
pub struct TwoPassPlan<'a> {
    pub anchors: Vec<(usize, usize)>,
    pub regions: Vec<Region<'a>>,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TwoPassInfo {
    pub used: bool,
    pub anchors: usize,
    pub regions: usize,
    pub anchor_ratio: f64,
    /// Why the single pass was used instead.
    pub fallback_reason: Option<&'static str>,
}
impl TwoPassInfo {
    pub fn fallback(anchors: usize, anchor_ratio: f64, reason: &'static str) -> Self {
        Self {
            used: false,
            anchors,
            regions: 0,
            anchor_ratio,
            fallback_reason: Some(reason),
        }
    }
}

/// Verified patience matches, grown over neighbouring equal lines.
pub fn find_anchors(old: &[&str], new: &[&str]) -> Vec<(usize, usize)> {
    let verified: Vec<(usize, usize)> = patience_lcs(old, new)
        .into_iter()
        .filter(|&(o, n)| {
            let equal = old.get(o).is_some_and(|line| new.get(n) == Some(line));
            if !equal {
                debug_assert!(false, "anchor ({}, {}) joins different lines", o, n);
                log::warn!("dropping bogus anchor ({}, {})", o, n);
            }
            equal
        })
        .collect();

    let mut anchors = Vec::with_capacity(verified.len());
    let mut lower = (0, 0);
    for (k, &(o, n)) in verified.iter().enumerate() {
        if o < lower.0 || n < lower.1 {
            // Already covered by the forward growth of the previous anchor.
            continue;
        }
        let upper = verified.get(k + 1).copied().unwrap_or((old.len(), new.len()));

        let start = anchors.len();
        let (mut bo, mut bn) = (o, n);
        while bo > lower.0 && bn > lower.1 && old[bo - 1] == new[bn - 1] {
            bo -= 1;
            bn -= 1;
            anchors.push((bo, bn));
        }
        anchors[start..].reverse();

        anchors.push((o, n));
        let (mut fo, mut fn_) = (o + 1, n + 1);
        while fo < upper.0 && fn_ < upper.1 && old[fo] == new[fn_] {
            anchors.push((fo, fn_));
            fo += 1;
            fn_ += 1;
        }
        lower = (fo, fn_);
    }
    anchors
}

/// Anchor the two texts, or explain why the single pass should be used.
pub fn plan<'a>(old: &'a [&'a str], new: &'a [&'a str]) -> Result<TwoPassPlan<'a>, TwoPassInfo> {
    let anchors = find_anchors(old, new);
    let total = old.len().max(new.len()).max(1);
    let ratio = anchors.len() as f64 / total as f64;
    if anchors.is_empty() {
        return Err(TwoPassInfo::fallback(0, ratio, "no anchors"));
    }
    if ratio < MIN_ANCHOR_RATIO {
        return Err(TwoPassInfo::fallback(anchors.len(), ratio, "too few anchors"));
    }

    let mut regions = Vec::new();
    let mut segments = Vec::with_capacity(anchors.len() * 2 + 1);
    let mut push_region = |old_start: usize,
                           old_end: usize,
                           new_start: usize,
                           new_end: usize,
                           segments: &mut Vec<Segment>| {
        if old_start < old_end || new_start < new_end {
            segments.push(Segment::Region(regions.len()));
            regions.push(Region {
                old_start,
                old_end,
                new_start,
                new_end,
                old_lines: &old[old_start..old_end],
                new_lines: &new[new_start..new_end],
            });
        }
    };

    let mut cursor = (0, 0);
    for &(o, n) in &anchors {
        push_region(cursor.0, o, cursor.1, n, &mut segments);
        segments.push(Segment::Anchor(o, n));
        cursor = (o + 1, n + 1);
    }
    push_region(cursor.0, old.len(), cursor.1, new.len(), &mut segments);

    log::debug!(
        "two-pass: {} anchors ({:.1}%), {} regions",
        anchors.len(),
        ratio * 100.0,
        regions.len()
    );
    Ok(TwoPassPlan {
        anchors,
        regions,
        segments,
    })
}

impl TwoPassPlan<'_> {
    pub fn info(&self, old_len: usize, new_len: usize) -> TwoPassInfo {
        TwoPassInfo {
            used: true,
            anchors: self.anchors.len(),
            regions: self.regions.len(),
            anchor_ratio: self.anchors.len() as f64 / old_len.max(new_len).max(1) as f64,
            fallback_reason: None,
        }
    }

    /// Classify all regions in parallel and merge them with the anchors in
    /// position order.
    pub fn classify<F>(
        &self,
        old: &[&str],
        cancel: &CancelToken,
        classify_region: F,
    ) -> Result<Classified, ClassifyError>
    where
        F: Fn(&Region<'_>) -> Result<Classified, ClassifyError> + Sync,
    {
        let mut outputs: Vec<Option<Classified>> = self
            .regions
            .par_iter()
            .map(|region| {
                cancel.check()?;
                classify_region(region).map(Some)
            })
            .collect::<Result<_, _>>()?;

        let mut merged = Classified::default();
        for segment in &self.segments {
            match *segment {
                Segment::Anchor(o, n) => {
                    merged.entries.push(ClassifiedEntry::unchanged(old[o], o, n));
                }
                Segment::Region(idx) => {
                    let Some(mut output) = outputs[idx].take() else {
                        continue;
                    };
                    let region = &self.regions[idx];
                    let block_base = merged.moves.block_moves.len();
                    for mut entry in output.entries {
                        entry.offset(region.old_start, region.new_start);
                        entry.paired_index = None;
                        if let Some(info) = &mut entry.move_info {
                            if let Some(block) = &mut info.block_move {
                                *block += block_base;
                            }
                        }
                        merged.entries.push(entry);
                    }
                    output.moves.offset(region.old_start, region.new_start);
                    merged.moves.append(output.moves);
                }
            }
        }

        link_move_halves(&mut merged.entries);
        Ok(merged)
    }
}
