// SPDX-License-Identifier: MIT

//! Slider correction: moving a modified pairing one line up or down when the
//! neighbouring added line is the more plausible partner.

use super::classify::{ClassifiedEntry, LineClass};
use super::pipeline::ModeToggles;
use super::similarity::SimilarityScorer;

/// New-side lines on either side of a candidate position that are looked at.
pub const CONTEXT_LINES: usize = 5;
/// Minimum score improvement before a shift is considered.
pub const AMBIGUITY_THRESHOLD: f64 = 0.15;
/// Minimum confidence before a shift is applied.
pub const CORRECTION_THRESHOLD: f64 = 0.7;
/// Improvement that maps to full confidence.
const CONFIDENCE_SCALE: f64 = 0.3;

const TAB_WIDTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicWeights {
    pub delimiter: f64,
    pub indentation: f64,
    pub comment: f64,
    pub brace: f64,
}
impl Default for HeuristicWeights {
    fn default() -> Self {
        Self {
            delimiter: 0.3,
            indentation: 0.3,
            comment: 0.2,
            brace: 0.2,
        }
    }
}
impl HeuristicWeights {
    pub fn for_language(language: Option<&str>) -> Self {
        let language = language.map(str::to_ascii_lowercase);
        match language.as_deref() {
            Some("python" | "py") => Self {
                delimiter: 0.2,
                indentation: 0.5,
                comment: 0.3,
                brace: 0.0,
            },
            Some("yaml" | "yml") => Self {
                delimiter: 0.1,
                indentation: 0.6,
                comment: 0.3,
                brace: 0.0,
            },
            Some(
                "c" | "cpp" | "c++" | "h" | "hpp" | "java" | "javascript" | "js" | "typescript" | "ts" | "rust" | "rs"
                | "go" | "csharp" | "c#" | "kotlin" | "swift",
            ) => Self {
                delimiter: 0.3,
                indentation: 0.2,
                comment: 0.2,
                brace: 0.3,
            },
            _ => Self::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recommendation {
    Keep,
    ShiftLeft,
    ShiftRight,
}
impl Recommendation {
    pub fn as_str(self) -> &'static str {
        match self {
            Recommendation::Keep => "keep",
            Recommendation::ShiftLeft => "shift_left",
            Recommendation::ShiftRight => "shift_right",
        }
    }
}

/// A modified entry with an added neighbour, and how its alternatives scored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slider {
    /// Result index of the modified entry.
    pub index: usize,
    pub current_score: f64,
    pub left_score: Option<f64>,
    pub right_score: Option<f64>,
    pub confidence: f64,
    pub recommendation: Recommendation,
}

fn indentation(text: &str) -> usize {
    text.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
        .sum()
}

fn delimiter_balance(text: &str) -> i32 {
    text.chars()
        .map(|c| match c {
            '(' | '[' | '{' => 1,
            ')' | ']' | '}' => -1,
            _ => 0,
        })
        .sum()
}

fn is_comment(text: &str) -> bool {
    let text = text.trim_start();
    ["//", "#", "/*", "*", "--"].iter().any(|prefix| text.starts_with(prefix))
}

/// Whether the line opens a brace block, closes one, or neither.
fn brace_shape(text: &str) -> Option<char> {
    let text = text.trim();
    if text.ends_with('{') {
        Some('{')
    } else if text.starts_with('}') {
        Some('}')
    } else {
        None
    }
}

/// How well `old` fits at new-side position `at`, given the lines around it.
fn position_score(weights: &HeuristicWeights, old: &str, at: usize, new_lines: &[Option<&str>]) -> f64 {
    let Some(candidate) = new_lines.get(at).copied().flatten() else {
        return 0.0;
    };
    let window: Vec<&str> = new_lines[at.saturating_sub(CONTEXT_LINES)..new_lines.len().min(at + CONTEXT_LINES + 1)]
        .iter()
        .enumerate()
        .filter(|&(offset, _)| offset + at.saturating_sub(CONTEXT_LINES) != at)
        .filter_map(|(_, line)| *line)
        .collect();

    let balance_diff = (delimiter_balance(old) - delimiter_balance(candidate)).unsigned_abs();
    let delimiter = 1.0 / (1.0 + balance_diff as f64);

    let (old_indent, new_indent) = (indentation(old), indentation(candidate));
    let indent_match = 1.0 - old_indent.abs_diff(new_indent) as f64 / old_indent.max(new_indent).max(1) as f64;
    let continuity = if window.is_empty() {
        1.0
    } else {
        let average = window.iter().map(|l| indentation(l)).sum::<usize>() as f64 / window.len() as f64;
        1.0 / (1.0 + (new_indent as f64 - average).abs() / TAB_WIDTH as f64)
    };
    let indentation = 0.6 * indent_match + 0.4 * continuity;

    let old_comment = is_comment(old);
    let comment_match = if old_comment == is_comment(candidate) { 1.0 } else { 0.0 };
    let grouping = if window.is_empty() {
        1.0
    } else {
        window.iter().filter(|l| is_comment(l) == old_comment).count() as f64 / window.len() as f64
    };
    let comment = 0.5 * comment_match + 0.5 * grouping;

    let brace = if brace_shape(old) == brace_shape(candidate) { 1.0 } else { 0.0 };

    weights.delimiter * delimiter
        + weights.indentation * indentation
        + weights.comment * comment
        + weights.brace * brace
}

/// Score every modified entry that has an added neighbour and apply the
/// confident shifts.
///
/// Shifts are applied by descending confidence; a shifted entry locks itself
/// and its immediate neighbours. A shift whose new pair scores below the
/// modified threshold is not applied.
pub fn correct_sliders(
    entries: &mut [ClassifiedEntry],
    scorer: &SimilarityScorer<'_>,
    language: Option<&str>,
    modes: &ModeToggles,
) -> Vec<Slider> {
    let weights = HeuristicWeights::for_language(language);

    let mut sliders = Vec::new();
    // (slider index, neighbour result index)
    let mut candidates: Vec<(usize, usize)> = Vec::new();
    {
        let mut new_lines: Vec<Option<&str>> = Vec::new();
        for entry in entries.iter() {
            if let Some(line) = entry.new_line {
                if line >= new_lines.len() {
                    new_lines.resize(line + 1, None);
                }
                new_lines[line] = Some(&entry.value);
            }
        }

        let added_at = |idx: usize| {
            entries
                .get(idx)
                .filter(|e| e.class == LineClass::Added)
                .and_then(|e| e.new_line)
                .map(|line| (idx, line))
        };

        for (idx, entry) in entries.iter().enumerate() {
            if entry.class != LineClass::Modified {
                continue;
            }
            let (Some(old), Some(current)) = (entry.old_value.as_deref(), entry.new_line) else {
                continue;
            };
            let left = idx.checked_sub(1).and_then(added_at);
            let right = added_at(idx + 1);
            if left.is_none() && right.is_none() {
                continue;
            }

            let current_score = position_score(&weights, old, current, &new_lines);
            let left_score = left.map(|(_, line)| position_score(&weights, old, line, &new_lines));
            let right_score = right.map(|(_, line)| position_score(&weights, old, line, &new_lines));

            let mut slider = Slider {
                index: idx,
                current_score,
                left_score,
                right_score,
                confidence: 0.0,
                recommendation: Recommendation::Keep,
            };

            let mut best: Option<(usize, f64, Recommendation)> = None;
            for (side, score, recommendation) in [
                (left, left_score, Recommendation::ShiftLeft),
                (right, right_score, Recommendation::ShiftRight),
            ] {
                if let (Some((neighbour, _)), Some(score)) = (side, score) {
                    if best.map_or(true, |(_, best_score, _)| score > best_score) {
                        best = Some((neighbour, score, recommendation));
                    }
                }
            }

            if let Some((neighbour, score, recommendation)) = best {
                let improvement = score - current_score;
                slider.confidence = (improvement / CONFIDENCE_SCALE).clamp(0.0, 1.0);
                if improvement > AMBIGUITY_THRESHOLD && slider.confidence > CORRECTION_THRESHOLD {
                    slider.recommendation = recommendation;
                    candidates.push((sliders.len(), neighbour));
                }
            }
            sliders.push(slider);
        }
    }

    candidates.sort_by(|a, b| sliders[b.0].confidence.total_cmp(&sliders[a.0].confidence));

    let mut locked = vec![false; entries.len()];
    let mut applied = 0;
    for (slider_idx, neighbour) in candidates {
        let idx = sliders[slider_idx].index;
        if locked[idx] || locked[neighbour] {
            sliders[slider_idx].recommendation = Recommendation::Keep;
            continue;
        }

        let (Some(old), Some(old_line), Some(shifted_line), Some(new_line)) = (
            entries[idx].old_value.clone(),
            entries[idx].old_line,
            entries[idx].new_line,
            entries[neighbour].new_line,
        ) else {
            continue;
        };
        let similarity = scorer.score(&old, &entries[neighbour].value);
        if similarity < scorer.thresholds().modified {
            log::trace!("slider at {} not shifted, similarity {:.3}", idx, similarity);
            sliders[slider_idx].recommendation = Recommendation::Keep;
            continue;
        }

        let mut modified =
            ClassifiedEntry::modified(&old, &entries[neighbour].value, old_line, new_line, Some(similarity));
        modified.corrected = true;
        modified.attach_sub_diffs(modes);
        let mut added = ClassifiedEntry::added(&entries[idx].value, shifted_line);
        added.corrected = true;
        entries[neighbour] = modified;
        entries[idx] = added;

        for i in [idx, neighbour] {
            for j in i.saturating_sub(1)..=(i + 1).min(locked.len() - 1) {
                locked[j] = true;
            }
        }
        applied += 1;
    }

    log::debug!("slider correction: {} candidates, {} shifted", sliders.len(), applied);
    sliders
}
