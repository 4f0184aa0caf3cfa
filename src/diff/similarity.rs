// SPDX-License-Identifier: MIT

//! Tiered line similarity.
//!
//! Tiers run cheapest first and stop as soon as the answer is clear:
//!
//!  1. normalized texts are equal: 1.0,
//!  2. the 32-bit signatures are too far apart: a damped signature estimate,
//!  3. a blend of token-structure similarity and word-diff similarity,
//!  4. optionally blended with a [`StructuralComparator`] score.
//!
//! Pairs are put into a canonical order before scoring, so the result does not
//! depend on argument order.

use std::borrow::Cow;
use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use similar::{ChangeTag, TextDiff};

use super::cancel::{CancelToken, Cancelled};
use super::hasher::{ContentHasher, SIGNATURE_BITS};
use super::structural::{compare_best_effort, score_batch, StructuralComparator};
use super::tokens::{tokenize, Token, TokenKind};

pub const FAST_THRESHOLD: f64 = 0.30;
pub const MODIFIED_THRESHOLD: f64 = 0.50;
pub const MOVE_THRESHOLD: f64 = 0.90;

/// Largest signature estimate short of identical signatures.
const MAX_FLOOR_ESTIMATE: f64 = 1.0 - 1.0 / SIGNATURE_BITS as f64;

/// Word diffs are skipped when both lines together exceed this many bytes.
pub const WORD_DIFF_BUDGET: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Signature estimates below this reject a pair without full scoring.
    pub fast: f64,
    /// Minimum similarity for two lines to count as the same, modified line.
    pub modified: f64,
    /// Minimum similarity for a line to count as moved.
    pub moved: f64,
}
impl Default for Thresholds {
    fn default() -> Self {
        Self {
            fast: FAST_THRESHOLD,
            modified: MODIFIED_THRESHOLD,
            moved: MOVE_THRESHOLD,
        }
    }
}

lazy_static! {
    static ref DELIMITER_SPACE: Regex = Regex::new(r"\s*([(){}\[\],;])\s*").unwrap();
}

/// `2 * |LCS| / (|a| + |b|)`; two empty sequences are identical.
pub fn lcs_ratio<T: PartialEq>(a: &[T], b: &[T]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let mut row = vec![0u32; short.len() + 1];
    for x in long {
        let mut diag = 0;
        for (j, y) in short.iter().enumerate() {
            let up = row[j + 1];
            row[j + 1] = if x == y { diag + 1 } else { up.max(row[j]) };
            diag = up;
        }
    }
    2.0 * row[short.len()] as f64 / (a.len() + b.len()) as f64
}

fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> Option<f64> {
    if a.is_empty() && b.is_empty() {
        return None;
    }
    let common = a.intersection(b).count();
    Some(common as f64 / (a.len() + b.len() - common) as f64)
}

fn texts<'a>(tokens: &[Token<'a>]) -> Vec<&'a str> {
    tokens.iter().map(|t| t.text).collect()
}

fn normalized<'a>(tokens: &[Token<'a>]) -> Vec<&'a str> {
    tokens.iter().map(Token::normalized).collect()
}

fn set_of<'a>(tokens: &[Token<'a>], kind: TokenKind) -> HashSet<&'a str> {
    tokens
        .iter()
        .filter(|t| t.kind == kind)
        .map(|t| t.text)
        .collect()
}

/// Token-structure similarity of two (normalized) lines.
pub fn token_similarity(a: &str, b: &str) -> f64 {
    let ta = tokenize(a);
    let tb = tokenize(b);
    if ta.is_empty() || tb.is_empty() {
        return if ta.is_empty() && tb.is_empty() { 1.0 } else { 0.0 };
    }

    let parts = [
        (0.05, Some(lcs_ratio(&texts(&ta), &texts(&tb)))),
        (0.55, Some(lcs_ratio(&normalized(&ta), &normalized(&tb)))),
        (
            0.25,
            jaccard(&set_of(&ta, TokenKind::Keyword), &set_of(&tb, TokenKind::Keyword)),
        ),
        (
            0.15,
            jaccard(
                &set_of(&ta, TokenKind::Identifier),
                &set_of(&tb, TokenKind::Identifier),
            ),
        ),
    ];

    let (sum, weight) = parts
        .iter()
        .filter_map(|(w, s)| s.map(|s| (w * s, *w)))
        .fold((0.0, 0.0), |(sum, weight), (s, w)| (sum + s, weight + w));
    sum / weight
}

/// Word-diff similarity: `2 * unchanged chars / total chars`, or `None` when
/// the lines are too long to diff.
pub fn word_similarity(a: &str, b: &str) -> Option<f64> {
    if a.len() + b.len() > WORD_DIFF_BUDGET {
        return None;
    }
    let total = a.chars().count() + b.chars().count();
    if total == 0 {
        return Some(1.0);
    }
    let unchanged: usize = TextDiff::from_words(a, b)
        .iter_all_changes()
        .filter(|change| change.tag() == ChangeTag::Equal)
        .map(|change| change.value().chars().count())
        .sum();
    Some(2.0 * unchanged as f64 / total as f64)
}

/// Access to the optional structural comparator for one invocation.
#[derive(Clone, Copy)]
pub struct StructuralContext<'a> {
    pub comparator: &'a dyn StructuralComparator,
    pub language: &'a str,
    pub weight: f64,
}

/// Outcome of the cheap tiers for one pair.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Tier {
    Exact,
    Empty,
    Rejected(f64),
    Composite { composite: f64, floor: f64 },
}

pub struct SimilarityScorer<'a> {
    hasher: &'a ContentHasher,
    thresholds: Thresholds,
    normalize_delimiters: bool,
    token_weight: f64,
    structural: Option<StructuralContext<'a>>,
}
impl<'a> SimilarityScorer<'a> {
    pub fn new(hasher: &'a ContentHasher, thresholds: Thresholds) -> Self {
        Self {
            hasher,
            thresholds,
            normalize_delimiters: false,
            token_weight: 0.7,
            structural: None,
        }
    }

    pub fn with_normalize_delimiters(mut self, enable: bool) -> Self {
        self.normalize_delimiters = enable;
        self
    }

    pub fn with_token_weight(mut self, weight: f64) -> Self {
        self.token_weight = weight.clamp(0.0, 1.0);
        self
    }

    pub fn with_structural(mut self, structural: Option<StructuralContext<'a>>) -> Self {
        self.structural = structural;
        self
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn hasher(&self) -> &'a ContentHasher {
        self.hasher
    }

    pub fn normalize<'t>(&self, text: &'t str) -> Cow<'t, str> {
        let trimmed = text.trim();
        let lowered: Cow<'t, str> = if trimmed.chars().any(char::is_uppercase) {
            Cow::Owned(trimmed.to_lowercase())
        } else {
            Cow::Borrowed(trimmed)
        };
        if !self.normalize_delimiters {
            return lowered;
        }
        let replaced = match DELIMITER_SPACE.replace_all(&lowered, "$1") {
            Cow::Owned(replaced) => Some(replaced),
            Cow::Borrowed(_) => None,
        };
        replaced.map(Cow::Owned).unwrap_or(lowered)
    }

    fn tiers(&self, a: &str, b: &str) -> Tier {
        if a == b {
            return Tier::Exact;
        }
        if a.is_empty() || b.is_empty() {
            return Tier::Empty;
        }

        let sig_a = self.hasher.signature(a);
        let sig_b = self.hasher.signature(b);
        // Passing pairs never score below what a rejection would have given
        // them. The floor stays below 0.5 so that it cannot pair lines on
        // its own.
        let floor = if sig_a.is_zero() || sig_b.is_zero() {
            0.0
        } else {
            let estimate = sig_a.estimate(sig_b);
            if estimate < self.thresholds.fast {
                return Tier::Rejected(estimate * 0.5);
            }
            estimate.min(MAX_FLOOR_ESTIMATE) * 0.5
        };

        let token = token_similarity(a, b);
        let composite = match word_similarity(a, b) {
            Some(word) => self.token_weight * token + (1.0 - self.token_weight) * word,
            None => token,
        };
        Tier::Composite { composite, floor }
    }

    fn finish(&self, tier: Tier, structural: Option<f64>) -> f64 {
        match tier {
            Tier::Exact => 1.0,
            Tier::Empty => 0.0,
            Tier::Rejected(score) => score,
            Tier::Composite { composite, floor } => {
                let blended = match (structural, self.structural) {
                    (Some(score), Some(ctx)) => ctx.weight * score + (1.0 - ctx.weight) * composite,
                    _ => composite,
                };
                blended.max(floor).clamp(0.0, 1.0)
            }
        }
    }

    /// Normalize both lines and order them canonically.
    fn prepare<'t>(&self, a: &'t str, b: &'t str) -> (Cow<'t, str>, Cow<'t, str>) {
        let a = self.normalize(a);
        let b = self.normalize(b);
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn score(&self, a: &str, b: &str) -> f64 {
        let (a, b) = self.prepare(a, b);
        let tier = self.tiers(&a, &b);
        let structural = match (tier, self.structural) {
            (Tier::Composite { .. }, Some(ctx)) => {
                compare_best_effort(ctx.comparator, &a, &b, ctx.language)
            }
            _ => None,
        };
        self.finish(tier, structural)
    }

    /// Similarity of every removed line against every added line, indexed
    /// `[removed][added]`.
    ///
    /// Structural comparator calls for the whole matrix go through one bounded
    /// batch.
    pub fn score_matrix(
        &self,
        removed: &[&str],
        added: &[&str],
        cancel: &CancelToken,
    ) -> Result<Vec<Vec<f64>>, Cancelled> {
        let removed: Vec<Cow<'_, str>> = removed.iter().map(|l| self.normalize(l)).collect();
        let added: Vec<Cow<'_, str>> = added.iter().map(|l| self.normalize(l)).collect();

        let mut tiers = Vec::with_capacity(removed.len() * added.len());
        let mut pending = Vec::new();
        for r in &removed {
            for a in &added {
                let (x, y) = if r <= a { (r, a) } else { (a, r) };
                let tier = self.tiers(x, y);
                if matches!(tier, Tier::Composite { .. }) && self.structural.is_some() {
                    pending.push((tiers.len(), &**x, &**y));
                }
                tiers.push(tier);
            }
        }

        let mut structural = vec![None; tiers.len()];
        if let Some(ctx) = self.structural {
            let pairs: Vec<(&str, &str)> = pending.iter().map(|&(_, x, y)| (x, y)).collect();
            let scores = score_batch(ctx.comparator, &pairs, ctx.language, cancel)?;
            for (&(idx, _, _), score) in pending.iter().zip(scores) {
                structural[idx] = score;
            }
        }

        let matrix: Vec<Vec<f64>> = if added.is_empty() {
            vec![Vec::new(); removed.len()]
        } else {
            tiers
                .iter()
                .zip(structural)
                .map(|(&tier, structural)| self.finish(tier, structural))
                .collect::<Vec<_>>()
                .chunks(added.len())
                .map(<[f64]>::to_vec)
                .collect()
        };

        #[cfg(feature = "debug-diff")]
        for (idx, row) in matrix.iter().enumerate() {
            log::trace!("similarity row {}: {:?}", idx, row);
        }

        Ok(matrix)
    }
}
