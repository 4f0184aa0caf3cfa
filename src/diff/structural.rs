// SPDX-License-Identifier: MIT

//! Optional syntax-aware similarity.
//!
//! A [`StructuralComparator`] may contribute an extra score for a pair of
//! lines. It is best effort: absence, errors and nonsense scores are all
//! treated the same way, as "no opinion".

use diff_utils::prelude::*;
use rayon::prelude::*;

use super::cancel::{CancelToken, Cancelled};
use super::similarity::lcs_ratio;
use super::tokens::{tokenize, TokenKind};

/// Maximum number of comparator calls in flight at once.
pub const MAX_CONCURRENT_CALLS: usize = 5;

pub trait StructuralComparator: Send + Sync {
    /// Compare two lines written in `language`.
    ///
    /// `Ok(None)` means the comparator has nothing to say about this pair.
    fn compare(&self, a: &str, b: &str, language: &str) -> Result<Option<f64>>;
}

/// Call the comparator, mapping every failure mode to `None`.
pub fn compare_best_effort(
    comparator: &dyn StructuralComparator,
    a: &str,
    b: &str,
    language: &str,
) -> Option<f64> {
    match comparator.compare(a, b, language) {
        Ok(Some(score)) if score.is_finite() && (0.0..=1.0).contains(&score) => Some(score),
        Ok(Some(score)) => {
            log::trace!("structural comparator returned out-of-range score {}", score);
            None
        }
        Ok(None) => None,
        Err(err) => {
            log::trace!("structural comparator failed: {}", err);
            None
        }
    }
}

/// Score many pairs, keeping at most [`MAX_CONCURRENT_CALLS`] comparator calls
/// in flight. Results are in the order of `pairs`.
pub fn score_batch(
    comparator: &dyn StructuralComparator,
    pairs: &[(&str, &str)],
    language: &str,
    cancel: &CancelToken,
) -> std::result::Result<Vec<Option<f64>>, Cancelled> {
    let mut scores = Vec::with_capacity(pairs.len());
    for chunk in pairs.chunks(MAX_CONCURRENT_CALLS) {
        cancel.check()?;
        let chunk_scores: Vec<Option<f64>> = chunk
            .par_iter()
            .map(|(a, b)| compare_best_effort(comparator, a, b, language))
            .collect();
        scores.extend(chunk_scores);
    }
    Ok(scores)
}

/// Compares the shape of two lines: their token streams with identifiers and
/// literals replaced by placeholders.
#[derive(Debug, Clone, Default)]
pub struct TokenShapeComparator;

impl TokenShapeComparator {
    const LANGUAGES: &'static [&'static str] = &[
        "c", "cpp", "csharp", "go", "java", "javascript", "kotlin", "python", "rust", "swift",
        "typescript", "yaml",
    ];

    pub fn supports(language: &str) -> bool {
        Self::LANGUAGES.contains(&language.to_ascii_lowercase().as_str())
    }

    fn shape(line: &str) -> Vec<&str> {
        tokenize(line)
            .into_iter()
            .map(|token| match token.kind {
                TokenKind::Identifier => "$id",
                TokenKind::Number => "$num",
                TokenKind::String => "$str",
                TokenKind::Keyword | TokenKind::Punct => token.text,
            })
            .collect()
    }
}

impl StructuralComparator for TokenShapeComparator {
    fn compare(&self, a: &str, b: &str, language: &str) -> Result<Option<f64>> {
        if !Self::supports(language) {
            return Ok(None);
        }
        let (a, b) = (Self::shape(a), Self::shape(b));
        if a.is_empty() && b.is_empty() {
            return Ok(None);
        }
        Ok(Some(lcs_ratio(&a, &b)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Flaky;
    impl StructuralComparator for Flaky {
        fn compare(&self, a: &str, _b: &str, _language: &str) -> Result<Option<f64>> {
            match a {
                "err" => Err("parser exploded".into()),
                "nan" => Ok(Some(f64::NAN)),
                "big" => Ok(Some(1.5)),
                _ => Ok(Some(a.len() as f64 / 10.0)),
            }
        }
    }

    #[test]
    fn test_failures_degrade_to_none() {
        assert_eq!(compare_best_effort(&Flaky, "err", "x", "rust"), None);
        assert_eq!(compare_best_effort(&Flaky, "nan", "x", "rust"), None);
        assert_eq!(compare_best_effort(&Flaky, "big", "x", "rust"), None);
        assert_eq!(compare_best_effort(&Flaky, "abc", "x", "rust"), Some(0.3));
    }

    #[test]
    fn test_batch_keeps_order() {
        let lines: Vec<String> = (0..23).map(|n| "x".repeat(n % 10)).collect();
        let pairs: Vec<(&str, &str)> = lines.iter().map(|l| (l.as_str(), "y")).collect();
        let scores = score_batch(&Flaky, &pairs, "rust", &CancelToken::new()).unwrap();

        assert_eq!(scores.len(), 23);
        for (n, score) in scores.iter().enumerate() {
            assert_eq!(*score, Some((n % 10) as f64 / 10.0));
        }
    }

    #[test]
    fn test_batch_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        assert_eq!(score_batch(&Flaky, &[("a", "b")], "rust", &token), Err(Cancelled));
    }

    #[test]
    fn test_token_shape() -> Result<()> {
        let cmp = TokenShapeComparator;
        assert_eq!(cmp.compare("let a = 1;", "let b = 2;", "rust")?, Some(1.0));
        assert_eq!(cmp.compare("let a = 1;", "let b = 2;", "cobol")?, None);

        let score = cmp.compare("fn f(a: u32) {", "fn f(a: u32, b: u32) {", "Rust")?;
        assert!(score.is_some_and(|s| s > 0.5 && s < 1.0));
        Ok(())
    }
}
