// SPDX-License-Identifier: MIT

//! The classification pipeline.
//!
//! Init -> ComplexityCheck -> (FastMode | TwoPassDecision -> (SinglePass |
//! TwoPass) -> SliderCorrection) -> StatsAggregation -> Done

use std::fmt;
use std::time::{Duration, Instant};

use diff_utils::prelude::*;

use super::cancel::{CancelToken, Cancelled};
use super::classify::{
    classify_runs, match_across_regions, Classified, ClassifiedEntry, ClassifyContext, LineClass, MoveRole,
};
use super::complexity::{check_graph_size, check_line_count, fast_classify, ComplexityConfig, ComplexityDecision};
use super::differ::{DiffRun, LineDiffer};
use super::hasher::{CacheStats, ContentHasher};
use super::moves::MoveSummary;
use super::similarity::{SimilarityScorer, StructuralContext, Thresholds};
use super::slider::{correct_sliders, Slider};
use super::structural::StructuralComparator;
use super::two_pass::{self, TwoPassInfo};

pub const TWO_PASS_THRESHOLD: usize = 100;
pub const STRUCTURAL_MAX_LINES: usize = 5_000;
pub const TOKEN_WEIGHT: f64 = 0.7;
pub const STRUCTURAL_WEIGHT: f64 = 0.6;

/// Which sub-line diffs are computed for paired lines.
///
/// Classification is always line based; `lines` selects whether renderers
/// show the old side of a modified line as its own line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeToggles {
    pub lines: bool,
    pub words: bool,
    pub chars: bool,
}
impl Default for ModeToggles {
    fn default() -> Self {
        Self {
            lines: true,
            words: false,
            chars: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TwoPassMode {
    Never,
    Always,
    /// Two-pass for texts of at least `two_pass_threshold` lines.
    #[default]
    Auto,
}

#[derive(Debug, Clone)]
pub struct ClassifyOptions {
    pub detect_moves: bool,
    pub modes: ModeToggles,
    /// Enables the structural comparator and language specific slider
    /// heuristics.
    pub language: Option<String>,
    pub normalize_delimiters: bool,
    pub use_two_pass: TwoPassMode,
    pub two_pass_threshold: usize,
    pub thresholds: Thresholds,
    pub limits: ComplexityConfig,
    pub slider_correction: bool,
    /// Record visited stages and cache statistics in the output.
    pub debug: bool,
    pub token_weight: f64,
    pub structural_weight: f64,
    /// The structural comparator is only consulted below this many lines.
    pub structural_max_lines: usize,
    pub deadline: Option<Duration>,
}
impl Default for ClassifyOptions {
    fn default() -> Self {
        Self {
            detect_moves: true,
            modes: ModeToggles::default(),
            language: None,
            normalize_delimiters: false,
            use_two_pass: TwoPassMode::default(),
            two_pass_threshold: TWO_PASS_THRESHOLD,
            thresholds: Thresholds::default(),
            limits: ComplexityConfig::default(),
            slider_correction: true,
            debug: false,
            token_weight: TOKEN_WEIGHT,
            structural_weight: STRUCTURAL_WEIGHT,
            structural_max_lines: STRUCTURAL_MAX_LINES,
            deadline: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Init,
    ComplexityCheck,
    FastMode,
    TwoPassDecision,
    SinglePass,
    TwoPass,
    SliderCorrection,
    StatsAggregation,
    Done,
}
impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::ComplexityCheck => "complexity_check",
            Stage::FastMode => "fast_mode",
            Stage::TwoPassDecision => "two_pass_decision",
            Stage::SinglePass => "single_pass",
            Stage::TwoPass => "two_pass",
            Stage::SliderCorrection => "slider_correction",
            Stage::StatsAggregation => "stats_aggregation",
            Stage::Done => "done",
        }
    }
}

#[derive(Debug)]
pub enum ClassifyError {
    /// The line differ failed.
    Differ(Error),
    Cancelled,
}
impl fmt::Display for ClassifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifyError::Differ(err) => write!(f, "{}", err),
            ClassifyError::Cancelled => write!(f, "{}", Cancelled),
        }
    }
}
impl std::error::Error for ClassifyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClassifyError::Differ(err) => Some(err.as_ref()),
            ClassifyError::Cancelled => None,
        }
    }
}
impl From<Cancelled> for ClassifyError {
    fn from(_: Cancelled) -> Self {
        ClassifyError::Cancelled
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub added: usize,
    pub removed: usize,
    /// Modified lines, including lines that moved to another block and
    /// changed.
    pub modified: usize,
    /// Moved lines, counted once per move.
    pub moved: usize,
    pub unchanged: usize,
    pub total_changes: usize,
}
impl Stats {
    pub fn from_entries(entries: &[ClassifiedEntry]) -> Self {
        let mut stats = Stats::default();
        for entry in entries {
            let role = entry.move_info.map(|info| info.role);
            match entry.class {
                LineClass::Unchanged => stats.unchanged += 1,
                LineClass::Added => stats.added += 1,
                LineClass::Removed => stats.removed += 1,
                LineClass::Modified => stats.modified += 1,
                LineClass::Moved => {
                    if role != Some(MoveRole::Source) {
                        stats.moved += 1;
                    }
                }
                LineClass::MovedModified => {
                    if role != Some(MoveRole::Source) {
                        stats.modified += 1;
                    }
                }
            }
        }
        stats.total_changes = stats.added + stats.removed + stats.modified + stats.moved;
        stats
    }
}

#[derive(Debug, Clone)]
pub struct ClassifyOutput {
    pub results: Vec<ClassifiedEntry>,
    pub stats: Stats,
    pub limit_info: ComplexityDecision,
    pub moves: MoveSummary,
    pub sliders: Vec<Slider>,
    pub cache_stats: Option<CacheStats>,
    pub two_pass_info: Option<TwoPassInfo>,
    /// Visited stages, when the `debug` option is set.
    pub stages: Vec<Stage>,
}

struct StageLog {
    record: bool,
    stages: Vec<Stage>,
    started: Instant,
}
impl StageLog {
    fn new(record: bool) -> Self {
        Self {
            record,
            stages: Vec::new(),
            started: Instant::now(),
        }
    }

    fn enter(&mut self, stage: Stage) {
        log::debug!("stage {} at {:?}", stage.as_str(), self.started.elapsed());
        if self.record {
            self.stages.push(stage);
        }
    }
}

fn run_differ(differ: &dyn LineDiffer, old: &[&str], new: &[&str]) -> std::result::Result<Vec<DiffRun>, ClassifyError> {
    try_forward(|| differ.diff_lines(old, new), || "line differ").map_err(ClassifyError::Differ)
}

/// Classify the changes from `old` to `new`.
pub fn classify(
    old: &[&str],
    new: &[&str],
    options: &ClassifyOptions,
    differ: &dyn LineDiffer,
    comparator: Option<&dyn StructuralComparator>,
) -> std::result::Result<ClassifyOutput, ClassifyError> {
    classify_with_cancel(old, new, options, differ, comparator, &CancelToken::new())
}

/// Like [`classify`], stopping with [`ClassifyError::Cancelled`] once `cancel`
/// fires or the deadline in `options` passes.
pub fn classify_with_cancel(
    old: &[&str],
    new: &[&str],
    options: &ClassifyOptions,
    differ: &dyn LineDiffer,
    comparator: Option<&dyn StructuralComparator>,
    cancel: &CancelToken,
) -> std::result::Result<ClassifyOutput, ClassifyError> {
    let cancel = cancel.limited_to(options.deadline.map(|d| Instant::now() + d));
    let mut stages = StageLog::new(options.debug);

    stages.enter(Stage::Init);
    let hasher = ContentHasher::new();

    stages.enter(Stage::ComplexityCheck);
    cancel.check()?;
    let (limit_info, mut runs) = match check_line_count(&options.limits, old.len(), new.len()) {
        Some(decision) => (decision, None),
        None => {
            let runs = run_differ(differ, old, new)?;
            (check_graph_size(&options.limits, old.len(), new.len(), &runs), Some(runs))
        }
    };
    log::debug!(
        "complexity: {} lines, graph {:?}, limit {}, fast mode {}",
        limit_info.line_count,
        limit_info.graph_size,
        limit_info.reason,
        limit_info.fast_mode
    );

    let (classified, sliders, two_pass_info) = if limit_info.fast_mode {
        stages.enter(Stage::FastMode);
        let runs = match runs.take() {
            Some(runs) => runs,
            None => run_differ(differ, old, new)?,
        };
        let classified = Classified {
            entries: fast_classify(&runs, &options.modes),
            moves: MoveSummary::default(),
        };
        (classified, Vec::new(), None)
    } else {
        stages.enter(Stage::TwoPassDecision);
        let max_lines = old.len().max(new.len());
        let structural = match (options.language.as_deref(), comparator) {
            (Some(language), Some(comparator)) if max_lines < options.structural_max_lines => Some(StructuralContext {
                comparator,
                language,
                weight: options.structural_weight,
            }),
            _ => None,
        };
        let ctx = ClassifyContext {
            scorer: SimilarityScorer::new(&hasher, options.thresholds)
                .with_normalize_delimiters(options.normalize_delimiters)
                .with_token_weight(options.token_weight)
                .with_structural(structural),
            detect_moves: options.detect_moves,
            modes: options.modes,
            cancel: &cancel,
        };

        let use_two_pass = match options.use_two_pass {
            TwoPassMode::Never => false,
            TwoPassMode::Always => true,
            TwoPassMode::Auto => max_lines >= options.two_pass_threshold,
        };
        let mut two_pass_info = None;
        let plan = if use_two_pass {
            match two_pass::plan(old, new) {
                Ok(plan) => Some(plan),
                Err(fallback) => {
                    log::debug!("two-pass abandoned: {}", fallback.fallback_reason.unwrap_or_default());
                    two_pass_info = Some(fallback);
                    None
                }
            }
        } else {
            None
        };

        let mut classified = match plan {
            Some(plan) => {
                stages.enter(Stage::TwoPass);
                two_pass_info = Some(plan.info(old.len(), new.len()));
                let mut classified = plan.classify(old, &cancel, |region| {
                    let runs = run_differ(differ, region.old_lines, region.new_lines)?;
                    Ok(classify_runs(&runs, &ctx)?)
                })?;
                match_across_regions(&mut classified, &ctx)?;
                classified
            }
            None => {
                stages.enter(Stage::SinglePass);
                let runs = match runs.take() {
                    Some(runs) => runs,
                    None => run_differ(differ, old, new)?,
                };
                classify_runs(&runs, &ctx)?
            }
        };

        let sliders = if options.slider_correction {
            stages.enter(Stage::SliderCorrection);
            cancel.check()?;
            correct_sliders(&mut classified.entries, &ctx.scorer, options.language.as_deref(), &options.modes)
        } else {
            Vec::new()
        };
        (classified, sliders, two_pass_info)
    };

    stages.enter(Stage::StatsAggregation);
    let stats = Stats::from_entries(&classified.entries);
    let cache_stats = hasher.stats();
    log::debug!(
        "hash cache: {} entries, {} hits, {} misses",
        cache_stats.entries,
        cache_stats.hits,
        cache_stats.misses
    );

    stages.enter(Stage::Done);
    Ok(ClassifyOutput {
        results: classified.entries,
        stats,
        limit_info,
        moves: classified.moves,
        sliders,
        cache_stats: options.debug.then_some(cache_stats),
        two_pass_info,
        stages: stages.stages,
    })
}
