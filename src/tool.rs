// SPDX-License-Identifier: MIT

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::diff::{self, ClassifyOptions, ComplexityConfig, ModeToggles, StructuralComparator, Thresholds};
use crate::diff_color::Writer;
use crate::utils::files;
use crate::utils::prelude::*;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffAlgorithm {
    GraphSearch,
    Myers,
    Patience,
}
impl Default for DiffAlgorithm {
    fn default() -> Self {
        Self::GraphSearch
    }
}
impl From<DiffAlgorithm> for diff::DiffAlgorithm {
    fn from(algorithm: DiffAlgorithm) -> Self {
        match algorithm {
            DiffAlgorithm::GraphSearch => Self::GraphSearch,
            DiffAlgorithm::Myers => Self::Myers,
            DiffAlgorithm::Patience => Self::Patience,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoPass {
    Auto,
    Always,
    Never,
}
impl Default for TwoPass {
    fn default() -> Self {
        Self::Auto
    }
}
impl From<TwoPass> for diff::TwoPassMode {
    fn from(mode: TwoPass) -> Self {
        match mode {
            TwoPass::Auto => Self::Auto,
            TwoPass::Always => Self::Always,
            TwoPass::Never => Self::Never,
        }
    }
}

#[derive(Parser, Debug)]
pub struct ClassifiedDiffOptions {
    /// Language of the inputs, enables structural comparison and language specific slider heuristics.
    #[clap(long)]
    pub language: Option<String>,

    /// Do not look for moved lines.
    #[clap(long)]
    pub no_moves: bool,

    /// Show word-level changes of modified lines.
    #[clap(long)]
    pub words: bool,

    /// Show character-level changes of modified lines.
    #[clap(long)]
    pub chars: bool,

    /// Only show the new side of modified lines.
    #[clap(long)]
    pub no_lines: bool,

    /// Ignore whitespace around brackets, braces, commas and semicolons when comparing lines.
    #[clap(long)]
    pub normalize_delimiters: bool,

    #[clap(value_enum, long, default_value_t = Default::default())]
    pub two_pass: TwoPass,

    /// Line count from which --two-pass=auto partitions the inputs.
    #[clap(long, default_value_t = diff::pipeline::TWO_PASS_THRESHOLD)]
    pub two_pass_threshold: usize,

    /// Do not shift ambiguous modified lines.
    #[clap(long)]
    pub no_slider: bool,

    /// Run the full classification even when the inputs exceed the complexity limits.
    #[clap(long)]
    pub no_fast_mode: bool,

    #[clap(long, default_value_t = diff::complexity::MAX_LINES)]
    pub max_lines: usize,

    /// Limit on removed times added lines.
    #[clap(long, default_value_t = diff::complexity::MAX_GRAPH_VERTICES)]
    pub max_graph: usize,

    #[clap(long, default_value_t = diff::similarity::FAST_THRESHOLD)]
    pub fast_threshold: f64,

    #[clap(long, default_value_t = diff::similarity::MODIFIED_THRESHOLD)]
    pub modified_threshold: f64,

    #[clap(long, default_value_t = diff::similarity::MOVE_THRESHOLD)]
    pub move_threshold: f64,

    #[clap(value_enum, short, long, default_value_t = Default::default())]
    pub algorithm: DiffAlgorithm,

    /// Give up after this many milliseconds.
    #[clap(long)]
    pub timeout_ms: Option<u64>,

    /// Print a summary after the diff.
    #[clap(long)]
    pub stats: bool,
}
impl ClassifiedDiffOptions {
    pub fn modes(&self) -> ModeToggles {
        ModeToggles {
            lines: !self.no_lines,
            words: self.words,
            chars: self.chars,
        }
    }

    pub fn classify_options(&self) -> ClassifyOptions {
        ClassifyOptions {
            detect_moves: !self.no_moves,
            modes: self.modes(),
            language: self.language.clone(),
            normalize_delimiters: self.normalize_delimiters,
            use_two_pass: self.two_pass.into(),
            two_pass_threshold: self.two_pass_threshold,
            thresholds: Thresholds {
                fast: self.fast_threshold,
                modified: self.modified_threshold,
                moved: self.move_threshold,
            },
            limits: ComplexityConfig {
                max_lines: self.max_lines,
                max_graph_vertices: self.max_graph,
                enable_fast_mode: !self.no_fast_mode,
            },
            slider_correction: !self.no_slider,
            deadline: self.timeout_ms.map(Duration::from_millis),
            ..ClassifyOptions::default()
        }
    }
}

#[derive(Parser, Debug)]
pub struct ClassifiedDiffArgs {
    pub old: PathBuf,
    pub new: PathBuf,

    #[clap(flatten)]
    pub options: ClassifiedDiffOptions,
}

fn check_threshold(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("{} must be between 0 and 1, got {}", name, value).into());
    }
    Ok(())
}

pub fn classified_diff(args: &ClassifiedDiffArgs, writer: &mut Writer) -> Result<()> {
    let opts = &args.options;
    check_threshold("--fast-threshold", opts.fast_threshold)?;
    check_threshold("--modified-threshold", opts.modified_threshold)?;
    check_threshold("--move-threshold", opts.move_threshold)?;

    let old = files::read_lines(&args.old)?;
    let new = files::read_lines(&args.new)?;
    let old: Vec<&str> = old.iter().map(String::as_str).collect();
    let new: Vec<&str> = new.iter().map(String::as_str).collect();

    let options = opts.classify_options();
    let differ: diff::DiffAlgorithm = opts.algorithm.into();
    let shape = diff::TokenShapeComparator;
    let comparator = options
        .language
        .as_deref()
        .filter(|language| diff::TokenShapeComparator::supports(language))
        .map(|_| &shape as &dyn StructuralComparator);

    let output = diff::classify(&old, &new, &options, &differ, comparator)?;

    writer.push_output(&output);
    if opts.stats {
        writer.push_footer(&output);
    }

    Ok(())
}
