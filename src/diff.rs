// SPDX-License-Identifier: MIT

//! Line classification for text diffs.
//!
//! The entry point is [`classify`], which runs a line differ over two texts
//! and turns its added and removed runs into modified, moved and
//! moved-modified lines.

pub mod blocks;
pub mod cancel;
pub mod classify;
pub mod complexity;
pub mod differ;
pub mod hasher;
pub mod moves;
pub mod pairing;
pub mod patience;
pub mod pipeline;
pub mod similarity;
pub mod slider;
pub mod structural;
pub mod sub_diff;
pub mod tokens;
pub mod two_pass;

pub use cancel::{CancelToken, Cancelled};
pub use classify::{ClassifiedEntry, LineClass, MoveInfo, MoveRole};
pub use complexity::{ComplexityConfig, ComplexityDecision, LimitReason};
pub use differ::{DiffAlgorithm, DiffRun, LineDiffer, RunKind};
pub use hasher::{CacheStats, ContentHasher};
pub use moves::{BlockMove, CrossBlockModification, LineMove, MoveKind, MoveSummary};
pub use pipeline::{
    classify, classify_with_cancel, ClassifyError, ClassifyOptions, ClassifyOutput, ModeToggles, Stage, Stats,
    TwoPassMode,
};
pub use similarity::{SimilarityScorer, Thresholds};
pub use slider::{Recommendation, Slider};
pub use structural::{StructuralComparator, TokenShapeComparator};
pub use sub_diff::{SubDiffPart, SubDiffTag};
pub use two_pass::TwoPassInfo;
