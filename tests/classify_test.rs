// SPDX-License-Identifier: MIT

use std::time::Duration;

use classified_diff::diff::*;
use classified_diff::utils::prelude::*;

fn strs(lines: &[String]) -> Vec<&str> {
    lines.iter().map(String::as_str).collect()
}

fn run(old: &[&str], new: &[&str], options: &ClassifyOptions) -> Result<ClassifyOutput> {
    Ok(classify(old, new, options, &DiffAlgorithm::default(), None)?)
}

/// Every old and every new line index appears in exactly one entry.
fn assert_coverage(output: &ClassifyOutput, old: &[&str], new: &[&str]) {
    let mut old_seen = vec![0; old.len()];
    let mut new_seen = vec![0; new.len()];
    for entry in &output.results {
        if let Some(line) = entry.old_line {
            old_seen[line] += 1;
            assert_eq!(entry.old_text(), Some(old[line]));
        }
        if let Some(line) = entry.new_line {
            new_seen[line] += 1;
            assert_eq!(entry.new_text(), Some(new[line]));
        }
    }
    assert!(old_seen.iter().all(|&n| n == 1), "old coverage: {:?}", old_seen);
    assert!(new_seen.iter().all(|&n| n == 1), "new coverage: {:?}", new_seen);
}

fn assert_thresholds(output: &ClassifyOutput, thresholds: &Thresholds) {
    for entry in &output.results {
        match entry.class {
            LineClass::Modified | LineClass::MovedModified => {
                if let Some(similarity) = entry.similarity {
                    assert!(similarity >= thresholds.modified, "{:?}", entry);
                }
            }
            LineClass::Moved => {
                assert!(entry.similarity.unwrap() >= thresholds.moved, "{:?}", entry);
            }
            _ => {}
        }
    }
    for block in &output.moves.block_moves {
        assert!(block.size >= moves::MIN_BLOCK_SIZE);
        assert!(block.similarity >= thresholds.moved);
    }
}

#[test]
fn test_pure_block_move() -> Result<()> {
    let old = ["line 1", "line 2", "function f(){", "  x();", "}", "line 6", "line 7"];
    let new = ["line 1", "line 2", "line 6", "line 7", "function f(){", "  x();", "}"];
    let output = run(&old, &new, &ClassifyOptions::default())?;

    assert_coverage(&output, &old, &new);
    assert_thresholds(&output, &Thresholds::default());

    assert_eq!(output.moves.block_moves.len(), 1);
    let block = output.moves.block_moves[0];
    assert_eq!(block.size, 3);
    assert!((block.similarity - 1.0).abs() < 1e-9);

    let moved: Vec<&str> = output
        .results
        .iter()
        .filter(|e| e.class == LineClass::Moved && e.new_line.is_some())
        .map(|e| e.value.as_str())
        .collect();
    assert!(moved.contains(&"function f(){"));
    assert_eq!(output.stats.added + output.stats.removed + output.stats.modified, 0);
    // Only the function moved; "line 6" and "line 7" are back in place.
    assert!(output.moves.line_moves.is_empty());
    assert_eq!(output.stats.moved, 3);
    assert_eq!(output.stats.unchanged, 4);
    let line_6 = output.results.iter().find(|e| e.value == "line 6").unwrap();
    assert_eq!(line_6.class, LineClass::Unchanged);
    assert_eq!((line_6.old_line, line_6.new_line), (Some(5), Some(2)));

    Ok(())
}

#[test]
fn test_moved_and_modified() -> Result<()> {
    let old: Vec<String> = ["fn compute_total(items: &[Item]) -> u32 {"]
        .iter()
        .map(|s| s.to_string())
        .chain((1..=5).map(|i| format!("let shared_{} = {};", i, i)))
        .chain((1..=4).map(|i| format!("DROP TABLE archive_{};", i)))
        .collect();
    let new: Vec<String> = (1..=5)
        .map(|i| format!("let shared_{} = {};", i, i))
        .chain(["fn compute_total(items: &[Item], tax: f64) -> f64 {".to_string()])
        .chain((1..=4).map(|i| format!("<div class=\"banner\">{}</div>", i)))
        .collect();
    let (old, new) = (strs(&old), strs(&new));
    let thresholds = Thresholds::default();
    let output = run(&old, &new, &ClassifyOptions::default())?;

    assert_coverage(&output, &old, &new);
    assert_thresholds(&output, &thresholds);

    assert!(output.moves.block_moves.is_empty());
    assert_eq!(output.moves.cross_block.len(), 1);
    let modification = output.moves.cross_block[0];
    assert_eq!((modification.old_line, modification.new_line), (0, 5));
    assert!(modification.similarity >= thresholds.modified);
    assert!(modification.similarity < thresholds.moved);

    let halves: Vec<&ClassifiedEntry> = output
        .results
        .iter()
        .filter(|e| e.class == LineClass::MovedModified)
        .collect();
    assert_eq!(halves.len(), 2);
    let destination = halves.iter().find(|e| e.new_line == Some(5)).unwrap();
    let source = &output.results[destination.paired_index.unwrap()];
    assert_eq!(source.old_line, Some(0));
    assert_eq!(output.stats.modified, 1);

    Ok(())
}

#[test]
fn test_small_block_is_not_a_block_move() -> Result<()> {
    let keep: Vec<String> = (0..6).map(|i| format!("keep_line_{}();", i)).collect();
    let old: Vec<String> = ["alpha_one();", "alpha_two();"]
        .iter()
        .map(|s| s.to_string())
        .chain(keep.iter().cloned())
        .chain((1..=4).map(|i| format!("DROP TABLE archive_{};", i)))
        .collect();
    let new: Vec<String> = keep
        .iter()
        .cloned()
        .chain(["alpha_one();".to_string(), "alpha_two();".to_string()])
        .chain((1..=2).map(|i| format!("<div class=\"banner\">{}</div>", i)))
        .collect();
    let (old, new) = (strs(&old), strs(&new));
    let output = run(&old, &new, &ClassifyOptions::default())?;

    assert_coverage(&output, &old, &new);
    assert!(output.moves.block_moves.is_empty());
    assert_eq!(output.moves.line_moves.len(), 2);
    assert_eq!(output.stats.moved, 2);

    Ok(())
}

#[test]
fn test_larger_block_move_wins() -> Result<()> {
    let moved: Vec<String> = (0..5).map(|i| format!("    step_{}(context, {});", i, i * 7)).collect();
    let filler: Vec<String> = (0..8).map(|i| format!("keep_line_{}();", i)).collect();
    let old: Vec<String> = moved.iter().chain(&filler).cloned().collect();
    let new: Vec<String> = filler.iter().chain(&moved).cloned().collect();
    let (old, new) = (strs(&old), strs(&new));
    let output = run(&old, &new, &ClassifyOptions::default())?;

    assert_coverage(&output, &old, &new);
    assert_eq!(output.moves.block_moves.len(), 1);
    let block = output.moves.block_moves[0];
    assert!(!block.is_virtual);
    assert_eq!(block.size, 5);
    // The filler the differ kept is not reported as moved.
    assert_eq!(output.stats.moved, 5);
    assert_eq!(output.stats.unchanged, 8);

    Ok(())
}

#[test]
fn test_identical_inputs() -> Result<()> {
    let text: Vec<String> = (0..40).map(|i| format!("row {} = {};", i, i % 3)).collect();
    let text = strs(&text);
    let output = run(&text, &text, &ClassifyOptions::default())?;

    assert!(output.results.iter().all(|e| e.class == LineClass::Unchanged));
    assert!(output.moves.is_empty());
    assert_eq!(output.stats.unchanged, text.len());
    assert_eq!(output.stats.total_changes, 0);

    Ok(())
}

#[test]
fn test_degenerate_sides() -> Result<()> {
    let lines = ["a", "b", "c"];
    let output = run(&[], &lines, &ClassifyOptions::default())?;
    assert!(output.results.iter().all(|e| e.class == LineClass::Added));
    assert_eq!(output.stats.added, 3);

    let output = run(&lines, &[], &ClassifyOptions::default())?;
    assert!(output.results.iter().all(|e| e.class == LineClass::Removed));
    assert_eq!(output.stats.removed, 3);

    let output = run(&[], &[], &ClassifyOptions::default())?;
    assert!(output.results.is_empty());

    Ok(())
}

#[test]
fn test_modified_lines_with_words() -> Result<()> {
    let old = ["fn area(w: u32, h: u32) -> u32 {", "    w * h", "}"];
    let new = ["fn area(w: u64, h: u64) -> u64 {", "    w * h", "}"];
    let options = ClassifyOptions {
        modes: ModeToggles {
            words: true,
            chars: true,
            ..ModeToggles::default()
        },
        ..ClassifyOptions::default()
    };
    let output = run(&old, &new, &options)?;

    assert_coverage(&output, &old, &new);
    let modified = &output.results[0];
    assert_eq!(modified.class, LineClass::Modified);
    assert!(modified.similarity.unwrap() >= similarity::MODIFIED_THRESHOLD);
    let words = modified.word_diff.as_ref().unwrap();
    assert_eq!(sub_diff::side_text(words, SubDiffTag::Removed), old[0]);
    assert_eq!(sub_diff::side_text(words, SubDiffTag::Added), new[0]);
    assert!(modified.char_diff.is_some());

    Ok(())
}

#[test]
fn test_line_count_guard() -> Result<()> {
    let old: Vec<String> = (0..60_000).map(|i| format!("line {}", i)).collect();
    let mut new = old.clone();
    new[30_000] = "line thirty thousand".to_string();
    let (old, new) = (strs(&old), strs(&new));
    let output = run(&old, &new, &ClassifyOptions::default())?;

    assert!(output.limit_info.exceeded);
    assert_eq!(output.limit_info.reason, LimitReason::LineCount);
    assert_eq!(output.limit_info.reason.as_str(), "line_count");
    assert!(output.limit_info.fast_mode);
    assert!(output.moves.is_empty());
    assert!(output.sliders.is_empty());
    assert_eq!(output.results.len(), 60_001);
    assert_eq!((output.stats.removed, output.stats.added), (1, 1));

    Ok(())
}

#[test]
fn test_graph_size_guard() -> Result<()> {
    let old: Vec<String> = (0..400).map(|i| format!("removed line {}", i)).collect();
    let new: Vec<String> = (0..300).map(|i| format!("added entry {}", i)).collect();
    let (old, new) = (strs(&old), strs(&new));
    let output = run(&old, &new, &ClassifyOptions::default())?;

    assert_eq!(output.limit_info.reason, LimitReason::GraphSize);
    assert_eq!(output.limit_info.graph_size, Some(120_000));
    assert!(output.limit_info.fast_mode);
    assert_coverage(&output, &old, &new);

    Ok(())
}

#[test]
fn test_two_pass_matches_single_pass() -> Result<()> {
    let old: Vec<String> = (0..150).map(|i| format!("let value_{} = compute({});", i, i)).collect();
    let new: Vec<String> = (0..150)
        .map(|i| {
            if i % 10 == 5 {
                format!("let value_{} = compute({}) + 1;", i, i)
            } else {
                format!("let value_{} = compute({});", i, i)
            }
        })
        .collect();
    let (old, new) = (strs(&old), strs(&new));

    let single = run(
        &old,
        &new,
        &ClassifyOptions {
            use_two_pass: TwoPassMode::Never,
            ..ClassifyOptions::default()
        },
    )?;
    let two_pass = run(&old, &new, &ClassifyOptions::default())?;

    assert!(single.two_pass_info.is_none());
    let info = two_pass.two_pass_info.clone().unwrap();
    assert!(info.used);
    assert_eq!(info.regions, 15);

    assert_coverage(&two_pass, &old, &new);
    assert_eq!(single.stats, two_pass.stats);
    assert_eq!(two_pass.stats.modified, 15);
    assert_eq!(single.results, two_pass.results);

    Ok(())
}

#[test]
fn test_two_pass_finds_moves_across_anchors() -> Result<()> {
    let moved: Vec<String> = (0..5).map(|i| format!("    step_{}(context, {});", i, i * 7)).collect();
    let filler: Vec<String> = (0..150).map(|i| format!("filler_line_{}();", i)).collect();
    let old: Vec<String> = moved.iter().chain(&filler).cloned().collect();
    let new: Vec<String> = filler.iter().chain(&moved).cloned().collect();
    let (old, new) = (strs(&old), strs(&new));

    let single = run(
        &old,
        &new,
        &ClassifyOptions {
            use_two_pass: TwoPassMode::Never,
            ..ClassifyOptions::default()
        },
    )?;
    let two_pass = run(&old, &new, &ClassifyOptions::default())?;

    let info = two_pass.two_pass_info.clone().unwrap();
    assert!(info.used);
    assert_eq!(info.regions, 2);

    assert_coverage(&two_pass, &old, &new);
    assert_thresholds(&two_pass, &Thresholds::default());
    assert_eq!(two_pass.moves.block_moves.len(), 1);
    let block = two_pass.moves.block_moves[0];
    assert_eq!((block.old_start, block.new_start, block.size), (0, 150, 5));
    assert!(!block.is_virtual);

    assert_eq!(two_pass.stats.moved, 5);
    assert_eq!(two_pass.stats.unchanged, 150);
    assert_eq!(two_pass.stats.added + two_pass.stats.removed, 0);
    assert_eq!(single.stats, two_pass.stats);
    assert_eq!(single.moves, two_pass.moves);
    assert_eq!(single.results, two_pass.results);

    Ok(())
}

#[test]
fn test_two_pass_fallback() -> Result<()> {
    let old: Vec<String> = (0..120).map(|i| format!("old {}", i % 2)).collect();
    let new: Vec<String> = (0..120).map(|i| format!("new {}", i % 2)).collect();
    let (old, new) = (strs(&old), strs(&new));
    let options = ClassifyOptions {
        use_two_pass: TwoPassMode::Always,
        ..ClassifyOptions::default()
    };
    let output = run(&old, &new, &options)?;

    let info = output.two_pass_info.unwrap();
    assert!(!info.used);
    assert_eq!(info.fallback_reason, Some("no anchors"));

    Ok(())
}

#[test]
fn test_deterministic() -> Result<()> {
    let old: Vec<String> = (0..30).map(|i| format!("item({}, \"{}\");", i % 4, i)).collect();
    let new: Vec<String> = (0..30).map(|i| format!("item({}, \"{}\");", i % 4, 29 - i)).collect();
    let (old, new) = (strs(&old), strs(&new));

    let first = run(&old, &new, &ClassifyOptions::default())?;
    let second = run(&old, &new, &ClassifyOptions::default())?;
    assert_eq!(first.results, second.results);
    assert_eq!(first.moves, second.moves);
    assert_coverage(&first, &old, &new);
    assert_thresholds(&first, &Thresholds::default());

    Ok(())
}

#[test]
fn test_failing_comparator_is_ignored() -> Result<()> {
    struct Broken;
    impl StructuralComparator for Broken {
        fn compare(&self, _a: &str, _b: &str, _language: &str) -> Result<Option<f64>> {
            Err("no parser for this language".into())
        }
    }

    let old = ["let total = price * count;", "return total;"];
    let new = ["let total = price * count * tax;", "return total;"];
    let options = ClassifyOptions {
        language: Some("rust".to_string()),
        ..ClassifyOptions::default()
    };
    let with_broken = classify(&old, &new, &options, &DiffAlgorithm::default(), Some(&Broken))?;
    let without = classify(&old, &new, &options, &DiffAlgorithm::default(), None)?;
    assert_eq!(with_broken.results, without.results);

    let with_shape = classify(&old, &new, &options, &DiffAlgorithm::default(), Some(&TokenShapeComparator))?;
    assert_eq!(with_shape.results[0].class, LineClass::Modified);

    Ok(())
}

#[test]
fn test_differ_failure_propagates() {
    struct Unavailable;
    impl LineDiffer for Unavailable {
        fn diff_lines(&self, _old: &[&str], _new: &[&str]) -> Result<Vec<DiffRun>> {
            Err("differ unavailable".into())
        }
    }

    let err = classify(&["a"], &["b"], &ClassifyOptions::default(), &Unavailable, None).unwrap_err();
    assert!(matches!(err, ClassifyError::Differ(_)));
    assert!(err.to_string().ends_with("differ unavailable"));
}

#[test]
fn test_deadline() {
    let options = ClassifyOptions {
        deadline: Some(Duration::ZERO),
        ..ClassifyOptions::default()
    };
    let err = classify(&["a"], &["b"], &options, &DiffAlgorithm::default(), None).unwrap_err();
    assert!(matches!(err, ClassifyError::Cancelled));
}
