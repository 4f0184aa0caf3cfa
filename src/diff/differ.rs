// SPDX-License-Identifier: MIT

//! Line-level differ producing the add/remove/unchanged run list that the rest
//! of the classification pipeline consumes.
//!
//! The pipeline treats the differ as a black box behind [`LineDiffer`]. The
//! default implementation is [`DiffAlgorithm::GraphSearch`], a shortest-path
//! search over the match graph:
//!
//! The bipartite _match graph_ has nodes representing old line numbers on the
//! left and nodes representing new line numbers on the right. Edges connect
//! equal lines. Choosing a diff means choosing a set of non-crossing edges,
//! which is the same as choosing a path through the _search graph_ whose nodes
//! are match edges, augmented with artificial source and sink nodes, where
//! every step moves strictly forward in both coordinates. The cost of a step is
//! the number of lines it skips, so the cheapest source-sink path maximizes
//! the number of unchanged lines.
//!
//! Explicitly stored line numbers are 1-based inside the search. This keeps
//! the source at (0, 0) and is useful for handling boundary conditions.

use std::collections::{BinaryHeap, HashMap};

use diff_utils::prelude::*;
use similar::{Algorithm, DiffOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunKind {
    Added,
    Removed,
    Unchanged,
}

/// A maximal run of lines sharing one [`RunKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRun {
    pub kind: RunKind,
    pub lines: Vec<String>,
}
impl DiffRun {
    pub fn new(kind: RunKind, lines: Vec<String>) -> Self {
        Self { kind, lines }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// One line of a flattened run list together with its position on each side.
///
/// Line indices are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLine<'a> {
    pub kind: RunKind,
    pub text: &'a str,
    pub old_line: Option<usize>,
    pub new_line: Option<usize>,
}

/// Flatten runs into one entry per line, assigning old and new line indices.
pub fn flatten_runs(runs: &[DiffRun]) -> Vec<RunLine<'_>> {
    let mut old_line = 0;
    let mut new_line = 0;
    let mut out = Vec::with_capacity(runs.iter().map(DiffRun::len).sum());

    for run in runs {
        for text in &run.lines {
            let (old, new) = match run.kind {
                RunKind::Unchanged => (Some(old_line), Some(new_line)),
                RunKind::Removed => (Some(old_line), None),
                RunKind::Added => (None, Some(new_line)),
            };
            if old.is_some() {
                old_line += 1;
            }
            if new.is_some() {
                new_line += 1;
            }
            out.push(RunLine {
                kind: run.kind,
                text,
                old_line: old,
                new_line: new,
            });
        }
    }

    out
}

/// Count removed and added lines of a run list.
pub fn count_changes(runs: &[DiffRun]) -> (usize, usize) {
    runs.iter().fold((0, 0), |(removed, added), run| match run.kind {
        RunKind::Removed => (removed + run.len(), added),
        RunKind::Added => (removed, added + run.len()),
        RunKind::Unchanged => (removed, added),
    })
}

/// The external line differ.
///
/// Failures are fatal for a classification: there is no meaningful fallback
/// without a base diff.
pub trait LineDiffer: Send + Sync {
    fn diff_lines(&self, old: &[&str], new: &[&str]) -> Result<Vec<DiffRun>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffAlgorithm {
    /// Dijkstra search in the search graph, restricting outgoing edges to
    /// those forming a Pareto set.
    ///
    /// This algorithm can be superlinear for various reasons.
    GraphSearch,

    /// Myers' O(ND) algorithm.
    Myers,

    /// Patience diff: unique lines first, Myers in between.
    Patience,
}
impl Default for DiffAlgorithm {
    fn default() -> Self {
        Self::GraphSearch
    }
}
impl DiffAlgorithm {
    /// Compute the matched line pairs (0-based, strictly increasing on both
    /// sides) between `old` and `new`.
    pub fn matches(self, old: &[&str], new: &[&str]) -> Vec<(usize, usize)> {
        // Trimming the common head and tail is always optimal in terms of
        // the number of unchanged lines that are extracted.
        let head = old.iter().zip(new).take_while(|(a, b)| a == b).count();
        let tail = old[head..]
            .iter()
            .rev()
            .zip(new[head..].iter().rev())
            .take_while(|(a, b)| a == b)
            .count();

        let old_mid = &old[head..old.len() - tail];
        let new_mid = &new[head..new.len() - tail];

        let mut matches: Vec<(usize, usize)> = (0..head).map(|i| (i, i)).collect();

        if !old_mid.is_empty() && !new_mid.is_empty() {
            let inner = match self {
                Self::GraphSearch => graph_search_matches(old_mid, new_mid),
                Self::Myers => similar_matches(Algorithm::Myers, old_mid, new_mid),
                Self::Patience => similar_matches(Algorithm::Patience, old_mid, new_mid),
            };
            matches.extend(inner.into_iter().map(|(o, n)| (o + head, n + head)));
        }

        let old_tail = old.len() - tail;
        let new_tail = new.len() - tail;
        matches.extend((0..tail).map(|i| (old_tail + i, new_tail + i)));

        matches
    }

    pub fn run(self, old: &[&str], new: &[&str]) -> Vec<DiffRun> {
        runs_from_matches(old, new, &self.matches(old, new))
    }
}
impl LineDiffer for DiffAlgorithm {
    fn diff_lines(&self, old: &[&str], new: &[&str]) -> Result<Vec<DiffRun>> {
        Ok(self.run(old, new))
    }
}

/// Accumulate lines into runs, merging neighbors of the same kind.
#[derive(Debug, Default)]
struct RunCollector {
    runs: Vec<DiffRun>,
}
impl RunCollector {
    fn push(&mut self, kind: RunKind, lines: &[&str]) {
        if lines.is_empty() {
            return;
        }
        if let Some(last) = self.runs.last_mut().filter(|last| last.kind == kind) {
            last.lines.extend(lines.iter().map(|s| s.to_string()));
            return;
        }
        self.runs.push(DiffRun::new(
            kind,
            lines.iter().map(|s| s.to_string()).collect(),
        ));
    }

    fn finish(self) -> Vec<DiffRun> {
        self.runs
    }
}

/// Turn matched pairs into a run list. Within every gap, removed lines are
/// emitted before added lines.
pub fn runs_from_matches(old: &[&str], new: &[&str], matches: &[(usize, usize)]) -> Vec<DiffRun> {
    let mut collect = RunCollector::default();
    let mut old_pos = 0;
    let mut new_pos = 0;

    for &(o, n) in matches {
        if o < old_pos || n < new_pos || o >= old.len() || n >= new.len() {
            debug_assert!(false, "match ({}, {}) out of order or out of bounds", o, n);
            log::warn!("ignoring inconsistent line match ({}, {})", o, n);
            continue;
        }
        collect.push(RunKind::Removed, &old[old_pos..o]);
        collect.push(RunKind::Added, &new[new_pos..n]);
        collect.push(RunKind::Unchanged, &old[o..o + 1]);
        old_pos = o + 1;
        new_pos = n + 1;
    }
    collect.push(RunKind::Removed, &old[old_pos..]);
    collect.push(RunKind::Added, &new[new_pos..]);

    collect.finish()
}

fn similar_matches(algorithm: Algorithm, old: &[&str], new: &[&str]) -> Vec<(usize, usize)> {
    let mut matches = Vec::new();
    for op in similar::capture_diff_slices(algorithm, old, new) {
        if let DiffOp::Equal {
            old_index,
            new_index,
            len,
        } = op
        {
            matches.extend((0..len).map(|i| (old_index + i, new_index + i)));
        }
    }
    matches
}

fn graph_search_matches(old: &[&str], new: &[&str]) -> Vec<(usize, usize)> {
    /// A node in the graph of the dynamic program, using 1-based indices into
    /// the lines array. Node(0,0) is the initial state of the search.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    struct Node(u32, u32);

    /// Positions (i.e. lines) where line contents can be found.
    ///
    /// We expect the common case to be that most lines are only found once
    /// and a few lines are found many times, so we try to optimize for that.
    #[derive(Debug, Clone, Copy)]
    enum Positions {
        None,
        One([u32; 1]),
        Many(u32),
    }
    impl Positions {
        fn is_empty(&self) -> bool {
            matches!(self, Positions::None)
        }

        fn get<'a>(&'a self, mgr: &'a PositionMgr) -> &'a [u32] {
            match self {
                Positions::None => &[],
                Positions::One(pos) => pos,
                Positions::Many(slot) => &mgr.many[*slot as usize],
            }
        }

        fn push(&mut self, mgr: &mut PositionMgr, next: u32) {
            match *self {
                Positions::None => *self = Positions::One([next]),
                Positions::One([pos]) => {
                    debug_assert!(next > pos);
                    let slot = mgr.many.len() as u32;
                    mgr.many.push(vec![pos, next]);
                    *self = Positions::Many(slot);
                }
                Positions::Many(slot) => mgr.many[slot as usize].push(next),
            }
        }
    }

    #[derive(Default)]
    struct PositionMgr {
        many: Vec<Vec<u32>>,
    }

    // Build the bipartite graph.
    let mut position_mgr = PositionMgr::default();
    let mut old_hash: HashMap<&str, Positions> = HashMap::with_capacity(old.len());
    let mut new_hash: HashMap<&str, Positions> = HashMap::with_capacity(new.len());

    for (idx, line) in old.iter().enumerate() {
        old_hash
            .entry(*line)
            .or_insert(Positions::None)
            .push(&mut position_mgr, idx as u32 + 1);
    }
    for (idx, line) in new.iter().enumerate() {
        new_hash
            .entry(*line)
            .or_insert(Positions::None)
            .push(&mut position_mgr, idx as u32 + 1);
    }

    let old_edges: Vec<Positions> = [Positions::One([0])]
        .into_iter()
        .chain(
            old.iter()
                .map(|line| *new_hash.get(line).unwrap_or(&Positions::None)),
        )
        .chain([Positions::One([new.len() as u32 + 1])])
        .collect();
    let new_edges: Vec<Positions> = [Positions::One([0])]
        .into_iter()
        .chain(
            new.iter()
                .map(|line| *old_hash.get(line).unwrap_or(&Positions::None)),
        )
        .chain([Positions::One([old.len() as u32 + 1])])
        .collect();

    // next[i] is the smallest j > i with a non-empty edge list (the sink for
    // the sink itself).
    let next_nonempty = |edges: &[Positions]| -> Vec<u32> {
        let mut next = vec![0; edges.len()];
        let mut following = edges.len() as u32 - 1;
        for idx in (0..edges.len()).rev() {
            next[idx] = following;
            if !edges[idx].is_empty() {
                following = idx as u32;
            }
        }
        next
    };
    let old_next = next_nonempty(&old_edges);
    let new_next = next_nonempty(&new_edges);

    // Shortest path search
    //
    // The nodes map contains discovered nodes and their best-found cost and
    // corresponding predecessor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Pending(Node, u32);
    impl PartialOrd for Pending {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }
    impl Ord for Pending {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            other.1.cmp(&self.1)
        }
    }

    let sink = Node(old_edges.len() as u32 - 1, new_edges.len() as u32 - 1);
    let mut nodes: HashMap<Node, (u32, Node)> = HashMap::with_capacity(old.len() + new.len());
    let mut queue: BinaryHeap<Pending> = BinaryHeap::with_capacity(old.len() + new.len());

    nodes.insert(Node(0, 0), (0, Node(0, 0)));
    queue.push(Pending(Node(0, 0), 0));

    while let Some(Pending(current, cost)) = queue.pop() {
        if nodes.get(&current).is_some_and(|&(best, _)| best < cost) {
            continue;
        }
        if current == sink {
            break;
        }

        let mut visit_edge = |next: Node| {
            let cost = cost + (next.0 - current.0 - 1) + (next.1 - current.1 - 1);
            let mut proceed = true;
            nodes
                .entry(next)
                .and_modify(|(next_cost, next_prev)| {
                    if cost < *next_cost {
                        *next_cost = cost;
                        *next_prev = current;
                    } else {
                        proceed = false;
                    }
                })
                .or_insert((cost, current));
            if proceed {
                queue.push(Pending(next, cost));
            }
        };

        let mut old_candidate = old_next[current.0 as usize];
        let mut new_candidate = new_next[current.1 as usize];
        let mut old_bound = u32::MAX;
        let mut new_bound = u32::MAX;

        loop {
            // Find and visit the best edge incident to old_candidate, if any.
            let edges = old_edges[old_candidate as usize].get(&position_mgr);
            let idx = edges.partition_point(|pos| *pos <= current.1);
            if idx < edges.len() {
                let new = edges[idx];
                if new < new_bound {
                    visit_edge(Node(old_candidate, new));
                    new_bound = new;
                    if new_bound <= new_candidate {
                        break;
                    }
                }
            }
            if old_candidate as usize == old_edges.len() - 1 {
                break;
            }
            old_candidate = old_next[old_candidate as usize];
            if old_candidate >= old_bound {
                break;
            }

            // Find and visit the best edge incident to new_candidate, if any.
            let edges = new_edges[new_candidate as usize].get(&position_mgr);
            let idx = edges.partition_point(|pos| *pos <= current.0);
            if idx < edges.len() {
                let old = edges[idx];
                if old < old_bound {
                    visit_edge(Node(old, new_candidate));
                    old_bound = old;
                    if old_bound <= old_candidate {
                        break;
                    }
                }
            }
            if new_candidate as usize == new_edges.len() - 1 {
                break;
            }
            new_candidate = new_next[new_candidate as usize];
            if new_candidate >= new_bound {
                break;
            }
        }
    }

    let mut matches = Vec::new();
    let mut current = sink;
    while let Some(&(_, prev)) = nodes.get(&current) {
        if prev.0 == 0 {
            break;
        }
        matches.push((prev.0 as usize - 1, prev.1 as usize - 1));
        current = prev;
    }
    matches.reverse();
    matches
}

#[cfg(test)]
mod test {
    use super::*;

    fn lcs_len(a: &[&str], b: &[&str]) -> usize {
        let mut table = vec![vec![0usize; b.len() + 1]; a.len() + 1];
        for i in (0..a.len()).rev() {
            for j in (0..b.len()).rev() {
                table[i][j] = if a[i] == b[j] {
                    table[i + 1][j + 1] + 1
                } else {
                    table[i + 1][j].max(table[i][j + 1])
                };
            }
        }
        table[0][0]
    }

    fn check_matches(old: &[&str], new: &[&str], matches: &[(usize, usize)]) {
        for w in matches.windows(2) {
            assert!(w[0].0 < w[1].0 && w[0].1 < w[1].1, "{:?}", matches);
        }
        for &(o, n) in matches {
            assert_eq!(old[o], new[n]);
        }
    }

    #[test]
    fn test_graph_search_is_optimal() {
        // Small deterministic pseudo-random inputs over a tiny alphabet.
        let alphabet = ["a", "b", "c", "}", ""];
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        for _ in 0..200 {
            let old_len = (next() % 9) as usize;
            let new_len = (next() % 9) as usize;
            let old: Vec<&str> = (0..old_len).map(|_| alphabet[(next() % 5) as usize]).collect();
            let new: Vec<&str> = (0..new_len).map(|_| alphabet[(next() % 5) as usize]).collect();

            for algorithm in [DiffAlgorithm::GraphSearch, DiffAlgorithm::Myers] {
                let matches = algorithm.matches(&old, &new);
                check_matches(&old, &new, &matches);
                assert_eq!(matches.len(), lcs_len(&old, &new), "{:?} {:?} {:?}", algorithm, old, new);
            }
        }
    }

    #[test]
    fn test_runs_keep_larger_block() {
        let old = ["line 1", "line 2", "function f(){", "  x();", "}", "line 6", "line 7"];
        let new = ["line 1", "line 2", "line 6", "line 7", "function f(){", "  x();", "}"];
        let runs = DiffAlgorithm::default().run(&old, &new);

        let kinds: Vec<(RunKind, usize)> = runs.iter().map(|r| (r.kind, r.len())).collect();
        assert_eq!(
            kinds,
            vec![
                (RunKind::Unchanged, 2),
                (RunKind::Added, 2),
                (RunKind::Unchanged, 3),
                (RunKind::Removed, 2),
            ]
        );
        assert_eq!(count_changes(&runs), (2, 2));
    }

    #[test]
    fn test_flatten_runs() {
        let runs = DiffAlgorithm::default().run(&["a", "b", "c"], &["a", "x", "c", "d"]);
        let flat = flatten_runs(&runs);
        let positions: Vec<_> = flat.iter().map(|l| (l.text, l.old_line, l.new_line)).collect();
        assert_eq!(
            positions,
            vec![
                ("a", Some(0), Some(0)),
                ("b", Some(1), None),
                ("x", None, Some(1)),
                ("c", Some(2), Some(2)),
                ("d", None, Some(3)),
            ]
        );
    }

    #[test]
    fn test_degenerate_sides() {
        let runs = DiffAlgorithm::default().run(&[], &["a", "b"]);
        assert_eq!(runs, vec![DiffRun::new(RunKind::Added, vec!["a".into(), "b".into()])]);

        let runs = DiffAlgorithm::Myers.run(&["a"], &[]);
        assert_eq!(runs, vec![DiffRun::new(RunKind::Removed, vec!["a".into()])]);

        assert!(DiffAlgorithm::default().run(&[], &[]).is_empty());
    }
}
