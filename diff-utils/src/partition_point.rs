// SPDX-License-Identifier: MIT

pub trait PartitionPointExt {
    type Item;

    /// Return the first index of a slice for which `pred` is false (or the length of the slice
    /// if `pred` is true for all elements).
    ///
    /// `pred` must be true for a (possibly empty) prefix of the slice and false for the remainder.
    ///
    /// If `forward` is true, the caller asserts that `pred` holds for the element at `hint_idx`.
    /// If `forward` is false, the caller asserts that `pred` fails for the element at `hint_idx`.
    ///
    /// The search gallops away from the hint before bisecting, which makes successive searches
    /// for nearby points cheap. Patience sorting benefits from this because new cards tend to
    /// land on the most recently touched piles.
    fn partition_point_with_hint<P>(&self, hint_idx: usize, forward: bool, pred: P) -> usize
    where
        P: Fn(&Self::Item) -> bool;
}
impl<T> PartitionPointExt for [T] {
    type Item = T;

    fn partition_point_with_hint<P>(&self, mut hint_idx: usize, forward: bool, pred: P) -> usize
    where
        P: Fn(&Self::Item) -> bool,
    {
        if self.is_empty() {
            return 0;
        }
        hint_idx = hint_idx.min(self.len() - 1);

        // Invariant: left of `begin` is known true, `end` is known false (or the slice length).
        let (mut begin, mut end) = 'pre: {
            if forward {
                let mut step = 1;
                while hint_idx + step < self.len() {
                    if !pred(&self[hint_idx + step]) {
                        break 'pre (hint_idx + 1, hint_idx + step);
                    }

                    hint_idx += step;
                    step *= 2;
                }
                (hint_idx + 1, self.len())
            } else {
                let mut end = hint_idx;
                let mut step = 1;
                while end > 0 {
                    let probe = end.saturating_sub(step);
                    if pred(&self[probe]) {
                        break 'pre (probe + 1, end);
                    }

                    end = probe;
                    step *= 2;
                }
                (0, 0)
            }
        };

        while begin < end {
            let mid = (begin + end) / 2;
            if pred(&self[mid]) {
                begin = mid + 1;
            } else {
                end = mid;
            }
        }

        begin
    }
}
