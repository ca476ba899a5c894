//! Small collection helpers shared by the design and block modules.

/// Split `items` into at most `parts` contiguous chunks whose sizes differ by at most one.
///
/// Larger chunks come first. Empty chunks are never produced, so asking for more
/// parts than there are items yields one chunk per item. `parts == 0` yields nothing.
pub fn split_evenly<T>(items: Vec<T>, parts: usize) -> Vec<Vec<T>> {
    if parts == 0 || items.is_empty() {
        return Vec::new();
    }
    let parts = parts.min(items.len());
    let base = items.len() / parts;
    let remainder = items.len() % parts;

    let mut chunks = Vec::with_capacity(parts);
    let mut iter = items.into_iter();
    for idx in 0..parts {
        let size = base + usize::from(idx < remainder);
        chunks.push(iter.by_ref().take(size).collect());
    }
    chunks
}

/// Lexicographic iterator over all `k`-element index combinations of `0..n`.
#[derive(Clone, Debug)]
pub struct Combinations {
    n: usize,
    indices: Vec<usize>,
    started: bool,
    done: bool,
}

impl Combinations {
    /// Combinations of `k` indices drawn from `0..n`. Yields nothing when `k > n`.
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            indices: (0..k).collect(),
            started: false,
            done: k > n,
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(self.indices.clone());
        }
        let k = self.indices.len();
        // Rightmost position that can still advance.
        let Some(pos) = (0..k).rev().find(|&i| self.indices[i] < self.n - k + i) else {
            self.done = true;
            return None;
        };
        self.indices[pos] += 1;
        for i in pos + 1..k {
            self.indices[i] = self.indices[i - 1] + 1;
        }
        Some(self.indices.clone())
    }
}
