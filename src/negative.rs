//! Unigram^1/2-weighted negative-sampling reservoir (spec §4.4).

use crate::rng::Rng;

pub const NEGATIVE_TABLE_SIZE: usize = 10_000_000;

pub struct NegativeTable {
    table: Vec<u32>,
}

impl NegativeTable {
    /// Build and shuffle once from per-class counts.
    pub fn build(counts: &[u64], rng: &mut Rng) -> Self {
        debug_assert!(!counts.is_empty());
        let z: f64 = counts.iter().map(|&c| (c as f64).sqrt()).sum();
        let mut table = Vec::with_capacity(NEGATIVE_TABLE_SIZE);
        for (i, &c) in counts.iter().enumerate() {
            let reps = ((c as f64).sqrt() * NEGATIVE_TABLE_SIZE as f64 / z).floor() as usize;
            table.extend(std::iter::repeat(i as u32).take(reps));
        }
        if table.is_empty() {
            // Degenerate case (all counts effectively rounding to zero
            // reps): fall back to a single copy of every class so
            // `getNegative` always has something to draw from.
            table.extend(0..counts.len() as u32);
        }
        rng.shuffle(&mut table);
        Self { table }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Empirical count of how often each class appears in the table.
    /// Test-only helper (spec §8 invariant #3); not on the hot path.
    #[cfg(test)]
    pub fn empirical_histogram(&self, num_classes: usize) -> Vec<usize> {
        let mut hist = vec![0usize; num_classes];
        for &c in &self.table {
            hist[c as usize] += 1;
        }
        hist
    }

    pub fn table(&self) -> &[u32] {
        &self.table
    }
}

/// Per-engine cursor into a shared, read-only `NegativeTable`.
pub struct NegativeCursor {
    pos: usize,
}

impl NegativeCursor {
    pub fn new() -> Self {
        Self { pos: 0 }
    }

    /// Draw the next negative distinct from `target`, advancing the
    /// cursor modulo the table length.
    ///
    /// Scans at most `table.len()` entries: if every entry equals
    /// `target` (the degenerate `osz == 1` case, where the only output
    /// class is also the target), there is no distinct negative to
    /// draw and the last-scanned candidate is returned rather than
    /// spinning forever.
    pub fn next(&mut self, table: &NegativeTable, target: u32) -> u32 {
        debug_assert!(!table.is_empty());
        let mut candidate = target;
        for _ in 0..table.len() {
            candidate = table.table[self.pos];
            self.pos = (self.pos + 1) % table.len();
            if candidate != target {
                return candidate;
            }
        }
        candidate
    }
}

impl Default for NegativeCursor {
    fn default() -> Self {
        Self::new()
    }
}
