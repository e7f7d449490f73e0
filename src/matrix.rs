//! Dense, row-major matrix of `f32`.
//!
//! `Matrix` is the type shared by every worker engine for `wi_`, `wo_`,
//! and `attn_`: many engines hold the same `Arc<Matrix>` and race to
//! mutate individual rows during training (spec §5, Hogwild-style SGD).
//! Rust's aliasing rules forbid an ordinary `&mut [f32]` under shared
//! ownership, so rows are backed by `UnsafeCell<f32>` and mutated through
//! raw pointers. This is a deliberate, narrow opt-out of the aliasing
//! model — not a general escape hatch — confined to the handful of
//! methods below. Tearing under concurrent writes is accepted by design;
//! see DESIGN.md.

use std::cell::UnsafeCell;
use std::io::{self, Read, Write};

use crate::vector::Vector;

pub struct Matrix {
    data: Box<[UnsafeCell<f32>]>,
    rows: usize,
    cols: usize,
}

// SAFETY: concurrent unsynchronized reads/writes to the same `f32` cell
// are the engine's explicit Hogwild contract (spec §5, §9). Every entry
// point that takes `&self` touches at most one row at a time via raw
// pointer arithmetic bounded by `rows`/`cols`.
unsafe impl Sync for Matrix {}
unsafe impl Send for Matrix {}

impl Matrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        data.resize_with(rows * cols, || UnsafeCell::new(0.0));
        Self {
            data: data.into_boxed_slice(),
            rows,
            cols,
        }
    }

    pub fn from_vec(rows: usize, cols: usize, values: Vec<f32>) -> Self {
        debug_assert_eq!(values.len(), rows * cols);
        let data: Vec<UnsafeCell<f32>> = values.into_iter().map(UnsafeCell::new).collect();
        Self {
            data: data.into_boxed_slice(),
            rows,
            cols,
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    fn index(&self, r: usize, c: usize) -> usize {
        debug_assert!(r < self.rows);
        debug_assert!(c < self.cols);
        r * self.cols + c
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> f32 {
        let i = self.index(r, c);
        // SAFETY: i < rows*cols == data.len(); see module-level note on races.
        unsafe { *self.data[i].get() }
    }

    #[inline]
    pub fn set(&self, r: usize, c: usize, v: f32) {
        let i = self.index(r, c);
        // SAFETY: i < rows*cols == data.len(); see module-level note on races.
        unsafe {
            *self.data[i].get() = v;
        }
    }

    /// `⟨row r, v⟩`.
    pub fn dot_row(&self, v: &Vector, r: usize) -> f32 {
        debug_assert_eq!(v.len(), self.cols);
        debug_assert!(r < self.rows);
        let base = r * self.cols;
        let mut acc = 0.0f32;
        for c in 0..self.cols {
            // SAFETY: base + c < rows*cols; see module-level note on races.
            let cell = unsafe { *self.data[base + c].get() };
            acc += cell * v.get(c);
        }
        acc
    }

    /// `row r += a * v`. The racy, unsynchronized write this engine's
    /// SGD update relies on.
    pub fn add_row(&self, v: &Vector, r: usize, a: f32) {
        debug_assert_eq!(v.len(), self.cols);
        debug_assert!(r < self.rows);
        let base = r * self.cols;
        for c in 0..self.cols {
            // SAFETY: base + c < rows*cols; see module-level note on races.
            unsafe {
                let cell = self.data[base + c].get();
                *cell += a * v.get(c);
            }
        }
    }

    /// `out += a * row r`, without allocating (unlike `row()`). The
    /// hot-path counterpart of `add_row`, accumulating into a caller's
    /// vector instead of mutating a matrix row in place.
    pub fn add_scaled_row_into(&self, out: &mut Vector, r: usize, a: f32) {
        debug_assert_eq!(out.len(), self.cols);
        debug_assert!(r < self.rows);
        let base = r * self.cols;
        for c in 0..self.cols {
            // SAFETY: base + c < rows*cols; see module-level note on races.
            let cell = unsafe { *self.data[base + c].get() };
            out.set(c, out.get(c) + a * cell);
        }
    }

    /// `out = self · u` (matrix-vector product), `dim(out) == rows`,
    /// `dim(u) == cols`.
    pub fn mul_vec_into(&self, u: &Vector, out: &mut Vector) {
        debug_assert_eq!(u.len(), self.cols);
        debug_assert_eq!(out.len(), self.rows);
        for r in 0..self.rows {
            out.set(r, self.dot_row(u, r));
        }
    }

    /// Copy of row `r` as an owned `Vector`, for callers outside the hot
    /// path (prediction, serialization).
    pub fn row(&self, r: usize) -> Vector {
        debug_assert!(r < self.rows);
        let base = r * self.cols;
        let mut out = Vec::with_capacity(self.cols);
        for c in 0..self.cols {
            // SAFETY: base + c < rows*cols; see module-level note on races.
            out.push(unsafe { *self.data[base + c].get() });
        }
        Vector::from_vec(out)
    }

    pub fn save<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&(self.rows as u64).to_ne_bytes())?;
        w.write_all(&(self.cols as u64).to_ne_bytes())?;
        for cell in self.data.iter() {
            // SAFETY: exclusive access via &self during serialization is
            // the caller's responsibility (no concurrent writers).
            let v = unsafe { *cell.get() };
            w.write_all(&v.to_ne_bytes())?;
        }
        Ok(())
    }

    pub fn load<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf8 = [0u8; 8];
        r.read_exact(&mut buf8)?;
        let rows = u64::from_ne_bytes(buf8) as usize;
        r.read_exact(&mut buf8)?;
        let cols = u64::from_ne_bytes(buf8) as usize;
        let mut values = Vec::with_capacity(rows * cols);
        let mut buf4 = [0u8; 4];
        for _ in 0..rows * cols {
            r.read_exact(&mut buf4)?;
            values.push(f32::from_ne_bytes(buf4));
        }
        Ok(Self::from_vec(rows, cols, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_roundtrip() {
        let m = Matrix::new(2, 3);
        m.set(1, 2, 4.5);
        assert_eq!(m.get(1, 2), 4.5);
        assert_eq!(m.get(0, 0), 0.0);
    }

    #[test]
    fn dot_row_matches_manual() {
        let m = Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let v = Vector::from_vec(vec![1.0, 1.0, 1.0]);
        assert_eq!(m.dot_row(&v, 0), 6.0);
        assert_eq!(m.dot_row(&v, 1), 15.0);
    }

    #[test]
    fn add_row_scales_and_accumulates() {
        let m = Matrix::from_vec(1, 2, vec![1.0, 1.0]);
        let v = Vector::from_vec(vec![2.0, 4.0]);
        m.add_row(&v, 0, 0.5);
        assert_eq!(m.row(0).as_slice(), &[2.0, 3.0]);
    }

    #[test]
    fn add_scaled_row_into_matches_row_then_add_scaled() {
        let m = Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut out = Vector::new(3);
        m.add_scaled_row_into(&mut out, 1, 0.5);
        assert_eq!(out.as_slice(), &[2.0, 2.5, 3.0]);
    }

    #[test]
    fn mul_vec_into_matches_dot_row() {
        let m = Matrix::from_vec(2, 2, vec![1.0, 0.0, 0.0, 1.0]);
        let u = Vector::from_vec(vec![3.0, 4.0]);
        let mut out = Vector::new(2);
        m.mul_vec_into(&u, &mut out);
        assert_eq!(out.as_slice(), &[3.0, 4.0]);
    }

    #[test]
    fn concurrent_add_row_is_lock_free_and_completes() {
        use std::sync::Arc;
        let m = Arc::new(Matrix::new(1, 4));
        std::thread::scope(|s| {
            for _ in 0..8 {
                let m = Arc::clone(&m);
                s.spawn(move || {
                    let v = Vector::from_vec(vec![1.0; 4]);
                    for _ in 0..1000 {
                        m.add_row(&v, 0, 1.0);
                    }
                });
            }
        });
        // No assertion on the exact sum (races may drop updates by
        // design); only that it ran to completion without UB-triggered
        // corruption of the vector length/shape.
        assert_eq!(m.row(0).len(), 4);
    }

    #[test]
    fn save_load_roundtrip() {
        let m = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let mut buf = Vec::new();
        m.save(&mut buf).unwrap();
        let restored = Matrix::load(&mut &buf[..]).unwrap();
        assert_eq!(restored.rows(), 2);
        assert_eq!(restored.cols(), 2);
        for r in 0..2 {
            for c in 0..2 {
                assert_eq!(m.get(r, c), restored.get(r, c));
            }
        }
    }
}
