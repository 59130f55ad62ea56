//! # Delta-Overlay Sparse Matrix
//!
//! Each label and relation matrix is presented as a logical matrix `L`
//! built from three physical matrices: a **main** matrix `M`, a
//! **pending-additions** matrix `P⁺`, and a **pending-deletions** matrix
//! `P⁻` (spec.md §4.1):
//!
//! ```text
//! L[i,j] = (M[i,j] ∨ P⁺[i,j]) ∧ ¬P⁻[i,j]
//! ```
//!
//! Reads always check `P⁺` first: a `set()` that replaces an existing main
//! entry stages the old cell into `P⁻` (masking it for the eventual
//! `flush`) *and* the new value into `P⁺` in the same call, so a
//! replace is visible to readers immediately without waiting for flush.
//! `flush` then folds `P⁺` into `M` before applying `P⁻`, so a replaced
//! cell's new value survives the fold rather than being erased by its own
//! masking entry.
//!
//! No sparse-linear-algebra kernel is linked into this crate (spec.md §1
//! treats it as an out-of-scope black box with no Rust binding available in
//! this corpus); this module is a from-scratch sparse primitive limited to
//! exactly the operations spec.md §4.1 names.

mod iterator;

pub use iterator::MatrixIter;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Errors raised by delta-matrix operations. All other invariant
/// violations are bugs and are asserted fatally rather than returned here
/// (spec.md §7 "Fatal assertions").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatrixError {
    #[error("row range start {requested_min} is out of bounds for a matrix with {nrows} rows")]
    DimensionMismatch { nrows: usize, requested_min: usize },
}

/// Governs whether and when writers implicitly fold pending overlays into
/// the main matrix (spec.md §3 "Matrix-sync policy").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatrixSyncPolicy {
    /// Writers never implicitly flush; the caller flushes explicitly.
    Nop,
    /// Implicit resize on dimension mismatch only, never an implicit flush.
    Resize,
    /// Full flush before any read that requires consistency. The
    /// steady-state default.
    #[default]
    FlushResize,
}

static NEXT_MATRIX_ID: AtomicU64 = AtomicU64::new(1);

/// Sparse delta-overlay matrix over values of type `V`. Square: `nrows ==
/// ncols` for the label/relation/adjacency matrices this crate uses it for.
#[derive(Debug, Clone)]
pub struct DeltaMatrix<V> {
    id: u64,
    main: BTreeMap<usize, BTreeMap<usize, V>>,
    pending_add: BTreeMap<usize, BTreeMap<usize, V>>,
    pending_del: BTreeMap<usize, BTreeSet<usize>>,
    nrows: usize,
    ncols: usize,
}

impl<V: Clone + PartialEq> DeltaMatrix<V> {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        DeltaMatrix {
            id: NEXT_MATRIX_ID.fetch_add(1, Ordering::Relaxed),
            main: BTreeMap::new(),
            pending_add: BTreeMap::new(),
            pending_del: BTreeMap::new(),
            nrows,
            ncols,
        }
    }

    /// Identity used by [`MatrixIter::is_attached`] so operators that cache
    /// an iterator can cheaply check it still targets this matrix.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Enlarge the matrix to at least `(n, m)`. Never shrinks.
    pub fn resize(&mut self, n: usize, m: usize) {
        self.nrows = self.nrows.max(n);
        self.ncols = self.ncols.max(m);
    }

    /// True iff either overlay holds pending entries.
    pub fn pending(&self) -> bool {
        !self.pending_add.is_empty() || !self.pending_del.is_empty()
    }

    fn main_has(&self, row: usize, col: usize) -> bool {
        self.main.get(&row).is_some_and(|r| r.contains_key(&col))
    }

    fn pending_add_get(&self, row: usize, col: usize) -> Option<&V> {
        self.pending_add.get(&row).and_then(|r| r.get(&col))
    }

    fn pending_del_has(&self, row: usize, col: usize) -> bool {
        self.pending_del.get(&row).is_some_and(|r| r.contains(&col))
    }

    /// `set(i,j,v)`: replace-or-insert. If `M[i,j]` is already present, the
    /// old cell is masked into `P⁻` and the new value staged into `P⁺`
    /// (both in this call) so the replacement is visible immediately; see
    /// the module doc for why this does not contradict invariant 2.
    pub fn set(&mut self, row: usize, col: usize, value: V) {
        self.resize(row + 1, col + 1);
        if self.main_has(row, col) {
            self.pending_del.entry(row).or_default().insert(col);
        } else {
            if let Some(cols) = self.pending_del.get_mut(&row) {
                cols.remove(&col);
            }
        }
        self.pending_add.entry(row).or_default().insert(col, value);
    }

    /// `clear(i,j)`: if staged in `P⁺`, un-stage it; else if present in `M`,
    /// mask it via `P⁻`; else no-op.
    pub fn clear(&mut self, row: usize, col: usize) {
        if let Some(cols) = self.pending_add.get_mut(&row) {
            if cols.remove(&col).is_some() {
                if cols.is_empty() {
                    self.pending_add.remove(&row);
                }
                return;
            }
        }
        if self.main_has(row, col) {
            self.pending_del.entry(row).or_default().insert(col);
        }
    }

    /// `get(i,j)`: `P⁺` wins over everything, else `P⁻` masks `M`, else the
    /// main-matrix value, matching `L[i,j] = (M ∨ P⁺) ∧ ¬P⁻` with `P⁺`
    /// given precedence so replace-then-read is immediately consistent.
    pub fn get(&self, row: usize, col: usize) -> Option<&V> {
        if let Some(v) = self.pending_add_get(row, col) {
            return Some(v);
        }
        if self.pending_del_has(row, col) {
            return None;
        }
        self.main.get(&row).and_then(|r| r.get(&col))
    }

    /// Fold `P⁺` into `M`, then erase `M` entries named by `P⁻` that were
    /// not also re-added by `P⁺` (the replace case), then clear both
    /// overlays.
    pub fn flush(&mut self) {
        for (row, cols) in self.pending_add.iter() {
            let dest_row = self.main.entry(*row).or_default();
            for (col, value) in cols.iter() {
                dest_row.insert(*col, value.clone());
            }
        }
        for (row, cols) in self.pending_del.iter() {
            let added_cols = self.pending_add.get(row);
            if let Some(dest_row) = self.main.get_mut(row) {
                for col in cols.iter() {
                    if !added_cols.is_some_and(|c| c.contains_key(col)) {
                        dest_row.remove(col);
                    }
                }
                if dest_row.is_empty() {
                    self.main.remove(row);
                }
            }
        }
        self.pending_add.clear();
        self.pending_del.clear();
    }

    /// Attach an iterator over the full row range.
    pub fn attach(&self) -> MatrixIter<V> {
        self.attach_range(0, self.nrows.saturating_sub(1))
            .unwrap_or_else(|_| MatrixIter::empty(self.id))
    }

    /// Attach an iterator restricted to rows `[rmin, rmax]` (inclusive).
    /// Errors if `rmin` is entirely outside the matrix; if `rmax` (after
    /// clamping to `nrows - 1`) ends up below `rmin`, returns an iterator
    /// that is immediately exhausted rather than an error (spec.md §4.1
    /// boundary behavior).
    pub fn attach_range(&self, rmin: usize, rmax: usize) -> Result<MatrixIter<V>, MatrixError> {
        if self.nrows == 0 || rmin >= self.nrows {
            return Err(MatrixError::DimensionMismatch {
                nrows: self.nrows,
                requested_min: rmin,
            });
        }
        let effective_max = rmax.min(self.nrows - 1);
        if effective_max < rmin {
            return Ok(MatrixIter::empty(self.id));
        }

        let mut entries: Vec<(usize, usize, V)> = Vec::new();
        let rows: BTreeSet<usize> = self
            .main
            .range(rmin..=effective_max)
            .map(|(r, _)| *r)
            .chain(self.pending_add.range(rmin..=effective_max).map(|(r, _)| *r))
            .collect();
        for row in rows {
            let mut cols: BTreeSet<usize> = BTreeSet::new();
            if let Some(r) = self.main.get(&row) {
                cols.extend(r.keys().copied());
            }
            if let Some(r) = self.pending_add.get(&row) {
                cols.extend(r.keys().copied());
            }
            for col in cols {
                if let Some(v) = self.pending_add_get(row, col) {
                    entries.push((row, col, v.clone()));
                } else if self.pending_del_has(row, col) {
                    continue;
                } else if let Some(v) = self.main.get(&row).and_then(|r| r.get(&col)) {
                    entries.push((row, col, v.clone()));
                }
            }
        }
        Ok(MatrixIter::new(self.id, entries))
    }
}
