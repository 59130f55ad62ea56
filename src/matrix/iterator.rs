//! Row-major iterator over a delta-matrix's logical union, snapshotted at
//! attach time (spec.md §4.1).

/// Iterates `(row, col, value)` triples in row-major, ascending-column
/// order over the union `M ∪ P⁺` minus `P⁻`, as materialized by
/// [`super::DeltaMatrix::attach`]/`attach_range` at attach time.
#[derive(Debug, Clone)]
pub struct MatrixIter<V> {
    matrix_id: u64,
    entries: Vec<(usize, usize, V)>,
    cursor: usize,
}

impl<V> MatrixIter<V> {
    pub(super) fn new(matrix_id: u64, entries: Vec<(usize, usize, V)>) -> Self {
        MatrixIter { matrix_id, entries, cursor: 0 }
    }

    pub(super) fn empty(matrix_id: u64) -> Self {
        MatrixIter { matrix_id, entries: Vec::new(), cursor: 0 }
    }

    /// Identity test: does this iterator target the given matrix? Lets
    /// operators that cache an iterator across `consume` calls cheaply
    /// check whether it still belongs to the matrix they hold.
    pub fn is_attached(&self, matrix: &super::DeltaMatrix<impl Clone + PartialEq>) -> bool {
        self.matrix_id == matrix.id()
    }

    /// Advance the cursor to the first entry whose row is `>= row`.
    pub fn jump_to_row(&mut self, row: usize) {
        self.cursor = self.entries.partition_point(|(r, _, _)| *r < row);
    }

    /// Rewind to the start without re-snapshotting the matrix.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Release the snapshot; subsequent `next()` calls return `None`.
    pub fn detach(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.entries.len()
    }
}

impl<V: Clone> Iterator for MatrixIter<V> {
    type Item = (usize, usize, V);

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.entries.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::super::DeltaMatrix;

    #[test]
    fn jump_to_row_skips_earlier_rows() {
        let mut m: DeltaMatrix<u64> = DeltaMatrix::new(10, 10);
        m.set(1, 0, 1);
        m.set(5, 0, 2);
        m.set(9, 0, 3);
        let mut it = m.attach();
        it.jump_to_row(5);
        let got: Vec<_> = it.map(|(r, _, _)| r).collect();
        assert_eq!(got, vec![5, 9]);
    }

    #[test]
    fn detach_exhausts_immediately() {
        let mut m: DeltaMatrix<u64> = DeltaMatrix::new(4, 4);
        m.set(0, 0, 1);
        let mut it = m.attach();
        it.detach();
        assert!(it.is_exhausted());
        assert_eq!(it.next(), None);
    }

    #[test]
    fn reset_replays_from_the_start() {
        let mut m: DeltaMatrix<u64> = DeltaMatrix::new(4, 4);
        m.set(0, 0, 1);
        m.set(1, 0, 2);
        let mut it = m.attach();
        let first_pass: Vec<_> = it.by_ref().collect();
        it.reset();
        let second_pass: Vec<_> = it.collect();
        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn is_attached_identifies_source_matrix() {
        let m1: DeltaMatrix<u64> = DeltaMatrix::new(4, 4);
        let m2: DeltaMatrix<u64> = DeltaMatrix::new(4, 4);
        let it = m1.attach();
        assert!(it.is_attached(&m1));
        assert!(!it.is_attached(&m2));
    }
}
