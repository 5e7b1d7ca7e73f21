//! Dependency Projection
//!
//! A transition group touches a few vector slots. Projecting its row onto the
//! tree gives the internal nodes whose subtree contains one of those slots;
//! no other node can change when only that group fires.
//!
//! ```text
//! row g:        [0 1 0 0]          (n = 4, leaves at 4..8)
//! leaves:        4 5 6 7
//! marked:        . x . .
//! node 2 = 4|5   x
//! node 3 = 6|7   .
//! node 1 = 2|3   x
//! todo(g):      [2, 1]             (descending)
//! ```

use crate::error::{StoreError, StoreResult};

/// Boolean matrix `groups x slots`: which slots a group may change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyMatrix {
    groups: usize,
    slots: usize,
    cells: Vec<bool>,
}

impl DependencyMatrix {
    /// Empty matrix
    pub fn new(groups: usize, slots: usize) -> Self {
        Self {
            groups,
            slots,
            cells: vec![false; groups * slots],
        }
    }

    /// Build from rows of equal length
    ///
    /// # Errors
    /// - `MatrixShape`: a row differs in length from the first one
    pub fn from_rows(rows: &[Vec<bool>]) -> StoreResult<Self> {
        let slots = rows.first().map_or(0, Vec::len);
        let mut matrix = Self::new(rows.len(), slots);
        for (group, row) in rows.iter().enumerate() {
            if row.len() != slots {
                return Err(StoreError::MatrixShape {
                    expected: slots,
                    actual: row.len(),
                });
            }
            for (slot, &set) in row.iter().enumerate() {
                if set {
                    matrix.set(group, slot);
                }
            }
        }
        Ok(matrix)
    }

    /// Number of rows
    #[inline]
    pub fn groups(&self) -> usize {
        self.groups
    }

    /// Number of columns
    #[inline]
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Mark `slot` as touched by `group`
    ///
    /// # Panics
    /// If `group` or `slot` is out of range.
    pub fn set(&mut self, group: usize, slot: usize) {
        assert!(group < self.groups && slot < self.slots, "matrix index out of range");
        self.cells[group * self.slots + slot] = true;
    }

    /// Does `group` touch `slot`; `false` outside the matrix
    #[inline]
    pub fn is_set(&self, group: usize, slot: usize) -> bool {
        group < self.groups && slot < self.slots && self.cells[group * self.slots + slot]
    }

    /// Internal tree positions affected by `group`, in descending order
    pub fn todo(&self, group: usize) -> Vec<usize> {
        let n = self.slots;
        let mut marked = vec![false; 2 * n];
        for slot in 0..n {
            marked[n + slot] = self.is_set(group, slot);
        }
        let mut todo = Vec::new();
        for i in (1..n).rev() {
            marked[i] = marked[2 * i] || marked[2 * i + 1];
            if marked[i] {
                todo.push(i);
            }
        }
        todo
    }

    /// Todo lists of every group
    pub(crate) fn project(&self) -> Vec<Box<[usize]>> {
        (0..self.groups)
            .map(|g| self.todo(g).into_boxed_slice())
            .collect()
    }
}
