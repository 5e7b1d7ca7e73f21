//! Counters Model
//!
//! `width` counters, each in `0..=max`. Transition group `g` increments
//! counter `g` modulo `max + 1` and touches nothing else, so its dependency
//! row is `{g}` and every state is reachable.

use treedbs::DependencyMatrix;

/// Synthetic model with a known state count
#[derive(Debug, Clone, Copy)]
pub struct Counters {
    width: usize,
    max: i32,
}

impl Counters {
    pub fn new(width: usize, max: i32) -> Self {
        Self { width, max }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of transition groups
    pub fn groups(&self) -> usize {
        self.width
    }

    pub fn initial(&self) -> Vec<i32> {
        vec![0; self.width]
    }

    /// Write the successor of `state` under `group` into `out`
    pub fn successor(&self, state: &[i32], group: usize, out: &mut Vec<i32>) {
        out.clear();
        out.extend_from_slice(state);
        out[group] = (out[group] + 1) % (self.max + 1);
    }

    pub fn dependencies(&self) -> DependencyMatrix {
        let mut matrix = DependencyMatrix::new(self.width, self.width);
        for g in 0..self.width {
            matrix.set(g, g);
        }
        matrix
    }

    /// `(max + 1)^width`, if it fits
    pub fn expected_states(&self) -> Option<u64> {
        u64::try_from(self.max + 1)
            .ok()?
            .checked_pow(u32::try_from(self.width).ok()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successor_wraps() {
        let model = Counters::new(3, 2);
        let mut out = Vec::new();
        model.successor(&[0, 2, 1], 1, &mut out);
        assert_eq!(out, vec![0, 0, 1]);
        model.successor(&[0, 2, 1], 0, &mut out);
        assert_eq!(out, vec![1, 2, 1]);
    }

    #[test]
    fn test_expected_states() {
        assert_eq!(Counters::new(4, 2).expected_states(), Some(81));
        assert_eq!(Counters::new(64, 3).expected_states(), None);
    }

    #[test]
    fn test_dependencies_are_diagonal() {
        let matrix = Counters::new(3, 1).dependencies();
        assert!(matrix.is_set(2, 2));
        assert!(!matrix.is_set(2, 1));
        assert_eq!(matrix.todo(0), vec![2, 1]);
    }
}
