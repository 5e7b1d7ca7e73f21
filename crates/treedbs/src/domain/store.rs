//! Tree Compression Store
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         TreeDbs                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  fold(v) ──► leaves ──► nodes n-1 .. 2 ──► node 1 (root)    │
//! │                            │                   │            │
//! │                            ▼                   ▼            │
//! │                    data: NodeTable       roots: Roots       │
//! │                    (shared, slots)       (references)       │
//! │                                                             │
//! │  unfold(r) ◄── roots.key_of(r) ◄── data.get(slot) ...       │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Equal subtrees of different vectors share one data table slot, so a vector
//! of `n` slots costs at most `n - 2` data entries and usually far fewer.
//!
//! # Fold Variants
//!
//! - `fold`: every internal node is looked up
//! - `fold_incremental`: nodes whose child pair equals the previous tree's
//!   are copied instead of looked up
//! - `fold_projected`: only nodes above the slots a transition group touches
//!   are considered at all
//!
//! The `find*` twins run the same walk with insertion disabled and stop at the
//! first miss.

use tracing::{debug, error};

use super::config::StoreConfig;
use super::node_table::NodeTable;
use super::projection::DependencyMatrix;
use super::roots::{RootBackend, RootEntries, Roots};
use super::scratch::{ProbeStats, ScratchSet, Stats};
use super::types::{Folded, Lookup, Tree, TreeRef};
use crate::error::{StoreError, StoreResult, TableKind};

/// Counters of the calling thread, borrowed from its scratch entry
struct Counters<'a> {
    probes: &'a mut ProbeStats,
    nodes: &'a mut [u64],
}

/// Lock-free store folding fixed-length `i32` vectors into references
pub struct TreeDbs {
    config: StoreConfig,
    n: usize,
    data: NodeTable,
    roots: Roots,
    todo: Option<Box<[Box<[usize]>]>>,
    scratch: ScratchSet,
}

impl TreeDbs {
    /// Create a store with the tables described by `config`
    ///
    /// # Errors
    /// Any error of [`StoreConfig::validate`].
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let store = Self {
            n: config.vector_len,
            data: NodeTable::new(config.data_log(), TableKind::Data),
            roots: Roots::new(&config),
            todo: None,
            scratch: ScratchSet::new(config.vector_len),
            config,
        };
        debug!(
            vector_len = store.n,
            root_log = store.config.root_log(),
            data_log = store.config.data_log(),
            satellite_bits = store.config.satellite_bits,
            slim = store.config.slim,
            "created tree store"
        );
        Ok(store)
    }

    /// Create a store that can also fold projected on `matrix`'s groups
    ///
    /// # Errors
    /// - `MatrixShape`: the matrix does not have one column per slot
    /// - any error of [`StoreConfig::validate`]
    pub fn with_matrix(config: StoreConfig, matrix: &DependencyMatrix) -> StoreResult<Self> {
        let mut store = Self::new(config)?;
        if matrix.slots() != store.n {
            return Err(StoreError::MatrixShape {
                expected: store.n,
                actual: matrix.slots(),
            });
        }
        store.todo = Some(matrix.project().into_boxed_slice());
        debug!(groups = matrix.groups(), "projected dependency matrix");
        Ok(store)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Geometry
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Slots per vector
    #[inline]
    pub fn vector_len(&self) -> usize {
        self.n
    }

    /// Configuration the store was created with
    #[inline]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Number of resident vectors
    #[inline]
    pub fn len(&self) -> u64 {
        self.roots.backend().len()
    }

    /// No vector has been folded yet
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Root table slots
    pub fn root_capacity(&self) -> u64 {
        self.roots.backend().capacity()
    }

    /// Data table slots
    pub fn data_capacity(&self) -> u64 {
        self.data.capacity()
    }

    /// Bytes held by both tables
    pub fn memory_bytes(&self) -> u64 {
        self.config.memory_bytes()
    }

    /// Number of transition groups projected at construction
    pub fn groups(&self) -> usize {
        self.todo.as_ref().map_or(0, |todo| todo.len())
    }

    /// Statistics of the calling thread for this store
    pub fn local_stats(&self) -> Stats {
        self.scratch.with(|s| s.snapshot())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Fold
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Insert-or-find `vector`
    ///
    /// # Errors
    /// - `VectorLength`: `vector` does not have [`Self::vector_len`] slots
    /// - `TableFull`: a table ran out of space; nodes inserted so far stay
    pub fn fold(&self, vector: &[i32]) -> StoreResult<Folded> {
        self.check_len(vector.len())?;
        self.scratch.with(|s| {
            s.tree.load_state(vector);
            let mut counters = Counters {
                probes: &mut s.probes,
                nodes: &mut s.node_counts,
            };
            self.walk(&mut s.tree, None, None, true, &mut counters)
                .map(inserted)
        })
    }

    /// Insert-or-find `vector`, leaving its tree in `next`
    ///
    /// # Errors
    /// As [`Self::fold`].
    pub fn fold_tree(&self, vector: &[i32], next: &mut Tree) -> StoreResult<Folded> {
        self.check_len(vector.len())?;
        self.check_len(next.vector_len())?;
        next.load_state(vector);
        self.with_counters(|c| self.walk(next, None, None, true, c))
            .map(inserted)
    }

    /// Insert-or-find `vector` reusing the unchanged nodes of `prev`
    ///
    /// Equivalent to [`Self::fold_tree`]; when `prev` was never folded it
    /// degrades to exactly that.
    ///
    /// # Errors
    /// As [`Self::fold`].
    pub fn fold_incremental(
        &self,
        vector: &[i32],
        prev: &Tree,
        next: &mut Tree,
    ) -> StoreResult<Folded> {
        self.incremental(vector, prev, next, None, true).map(inserted)
    }

    /// Insert-or-find a successor produced by transition group `group`
    ///
    /// Sound only if `vector` differs from `prev.state()` in slots marked in
    /// the group's matrix row.
    ///
    /// # Errors
    /// - `UnknownGroup`: the store has no such group
    /// - as [`Self::fold`]
    pub fn fold_projected(
        &self,
        vector: &[i32],
        prev: &Tree,
        next: &mut Tree,
        group: usize,
    ) -> StoreResult<Folded> {
        let todo = self.todo_of(group)?;
        self.incremental(vector, prev, next, Some(todo), true)
            .map(inserted)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Find
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Reference of `vector` if it is resident
    ///
    /// # Errors
    /// - `VectorLength`
    pub fn find(&self, vector: &[i32]) -> StoreResult<Option<TreeRef>> {
        self.check_len(vector.len())?;
        self.scratch.with(|s| {
            s.tree.load_state(vector);
            let mut counters = Counters {
                probes: &mut s.probes,
                nodes: &mut s.node_counts,
            };
            self.walk(&mut s.tree, None, None, false, &mut counters)
                .map(|found| found.map(|f| f.reference))
        })
    }

    /// As [`Self::find`], leaving the (possibly partial) tree in `next`
    ///
    /// # Errors
    /// - `VectorLength`
    pub fn find_tree(&self, vector: &[i32], next: &mut Tree) -> StoreResult<Option<TreeRef>> {
        self.check_len(vector.len())?;
        self.check_len(next.vector_len())?;
        next.load_state(vector);
        self.with_counters(|c| self.walk(next, None, None, false, c))
            .map(|found| found.map(|f| f.reference))
    }

    /// Find-only twin of [`Self::fold_incremental`]
    ///
    /// # Errors
    /// - `VectorLength`
    pub fn find_incremental(
        &self,
        vector: &[i32],
        prev: &Tree,
        next: &mut Tree,
    ) -> StoreResult<Option<TreeRef>> {
        self.incremental(vector, prev, next, None, false)
            .map(|found| found.map(|f| f.reference))
    }

    /// Find-only twin of [`Self::fold_projected`]
    ///
    /// # Errors
    /// - `UnknownGroup`
    /// - `VectorLength`
    pub fn find_projected(
        &self,
        vector: &[i32],
        prev: &Tree,
        next: &mut Tree,
        group: usize,
    ) -> StoreResult<Option<TreeRef>> {
        let todo = self.todo_of(group)?;
        self.incremental(vector, prev, next, Some(todo), false)
            .map(|found| found.map(|f| f.reference))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Unfold
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Write the vector of `reference` into `out`
    ///
    /// # Errors
    /// - `VectorLength`: `out` has the wrong length
    /// - `UnknownReference`: `reference` was not returned by this store
    pub fn unfold(&self, reference: TreeRef, out: &mut [i32]) -> StoreResult<()> {
        self.check_len(out.len())?;
        self.scratch.with(|s| {
            self.unfold_into(reference, &mut s.tree)?;
            out.copy_from_slice(s.tree.state());
            Ok(())
        })
    }

    /// Rebuild the complete tree of `reference` into `out`
    ///
    /// The result can serve as `prev` for incremental folds.
    ///
    /// # Errors
    /// As [`Self::unfold`].
    pub fn unfold_tree(&self, reference: TreeRef, out: &mut Tree) -> StoreResult<()> {
        self.check_len(out.vector_len())?;
        self.unfold_into(reference, out)
    }

    fn unfold_into(&self, reference: TreeRef, out: &mut Tree) -> StoreResult<()> {
        let root = self.roots.backend().key_of(reference)?;
        out.set_children(1, root);
        for i in 2..self.n {
            let slot = out.node(i) as u32 as usize;
            let key = self
                .data
                .get(slot)
                .ok_or(StoreError::UnknownReference(reference))?;
            out.set_children(i, key);
        }
        out.set_root(Some(reference));
        Ok(())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Satellite Bits
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Satellite bits per reference; 0 when unavailable
    pub fn sat_bits(&self) -> u32 {
        self.roots.backend().entries().map_or(0, RootEntries::sat_bits)
    }

    fn entries(&self) -> StoreResult<&RootEntries> {
        match self.roots.backend().entries() {
            Some(entries) if entries.sat_bits() > 0 => Ok(entries),
            _ => Err(StoreError::SatelliteUnavailable),
        }
    }

    /// Whole satellite word of `reference`
    ///
    /// # Errors
    /// - `SatelliteUnavailable`
    /// - `UnknownReference`
    pub fn get_sat_bits(&self, reference: TreeRef) -> StoreResult<u32> {
        self.entries()?.get_bits(reference)
    }

    /// Overwrite the satellite word of `reference`
    ///
    /// # Errors
    /// - `SatelliteUnavailable`
    /// - `SatelliteValue`: `value` wider than the satellite word
    /// - `UnknownReference`
    pub fn set_sat_bits(&self, reference: TreeRef, value: u32) -> StoreResult<()> {
        self.entries()?.set_bits(reference, value)
    }

    /// Test satellite bit `index`
    ///
    /// # Errors
    /// - `SatelliteUnavailable`
    /// - `SatelliteIndex`
    /// - `UnknownReference`
    pub fn get_sat_bit(&self, reference: TreeRef, index: u32) -> StoreResult<bool> {
        self.entries()?.get_bit(reference, index)
    }

    /// Clear satellite bit `index`
    ///
    /// # Errors
    /// As [`Self::get_sat_bit`].
    pub fn unset_sat_bit(&self, reference: TreeRef, index: u32) -> StoreResult<()> {
        self.entries()?.unset_bit(reference, index)
    }

    /// Set satellite bit `index`; `true` for exactly one of several racing callers
    ///
    /// # Errors
    /// As [`Self::get_sat_bit`].
    pub fn try_set_sat_bit(&self, reference: TreeRef, index: u32) -> StoreResult<bool> {
        self.entries()?.try_set_bit(reference, index)
    }

    /// Clear satellite bit `index`; `true` for exactly one of several racing callers
    ///
    /// # Errors
    /// As [`Self::get_sat_bit`].
    pub fn try_unset_sat_bit(&self, reference: TreeRef, index: u32) -> StoreResult<bool> {
        self.entries()?.try_unset_bit(reference, index)
    }

    /// Increment the satellite counter, returning the new value
    ///
    /// # Errors
    /// - `SatelliteUnavailable`
    /// - `SatelliteOverflow`
    /// - `UnknownReference`
    pub fn inc_sat_bits(&self, reference: TreeRef) -> StoreResult<u32> {
        self.entries()?.inc(reference)
    }

    /// Decrement the satellite counter, returning the new value
    ///
    /// # Errors
    /// - `SatelliteUnavailable`
    /// - `SatelliteUnderflow`
    /// - `UnknownReference`
    pub fn dec_sat_bits(&self, reference: TreeRef) -> StoreResult<u32> {
        self.entries()?.dec(reference)
    }

    /// Replace the `bits`-wide sub-field at `offset` if it holds `expected`
    ///
    /// # Errors
    /// - `SatelliteUnavailable`
    /// - `SatelliteIndex`: the sub-field does not fit the satellite word
    /// - `SatelliteValue`: `expected` or `value` wider than the sub-field
    /// - `UnknownReference`
    pub fn compare_set_sat_bits(
        &self,
        reference: TreeRef,
        bits: u32,
        offset: u32,
        expected: u32,
        value: u32,
    ) -> StoreResult<bool> {
        self.entries()?
            .compare_set_bits(reference, bits, offset, expected, value)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Internals
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    #[inline]
    fn check_len(&self, actual: usize) -> StoreResult<()> {
        if actual != self.n {
            return Err(StoreError::VectorLength {
                expected: self.n,
                actual,
            });
        }
        Ok(())
    }

    fn todo_of(&self, group: usize) -> StoreResult<&[usize]> {
        self.todo
            .as_ref()
            .and_then(|todo| todo.get(group))
            .map(|list| &list[..])
            .ok_or(StoreError::UnknownGroup {
                group,
                groups: self.groups(),
            })
    }

    fn with_counters<R>(&self, f: impl FnOnce(&mut Counters<'_>) -> R) -> R {
        self.scratch.with(|s| {
            let mut counters = Counters {
                probes: &mut s.probes,
                nodes: &mut s.node_counts,
            };
            f(&mut counters)
        })
    }

    fn incremental(
        &self,
        vector: &[i32],
        prev: &Tree,
        next: &mut Tree,
        todo: Option<&[usize]>,
        insert: bool,
    ) -> StoreResult<Option<Folded>> {
        self.check_len(vector.len())?;
        self.check_len(prev.vector_len())?;
        self.check_len(next.vector_len())?;

        if prev.reference().is_none() {
            next.load_state(vector);
            next.set_root(None);
            return self.with_counters(|c| self.walk(next, None, None, insert, c));
        }
        next.derive_from(prev, vector);
        self.with_counters(|c| self.walk(next, Some(prev), todo, insert, c))
    }

    /// Hash-cons the internal nodes of `next` bottom-up
    ///
    /// With `prev`, nodes whose child pair is unchanged keep the value copied
    /// from `prev`. With `todo`, only the listed positions are visited.
    /// Returns `None` once a find-only lookup misses.
    ///
    /// `next` carries a reference only if the walk completed, so a tree
    /// left behind by an error or a miss never matches as `prev`.
    fn walk(
        &self,
        next: &mut Tree,
        prev: Option<&Tree>,
        todo: Option<&[usize]>,
        insert: bool,
        counters: &mut Counters<'_>,
    ) -> StoreResult<Option<Folded>> {
        let walked = self.walk_nodes(next, prev, todo, insert, counters);
        if !matches!(walked, Ok(Some(_))) {
            next.set_root(None);
        }
        walked
    }

    fn walk_nodes(
        &self,
        next: &mut Tree,
        prev: Option<&Tree>,
        todo: Option<&[usize]>,
        insert: bool,
        counters: &mut Counters<'_>,
    ) -> StoreResult<Option<Folded>> {
        match todo {
            Some(list) => {
                for &i in list.iter().filter(|&&i| i > 1) {
                    if !self.visit(i, next, prev, insert, counters)? {
                        return Ok(None);
                    }
                }
            }
            None => {
                for i in (2..self.n).rev() {
                    if !self.visit(i, next, prev, insert, counters)? {
                        return Ok(None);
                    }
                }
            }
        }
        self.visit_root(next, prev, insert, counters)
    }

    #[inline]
    fn visit(
        &self,
        i: usize,
        next: &mut Tree,
        prev: Option<&Tree>,
        insert: bool,
        counters: &mut Counters<'_>,
    ) -> StoreResult<bool> {
        let key = next.children(i);
        if prev.is_some_and(|prev| prev.children(i) == key) {
            return Ok(true);
        }
        let slot = match self
            .data
            .find_or_put(key, insert, counters.probes)
            .map_err(|e| self.report(e))?
        {
            Lookup::Inserted(slot) => {
                counters.nodes[i - 1] += 1;
                slot
            }
            Lookup::Found(slot) => slot,
            Lookup::Missing => return Ok(false),
        };
        next.set_node(i, slot as u32 as i32);
        Ok(true)
    }

    fn visit_root(
        &self,
        next: &mut Tree,
        prev: Option<&Tree>,
        insert: bool,
        counters: &mut Counters<'_>,
    ) -> StoreResult<Option<Folded>> {
        let key = next.children(1);
        if let Some(reference) = prev
            .filter(|prev| prev.children(1) == key)
            .and_then(Tree::reference)
        {
            next.set_root(Some(reference));
            return Ok(Some(Folded::new(true, reference)));
        }
        let folded = match self
            .roots
            .backend()
            .find_or_put(key, insert, counters.probes)
            .map_err(|e| self.report(e))?
        {
            Lookup::Inserted(reference) => {
                counters.nodes[0] += 1;
                Folded::new(false, reference)
            }
            Lookup::Found(reference) => Folded::new(true, reference),
            Lookup::Missing => return Ok(None),
        };
        next.set_root(Some(folded.reference));
        Ok(Some(folded))
    }

    fn report(&self, err: StoreError) -> StoreError {
        if let StoreError::TableFull { table, capacity } = &err {
            error!(%table, capacity, vector_len = self.n, "tree store table full");
        }
        err
    }
}

#[inline]
fn inserted(folded: Option<Folded>) -> Folded {
    match folded {
        Some(folded) => folded,
        None => unreachable!("insert-or-find never misses"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(n: usize) -> TreeDbs {
        TreeDbs::new(StoreConfig::new(n).with_size_exp(10)).unwrap()
    }

    #[test]
    fn test_fold_assigns_dense_references() {
        let dbs = store(4);
        assert_eq!(dbs.fold(&[1, 2, 3, 4]).unwrap(), Folded::new(false, TreeRef::new(0)));
        assert_eq!(dbs.fold(&[1, 2, 3, 4]).unwrap(), Folded::new(true, TreeRef::new(0)));
        assert_eq!(dbs.fold(&[1, 2, 3, 5]).unwrap(), Folded::new(false, TreeRef::new(1)));
        assert_eq!(dbs.len(), 2);
    }

    #[test]
    fn test_two_slot_vectors_use_roots_only() {
        let dbs = store(2);
        let folded = dbs.fold(&[-1, 7]).unwrap();
        let mut out = [0; 2];
        dbs.unfold(folded.reference, &mut out).unwrap();
        assert_eq!(out, [-1, 7]);
        assert_eq!(dbs.local_stats().node_counts, vec![1, 0]);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let dbs = store(4);
        assert_eq!(
            dbs.fold(&[1, 2, 3]),
            Err(StoreError::VectorLength { expected: 4, actual: 3 })
        );
        let mut tree = Tree::new(3);
        assert!(dbs.fold_tree(&[1, 2, 3, 4], &mut tree).is_err());
    }

    #[test]
    fn test_find_does_not_insert() {
        let dbs = store(5);
        assert_eq!(dbs.find(&[1, 2, 3, 4, 5]).unwrap(), None);
        assert!(dbs.is_empty());
        let r = dbs.fold(&[1, 2, 3, 4, 5]).unwrap().reference;
        assert_eq!(dbs.find(&[1, 2, 3, 4, 5]).unwrap(), Some(r));
        assert_eq!(dbs.find(&[1, 2, 3, 4, 6]).unwrap(), None);
    }

    #[test]
    fn test_incremental_reuses_previous_tree() {
        let dbs = store(4);
        let mut prev = Tree::new(4);
        let mut next = Tree::new(4);
        assert_eq!(
            dbs.fold_tree(&[1, 2, 3, 4], &mut prev).unwrap(),
            Folded::new(false, TreeRef::new(0))
        );
        assert_eq!(
            dbs.fold_incremental(&[1, 2, 3, 5], &prev, &mut next).unwrap(),
            Folded::new(false, TreeRef::new(1))
        );
        assert_eq!(next.state(), &[1, 2, 3, 5]);
        assert_eq!(next.reference(), Some(TreeRef::new(1)));

        // identical vector: no lookup at all
        let before = dbs.local_stats().lookups;
        let mut same = Tree::new(4);
        assert_eq!(
            dbs.fold_incremental(&[1, 2, 3, 5], &next, &mut same).unwrap(),
            Folded::new(true, TreeRef::new(1))
        );
        assert_eq!(dbs.local_stats().lookups, before);
    }

    #[test]
    fn test_incremental_from_unfolded_tree_is_full_fold() {
        let dbs = store(4);
        let prev = Tree::new(4);
        let mut next = Tree::new(4);
        let folded = dbs.fold_incremental(&[0, 0, 0, 0], &prev, &mut next).unwrap();
        assert_eq!(folded, Folded::new(false, TreeRef::new(0)));
    }

    #[test]
    fn test_unfold_tree_feeds_incremental_fold() {
        let dbs = store(6);
        let r = dbs.fold(&[6, 5, 4, 3, 2, 1]).unwrap().reference;
        let mut tree = Tree::new(6);
        dbs.unfold_tree(r, &mut tree).unwrap();
        assert_eq!(tree.state(), &[6, 5, 4, 3, 2, 1]);
        assert_eq!(tree.reference(), Some(r));

        let mut next = Tree::new(6);
        let folded = dbs.fold_incremental(&[6, 5, 4, 3, 2, 0], &tree, &mut next).unwrap();
        let full = dbs.fold(&[6, 5, 4, 3, 2, 0]).unwrap();
        assert_eq!(folded.reference, full.reference);
        assert!(full.seen);
    }

    #[test]
    fn test_reserved_key_leaves_tree_unreferenced() {
        let dbs = store(4);
        let mut prev = Tree::new(4);
        let mut next = Tree::new(4);
        dbs.fold_tree(&[1, 2, 3, 4], &mut prev).unwrap();

        let reserved = [i32::MIN, i32::MIN, 3, 4];
        let err = dbs.fold_incremental(&reserved, &prev, &mut next).unwrap_err();
        assert!(matches!(err, StoreError::ReservedKey { .. }));
        assert_eq!(next.reference(), None);

        // reusing the failed tree must not hand out the old reference
        let mut again = Tree::new(4);
        let err = dbs.fold_incremental(&reserved, &next, &mut again).unwrap_err();
        assert!(matches!(err, StoreError::ReservedKey { .. }));
        assert_eq!(again.reference(), None);

        let mut out = [0; 4];
        dbs.unfold(TreeRef::new(0), &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
        assert_eq!(dbs.len(), 1);
    }

    #[test]
    fn test_full_data_table_leaves_tree_unreferenced() {
        // 8 data slots, plenty of roots
        let dbs = TreeDbs::new(StoreConfig::new(4).with_size_exp(10).with_ratio(7)).unwrap();
        let mut prev = Tree::new(4);
        let mut next = Tree::new(4);
        dbs.fold_tree(&[0, 0, 0, 0], &mut prev).unwrap();

        let mut failed = None;
        for k in 1..64 {
            match dbs.fold_incremental(&[k, 0, 0, 0], &prev, &mut next) {
                Ok(_) => std::mem::swap(&mut prev, &mut next),
                Err(e) => {
                    failed = Some((k, e));
                    break;
                }
            }
        }
        let (k, err) = failed.expect("data table never filled up");
        assert!(matches!(err, StoreError::TableFull { table: TableKind::Data, .. }));
        assert_eq!(next.reference(), None);

        let mut again = Tree::new(4);
        assert!(dbs.fold_incremental(&[k, 0, 0, 0], &next, &mut again).is_err());
        assert_eq!(again.reference(), None);
    }

    #[test]
    fn test_dropping_store_frees_scratch_of_live_threads() {
        const STORES: usize = 20;
        // a vector length no other test uses
        const N: usize = 61;
        let released = || {
            crate::domain::scratch::RELEASED
                .lock()
                .unwrap()
                .iter()
                .filter(|&&n| n == N)
                .count()
        };

        let (to_worker, stores) = std::sync::mpsc::channel::<std::sync::Arc<TreeDbs>>();
        let (to_main, done) = std::sync::mpsc::channel::<()>();
        let (finish, wait) = std::sync::mpsc::channel::<()>();

        let worker = std::thread::spawn(move || {
            for dbs in stores {
                dbs.fold(&[7; N]).unwrap();
                drop(dbs);
                to_main.send(()).unwrap();
            }
            // stay alive until the main thread has checked
            wait.recv().unwrap();
        });

        for _ in 0..STORES {
            let dbs = std::sync::Arc::new(store(N));
            to_worker.send(dbs.clone()).unwrap();
            done.recv().unwrap();
            // last handle: the store drops here, on the main thread
            drop(dbs);
        }
        drop(to_worker);

        assert_eq!(released(), STORES);
        finish.send(()).unwrap();
        worker.join().unwrap();
    }

    #[test]
    fn test_unknown_reference() {
        let dbs = store(4);
        let mut out = [0; 4];
        assert_eq!(
            dbs.unfold(TreeRef::new(3), &mut out),
            Err(StoreError::UnknownReference(TreeRef::new(3)))
        );
    }

    #[test]
    fn test_projected_fold_requires_matrix() {
        let dbs = store(4);
        let prev = Tree::new(4);
        let mut next = Tree::new(4);
        assert_eq!(
            dbs.fold_projected(&[0; 4], &prev, &mut next, 0),
            Err(StoreError::UnknownGroup { group: 0, groups: 0 })
        );
    }

    #[test]
    fn test_matrix_shape_checked() {
        let matrix = DependencyMatrix::new(2, 3);
        let err = TreeDbs::with_matrix(StoreConfig::new(4).with_size_exp(10), &matrix);
        assert!(matches!(err, Err(StoreError::MatrixShape { expected: 4, actual: 3 })));
    }

    #[test]
    fn test_satellite_requires_bits() {
        let dbs = store(4);
        let r = dbs.fold(&[1, 1, 1, 1]).unwrap().reference;
        assert_eq!(dbs.sat_bits(), 0);
        assert_eq!(dbs.try_set_sat_bit(r, 0), Err(StoreError::SatelliteUnavailable));
    }

    #[test]
    fn test_node_counts_per_position() {
        let dbs = store(4);
        dbs.fold(&[1, 2, 3, 4]).unwrap();
        dbs.fold(&[1, 2, 3, 5]).unwrap();
        // root twice, node 2 once, node 3 twice
        assert_eq!(dbs.local_stats().node_counts, vec![2, 1, 2, 0]);
        assert_eq!(dbs.local_stats().roots, 2);
    }
}
