//! Core Types for Tree Compression
//!
//! # Tree Layout
//!
//! A vector of `n` slots is folded as a heap-indexed binary tree stored in
//! `2n` cells:
//!
//! ```text
//!              1                 <- root (result kept in `Tree::root`)
//!          2       3             <- internal nodes (data table slots)
//!        4   5   6   7
//!       8 9 10 11 12 13 14 15    <- leaves: the vector itself (n = 8)
//! ```
//!
//! Node `i` has children `2i` and `2i + 1`; leaves live at `n..2n`. For odd
//! `n` some internal nodes pair a subtree with a raw leaf, which is fine since
//! every child is just a 32-bit value.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque reference to a folded vector
///
/// In the default configuration references are dense and handed out in
/// insertion order, starting at 0. With slim roots the reference is the packed
/// root key itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreeRef(pub u64);

impl TreeRef {
    /// Create a reference from its raw value
    #[inline(always)]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the underlying value
    #[inline(always)]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub(crate) const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TreeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref({})", self.0)
    }
}

/// Outcome of a successful fold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Folded {
    /// The complete vector was already resident
    pub seen: bool,
    /// Canonical reference of the vector
    pub reference: TreeRef,
}

impl Folded {
    pub(crate) const fn new(seen: bool, reference: TreeRef) -> Self {
        Self { seen, reference }
    }
}

/// Result of a single insert-or-find in one of the tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<T> {
    /// Key was absent and this call claimed it
    Inserted(T),
    /// Key was already present
    Found(T),
    /// Key was absent and insertion was disabled
    Missing,
}

/// Pack two adjacent children into one node key (`lo` in the low half)
#[inline(always)]
pub const fn pack_u64(lo: i32, hi: i32) -> u64 {
    (lo as u32 as u64) | ((hi as u32 as u64) << 32)
}

/// Split a node key back into its two children
#[inline(always)]
pub const fn unpack_u64(key: u64) -> (i32, i32) {
    (key as u32 as i32, (key >> 32) as u32 as i32)
}

/// Folded tree of one vector, kept by callers for incremental folds
///
/// Internal cells hold data table slots; the leaves hold the vector.
#[derive(Clone, PartialEq, Eq)]
pub struct Tree {
    root: Option<TreeRef>,
    nodes: Box<[i32]>,
}

impl Tree {
    /// Create an empty tree for vectors of length `n`
    pub fn new(n: usize) -> Self {
        Self {
            root: None,
            nodes: vec![0; n * 2].into_boxed_slice(),
        }
    }

    /// Vector length this tree was created for
    #[inline]
    pub fn vector_len(&self) -> usize {
        self.nodes.len() / 2
    }

    /// Reference of the folded vector, if the tree has been folded
    #[inline]
    pub fn reference(&self) -> Option<TreeRef> {
        self.root
    }

    /// The vector stored in the leaves
    #[inline]
    pub fn state(&self) -> &[i32] {
        &self.nodes[self.vector_len()..]
    }

    #[inline(always)]
    pub(crate) fn set_root(&mut self, root: Option<TreeRef>) {
        self.root = root;
    }

    #[inline(always)]
    pub(crate) fn node(&self, index: usize) -> i32 {
        self.nodes[index]
    }

    #[inline(always)]
    pub(crate) fn set_node(&mut self, index: usize, value: i32) {
        self.nodes[index] = value;
    }

    /// Key of node `index`: its two children packed together
    #[inline(always)]
    pub(crate) fn children(&self, index: usize) -> u64 {
        pack_u64(self.nodes[index << 1], self.nodes[(index << 1) + 1])
    }

    #[inline(always)]
    pub(crate) fn set_children(&mut self, index: usize, key: u64) {
        let (lo, hi) = unpack_u64(key);
        self.nodes[index << 1] = lo;
        self.nodes[(index << 1) + 1] = hi;
    }

    pub(crate) fn load_state(&mut self, vector: &[i32]) {
        let n = self.vector_len();
        self.nodes[n..].copy_from_slice(vector);
    }

    /// Copy internal nodes and root of `prev`, then install `vector` as leaves
    pub(crate) fn derive_from(&mut self, prev: &Tree, vector: &[i32]) {
        let n = self.vector_len();
        self.nodes[..n].copy_from_slice(&prev.nodes[..n]);
        self.nodes[n..].copy_from_slice(vector);
        self.root = prev.root;
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("root", &self.root)
            .field("nodes", &&self.nodes[2..self.vector_len()])
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_keeps_sign() {
        let key = pack_u64(-1, 7);
        assert_eq!(key & 0xFFFF_FFFF, 0xFFFF_FFFF);
        assert_eq!(key >> 32, 7);
        assert_eq!(unpack_u64(key), (-1, 7));
        assert_eq!(unpack_u64(pack_u64(i32::MIN, i32::MAX)), (i32::MIN, i32::MAX));
    }

    #[test]
    fn test_tree_children_follow_heap_layout() {
        let mut tree = Tree::new(4);
        tree.load_state(&[1, 2, 3, 4]);
        assert_eq!(tree.state(), &[1, 2, 3, 4]);
        // node 2 covers leaves 4,5 (values 1,2); node 3 covers 6,7
        assert_eq!(tree.children(2), pack_u64(1, 2));
        assert_eq!(tree.children(3), pack_u64(3, 4));

        tree.set_children(1, pack_u64(10, 11));
        assert_eq!(tree.node(2), 10);
        assert_eq!(tree.node(3), 11);
    }

    #[test]
    fn test_derive_from_copies_internal_nodes() {
        let mut prev = Tree::new(3);
        prev.load_state(&[5, 6, 7]);
        prev.set_node(2, 42);
        prev.set_root(Some(TreeRef::new(9)));

        let mut next = Tree::new(3);
        next.derive_from(&prev, &[5, 6, 8]);
        assert_eq!(next.node(2), 42);
        assert_eq!(next.reference(), Some(TreeRef::new(9)));
        assert_eq!(next.state(), &[5, 6, 8]);
    }

    #[test]
    fn test_tree_ref_display() {
        assert_eq!(format!("{}", TreeRef::new(3)), "ref(3)");
    }

    #[test]
    fn test_tree_ref_serializes_as_number() {
        assert_eq!(serde_json::to_string(&TreeRef::new(42)).unwrap(), "42");
        let parsed: TreeRef = serde_json::from_str("7").unwrap();
        assert_eq!(parsed, TreeRef::new(7));
    }
}
