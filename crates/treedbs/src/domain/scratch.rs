//! Thread-local Scratch Space
//!
//! Each worker thread gets, per store, a reusable fold workspace and its own
//! statistics counters. Nothing in here is shared between threads, so the
//! counters are plain integers.
//!
//! Entries are created on first use and owned by the store, so dropping the
//! store frees the entries of every thread that used it. Thread ids are
//! recycled: a thread started after another one exited may take over its
//! entry, counters included.

use std::cell::RefCell;

use thread_local::ThreadLocal;

use super::types::Tree;

/// Probe counters filled in by the node tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeStats {
    /// Insert-or-find calls started
    pub lookups: u64,
    /// Occupied slots skipped while probing
    pub misses: u64,
    /// Switches to another cache line
    pub rehashes: u64,
}

/// Snapshot of one thread's statistics for one store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    /// Table lookups started by this thread
    pub lookups: u64,
    /// Occupied slots skipped while probing
    pub misses: u64,
    /// Cache line switches
    pub rehashes: u64,
    /// Nodes this thread inserted, over all tree positions
    pub nodes: u64,
    /// Roots (complete vectors) this thread inserted
    pub roots: u64,
    /// Insertions per tree position; index 0 counts roots
    pub node_counts: Vec<u64>,
}

pub(crate) struct Scratch {
    pub(crate) tree: Tree,
    pub(crate) probes: ProbeStats,
    pub(crate) node_counts: Box<[u64]>,
}

impl Scratch {
    pub(crate) fn new(n: usize) -> Self {
        Self {
            tree: Tree::new(n),
            probes: ProbeStats::default(),
            node_counts: vec![0; n].into_boxed_slice(),
        }
    }

    pub(crate) fn snapshot(&self) -> Stats {
        Stats {
            lookups: self.probes.lookups,
            misses: self.probes.misses,
            rehashes: self.probes.rehashes,
            nodes: self.node_counts.iter().sum(),
            roots: self.node_counts[0],
            node_counts: self.node_counts.to_vec(),
        }
    }
}

/// Vector lengths of released scratch entries, for tests that watch teardown
#[cfg(test)]
pub(crate) static RELEASED: std::sync::Mutex<Vec<usize>> = std::sync::Mutex::new(Vec::new());

#[cfg(test)]
impl Drop for Scratch {
    fn drop(&mut self) {
        if let Ok(mut released) = RELEASED.lock() {
            released.push(self.tree.vector_len());
        }
    }
}

/// Per-thread scratch entries owned by one store
///
/// Every thread's entry is freed together with the store.
pub(crate) struct ScratchSet {
    n: usize,
    entries: ThreadLocal<RefCell<Scratch>>,
}

impl ScratchSet {
    pub(crate) fn new(n: usize) -> Self {
        Self {
            n,
            entries: ThreadLocal::new(),
        }
    }

    /// Run `f` with the calling thread's entry
    ///
    /// Must not be re-entered from inside `f`.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut Scratch) -> R) -> R {
        let cell = self.entries.get_or(|| RefCell::new(Scratch::new(self.n)));
        f(&mut cell.borrow_mut())
    }

    /// Entries created so far, over all threads
    #[cfg(test)]
    pub(crate) fn len(&mut self) -> usize {
        self.entries.iter_mut().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_is_reused_per_thread() {
        let set = ScratchSet::new(4);
        set.with(|s| s.probes.lookups += 5);
        assert_eq!(set.with(|s| s.probes.lookups), 5);

        // another store gets its own counters
        let other = ScratchSet::new(4);
        assert_eq!(other.with(|s| s.probes.lookups), 0);
    }

    #[test]
    fn test_scratch_is_per_thread() {
        let mut set = ScratchSet::new(2);
        set.with(|s| s.node_counts[0] = 9);
        let seen = std::thread::scope(|scope| {
            scope
                .spawn(|| set.with(|s| s.node_counts[0]))
                .join()
                .unwrap()
        });
        assert_eq!(seen, 0);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_snapshot_sums_positions() {
        let set = ScratchSet::new(3);
        let stats = set.with(|s| {
            s.node_counts.copy_from_slice(&[2, 3, 4]);
            s.snapshot()
        });
        assert_eq!(stats.roots, 2);
        assert_eq!(stats.nodes, 9);
    }
}
