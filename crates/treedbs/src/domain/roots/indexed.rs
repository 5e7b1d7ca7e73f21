//! Indexed Root Table
//!
//! ```text
//! table:     NodeTable of root keys        slot  -> key
//! slot_refs: one word per table slot       slot  -> ref + 1
//! entries:   one word per reference        ref   -> slot + 1 | satellite
//! next_ref:  reference allocator
//! ```
//!
//! # Publication
//!
//! The thread whose CAS claims the slot allocates the next reference, stores
//! the entry word and then the back-pointer, both with `Release`. A thread
//! that finds the key already claimed spins on the back-pointer until it is
//! published; the window is a few instructions wide.

use std::sync::atomic::{AtomicU64, Ordering};

use super::entries::RootEntries;
use super::RootBackend;
use crate::domain::node_table::NodeTable;
use crate::domain::scratch::ProbeStats;
use crate::domain::types::{Lookup, TreeRef};
use crate::domain::zeroed::zeroed_slice;
use crate::error::{StoreError, StoreResult, TableKind};

/// Root table handing out dense references in insertion order
pub struct IndexedRoots {
    table: NodeTable,
    slot_refs: Box<[AtomicU64]>,
    entries: RootEntries,
    next_ref: AtomicU64,
}

impl IndexedRoots {
    /// Allocate `2^log_size` root slots with `sat_bits` satellite bits each
    pub fn new(log_size: u32, sat_bits: u32) -> Self {
        let size = 1usize << log_size;
        Self {
            table: NodeTable::new(log_size, TableKind::Roots),
            slot_refs: zeroed_slice(size),
            entries: RootEntries::new(size, sat_bits),
            next_ref: AtomicU64::new(0),
        }
    }

    fn await_reference(&self, slot: usize) -> TreeRef {
        loop {
            match self.slot_refs[slot].load(Ordering::Acquire) {
                0 => std::hint::spin_loop(),
                stored => return TreeRef::new(stored - 1),
            }
        }
    }
}

impl RootBackend for IndexedRoots {
    fn find_or_put(
        &self,
        key: u64,
        insert: bool,
        stats: &mut ProbeStats,
    ) -> StoreResult<Lookup<TreeRef>> {
        match self.table.find_or_put(key, insert, stats)? {
            Lookup::Inserted(slot) => {
                // at most one reference per claimed slot, so it fits `entries`
                let reference = self.next_ref.fetch_add(1, Ordering::AcqRel);
                self.entries.publish(reference as usize, slot);
                self.slot_refs[slot].store(reference + 1, Ordering::Release);
                Ok(Lookup::Inserted(TreeRef::new(reference)))
            }
            Lookup::Found(slot) => Ok(Lookup::Found(self.await_reference(slot))),
            Lookup::Missing => Ok(Lookup::Missing),
        }
    }

    fn key_of(&self, reference: TreeRef) -> StoreResult<u64> {
        self.entries
            .slot(reference)
            .and_then(|slot| self.table.get(slot))
            .ok_or(StoreError::UnknownReference(reference))
    }

    fn len(&self) -> u64 {
        self.next_ref.load(Ordering::Acquire).min(self.table.capacity())
    }

    fn capacity(&self) -> u64 {
        self.table.capacity()
    }

    fn entries(&self) -> Option<&RootEntries> {
        Some(&self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_references_are_dense() {
        let roots = IndexedRoots::new(8, 0);
        let mut stats = ProbeStats::default();
        for (i, key) in [900u64, 17, 4242, 3].iter().enumerate() {
            assert_eq!(
                roots.find_or_put(*key, true, &mut stats).unwrap(),
                Lookup::Inserted(TreeRef::new(i as u64))
            );
        }
        assert_eq!(
            roots.find_or_put(4242, true, &mut stats).unwrap(),
            Lookup::Found(TreeRef::new(2))
        );
        assert_eq!(roots.len(), 4);
    }

    #[test]
    fn test_key_of_round_trips() {
        let roots = IndexedRoots::new(8, 0);
        let mut stats = ProbeStats::default();
        roots.find_or_put(55, true, &mut stats).unwrap();
        roots.find_or_put(66, true, &mut stats).unwrap();
        assert_eq!(roots.key_of(TreeRef::new(1)).unwrap(), 66);
        assert_eq!(
            roots.key_of(TreeRef::new(2)),
            Err(StoreError::UnknownReference(TreeRef::new(2)))
        );
    }

    #[test]
    fn test_find_does_not_allocate() {
        let roots = IndexedRoots::new(8, 0);
        let mut stats = ProbeStats::default();
        assert_eq!(roots.find_or_put(5, false, &mut stats).unwrap(), Lookup::Missing);
        assert_eq!(roots.len(), 0);
    }

    #[test]
    fn test_concurrent_inserts_agree_on_reference() {
        let roots = IndexedRoots::new(12, 0);
        let refs: Vec<Vec<TreeRef>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        let mut stats = ProbeStats::default();
                        (0..500u64)
                            .map(|k| match roots.find_or_put(k, true, &mut stats).unwrap() {
                                Lookup::Inserted(r) | Lookup::Found(r) => r,
                                Lookup::Missing => unreachable!(),
                            })
                            .collect()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for other in &refs[1..] {
            assert_eq!(other, &refs[0]);
        }
        assert_eq!(roots.len(), 500);
    }
}
