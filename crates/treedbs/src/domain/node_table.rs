//! Lock-free Insert-or-Find Node Table
//!
//! # Layout
//!
//! ```text
//! NodeTable
//! ├─ lines: Box<[CacheLine]>     (64-byte aligned, 8 words each)
//! │   ├─ [0]: [AtomicU64; 8]
//! │   └─ ...
//! ├─ mask: size - 1
//! └─ threshold: cache lines probed before giving up
//! ```
//!
//! A word is `EMPTY` (0) or `key ^ RESERVED_KEY`. Slots are claimed with a
//! single CAS from `EMPTY` and never change afterwards, so a reader either
//! sees nothing or the complete key.
//!
//! The encoding gives up exactly one key, `pack_u64(i32::MIN, i32::MIN)`. Data
//! table slots stay below `2^31`, so only a leaf pair of two `i32::MIN` values
//! can produce it; keys made of `-1` children are stored normally.
//!
//! # Probing
//!
//! The home slot is `mix64(key) & mask`. The probe walks the remaining words of
//! the home cache line (wrapping inside the line) and then jumps to another
//! line with [`prime_rehash`]. Every thread inserting the same key walks the
//! same sequence, so the first EMPTY word on it is where all of them meet:
//! one CAS wins, the losers re-read the word and find the winner's value.

use std::sync::atomic::{AtomicU64, Ordering};

use super::hash::{mix64, prime_rehash, CACHE_LINE_WORDS, CL_MASK};
use super::scratch::ProbeStats;
use super::types::{pack_u64, Lookup};
use super::zeroed::{zeroed_slice, Zeroable};
use crate::error::{StoreError, StoreResult, TableKind};

const EMPTY: u64 = 0;

/// The one key whose encoding is `EMPTY`
pub const RESERVED_KEY: u64 = pack_u64(i32::MIN, i32::MIN);

/// Upper bound on the number of cache lines one probe may visit
const MAX_THRESHOLD: usize = 1 << 18;

#[repr(align(64))]
struct CacheLine([AtomicU64; CACHE_LINE_WORDS]);

// SAFETY: a line of zeroed atomics; zero is EMPTY
unsafe impl Zeroable for CacheLine {}

/// Fixed-capacity hash set of 64-bit keys with stable slot indices
pub struct NodeTable {
    lines: Box<[CacheLine]>,
    log_size: u32,
    mask: u64,
    threshold: usize,
    kind: TableKind,
}

impl NodeTable {
    /// Allocate a zeroed table of `2^log_size` slots (`log_size >= 3`)
    pub fn new(log_size: u32, kind: TableKind) -> Self {
        debug_assert!(log_size >= 3, "node table smaller than a cache line");
        let size = 1u64 << log_size;
        let lines = zeroed_slice(size as usize / CACHE_LINE_WORDS);
        let threshold = ((size / 64) as usize).clamp(1, MAX_THRESHOLD);

        Self {
            lines,
            log_size,
            mask: size - 1,
            threshold,
            kind,
        }
    }

    /// Number of slots
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.mask + 1
    }

    /// log2 of the number of slots
    #[inline]
    pub fn log_size(&self) -> u32 {
        self.log_size
    }

    /// Cache lines a probe may visit before the table counts as full
    #[inline]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    #[inline(always)]
    fn word(&self, slot: usize) -> &AtomicU64 {
        &self.lines[slot / CACHE_LINE_WORDS].0[slot % CACHE_LINE_WORDS]
    }

    /// Find `key`, inserting it when `insert` is set
    ///
    /// # Errors
    /// - `ReservedKey`: `key` is [`RESERVED_KEY`]
    /// - `TableFull`: the probe budget ran out
    pub fn find_or_put(
        &self,
        key: u64,
        insert: bool,
        stats: &mut ProbeStats,
    ) -> StoreResult<Lookup<usize>> {
        if key == RESERVED_KEY {
            return Err(StoreError::ReservedKey { key });
        }
        let candidate = key ^ RESERVED_KEY;
        let seed = mix64(key);
        let mut hash = seed;
        stats.lookups += 1;

        for _ in 0..self.threshold {
            let mut slot = (hash & self.mask) as usize;
            let line_start = slot & CL_MASK as usize;

            for _ in 0..CACHE_LINE_WORDS {
                let bucket = self.word(slot);
                let mut current = bucket.load(Ordering::Acquire);
                if current == EMPTY {
                    if !insert {
                        return Ok(Lookup::Missing);
                    }
                    match bucket.compare_exchange(
                        EMPTY,
                        candidate,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => return Ok(Lookup::Inserted(slot)),
                        Err(winner) => current = winner,
                    }
                }
                if current == candidate {
                    return Ok(Lookup::Found(slot));
                }
                stats.misses += 1;
                slot = line_start + (slot + 1 - line_start) % CACHE_LINE_WORDS;
            }

            hash = prime_rehash(hash, seed);
            stats.rehashes += 1;
        }

        Err(StoreError::TableFull {
            table: self.kind,
            capacity: self.capacity(),
        })
    }

    /// Key stored in `slot`, if the slot is occupied
    #[inline]
    pub fn get(&self, slot: usize) -> Option<u64> {
        if slot as u64 > self.mask {
            return None;
        }
        match self.word(slot).load(Ordering::Acquire) {
            EMPTY => None,
            stored => Some(stored ^ RESERVED_KEY),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_then_find() {
        let table = NodeTable::new(8, TableKind::Data);
        let mut stats = ProbeStats::default();

        let slot = match table.find_or_put(42, true, &mut stats).unwrap() {
            Lookup::Inserted(slot) => slot,
            other => panic!("expected insert, got {:?}", other),
        };
        assert_eq!(table.find_or_put(42, true, &mut stats).unwrap(), Lookup::Found(slot));
        assert_eq!(table.find_or_put(42, false, &mut stats).unwrap(), Lookup::Found(slot));
        assert_eq!(table.get(slot), Some(42));
        assert_eq!(stats.lookups, 3);
    }

    #[test]
    fn test_find_without_insert_misses() {
        let table = NodeTable::new(8, TableKind::Data);
        let mut stats = ProbeStats::default();
        assert_eq!(table.find_or_put(7, false, &mut stats).unwrap(), Lookup::Missing);
        assert_eq!(table.get((mix64(7) & 255) as usize), None);
    }

    #[test]
    fn test_zero_key_is_storable() {
        let table = NodeTable::new(4, TableKind::Data);
        let mut stats = ProbeStats::default();
        let lookup = table.find_or_put(0, true, &mut stats).unwrap();
        assert!(matches!(lookup, Lookup::Inserted(_)));
    }

    #[test]
    fn test_reserved_key_rejected() {
        let table = NodeTable::new(4, TableKind::Data);
        let mut stats = ProbeStats::default();
        assert_eq!(
            table.find_or_put(RESERVED_KEY, true, &mut stats),
            Err(StoreError::ReservedKey { key: RESERVED_KEY })
        );
    }

    #[test]
    fn test_minus_one_children_are_storable() {
        let table = NodeTable::new(4, TableKind::Data);
        let mut stats = ProbeStats::default();
        let key = pack_u64(-1, -1);
        let slot = match table.find_or_put(key, true, &mut stats).unwrap() {
            Lookup::Inserted(slot) => slot,
            other => panic!("expected insert, got {:?}", other),
        };
        assert_eq!(table.get(slot), Some(u64::MAX));
    }

    #[test]
    fn test_single_line_table_fills_up() {
        // 8 slots, one cache line, one probe round
        let table = NodeTable::new(3, TableKind::Roots);
        let mut stats = ProbeStats::default();
        for key in 0..8u64 {
            assert!(matches!(
                table.find_or_put(key, true, &mut stats).unwrap(),
                Lookup::Inserted(_)
            ));
        }
        assert_eq!(
            table.find_or_put(8, true, &mut stats),
            Err(StoreError::TableFull {
                table: TableKind::Roots,
                capacity: 8
            })
        );
        // existing keys are still found in a full table
        assert!(matches!(
            table.find_or_put(3, true, &mut stats).unwrap(),
            Lookup::Found(_)
        ));
    }

    #[test]
    fn test_distinct_keys_get_distinct_slots() {
        let table = NodeTable::new(12, TableKind::Data);
        let mut stats = ProbeStats::default();
        let mut slots = std::collections::HashSet::new();
        for key in 0..1000u64 {
            match table.find_or_put(key * 31, true, &mut stats).unwrap() {
                Lookup::Inserted(slot) => assert!(slots.insert(slot)),
                other => panic!("unexpected {:?}", other),
            }
        }
    }
}
