//! Compact Root Table
//!
//! A root key is two data table slots, so it carries only `2 * data_log`
//! significant bits. The key is scrambled with a bijection and split:
//!
//! ```text
//!   scrambled key
//! ┌──────────────────────┬───────────────────────────┐
//! │ home (root_log bits) │ remainder (rem_bits bits) │
//! └──────────────────────┴───────────────────────────┘
//!
//!   bucket (u32)
//! ┌──────────────────┬────────────────────────────────┐
//! │ displacement + 1 │ remainder                      │
//! │ 5 bits           │ 27 bits                        │
//! └──────────────────┴────────────────────────────────┘
//! ```
//!
//! Home and remainder together restore the key, so a bucket only needs the
//! remainder plus how far it sits from home. Probing is linear over
//! `MAX_DISPLACEMENT + 1` buckets past the end of the home range, so there is
//! no wrap-around.
//!
//! The reference of a root is its compacted key, which is why references of
//! this backend are stable but not dense.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::RootBackend;
use crate::domain::hash::{low_mask, scramble};
use crate::domain::scratch::ProbeStats;
use crate::domain::types::{pack_u64, unpack_u64, Lookup, TreeRef};
use crate::domain::zeroed::zeroed_slice;
use crate::error::{StoreError, StoreResult, TableKind};

/// Remainder bits per bucket
pub(crate) const REM_BITS: u32 = 27;

/// Farthest a bucket may sit from its home
pub(crate) const MAX_DISPLACEMENT: u32 = 30;

const EMPTY: u32 = 0;

/// Root table of 32-bit buckets without satellite storage
pub struct CompactRoots {
    buckets: Box<[AtomicU32]>,
    log_size: u32,
    data_log: u32,
    key_bits: u32,
    rem_bits: u32,
    count: AtomicU64,
}

impl CompactRoots {
    /// Allocate `2^log_size` home buckets for keys of two `data_log`-bit slots
    pub fn new(log_size: u32, data_log: u32) -> Self {
        let key_bits = 2 * data_log;
        let rem_bits = key_bits.saturating_sub(log_size);
        debug_assert!(rem_bits <= REM_BITS, "remainder does not fit a bucket");
        let len = (1usize << log_size) + MAX_DISPLACEMENT as usize + 1;
        Self {
            buckets: zeroed_slice(len),
            log_size,
            data_log,
            key_bits,
            rem_bits,
            count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn compact(&self, key: u64) -> u64 {
        let (lo, hi) = unpack_u64(key);
        debug_assert!((lo as u32 as u64) >> self.data_log == 0);
        debug_assert!((hi as u32 as u64) >> self.data_log == 0);
        (lo as u32 as u64) | ((hi as u32 as u64) << self.data_log)
    }

    #[inline]
    fn expand(&self, compact: u64) -> u64 {
        let mask = low_mask(self.data_log);
        pack_u64((compact & mask) as u32 as i32, (compact >> self.data_log) as u32 as i32)
    }

    fn probe(
        &self,
        compact: u64,
        insert: bool,
        stats: &mut ProbeStats,
    ) -> StoreResult<Lookup<TreeRef>> {
        let mixed = scramble(compact, self.key_bits);
        let home = (mixed >> self.rem_bits) as usize;
        let rem = (mixed & low_mask(self.rem_bits)) as u32;
        let reference = TreeRef::new(compact);
        stats.lookups += 1;

        for disp in 0..=MAX_DISPLACEMENT {
            let bucket = &self.buckets[home + disp as usize];
            let wanted = ((disp + 1) << REM_BITS) | rem;
            let mut current = bucket.load(Ordering::Acquire);
            if current == EMPTY {
                if !insert {
                    return Ok(Lookup::Missing);
                }
                match bucket.compare_exchange(EMPTY, wanted, Ordering::AcqRel, Ordering::Acquire) {
                    Ok(_) => {
                        self.count.fetch_add(1, Ordering::Relaxed);
                        return Ok(Lookup::Inserted(reference));
                    }
                    Err(winner) => current = winner,
                }
            }
            if current == wanted {
                return Ok(Lookup::Found(reference));
            }
            stats.misses += 1;
        }

        Err(StoreError::TableFull {
            table: TableKind::Roots,
            capacity: self.capacity(),
        })
    }
}

impl RootBackend for CompactRoots {
    fn find_or_put(
        &self,
        key: u64,
        insert: bool,
        stats: &mut ProbeStats,
    ) -> StoreResult<Lookup<TreeRef>> {
        self.probe(self.compact(key), insert, stats)
    }

    fn key_of(&self, reference: TreeRef) -> StoreResult<u64> {
        if reference.as_u64() > low_mask(self.key_bits) {
            return Err(StoreError::UnknownReference(reference));
        }
        let mut scratch = ProbeStats::default();
        match self.probe(reference.as_u64(), false, &mut scratch)? {
            Lookup::Found(_) => Ok(self.expand(reference.as_u64())),
            _ => Err(StoreError::UnknownReference(reference)),
        }
    }

    fn len(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn capacity(&self) -> u64 {
        1 << self.log_size
    }
}
