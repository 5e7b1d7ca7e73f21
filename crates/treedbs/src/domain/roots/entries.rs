//! Per-reference Entry Words
//!
//! One `AtomicU64` per dense reference:
//!
//! ```text
//!  63        48+w 48                                  0
//! ┌─────────┬─────┬─────────────────────────────────────┐
//! │ unused  │ sat │ root slot + 1 (0 = not yet public)  │
//! └─────────┴─────┴─────────────────────────────────────┘
//! ```
//!
//! The slot half is written once when the reference is published; the
//! satellite half is mutated with `fetch_or` / `fetch_and` / CAS loops that
//! always carry the slot half along unchanged.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::hash::low_mask;
use crate::domain::types::TreeRef;
use crate::domain::zeroed::zeroed_slice;
use crate::error::{StoreError, StoreResult};

const SLOT_BITS: u32 = 48;
const SLOT_MASK: u64 = (1 << SLOT_BITS) - 1;
const SAT_SHIFT: u32 = SLOT_BITS;

/// Entry words of an indexed root table
pub struct RootEntries {
    words: Box<[AtomicU64]>,
    sat_bits: u32,
}

impl RootEntries {
    pub(crate) fn new(len: usize, sat_bits: u32) -> Self {
        Self {
            words: zeroed_slice(len),
            sat_bits,
        }
    }

    /// Configured satellite width
    #[inline]
    pub fn sat_bits(&self) -> u32 {
        self.sat_bits
    }

    /// Largest satellite value
    #[inline]
    pub fn sat_max(&self) -> u32 {
        low_mask(self.sat_bits) as u32
    }

    pub(crate) fn publish(&self, reference: usize, slot: usize) {
        self.words[reference].store(slot as u64 + 1, Ordering::Release);
    }

    pub(crate) fn slot(&self, reference: TreeRef) -> Option<usize> {
        let word = self.words.get(reference.as_usize())?;
        match word.load(Ordering::Acquire) & SLOT_MASK {
            0 => None,
            slot => Some(slot as usize - 1),
        }
    }

    #[inline]
    fn word(&self, reference: TreeRef) -> StoreResult<&AtomicU64> {
        match self.words.get(reference.as_usize()) {
            Some(word) if word.load(Ordering::Acquire) & SLOT_MASK != 0 => Ok(word),
            _ => Err(StoreError::UnknownReference(reference)),
        }
    }

    #[inline]
    fn bit(&self, index: u32) -> StoreResult<u64> {
        if index >= self.sat_bits {
            return Err(StoreError::SatelliteIndex {
                index,
                bits: self.sat_bits,
            });
        }
        Ok(1 << (SAT_SHIFT + index))
    }

    #[inline(always)]
    fn sat_of(&self, word: u64) -> u64 {
        (word >> SAT_SHIFT) & low_mask(self.sat_bits)
    }

    #[inline(always)]
    fn with_sat(&self, word: u64, sat: u64) -> u64 {
        let mask = low_mask(self.sat_bits) << SAT_SHIFT;
        (word & !mask) | (sat << SAT_SHIFT)
    }

    /// Whole satellite word of `reference`
    pub fn get_bits(&self, reference: TreeRef) -> StoreResult<u32> {
        let word = self.word(reference)?.load(Ordering::Acquire);
        Ok(self.sat_of(word) as u32)
    }

    /// Overwrite the satellite word of `reference`
    pub fn set_bits(&self, reference: TreeRef, value: u32) -> StoreResult<()> {
        if value > self.sat_max() {
            return Err(StoreError::SatelliteValue {
                value: value as u64,
                bits: self.sat_bits,
            });
        }
        let word = self.word(reference)?;
        let mut current = word.load(Ordering::Acquire);
        loop {
            let next = self.with_sat(current, value as u64);
            match word.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Test one satellite bit
    pub fn get_bit(&self, reference: TreeRef, index: u32) -> StoreResult<bool> {
        let bit = self.bit(index)?;
        Ok(self.word(reference)?.load(Ordering::Acquire) & bit != 0)
    }

    /// Clear one satellite bit unconditionally
    pub fn unset_bit(&self, reference: TreeRef, index: u32) -> StoreResult<()> {
        let bit = self.bit(index)?;
        let word = self.word(reference)?;
        if word.load(Ordering::Acquire) & bit != 0 {
            word.fetch_and(!bit, Ordering::AcqRel);
        }
        Ok(())
    }

    /// Set one satellite bit; `true` only for the call that flipped it
    pub fn try_set_bit(&self, reference: TreeRef, index: u32) -> StoreResult<bool> {
        let bit = self.bit(index)?;
        let word = self.word(reference)?;
        if word.load(Ordering::Acquire) & bit != 0 {
            return Ok(false);
        }
        let prev = word.fetch_or(bit, Ordering::AcqRel);
        Ok(prev & bit == 0)
    }

    /// Clear one satellite bit; `true` only for the call that flipped it
    pub fn try_unset_bit(&self, reference: TreeRef, index: u32) -> StoreResult<bool> {
        let bit = self.bit(index)?;
        let word = self.word(reference)?;
        if word.load(Ordering::Acquire) & bit == 0 {
            return Ok(false);
        }
        let prev = word.fetch_and(!bit, Ordering::AcqRel);
        Ok(prev & bit != 0)
    }

    /// Replace the `bits`-wide sub-field at `offset` if it equals `expected`
    ///
    /// Single CAS attempt: `false` when the field differs or the word changed
    /// concurrently.
    pub fn compare_set_bits(
        &self,
        reference: TreeRef,
        bits: u32,
        offset: u32,
        expected: u32,
        value: u32,
    ) -> StoreResult<bool> {
        if bits == 0 || offset + bits > self.sat_bits {
            return Err(StoreError::SatelliteIndex {
                index: offset + bits,
                bits: self.sat_bits,
            });
        }
        let field = low_mask(bits);
        if value as u64 > field || expected as u64 > field {
            return Err(StoreError::SatelliteValue {
                value: value.max(expected) as u64,
                bits,
            });
        }
        let word = self.word(reference)?;
        let current = word.load(Ordering::Acquire);
        let sat = self.sat_of(current);
        let mask = field << offset;
        if sat & mask != (expected as u64) << offset {
            return Ok(false);
        }
        let next = self.with_sat(current, (sat & !mask) | ((value as u64) << offset));
        Ok(word
            .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok())
    }

    /// Increment the satellite counter, returning the new value
    ///
    /// # Errors
    /// - `SatelliteOverflow`: the counter already holds its maximum
    pub fn inc(&self, reference: TreeRef) -> StoreResult<u32> {
        let word = self.word(reference)?;
        let mut current = word.load(Ordering::Acquire);
        loop {
            let sat = self.sat_of(current);
            if sat >= self.sat_max() as u64 {
                return Err(StoreError::SatelliteOverflow {
                    reference,
                    max: self.sat_max(),
                });
            }
            let next = self.with_sat(current, sat + 1);
            match word.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Ok(sat as u32 + 1),
                Err(actual) => current = actual,
            }
        }
    }

    /// Decrement the satellite counter, returning the new value
    ///
    /// # Errors
    /// - `SatelliteUnderflow`: the counter is zero
    pub fn dec(&self, reference: TreeRef) -> StoreResult<u32> {
        let word = self.word(reference)?;
        let mut current = word.load(Ordering::Acquire);
        loop {
            let sat = self.sat_of(current);
            if sat == 0 {
                return Err(StoreError::SatelliteUnderflow { reference });
            }
            let next = self.with_sat(current, sat - 1);
            match word.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Ok(sat as u32 - 1),
                Err(actual) => current = actual,
            }
        }
    }
}
