//! Saturation Bit Vector
//!
//! `2^size` small fields packed into 16-bit atomic words:
//!
//! ```text
//! width 4:   word k = │ field 4k+3 │ field 4k+2 │ field 4k+1 │ field 4k │
//!                      15        12 11        8 7         4 3        0
//! ```
//!
//! The width is rounded up to a power of two so a field never straddles a
//! word. Words are grouped in 64-byte aligned blocks of 32.
//!
//! Counters saturate: incrementing a full field or decrementing an empty one
//! fails before any write, so the carry can never reach the neighbour.

use std::sync::atomic::{AtomicU16, Ordering};

use tracing::debug;

use super::config::DB_SIZE_MAX;
use super::zeroed::{zeroed_slice, Zeroable};
use crate::error::{StoreError, StoreResult};

const WORD_BITS: u32 = u16::BITS;
const WORDS_PER_BLOCK: usize = 32;

/// Widest supported field
pub const MAX_FIELD_BITS: u32 = 8;

#[repr(align(64))]
struct Block([AtomicU16; WORDS_PER_BLOCK]);

// SAFETY: a block of zeroed atomics; zero is an empty field
unsafe impl Zeroable for Block {}

/// Fixed-size array of atomic bit fields
pub struct SaturationBitVector {
    blocks: Box<[Block]>,
    width: u32,
    mask: u16,
    len: u64,
}

impl SaturationBitVector {
    /// Allocate `2^address_space_size` zeroed fields of `bits_per_field` bits
    ///
    /// # Errors
    /// - `FieldWidth`: `bits_per_field` is 0 or above [`MAX_FIELD_BITS`]
    /// - `CapacityTooLarge`: more than `2^40` fields
    pub fn new(bits_per_field: u32, address_space_size: u32) -> StoreResult<Self> {
        if bits_per_field == 0 || bits_per_field > MAX_FIELD_BITS {
            return Err(StoreError::FieldWidth {
                bits: bits_per_field,
            });
        }
        if address_space_size > DB_SIZE_MAX {
            return Err(StoreError::CapacityTooLarge {
                size_exp: address_space_size,
                max: DB_SIZE_MAX,
            });
        }
        let width = bits_per_field.next_power_of_two();
        let len = 1u64 << address_space_size;
        let words = (len * width as u64).div_ceil(WORD_BITS as u64);
        let blocks = (words as usize).div_ceil(WORDS_PER_BLOCK);
        debug!(
            bits_per_field,
            width, len, blocks, "created saturation bit vector"
        );

        Ok(Self {
            blocks: zeroed_slice(blocks),
            width,
            mask: ((1u32 << width) - 1) as u16,
            len,
        })
    }

    /// Number of fields
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Always false; the vector has at least one field
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Field width after rounding
    #[inline]
    pub fn field_bits(&self) -> u32 {
        self.width
    }

    /// Largest value a field can hold
    #[inline]
    pub fn field_max(&self) -> u16 {
        self.mask
    }

    /// Bytes held by the vector
    pub fn memory_bytes(&self) -> u64 {
        (self.blocks.len() * std::mem::size_of::<Block>()) as u64
    }

    #[inline]
    fn locate(&self, index: u64) -> StoreResult<(&AtomicU16, u32)> {
        if index >= self.len {
            return Err(StoreError::FieldOutOfRange {
                index,
                len: self.len,
            });
        }
        let bit = index * self.width as u64;
        let word = (bit / WORD_BITS as u64) as usize;
        let shift = (bit % WORD_BITS as u64) as u32;
        Ok((
            &self.blocks[word / WORDS_PER_BLOCK].0[word % WORDS_PER_BLOCK],
            shift,
        ))
    }

    #[inline]
    fn bit_mask(&self, index: u64, bit: u32) -> StoreResult<(&AtomicU16, u16)> {
        if bit >= self.width {
            return Err(StoreError::FieldIndex {
                index: bit,
                width: self.width,
            });
        }
        let (word, shift) = self.locate(index)?;
        Ok((word, 1 << (shift + bit)))
    }

    /// Value of field `index`
    pub fn get_field(&self, index: u64) -> StoreResult<u16> {
        let (word, shift) = self.locate(index)?;
        Ok((word.load(Ordering::Acquire) >> shift) & self.mask)
    }

    /// Bit `bit` of field `index`
    pub fn get_bit(&self, index: u64, bit: u32) -> StoreResult<bool> {
        let (word, mask) = self.bit_mask(index, bit)?;
        Ok(word.load(Ordering::Acquire) & mask != 0)
    }

    /// Clear bit `bit` of field `index`
    pub fn unset_bit(&self, index: u64, bit: u32) -> StoreResult<()> {
        let (word, mask) = self.bit_mask(index, bit)?;
        word.fetch_and(!mask, Ordering::AcqRel);
        Ok(())
    }

    /// Set bit `bit` of field `index`; `true` only for the call that flipped it
    pub fn try_set_bit(&self, index: u64, bit: u32) -> StoreResult<bool> {
        let (word, mask) = self.bit_mask(index, bit)?;
        let prev = word.fetch_or(mask, Ordering::AcqRel);
        Ok(prev & mask == 0)
    }

    /// Clear bit `bit` of field `index`; `true` only for the call that flipped it
    pub fn try_unset_bit(&self, index: u64, bit: u32) -> StoreResult<bool> {
        let (word, mask) = self.bit_mask(index, bit)?;
        let prev = word.fetch_and(!mask, Ordering::AcqRel);
        Ok(prev & mask != 0)
    }

    /// Increment field `index`, returning the new value
    ///
    /// # Errors
    /// - `FieldOverflow`: the field holds [`Self::field_max`]
    pub fn inc_field(&self, index: u64) -> StoreResult<u16> {
        let (word, shift) = self.locate(index)?;
        let mut current = word.load(Ordering::Acquire);
        loop {
            let field = (current >> shift) & self.mask;
            if field == self.mask {
                return Err(StoreError::FieldOverflow {
                    index,
                    max: self.mask as u32,
                });
            }
            let next = current + (1 << shift);
            match word.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Ok(field + 1),
                Err(actual) => current = actual,
            }
        }
    }

    /// Decrement field `index`, returning the new value
    ///
    /// # Errors
    /// - `FieldUnderflow`: the field is zero
    pub fn dec_field(&self, index: u64) -> StoreResult<u16> {
        let (word, shift) = self.locate(index)?;
        let mut current = word.load(Ordering::Acquire);
        loop {
            let field = (current >> shift) & self.mask;
            if field == 0 {
                return Err(StoreError::FieldUnderflow { index });
            }
            let next = current - (1 << shift);
            match word.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Ok(field - 1),
                Err(actual) => current = actual,
            }
        }
    }
}
