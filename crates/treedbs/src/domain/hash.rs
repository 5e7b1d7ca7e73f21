//! Hash Functions for the Node Tables
//!
//! - `mix64`: general purpose 64-bit mix seeding every probe sequence
//! - `prime_rehash`: jump to another cache line by an odd prime stride
//! - `scramble`: bijection on `bits`-wide keys used by the compact root table

/// Words of 8 bytes per 64-byte cache line
pub(crate) const CACHE_LINE_WORDS: usize = 8;

/// log2 of [`CACHE_LINE_WORDS`]
pub(crate) const CACHE_LINE_SHIFT: u32 = 3;

/// Mask selecting the cache line of a slot index
pub(crate) const CL_MASK: u64 = !(CACHE_LINE_WORDS as u64 - 1);

const PRIME_MASK: u64 = 63;

/// Odd primes used as rehash strides (in cache lines)
const ODD_PRIMES: [u64; 64] = [
    3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59,
    61, 67, 71, 73, 79, 83, 89, 97, 101, 103, 107, 109, 113, 127, 131, 137,
    139, 149, 151, 157, 163, 167, 173, 179, 181, 191, 193, 197, 199, 211, 223, 227,
    229, 233, 239, 241, 251, 257, 263, 269, 271, 277, 281, 283, 293, 307, 311, 313,
];

/// Thomas Wang's 64-bit integer mix
#[inline]
pub fn mix64(key: u64) -> u64 {
    let mut key = (!key).wrapping_add(key << 21);
    key ^= ((key as i64) >> 24) as u64;
    key = key.wrapping_add(key << 3).wrapping_add(key << 8);
    key ^= ((key as i64) >> 14) as u64;
    key = key.wrapping_add(key << 2).wrapping_add(key << 4);
    key ^= ((key as i64) >> 28) as u64;
    key.wrapping_add(key << 31)
}

/// Move `hash` to a different cache line, keeping its offset within the line
///
/// `seed` (the initial hash) picks the prime, so every key follows its own
/// fixed sequence of lines.
#[inline]
pub(crate) fn prime_rehash(hash: u64, seed: u64) -> u64 {
    let offset = hash.wrapping_add(1) & !CL_MASK;
    let prime = ODD_PRIMES[(seed & PRIME_MASK) as usize];
    (hash & CL_MASK)
        .wrapping_add(prime << CACHE_LINE_SHIFT)
        .wrapping_add(offset)
}

#[inline(always)]
pub(crate) const fn low_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Bijective mix of a `bits`-wide key (`1 <= bits <= 64`)
///
/// Multiplication by an odd constant and a right xor-shift are both
/// invertible modulo `2^bits`, so distinct keys stay distinct.
#[inline]
pub fn scramble(key: u64, bits: u32) -> u64 {
    let mask = low_mask(bits);
    let shift = (bits + 1) / 2;
    let mut x = key & mask;
    x = x.wrapping_mul(0x9E37_79B9_7F4A_7C15) & mask;
    x ^= x >> shift;
    x = x.wrapping_mul(0xC2B2_AE3D_27D4_EB4F) & mask;
    x ^= x >> shift;
    x
}
