//! Formal Verification Harnesses
//!
//! These Kani proofs cover the pure arithmetic the lock-free tables rely on:
//! 1. Node keys split back into the children they were packed from, and only
//!    raw `i32::MIN` leaf pairs hit the reserved key
//! 2. The root key scramble never maps two keys to one bucket address
//! 3. Bit vector fields never straddle a 16-bit word
//! 4. Compact bucket words never collide with EMPTY

#![cfg(kani)]

use super::config::MAX_DATA_LOG;
use super::hash::{low_mask, scramble};
use super::node_table::RESERVED_KEY;
use super::roots::compact::{MAX_DISPLACEMENT, REM_BITS};
use super::types::{pack_u64, unpack_u64};

/// Verify that `unpack_u64` inverts `pack_u64`, including negative children
#[kani::proof]
fn verify_pack_unpack_inverse() {
    let lo: i32 = kani::any();
    let hi: i32 = kani::any();
    let (a, b) = unpack_u64(pack_u64(lo, hi));
    assert_eq!(a, lo);
    assert_eq!(b, hi);
}

/// Verify that only two `i32::MIN` children produce the reserved key
#[kani::proof]
fn verify_reserved_key_needs_min_children() {
    let lo: i32 = kani::any();
    let hi: i32 = kani::any();
    if pack_u64(lo, hi) == RESERVED_KEY {
        assert!(lo == i32::MIN && hi == i32::MIN);
    }
}

/// Verify that data table slots can never form the reserved key
#[kani::proof]
fn verify_slots_avoid_reserved_key() {
    let a: u64 = kani::any();
    let b: u64 = kani::any();
    kani::assume(a < 1 << MAX_DATA_LOG && b < 1 << MAX_DATA_LOG);
    assert_ne!(pack_u64(a as u32 as i32, b as u32 as i32), RESERVED_KEY);
}

/// Verify that the scramble is injective for a small key width
///
/// Injectivity on every width follows from the same two invertible steps;
/// 12 bits keeps the solver fast.
#[kani::proof]
fn verify_scramble_injective() {
    const BITS: u32 = 12;
    let a: u64 = kani::any();
    let b: u64 = kani::any();
    kani::assume(a <= low_mask(BITS) && b <= low_mask(BITS));
    kani::assume(a != b);
    assert_ne!(scramble(a, BITS), scramble(b, BITS));
}

/// Verify that a scrambled key stays inside its width
#[kani::proof]
fn verify_scramble_stays_in_width() {
    let bits: u32 = kani::any();
    kani::assume(bits >= 1 && bits <= 64);
    let key: u64 = kani::any();
    assert!(scramble(key, bits) <= low_mask(bits));
}

/// Verify bit vector field addressing for every power-of-two width
#[kani::proof]
fn verify_field_within_word() {
    let log_width: u32 = kani::any();
    kani::assume(log_width <= 3);
    let width = 1u64 << log_width;
    let index: u64 = kani::any();
    kani::assume(index < 1 << 40);

    let bit = index * width;
    let shift = bit % 16;
    assert!(shift + width <= 16);
}

/// Verify that every occupied compact bucket is non-zero and decodes back
#[kani::proof]
fn verify_bucket_word_round_trip() {
    let disp: u32 = kani::any();
    let rem: u32 = kani::any();
    kani::assume(disp <= MAX_DISPLACEMENT);
    kani::assume(rem < 1 << REM_BITS);

    let word = ((disp + 1) << REM_BITS) | rem;
    assert_ne!(word, 0);
    assert_eq!((word >> REM_BITS) - 1, disp);
    assert_eq!(word & ((1 << REM_BITS) - 1), rem);
}
