//! Lock-free Tree Compression State Store
//!
//! # Overview
//!
//! `treedbs` stores the fixed-length `i32` state vectors of a model checker.
//! Each vector is folded into a binary tree whose internal nodes are
//! hash-consed in shared lock-free tables, so states that share parts share
//! storage, and every distinct vector gets one stable [`TreeRef`].
//!
//! Alongside the store sits a [`SaturationBitVector`] for per-state search
//! flags and small counters.
//!
//! # Guarantees
//!
//! - Distinct vectors get distinct references
//! - Concurrent folds of one vector agree on its reference, and exactly one
//!   of them reports `seen == false`
//! - `unfold(fold(v)) == v`
//! - References never change for the lifetime of the store
//!
//! # Usage
//!
//! ```rust
//! use treedbs::{StoreConfig, Tree, TreeDbs};
//!
//! let dbs = TreeDbs::new(StoreConfig::new(4).with_size_exp(10)).unwrap();
//!
//! let mut prev = Tree::new(4);
//! let mut next = Tree::new(4);
//! assert_eq!(dbs.fold_tree(&[1, 2, 3, 4], &mut prev).unwrap().reference.as_u64(), 0);
//!
//! // only the right half of the tree changes
//! let folded = dbs.fold_incremental(&[1, 2, 3, 5], &prev, &mut next).unwrap();
//! assert!(!folded.seen);
//! assert_eq!(folded.reference.as_u64(), 1);
//! ```
//!
//! # Feature Flags
//!
//! None. Kani harnesses build under `cfg(kani)`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod domain;
pub mod error;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Re-export Primary Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

// Store types
pub use domain::{DependencyMatrix, Folded, StoreConfig, Tree, TreeDbs, TreeRef};

// Statistics
pub use domain::Stats;

// Bit vector
pub use domain::SaturationBitVector;

// Errors
pub use error::{StoreError, StoreResult, TableKind};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
