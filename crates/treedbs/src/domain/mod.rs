//! Domain Layer
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Domain Layer                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  Store Module                  Roots Module                 │
//! │  ├─ TreeDbs                    ├─ RootBackend (trait)       │
//! │  ├─ fold / find / unfold       ├─ IndexedRoots (default)    │
//! │  └─ satellite accessors        └─ CompactRoots (slim)       │
//! │                                                             │
//! │  NodeTable                     Projection                   │
//! │  └─ insert-or-find on u64      └─ DependencyMatrix          │
//! │                                                             │
//! │  SaturationBitVector           Scratch (thread-local)       │
//! │  └─ packed atomic fields       └─ fold workspace + Stats    │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything below `TreeDbs` is shared through `&self`: the tables are
//! arrays of atomics and never block. Per-thread state lives in the scratch
//! module only.
//!
//! ```rust
//! use treedbs::domain::{StoreConfig, TreeDbs};
//!
//! let dbs = TreeDbs::new(StoreConfig::new(4).with_size_exp(10)).unwrap();
//! let first = dbs.fold(&[1, 2, 3, 4]).unwrap();
//! assert!(!first.seen);
//! assert!(dbs.fold(&[1, 2, 3, 4]).unwrap().seen);
//!
//! let mut out = [0; 4];
//! dbs.unfold(first.reference, &mut out).unwrap();
//! assert_eq!(out, [1, 2, 3, 4]);
//! ```

pub mod bitvector;
pub mod config;
pub mod hash;
pub mod node_table;
pub mod projection;
pub mod roots;
pub mod scratch;
pub mod store;
pub mod types;
mod zeroed;

#[cfg(kani)]
mod proofs;

// Re-export store types
pub use store::TreeDbs;

pub use config::{StoreConfig, DB_SIZE_MAX, DEFAULT_SIZE_EXP, MAX_SATELLITE_BITS};

pub use types::{pack_u64, unpack_u64, Folded, Lookup, Tree, TreeRef};

pub use projection::DependencyMatrix;

pub use roots::{CompactRoots, IndexedRoots, RootBackend, Roots};

pub use scratch::{ProbeStats, Stats};

pub use bitvector::{SaturationBitVector, MAX_FIELD_BITS};

pub use hash::{mix64, scramble};
