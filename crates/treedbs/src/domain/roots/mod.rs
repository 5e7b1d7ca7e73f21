//! Root Table Backends
//!
//! # Architecture
//!
//! ```text
//! TreeDbs
//!   └─ roots: Roots
//!        ├─ Indexed(IndexedRoots)   dense references + satellite bits (default)
//!        └─ Compact(CompactRoots)   32-bit quotient buckets (slim)
//! ```
//!
//! Both backends memoize the top node of every folded vector. They differ in
//! what a reference is: `IndexedRoots` hands out dense references in
//! insertion order, `CompactRoots` returns the packed root key itself and
//! trades the satellite storage for half the memory per root.

pub mod compact;
pub mod entries;
pub mod indexed;

pub use compact::CompactRoots;
pub use entries::RootEntries;
pub use indexed::IndexedRoots;

use super::config::StoreConfig;
use super::scratch::ProbeStats;
use super::types::{Lookup, TreeRef};
use crate::error::StoreResult;

/// Storage for the top node of each folded vector
pub trait RootBackend: Send + Sync {
    /// Find the root key, inserting it when `insert` is set
    ///
    /// # Errors
    /// - `TableFull`: no room left on the key's probe sequence
    fn find_or_put(
        &self,
        key: u64,
        insert: bool,
        stats: &mut ProbeStats,
    ) -> StoreResult<Lookup<TreeRef>>;

    /// Root key of a reference returned earlier
    ///
    /// # Errors
    /// - `UnknownReference`: the reference is not resident
    fn key_of(&self, reference: TreeRef) -> StoreResult<u64>;

    /// Number of resident roots
    fn len(&self) -> u64;

    /// Slots the backend was created with
    fn capacity(&self) -> u64;

    /// Per-reference satellite words, if the backend keeps any
    fn entries(&self) -> Option<&RootEntries> {
        None
    }
}

/// The root backend selected by [`StoreConfig::slim`]
pub enum Roots {
    /// Default backend
    Indexed(IndexedRoots),
    /// Slim backend
    Compact(CompactRoots),
}

impl Roots {
    /// Allocate the backend described by a validated configuration
    pub fn new(config: &StoreConfig) -> Self {
        if config.slim {
            Roots::Compact(CompactRoots::new(config.root_log(), config.data_log()))
        } else {
            Roots::Indexed(IndexedRoots::new(config.root_log(), config.satellite_bits))
        }
    }

    /// View as a trait object
    #[inline(always)]
    pub fn backend(&self) -> &dyn RootBackend {
        match self {
            Roots::Indexed(roots) => roots,
            Roots::Compact(roots) => roots,
        }
    }
}
