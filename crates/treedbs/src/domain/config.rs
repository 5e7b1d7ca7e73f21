//! Store Configuration
//!
//! All parameters are fixed at construction. The root table has
//! `2^size_exp` slots, the data table `2^(size_exp - ratio)`.

use serde::{Deserialize, Serialize};

use super::roots::compact::{MAX_DISPLACEMENT, REM_BITS};
use crate::error::{StoreError, StoreResult};

/// Hard maximum of `size_exp`
pub const DB_SIZE_MAX: u32 = 40;

/// Default log2 root capacity
pub const DEFAULT_SIZE_EXP: u32 = 26;

/// Maximum satellite width in bits
pub const MAX_SATELLITE_BITS: u32 = 3;

/// Data table slots must stay non-negative in a 32-bit tree cell
pub const MAX_DATA_LOG: u32 = 31;

/// Smallest table: one cache line
pub const MIN_TABLE_LOG: u32 = 3;

/// Smallest compact root table (room for its overflow area)
pub const MIN_SLIM_LOG: u32 = 8;

/// Construction parameters of a tree store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Number of slots per vector
    pub vector_len: usize,

    /// log2 of the root table capacity
    pub size_exp: u32,

    /// log2 of root capacity / data capacity
    pub ratio: u32,

    /// Satellite bits per reference
    pub satellite_bits: u32,

    /// Use the compact root table instead of the indexed one
    pub slim: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            vector_len: 2,
            size_exp: DEFAULT_SIZE_EXP,
            ratio: 2,
            satellite_bits: 0,
            slim: false,
        }
    }
}

impl StoreConfig {
    /// Default configuration for vectors of length `vector_len`
    pub fn new(vector_len: usize) -> Self {
        Self {
            vector_len,
            ..Self::default()
        }
    }

    /// Set the log2 root capacity
    pub fn with_size_exp(mut self, size_exp: u32) -> Self {
        self.size_exp = size_exp;
        self
    }

    /// Set the log2 root/data ratio
    pub fn with_ratio(mut self, ratio: u32) -> Self {
        self.ratio = ratio;
        self
    }

    /// Set the satellite width
    pub fn with_satellite_bits(mut self, bits: u32) -> Self {
        self.satellite_bits = bits;
        self
    }

    /// Select the compact root table
    pub fn with_slim(mut self, slim: bool) -> Self {
        self.slim = slim;
        self
    }

    /// log2 of the root table capacity
    #[inline]
    pub fn root_log(&self) -> u32 {
        self.size_exp
    }

    /// log2 of the data table capacity
    #[inline]
    pub fn data_log(&self) -> u32 {
        self.size_exp.saturating_sub(self.ratio)
    }

    /// Bytes a store with this configuration allocates for its tables
    ///
    /// Indexed roots keep a key, a back-pointer and an entry word per slot;
    /// compact roots one 32-bit bucket plus the overflow area.
    ///
    /// Tables are allocated zeroed, so pages are only committed once a probe
    /// first touches them.
    pub fn memory_bytes(&self) -> u64 {
        let root_slots = 1u64 << self.root_log();
        let roots = if self.slim {
            (root_slots + MAX_DISPLACEMENT as u64 + 1) * 4
        } else {
            root_slots * 3 * 8
        };
        roots + (1u64 << self.data_log()) * 8
    }

    /// Check every construction precondition
    ///
    /// # Errors
    /// - `VectorTooSmall`: fewer than two slots
    /// - `CapacityTooLarge`: `size_exp` above [`DB_SIZE_MAX`]
    /// - `SatelliteWidth`: more than [`MAX_SATELLITE_BITS`]
    /// - `InvalidConfig`: table geometry or slim constraints violated
    pub fn validate(&self) -> StoreResult<()> {
        if self.vector_len < 2 {
            return Err(StoreError::VectorTooSmall {
                len: self.vector_len,
            });
        }
        if self.size_exp > DB_SIZE_MAX {
            return Err(StoreError::CapacityTooLarge {
                size_exp: self.size_exp,
                max: DB_SIZE_MAX,
            });
        }
        if self.satellite_bits > MAX_SATELLITE_BITS {
            return Err(StoreError::SatelliteWidth {
                bits: self.satellite_bits,
                max: MAX_SATELLITE_BITS,
            });
        }
        if self.ratio > self.size_exp || self.data_log() < MIN_TABLE_LOG {
            return Err(StoreError::InvalidConfig(format!(
                "data table 2^({} - {}) smaller than a cache line",
                self.size_exp, self.ratio
            )));
        }
        if self.data_log() > MAX_DATA_LOG {
            return Err(StoreError::InvalidConfig(format!(
                "data table 2^{} exceeds 2^{}, raise the ratio",
                self.data_log(),
                MAX_DATA_LOG
            )));
        }
        if self.slim {
            self.validate_slim()?;
        }
        Ok(())
    }

    fn validate_slim(&self) -> StoreResult<()> {
        if self.satellite_bits > 0 {
            return Err(StoreError::InvalidConfig(
                "slim root table has no satellite bits".to_string(),
            ));
        }
        if self.vector_len < 4 {
            return Err(StoreError::InvalidConfig(format!(
                "slim root table needs vectors of at least 4 slots, got {}",
                self.vector_len
            )));
        }
        if self.root_log() < MIN_SLIM_LOG {
            return Err(StoreError::InvalidConfig(format!(
                "slim root table too small: 2^{} (minimum 2^{})",
                self.root_log(),
                MIN_SLIM_LOG
            )));
        }
        let key_bits = 2 * self.data_log();
        if key_bits > self.root_log() + REM_BITS {
            return Err(StoreError::InvalidConfig(format!(
                "slim root keys of {} bits do not fit 2^{} buckets, raise the ratio",
                key_bits,
                self.root_log()
            )));
        }
        Ok(())
    }
}
