//! Store Error Types
//!
//! Every failure of the store is unrecoverable at this layer: a full table
//! can only be avoided by creating the store with more capacity, and misuse is
//! a caller bug. Contention on a CAS is never an error, only latency.
//!
//! "Not found" is not an error either: find-only lookups return `Ok(None)`.

use std::fmt;

use crate::domain::types::TreeRef;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Table Identity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which of the two node tables ran out of space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    /// Table holding the top node of every folded vector
    Roots,
    /// Shared table holding all other internal nodes
    Data,
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKind::Roots => write!(f, "root"),
            TableKind::Data => write!(f, "data"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store Error Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Errors raised by the tree store and the saturation bit vector
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Capacity Errors
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// The probe sequence of an insert exhausted its rehash budget
    #[error("{table} table full ({capacity} slots)")]
    TableFull {
        /// Table that overflowed
        table: TableKind,
        /// Number of slots the table was created with
        capacity: u64,
    },

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Configuration Errors
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Vectors must have at least two slots to form a tree
    #[error("tree vectors too small: {len} (minimum 2)")]
    VectorTooSmall {
        /// Requested vector length
        len: usize,
    },

    /// Requested table exceeds the hard size limit
    #[error("tree too large: 2^{size_exp} exceeds 2^{max}")]
    CapacityTooLarge {
        /// Requested log2 root capacity
        size_exp: u32,
        /// Hard maximum
        max: u32,
    },

    /// Satellite words are limited to a few bits
    #[error("too many satellite bits: {bits} (maximum {max})")]
    SatelliteWidth {
        /// Requested width
        bits: u32,
        /// Maximum width
        max: u32,
    },

    /// Any other inconsistent combination of construction parameters
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),

    /// Dependency matrix does not match the vector length
    #[error("dependency matrix has {actual} columns, store vectors have {expected} slots")]
    MatrixShape {
        /// Vector length of the store
        expected: usize,
        /// Columns of the matrix
        actual: usize,
    },

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Fold / Unfold Errors
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Vector or tree length does not match the store
    #[error("vector length mismatch: expected {expected}, got {actual}")]
    VectorLength {
        /// Vector length of the store
        expected: usize,
        /// Length that was passed in
        actual: usize,
    },

    /// The one node key that collides with the EMPTY sentinel
    #[error("node key {key:#018x} is reserved and cannot be stored")]
    ReservedKey {
        /// Offending key
        key: u64,
    },

    /// Reference was never returned by this store
    #[error("unknown tree reference: {0}")]
    UnknownReference(TreeRef),

    /// Transition group outside the projected dependency matrix
    #[error("unknown transition group {group} ({groups} groups projected)")]
    UnknownGroup {
        /// Requested group
        group: usize,
        /// Number of projected groups
        groups: usize,
    },

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Satellite Errors
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Store has no satellite storage (slim roots or zero satellite bits)
    #[error("satellite bits unavailable for this store")]
    SatelliteUnavailable,

    /// Bit index outside the configured satellite width
    #[error("satellite bit {index} out of range (width {bits})")]
    SatelliteIndex {
        /// Requested bit
        index: u32,
        /// Configured width
        bits: u32,
    },

    /// Value does not fit the configured satellite width
    #[error("satellite value {value} does not fit in {bits} bits")]
    SatelliteValue {
        /// Value that was passed in
        value: u64,
        /// Available bits
        bits: u32,
    },

    /// Increment would carry out of the satellite word
    #[error("too many satellite increments on {reference} (max {max})")]
    SatelliteOverflow {
        /// Reference whose counter is saturated
        reference: TreeRef,
        /// Largest representable counter
        max: u32,
    },

    /// Decrement below zero
    #[error("too many satellite decrements on {reference}")]
    SatelliteUnderflow {
        /// Reference whose counter is zero
        reference: TreeRef,
    },

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Bit Vector Errors
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Field width must round up to fewer than 16 bits
    #[error("too many bits per field: {bits} (maximum 8)")]
    FieldWidth {
        /// Requested width
        bits: u32,
    },

    /// Bit index outside the field
    #[error("field bit {index} out of range (width {width})")]
    FieldIndex {
        /// Requested bit
        index: u32,
        /// Field width
        width: u32,
    },

    /// Field address outside the vector
    #[error("field {index} out of range ({len} fields)")]
    FieldOutOfRange {
        /// Requested field
        index: u64,
        /// Number of fields
        len: u64,
    },

    /// Increment would spill into the neighbouring field
    #[error("field {index} saturated (max {max})")]
    FieldOverflow {
        /// Saturated field
        index: u64,
        /// Largest representable value
        max: u32,
    },

    /// Decrement below zero
    #[error("field {index} already zero")]
    FieldUnderflow {
        /// Empty field
        index: u64,
    },
}

impl StoreError {
    /// Check if the error is a capacity exhaustion
    pub fn is_capacity_error(&self) -> bool {
        matches!(self, StoreError::TableFull { .. })
    }

    /// Check if the error is a violated precondition (caller bug)
    pub fn is_misuse(&self) -> bool {
        !self.is_capacity_error()
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_classification() {
        let full = StoreError::TableFull {
            table: TableKind::Data,
            capacity: 256,
        };
        assert!(full.is_capacity_error());
        assert!(!full.is_misuse());

        let misuse = StoreError::VectorLength {
            expected: 4,
            actual: 3,
        };
        assert!(misuse.is_misuse());
        assert!(!misuse.is_capacity_error());
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::TableFull {
            table: TableKind::Roots,
            capacity: 1024,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("root table full"));
        assert!(msg.contains("1024"));

        let err = StoreError::SatelliteOverflow {
            reference: TreeRef::new(7),
            max: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("ref(7)"));
        assert!(msg.contains("3"));
    }
}
