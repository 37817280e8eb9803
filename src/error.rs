//! Error types for the cortical framework.
//!
//! This module provides a unified error type for all operations in the
//! cortical crate, using the `thiserror` crate for ergonomic error handling.
//!
//! Every variant is a programmer error: a misconfigured layer, an input that
//! violates a documented precondition, or a call made out of sequence. None
//! of them are recoverable conditions of the algorithm itself (an empty
//! inhibition winner set or a skipped learning cell is normal operation and
//! never surfaces here).

use thiserror::Error;

/// The main error type for cortical operations.
#[derive(Error, Debug)]
pub enum CorticalError {
    /// Invalid layer configuration (unset input dimensions, non-positive
    /// dimension, permanence outside [0, 1], and similar).
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A feed-forward or distal bit index is outside its source width.
    #[error("Bit index out of range: bit {bit}, source width {width}")]
    BitOutOfRange {
        /// The offending bit index
        bit: usize,
        /// The valid source width
        width: usize,
    },

    /// `stable_ff_bits` contained a bit that is not in `ff_bits`.
    #[error("Stable bit {bit} is not a member of the feed-forward bits")]
    StableBitNotSubset {
        /// The offending bit index
        bit: usize,
    },

    /// Two segment updates in one `bulk_learn` batch named the same target.
    #[error("Duplicate segment target {target:?} in bulk learn batch")]
    DuplicateTarget {
        /// The duplicated segment path
        target: (usize, usize, usize),
    },

    /// A segment update tried to grow a source that already exists on the
    /// target segment.
    #[error("Grow source {bit} already present on segment {target:?}")]
    GrowSourcePresent {
        /// The target segment path
        target: (usize, usize, usize),
        /// The offending source bit
        bit: usize,
    },

    /// A segment update tried to remove a source that does not exist on the
    /// target segment.
    #[error("Die source {bit} missing from segment {target:?}")]
    DieSourceMissing {
        /// The target segment path
        target: (usize, usize, usize),
        /// The offending source bit
        bit: usize,
    },

    /// `learn` or `depolarise` was called before the first `activate`.
    #[error("Layer has not been activated yet - call activate() before {op}()")]
    NotActivated {
        /// The operation that was attempted
        op: &'static str,
    },
}

/// A specialized `Result` type for cortical operations.
pub type Result<T> = std::result::Result<T, CorticalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CorticalError::BitOutOfRange { bit: 120, width: 64 };
        assert_eq!(
            err.to_string(),
            "Bit index out of range: bit 120, source width 64"
        );

        let err = CorticalError::NotActivated { op: "learn" };
        assert_eq!(
            err.to_string(),
            "Layer has not been activated yet - call activate() before learn()"
        );

        let err = CorticalError::DuplicateTarget { target: (3, 1, 0) };
        assert_eq!(
            err.to_string(),
            "Duplicate segment target (3, 1, 0) in bulk learn batch"
        );
    }

    #[test]
    fn test_result_type() {
        fn returns_result() -> Result<usize> {
            Ok(42)
        }

        assert_eq!(returns_result().unwrap(), 42);
    }
}
