//! # Core Error Types
//!
//! Contract violations in the encoding layer. These indicate a bug in an
//! element or in core wiring, never a runtime condition to negotiate: callers
//! fail fast on them.

use thiserror::Error;

/// Errors that can occur in the atom/bit-field encoding layer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreError {
    /// Requested a field width outside the supported 1..=32 range.
    #[error("illegal bit field width: {width}")]
    IllegalBitWidth {
        /// The offending width.
        width: u32,
    },

    /// Requested a bit range that does not fit in the vector.
    #[error("bit range out of bounds: pos {pos} width {width} capacity {capacity}")]
    IllegalBitRange {
        /// Starting bit position.
        pos: u32,
        /// Field width.
        width: u32,
        /// Total bits available.
        capacity: u32,
    },

    /// The value does not fit in the field; truncation is never silent.
    #[error("value {value:#x} too wide for {width}-bit field")]
    ValueTooWide {
        /// The value that was rejected.
        value: u32,
        /// Field width.
        width: u32,
    },

    /// Hex string has the wrong length for this vector.
    #[error("bad hex length: expected {expected} digits, got {actual}")]
    BadHexLength {
        /// Required digit count.
        expected: usize,
        /// Supplied digit count.
        actual: usize,
    },

    /// Hex string contains a non-hex character.
    #[error("bad hex digit at index {index}")]
    BadHexDigit {
        /// Index of the offending character.
        index: usize,
    },
}

/// Result type for encoding operations.
pub type CoreResult<T> = Result<T, CoreError>;
