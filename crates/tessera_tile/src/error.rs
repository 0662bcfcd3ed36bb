//! # Tile Error Types
//!
//! Contract violations and backoff conditions in the tile layer. Contract
//! violations indicate element or wiring bugs; backoff conditions (table
//! full) tell the caller "not this cycle", not "crash".

use tessera_core::{CoreError, Point};
use thiserror::Error;

/// Errors that can occur while executing events against a tile.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileError {
    /// Offset is outside the event window's radius.
    #[error("offset {offset:?} outside event window")]
    OutOfWindow {
        /// The rejected window offset.
        offset: Point,
    },

    /// Local coordinate is outside the tile's allocated span.
    #[error("coordinate {coord:?} outside tile span")]
    OutOfBounds {
        /// The rejected local coordinate.
        coord: Point,
    },

    /// The mapped site is not live (disconnected or unsynchronized cache).
    #[error("site {coord:?} is not live")]
    DeadSite {
        /// The dead local coordinate.
        coord: Point,
    },

    /// A second event window was opened against the same tile.
    #[error("event window already open")]
    WindowAlreadyOpen,

    /// A window radius wider than the cache ring was requested or declared.
    #[error("window radius {radius} exceeds the cache ring width")]
    OversizedWindow {
        /// The rejected radius.
        radius: u32,
    },

    /// The lattice contains an atom whose type has no owning element.
    #[error("no element registered for type {type_code:#06x}")]
    UnregisteredType {
        /// The orphaned type tag.
        type_code: u16,
    },

    /// Two elements claimed the same type value.
    #[error("type {type_code:#06x} already registered")]
    DuplicateType {
        /// The contested type tag.
        type_code: u16,
    },

    /// The element table has no free slot; caller must back off.
    #[error("element table full")]
    TableFull,

    /// Bit-level encoding failure bubbled up from an element's accessors.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for tile operations.
pub type TileResult<T> = Result<T, TileError>;
