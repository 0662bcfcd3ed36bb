//! # Grid Errors
//!
//! Contract violations at the grid surface. Protocol desync never appears
//! here: channels recover by resetting themselves.

use thiserror::Error;

use tessera_core::Point;
use tessera_itc::ItcError;
use tessera_tile::TileError;

/// Errors surfaced by the grid API.
#[derive(Error, Debug)]
pub enum GridError {
    /// The grid point lies outside the assembled lattice.
    #[error("point {point:?} is outside the grid")]
    OutOfGrid {
        /// The offending grid-global point.
        point: Point,
    },

    /// Grid dimensions must be at least 1x1.
    #[error("bad grid dimensions {width}x{height}")]
    BadDimensions {
        /// Requested width in tiles.
        width: u32,
        /// Requested height in tiles.
        height: u32,
    },

    /// No tile exists at the given tile coordinates.
    #[error("no tile at ({x}, {y})")]
    NoSuchTile {
        /// Tile column.
        x: u32,
        /// Tile row.
        y: u32,
    },

    /// The operation requires the grid to be paused.
    #[error("grid is running; pause first")]
    NotPaused,

    /// The operation requires driver threads, but none were started.
    #[error("grid drivers are not running")]
    NotStarted,

    /// The pause barrier did not quiesce within its patience window.
    #[error("barrier timed out waiting for {waiting_on}")]
    BarrierTimeout {
        /// What the barrier was still waiting for.
        waiting_on: &'static str,
    },

    /// A lattice-level failure.
    #[error(transparent)]
    Tile(#[from] TileError),

    /// A protocol-level usage failure.
    #[error(transparent)]
    Itc(#[from] ItcError),

    /// The configuration file did not parse.
    #[error("bad configuration: {0}")]
    Config(#[from] toml::de::Error),
}

/// Convenience alias for grid results.
pub type GridResult<T> = Result<T, GridError>;
