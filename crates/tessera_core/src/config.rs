//! # Substrate Configuration
//!
//! The single compile-time configuration bundle shared by every crate in the
//! workspace. All sizing constants live here so that a configuration change
//! is one edit, not a scavenger hunt.

/// Event window radius, in Manhattan distance.
///
/// Also the width of each tile's cache ring: a window is never allowed to
/// reach further than the cache mirrors, so the two are the same constant.
pub const EVENT_WINDOW_RADIUS: u32 = 2;

/// Width of a tile's owned (authoritative) region, in sites.
pub const TILE_WIDTH: u32 = 16;

/// Full allocated tile span: owned region plus the cache ring on each side.
pub const TILE_SPAN: u32 = TILE_WIDTH + 2 * EVENT_WINDOW_RADIUS;

/// Total bit width of one atom. Identical for every atom in a configuration.
pub const ATOM_BITS: u32 = 96;

/// Number of 32-bit words backing one atom.
pub const ATOM_WORDS: usize = (ATOM_BITS / 32) as usize;

/// Bit position of the type field inside an atom.
pub const TYPE_POS: u32 = 0;

/// Width of the type field.
pub const TYPE_BITS: u32 = 16;

/// Bit position of the first state bit.
pub const STATE_POS: u32 = TYPE_POS + TYPE_BITS;

/// Number of element-specific state bits in an atom.
pub const STATE_BITS: u32 = ATOM_BITS - TYPE_BITS;

/// The canonical empty type. Every lattice starts filled with it.
pub const EMPTY_TYPE: u16 = 0;

/// Number of sites inside one event window (Manhattan disc of radius R).
pub const MAX_WINDOW_SITES: usize =
    (2 * EVENT_WINDOW_RADIUS * (EVENT_WINDOW_RADIUS + 1) + 1) as usize;
