//! # TESSERA Tile Engine
//!
//! The independently-scheduled owner of one lattice region. A tile owns a
//! `TILE_WIDTH²` interior plus a cache ring of width `EVENT_WINDOW_RADIUS`
//! mirroring its neighbors' boundaries, and executes events strictly one at a
//! time against that lattice.
//!
//! ## Architecture Rules
//!
//! 1. **One event window at a time** - intra-tile safety by construction, no
//!    per-site locks
//! 2. **The cache ring is read-mostly** - only protocol-applied updates may
//!    write it, never this tile's own events
//! 3. **Dispatch is table-driven** - atoms carry a type tag, elements carry
//!    the behavior; the hot path is one O(1) table lookup per event

pub mod element;
pub mod error;
pub mod site;
pub mod table;
pub mod tile;
pub mod window;

pub use element::{Element, Empty};
pub use error::{TileError, TileResult};
pub use site::Site;
pub use table::ElementTable;
pub use tile::{neighbor_local, Region, RunState, Tile};
pub use window::EventWindow;
