//! # TESSERA Grid
//!
//! Assembles tiles into a running lattice: one runtime and driver thread
//! per tile, a bounded packet link and a try-only pair lock per adjacency,
//! and a two-phase pause barrier that leaves the whole grid auditable.
//!
//! ## Shape
//!
//! - **Runtime**: the per-tile glue between lattice, element table, and
//!   protocol channels
//! - **Drivers**: one thread per tile, coordinated only through packets and
//!   per-pair locks - no global simulation lock
//! - **Barrier**: `pause()` returns only when nothing is mid-event and
//!   nothing is in flight, so `check_caches()` can demand perfection
//! - **Grid surface**: placement, census, fault injection, cache audit

pub mod config;
pub mod driver;
pub mod error;
pub mod grid;
pub mod lock;
pub mod runtime;

pub use config::GridConfig;
pub use driver::{TileDriver, TileDriverControl};
pub use error::{GridError, GridResult};
pub use grid::Grid;
pub use lock::{LockSide, LonglivedLock};
pub use runtime::{map_inbound, TileRuntime};
