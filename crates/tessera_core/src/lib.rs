//! # TESSERA Core Substrate
//!
//! Fixed-width atom encoding and deterministic primitives for the
//! cellular-automaton lattice:
//! - Millions of atoms per simulation, zero per-atom indirection
//! - Bit-addressable fields, no pointers inside lattice data
//! - Fully deterministic given a seed
//!
//! ## Architecture Rules
//!
//! 1. **Atoms are plain value data** - copyable, comparable by raw bit
//!    equality, never holding references
//! 2. **No virtual dispatch on lattice cells** - behavior polymorphism lives
//!    one level up, in the element table
//! 3. **No OS entropy in the simulation path** - all randomness is seeded
//!
//! ## Example
//!
//! ```rust,ignore
//! use tessera_core::Atom;
//!
//! let mut atom = Atom::of_type(7);
//! atom.write_state_bits(0, 16, 0xBEEF)?;
//! assert_eq!(atom.get_type(), 7);
//! ```

pub mod atom;
pub mod bits;
pub mod config;
pub mod error;
pub mod geometry;
pub mod random;

pub use atom::Atom;
pub use bits::BitVector;
pub use config::{
    ATOM_BITS, ATOM_WORDS, EMPTY_TYPE, EVENT_WINDOW_RADIUS, MAX_WINDOW_SITES, STATE_BITS,
    STATE_POS, TILE_SPAN, TILE_WIDTH, TYPE_BITS, TYPE_POS,
};
pub use error::{CoreError, CoreResult};
pub use geometry::{Dir, DirMask, Point, Symmetry};
pub use random::Random;
