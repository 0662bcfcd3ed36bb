//! # Atom
//!
//! The fixed-width bit-blob representing one lattice cell's full contents.
//!
//! ## Zero-Indirection Design
//!
//! Atoms are `Pod`: plain value data with no pointers and no vtable. Behavior
//! polymorphism is resolved one level up, through the element table, so the
//! millions of atoms in a lattice pay no per-instance dispatch tax.
//!
//! ## Layout
//!
//! ```text
//! bit 0                16                                              96
//!   ┌──────────────────┬───────────────────────────────────────────────┐
//!   │  type (16 bits)  │           element state (80 bits)             │
//!   └──────────────────┴───────────────────────────────────────────────┘
//! ```

use bytemuck::{Pod, Zeroable};

use crate::bits::BitVector;
use crate::config::{ATOM_WORDS, STATE_BITS, STATE_POS, TYPE_BITS, TYPE_POS};
use crate::error::{CoreError, CoreResult};

/// One lattice cell's contents. Fixed width, pointer-free, bitwise-comparable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Atom {
    words: [u32; ATOM_WORDS],
}

impl Atom {
    /// Size of one atom on the wire, in bytes.
    pub const SIZE: usize = ATOM_WORDS * 4;

    /// The canonical empty atom: type 0, all state bits clear.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            words: [0u32; ATOM_WORDS],
        }
    }

    /// Creates a default atom of the given type with all state bits clear.
    #[inline]
    #[must_use]
    pub fn of_type(type_code: u16) -> Self {
        let mut atom = Self::empty();
        atom.set_type(type_code);
        atom
    }

    #[inline]
    fn bits(&self) -> BitVector<ATOM_WORDS> {
        BitVector::from_words(self.words)
    }

    /// Reads the type tag.
    #[inline]
    #[must_use]
    pub fn get_type(&self) -> u16 {
        // The type field position and width are compile-time valid.
        let value = self.bits().read(TYPE_POS, TYPE_BITS).unwrap_or(0);
        value as u16
    }

    /// Returns true iff this atom carries the given type tag.
    #[inline]
    #[must_use]
    pub fn is_type(&self, type_code: u16) -> bool {
        self.get_type() == type_code
    }

    /// Overwrites the type tag, leaving all state bits untouched.
    #[inline]
    pub fn set_type(&mut self, type_code: u16) {
        let mut bits = self.bits();
        // A u16 always fits the 16-bit type field.
        let _ = bits.write(TYPE_POS, TYPE_BITS, u32::from(type_code));
        self.words = bits.into_words();
    }

    /// Reads `width` state bits starting at state-relative position `pos`.
    ///
    /// State positions are relative to the start of the state region; reaching
    /// into the type field or past the end of the atom is an error.
    pub fn read_state_bits(&self, pos: u32, width: u32) -> CoreResult<u32> {
        Self::check_state_range(pos, width)?;
        self.bits().read(STATE_POS + pos, width)
    }

    /// Writes `value` into `width` state bits at state-relative position `pos`.
    pub fn write_state_bits(&mut self, pos: u32, width: u32, value: u32) -> CoreResult<()> {
        Self::check_state_range(pos, width)?;
        let mut bits = self.bits();
        bits.write(STATE_POS + pos, width, value)?;
        self.words = bits.into_words();
        Ok(())
    }

    fn check_state_range(pos: u32, width: u32) -> CoreResult<()> {
        if width == 0 || width > 32 {
            return Err(CoreError::IllegalBitWidth { width });
        }
        if pos.saturating_add(width) > STATE_BITS {
            return Err(CoreError::IllegalBitRange {
                pos,
                width,
                capacity: STATE_BITS,
            });
        }
        Ok(())
    }

    /// Flips one bit anywhere in the atom, type field included.
    ///
    /// Used by xray (bit-corruption) sweeps; ordinary element code should go
    /// through the state-bit accessors instead.
    pub fn flip_bit(&mut self, pos: u32) -> CoreResult<()> {
        let mut bits = self.bits();
        let current = bits.read(pos, 1)?;
        bits.write(pos, 1, current ^ 1)?;
        self.words = bits.into_words();
        Ok(())
    }

    /// Renders the full atom as hex.
    #[inline]
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.bits().to_hex()
    }

    /// Parses an atom from hex produced by [`Self::to_hex`].
    pub fn from_hex(hex: &str) -> CoreResult<Self> {
        Ok(Self {
            words: BitVector::<ATOM_WORDS>::from_hex(hex)?.into_words(),
        })
    }
}
