//! # Packed Bit Storage
//!
//! Fixed-width bit vector with typed-field accessors. Bit 0 is the most
//! significant bit of word 0, so hex dumps read left to right in bit order.
//!
//! ## Design
//!
//! - Backed by a plain `[u32; W]`, no heap, no pointers
//! - Every access is range-checked; illegal offsets and over-wide values are
//!   errors, never silent truncation
//! - Fields up to 32 bits wide may straddle a word boundary

use crate::error::{CoreError, CoreResult};

/// Packed big-endian-ordered bit storage over `W` 32-bit words.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitVector<const W: usize> {
    words: [u32; W],
}

impl<const W: usize> BitVector<W> {
    /// Total number of bits stored.
    pub const CAPACITY: u32 = (W as u32) * 32;

    /// Creates a zeroed bit vector.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self { words: [0u32; W] }
    }

    /// Creates a bit vector from raw words.
    #[inline]
    #[must_use]
    pub const fn from_words(words: [u32; W]) -> Self {
        Self { words }
    }

    /// Returns the raw backing words.
    #[inline]
    #[must_use]
    pub const fn into_words(self) -> [u32; W] {
        self.words
    }

    /// Mask covering the low `width` bits. `width` must be 1..=32.
    #[inline]
    const fn mask(width: u32) -> u32 {
        if width >= 32 {
            u32::MAX
        } else {
            (1u32 << width) - 1
        }
    }

    fn check_range(pos: u32, width: u32) -> CoreResult<()> {
        if width == 0 || width > 32 {
            return Err(CoreError::IllegalBitWidth { width });
        }
        if pos.saturating_add(width) > Self::CAPACITY {
            return Err(CoreError::IllegalBitRange {
                pos,
                width,
                capacity: Self::CAPACITY,
            });
        }
        Ok(())
    }

    /// Reads the `width`-bit field starting at bit `pos`.
    pub fn read(&self, pos: u32, width: u32) -> CoreResult<u32> {
        Self::check_range(pos, width)?;
        let idx = (pos >> 5) as usize;
        let start = pos & 31;
        let end = start + width;
        if end <= 32 {
            Ok((self.words[idx] >> (32 - end)) & Self::mask(width))
        } else {
            // Field straddles a word boundary.
            let hi_width = 32 - start;
            let lo_width = end - 32;
            let hi = self.words[idx] & Self::mask(hi_width);
            let lo = self.words[idx + 1] >> (32 - lo_width);
            Ok((hi << lo_width) | lo)
        }
    }

    /// Writes `value` into the `width`-bit field starting at bit `pos`.
    ///
    /// Fails if `value` does not fit in the field.
    pub fn write(&mut self, pos: u32, width: u32, value: u32) -> CoreResult<()> {
        Self::check_range(pos, width)?;
        if value & !Self::mask(width) != 0 {
            return Err(CoreError::ValueTooWide { value, width });
        }
        let idx = (pos >> 5) as usize;
        let start = pos & 31;
        let end = start + width;
        if end <= 32 {
            let shift = 32 - end;
            let mask = Self::mask(width) << shift;
            self.words[idx] = (self.words[idx] & !mask) | (value << shift);
        } else {
            let hi_width = 32 - start;
            let lo_width = end - 32;
            let hi = value >> lo_width;
            let lo = value & Self::mask(lo_width);
            self.words[idx] = (self.words[idx] & !Self::mask(hi_width)) | hi;
            let lo_shift = 32 - lo_width;
            let mask = Self::mask(lo_width) << lo_shift;
            self.words[idx + 1] = (self.words[idx + 1] & !mask) | (lo << lo_shift);
        }
        Ok(())
    }

    /// Renders the full vector as uppercase hex, most significant word first.
    #[must_use]
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(W * 8);
        for word in &self.words {
            use std::fmt::Write;
            // Writing into a String cannot fail.
            let _ = write!(out, "{word:08X}");
        }
        out
    }

    /// Parses a hex string produced by [`Self::to_hex`].
    ///
    /// The input must be exactly `W * 8` hex digits; anything else is an
    /// error, not a truncation or zero-extension.
    pub fn from_hex(hex: &str) -> CoreResult<Self> {
        let expected = W * 8;
        if hex.len() != expected {
            return Err(CoreError::BadHexLength {
                expected,
                actual: hex.len(),
            });
        }
        let mut words = [0u32; W];
        for (w, chunk) in hex.as_bytes().chunks_exact(8).enumerate() {
            let mut value = 0u32;
            for (i, &byte) in chunk.iter().enumerate() {
                let digit = (byte as char).to_digit(16).ok_or(CoreError::BadHexDigit {
                    index: w * 8 + i,
                })?;
                value = (value << 4) | digit;
            }
            words[w] = value;
        }
        Ok(Self { words })
    }
}
