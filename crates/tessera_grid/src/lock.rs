//! # Long-Lived Pair Locks
//!
//! One lock per adjacent tile pair. Acquisition is strictly try-only: a tile
//! that cannot get every lock it needs abandons the event and retries on a
//! later cycle, so no acquisition order exists to deadlock on.

use std::sync::atomic::{AtomicU8, Ordering};

/// Which endpoint of a pair is asking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum LockSide {
    /// The tile with the lower grid index.
    A = 1,
    /// The tile with the higher grid index.
    B = 2,
}

impl LockSide {
    /// The other endpoint.
    #[inline]
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

const UNHELD: u8 = 0;

/// A try-only mutual-exclusion word shared by one adjacent tile pair.
#[derive(Debug, Default)]
pub struct LonglivedLock {
    owner: AtomicU8,
}

impl LonglivedLock {
    /// Creates an unheld lock.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            owner: AtomicU8::new(UNHELD),
        }
    }

    /// Attempts to take the lock for `side`. Never blocks.
    ///
    /// Re-acquisition by the current holder succeeds and is a no-op.
    #[must_use]
    pub fn try_acquire(&self, side: LockSide) -> bool {
        self.owner
            .compare_exchange(UNHELD, side as u8, Ordering::Acquire, Ordering::Relaxed)
            .map_or_else(|current| current == side as u8, |_| true)
    }

    /// Releases the lock if `side` holds it.
    pub fn release(&self, side: LockSide) {
        let _ = self.owner.compare_exchange(
            side as u8,
            UNHELD,
            Ordering::Release,
            Ordering::Relaxed,
        );
    }

    /// The current holder, if any.
    #[must_use]
    pub fn owner(&self) -> Option<LockSide> {
        match self.owner.load(Ordering::Acquire) {
            1 => Some(LockSide::A),
            2 => Some(LockSide::B),
            _ => None,
        }
    }

    /// True iff no side holds the lock.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.owner.load(Ordering::Acquire) == UNHELD
    }
}
