//! # Deadline Queue
//!
//! A logical-clock timer queue driving channel announcements and circuit
//! timeouts. Ticks are advanced by the owning driver loop, so the protocol
//! machinery stays deterministic under test.

/// A queue of `(deadline, item)` pairs against a monotonically advancing
/// logical clock.
#[derive(Clone, Debug)]
pub struct TimerQueue<T> {
    now: u64,
    entries: Vec<(u64, T)>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerQueue<T> {
    /// Creates an empty queue at tick zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            now: 0,
            entries: Vec::new(),
        }
    }

    /// The current logical tick.
    #[inline]
    #[must_use]
    pub const fn now(&self) -> u64 {
        self.now
    }

    /// Schedules `item` to expire `delay` ticks from now.
    pub fn schedule(&mut self, delay: u64, item: T) {
        self.entries.push((self.now.saturating_add(delay), item));
    }

    /// Advances the clock by `ticks`.
    pub fn advance(&mut self, ticks: u64) {
        self.now = self.now.saturating_add(ticks);
    }

    /// Removes and returns one expired item, if any.
    pub fn pop_expired(&mut self) -> Option<T> {
        let position = self
            .entries
            .iter()
            .position(|(deadline, _)| *deadline <= self.now)?;
        Some(self.entries.swap_remove(position).1)
    }

    /// Cancels every pending entry matching the predicate.
    pub fn cancel_where<F: FnMut(&T) -> bool>(&mut self, mut predicate: F) {
        self.entries.retain(|(_, item)| !predicate(item));
    }

    /// Drops every pending entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns true iff nothing is pending.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.entries.is_empty()
    }
}
