//! # Site
//!
//! One lattice cell inside a tile: exactly one atom plus per-site metadata.
//! Whether a site is owned or cache is a property of its coordinates, so the
//! site itself only carries the atom and bookkeeping.

use tessera_core::Atom;

/// One lattice cell: an atom plus auxiliary per-site metadata.
#[derive(Clone, Copy, Debug, Default)]
pub struct Site {
    atom: Atom,
    events: u32,
}

impl Site {
    /// Creates an empty site.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            atom: Atom::empty(),
            events: 0,
        }
    }

    /// Returns the atom stored here.
    #[inline]
    #[must_use]
    pub const fn atom(&self) -> Atom {
        self.atom
    }

    /// Overwrites the atom stored here.
    #[inline]
    pub fn set_atom(&mut self, atom: Atom) {
        self.atom = atom;
    }

    /// Number of events that have been centered on this site.
    #[inline]
    #[must_use]
    pub const fn event_count(&self) -> u32 {
        self.events
    }

    /// Records one event centered on this site.
    #[inline]
    pub fn record_event(&mut self) {
        self.events = self.events.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::Atom;

    #[test]
    fn test_site_starts_empty() {
        let site = Site::new();
        assert_eq!(site.atom(), Atom::empty());
        assert_eq!(site.event_count(), 0);
    }

    #[test]
    fn test_site_stores_atom_by_value() {
        let mut site = Site::new();
        let mut atom = Atom::of_type(9);
        site.set_atom(atom);
        // Mutating the local copy must not affect the stored value.
        atom.set_type(10);
        assert_eq!(site.atom().get_type(), 9);
    }

    #[test]
    fn test_event_count_saturates() {
        let mut site = Site::new();
        site.record_event();
        site.record_event();
        assert_eq!(site.event_count(), 2);
    }
}
