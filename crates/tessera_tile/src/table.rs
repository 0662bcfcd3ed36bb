//! # Element Table
//!
//! The per-tile type -> element dispatch table. Looked up exactly once per
//! event, so it is an open-addressed hash table with linear probing and a
//! deliberately non-power-of-two capacity to avoid pathological clustering.
//!
//! Atoms carry no vtable: this table is where all behavior polymorphism
//! lives.

use std::sync::Arc;

use tracing::debug;

use tessera_core::{Point, EVENT_WINDOW_RADIUS};

use crate::element::Element;
use crate::error::{TileError, TileResult};
use crate::tile::Tile;
use crate::window::EventWindow;

/// Table capacity. Prime, and intentionally not a power of two.
pub const TABLE_CAPACITY: usize = 101;

/// Auxiliary persistent counters reserved per element (statistics, not
/// physics).
pub const AUX_COUNTERS_PER_ELEMENT: usize = 4;

struct Entry {
    type_code: u16,
    element: Arc<dyn Element>,
    events: u64,
    counter_base: usize,
}

/// Open-addressed registry mapping atom type tags to element singletons.
pub struct ElementTable {
    slots: Vec<Option<Entry>>,
    registered: usize,
    counters: Vec<i64>,
}

impl Default for ElementTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(TABLE_CAPACITY);
        slots.resize_with(TABLE_CAPACITY, || None);
        Self {
            slots,
            registered: 0,
            counters: vec![0; TABLE_CAPACITY * AUX_COUNTERS_PER_ELEMENT],
        }
    }

    #[inline]
    fn home_slot(type_code: u16) -> usize {
        // Knuth multiplicative scatter, then the prime modulus.
        (type_code as usize).wrapping_mul(0x9E37_79B1) % TABLE_CAPACITY
    }

    /// Finds the slot holding `type_code`, if registered.
    fn probe(&self, type_code: u16) -> Option<usize> {
        let home = Self::home_slot(type_code);
        for step in 0..TABLE_CAPACITY {
            let idx = (home + step) % TABLE_CAPACITY;
            match &self.slots[idx] {
                Some(entry) if entry.type_code == type_code => return Some(idx),
                Some(_) => continue,
                None => return None,
            }
        }
        None
    }

    /// Associates an element singleton with its type tag.
    ///
    /// Duplicate types and oversized window boundaries are wiring bugs; a
    /// full table is a backoff condition.
    pub fn register(&mut self, element: Arc<dyn Element>) -> TileResult<()> {
        let radius = element.window_boundary();
        if radius > EVENT_WINDOW_RADIUS {
            return Err(TileError::OversizedWindow { radius });
        }
        let type_code = element.type_code();
        if self.probe(type_code).is_some() {
            return Err(TileError::DuplicateType { type_code });
        }
        if self.registered >= TABLE_CAPACITY {
            return Err(TileError::TableFull);
        }
        let home = Self::home_slot(type_code);
        for step in 0..TABLE_CAPACITY {
            let idx = (home + step) % TABLE_CAPACITY;
            if self.slots[idx].is_none() {
                debug!(
                    type_code,
                    name = element.name(),
                    uuid = element.uuid(),
                    "registered element"
                );
                self.slots[idx] = Some(Entry {
                    type_code,
                    element,
                    events: 0,
                    counter_base: idx * AUX_COUNTERS_PER_ELEMENT,
                });
                self.registered += 1;
                return Ok(());
            }
        }
        Err(TileError::TableFull)
    }

    /// O(1) amortized hot-path dispatch lookup.
    #[must_use]
    pub fn lookup(&self, type_code: u16) -> Option<&Arc<dyn Element>> {
        self.probe(type_code)
            .and_then(|idx| self.slots[idx].as_ref())
            .map(|entry| &entry.element)
    }

    /// Number of registered elements.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.registered
    }

    /// Returns true iff no element is registered.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.registered == 0
    }

    /// Resolves the center atom's type, dispatches the owning element's
    /// behavior, and counts the event. Returns the tile-local sites the
    /// behavior wrote, so callers can propagate boundary changes.
    ///
    /// An unregistered center type is a defect: the lattice must never hold
    /// an atom no element owns.
    pub fn execute(&mut self, tile: &mut Tile, center: Point, radius: u32) -> TileResult<Vec<Point>> {
        let type_code = tile.get_atom(center)?.get_type();
        let element = {
            let Some(element) = self.lookup(type_code) else {
                return Err(TileError::UnregisteredType { type_code });
            };
            Arc::clone(element)
        };
        let mut window = EventWindow::open(tile, center, radius)?;
        element.behavior(&mut window)?;
        let dirty = window.dirty_sites().to_vec();
        drop(window);
        tile.record_event(center);
        if let Some(idx) = self.probe(type_code) {
            if let Some(entry) = self.slots[idx].as_mut() {
                entry.events += 1;
            }
        }
        Ok(dirty)
    }

    /// Events dispatched to the given type so far.
    #[must_use]
    pub fn event_count(&self, type_code: u16) -> u64 {
        self.probe(type_code)
            .and_then(|idx| self.slots[idx].as_ref())
            .map_or(0, |entry| entry.events)
    }

    /// Reads one of an element's auxiliary counters.
    #[must_use]
    pub fn counter(&self, type_code: u16, which: usize) -> Option<i64> {
        if which >= AUX_COUNTERS_PER_ELEMENT {
            return None;
        }
        let idx = self.probe(type_code)?;
        let entry = self.slots[idx].as_ref()?;
        Some(self.counters[entry.counter_base + which])
    }

    /// Adjusts one of an element's auxiliary counters.
    pub fn add_to_counter(&mut self, type_code: u16, which: usize, delta: i64) -> bool {
        if which >= AUX_COUNTERS_PER_ELEMENT {
            return false;
        }
        let Some(idx) = self.probe(type_code) else {
            return false;
        };
        let Some(entry) = self.slots[idx].as_ref() else {
            return false;
        };
        self.counters[entry.counter_base + which] += delta;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Empty;
    use crate::error::TileError;
    use tessera_core::{Atom, EVENT_WINDOW_RADIUS, TILE_SPAN};

    struct Inert {
        type_code: u16,
    }

    impl Element for Inert {
        fn type_code(&self) -> u16 {
            self.type_code
        }
        fn name(&self) -> &str {
            "Inert"
        }
        fn uuid(&self) -> u64 {
            0x1E47 + u64::from(self.type_code)
        }
        fn behavior(&self, _window: &mut EventWindow<'_>) -> TileResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut table = ElementTable::new();
        table.register(Arc::new(Empty)).unwrap();
        table.register(Arc::new(Inert { type_code: 5 })).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup(0).unwrap().name(), "Empty");
        assert_eq!(table.lookup(5).unwrap().name(), "Inert");
        assert!(table.lookup(6).is_none());
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let mut table = ElementTable::new();
        table.register(Arc::new(Inert { type_code: 9 })).unwrap();
        assert_eq!(
            table.register(Arc::new(Inert { type_code: 9 })).unwrap_err(),
            TileError::DuplicateType { type_code: 9 }
        );
        assert_eq!(table.len(), 1);
    }

    struct WideEyed;

    impl Element for WideEyed {
        fn type_code(&self) -> u16 {
            77
        }
        fn name(&self) -> &str {
            "WideEyed"
        }
        fn uuid(&self) -> u64 {
            0x71DE
        }
        fn window_boundary(&self) -> u32 {
            EVENT_WINDOW_RADIUS + 1
        }
        fn behavior(&self, _window: &mut EventWindow<'_>) -> TileResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_oversized_window_boundary_rejected_at_registration() {
        // An element claiming a window wider than the cache ring would lock
        // sites no neighbor mirrors; it must never make it into the table.
        let mut table = ElementTable::new();
        assert_eq!(
            table.register(Arc::new(WideEyed)).unwrap_err(),
            TileError::OversizedWindow {
                radius: EVENT_WINDOW_RADIUS + 1
            }
        );
        assert!(table.lookup(77).is_none());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_colliding_types_both_found() {
        // All distinct types must be found even when they probe-collide.
        let mut table = ElementTable::new();
        for t in 0..32u16 {
            table.register(Arc::new(Inert { type_code: t })).unwrap();
        }
        for t in 0..32u16 {
            assert_eq!(table.lookup(t).unwrap().type_code(), t);
        }
        assert!(table.lookup(32).is_none());
    }

    #[test]
    fn test_table_full_is_backoff_not_crash() {
        let mut table = ElementTable::new();
        for t in 0..TABLE_CAPACITY as u16 {
            table.register(Arc::new(Inert { type_code: t })).unwrap();
        }
        assert_eq!(
            table
                .register(Arc::new(Inert {
                    type_code: TABLE_CAPACITY as u16,
                }))
                .unwrap_err(),
            TileError::TableFull
        );
    }

    #[test]
    fn test_execute_dispatches_and_counts() {
        let mut table = ElementTable::new();
        table.register(Arc::new(Empty)).unwrap();
        let mut tile = crate::tile::Tile::new(1);
        let mid = tessera_core::Point::new(TILE_SPAN as i32 / 2, TILE_SPAN as i32 / 2);
        table.execute(&mut tile, mid, EVENT_WINDOW_RADIUS).unwrap();
        table.execute(&mut tile, mid, EVENT_WINDOW_RADIUS).unwrap();
        assert_eq!(table.event_count(0), 2);
        assert_eq!(tile.events_executed(), 2);
        assert_eq!(tile.site_event_count(mid).unwrap(), 2);
    }

    #[test]
    fn test_unregistered_type_is_a_defect() {
        let mut table = ElementTable::new();
        table.register(Arc::new(Empty)).unwrap();
        let mut tile = crate::tile::Tile::new(2);
        let mid = tessera_core::Point::new(TILE_SPAN as i32 / 2, TILE_SPAN as i32 / 2);
        tile.set_atom(mid, Atom::of_type(0x666)).unwrap();
        assert_eq!(
            table.execute(&mut tile, mid, EVENT_WINDOW_RADIUS).unwrap_err(),
            TileError::UnregisteredType { type_code: 0x666 }
        );
        // The failed dispatch did not count as an event.
        assert_eq!(tile.events_executed(), 0);
    }

    #[test]
    fn test_aux_counters() {
        let mut table = ElementTable::new();
        table.register(Arc::new(Empty)).unwrap();
        assert_eq!(table.counter(0, 0), Some(0));
        assert!(table.add_to_counter(0, 0, 3));
        assert!(table.add_to_counter(0, 0, -1));
        assert_eq!(table.counter(0, 0), Some(2));
        // Out-of-range counter index and unknown types are refusals.
        assert!(!table.add_to_counter(0, AUX_COUNTERS_PER_ELEMENT, 1));
        assert!(!table.add_to_counter(42, 0, 1));
        assert_eq!(table.counter(42, 0), None);
    }
}
