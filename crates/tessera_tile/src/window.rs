//! # Event Window
//!
//! The bounded view an element gets for the lifetime of one event. Every read
//! and write an element performs goes through here: offsets are range-checked
//! against the window radius, composed with the window's point symmetry, then
//! translated to tile-local coordinates and checked for liveness.
//!
//! ## Single-Writer Invariant
//!
//! A window holds the tile exclusively for one event. The tile additionally
//! tracks an open-window flag so tests can instrument the "at most one window
//! at a time" invariant directly.

use tessera_core::{Atom, Point, Symmetry, EVENT_WINDOW_RADIUS, MAX_WINDOW_SITES};

use crate::error::{TileError, TileResult};
use crate::tile::Tile;

/// An ephemeral, bounded, symmetry-aware view into one tile's lattice.
pub struct EventWindow<'t> {
    tile: &'t mut Tile,
    center: Point,
    radius: u32,
    symmetry: Symmetry,
    dirty: [Point; MAX_WINDOW_SITES],
    dirty_len: usize,
}

impl<'t> EventWindow<'t> {
    /// Opens a window of the given effective radius centered at an owned
    /// local coordinate.
    ///
    /// Fails if the center is not an owned site, the radius is wider than
    /// the cache ring, or another window is open.
    pub fn open(tile: &'t mut Tile, center: Point, radius: u32) -> TileResult<Self> {
        if !Tile::is_owned(center) {
            return Err(TileError::OutOfBounds { coord: center });
        }
        // Wider than the ring means sites no neighbor mirrors and more
        // distinct writes than the dirty list can hold.
        if radius > EVENT_WINDOW_RADIUS {
            return Err(TileError::OversizedWindow { radius });
        }
        tile.begin_window()?;
        Ok(Self {
            tile,
            center,
            radius,
            symmetry: Symmetry::R000,
            dirty: [Point::ZERO; MAX_WINDOW_SITES],
            dirty_len: 0,
        })
    }

    /// The window's center, in tile-local coordinates.
    #[inline]
    #[must_use]
    pub const fn center(&self) -> Point {
        self.center
    }

    /// The window's effective radius.
    #[inline]
    #[must_use]
    pub const fn radius(&self) -> u32 {
        self.radius
    }

    /// The current point symmetry applied to relative accesses.
    #[inline]
    #[must_use]
    pub const fn symmetry(&self) -> Symmetry {
        self.symmetry
    }

    /// Requests that all subsequent relative accesses be rotated/reflected.
    ///
    /// Elements use this to implement oriented growth once instead of eight
    /// times. Symmetry is a relabeling: it never changes the window's shape.
    #[inline]
    pub fn set_symmetry(&mut self, symmetry: Symmetry) {
        self.symmetry = symmetry;
    }

    /// Returns true iff `offset` lies within the window.
    ///
    /// Ignores symmetry by design: symmetry relabels sites, the shape stays
    /// a Manhattan disc.
    #[inline]
    #[must_use]
    pub fn in_window(&self, offset: Point) -> bool {
        offset.manhattan_length() <= self.radius
    }

    /// Maps a window offset to a live tile-local coordinate.
    fn map(&self, offset: Point) -> TileResult<Point> {
        if !self.in_window(offset) {
            return Err(TileError::OutOfWindow { offset });
        }
        let local = self.center + self.symmetry.apply(offset);
        if !self.tile.is_live(local) {
            return Err(TileError::DeadSite { coord: local });
        }
        Ok(local)
    }

    /// Reads the atom at a window offset.
    pub fn get_relative(&self, offset: Point) -> TileResult<Atom> {
        let local = self.map(offset)?;
        self.tile.get_atom(local)
    }

    /// Writes the atom at a window offset.
    pub fn set_relative(&mut self, offset: Point, atom: Atom) -> TileResult<()> {
        let local = self.map(offset)?;
        self.tile.set_atom(local, atom)?;
        self.mark_dirty(local);
        Ok(())
    }

    /// Reads the center atom. The center is always owned, hence always live.
    pub fn center_atom(&self) -> TileResult<Atom> {
        self.get_relative(Point::ZERO)
    }

    /// Overwrites the center atom.
    pub fn set_center_atom(&mut self, atom: Atom) -> TileResult<()> {
        self.set_relative(Point::ZERO, atom)
    }

    /// Exchanges the atoms at two window offsets.
    ///
    /// Atomic within the single-threaded context of one event: both sites are
    /// validated before either is touched.
    pub fn swap(&mut self, a: Point, b: Point) -> TileResult<()> {
        let la = self.map(a)?;
        let lb = self.map(b)?;
        if la == lb {
            return Ok(());
        }
        let atom_a = self.tile.get_atom(la)?;
        let atom_b = self.tile.get_atom(lb)?;
        self.tile.set_atom(la, atom_b)?;
        self.tile.set_atom(lb, atom_a)?;
        self.mark_dirty(la);
        self.mark_dirty(lb);
        Ok(())
    }

    fn mark_dirty(&mut self, local: Point) {
        if self.dirty[..self.dirty_len].contains(&local) {
            return;
        }
        // A window can touch at most MAX_WINDOW_SITES distinct sites.
        self.dirty[self.dirty_len] = local;
        self.dirty_len += 1;
    }

    /// Tile-local coordinates written during this event, deduplicated.
    ///
    /// The boundary runtime uses this to propagate visible-region writes to
    /// neighbors' caches and cache-region writes to the neighbor's
    /// authoritative sites.
    #[must_use]
    pub fn dirty_sites(&self) -> &[Point] {
        &self.dirty[..self.dirty_len]
    }
}

impl Drop for EventWindow<'_> {
    fn drop(&mut self) {
        self.tile.end_window();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{Dir, EVENT_WINDOW_RADIUS, TILE_SPAN};

    const R: i32 = EVENT_WINDOW_RADIUS as i32;
    const MID: Point = Point::new(TILE_SPAN as i32 / 2, TILE_SPAN as i32 / 2);

    #[test]
    fn test_bounds_enforced() {
        let mut tile = Tile::new(1);
        let window = EventWindow::open(&mut tile, MID, EVENT_WINDOW_RADIUS).unwrap();
        // Every offset beyond the Manhattan radius fails.
        for x in -(R + 1)..=(R + 1) {
            for y in -(R + 1)..=(R + 1) {
                let offset = Point::new(x, y);
                let result = window.get_relative(offset);
                if offset.manhattan_length() > EVENT_WINDOW_RADIUS {
                    assert_eq!(result, Err(TileError::OutOfWindow { offset }));
                } else {
                    assert!(result.is_ok());
                }
            }
        }
    }

    #[test]
    fn test_write_then_read_back() {
        let mut tile = Tile::new(2);
        let mut window = EventWindow::open(&mut tile, MID, EVENT_WINDOW_RADIUS).unwrap();
        let atom = Atom::of_type(0x42);
        let offset = Point::new(1, -1);
        window.set_relative(offset, atom).unwrap();
        assert_eq!(window.get_relative(offset).unwrap(), atom);
        assert_eq!(window.dirty_sites().len(), 1);
    }

    #[test]
    fn test_symmetry_relabels_accesses() {
        let mut tile = Tile::new(3);
        let mut window = EventWindow::open(&mut tile, MID, EVENT_WINDOW_RADIUS).unwrap();
        let atom = Atom::of_type(7);
        window.set_symmetry(Symmetry::R180);
        window.set_relative(Point::new(1, 0), atom).unwrap();
        // Under the half-turn, offset (1,0) is the raw site at center + (-1,0).
        window.set_symmetry(Symmetry::R000);
        assert_eq!(window.get_relative(Point::new(-1, 0)).unwrap(), atom);
        assert_eq!(window.get_relative(Point::new(1, 0)).unwrap(), Atom::empty());
    }

    #[test]
    fn test_symmetry_does_not_change_shape() {
        let mut tile = Tile::new(4);
        let mut window = EventWindow::open(&mut tile, MID, EVENT_WINDOW_RADIUS).unwrap();
        let edge = Point::new(R, 0);
        for sym in Symmetry::ALL {
            window.set_symmetry(sym);
            assert!(window.in_window(edge));
            assert!(window.get_relative(edge).is_ok());
            assert!(!window.in_window(Point::new(R, 1)));
        }
    }

    #[test]
    fn test_swap() {
        let mut tile = Tile::new(5);
        let a = Atom::of_type(1);
        let b = Atom::of_type(2);
        let mut window = EventWindow::open(&mut tile, MID, EVENT_WINDOW_RADIUS).unwrap();
        window.set_relative(Point::new(0, 0), a).unwrap();
        window.set_relative(Point::new(0, 1), b).unwrap();
        window.swap(Point::new(0, 0), Point::new(0, 1)).unwrap();
        assert_eq!(window.center_atom().unwrap(), b);
        assert_eq!(window.get_relative(Point::new(0, 1)).unwrap(), a);
        // Swapping a site with itself is a no-op, not an error.
        window.swap(Point::new(0, 1), Point::new(0, 1)).unwrap();
        assert_eq!(window.get_relative(Point::new(0, 1)).unwrap(), a);
    }

    #[test]
    fn test_dead_cache_site_fails() {
        let mut tile = Tile::new(6);
        // Center against the owned west edge so the window reaches the ring.
        let center = Point::new(R, TILE_SPAN as i32 / 2);
        let window = EventWindow::open(&mut tile, center, EVENT_WINDOW_RADIUS).unwrap();
        let into_cache = Point::new(-R, 0);
        assert!(matches!(
            window.get_relative(into_cache),
            Err(TileError::DeadSite { .. })
        ));
        drop(window);
        // Once the west channel is open the same access succeeds.
        tile.set_neighbor_present(Dir::West, true);
        tile.set_cache_live(Dir::West, true);
        let window = EventWindow::open(&mut tile, center, EVENT_WINDOW_RADIUS).unwrap();
        assert!(window.get_relative(into_cache).is_ok());
    }

    #[test]
    fn test_single_window_invariant() {
        let mut tile = Tile::new(7);
        assert!(!tile.window_is_open());
        {
            let _window = EventWindow::open(&mut tile, MID, EVENT_WINDOW_RADIUS).unwrap();
        }
        // Window closed on drop; a new one may open.
        assert!(!tile.window_is_open());
        let window = EventWindow::open(&mut tile, MID, EVENT_WINDOW_RADIUS).unwrap();
        assert!(window.tile.window_is_open());
    }

    #[test]
    fn test_oversized_radius_rejected() {
        let mut tile = Tile::new(9);
        assert!(matches!(
            EventWindow::open(&mut tile, MID, EVENT_WINDOW_RADIUS + 1),
            Err(TileError::OversizedWindow { radius }) if radius == EVENT_WINDOW_RADIUS + 1
        ));
        // The failed open left no window latched.
        assert!(!tile.window_is_open());
        assert!(EventWindow::open(&mut tile, MID, EVENT_WINDOW_RADIUS).is_ok());
    }

    #[test]
    fn test_center_must_be_owned() {
        let mut tile = Tile::new(8);
        assert!(matches!(
            EventWindow::open(&mut tile, Point::new(0, 0), EVENT_WINDOW_RADIUS),
            Err(TileError::OutOfBounds { .. })
        ));
        // The far corner of the cache ring is equally rejected.
        let corner = Point::new(TILE_SPAN as i32 - 1, TILE_SPAN as i32 - 1);
        assert!(EventWindow::open(&mut tile, corner, EVENT_WINDOW_RADIUS).is_err());
    }
}
