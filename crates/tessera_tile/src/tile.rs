//! # Tile
//!
//! The independently-scheduled owner of one lattice region.
//!
//! ## Local Coordinates
//!
//! Local coordinates cover the full allocated span, cache ring included:
//!
//! ```text
//!        0      R              R+W     SPAN
//!      0 ┌──────┬───────────────┬──────┐
//!        │      │     cache     │      │
//!      R ├──────┼───────────────┼──────┤
//!        │      │▒▒▒ visible ▒▒▒│      │
//!        │cache │▒┌───────────┐▒│cache │
//!        │      │▒│  hidden   │▒│      │
//!        │      │▒└───────────┘▒│      │
//!    R+W ├──────┼───────────────┼──────┤
//!        │      │     cache     │      │
//!   SPAN └──────┴───────────────┴──────┘
//! ```
//!
//! The owned region `[R, R+W)²` is this tile's exclusively-held data. The
//! visible band (owned sites within R of the owned edge) is mirrored into
//! neighbors' caches; the cache ring mirrors neighbors' visible bands and is
//! written only by protocol-applied updates, never by this tile's own events.

use tessera_core::{
    Atom, Dir, DirMask, Point, Random, EVENT_WINDOW_RADIUS, TILE_SPAN, TILE_WIDTH,
};

use crate::error::{TileError, TileResult};
use crate::site::Site;

const R: i32 = EVENT_WINDOW_RADIUS as i32;
const W: i32 = TILE_WIDTH as i32;
const SPAN: i32 = TILE_SPAN as i32;

/// Classification of one local coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Region {
    /// Owned interior, invisible to every neighbor.
    Hidden,
    /// Owned boundary band, mirrored by at least one neighbor.
    Visible,
    /// Shadow of a neighbor's visible band.
    Cache,
}

/// Tile run state. Transitions are requested by the grid and honored by the
/// tile's own driver at a safe point, never mid-event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    /// Not running events, not servicing the boundary protocol.
    Off,
    /// Servicing inbound protocol traffic only; no events, no timers.
    Passive,
    /// Running events.
    Active,
}

/// Translates a local coordinate into the neighboring tile's coordinate
/// system across the shared boundary in direction `dir`.
///
/// A sender's visible band lands in the receiver's cache ring, and a sender's
/// cache ring lands in the receiver's visible band.
#[inline]
#[must_use]
pub fn neighbor_local(p: Point, dir: Dir) -> Point {
    let step = dir.offset();
    Point::new(p.x - W * step.x, p.y - W * step.y)
}

/// One tile: `TILE_SPAN²` sites, a deterministic RNG, and a run state.
pub struct Tile {
    sites: Box<[Site]>,
    random: Random,
    run_state: RunState,
    requested_state: Option<RunState>,
    window_open: bool,
    events_executed: u64,
    neighbor_present: [bool; 8],
    cache_live: [bool; 8],
}

impl Tile {
    /// Creates a tile with an empty lattice and the given RNG seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        let count = (SPAN * SPAN) as usize;
        Self {
            sites: vec![Site::new(); count].into_boxed_slice(),
            random: Random::new(seed),
            run_state: RunState::Off,
            requested_state: None,
            window_open: false,
            events_executed: 0,
            neighbor_present: [false; 8],
            cache_live: [false; 8],
        }
    }

    #[inline]
    fn index(p: Point) -> usize {
        (p.y * SPAN + p.x) as usize
    }

    /// Returns true iff `p` lies inside the allocated span.
    #[inline]
    #[must_use]
    pub const fn in_bounds(p: Point) -> bool {
        p.x >= 0 && p.x < SPAN && p.y >= 0 && p.y < SPAN
    }

    /// Returns true iff `p` lies in the owned (authoritative) region.
    #[inline]
    #[must_use]
    pub const fn is_owned(p: Point) -> bool {
        p.x >= R && p.x < R + W && p.y >= R && p.y < R + W
    }

    /// Classifies one in-bounds local coordinate.
    pub fn region(p: Point) -> TileResult<Region> {
        if !Self::in_bounds(p) {
            return Err(TileError::OutOfBounds { coord: p });
        }
        if !Self::is_owned(p) {
            return Ok(Region::Cache);
        }
        let near_edge =
            p.x < 2 * R || p.x >= W || p.y < 2 * R || p.y >= W;
        if near_edge {
            Ok(Region::Visible)
        } else {
            Ok(Region::Hidden)
        }
    }

    /// For a cache coordinate, the direction of the neighbor that owns it.
    /// Returns `None` for owned coordinates.
    #[must_use]
    pub fn cache_dir(p: Point) -> Option<Dir> {
        if !Self::in_bounds(p) || Self::is_owned(p) {
            return None;
        }
        let dx = i32::from(p.x >= R + W) - i32::from(p.x < R);
        let dy = i32::from(p.y >= R + W) - i32::from(p.y < R);
        Dir::ALL.into_iter().find(|d| d.offset() == Point::new(dx, dy))
    }

    /// For an owned coordinate, the set of neighbors mirroring it (up to
    /// three: edge, edge, corner). Empty for hidden or cache coordinates.
    #[must_use]
    pub fn visible_dirs(p: Point) -> DirMask {
        let mut mask = DirMask::EMPTY;
        if !Self::is_owned(p) {
            return mask;
        }
        let dx = i32::from(p.x >= W) - i32::from(p.x < 2 * R);
        let dy = i32::from(p.y >= W) - i32::from(p.y < 2 * R);
        for dir in Dir::ALL {
            let step = dir.offset();
            let covers_x = step.x == 0 || step.x == dx;
            let covers_y = step.y == 0 || step.y == dy;
            let moves = step.x != 0 || step.y != 0;
            let matches_x = step.x == 0 || dx != 0;
            let matches_y = step.y == 0 || dy != 0;
            if moves && covers_x && covers_y && matches_x && matches_y {
                mask.insert(dir);
            }
        }
        mask
    }

    /// Union of cache directions an event window would touch.
    #[must_use]
    pub fn window_cache_dirs(center: Point, radius: u32) -> DirMask {
        let mut mask = DirMask::EMPTY;
        let r = radius as i32;
        for oy in -r..=r {
            for ox in -r..=r {
                if ox.abs() + oy.abs() > r {
                    continue;
                }
                let p = center + Point::new(ox, oy);
                if Self::in_bounds(p) {
                    if let Some(dir) = Self::cache_dir(p) {
                        mask.insert(dir);
                    }
                }
            }
        }
        mask
    }

    /// Returns true iff `p` may be read or written by an event right now.
    ///
    /// Owned sites are always live. Cache sites are live only while the
    /// channel to their owning neighbor is open.
    #[must_use]
    pub fn is_live(&self, p: Point) -> bool {
        if !Self::in_bounds(p) {
            return false;
        }
        match Self::cache_dir(p) {
            None => true,
            Some(dir) => {
                let i = dir.index() as usize;
                self.neighbor_present[i] && self.cache_live[i]
            }
        }
    }

    /// Reads the atom at a local coordinate.
    pub fn get_atom(&self, p: Point) -> TileResult<Atom> {
        if !Self::in_bounds(p) {
            return Err(TileError::OutOfBounds { coord: p });
        }
        Ok(self.sites[Self::index(p)].atom())
    }

    /// Writes the atom at a local coordinate.
    pub fn set_atom(&mut self, p: Point, atom: Atom) -> TileResult<()> {
        if !Self::in_bounds(p) {
            return Err(TileError::OutOfBounds { coord: p });
        }
        self.sites[Self::index(p)].set_atom(atom);
        Ok(())
    }

    /// Per-site event count, for statistics.
    pub fn site_event_count(&self, p: Point) -> TileResult<u32> {
        if !Self::in_bounds(p) {
            return Err(TileError::OutOfBounds { coord: p });
        }
        Ok(self.sites[Self::index(p)].event_count())
    }

    /// Picks a uniformly random owned site.
    #[inline]
    pub fn random_owned_site(&mut self) -> Point {
        let x = R + self.random.create(TILE_WIDTH) as i32;
        let y = R + self.random.create(TILE_WIDTH) as i32;
        Point::new(x, y)
    }

    /// The tile's deterministic random generator.
    #[inline]
    pub fn random_mut(&mut self) -> &mut Random {
        &mut self.random
    }

    // ---- run-state machine -------------------------------------------------

    /// Current run state.
    #[inline]
    #[must_use]
    pub const fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Records a state-change request to be honored at the next safe point.
    #[inline]
    pub fn request_state(&mut self, state: RunState) {
        self.requested_state = Some(state);
    }

    /// The outstanding request, if any.
    #[inline]
    #[must_use]
    pub const fn requested_state(&self) -> Option<RunState> {
        self.requested_state
    }

    /// Honors an outstanding request. Called by the driver between events,
    /// never mid-event. Returns the newly entered state, if any.
    pub fn honor_state_request(&mut self) -> Option<RunState> {
        debug_assert!(!self.window_open, "state change honored mid-event");
        let state = self.requested_state.take()?;
        self.run_state = state;
        Some(state)
    }

    // ---- neighbor / cache liveness ----------------------------------------

    /// Declares whether a neighbor exists in `dir`.
    pub fn set_neighbor_present(&mut self, dir: Dir, present: bool) {
        self.neighbor_present[dir.index() as usize] = present;
        if !present {
            self.cache_live[dir.index() as usize] = false;
        }
    }

    /// Returns true iff a neighbor is configured in `dir`.
    #[inline]
    #[must_use]
    pub const fn neighbor_present(&self, dir: Dir) -> bool {
        self.neighbor_present[dir.index() as usize]
    }

    /// Marks the cache strip toward `dir` as synchronized (channel OPEN) or
    /// stale (anything else).
    pub fn set_cache_live(&mut self, dir: Dir, live: bool) {
        self.cache_live[dir.index() as usize] = live;
    }

    /// Returns true iff the cache strip toward `dir` is synchronized.
    #[inline]
    #[must_use]
    pub const fn cache_is_live(&self, dir: Dir) -> bool {
        self.cache_live[dir.index() as usize]
    }

    // ---- event bookkeeping -------------------------------------------------

    /// Marks the start of an event window. At most one may be open.
    pub(crate) fn begin_window(&mut self) -> TileResult<()> {
        if self.window_open {
            return Err(TileError::WindowAlreadyOpen);
        }
        self.window_open = true;
        Ok(())
    }

    /// Marks the end of the open event window.
    pub(crate) fn end_window(&mut self) {
        self.window_open = false;
    }

    /// Returns true iff an event window is currently open.
    #[inline]
    #[must_use]
    pub const fn window_is_open(&self) -> bool {
        self.window_open
    }

    /// Records one completed event centered at `p`.
    pub fn record_event(&mut self, p: Point) {
        if Self::in_bounds(p) {
            self.sites[Self::index(p)].record_event();
        }
        self.events_executed += 1;
    }

    /// Total events executed by this tile.
    #[inline]
    #[must_use]
    pub const fn events_executed(&self) -> u64 {
        self.events_executed
    }

    // ---- census & boundary strips ------------------------------------------

    /// Counts owned atoms per type tag. Not a hot path.
    #[must_use]
    pub fn recount_atoms(&self) -> Vec<(u16, u64)> {
        let mut counts: Vec<(u16, u64)> = Vec::new();
        for y in R..R + W {
            for x in R..R + W {
                let type_code = self.sites[Self::index(Point::new(x, y))].atom().get_type();
                match counts.iter_mut().find(|(t, _)| *t == type_code) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((type_code, 1)),
                }
            }
        }
        counts.sort_unstable_by_key(|&(t, _)| t);
        counts
    }

    /// All owned sites mirrored by the neighbor in `dir`, with their atoms.
    #[must_use]
    pub fn visible_strip(&self, dir: Dir) -> Vec<(Point, Atom)> {
        self.collect_sites(|p| Self::visible_dirs(p).contains(dir))
    }

    /// All cache sites owned by the neighbor in `dir`, with their atoms.
    #[must_use]
    pub fn cache_strip(&self, dir: Dir) -> Vec<(Point, Atom)> {
        self.collect_sites(|p| Self::cache_dir(p) == Some(dir))
    }

    fn collect_sites(&self, keep: impl Fn(Point) -> bool) -> Vec<(Point, Atom)> {
        let mut out = Vec::new();
        for y in 0..SPAN {
            for x in 0..SPAN {
                let p = Point::new(x, y);
                if keep(p) {
                    out.push((p, self.sites[Self::index(p)].atom()));
                }
            }
        }
        out
    }

    /// Flips each bit of the atom at `p` with probability `1 / bit_odds`.
    pub fn xray_atom(&mut self, p: Point, bit_odds: u32) -> TileResult<()> {
        let mut atom = self.get_atom(p)?;
        for bit in 0..tessera_core::ATOM_BITS {
            if self.random.one_in(bit_odds) {
                atom.flip_bit(bit)?;
            }
        }
        self.set_atom(p, atom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_classification() {
        // Cache ring.
        assert_eq!(Tile::region(Point::new(0, 0)).unwrap(), Region::Cache);
        assert_eq!(
            Tile::region(Point::new(R + 1, SPAN - 1)).unwrap(),
            Region::Cache
        );
        // Visible band.
        assert_eq!(Tile::region(Point::new(R, R)).unwrap(), Region::Visible);
        assert_eq!(
            Tile::region(Point::new(R + W - 1, R + W / 2)).unwrap(),
            Region::Visible
        );
        // Hidden interior.
        assert_eq!(
            Tile::region(Point::new(SPAN / 2, SPAN / 2)).unwrap(),
            Region::Hidden
        );
        // Out of bounds is an error, not a silent region.
        assert!(Tile::region(Point::new(-1, 0)).is_err());
        assert!(Tile::region(Point::new(0, SPAN)).is_err());
    }

    #[test]
    fn test_cache_dir_edges_and_corners() {
        assert_eq!(Tile::cache_dir(Point::new(0, SPAN / 2)), Some(Dir::West));
        assert_eq!(
            Tile::cache_dir(Point::new(SPAN - 1, SPAN / 2)),
            Some(Dir::East)
        );
        assert_eq!(Tile::cache_dir(Point::new(SPAN / 2, 0)), Some(Dir::North));
        assert_eq!(Tile::cache_dir(Point::new(0, 0)), Some(Dir::Northwest));
        assert_eq!(
            Tile::cache_dir(Point::new(SPAN - 1, SPAN - 1)),
            Some(Dir::Southeast)
        );
        assert_eq!(Tile::cache_dir(Point::new(R, R)), None);
    }

    #[test]
    fn test_visible_dirs_edge_and_corner() {
        // Mid-edge visible site: exactly one mirroring neighbor.
        let east_mid = Point::new(R + W - 1, R + W / 2);
        let mask = Tile::visible_dirs(east_mid);
        assert!(mask.contains(Dir::East));
        assert_eq!(mask.len(), 1);

        // Corner visible site: two edges plus the diagonal.
        let nw_corner = Point::new(R, R);
        let mask = Tile::visible_dirs(nw_corner);
        assert!(mask.contains(Dir::North));
        assert!(mask.contains(Dir::West));
        assert!(mask.contains(Dir::Northwest));
        assert_eq!(mask.len(), 3);

        // Hidden and cache sites are mirrored by nobody.
        assert!(Tile::visible_dirs(Point::new(SPAN / 2, SPAN / 2)).is_empty());
        assert!(Tile::visible_dirs(Point::new(0, 0)).is_empty());
    }

    #[test]
    fn test_neighbor_local_round_trip() {
        for dir in Dir::ALL {
            let p = Point::new(R + 1, R + W - 1);
            let there = neighbor_local(p, dir);
            let back = neighbor_local(there, dir.opposite());
            assert_eq!(back, p);
        }
    }

    #[test]
    fn test_neighbor_local_maps_visible_to_cache() {
        // Sender's east visible column lands in receiver's west cache ring.
        let p = Point::new(R + W - 1, R + 3);
        assert!(Tile::visible_dirs(p).contains(Dir::East));
        let mapped = neighbor_local(p, Dir::East);
        assert_eq!(Tile::cache_dir(mapped), Some(Dir::West));
        // And the sender's east cache lands in the receiver's west visible band.
        let q = Point::new(R + W, R + 3);
        assert_eq!(Tile::cache_dir(q), Some(Dir::East));
        let mapped = neighbor_local(q, Dir::East);
        assert!(Tile::visible_dirs(mapped).contains(Dir::West));
    }

    #[test]
    fn test_window_cache_dirs() {
        let r = EVENT_WINDOW_RADIUS;
        // Deep interior: no cache contact.
        assert!(Tile::window_cache_dirs(Point::new(SPAN / 2, SPAN / 2), r).is_empty());
        // Against the east owned edge: east contact only.
        let mask = Tile::window_cache_dirs(Point::new(R + W - 1, R + W / 2), r);
        assert!(mask.contains(Dir::East));
        assert_eq!(mask.len(), 1);
        // Owned corner with a full-radius window reaches both edges.
        let mask = Tile::window_cache_dirs(Point::new(R, R), r);
        assert!(mask.contains(Dir::North));
        assert!(mask.contains(Dir::West));
    }

    #[test]
    fn test_cache_liveness_gating() {
        let mut tile = Tile::new(1);
        let cache_site = Point::new(0, SPAN / 2);
        // No neighbor: dead.
        assert!(!tile.is_live(cache_site));
        // Neighbor present but channel not open: still dead.
        tile.set_neighbor_present(Dir::West, true);
        assert!(!tile.is_live(cache_site));
        // Channel open: live.
        tile.set_cache_live(Dir::West, true);
        assert!(tile.is_live(cache_site));
        // Dropping the neighbor also kills the cache flag.
        tile.set_neighbor_present(Dir::West, false);
        assert!(!tile.is_live(cache_site));
        // Owned sites are always live.
        assert!(tile.is_live(Point::new(R, R)));
    }

    #[test]
    fn test_run_state_requests_honored_at_safe_point() {
        let mut tile = Tile::new(2);
        assert_eq!(tile.run_state(), RunState::Off);
        tile.request_state(RunState::Active);
        // Request does not take effect until honored.
        assert_eq!(tile.run_state(), RunState::Off);
        assert_eq!(tile.requested_state(), Some(RunState::Active));
        assert_eq!(tile.honor_state_request(), Some(RunState::Active));
        assert_eq!(tile.run_state(), RunState::Active);
        assert_eq!(tile.honor_state_request(), None);
    }

    #[test]
    fn test_recount_atoms() {
        let mut tile = Tile::new(3);
        tile.set_atom(Point::new(R, R), Atom::of_type(5)).unwrap();
        tile.set_atom(Point::new(R + 1, R), Atom::of_type(5)).unwrap();
        tile.set_atom(Point::new(R + 2, R), Atom::of_type(9)).unwrap();
        // Cache sites are not part of the census.
        tile.set_atom(Point::new(0, 0), Atom::of_type(5)).unwrap();
        let counts = tile.recount_atoms();
        let total: u64 = counts.iter().map(|&(_, n)| n).sum();
        assert_eq!(total, u64::from(TILE_WIDTH * TILE_WIDTH));
        assert!(counts.contains(&(5, 2)));
        assert!(counts.contains(&(9, 1)));
    }

    #[test]
    fn test_strips_are_congruent() {
        let tile = Tile::new(4);
        for dir in Dir::ALL {
            // A visible strip and the opposite cache strip have the same
            // number of sites; that is what makes mirroring possible.
            assert_eq!(
                tile.visible_strip(dir).len(),
                tile.cache_strip(dir.opposite()).len()
            );
        }
        let r = EVENT_WINDOW_RADIUS as usize;
        let w = TILE_WIDTH as usize;
        assert_eq!(tile.visible_strip(Dir::East).len(), r * w);
        assert_eq!(tile.visible_strip(Dir::Northeast).len(), r * r);
    }

    #[test]
    fn test_xray_with_impossible_odds_is_identity() {
        let mut tile = Tile::new(5);
        let p = Point::new(R, R);
        tile.set_atom(p, Atom::of_type(0x77)).unwrap();
        tile.xray_atom(p, u32::MAX).unwrap();
        // With astronomically long odds, 96 coin flips essentially never hit.
        assert_eq!(tile.get_atom(p).unwrap().get_type(), 0x77);
    }
}
