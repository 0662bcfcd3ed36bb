//! # Grid Assembly
//!
//! Builds the full lattice: one runtime per tile, a link pair and a
//! long-lived lock per adjacent pair (edges and corners both), and a driver
//! thread per tile once started. The grid surface is synchronous; anything
//! that touches tile interiors while drivers run demands a pause first, so
//! callers always observe a fully quiescent lattice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use tessera_core::{Atom, Dir, Point, EVENT_WINDOW_RADIUS, TILE_WIDTH};
use tessera_itc::link_pair_with_capacity;
use tessera_tile::{neighbor_local, Element, Empty, RunState, Tile};

use crate::config::GridConfig;
use crate::driver::{TileDriver, TileDriverControl};
use crate::error::{GridError, GridResult};
use crate::lock::{LockSide, LonglivedLock};
use crate::runtime::TileRuntime;

const W: i32 = TILE_WIDTH as i32;
const R: i32 = EVENT_WINDOW_RADIUS as i32;

/// A running (or runnable) lattice of tiles.
pub struct Grid {
    width: u32,
    height: u32,
    runtimes: Vec<Arc<Mutex<TileRuntime>>>,
    control: TileDriverControl,
    drivers: Vec<TileDriver>,
    shutdown: Arc<AtomicBool>,
    patience: u32,
    paused: bool,
}

impl Grid {
    /// Assembles a grid per the configuration. Every tile starts Passive
    /// with the inert Empty element registered; call
    /// [`start`](Self::start) then [`unpause`](Self::unpause) to run it, or
    /// drive it manually with [`step_all`](Self::step_all).
    pub fn new(config: &GridConfig) -> GridResult<Self> {
        config.validate()?;
        let count = (config.width as usize) * (config.height as usize);
        let mut runtimes: Vec<Arc<Mutex<TileRuntime>>> = Vec::with_capacity(count);
        for index in 0..count {
            let seed = config
                .seed
                .wrapping_add((index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
            let mut runtime = TileRuntime::new(seed);
            runtime.table_mut().register(Arc::new(Empty))?;
            runtime.tile_mut().request_state(RunState::Passive);
            let _ = runtime.tile_mut().honor_state_request();
            runtimes.push(Arc::new(Mutex::new(runtime)));
        }

        // Wire every adjacent pair once, from the lower index outward.
        let grid = Self {
            width: config.width,
            height: config.height,
            runtimes,
            control: TileDriverControl::new(Vec::new(), config.barrier_patience),
            drivers: Vec::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
            patience: config.barrier_patience,
            paused: true,
        };
        for ty in 0..config.height {
            for tx in 0..config.width {
                for dir in Dir::ALL {
                    let offset = dir.offset();
                    let nx = tx as i64 + i64::from(offset.x);
                    let ny = ty as i64 + i64::from(offset.y);
                    if nx < 0 || ny < 0 || nx >= i64::from(config.width) || ny >= i64::from(config.height) {
                        continue;
                    }
                    let here = grid.index(tx, ty);
                    let there = grid.index(nx as u32, ny as u32);
                    if there <= here {
                        continue;
                    }
                    let (link_a, link_b) = link_pair_with_capacity(config.link_capacity);
                    let lock = Arc::new(LonglivedLock::new());
                    grid.runtimes[here].lock().connect(
                        dir,
                        link_a,
                        Arc::clone(&lock),
                        LockSide::A,
                    );
                    grid.runtimes[there].lock().connect(
                        dir.opposite(),
                        link_b,
                        lock,
                        LockSide::B,
                    );
                }
            }
        }
        info!(width = config.width, height = config.height, "grid assembled");
        Ok(grid)
    }

    #[inline]
    fn index(&self, tx: u32, ty: u32) -> usize {
        (ty as usize) * (self.width as usize) + tx as usize
    }

    /// Grid width in tiles.
    #[inline]
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in tiles.
    #[inline]
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    fn runtime(&self, tx: u32, ty: u32) -> GridResult<&Arc<Mutex<TileRuntime>>> {
        if tx >= self.width || ty >= self.height {
            return Err(GridError::NoSuchTile { x: tx, y: ty });
        }
        Ok(&self.runtimes[self.index(tx, ty)])
    }

    fn ensure_quiescent(&self) -> GridResult<()> {
        if !self.drivers.is_empty() && !self.paused {
            return Err(GridError::NotPaused);
        }
        Ok(())
    }

    /// Registers an element in every tile's table. Grid must be quiescent.
    pub fn register_element(&self, element: Arc<dyn Element>) -> GridResult<()> {
        self.ensure_quiescent()?;
        for runtime in &self.runtimes {
            runtime.lock().table_mut().register(Arc::clone(&element))?;
        }
        Ok(())
    }

    // ---- threaded operation ------------------------------------------------

    /// Spawns one driver thread per tile. The grid stays paused until
    /// [`unpause`](Self::unpause).
    pub fn start(&mut self) {
        if !self.drivers.is_empty() {
            return;
        }
        self.control = TileDriverControl::new(self.runtimes.clone(), self.patience);
        for (index, runtime) in self.runtimes.iter().enumerate() {
            self.drivers.push(TileDriver::spawn(
                index,
                Arc::clone(runtime),
                Arc::clone(&self.shutdown),
            ));
        }
    }

    /// Quiesces the grid: every tile Passive, no packet in flight, no event
    /// mid-run, all pair locks free.
    pub fn pause(&mut self) -> GridResult<()> {
        if self.drivers.is_empty() {
            return Err(GridError::NotStarted);
        }
        self.control.pause()?;
        self.paused = true;
        Ok(())
    }

    /// Resumes event execution.
    pub fn unpause(&mut self) -> GridResult<()> {
        if self.drivers.is_empty() {
            return Err(GridError::NotStarted);
        }
        self.paused = false;
        self.control.unpause()
    }

    // ---- manual operation --------------------------------------------------

    /// Steps every runtime once, single-threaded, in index order. Only
    /// legal before [`start`](Self::start); tests use this to drive
    /// protocol scenarios deterministically.
    pub fn step_all(&self) -> GridResult<()> {
        if !self.drivers.is_empty() {
            return Err(GridError::NotPaused);
        }
        for runtime in &self.runtimes {
            runtime.lock().step();
        }
        Ok(())
    }

    /// Requests a run state on every tile, honored at each tile's next safe
    /// point. Manual-mode counterpart of the barrier.
    pub fn request_state_all(&self, state: RunState) {
        for runtime in &self.runtimes {
            runtime.lock().tile_mut().request_state(state);
        }
    }

    // ---- lattice access ----------------------------------------------------

    /// Maps a grid-global owned coordinate to its tile and tile-local
    /// coordinate.
    pub fn map_grid_to_tile(&self, point: Point) -> GridResult<((u32, u32), Point)> {
        let span_x = i64::from(self.width) * i64::from(W);
        let span_y = i64::from(self.height) * i64::from(W);
        if point.x < 0 || point.y < 0 || i64::from(point.x) >= span_x || i64::from(point.y) >= span_y
        {
            return Err(GridError::OutOfGrid { point });
        }
        let tx = (point.x / W) as u32;
        let ty = (point.y / W) as u32;
        let local = Point::new(point.x % W + R, point.y % W + R);
        Ok(((tx, ty), local))
    }

    /// Writes an atom at a grid-global coordinate, mirroring it into every
    /// neighbor cache that covers the site. Grid must be quiescent.
    pub fn place_atom(&self, atom: Atom, point: Point) -> GridResult<()> {
        self.ensure_quiescent()?;
        let ((tx, ty), local) = self.map_grid_to_tile(point)?;
        self.runtime(tx, ty)?.lock().tile_mut().set_atom(local, atom)?;
        for dir in Tile::visible_dirs(local).iter() {
            self.mirror_to_neighbor(tx, ty, dir, local, atom);
        }
        Ok(())
    }

    fn mirror_to_neighbor(&self, tx: u32, ty: u32, dir: Dir, local: Point, atom: Atom) {
        let offset = dir.offset();
        let nx = i64::from(tx) + i64::from(offset.x);
        let ny = i64::from(ty) + i64::from(offset.y);
        if nx < 0 || ny < 0 || nx >= i64::from(self.width) || ny >= i64::from(self.height) {
            return;
        }
        let index = self.index(nx as u32, ny as u32);
        let there = neighbor_local(local, dir);
        if let Err(err) = self.runtimes[index].lock().tile_mut().set_atom(there, atom) {
            warn!(%err, "direct mirror write failed");
        }
    }

    /// Reads the authoritative atom at a grid-global coordinate.
    pub fn get_atom(&self, point: Point) -> GridResult<Atom> {
        self.ensure_quiescent()?;
        let ((tx, ty), local) = self.map_grid_to_tile(point)?;
        Ok(self.runtime(tx, ty)?.lock().tile().get_atom(local)?)
    }

    /// Fault injection: flips each bit of the atom at `point` with
    /// probability `1 / bit_odds`, then re-mirrors the result.
    pub fn xray_atom(&self, point: Point, bit_odds: u32) -> GridResult<()> {
        self.ensure_quiescent()?;
        let ((tx, ty), local) = self.map_grid_to_tile(point)?;
        let atom = {
            let mut runtime = self.runtime(tx, ty)?.lock();
            runtime.tile_mut().xray_atom(local, bit_odds)?;
            runtime.tile().get_atom(local)?
        };
        for dir in Tile::visible_dirs(local).iter() {
            self.mirror_to_neighbor(tx, ty, dir, local, atom);
        }
        Ok(())
    }

    /// Whole-grid census of owned atoms by type.
    pub fn recount_atoms(&self) -> GridResult<Vec<(u16, u64)>> {
        self.ensure_quiescent()?;
        let mut totals: Vec<(u16, u64)> = Vec::new();
        for runtime in &self.runtimes {
            for (type_code, count) in runtime.lock().tile().recount_atoms() {
                match totals.iter_mut().find(|(t, _)| *t == type_code) {
                    Some((_, n)) => *n += count,
                    None => totals.push((type_code, count)),
                }
            }
        }
        totals.sort_unstable_by_key(|&(t, _)| t);
        Ok(totals)
    }

    /// Audits every cache mirror against its owner's visible strip,
    /// bit-for-bit. Returns the discrepancy count; each one is logged.
    /// After a successful pause this must be zero.
    pub fn check_caches(&self) -> GridResult<u64> {
        self.ensure_quiescent()?;
        let mut discrepancies = 0u64;
        for ty in 0..self.height {
            for tx in 0..self.width {
                let owner = self.runtimes[self.index(tx, ty)].lock();
                if owner.tile().run_state() == RunState::Off {
                    continue;
                }
                for dir in Dir::ALL {
                    discrepancies += self.audit_strip(&owner, tx, ty, dir);
                }
                drop(owner);
            }
        }
        Ok(discrepancies)
    }

    fn audit_strip(&self, owner: &TileRuntime, tx: u32, ty: u32, dir: Dir) -> u64 {
        let offset = dir.offset();
        let nx = i64::from(tx) + i64::from(offset.x);
        let ny = i64::from(ty) + i64::from(offset.y);
        if nx < 0 || ny < 0 || nx >= i64::from(self.width) || ny >= i64::from(self.height) {
            return 0;
        }
        let mirror = self.runtimes[self.index(nx as u32, ny as u32)].lock();
        if mirror.tile().run_state() == RunState::Off {
            return 0;
        }
        let mut bad = 0u64;
        for (p, atom) in owner.tile().visible_strip(dir) {
            let there = neighbor_local(p, dir);
            match mirror.tile().get_atom(there) {
                Ok(copy) if copy == atom => {}
                Ok(copy) => {
                    warn!(
                        tile = ?(tx, ty),
                        ?dir,
                        site = ?p,
                        owner = %atom.to_hex(),
                        mirror = %copy.to_hex(),
                        "cache mirror discrepancy"
                    );
                    bad += 1;
                }
                Err(err) => {
                    warn!(tile = ?(tx, ty), ?dir, site = ?p, %err, "mirror unreadable");
                    bad += 1;
                }
            }
        }
        bad
    }

    /// Enables or disables a tile. Disabling excuses the neighborhood from
    /// negotiating with it; re-enabling forces a fresh negotiation so the
    /// full cache exchange repairs staleness. Grid must be quiescent.
    pub fn set_tile_enabled(&self, tx: u32, ty: u32, enabled: bool) -> GridResult<()> {
        self.ensure_quiescent()?;
        {
            let mut runtime = self.runtime(tx, ty)?.lock();
            if enabled {
                runtime.reset_all_channels();
                runtime.tile_mut().request_state(RunState::Passive);
            } else {
                runtime.tile_mut().request_state(RunState::Off);
            }
        }
        for dir in Dir::ALL {
            let offset = dir.offset();
            let nx = i64::from(tx) + i64::from(offset.x);
            let ny = i64::from(ty) + i64::from(offset.y);
            if nx < 0 || ny < 0 || nx >= i64::from(self.width) || ny >= i64::from(self.height) {
                continue;
            }
            let mut neighbor = self.runtimes[self.index(nx as u32, ny as u32)].lock();
            neighbor
                .tile_mut()
                .set_neighbor_present(dir.opposite(), enabled);
            neighbor.tile_mut().set_cache_live(dir.opposite(), false);
        }
        Ok(())
    }

    /// Total events executed across all tiles.
    #[must_use]
    pub fn total_events_executed(&self) -> u64 {
        self.runtimes
            .iter()
            .map(|runtime| runtime.lock().tile().events_executed())
            .sum()
    }

    /// Total events abandoned to contention across all tiles.
    #[must_use]
    pub fn total_events_skipped(&self) -> u64 {
        self.runtimes
            .iter()
            .map(|runtime| runtime.lock().events_skipped())
            .sum()
    }

    /// Direct access to one tile's runtime, for tests and tooling.
    pub fn runtime_at(&self, tx: u32, ty: u32) -> GridResult<Arc<Mutex<TileRuntime>>> {
        Ok(Arc::clone(self.runtime(tx, ty)?))
    }
}

impl Drop for Grid {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        for driver in self.drivers.drain(..) {
            driver.join();
        }
    }
}
