//! # Threaded Grid Integration Test
//!
//! Runs a real multi-threaded grid with a self-propagating element chewing
//! across the tile seam, then pauses and audits. The pause barrier must
//! leave nothing mid-flight, and every cache mirror must match its owner
//! exactly despite all the boundary traffic.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tessera_core::{Atom, Point, TILE_WIDTH};
use tessera_grid::{Grid, GridConfig};
use tessera_tile::{Element, EventWindow, TileResult};

const W: i32 = TILE_WIDTH as i32;

const SCRIBBLER: u16 = 1;

/// Paints adjacent live sites with its own type. Deliberately crosses tile
/// seams whenever its window reaches a cache region.
struct Scribbler;

impl Element for Scribbler {
    fn type_code(&self) -> u16 {
        SCRIBBLER
    }

    fn name(&self) -> &str {
        "Scribbler"
    }

    fn uuid(&self) -> u64 {
        0x5C21_BB1E_0000_0001
    }

    fn behavior(&self, window: &mut EventWindow<'_>) -> TileResult<()> {
        for offset in [
            Point::new(1, 0),
            Point::new(0, 1),
            Point::new(-1, 0),
            Point::new(0, -1),
        ] {
            // Dead sites (no live neighbor behind them) are skipped.
            if window.get_relative(offset).is_ok() {
                window.set_relative(offset, Atom::of_type(SCRIBBLER))?;
            }
        }
        Ok(())
    }
}

fn scribbled_grid() -> Grid {
    let config = GridConfig {
        width: 2,
        height: 1,
        seed: 1303,
        link_capacity: 1024,
        ..GridConfig::default()
    };
    let grid = Grid::new(&config).unwrap();
    grid.register_element(Arc::new(Scribbler)).unwrap();
    // Seed both sides of the seam so boundary events happen early.
    for y in 0..W {
        grid.place_atom(Atom::of_type(SCRIBBLER), Point::new(W - 1, y))
            .unwrap();
        grid.place_atom(Atom::of_type(SCRIBBLER), Point::new(W, y))
            .unwrap();
    }
    grid
}

#[test]
fn test_pause_leaves_caches_consistent() {
    let mut grid = scribbled_grid();
    grid.start();
    grid.unpause().unwrap();
    thread::sleep(Duration::from_millis(300));
    grid.pause().unwrap();

    assert!(grid.total_events_executed() > 0, "no events ran");
    assert_eq!(
        grid.check_caches().unwrap(),
        0,
        "cache mirrors diverged from their owners"
    );
}

#[test]
fn test_scribbler_spreads_and_census_tracks_it() {
    let mut grid = scribbled_grid();
    let seeded = 2 * u64::from(TILE_WIDTH);
    grid.start();
    grid.unpause().unwrap();
    thread::sleep(Duration::from_millis(300));
    grid.pause().unwrap();

    let census = grid.recount_atoms().unwrap();
    let scribblers = census
        .iter()
        .find(|(t, _)| *t == SCRIBBLER)
        .map_or(0, |(_, n)| *n);
    // Scribblers are never erased, so the population only grows.
    assert!(
        scribblers >= seeded,
        "scribbler census shrank: {scribblers} < {seeded}"
    );
    let total: u64 = census.iter().map(|(_, n)| *n).sum();
    assert_eq!(total, 2 * u64::from(TILE_WIDTH) * u64::from(TILE_WIDTH));
}

#[test]
fn test_pause_unpause_cycles() {
    let mut grid = scribbled_grid();
    grid.start();
    for _ in 0..3 {
        grid.unpause().unwrap();
        thread::sleep(Duration::from_millis(60));
        grid.pause().unwrap();
        assert_eq!(grid.check_caches().unwrap(), 0);
    }
}
