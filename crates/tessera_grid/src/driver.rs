//! # Tile Drivers and the Pause Barrier
//!
//! One thread per tile, each looping over [`TileRuntime::step`]. The
//! controller's barrier is a fixed skeleton shared by pause and unpause:
//! broadcast a run-state request, then poll until every runtime reports it.
//! Pausing adds a quiescence phase on top: two consecutive sweeps must find
//! every runtime idle and every link empty before the barrier returns, at
//! which point no tile is mid-event, no packet is in flight, and all pair
//! locks are free.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use tessera_tile::RunState;

use crate::error::{GridError, GridResult};
use crate::runtime::TileRuntime;

/// One running tile thread.
pub struct TileDriver {
    handle: thread::JoinHandle<()>,
}

impl TileDriver {
    /// Spawns the driver loop for one tile.
    #[must_use]
    pub fn spawn(index: usize, runtime: Arc<Mutex<TileRuntime>>, shutdown: Arc<AtomicBool>) -> Self {
        let handle = thread::Builder::new()
            .name(format!("tile-{index}"))
            .spawn(move || {
                debug!(index, "tile driver up");
                while !shutdown.load(Ordering::Acquire) {
                    {
                        let mut runtime = runtime.lock();
                        runtime.step();
                    }
                    // An Off tile has nothing to poll for.
                    thread::yield_now();
                }
                debug!(index, "tile driver down");
            })
            .unwrap_or_else(|err| panic!("tile driver thread spawn failed: {err}"));
        Self { handle }
    }

    /// Joins the driver thread. The shutdown flag must already be set.
    pub fn join(self) {
        let _ = self.handle.join();
    }
}

/// Shared controller for every driver in a grid.
pub struct TileDriverControl {
    runtimes: Vec<Arc<Mutex<TileRuntime>>>,
    patience: u32,
}

impl TileDriverControl {
    /// Creates a controller over the given runtimes.
    #[must_use]
    pub fn new(runtimes: Vec<Arc<Mutex<TileRuntime>>>, patience: u32) -> Self {
        Self { runtimes, patience }
    }

    fn broadcast(&self, state: RunState) {
        for runtime in &self.runtimes {
            let mut runtime = runtime.lock();
            // Disabled tiles stay disabled until explicitly re-enabled.
            let off = runtime.tile().run_state() == RunState::Off
                || runtime.tile().requested_state() == Some(RunState::Off);
            if !off {
                runtime.tile_mut().request_state(state);
            }
        }
    }

    /// Barrier skeleton: request `state` everywhere, then poll until every
    /// runtime reports it. Off tiles are exempt; they hold no traffic.
    fn run_barrier(&self, state: RunState, waiting_on: &'static str) -> GridResult<()> {
        self.broadcast(state);
        for _ in 0..self.patience {
            let done = self.runtimes.iter().all(|runtime| {
                let runtime = runtime.lock();
                let current = runtime.tile().run_state();
                current == state || current == RunState::Off
            });
            if done {
                return Ok(());
            }
            thread::sleep(Duration::from_micros(100));
        }
        Err(GridError::BarrierTimeout { waiting_on })
    }

    /// Quiesces the whole grid.
    ///
    /// Phase one moves every tile to Passive (receive-only). Phase two polls
    /// until two consecutive sweeps find everything idle, so a send that
    /// slips in behind the first sweep cannot survive the second.
    pub fn pause(&self) -> GridResult<()> {
        self.run_barrier(RunState::Passive, "passive run state")?;
        let mut clean_sweeps = 0u32;
        for _ in 0..self.patience {
            let quiet = self
                .runtimes
                .iter()
                .all(|runtime| runtime.lock().is_idle());
            if quiet {
                clean_sweeps += 1;
                if clean_sweeps >= 2 {
                    info!("grid paused");
                    return Ok(());
                }
            } else {
                clean_sweeps = 0;
            }
            thread::sleep(Duration::from_micros(100));
        }
        Err(GridError::BarrierTimeout {
            waiting_on: "link and event quiescence",
        })
    }

    /// Resumes event execution everywhere.
    pub fn unpause(&self) -> GridResult<()> {
        self.run_barrier(RunState::Active, "active run state")?;
        info!("grid running");
        Ok(())
    }
}
