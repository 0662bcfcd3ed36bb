//! # Boundary Runtime
//!
//! The glue between one tile's lattice, its element table, and its protocol
//! channels. Each call to [`TileRuntime::step`] performs one service cycle:
//!
//! 1. honor run-state requests at the safe point (no event in flight);
//! 2. service links and timers, applying channel events to the lattice;
//! 3. advance the pending boundary event, executing it once every
//!    neighbor's ANSWER is in;
//! 4. if Active, idle, and every neighbor channel is OPEN, try to start one
//!    event.
//!
//! Interior events run immediately. Boundary events first try-acquire the
//! long-lived lock for every touched pair and ring every touched neighbor;
//! any refusal or failure abandons the attempt, which simply costs one
//! cycle. Whenever an authoritative visible site changes, its new value is
//! pushed to every neighbor that mirrors it, which is what keeps cache
//! mirrors convergent between full exchanges.

use std::mem;
use std::sync::Arc;

use tracing::{debug, error, warn};

use tessera_core::{Dir, DirMask, Point};
use tessera_itc::{
    decode, encode, ChannelEvent, ChannelIo, ChannelState, CircuitId, ItcChannel, Link, Packet,
    SiteInKind, SiteUpdate, SiteVec, MAX_SITES_PER_PACKET,
};
use tessera_tile::{neighbor_local, ElementTable, RunState, Tile};

use crate::lock::{LockSide, LonglivedLock};

/// Maps a point from the frame of the neighbor reached via `channel_dir`
/// into our own frame.
#[inline]
#[must_use]
pub fn map_inbound(p: Point, channel_dir: Dir) -> Point {
    neighbor_local(p, channel_dir.opposite())
}

/// One connected neighbor: transport, protocol endpoint, and the shared
/// pair lock.
struct Neighbor {
    link: Link,
    channel: ItcChannel,
    lock: Arc<LonglivedLock>,
    side: LockSide,
}

/// The in-flight boundary event, if any.
enum Pending {
    Idle,
    Ringing {
        center: Point,
        radius: u32,
        waiting: DirMask,
        ringed: Vec<(Dir, CircuitId)>,
    },
}

impl Pending {
    fn involves(&self, dir: Dir) -> bool {
        match self {
            Self::Idle => false,
            Self::Ringing { ringed, .. } => ringed.iter().any(|(d, _)| *d == dir),
        }
    }
}

/// One tile's complete execution state.
pub struct TileRuntime {
    tile: Tile,
    table: ElementTable,
    neighbors: [Option<Neighbor>; 8],
    pending: Pending,
    events_skipped: u64,
}

impl TileRuntime {
    /// Creates a disconnected runtime with an empty element table.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            tile: Tile::new(seed),
            table: ElementTable::new(),
            neighbors: Default::default(),
            pending: Pending::Idle,
            events_skipped: 0,
        }
    }

    /// Attaches a neighbor: the link endpoint toward it, the shared pair
    /// lock, and which side of that lock we are.
    pub fn connect(&mut self, dir: Dir, link: Link, lock: Arc<LonglivedLock>, side: LockSide) {
        self.tile.set_neighbor_present(dir, true);
        self.neighbors[dir.index() as usize] = Some(Neighbor {
            link,
            channel: ItcChannel::new(dir),
            lock,
            side,
        });
    }

    /// The lattice.
    #[inline]
    #[must_use]
    pub fn tile(&self) -> &Tile {
        &self.tile
    }

    /// The lattice, mutably. Callers must respect the pause barrier.
    #[inline]
    pub fn tile_mut(&mut self) -> &mut Tile {
        &mut self.tile
    }

    /// The element table, mutably, for registration at assembly time.
    #[inline]
    pub fn table_mut(&mut self) -> &mut ElementTable {
        &mut self.table
    }

    /// The element table.
    #[inline]
    #[must_use]
    pub fn table(&self) -> &ElementTable {
        &self.table
    }

    /// Events abandoned to lock failure, refusal, or overlap back-off.
    #[inline]
    #[must_use]
    pub const fn events_skipped(&self) -> u64 {
        self.events_skipped
    }

    /// The channel state toward `dir`, if a neighbor is attached there.
    #[must_use]
    pub fn channel_state(&self, dir: Dir) -> Option<ChannelState> {
        self.neighbors[dir.index() as usize]
            .as_ref()
            .map(|n| n.channel.state())
    }

    /// True iff no event is in flight, every circuit is free, and every
    /// link toward a live neighbor is empty in both directions. The pause
    /// barrier requires this to hold across two consecutive sweeps.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        if !matches!(self.pending, Pending::Idle) {
            return false;
        }
        if self.tile.run_state() == RunState::Off {
            return true;
        }
        Dir::ALL.into_iter().all(|dir| {
            match self.neighbors[dir.index() as usize].as_ref() {
                Some(neighbor) if self.tile.neighbor_present(dir) => {
                    neighbor.channel.circuits_idle() && neighbor.link.is_quiet()
                }
                _ => true,
            }
        })
    }

    /// Forces every channel back to SHUT. Used when a tile rejoins the grid
    /// so its neighborhood renegotiates from scratch and the full cache
    /// exchange repairs any staleness accumulated while it was off.
    pub fn reset_all_channels(&mut self) {
        for dir in Dir::ALL {
            if self.neighbors[dir.index() as usize].is_none() {
                continue;
            }
            self.tile.set_cache_live(dir, false);
            let mut io = ChannelIo::new();
            self.neighbor_mut(dir)
                .channel
                .force_reset("tile rejoined", &mut io);
            self.ship(dir, &mut io);
        }
    }

    /// One service cycle.
    pub fn step(&mut self) {
        if matches!(self.pending, Pending::Idle) && !self.tile.window_is_open() {
            if let Some(state) = self.tile.honor_state_request() {
                debug!(?state, "run state honored");
            }
        }
        match self.tile.run_state() {
            RunState::Off => {}
            RunState::Passive => self.service_links(false),
            RunState::Active => {
                self.service_links(true);
                self.maybe_start_event();
            }
        }
    }

    // ---- phase 2: links, timers, channel events ----------------------------

    fn service_links(&mut self, active: bool) {
        for dir in Dir::ALL {
            if self.neighbors[dir.index() as usize].is_none() {
                continue;
            }
            if !self.tile.neighbor_present(dir) {
                // A disabled neighbor's leftover traffic is dead letters.
                while let Ok(Some(_)) = self.neighbor_mut(dir).link.try_recv() {}
                continue;
            }
            let mut io = ChannelIo::new();
            {
                let neighbor = self.neighbor_mut(dir);
                if active {
                    neighbor.channel.service(1, &mut io);
                }
                loop {
                    match neighbor.link.try_recv() {
                        Ok(Some(buffer)) => match decode(buffer.as_slice()) {
                            Ok((from, packet)) => {
                                neighbor.channel.handle(from, &packet, &mut io);
                            }
                            Err(err) => {
                                warn!(?dir, %err, "undecodable packet");
                                neighbor.channel.force_reset("undecodable packet", &mut io);
                            }
                        },
                        Ok(None) => break,
                        Err(err) => {
                            warn!(?dir, %err, "link endpoint gone");
                            break;
                        }
                    }
                }
            }
            let events: Vec<ChannelEvent> = io.events.drain(..).collect();
            for event in events {
                self.apply_channel_event(dir, event, &mut io);
            }
            self.ship(dir, &mut io);
        }
    }

    fn apply_channel_event(&mut self, dir: Dir, event: ChannelEvent, io: &mut ChannelIo) {
        match event {
            ChannelEvent::StateChanged(state) => {
                self.tile.set_cache_live(dir, state == ChannelState::Open);
                if state != ChannelState::Open && self.pending.involves(dir) {
                    self.abort_pending("channel left OPEN mid-event");
                }
            }
            ChannelEvent::Reset => {
                self.tile.set_cache_live(dir, false);
                if self.pending.involves(dir) {
                    self.abort_pending("channel reset mid-event");
                }
            }
            ChannelEvent::CacheExchangeDue => self.stream_cache_exchange(dir, io),
            ChannelEvent::SitesIn { kind, sites } => self.apply_sites(dir, kind, &sites, io),
            ChannelEvent::RingIn {
                circuit,
                center,
                radius,
                yoink,
            } => self.decide_ring(dir, circuit, center, radius, yoink, io),
            ChannelEvent::Answered { circuit } => self.note_answer(dir, circuit),
            ChannelEvent::Refused { circuit } => {
                if self.pending.involves(dir) {
                    debug!(?dir, circuit, "lock refused, backing off");
                    self.abort_pending("refused");
                }
            }
            ChannelEvent::HungUp { circuit } | ChannelEvent::Dropped { circuit } => {
                debug!(?dir, circuit, "inbound circuit closed");
            }
        }
    }

    fn stream_cache_exchange(&mut self, dir: Dir, io: &mut ChannelIo) {
        let strip = self.tile.visible_strip(dir);
        let neighbor = self.neighbor_mut(dir);
        for chunk in strip.chunks(MAX_SITES_PER_PACKET) {
            let mut sites = SiteVec::new();
            for (p, atom) in chunk {
                sites.push(SiteUpdate {
                    x: p.x as u8,
                    y: p.y as u8,
                    atom: *atom,
                });
            }
            if let Err(err) = neighbor.channel.queue_cache_sites(sites, io) {
                error!(?dir, %err, "cache exchange batch rejected");
                return;
            }
        }
        if let Err(err) = neighbor.channel.finish_cache_exchange(io) {
            error!(?dir, %err, "cache exchange end marker rejected");
        }
    }

    fn apply_sites(&mut self, dir: Dir, kind: SiteInKind, sites: &SiteVec, io: &mut ChannelIo) {
        match kind {
            SiteInKind::Cache => {
                for site in sites.as_slice() {
                    let p = map_inbound(Point::new(i32::from(site.x), i32::from(site.y)), dir);
                    if Tile::cache_dir(p) != Some(dir) {
                        self.neighbor_mut(dir)
                            .channel
                            .force_reset("mirror site outside cache strip", io);
                        return;
                    }
                    if let Err(err) = self.tile.set_atom(p, site.atom) {
                        error!(?dir, %err, "mirror write failed");
                    }
                }
            }
            SiteInKind::Owned { circuit } => {
                let segment = self.neighbors[dir.index() as usize]
                    .as_ref()
                    .and_then(|n| n.channel.granted().find(|(c, ..)| *c == circuit));
                let Some((_, peer_center, radius, yoink)) = segment else {
                    self.neighbor_mut(dir)
                        .channel
                        .force_reset("TALK with no granted segment", io);
                    return;
                };
                if !yoink {
                    self.neighbor_mut(dir)
                        .channel
                        .force_reset("write over a read-only grant", io);
                    return;
                }
                let center = map_inbound(peer_center, dir);
                let mut changed: Vec<Point> = Vec::new();
                for site in sites.as_slice() {
                    let p = map_inbound(Point::new(i32::from(site.x), i32::from(site.y)), dir);
                    let in_segment = Tile::is_owned(p)
                        && (p - center).manhattan_length() <= u32::from(radius);
                    if !in_segment {
                        self.neighbor_mut(dir)
                            .channel
                            .force_reset("TALK site outside granted segment", io);
                        return;
                    }
                    match self.tile.set_atom(p, site.atom) {
                        Ok(()) => changed.push(p),
                        Err(err) => error!(?dir, %err, "granted write failed"),
                    }
                }
                self.refresh_mirrors(&changed, Some(dir));
            }
        }
    }

    fn decide_ring(
        &mut self,
        dir: Dir,
        circuit: CircuitId,
        peer_center: Point,
        radius: u8,
        yoink: bool,
        io: &mut ChannelIo,
    ) {
        let center = map_inbound(peer_center, dir);
        let grant = self.tile.run_state() == RunState::Active
            && !self.overlaps_pending(center, u32::from(radius))
            && !self.overlaps_granted(center, u32::from(radius), yoink);
        let neighbor = self.neighbor_mut(dir);
        let result = if grant {
            neighbor.channel.answer(circuit, io)
        } else {
            neighbor.channel.refuse(circuit, io)
        };
        if let Err(err) = result {
            error!(?dir, circuit, %err, "ring decision failed");
        }
    }

    fn overlaps_pending(&self, center: Point, radius: u32) -> bool {
        match &self.pending {
            Pending::Idle => false,
            Pending::Ringing {
                center: ours,
                radius: our_radius,
                ..
            } => (center - *ours).manhattan_length() <= radius + *our_radius,
        }
    }

    /// True iff a window at `center` would overlap any currently granted
    /// inbound segment, where at least one party intends to write.
    fn overlaps_granted(&self, center: Point, radius: u32, writing: bool) -> bool {
        for dir in Dir::ALL {
            let Some(neighbor) = self.neighbors[dir.index() as usize].as_ref() else {
                continue;
            };
            for (_, peer_center, their_radius, their_yoink) in neighbor.channel.granted() {
                let theirs = map_inbound(peer_center, dir);
                let touching =
                    (center - theirs).manhattan_length() <= radius + u32::from(their_radius);
                if touching && (writing || their_yoink) {
                    return true;
                }
            }
        }
        false
    }

    fn note_answer(&mut self, dir: Dir, circuit: CircuitId) {
        let done = match &mut self.pending {
            Pending::Ringing {
                waiting, ringed, ..
            } if ringed.contains(&(dir, circuit)) => {
                waiting.remove(dir);
                waiting.is_empty()
            }
            _ => {
                warn!(?dir, circuit, "stray ANSWER");
                return;
            }
        };
        if done {
            self.run_pending_event();
        }
    }

    // ---- phase 3: completing a boundary event ------------------------------

    fn run_pending_event(&mut self) {
        let Pending::Ringing {
            center,
            radius,
            ringed,
            ..
        } = mem::replace(&mut self.pending, Pending::Idle)
        else {
            return;
        };
        match self.table.execute(&mut self.tile, center, radius) {
            Ok(dirty) => self.propagate_event(&dirty, &ringed),
            Err(err) => {
                error!(?center, %err, "boundary event behavior failed");
                self.close_circuits(&ringed);
            }
        }
        self.release_locks(&ringed);
    }

    fn propagate_event(&mut self, dirty: &[Point], ringed: &[(Dir, CircuitId)]) {
        // Cache-region writes go to the authoritative owner as TALK on its
        // circuit; visible-region writes go to every mirroring neighbor as
        // UPDATE.
        let mut talks: [SiteVec; 8] = [SiteVec::new(); 8];
        let mut updates: [SiteVec; 8] = [SiteVec::new(); 8];
        for &p in dirty {
            let Ok(atom) = self.tile.get_atom(p) else {
                continue;
            };
            let site = SiteUpdate {
                x: p.x as u8,
                y: p.y as u8,
                atom,
            };
            if let Some(dir) = Tile::cache_dir(p) {
                talks[dir.index() as usize].push(site);
            } else {
                for dir in Tile::visible_dirs(p).iter() {
                    updates[dir.index() as usize].push(site);
                }
            }
        }
        for &(dir, circuit) in ringed {
            let mut io = ChannelIo::new();
            {
                let neighbor = self.neighbor_mut(dir);
                let talk = talks[dir.index() as usize];
                if !talk.is_empty() {
                    if let Err(err) = neighbor.channel.talk(circuit, talk, &mut io) {
                        warn!(?dir, circuit, %err, "talk failed");
                    }
                }
                if let Err(err) = neighbor.channel.hangup(circuit, &mut io) {
                    warn!(?dir, circuit, %err, "hangup failed");
                }
            }
            self.ship(dir, &mut io);
        }
        for dir in Dir::ALL {
            let sites = updates[dir.index() as usize];
            if !sites.is_empty() {
                self.send_update(dir, sites);
            }
        }
    }

    /// Pushes fresh values of changed visible sites to every mirroring
    /// neighbor, except the one the change came from.
    fn refresh_mirrors(&mut self, changed: &[Point], exclude: Option<Dir>) {
        let mut updates: [SiteVec; 8] = [SiteVec::new(); 8];
        for &p in changed {
            let Ok(atom) = self.tile.get_atom(p) else {
                continue;
            };
            for dir in Tile::visible_dirs(p).iter() {
                if Some(dir) != exclude {
                    updates[dir.index() as usize].push(SiteUpdate {
                        x: p.x as u8,
                        y: p.y as u8,
                        atom,
                    });
                }
            }
        }
        for dir in Dir::ALL {
            let sites = updates[dir.index() as usize];
            if !sites.is_empty() {
                self.send_update(dir, sites);
            }
        }
    }

    fn send_update(&mut self, dir: Dir, sites: SiteVec) {
        let Some(neighbor) = self.neighbors[dir.index() as usize].as_mut() else {
            return;
        };
        if !neighbor.channel.is_open() {
            return;
        }
        match encode(dir, &Packet::Update { sites }) {
            Ok(buffer) => {
                if let Err(err) = neighbor.link.send(buffer) {
                    // The next full cache exchange repairs whatever this
                    // mirror misses.
                    warn!(?dir, %err, "update refresh dropped");
                }
            }
            Err(err) => error!(?dir, %err, "update refresh encode failed"),
        }
    }

    fn abort_pending(&mut self, reason: &'static str) {
        let Pending::Ringing { ringed, .. } = mem::replace(&mut self.pending, Pending::Idle)
        else {
            return;
        };
        debug!(reason, "boundary event abandoned");
        self.close_circuits(&ringed);
        self.release_locks(&ringed);
        self.events_skipped += 1;
    }

    fn close_circuits(&mut self, ringed: &[(Dir, CircuitId)]) {
        for &(dir, circuit) in ringed {
            let mut io = ChannelIo::new();
            // Circuits freed by a refusal or reset are already gone.
            let dropped = self
                .neighbor_mut(dir)
                .channel
                .drop_circuit(circuit, &mut io)
                .is_ok();
            if dropped {
                self.ship(dir, &mut io);
            }
        }
    }

    fn release_locks(&mut self, ringed: &[(Dir, CircuitId)]) {
        for &(dir, _) in ringed {
            let neighbor = self.neighbor_mut(dir);
            neighbor.lock.release(neighbor.side);
        }
    }

    // ---- phase 4: starting an event ----------------------------------------

    fn maybe_start_event(&mut self) {
        if !matches!(self.pending, Pending::Idle) || self.table.is_empty() {
            return;
        }
        // Events are gated until the whole live neighborhood is negotiated;
        // anything else would race the initial cache exchange. Disabled
        // neighbors are excused via the present flag.
        for dir in Dir::ALL {
            if let Some(neighbor) = self.neighbors[dir.index() as usize].as_ref() {
                if self.tile.neighbor_present(dir) && !neighbor.channel.is_open() {
                    return;
                }
            }
        }
        let center = self.tile.random_owned_site();
        let type_code = match self.tile.get_atom(center) {
            Ok(atom) => atom.get_type(),
            Err(err) => {
                error!(?center, %err, "event center unreadable");
                return;
            }
        };
        let Some(element) = self.table.lookup(type_code) else {
            error!(type_code, "no element owns the center atom");
            return;
        };
        let radius = element.window_boundary();
        if self.overlaps_granted(center, radius, true) {
            // A neighbor holds this segment; skip rather than contend.
            self.events_skipped += 1;
            return;
        }
        let dirs = self.touched_dirs(center, radius);
        if dirs.is_empty() {
            if let Err(err) = self.table.execute(&mut self.tile, center, radius) {
                error!(?center, %err, "interior event behavior failed");
            }
            return;
        }
        if !self.acquire_locks(dirs) {
            self.events_skipped += 1;
            return;
        }
        self.ring_all(center, radius, dirs);
    }

    /// Directions whose neighbor either owns a cache site in the window or
    /// mirrors a visible site in it.
    fn touched_dirs(&self, center: Point, radius: u32) -> DirMask {
        let r = radius as i32;
        let mut dirs = DirMask::EMPTY;
        for dy in -r..=r {
            for dx in -r..=r {
                let offset = Point::new(dx, dy);
                if offset.manhattan_length() > radius {
                    continue;
                }
                let p = center + offset;
                if !Tile::in_bounds(p) {
                    continue;
                }
                if let Some(dir) = Tile::cache_dir(p) {
                    if self.tile.neighbor_present(dir) {
                        dirs.insert(dir);
                    }
                }
                for dir in Tile::visible_dirs(p).iter() {
                    if self.tile.neighbor_present(dir) {
                        dirs.insert(dir);
                    }
                }
            }
        }
        dirs
    }

    fn acquire_locks(&mut self, dirs: DirMask) -> bool {
        let mut held = DirMask::EMPTY;
        for dir in dirs.iter() {
            let neighbor = self.neighbor_mut(dir);
            if neighbor.lock.try_acquire(neighbor.side) {
                held.insert(dir);
            } else {
                for back in held.iter() {
                    let neighbor = self.neighbor_mut(back);
                    neighbor.lock.release(neighbor.side);
                }
                return false;
            }
        }
        true
    }

    fn ring_all(&mut self, center: Point, radius: u32, dirs: DirMask) {
        let mut ringed: Vec<(Dir, CircuitId)> = Vec::new();
        let mut waiting = DirMask::EMPTY;
        for dir in dirs.iter() {
            let mut io = ChannelIo::new();
            let result = self
                .neighbor_mut(dir)
                .channel
                .ring(center, radius as u8, true, &mut io);
            match result {
                Ok(circuit) => {
                    self.ship(dir, &mut io);
                    ringed.push((dir, circuit));
                    waiting.insert(dir);
                }
                Err(err) => {
                    warn!(?dir, %err, "ring failed, abandoning event");
                    self.close_circuits(&ringed);
                    for back in dirs.iter() {
                        let neighbor = self.neighbor_mut(back);
                        neighbor.lock.release(neighbor.side);
                    }
                    self.events_skipped += 1;
                    return;
                }
            }
        }
        self.pending = Pending::Ringing {
            center,
            radius,
            waiting,
            ringed,
        };
    }

    // ---- plumbing ----------------------------------------------------------

    fn neighbor_mut(&mut self, dir: Dir) -> &mut Neighbor {
        self.neighbors[dir.index() as usize]
            .as_mut()
            .unwrap_or_else(|| unreachable!("no neighbor in {dir:?}"))
    }

    fn ship(&mut self, dir: Dir, io: &mut ChannelIo) {
        let Some(neighbor) = self.neighbors[dir.index() as usize].as_mut() else {
            io.clear();
            return;
        };
        for packet in io.sends.drain(..) {
            match encode(dir, &packet) {
                Ok(buffer) => {
                    if let Err(err) = neighbor.link.send(buffer) {
                        warn!(?dir, kind = packet.kind_name(), %err, "send dropped");
                    }
                }
                Err(err) => error!(?dir, kind = packet.kind_name(), %err, "encode failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{EVENT_WINDOW_RADIUS, TILE_SPAN, TILE_WIDTH};
    use tessera_itc::link_pair;

    const R: i32 = EVENT_WINDOW_RADIUS as i32;
    const W: i32 = TILE_WIDTH as i32;

    /// Pumps packets between the runtime and a bare peer channel until both
    /// directions are quiet, stepping the runtime as traffic arrives.
    fn pump(runtime: &mut TileRuntime, peer: &mut ItcChannel, io: &mut ChannelIo, link: &Link) {
        loop {
            if peer.state() == ChannelState::Cachexg {
                // Nothing to mirror from the bare side; just end the
                // exchange.
                let _ = peer.finish_cache_exchange(io);
            }
            let mut moved = false;
            for packet in io.sends.drain(..) {
                link.send(encode(Dir::West, &packet).unwrap()).unwrap();
                moved = true;
            }
            runtime.step();
            while let Ok(Some(buffer)) = link.try_recv() {
                let (from, packet) = decode(buffer.as_slice()).unwrap();
                peer.handle(from, &packet, io);
                moved = true;
            }
            if !moved {
                break;
            }
        }
    }

    /// Wires an east neighbor endpoint, runs the runtime Active, and drives
    /// the handshake to OPEN. Returns the peer endpoint and its link.
    fn open_east_channel(runtime: &mut TileRuntime) -> (ItcChannel, Link, ChannelIo) {
        let (mine, theirs) = link_pair();
        runtime.connect(Dir::East, mine, Arc::new(LonglivedLock::new()), LockSide::A);
        runtime.tile_mut().request_state(RunState::Active);
        let _ = runtime.tile_mut().honor_state_request();
        let mut peer = ItcChannel::new(Dir::West);
        let mut io = ChannelIo::new();
        for _ in 0..64 {
            peer.service(1, &mut io);
            pump(runtime, &mut peer, &mut io, &theirs);
            if peer.is_open() && runtime.channel_state(Dir::East) == Some(ChannelState::Open) {
                break;
            }
        }
        assert!(peer.is_open(), "handshake failed to open");
        io.clear();
        (peer, theirs, io)
    }

    fn answered(io: &ChannelIo) -> Vec<CircuitId> {
        io.events
            .iter()
            .filter_map(|event| match event {
                ChannelEvent::Answered { circuit } => Some(*circuit),
                _ => None,
            })
            .collect()
    }

    fn refused(io: &ChannelIo) -> Vec<CircuitId> {
        io.events
            .iter()
            .filter_map(|event| match event {
                ChannelEvent::Refused { circuit } => Some(*circuit),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_map_inbound_east_visible_lands_in_west_cache() {
        // A site in the east neighbor's west visible column appears in our
        // east cache column.
        let peer_local = Point::new(R, 7);
        let mine = map_inbound(peer_local, Dir::East);
        assert_eq!(mine, Point::new(R + W, 7));
        assert_eq!(Tile::cache_dir(mine), Some(Dir::East));
    }

    #[test]
    fn test_map_inbound_round_trips_through_neighbor_local() {
        for dir in Dir::ALL {
            let p = Point::new(9, 11);
            let there = neighbor_local(p, dir);
            assert_eq!(map_inbound(there, dir), p);
        }
    }

    #[test]
    fn test_touched_dirs_empty_for_interior_center() {
        let mut runtime = TileRuntime::new(7);
        for dir in Dir::ALL {
            runtime.tile_mut().set_neighbor_present(dir, true);
        }
        let mid = Point::new(TILE_SPAN as i32 / 2, TILE_SPAN as i32 / 2);
        assert!(runtime.touched_dirs(mid, EVENT_WINDOW_RADIUS).is_empty());
    }

    #[test]
    fn test_touched_dirs_on_east_edge() {
        let mut runtime = TileRuntime::new(7);
        for dir in Dir::ALL {
            runtime.tile_mut().set_neighbor_present(dir, true);
        }
        // Center on the easternmost owned column: window spills into the
        // east cache and sits in the east visible strip.
        let center = Point::new(R + W - 1, 10);
        let dirs = runtime.touched_dirs(center, EVENT_WINDOW_RADIUS);
        assert!(dirs.contains(Dir::East));
        assert!(!dirs.contains(Dir::West));
    }

    #[test]
    fn test_touched_dirs_ignores_absent_neighbors() {
        let runtime = TileRuntime::new(7);
        let center = Point::new(R + W - 1, 10);
        assert!(runtime
            .touched_dirs(center, EVENT_WINDOW_RADIUS)
            .is_empty());
    }

    #[test]
    fn test_overlapping_rings_grant_exactly_one() {
        let mut runtime = TileRuntime::new(11);
        let (mut peer, link, mut io) = open_east_channel(&mut runtime);
        // Two write-intent requests over segments one site apart; both land
        // in the same step. Only the first may be granted.
        let first = peer.ring(Point::new(R, 8), 2, true, &mut io).unwrap();
        let second = peer.ring(Point::new(R, 9), 2, true, &mut io).unwrap();
        pump(&mut runtime, &mut peer, &mut io, &link);
        assert_eq!(answered(&io), vec![first]);
        assert_eq!(refused(&io), vec![second]);
        // The loser backed off cleanly; once the winner hangs up, a retry
        // over the same segment goes through.
        io.clear();
        peer.hangup(first, &mut io).unwrap();
        let retry = peer.ring(Point::new(R, 9), 2, true, &mut io).unwrap();
        pump(&mut runtime, &mut peer, &mut io, &link);
        assert_eq!(answered(&io), vec![retry]);
        assert!(refused(&io).is_empty());
    }

    #[test]
    fn test_ring_overlapping_pending_event_is_refused() {
        let mut runtime = TileRuntime::new(13);
        let (mut peer, link, mut io) = open_east_channel(&mut runtime);
        // A local boundary event is mid-ring over the east seam.
        runtime.pending = Pending::Ringing {
            center: Point::new(R + W - 1, 8),
            radius: EVENT_WINDOW_RADIUS,
            waiting: DirMask::EMPTY,
            ringed: Vec::new(),
        };
        let circuit = peer.ring(Point::new(R, 8), 2, true, &mut io).unwrap();
        pump(&mut runtime, &mut peer, &mut io, &link);
        assert_eq!(refused(&io), vec![circuit]);
        assert!(answered(&io).is_empty());
        assert!(peer.circuits_idle());
    }

    #[test]
    fn test_idle_runtime_reports_idle() {
        let runtime = TileRuntime::new(1);
        assert!(runtime.is_idle());
    }
}
