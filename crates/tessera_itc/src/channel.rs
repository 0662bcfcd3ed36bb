//! # Channel State Machine
//!
//! One `ItcChannel` per boundary direction runs the lock-and-mirror protocol
//! against its peer. The channel itself touches no sockets and no lattice:
//! inbound packets go in through [`ItcChannel::handle`], and everything the
//! runtime must do comes back out through a [`ChannelIo`] - packets to send
//! and events to apply. That keeps the whole protocol deterministic and
//! testable with two channels wired back to back in memory.
//!
//! ## States
//!
//! ```text
//! SHUT ----> DRAIN ----> CACHEXG ----> OPEN
//!   ^______________________________________|   (any violation)
//! ```
//!
//! Advancement is monotonic; the only recovery from any confusion is a jump
//! back to SHUT followed by a full renegotiation. There is deliberately no
//! partial-repair path.
//!
//! ## Circuits
//!
//! Inside an OPEN channel, boundary events run over numbered circuits:
//! RING asks for the lock, ANSWER grants it, BUSY refuses it, TALK carries
//! the writes, HANGUP releases, DROP abandons. Outbound and inbound circuits
//! are tracked separately, so both sides may use the same slot numbers
//! without collision.

use tracing::{debug, warn};

use tessera_core::{Dir, Point, ATOM_BITS};

use crate::error::{ItcError, ItcResult};
use crate::packet::{Packet, SiteVec, PROTOCOL_VERSION};
use crate::timer::TimerQueue;

/// Number of simultaneous circuits per channel side.
pub const MAX_EWSLOT: usize = 4;

/// Ticks between repeated STATE announcements.
pub const ANNOUNCE_PERIOD: u64 = 8;

/// Ticks a circuit may remain unresolved before the channel resets. The
/// guard spans the whole circuit lifetime: ring through hangup on the
/// active side, grant through hangup on the passive side.
pub const CIRCUIT_TIMEOUT: u64 = 64;

/// Circuit slot number, valid in `0..MAX_EWSLOT`.
pub type CircuitId = u8;

/// Channel negotiation state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ChannelState {
    /// No agreement with the peer; only STATE packets are meaningful.
    Shut = 0,
    /// Both sides flushing stale traffic before exchanging caches.
    Drain = 1,
    /// Mutual bulk mirror of visible regions in progress.
    Cachexg = 2,
    /// Steady state; circuits and incremental updates flow.
    Open = 3,
}

impl ChannelState {
    /// Short name for logs and error reports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Shut => "SHUT",
            Self::Drain => "DRAIN",
            Self::Cachexg => "CACHEXG",
            Self::Open => "OPEN",
        }
    }

    const fn from_number(number: u8) -> Option<Self> {
        match number {
            0 => Some(Self::Shut),
            1 => Some(Self::Drain),
            2 => Some(Self::Cachexg),
            3 => Some(Self::Open),
            _ => None,
        }
    }
}

/// How a batch of inbound sites should be applied to the lattice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SiteInKind {
    /// Mirror data for the cache region (XFER or UPDATE).
    Cache,
    /// Authoritative writes into the owned region under a granted lock
    /// (TALK).
    Owned {
        /// The circuit the writes arrived on.
        circuit: CircuitId,
    },
}

/// Something the runtime must act on after feeding the channel.
#[derive(Clone, Copy, Debug)]
pub enum ChannelEvent {
    /// The channel changed state.
    StateChanged(ChannelState),
    /// The channel reset to SHUT after a protocol violation or timeout.
    Reset,
    /// Cache exchange has begun; the runtime must stream its visible strip
    /// via [`ItcChannel::queue_cache_sites`] and then call
    /// [`ItcChannel::finish_cache_exchange`].
    CacheExchangeDue,
    /// Inbound sites to apply.
    SitesIn {
        /// How to apply them.
        kind: SiteInKind,
        /// The sites, in the sender's local coordinates.
        sites: SiteVec,
    },
    /// The peer requests a lock; the runtime must decide and call
    /// [`ItcChannel::answer`] or [`ItcChannel::refuse`].
    RingIn {
        /// The peer's circuit slot.
        circuit: CircuitId,
        /// Window center, in the peer's local coordinates.
        center: Point,
        /// Requested window radius.
        radius: u8,
        /// True iff the peer intends to write.
        yoink: bool,
    },
    /// Our lock request was granted.
    Answered {
        /// The granted outbound circuit.
        circuit: CircuitId,
    },
    /// Our lock request was refused; back off and retry later.
    Refused {
        /// The refused outbound circuit.
        circuit: CircuitId,
    },
    /// The peer released a lock we granted.
    HungUp {
        /// The released inbound circuit.
        circuit: CircuitId,
    },
    /// The peer abandoned a request before completion.
    Dropped {
        /// The abandoned inbound circuit.
        circuit: CircuitId,
    },
}

/// Collected channel output: packets to ship and events to apply.
#[derive(Debug, Default)]
pub struct ChannelIo {
    /// Packets to encode toward the peer, in order.
    pub sends: Vec<Packet>,
    /// Events for the runtime, in order.
    pub events: Vec<ChannelEvent>,
}

impl ChannelIo {
    /// Creates an empty output set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops accumulated output.
    pub fn clear(&mut self) {
        self.sends.clear();
        self.events.clear();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OutboundCircuit {
    Free,
    Rung,
    Answered,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InboundCircuit {
    Free,
    Rung {
        center: Point,
        radius: u8,
        yoink: bool,
    },
    Granted {
        center: Point,
        radius: u8,
        yoink: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimerEvent {
    Announce,
    OutboundTimeout(CircuitId),
    InboundTimeout(CircuitId),
}

/// The per-direction protocol endpoint.
#[derive(Debug)]
pub struct ItcChannel {
    dir: Dir,
    state: ChannelState,
    timers: TimerQueue<TimerEvent>,
    outbound: [OutboundCircuit; MAX_EWSLOT],
    inbound: [InboundCircuit; MAX_EWSLOT],
    sent_cache_done: bool,
    recv_cache_done: bool,
    resets: u64,
}

impl ItcChannel {
    /// Creates a SHUT channel whose packets travel in direction `dir`.
    ///
    /// The first [`service`](Self::service) call announces SHUT.
    #[must_use]
    pub fn new(dir: Dir) -> Self {
        let mut timers = TimerQueue::new();
        timers.schedule(0, TimerEvent::Announce);
        Self {
            dir,
            state: ChannelState::Shut,
            timers,
            outbound: [OutboundCircuit::Free; MAX_EWSLOT],
            inbound: [InboundCircuit::Free; MAX_EWSLOT],
            sent_cache_done: false,
            recv_cache_done: false,
            resets: 0,
        }
    }

    /// The outbound direction this channel serves.
    #[inline]
    #[must_use]
    pub const fn dir(&self) -> Dir {
        self.dir
    }

    /// Current negotiation state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> ChannelState {
        self.state
    }

    /// True iff circuits and updates may flow.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == ChannelState::Open
    }

    /// Number of resets taken so far, for diagnostics.
    #[inline]
    #[must_use]
    pub const fn reset_count(&self) -> u64 {
        self.resets
    }

    /// True iff no circuit on either side is mid-flight.
    #[must_use]
    pub fn circuits_idle(&self) -> bool {
        self.outbound.iter().all(|c| *c == OutboundCircuit::Free)
            && self.inbound.iter().all(|c| *c == InboundCircuit::Free)
    }

    /// The inbound circuits currently granted: `(circuit, center, radius,
    /// yoink)` with centers in the peer's local coordinates.
    pub fn granted(&self) -> impl Iterator<Item = (CircuitId, Point, u8, bool)> + '_ {
        self.inbound
            .iter()
            .enumerate()
            .filter_map(|(index, circuit)| match circuit {
                InboundCircuit::Granted {
                    center,
                    radius,
                    yoink,
                } => Some((index as CircuitId, *center, *radius, *yoink)),
                _ => None,
            })
    }

    fn announcement(&self) -> Packet {
        Packet::State {
            state: self.state as u8,
            version: PROTOCOL_VERSION,
            atom_bits: ATOM_BITS as u8,
        }
    }

    fn enter(&mut self, state: ChannelState, io: &mut ChannelIo) {
        debug!(dir = ?self.dir, from = ?self.state, to = ?state, "channel state change");
        self.state = state;
        io.sends.push(self.announcement());
        io.events.push(ChannelEvent::StateChanged(state));
        if state == ChannelState::Cachexg {
            self.sent_cache_done = false;
            self.recv_cache_done = false;
            io.events.push(ChannelEvent::CacheExchangeDue);
        }
    }

    fn reset(&mut self, reason: &str, io: &mut ChannelIo) {
        warn!(dir = ?self.dir, state = ?self.state, reason, "channel reset");
        self.resets += 1;
        self.state = ChannelState::Shut;
        self.outbound = [OutboundCircuit::Free; MAX_EWSLOT];
        self.inbound = [InboundCircuit::Free; MAX_EWSLOT];
        self.sent_cache_done = false;
        self.recv_cache_done = false;
        self.timers.clear();
        self.timers.schedule(ANNOUNCE_PERIOD, TimerEvent::Announce);
        io.sends.push(self.announcement());
        io.events.push(ChannelEvent::Reset);
    }

    /// Forces a full reset for failures the state machine cannot observe
    /// itself, such as an undecodable inbound packet.
    pub fn force_reset(&mut self, reason: &'static str, io: &mut ChannelIo) {
        self.reset(reason, io);
    }

    /// Advances the logical clock and fires any due announcements or
    /// timeouts.
    pub fn service(&mut self, ticks: u64, io: &mut ChannelIo) {
        self.timers.advance(ticks);
        while let Some(event) = self.timers.pop_expired() {
            match event {
                TimerEvent::Announce => {
                    io.sends.push(self.announcement());
                    self.timers.schedule(ANNOUNCE_PERIOD, TimerEvent::Announce);
                }
                TimerEvent::OutboundTimeout(circuit) => {
                    if self.outbound[circuit as usize] != OutboundCircuit::Free {
                        self.reset("circuit response timeout", io);
                        return;
                    }
                }
                TimerEvent::InboundTimeout(circuit) => {
                    // The peer's HANGUP or DROP never arrived; a grant must
                    // not outlive the guard or the segment stays refused
                    // forever.
                    if self.inbound[circuit as usize] != InboundCircuit::Free {
                        self.reset("circuit release timeout", io);
                        return;
                    }
                }
            }
        }
    }

    /// Feeds one decoded inbound packet through the state machine.
    ///
    /// `from` is the sender's outbound direction as carried in the header;
    /// anything other than the mirror of our own direction resets the
    /// channel. Protocol violations never propagate as errors - reset is the
    /// recovery.
    pub fn handle(&mut self, from: Dir, packet: &Packet, io: &mut ChannelIo) {
        if from != self.dir.opposite() {
            self.reset("packet from wrong direction", io);
            return;
        }
        match packet {
            Packet::State {
                state,
                version,
                atom_bits,
            } => self.handle_state(*state, *version, *atom_bits, io),
            _ if self.state == ChannelState::Shut => {
                // Stale traffic from before the peer notices our reset.
            }
            Packet::Xfer { sites } => self.handle_xfer(sites, io),
            Packet::Update { sites } => self.handle_update(sites, io),
            Packet::Ring {
                circuit,
                dx,
                dy,
                radius,
                yoink,
            } => self.handle_ring(*circuit, *dx, *dy, *radius, *yoink, io),
            Packet::Answer { circuit } => self.handle_answer(*circuit, io),
            Packet::Busy { circuit } => self.handle_busy(*circuit, io),
            Packet::Talk { circuit, sites } => self.handle_talk(*circuit, sites, io),
            Packet::Hangup { circuit } => self.handle_hangup(*circuit, io),
            Packet::Drop { circuit } => self.handle_drop(*circuit, io),
        }
    }

    fn handle_state(&mut self, number: u8, version: u8, atom_bits: u8, io: &mut ChannelIo) {
        if version != PROTOCOL_VERSION || u32::from(atom_bits) != ATOM_BITS {
            warn!(
                dir = ?self.dir,
                version,
                atom_bits,
                "incompatible peer, refusing to negotiate"
            );
            if self.state != ChannelState::Shut {
                self.reset("incompatible peer", io);
            }
            return;
        }
        let Some(peer) = ChannelState::from_number(number) else {
            self.reset("unknown peer state", io);
            return;
        };
        match (self.state, peer) {
            // Mutual SHUT (or a peer already draining) starts negotiation.
            (ChannelState::Shut, ChannelState::Shut | ChannelState::Drain) => {
                self.enter(ChannelState::Drain, io);
            }
            // A peer ahead of a reset us will fall back on our announcements.
            (ChannelState::Shut, _) => {}
            (ChannelState::Drain, ChannelState::Drain | ChannelState::Cachexg) => {
                self.enter(ChannelState::Cachexg, io);
            }
            // The peer has not yet seen our DRAIN announcement.
            (ChannelState::Drain, ChannelState::Shut) => {}
            (ChannelState::Drain, ChannelState::Open) => {}
            // Duplicate announcements during the exchange are harmless.
            (ChannelState::Cachexg, ChannelState::Drain | ChannelState::Cachexg) => {}
            // A peer that finished first may announce OPEN before our own
            // end marker lands; FIFO ordering makes this safe to ignore.
            (ChannelState::Cachexg, ChannelState::Open) => {}
            (ChannelState::Cachexg, ChannelState::Shut) => {
                self.reset("peer restarted during cache exchange", io);
            }
            (ChannelState::Open, ChannelState::Open | ChannelState::Cachexg) => {}
            (ChannelState::Open, ChannelState::Shut | ChannelState::Drain) => {
                self.reset("peer restarted", io);
            }
        }
    }

    fn handle_xfer(&mut self, sites: &SiteVec, io: &mut ChannelIo) {
        if self.state != ChannelState::Cachexg {
            self.reset("XFER outside cache exchange", io);
            return;
        }
        if sites.is_empty() {
            self.recv_cache_done = true;
            self.maybe_open(io);
        } else {
            io.events.push(ChannelEvent::SitesIn {
                kind: SiteInKind::Cache,
                sites: *sites,
            });
        }
    }

    fn handle_update(&mut self, sites: &SiteVec, io: &mut ChannelIo) {
        if self.state != ChannelState::Open {
            self.reset("UPDATE while not open", io);
            return;
        }
        io.events.push(ChannelEvent::SitesIn {
            kind: SiteInKind::Cache,
            sites: *sites,
        });
    }

    fn handle_ring(
        &mut self,
        circuit: CircuitId,
        dx: i8,
        dy: i8,
        radius: u8,
        yoink: bool,
        io: &mut ChannelIo,
    ) {
        if self.state != ChannelState::Open {
            self.reset("RING while not open", io);
            return;
        }
        let Some(slot) = self.inbound.get_mut(circuit as usize) else {
            self.reset("RING with bad circuit", io);
            return;
        };
        if *slot != InboundCircuit::Free {
            self.reset("RING on busy circuit", io);
            return;
        }
        let center = Point::new(i32::from(dx), i32::from(dy));
        *slot = InboundCircuit::Rung {
            center,
            radius,
            yoink,
        };
        io.events.push(ChannelEvent::RingIn {
            circuit,
            center,
            radius,
            yoink,
        });
    }

    fn handle_answer(&mut self, circuit: CircuitId, io: &mut ChannelIo) {
        if self.state != ChannelState::Open
            || self.outbound.get(circuit as usize) != Some(&OutboundCircuit::Rung)
        {
            self.reset("ANSWER without matching RING", io);
            return;
        }
        self.outbound[circuit as usize] = OutboundCircuit::Answered;
        io.events.push(ChannelEvent::Answered { circuit });
    }

    fn handle_busy(&mut self, circuit: CircuitId, io: &mut ChannelIo) {
        if self.state != ChannelState::Open
            || self.outbound.get(circuit as usize) != Some(&OutboundCircuit::Rung)
        {
            self.reset("BUSY without matching RING", io);
            return;
        }
        self.outbound[circuit as usize] = OutboundCircuit::Free;
        self.cancel_outbound_timeout(circuit);
        io.events.push(ChannelEvent::Refused { circuit });
    }

    fn handle_talk(&mut self, circuit: CircuitId, sites: &SiteVec, io: &mut ChannelIo) {
        if self.state != ChannelState::Open
            || !matches!(
                self.inbound.get(circuit as usize),
                Some(InboundCircuit::Granted { .. })
            )
        {
            self.reset("TALK without granted circuit", io);
            return;
        }
        io.events.push(ChannelEvent::SitesIn {
            kind: SiteInKind::Owned { circuit },
            sites: *sites,
        });
    }

    fn handle_hangup(&mut self, circuit: CircuitId, io: &mut ChannelIo) {
        if self.state != ChannelState::Open
            || !matches!(
                self.inbound.get(circuit as usize),
                Some(InboundCircuit::Granted { .. })
            )
        {
            self.reset("HANGUP without granted circuit", io);
            return;
        }
        self.inbound[circuit as usize] = InboundCircuit::Free;
        self.cancel_inbound_timeout(circuit);
        io.events.push(ChannelEvent::HungUp { circuit });
    }

    fn handle_drop(&mut self, circuit: CircuitId, io: &mut ChannelIo) {
        if self.state != ChannelState::Open
            || matches!(self.inbound.get(circuit as usize), None | Some(InboundCircuit::Free))
        {
            self.reset("DROP without pending circuit", io);
            return;
        }
        self.inbound[circuit as usize] = InboundCircuit::Free;
        self.cancel_inbound_timeout(circuit);
        io.events.push(ChannelEvent::Dropped { circuit });
    }

    fn maybe_open(&mut self, io: &mut ChannelIo) {
        if self.state == ChannelState::Cachexg && self.sent_cache_done && self.recv_cache_done {
            self.enter(ChannelState::Open, io);
        }
    }

    fn cancel_outbound_timeout(&mut self, circuit: CircuitId) {
        self.timers
            .cancel_where(|event| *event == TimerEvent::OutboundTimeout(circuit));
    }

    fn cancel_inbound_timeout(&mut self, circuit: CircuitId) {
        self.timers
            .cancel_where(|event| *event == TimerEvent::InboundTimeout(circuit));
    }

    // ---- cache exchange, runtime side ----

    /// Queues one batch of visible-strip mirror data during cache exchange.
    pub fn queue_cache_sites(&mut self, sites: SiteVec, io: &mut ChannelIo) -> ItcResult<()> {
        if self.state != ChannelState::Cachexg {
            return Err(ItcError::UnexpectedPacket {
                what: "XFER",
                state: self.state.name(),
            });
        }
        if sites.is_empty() {
            return Err(ItcError::BadSiteCount { count: 0 });
        }
        io.sends.push(Packet::Xfer { sites });
        Ok(())
    }

    /// Marks our side of the cache exchange complete and sends the empty
    /// XFER end marker.
    pub fn finish_cache_exchange(&mut self, io: &mut ChannelIo) -> ItcResult<()> {
        if self.state != ChannelState::Cachexg || self.sent_cache_done {
            return Err(ItcError::UnexpectedPacket {
                what: "XFER end marker",
                state: self.state.name(),
            });
        }
        self.sent_cache_done = true;
        io.sends.push(Packet::Xfer {
            sites: SiteVec::new(),
        });
        self.maybe_open(io);
        Ok(())
    }

    // ---- circuits, active side ----

    /// Requests a lock on the peer's mirror of the window at `center`
    /// (local coordinates) with the given radius. `yoink` claims write
    /// intent.
    pub fn ring(
        &mut self,
        center: Point,
        radius: u8,
        yoink: bool,
        io: &mut ChannelIo,
    ) -> ItcResult<CircuitId> {
        if self.state != ChannelState::Open {
            return Err(ItcError::UnexpectedPacket {
                what: "RING",
                state: self.state.name(),
            });
        }
        let circuit = self
            .outbound
            .iter()
            .position(|slot| *slot == OutboundCircuit::Free)
            .ok_or(ItcError::NoFreeCircuit)? as CircuitId;
        self.outbound[circuit as usize] = OutboundCircuit::Rung;
        self.timers
            .schedule(CIRCUIT_TIMEOUT, TimerEvent::OutboundTimeout(circuit));
        io.sends.push(Packet::Ring {
            circuit,
            dx: center.x as i8,
            dy: center.y as i8,
            radius,
            yoink,
        });
        Ok(circuit)
    }

    /// Sends authoritative writes over a granted outbound circuit.
    pub fn talk(&mut self, circuit: CircuitId, sites: SiteVec, io: &mut ChannelIo) -> ItcResult<()> {
        self.require_answered(circuit)?;
        io.sends.push(Packet::Talk { circuit, sites });
        Ok(())
    }

    /// Releases a granted outbound circuit after the event completes.
    pub fn hangup(&mut self, circuit: CircuitId, io: &mut ChannelIo) -> ItcResult<()> {
        self.require_answered(circuit)?;
        self.outbound[circuit as usize] = OutboundCircuit::Free;
        self.cancel_outbound_timeout(circuit);
        io.sends.push(Packet::Hangup { circuit });
        Ok(())
    }

    /// Abandons an outbound circuit at any point before hangup.
    pub fn drop_circuit(&mut self, circuit: CircuitId, io: &mut ChannelIo) -> ItcResult<()> {
        match self.outbound.get(circuit as usize) {
            Some(OutboundCircuit::Rung | OutboundCircuit::Answered) => {
                self.outbound[circuit as usize] = OutboundCircuit::Free;
                self.cancel_outbound_timeout(circuit);
                io.sends.push(Packet::Drop { circuit });
                Ok(())
            }
            _ => Err(ItcError::CircuitOutOfState { circuit }),
        }
    }

    fn require_answered(&self, circuit: CircuitId) -> ItcResult<()> {
        if self.outbound.get(circuit as usize) == Some(&OutboundCircuit::Answered) {
            Ok(())
        } else {
            Err(ItcError::CircuitOutOfState { circuit })
        }
    }

    // ---- circuits, passive side ----

    /// Grants a pending inbound lock request.
    pub fn answer(&mut self, circuit: CircuitId, io: &mut ChannelIo) -> ItcResult<()> {
        match self.inbound.get(circuit as usize) {
            Some(InboundCircuit::Rung {
                center,
                radius,
                yoink,
            }) => {
                self.inbound[circuit as usize] = InboundCircuit::Granted {
                    center: *center,
                    radius: *radius,
                    yoink: *yoink,
                };
                self.timers
                    .schedule(CIRCUIT_TIMEOUT, TimerEvent::InboundTimeout(circuit));
                io.sends.push(Packet::Answer { circuit });
                Ok(())
            }
            _ => Err(ItcError::CircuitOutOfState { circuit }),
        }
    }

    /// Refuses a pending inbound lock request.
    pub fn refuse(&mut self, circuit: CircuitId, io: &mut ChannelIo) -> ItcResult<()> {
        match self.inbound.get(circuit as usize) {
            Some(InboundCircuit::Rung { .. }) => {
                self.inbound[circuit as usize] = InboundCircuit::Free;
                io.sends.push(Packet::Busy { circuit });
                Ok(())
            }
            _ => Err(ItcError::CircuitOutOfState { circuit }),
        }
    }
}
