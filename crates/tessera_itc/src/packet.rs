//! # ITC Wire Packets
//!
//! Byte-level wire format for inter-tile traffic.
//!
//! ## Layout
//!
//! ```text
//! byte 0:  0xA?         standard class nibble | outbound direction (3 bits)
//! byte 1:  0xC?         command nibble << 4   | argument nibble
//!                       argument = channel state number (STATE) or circuit
//!                       number (circuit commands), 0 for bulk transfers
//! bytes 2..: command-specific payload
//! ```
//!
//! Site-bearing packets (TALK / XFER / UPDATE) carry a count byte followed by
//! `count` triples of (x u8, y u8, atom). An XFER with count 0 is the
//! end-of-exchange marker.
//!
//! ## Zero-Allocation Design
//!
//! Packets are encoded into fixed 256-byte buffers that are `Copy`; atoms ride
//! the wire as their raw `Pod` bytes.

use bytemuck::bytes_of;

use tessera_core::{Atom, Dir, ATOM_BITS};

use crate::error::{ItcError, ItcResult};

/// Standard-class nibble carried in every header byte.
pub const PKT_CLASS_STANDARD: u8 = 0xA0;

/// Wire protocol version, checked during channel negotiation.
pub const PROTOCOL_VERSION: u8 = 1;

/// Fixed wire buffer size.
pub const MAX_PACKET_SIZE: usize = 256;

/// Maximum site triples per site-bearing packet.
pub const MAX_SITES_PER_PACKET: usize = 16;

/// Sub-command values packed into the high nibble of byte 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
enum Command {
    State = 0x0,
    Ring = 0x1,
    Answer = 0x2,
    Busy = 0x3,
    Talk = 0x4,
    Hangup = 0x5,
    Drop = 0x6,
    Xfer = 0x7,
    Update = 0x8,
}

impl Command {
    const fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            0x0 => Some(Self::State),
            0x1 => Some(Self::Ring),
            0x2 => Some(Self::Answer),
            0x3 => Some(Self::Busy),
            0x4 => Some(Self::Talk),
            0x5 => Some(Self::Hangup),
            0x6 => Some(Self::Drop),
            0x7 => Some(Self::Xfer),
            0x8 => Some(Self::Update),
            _ => None,
        }
    }
}

/// One site update on the wire: sender-local coordinates plus the atom.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SiteUpdate {
    /// Sender-local x coordinate.
    pub x: u8,
    /// Sender-local y coordinate.
    pub y: u8,
    /// The atom's full bit pattern.
    pub atom: Atom,
}

impl SiteUpdate {
    /// Bytes one site update occupies on the wire.
    pub const WIRE_SIZE: usize = 2 + Atom::SIZE;
}

/// A fixed-capacity, `Copy` list of site updates.
#[derive(Clone, Copy, Debug)]
pub struct SiteVec {
    sites: [SiteUpdate; MAX_SITES_PER_PACKET],
    len: u8,
}

impl Default for SiteVec {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteVec {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sites: [SiteUpdate {
                x: 0,
                y: 0,
                atom: Atom::empty(),
            }; MAX_SITES_PER_PACKET],
            len: 0,
        }
    }

    /// Appends a site update. Returns false when full.
    #[inline]
    pub fn push(&mut self, site: SiteUpdate) -> bool {
        if (self.len as usize) >= MAX_SITES_PER_PACKET {
            return false;
        }
        self.sites[self.len as usize] = site;
        self.len += 1;
        true
    }

    /// The valid site updates.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[SiteUpdate] {
        &self.sites[..self.len as usize]
    }

    /// Number of site updates held.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> u8 {
        self.len
    }

    /// Returns true iff no site updates are held.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Decoded wire packet.
#[derive(Clone, Copy, Debug)]
pub enum Packet {
    /// Channel state announcement plus compatibility info.
    State {
        /// Announced channel state number.
        state: u8,
        /// Sender's protocol version.
        version: u8,
        /// Sender's atom bit width.
        atom_bits: u8,
    },
    /// Lock request naming a center point, radius, and exclusivity.
    Ring {
        /// Circuit slot chosen by the active side.
        circuit: u8,
        /// Center x, sender-local.
        dx: i8,
        /// Center y, sender-local.
        dy: i8,
        /// Requested window radius.
        radius: u8,
        /// Exclusivity flag: the requester wants to write, not just read.
        yoink: bool,
    },
    /// Lock granted.
    Answer {
        /// The granted circuit.
        circuit: u8,
    },
    /// Lock refused; requester backs off.
    Busy {
        /// The refused circuit.
        circuit: u8,
    },
    /// Writes into the passive side's authoritative region.
    Talk {
        /// The granting circuit.
        circuit: u8,
        /// The sites to apply.
        sites: SiteVec,
    },
    /// Circuit released by the active side.
    Hangup {
        /// The released circuit.
        circuit: u8,
    },
    /// Request abandoned before completion.
    Drop {
        /// The abandoned circuit.
        circuit: u8,
    },
    /// Bulk cache-exchange transfer; empty means end-of-exchange.
    Xfer {
        /// The mirrored sites.
        sites: SiteVec,
    },
    /// Steady-state mirror refresh from the authoritative owner.
    Update {
        /// The refreshed sites.
        sites: SiteVec,
    },
}

impl Packet {
    fn command(&self) -> Command {
        match self {
            Self::State { .. } => Command::State,
            Self::Ring { .. } => Command::Ring,
            Self::Answer { .. } => Command::Answer,
            Self::Busy { .. } => Command::Busy,
            Self::Talk { .. } => Command::Talk,
            Self::Hangup { .. } => Command::Hangup,
            Self::Drop { .. } => Command::Drop,
            Self::Xfer { .. } => Command::Xfer,
            Self::Update { .. } => Command::Update,
        }
    }

    /// Short name for logs and error reports.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::State { .. } => "STATE",
            Self::Ring { .. } => "RING",
            Self::Answer { .. } => "ANSWER",
            Self::Busy { .. } => "BUSY",
            Self::Talk { .. } => "TALK",
            Self::Hangup { .. } => "HANGUP",
            Self::Drop { .. } => "DROP",
            Self::Xfer { .. } => "XFER",
            Self::Update { .. } => "UPDATE",
        }
    }
}

/// One encoded packet in its fixed wire buffer.
#[derive(Clone, Copy, Debug)]
pub struct PacketBuffer {
    bytes: [u8; MAX_PACKET_SIZE],
    len: usize,
}

impl PacketBuffer {
    /// The encoded bytes.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

struct Writer {
    buffer: [u8; MAX_PACKET_SIZE],
    position: usize,
}

impl Writer {
    const fn new() -> Self {
        Self {
            buffer: [0u8; MAX_PACKET_SIZE],
            position: 0,
        }
    }

    fn write_u8(&mut self, value: u8) -> ItcResult<()> {
        if self.position >= MAX_PACKET_SIZE {
            return Err(ItcError::PacketOverflow);
        }
        self.buffer[self.position] = value;
        self.position += 1;
        Ok(())
    }

    fn write_atom(&mut self, atom: &Atom) -> ItcResult<()> {
        let bytes = bytes_of(atom);
        if self.position + bytes.len() > MAX_PACKET_SIZE {
            return Err(ItcError::PacketOverflow);
        }
        self.buffer[self.position..self.position + bytes.len()].copy_from_slice(bytes);
        self.position += bytes.len();
        Ok(())
    }

    fn write_sites(&mut self, sites: &SiteVec) -> ItcResult<()> {
        self.write_u8(sites.len())?;
        for site in sites.as_slice() {
            self.write_u8(site.x)?;
            self.write_u8(site.y)?;
            self.write_atom(&site.atom)?;
        }
        Ok(())
    }

    fn finish(self) -> PacketBuffer {
        PacketBuffer {
            bytes: self.buffer,
            len: self.position,
        }
    }
}

struct Reader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    fn read_u8(&mut self) -> ItcResult<u8> {
        let value = *self.buffer.get(self.position).ok_or(ItcError::Truncated)?;
        self.position += 1;
        Ok(value)
    }

    fn read_atom(&mut self) -> ItcResult<Atom> {
        let end = self.position + Atom::SIZE;
        let slice = self.buffer.get(self.position..end).ok_or(ItcError::Truncated)?;
        self.position = end;
        bytemuck::try_pod_read_unaligned(slice).map_err(|_| ItcError::Truncated)
    }

    fn read_sites(&mut self) -> ItcResult<SiteVec> {
        let count = self.read_u8()?;
        if count as usize > MAX_SITES_PER_PACKET {
            return Err(ItcError::BadSiteCount { count });
        }
        let mut sites = SiteVec::new();
        for _ in 0..count {
            let x = self.read_u8()?;
            let y = self.read_u8()?;
            let atom = self.read_atom()?;
            sites.push(SiteUpdate { x, y, atom });
        }
        Ok(sites)
    }
}

/// Encodes a packet for transmission in direction `dir`.
pub fn encode(dir: Dir, packet: &Packet) -> ItcResult<PacketBuffer> {
    let mut w = Writer::new();
    w.write_u8(PKT_CLASS_STANDARD | dir.index())?;
    let (command, argument) = match packet {
        Packet::State { state, .. } => (Command::State, *state),
        Packet::Ring { circuit, .. }
        | Packet::Answer { circuit }
        | Packet::Busy { circuit }
        | Packet::Talk { circuit, .. }
        | Packet::Hangup { circuit }
        | Packet::Drop { circuit } => (packet.command(), *circuit),
        Packet::Xfer { .. } | Packet::Update { .. } => (packet.command(), 0),
    };
    if argument > 0x0F {
        return Err(ItcError::PacketOverflow);
    }
    w.write_u8(((command as u8) << 4) | argument)?;
    match packet {
        Packet::State { version, atom_bits, .. } => {
            w.write_u8(*version)?;
            w.write_u8(*atom_bits)?;
        }
        Packet::Ring {
            dx, dy, radius, yoink, ..
        } => {
            w.write_u8(*dx as u8)?;
            w.write_u8(*dy as u8)?;
            w.write_u8(*radius)?;
            w.write_u8(u8::from(*yoink))?;
        }
        Packet::Answer { .. }
        | Packet::Busy { .. }
        | Packet::Hangup { .. }
        | Packet::Drop { .. } => {}
        Packet::Talk { sites, .. } | Packet::Xfer { sites } | Packet::Update { sites } => {
            w.write_sites(sites)?;
        }
    }
    Ok(w.finish())
}

/// Decodes one wire packet, returning the sender's outbound direction.
pub fn decode(bytes: &[u8]) -> ItcResult<(Dir, Packet)> {
    let mut r = Reader::new(bytes);
    let header = r.read_u8()?;
    if header & 0xF8 != PKT_CLASS_STANDARD {
        return Err(ItcError::BadHeader { byte: header });
    }
    let dir = Dir::from_index(header & 0x07).ok_or(ItcError::BadHeader { byte: header })?;
    let sub = r.read_u8()?;
    let command =
        Command::from_nibble(sub >> 4).ok_or(ItcError::BadCommand { command: sub >> 4 })?;
    let argument = sub & 0x0F;
    let packet = match command {
        Command::State => Packet::State {
            state: argument,
            version: r.read_u8()?,
            atom_bits: r.read_u8()?,
        },
        Command::Ring => Packet::Ring {
            circuit: argument,
            dx: r.read_u8()? as i8,
            dy: r.read_u8()? as i8,
            radius: r.read_u8()?,
            yoink: r.read_u8()? != 0,
        },
        Command::Answer => Packet::Answer { circuit: argument },
        Command::Busy => Packet::Busy { circuit: argument },
        Command::Talk => Packet::Talk {
            circuit: argument,
            sites: r.read_sites()?,
        },
        Command::Hangup => Packet::Hangup { circuit: argument },
        Command::Drop => Packet::Drop { circuit: argument },
        Command::Xfer => Packet::Xfer {
            sites: r.read_sites()?,
        },
        Command::Update => Packet::Update {
            sites: r.read_sites()?,
        },
    };
    Ok((dir, packet))
}

/// Convenience: a STATE announcement for the local configuration.
#[must_use]
pub fn state_announcement(state: u8) -> Packet {
    Packet::State {
        state,
        version: PROTOCOL_VERSION,
        atom_bits: ATOM_BITS as u8,
    }
}
