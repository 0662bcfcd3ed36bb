//! # TESSERA Inter-Tile Circuit Protocol
//!
//! The packet protocol by which two tiles sharing a boundary negotiate
//! locks, exchange cache contents, and release - the analog of a two-phase
//! commit between neighbors, with no central arbiter.
//!
//! ## Design
//!
//! - **Channel** per direction-with-neighbor: `SHUT -> DRAIN -> CACHEXG ->
//!   OPEN`, advancing monotonically or jumping back to SHUT
//! - **Circuits** inside an open channel: bounded slots running
//!   `RING -> ANSWERED -> TALKED -> HANGUP` per boundary event
//! - **One failure-recovery mechanism**: any packet arriving out of the
//!   expected state resets the whole channel back to SHUT and renegotiates.
//!   No partial repair, ever.
//! - **Timer-driven**: every state re-announces or expires on a deadline, so
//!   packet loss leads to retry or reset, never an indefinite hang.

pub mod channel;
pub mod error;
pub mod link;
pub mod packet;
pub mod timer;

pub use channel::{
    ChannelEvent, ChannelIo, ChannelState, CircuitId, ItcChannel, SiteInKind, ANNOUNCE_PERIOD,
    CIRCUIT_TIMEOUT, MAX_EWSLOT,
};
pub use error::{ItcError, ItcResult};
pub use link::{link_pair, link_pair_with_capacity, Link, LINK_CAPACITY};
pub use packet::{
    decode, encode, state_announcement, Packet, PacketBuffer, SiteUpdate, SiteVec,
    MAX_PACKET_SIZE, MAX_SITES_PER_PACKET, PKT_CLASS_STANDARD, PROTOCOL_VERSION,
};
pub use timer::TimerQueue;
