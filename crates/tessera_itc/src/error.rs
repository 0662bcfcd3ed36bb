//! # ITC Error Types
//!
//! Protocol desynchronization errors all funnel into one recovery: reset the
//! channel to SHUT and renegotiate. Resource exhaustion (no free circuit,
//! full link) is a backoff condition reported to the caller.

use thiserror::Error;

/// Errors that can occur in the inter-tile circuit protocol.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItcError {
    /// Packet would not fit the fixed wire buffer.
    #[error("packet overflow")]
    PacketOverflow,

    /// First byte does not carry the standard packet class.
    #[error("bad packet header byte {byte:#04x}")]
    BadHeader {
        /// The offending header byte.
        byte: u8,
    },

    /// Unknown sub-command nibble.
    #[error("bad packet command {command:#x}")]
    BadCommand {
        /// The offending command value.
        command: u8,
    },

    /// Packet ended before its declared payload.
    #[error("truncated packet")]
    Truncated,

    /// Site count exceeds the per-packet maximum.
    #[error("bad site count {count}")]
    BadSiteCount {
        /// The offending count.
        count: u8,
    },

    /// Packet arrived on the wrong directional channel.
    #[error("packet for direction {got} on channel expecting {expected}")]
    WrongDirection {
        /// Direction index this channel expects.
        expected: u8,
        /// Direction index the packet carried.
        got: u8,
    },

    /// Packet arrived in a state that does not accept it.
    #[error("unexpected {what} packet in state {state}")]
    UnexpectedPacket {
        /// Short name of the packet kind.
        what: &'static str,
        /// Name of the state that rejected it.
        state: &'static str,
    },

    /// Peer announced an incompatible protocol version or atom width.
    #[error("incompatible peer: version {version}, atom bits {atom_bits}")]
    IncompatiblePeer {
        /// Peer's protocol version.
        version: u8,
        /// Peer's atom bit width.
        atom_bits: u8,
    },

    /// All circuit slots are in use; caller backs off this cycle.
    #[error("no free circuit slot")]
    NoFreeCircuit,

    /// The named circuit is not in a state that permits the operation.
    #[error("circuit {circuit} not in required state")]
    CircuitOutOfState {
        /// The circuit slot number.
        circuit: u8,
    },

    /// The link's bounded queue is full; transient backpressure.
    #[error("link full")]
    LinkFull,

    /// The link peer is gone; treated as a dead neighbor.
    #[error("link disconnected")]
    LinkDisconnected,
}

/// Result type for protocol operations.
pub type ItcResult<T> = Result<T, ItcError>;
