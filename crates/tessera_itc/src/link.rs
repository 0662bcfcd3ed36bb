//! # Tile Links
//!
//! A link is one direction's bidirectional pipe between two adjacent tiles.
//! Each endpoint holds a bounded sender toward the peer and a receiver from
//! it. Sends never block: a full pipe is reported so the caller can back off
//! and retry on a later service pass, preserving packet order.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};

use crate::error::{ItcError, ItcResult};
use crate::packet::PacketBuffer;

/// Default bounded capacity per pipe direction.
pub const LINK_CAPACITY: usize = 64;

/// One endpoint of an inter-tile pipe.
#[derive(Clone, Debug)]
pub struct Link {
    outbound: Sender<PacketBuffer>,
    inbound: Receiver<PacketBuffer>,
}

/// Creates both endpoints of a link with the default capacity.
#[must_use]
pub fn link_pair() -> (Link, Link) {
    link_pair_with_capacity(LINK_CAPACITY)
}

/// Creates both endpoints of a link with an explicit per-direction capacity.
#[must_use]
pub fn link_pair_with_capacity(capacity: usize) -> (Link, Link) {
    let (a_to_b, from_a) = bounded(capacity);
    let (b_to_a, from_b) = bounded(capacity);
    (
        Link {
            outbound: a_to_b,
            inbound: from_b,
        },
        Link {
            outbound: b_to_a,
            inbound: from_a,
        },
    )
}

impl Link {
    /// Queues one packet toward the peer without blocking.
    pub fn send(&self, packet: PacketBuffer) -> ItcResult<()> {
        match self.outbound.try_send(packet) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ItcError::LinkFull),
            Err(TrySendError::Disconnected(_)) => Err(ItcError::LinkDisconnected),
        }
    }

    /// Takes one inbound packet, if any.
    pub fn try_recv(&self) -> ItcResult<Option<PacketBuffer>> {
        match self.inbound.try_recv() {
            Ok(packet) => Ok(Some(packet)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ItcError::LinkDisconnected),
        }
    }

    /// Returns true iff nothing is waiting in either pipe direction.
    ///
    /// Used by pause sweeps to establish quiescence.
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.outbound.is_empty() && self.inbound.is_empty()
    }

    /// A receiver handle for observing the inbound pipe from another thread.
    #[must_use]
    pub fn inbound_watch(&self) -> Receiver<PacketBuffer> {
        self.inbound.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{encode, state_announcement};
    use tessera_core::Dir;

    fn any_packet() -> PacketBuffer {
        encode(Dir::East, &state_announcement(1)).unwrap()
    }

    #[test]
    fn test_packets_cross_in_order() {
        let (a, b) = link_pair();
        for state in 0..4u8 {
            a.send(encode(Dir::East, &state_announcement(state)).unwrap())
                .unwrap();
        }
        for state in 0..4u8 {
            let buf = b.try_recv().unwrap().unwrap();
            assert_eq!(buf.as_slice()[1] & 0x0F, state);
        }
        assert!(b.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_full_pipe_reports_backpressure() {
        let (a, _b) = link_pair_with_capacity(2);
        a.send(any_packet()).unwrap();
        a.send(any_packet()).unwrap();
        assert_eq!(a.send(any_packet()).unwrap_err(), ItcError::LinkFull);
    }

    #[test]
    fn test_dropped_peer_reports_disconnect() {
        let (a, b) = link_pair();
        drop(b);
        assert_eq!(a.send(any_packet()).unwrap_err(), ItcError::LinkDisconnected);
        assert_eq!(a.try_recv().unwrap_err(), ItcError::LinkDisconnected);
    }

    #[test]
    fn test_quiet_after_drain() {
        let (a, b) = link_pair();
        a.send(any_packet()).unwrap();
        assert!(!a.is_quiet());
        assert!(!b.is_quiet());
        let _ = b.try_recv().unwrap();
        assert!(a.is_quiet());
        assert!(b.is_quiet());
    }
}
