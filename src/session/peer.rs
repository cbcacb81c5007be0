//! Peer endpoint. Owns one sending ring end, one receiving ring end, the
//! sync engine, and the peer's active range set, and drives all of them
//! from a cooperative poll loop. Channel sends are the only operations
//! here that may spin; a lookahead stall is reported, never waited out.

use crate::channel::{CpuToMem, Direction, MemToCpu, Receiver, Sender};
use crate::clock::{Advance, SyncConfig, SyncEngine, Tick};
use crate::ranges::{RangeNegotiator, RangeSet};
use crate::wire::{Message, OutboundMsg, PacketMsg};

use super::SessionError;

/// Compute-side endpoint: produces Compute→Memory, consumes
/// Memory→Compute.
pub type CpuPeer<'a> = Peer<'a, CpuToMem, MemToCpu>;
/// Memory-side endpoint: the mirror image.
pub type MemPeer<'a> = Peer<'a, MemToCpu, CpuToMem>;

/// Something the simulator must react to.
#[derive(Debug)]
pub enum PeerEvent {
    /// A memory packet arrived. The head is delivered verbatim; command
    /// and flag words are for the coherence logic to interpret.
    Packet { head: PacketMsg, data: Vec<u8> },
    /// The peer replaced its advertised range set.
    RangesReplaced,
    /// Peer time moved (sync or dummy arrival); nothing to deliver.
    Advanced(Tick),
}

pub struct Peer<'a, TX: Direction, RX: Direction> {
    tx: Sender<'a, TX>,
    rx: Receiver<'a, RX>,
    clock: SyncEngine,
    peer_ranges: RangeNegotiator,
    next_packet_id: u64,
}

impl<'a, TX: Direction, RX: Direction> Peer<'a, TX, RX> {
    pub fn new(tx: Sender<'a, TX>, rx: Receiver<'a, RX>, sync: SyncConfig) -> Self {
        Self {
            tx,
            rx,
            clock: SyncEngine::new(sync),
            peer_ranges: RangeNegotiator::new(),
            next_packet_id: 0,
        }
    }

    #[inline(always)]
    pub fn clock(&self) -> &SyncEngine {
        &self.clock
    }

    /// The peer's active advertisement, if negotiation has happened.
    #[inline(always)]
    pub fn peer_ranges(&self) -> Option<&RangeSet> {
        self.peer_ranges.active()
    }

    /// Routing query against the peer's active set.
    #[inline(always)]
    pub fn peer_responsible_for(&self, addr: u64) -> bool {
        self.peer_ranges.responsible_for(addr)
    }

    /// Try to move simulated time forward. On a stall the mandated sync
    /// beacon goes out at once (first stall per silence only), and the
    /// caller should poll until the peer acknowledges.
    pub fn advance(&mut self, to: Tick) -> Result<Advance, SessionError> {
        let outcome = self.clock.try_advance(to);
        if let Advance::Stalled { horizon } = outcome {
            log::trace!("lookahead stall at {}, horizon {}", to, horizon);
            self.emit_sync_if_due()?;
        }
        Ok(outcome)
    }

    /// Stamp and send one packet. The packet id and timestamp are
    /// assigned here; everything else in `head` is the caller's.
    pub fn send_packet(&mut self, mut head: PacketMsg, data: &[u8]) -> Result<Tick, SessionError> {
        self.next_packet_id += 1;
        head.packet_id = self.next_packet_id;
        head.timestamp = self.clock.stamp();
        let timestamp = head.timestamp;
        self.tx.send(&OutboundMsg::Packet { head: &head, data })?;
        Ok(timestamp)
    }

    /// Advertise our range set to the peer.
    pub fn advertise(&mut self, set: &RangeSet) -> Result<(), SessionError> {
        let msg = set.to_msg(self.clock.stamp());
        self.tx.send(&OutboundMsg::Ranges(&msg))?;
        log::debug!("advertised {} ranges as {:?}", set.len(), set.role());
        Ok(())
    }

    /// Emit a sync beacon if the engine says one is owed.
    pub fn emit_sync_if_due(&mut self) -> Result<bool, SessionError> {
        match self.clock.poll_beacon() {
            Some(timestamp) => {
                self.tx.send(&OutboundMsg::Sync { timestamp })?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Service the channel once: send any owed beacon, then consume at
    /// most one inbound message. Every arrival advances `peer_time`,
    /// dummies included.
    pub fn poll(&mut self) -> Result<Option<PeerEvent>, SessionError> {
        self.emit_sync_if_due()?;

        let Some(slot) = self.rx.try_recv() else {
            return Ok(None);
        };

        let event = match slot.message()? {
            Message::Packet { head, data } => {
                self.clock.observe(head.timestamp);
                Some(PeerEvent::Packet {
                    head: *head,
                    data: data.to_vec(),
                })
            }
            Message::Ranges(msg) => {
                self.clock.observe(msg.timestamp);
                self.peer_ranges.apply(msg)?;
                Some(PeerEvent::RangesReplaced)
            }
            Message::Sync { timestamp } => {
                self.clock.observe(timestamp);
                Some(PeerEvent::Advanced(timestamp))
            }
            Message::Dummy { timestamp } => {
                // Placeholder slot: timestamp still counts, nothing else.
                self.clock.observe(timestamp);
                Some(PeerEvent::Advanced(timestamp))
            }
        };
        Ok(event)
    }

    /// Drain the inbound ring, collecting packets and range updates.
    /// Returns when the ring is empty.
    pub fn poll_all(&mut self, events: &mut Vec<PeerEvent>) -> Result<(), SessionError> {
        while let Some(event) = self.poll()? {
            if !matches!(event, PeerEvent::Advanced(_)) {
                events.push(event);
            }
        }
        Ok(())
    }
}
