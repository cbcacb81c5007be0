//! Slot message layouts and the encode/decode pair.
//!
//! Every message occupies one fixed-size slot. The first 65 bytes are
//! common to all kinds: a reserved header region, the virtual-time stamp,
//! and the two discriminator bytes. `own_type` carries the ownership bit
//! (0x80) plus the message-kind bits (0x7f); `pkt_type` carries the
//! timing/functional bit, the address-range bit, and the one-hot proxy
//! role bits. Layouts are packed and little-endian; encode zeroes every
//! reserved byte because the slot crosses a process boundary.

use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::command::{
    Command, CoherenceFlags, HtmCacheFailure, PacketFlags, PrivateFlags, ReqFlags,
};

/// Ownership bit inside `own_type`. Meaning is direction-specific; see the
/// channel module.
pub const OWN_MASK: u8 = 0x80;
/// Message-kind bits inside `own_type`.
pub const KIND_MASK: u8 = 0x7f;

/// No-op placeholder. A zeroed slot parses as a producer-owned dummy.
pub const KIND_DUMMY: u8 = 0x0;
/// Pure timestamp carrier.
pub const KIND_SYNC: u8 = 0x1;
/// Packet or address-range advertisement, split by `PKT_ADDR_RANGE`.
pub const KIND_DATA: u8 = 0x2;

pub const PKT_FUNCTIONAL: u8 = 0x00;
pub const PKT_TIMING: u8 = 0x01;
pub const PKT_ADDR_RANGE: u8 = 1 << 1;
pub const PKT_PIO_PROXY: u8 = 1 << 2;
pub const PKT_INT_REQ_PROXY: u8 = 1 << 3;
pub const PKT_INT_RESP_PROXY: u8 = 1 << 4;

pub const OFF_TIMESTAMP: usize = 48;
pub const OFF_OWN_TYPE: usize = 63;
pub const OFF_PKT_TYPE: usize = 64;

/// Size of the common header, which is also the full size of sync and
/// dummy messages.
pub const HEADER_SIZE: usize = 65;

/// Maximum ranges one advertisement can carry.
pub const MAX_RANGES: usize = 150;

/// Decode/encode failure. Any of these is fatal to the session: the peers
/// no longer agree on the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// `own_type` kind bits match no known message kind.
    UnknownKind,
    /// Command ordinal is not in the pinned table.
    UnknownCommand,
    /// HTM outcome ordinal is not in the pinned table.
    UnknownHtmOutcome,
    /// Slot shorter than the fixed region of the claimed kind.
    Truncated,
    /// Declared payload length would read past the slot capacity.
    PayloadOverrun,
    /// Payload slice does not match the packet's declared size.
    SizeMismatch,
    /// Advertisement claims more ranges than the format holds.
    RangeOverflow,
}

/// Serialized memory request embedded in every packet. All fields are
/// delivered unchanged; which optional fields are meaningful is governed
/// by `private_flags` on the consumer's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C, packed)]
pub struct MemRequest {
    pub paddr: u64,
    pub size: u32,
    pub byte_enable: u64,
    pub requestor_id: u16,
    pub flags: ReqFlags,
    pub cache_coherence_flags: CoherenceFlags,
    pub private_flags: PrivateFlags,
    /// Virtual time the request was created.
    pub time: u64,
    pub task_id: u32,
    pub stream_id: u32,
    pub vaddr: u64,
    pub extra_data: u64,
    pub context_id: i32,
    pub pc: u64,
    pub inst_seq_num: u64,
    pub inst_count: i64,
    /// Monotonically increasing per-requestor counter.
    pub req_count: u64,
}

pub const MEM_REQUEST_SIZE: usize = 108;

const _: () = {
    assert!(core::mem::size_of::<MemRequest>() == MEM_REQUEST_SIZE);
};

impl MemRequest {
    pub fn new(paddr: u64, size: u32) -> Self {
        let mut req = Self::new_zeroed();
        req.paddr = paddr;
        req.size = size;
        req.private_flags = PrivateFlags::VALID_PADDR.union(PrivateFlags::VALID_SIZE);
        req
    }
}

/// Fixed region of a packet message. The data payload trails immediately
/// after; its length is the packet-level `size` field, never a separate
/// length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C, packed)]
pub struct PacketMsg {
    reserved0: [u8; 48],
    pub timestamp: u64,
    reserved1: [u8; 7],
    pub own_type: u8,
    pub pkt_type: u8,
    pub flags: PacketFlags,
    /// Raw command ordinal; validated through [`Command::from_u32`] at decode.
    pub cmd: u32,
    pub packet_id: u64,
    pub is_secure: u8,
    pub qos_value: u8,
    pub req: MemRequest,
    /// Packet-level address. Governs the wire transfer; may differ from
    /// `req.paddr` for sub-block accesses.
    pub addr: u64,
    /// Packet-level size. Governs the trailing payload length.
    pub size: u32,
    pub bytes_valid: u64,
    pub htm_return_reason: u32,
    pub htm_transaction_uid: u64,
    pub header_delay: u32,
    pub snoop_delay: u32,
    pub payload_delay: u32,
}

pub const PACKET_FIXED_SIZE: usize = 235;

const _: () = {
    assert!(core::mem::size_of::<PacketMsg>() == PACKET_FIXED_SIZE);
};

impl PacketMsg {
    pub fn new(cmd: Command, addr: u64, size: u32) -> Self {
        let mut msg = Self::new_zeroed();
        msg.pkt_type = PKT_TIMING;
        msg.cmd = cmd.as_u32();
        msg.addr = addr;
        msg.size = size;
        msg
    }

    #[inline]
    pub fn command(&self) -> Result<Command, WireError> {
        Command::from_u32(self.cmd).ok_or(WireError::UnknownCommand)
    }

    #[inline]
    pub fn htm_outcome(&self) -> Result<HtmCacheFailure, WireError> {
        HtmCacheFailure::from_u32(self.htm_return_reason).ok_or(WireError::UnknownHtmOutcome)
    }

    #[inline(always)]
    pub fn is_timing(&self) -> bool {
        self.pkt_type & PKT_TIMING != 0
    }
}

/// Sync beacon and dummy placeholder share this shape: header only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C, packed)]
pub struct SyncMsg {
    reserved0: [u8; 48],
    pub timestamp: u64,
    reserved1: [u8; 7],
    pub own_type: u8,
    pub pkt_type: u8,
}

const _: () = {
    assert!(core::mem::size_of::<SyncMsg>() == HEADER_SIZE);
};

impl SyncMsg {
    pub fn new(timestamp: u64) -> Self {
        let mut msg = Self::new_zeroed();
        msg.timestamp = timestamp;
        msg
    }
}

/// Address-range advertisement: up to [`MAX_RANGES`] half-open
/// `[start, end)` ranges, tagged with a proxy role in `pkt_type`.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C, packed)]
pub struct RangeMsg {
    reserved0: [u8; 48],
    pub timestamp: u64,
    reserved1: [u8; 7],
    pub own_type: u8,
    pub pkt_type: u8,
    /// Number of populated range entries.
    pub count: u8,
    pub starts: [u64; MAX_RANGES],
    pub ends: [u64; MAX_RANGES],
}

pub const RANGE_MSG_SIZE: usize = 2466;

const _: () = {
    assert!(core::mem::size_of::<RangeMsg>() == RANGE_MSG_SIZE);
};

impl RangeMsg {
    pub fn new(timestamp: u64) -> Self {
        let mut msg = Self::new_zeroed();
        msg.timestamp = timestamp;
        msg.pkt_type = PKT_ADDR_RANGE;
        msg
    }
}

impl core::fmt::Debug for RangeMsg {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let timestamp = self.timestamp;
        let pkt_type = self.pkt_type;
        f.debug_struct("RangeMsg")
            .field("timestamp", &timestamp)
            .field("pkt_type", &pkt_type)
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}

/// A decoded message, borrowing the slot bytes it was read from. The
/// borrow ends before the slot is released back to the producer.
#[derive(Debug)]
pub enum Message<'a> {
    Packet { head: &'a PacketMsg, data: &'a [u8] },
    Sync { timestamp: u64 },
    Ranges(&'a RangeMsg),
    Dummy { timestamp: u64 },
}

impl Message<'_> {
    /// Virtual-time stamp. Every kind carries one; the sync engine
    /// consumes it regardless of kind.
    #[inline]
    pub fn timestamp(&self) -> u64 {
        match self {
            Message::Packet { head, .. } => head.timestamp,
            Message::Sync { timestamp } => *timestamp,
            Message::Ranges(msg) => msg.timestamp,
            Message::Dummy { timestamp } => *timestamp,
        }
    }
}

/// A message about to be written into a slot.
#[derive(Debug, Clone, Copy)]
pub enum OutboundMsg<'a> {
    Packet { head: &'a PacketMsg, data: &'a [u8] },
    Sync { timestamp: u64 },
    Ranges(&'a RangeMsg),
    Dummy { timestamp: u64 },
}

/// Decode one slot. The discriminator bytes are read first; everything
/// else is interpreted only once the kind is known. The ownership bit is
/// the channel's concern and is ignored here.
pub fn decode(slot: &[u8]) -> Result<Message<'_>, WireError> {
    if slot.len() < HEADER_SIZE {
        return Err(WireError::Truncated);
    }

    let kind = slot[OFF_OWN_TYPE] & KIND_MASK;
    match kind {
        KIND_SYNC | KIND_DUMMY => {
            let timestamp = read_timestamp(slot);
            if kind == KIND_SYNC {
                Ok(Message::Sync { timestamp })
            } else {
                Ok(Message::Dummy { timestamp })
            }
        }
        KIND_DATA => {
            if slot[OFF_PKT_TYPE] & PKT_ADDR_RANGE != 0 {
                let (msg, _) =
                    RangeMsg::ref_from_prefix(slot).map_err(|_| WireError::Truncated)?;
                if msg.count as usize > MAX_RANGES {
                    return Err(WireError::RangeOverflow);
                }
                Ok(Message::Ranges(msg))
            } else {
                let (head, tail) =
                    PacketMsg::ref_from_prefix(slot).map_err(|_| WireError::Truncated)?;
                head.command()?;
                head.htm_outcome()?;
                let len = head.size as usize;
                if len > tail.len() {
                    return Err(WireError::PayloadOverrun);
                }
                Ok(Message::Packet {
                    head,
                    data: &tail[..len],
                })
            }
        }
        _ => Err(WireError::UnknownKind),
    }
}

/// Encode one message into a slot, zeroing everything the message does
/// not cover, and return the kind bits the channel must publish.
///
/// The byte at [`OFF_OWN_TYPE`] is never written here: it is the
/// channel's sole synchronization point, written only by the publish and
/// release stores, so the codec must not issue a plain store that could
/// race the consumer's poll.
pub fn encode(slot: &mut [u8], msg: &OutboundMsg<'_>) -> Result<u8, WireError> {
    match msg {
        OutboundMsg::Packet { head, data } => {
            if head.size as usize != data.len() {
                return Err(WireError::SizeMismatch);
            }
            let total = PACKET_FIXED_SIZE + data.len();
            if slot.len() < total {
                return Err(WireError::PayloadOverrun);
            }
            copy_skip_own(slot, head.as_bytes());
            // A packet must not carry the address-range discriminator.
            slot[OFF_PKT_TYPE] &= !PKT_ADDR_RANGE;
            slot[PACKET_FIXED_SIZE..total].copy_from_slice(data);
            zero_tail(slot, total);
            Ok(KIND_DATA)
        }
        OutboundMsg::Ranges(ranges) => {
            if slot.len() < RANGE_MSG_SIZE {
                return Err(WireError::Truncated);
            }
            if ranges.count as usize > MAX_RANGES {
                return Err(WireError::RangeOverflow);
            }
            copy_skip_own(slot, ranges.as_bytes());
            slot[OFF_PKT_TYPE] |= PKT_ADDR_RANGE;
            zero_tail(slot, RANGE_MSG_SIZE);
            Ok(KIND_DATA)
        }
        OutboundMsg::Sync { timestamp } => {
            write_header_only(slot, *timestamp)?;
            Ok(KIND_SYNC)
        }
        OutboundMsg::Dummy { timestamp } => {
            write_header_only(slot, *timestamp)?;
            Ok(KIND_DUMMY)
        }
    }
}

#[inline]
fn read_timestamp(slot: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&slot[OFF_TIMESTAMP..OFF_TIMESTAMP + 8]);
    u64::from_le_bytes(bytes)
}

fn write_header_only(slot: &mut [u8], timestamp: u64) -> Result<(), WireError> {
    if slot.len() < HEADER_SIZE {
        return Err(WireError::Truncated);
    }
    let msg = SyncMsg::new(timestamp);
    copy_skip_own(slot, msg.as_bytes());
    zero_tail(slot, HEADER_SIZE);
    Ok(())
}

/// Copy a fixed message region into the slot, skipping the ownership
/// byte.
#[inline]
fn copy_skip_own(slot: &mut [u8], src: &[u8]) {
    slot[..OFF_OWN_TYPE].copy_from_slice(&src[..OFF_OWN_TYPE]);
    slot[OFF_OWN_TYPE + 1..src.len()].copy_from_slice(&src[OFF_OWN_TYPE + 1..]);
}

#[inline]
fn zero_tail(slot: &mut [u8], from: usize) {
    for b in &mut slot[from..] {
        *b = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLOT: usize = 4096;

    #[test]
    fn test_layout_sizes() {
        assert_eq!(core::mem::size_of::<MemRequest>(), 108);
        assert_eq!(core::mem::size_of::<PacketMsg>(), 235);
        assert_eq!(core::mem::size_of::<SyncMsg>(), 65);
        assert_eq!(core::mem::size_of::<RangeMsg>(), 2466);
    }

    #[test]
    fn test_discriminator_offsets() {
        let mut msg = SyncMsg::new(0x1122_3344_5566_7788);
        msg.own_type = 0xab;
        msg.pkt_type = 0xcd;
        let bytes = msg.as_bytes();
        assert_eq!(bytes[OFF_OWN_TYPE], 0xab);
        assert_eq!(bytes[OFF_PKT_TYPE], 0xcd);
        assert_eq!(
            &bytes[OFF_TIMESTAMP..OFF_TIMESTAMP + 8],
            &0x1122_3344_5566_7788u64.to_le_bytes()
        );
        // Reserved regions stay zeroed.
        assert!(bytes[..OFF_TIMESTAMP].iter().all(|&b| b == 0));
        assert!(bytes[OFF_TIMESTAMP + 8..OFF_OWN_TYPE].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_packet_field_offsets() {
        let mut head = PacketMsg::new(Command::ReadReq, 0xdead_beef, 4);
        head.timestamp = 7;
        head.packet_id = 0x0102_0304_0506_0708;
        let bytes = head.as_bytes();
        // cmd lives right after the 4-byte flags word at offset 65.
        assert_eq!(&bytes[69..73], &(Command::ReadReq as u32).to_le_bytes());
        assert_eq!(&bytes[73..81], &0x0102_0304_0506_0708u64.to_le_bytes());
        // Packet-level addr sits after the embedded request (83 + 108).
        assert_eq!(&bytes[191..199], &0xdead_beefu64.to_le_bytes());
        assert_eq!(&bytes[199..203], &4u32.to_le_bytes());
    }

    #[test]
    fn test_packet_roundtrip() {
        let mut head = PacketMsg::new(Command::WriteReq, 0x1000, 8);
        head.timestamp = 42;
        head.req = MemRequest::new(0x1000, 8);
        head.req.requestor_id = 3;
        head.req.req_count = 17;
        let data = [0xa5u8; 8];

        let mut slot = [0u8; SLOT];
        let kind = encode(&mut slot, &OutboundMsg::Packet { head: &head, data: &data }).unwrap();
        assert_eq!(kind, KIND_DATA);
        slot[OFF_OWN_TYPE] = kind;

        match decode(&slot).unwrap() {
            Message::Packet { head: got, data: got_data } => {
                assert_eq!(got.command().unwrap(), Command::WriteReq);
                let addr = got.addr;
                let ts = got.timestamp;
                let rid = got.req.requestor_id;
                let rc = got.req.req_count;
                assert_eq!(addr, 0x1000);
                assert_eq!(ts, 42);
                assert_eq!(rid, 3);
                assert_eq!(rc, 17);
                assert_eq!(got_data, &data);
            }
            other => panic!("expected packet, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_size_packet() {
        let head = PacketMsg::new(Command::CleanEvict, 0x2000, 0);
        let mut slot = [0u8; SLOT];
        let kind = encode(&mut slot, &OutboundMsg::Packet { head: &head, data: &[] }).unwrap();
        slot[OFF_OWN_TYPE] = kind;
        match decode(&slot).unwrap() {
            Message::Packet { data, .. } => assert!(data.is_empty()),
            other => panic!("expected packet, got {:?}", other),
        }
    }

    #[test]
    fn test_sync_roundtrip() {
        let mut slot = [0u8; SLOT];
        let kind = encode(&mut slot, &OutboundMsg::Sync { timestamp: u64::MAX }).unwrap();
        assert_eq!(kind, KIND_SYNC);
        slot[OFF_OWN_TYPE] = kind;
        match decode(&slot).unwrap() {
            Message::Sync { timestamp } => assert_eq!(timestamp, u64::MAX),
            other => panic!("expected sync, got {:?}", other),
        }
    }

    #[test]
    fn test_dummy_roundtrip() {
        let mut slot = [0u8; SLOT];
        let kind = encode(&mut slot, &OutboundMsg::Dummy { timestamp: 5 }).unwrap();
        assert_eq!(kind, KIND_DUMMY);
        slot[OFF_OWN_TYPE] = kind;
        match decode(&slot).unwrap() {
            Message::Dummy { timestamp } => assert_eq!(timestamp, 5),
            other => panic!("expected dummy, got {:?}", other),
        }
    }

    #[test]
    fn test_zeroed_slot_is_dummy() {
        let slot = [0u8; SLOT];
        match decode(&slot).unwrap() {
            Message::Dummy { timestamp } => assert_eq!(timestamp, 0),
            other => panic!("expected dummy, got {:?}", other),
        }
    }

    #[test]
    fn test_ranges_roundtrip() {
        let mut ranges = RangeMsg::new(9);
        ranges.count = 2;
        ranges.starts[0] = 0x0;
        ranges.ends[0] = 0x1000;
        ranges.starts[1] = 0x2000;
        ranges.ends[1] = 0x3000;
        ranges.pkt_type |= PKT_PIO_PROXY;

        let mut slot = [0u8; SLOT];
        let kind = encode(&mut slot, &OutboundMsg::Ranges(&ranges)).unwrap();
        assert_eq!(kind, KIND_DATA);
        slot[OFF_OWN_TYPE] = kind;

        match decode(&slot).unwrap() {
            Message::Ranges(got) => {
                assert_eq!(got.count, 2);
                let s1 = got.starts[1];
                let e1 = got.ends[1];
                assert_eq!(s1, 0x2000);
                assert_eq!(e1, 0x3000);
                assert_ne!(got.pkt_type & PKT_PIO_PROXY, 0);
            }
            other => panic!("expected ranges, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let mut slot = [0u8; SLOT];
        slot[OFF_OWN_TYPE] = 0x7f;
        assert_eq!(decode(&slot).unwrap_err(), WireError::UnknownKind);
    }

    #[test]
    fn test_unknown_command_rejected() {
        let mut head = PacketMsg::new(Command::ReadReq, 0, 0);
        head.cmd = 33; // retired ordinal
        let mut slot = [0u8; SLOT];
        let kind = encode(&mut slot, &OutboundMsg::Packet { head: &head, data: &[] }).unwrap();
        slot[OFF_OWN_TYPE] = kind;
        assert_eq!(decode(&slot).unwrap_err(), WireError::UnknownCommand);
    }

    #[test]
    fn test_payload_overrun_rejected() {
        let mut head = PacketMsg::new(Command::ReadResp, 0, 0);
        head.size = (SLOT - PACKET_FIXED_SIZE + 1) as u32;
        let mut slot = [0u8; SLOT];
        // Write the head manually; encode would already refuse it.
        slot[..PACKET_FIXED_SIZE].copy_from_slice(head.as_bytes());
        slot[OFF_OWN_TYPE] = KIND_DATA;
        assert_eq!(decode(&slot).unwrap_err(), WireError::PayloadOverrun);
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let head = PacketMsg::new(Command::WriteReq, 0, 16);
        let mut slot = [0u8; SLOT];
        let err = encode(&mut slot, &OutboundMsg::Packet { head: &head, data: &[0u8; 8] });
        assert_eq!(err.unwrap_err(), WireError::SizeMismatch);
    }

    #[test]
    fn test_range_overflow_rejected() {
        let mut ranges = RangeMsg::new(0);
        ranges.count = (MAX_RANGES + 1) as u8;
        let mut slot = [0u8; SLOT];
        let err = encode(&mut slot, &OutboundMsg::Ranges(&ranges));
        assert_eq!(err.unwrap_err(), WireError::RangeOverflow);

        // And on the decode side, with the count patched in raw bytes.
        ranges.count = 0;
        let kind = encode(&mut slot, &OutboundMsg::Ranges(&ranges)).unwrap();
        slot[OFF_OWN_TYPE] = kind;
        slot[HEADER_SIZE] = (MAX_RANGES + 1) as u8;
        assert_eq!(decode(&slot).unwrap_err(), WireError::RangeOverflow);
    }

    #[test]
    fn test_truncated_slot_rejected() {
        let slot = [0u8; HEADER_SIZE - 1];
        assert_eq!(decode(&slot).unwrap_err(), WireError::Truncated);

        // A slot too small for an advertisement.
        let mut small = [0u8; 128];
        small[OFF_OWN_TYPE] = KIND_DATA;
        small[OFF_PKT_TYPE] = PKT_ADDR_RANGE;
        assert_eq!(decode(&small).unwrap_err(), WireError::Truncated);
    }

    #[test]
    fn test_slot_reuse_zeroes_residue() {
        let mut slot = [0u8; SLOT];

        // First occupant: a full advertisement smears 2466 bytes.
        let mut ranges = RangeMsg::new(1);
        ranges.count = 150;
        for i in 0..150 {
            ranges.starts[i] = 0x1_0000 * i as u64;
            ranges.ends[i] = 0x1_0000 * i as u64 + 0x100;
        }
        encode(&mut slot, &OutboundMsg::Ranges(&ranges)).unwrap();

        // Second occupant: a sync must leave nothing behind.
        encode(&mut slot, &OutboundMsg::Sync { timestamp: 2 }).unwrap();
        assert!(slot[HEADER_SIZE..].iter().all(|&b| b == 0));
        assert!(slot[..OFF_TIMESTAMP].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_max_payload_fills_slot() {
        let cap = SLOT - PACKET_FIXED_SIZE;
        let data = alloc_payload(cap);
        let head = PacketMsg::new(Command::WriteReq, 0, cap as u32);
        let mut slot = [0u8; SLOT];
        let kind = encode(&mut slot, &OutboundMsg::Packet { head: &head, data: &data }).unwrap();
        slot[OFF_OWN_TYPE] = kind;
        match decode(&slot).unwrap() {
            Message::Packet { data: got, .. } => assert_eq!(got.len(), cap),
            other => panic!("expected packet, got {:?}", other),
        }
    }

    fn alloc_payload(len: usize) -> std::vec::Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }
}
