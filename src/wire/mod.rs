//! The codec. Pinned enumerations, packed slot layouts, encode/decode.

pub mod command;
pub mod message;

pub use command::{
    Attribute, CoherenceFlags, Command, HtmCacheFailure, PacketFlags, PrivateFlags, ReqFlags,
};
pub use message::{
    decode, encode, MemRequest, Message, OutboundMsg, PacketMsg, RangeMsg, SyncMsg, WireError,
    HEADER_SIZE, KIND_DATA, KIND_DUMMY, KIND_MASK, KIND_SYNC, MAX_RANGES, MEM_REQUEST_SIZE,
    OFF_OWN_TYPE, OFF_PKT_TYPE, OFF_TIMESTAMP, OWN_MASK, PACKET_FIXED_SIZE, PKT_ADDR_RANGE,
    PKT_FUNCTIONAL, PKT_INT_REQ_PROXY, PKT_INT_RESP_PROXY, PKT_PIO_PROXY, PKT_TIMING,
    RANGE_MSG_SIZE,
};
