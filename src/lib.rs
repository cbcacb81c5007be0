#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

//! memlink: the transport between a compute-side and a memory-side
//! simulator. Fixed-layout packet/sync/range messages, per-direction
//! ownership-bit slot rings, and a virtual-time discipline that bounds
//! how far either simulator may run ahead of the other.

pub mod channel;
pub mod clock;
pub mod ranges;
pub mod wire;

#[cfg(feature = "transport")]
pub mod session;

/// Prelude for convenient imports of primary API types.
pub mod prelude {
    pub use crate::channel::{
        Backoff, ChannelConfig, ChannelError, CpuToMem, Direction, MemToCpu, Receiver, RecvSlot,
        Sender, SlotRing,
    };
    #[cfg(feature = "std")]
    pub use crate::channel::ChannelPair;
    pub use crate::clock::{Advance, SyncConfig, SyncEngine, Tick};
    pub use crate::ranges::{PhysRange, ProxyRole, RangeError, RangeNegotiator, RangeSet};
    pub use crate::wire::{
        Command, MemRequest, Message, OutboundMsg, PacketMsg, RangeMsg, SyncMsg, WireError,
    };

    #[cfg(feature = "transport")]
    pub use crate::session::{AdapterParams, CpuPeer, MemPeer, Peer, PeerEvent, SessionError};
}

// Re-export primary types at crate root for convenience.
pub use channel::{
    Backoff, ChannelConfig, ChannelError, CpuToMem, Direction, MemToCpu, Receiver, RecvSlot,
    Sender, SlotRing,
};
#[cfg(feature = "std")]
pub use channel::ChannelPair;
pub use clock::{Advance, SyncConfig, SyncEngine, Tick};
pub use ranges::{PhysRange, ProxyRole, RangeError, RangeNegotiator, RangeSet};
pub use wire::{
    Command, MemRequest, Message, OutboundMsg, PacketMsg, RangeMsg, SyncMsg, WireError,
};

#[cfg(feature = "transport")]
pub use session::{AdapterParams, CpuPeer, MemPeer, Peer, PeerEvent, SessionError};
