//! Session plumbing: adapter descriptors, the establishment handshake,
//! the peer driver, and the shared-memory region that carries the rings.
//! Everything here is host glue; the protocol lives in `wire`, `channel`,
//! `clock`, and `ranges`.

pub mod config;
pub mod handshake;
pub mod peer;

#[cfg(target_os = "linux")]
pub mod shm;

pub use config::{AdapterParams, ConfigError};
pub use handshake::{IntroMsg, INTRO_FLAG_SYNC, INTRO_MAGIC, INTRO_SIZE, INTRO_VERSION};
pub use peer::{CpuPeer, MemPeer, Peer, PeerEvent};

#[cfg(target_os = "linux")]
pub use shm::ShmRegion;

use crate::channel::ChannelError;
use crate::ranges::RangeError;
use crate::wire::WireError;

/// Session-level failure. Everything except `Channel(Full)` ends the
/// session; no message is ever dropped to keep it alive.
#[derive(Debug)]
pub enum SessionError {
    Io(std::io::Error),
    /// Intro magic missing or garbled.
    BadIntro,
    /// Peer speaks another protocol version.
    VersionMismatch,
    /// Peers disagree on ring geometry or segment size.
    GeometryMismatch,
    Config(ConfigError),
    Channel(ChannelError),
    Range(RangeError),
    Wire(WireError),
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        SessionError::Io(e)
    }
}

impl From<ConfigError> for SessionError {
    fn from(e: ConfigError) -> Self {
        SessionError::Config(e)
    }
}

impl From<ChannelError> for SessionError {
    fn from(e: ChannelError) -> Self {
        SessionError::Channel(e)
    }
}

impl From<RangeError> for SessionError {
    fn from(e: RangeError) -> Self {
        SessionError::Range(e)
    }
}

impl From<WireError> for SessionError {
    fn from(e: WireError) -> Self {
        SessionError::Wire(e)
    }
}
