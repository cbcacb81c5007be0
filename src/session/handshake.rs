//! Session establishment. Before any slot traffic, the two adapters
//! exchange a fixed intro message over a Unix socket: protocol version,
//! sync capability, and the ring geometry the listening side allocated.
//! A mismatch is fatal — there is no renegotiation of geometry.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::channel::ChannelConfig;
use crate::clock::SyncConfig;

use super::SessionError;

pub const INTRO_MAGIC: u32 = 0x4d4c_4e4b;
pub const INTRO_VERSION: u32 = 1;

/// Sender supports issuing sync beacons.
pub const INTRO_FLAG_SYNC: u64 = 1 << 0;

/// Wire form of the introduction. Fixed layout, no padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct IntroMsg {
    pub magic: u32,
    pub version: u32,
    pub flags: u64,
    pub num_slots: u32,
    pub slot_size: u32,
    pub lookahead: u64,
    pub sync_interval: u64,
}

pub const INTRO_SIZE: usize = 40;

const _: () = {
    assert!(core::mem::size_of::<IntroMsg>() == INTRO_SIZE);
};

impl IntroMsg {
    pub fn new(channel: &ChannelConfig, sync: &SyncConfig, issues_syncs: bool) -> Self {
        Self {
            magic: INTRO_MAGIC,
            version: INTRO_VERSION,
            flags: if issues_syncs { INTRO_FLAG_SYNC } else { 0 },
            num_slots: channel.num_slots() as u32,
            slot_size: channel.slot_size() as u32,
            lookahead: sync.lookahead,
            sync_interval: sync.sync_interval,
        }
    }

    #[inline]
    pub fn issues_syncs(&self) -> bool {
        self.flags & INTRO_FLAG_SYNC != 0
    }

    fn validate_against(&self, ours: &IntroMsg) -> Result<(), SessionError> {
        if self.magic != INTRO_MAGIC {
            return Err(SessionError::BadIntro);
        }
        if self.version != INTRO_VERSION {
            return Err(SessionError::VersionMismatch);
        }
        if self.num_slots != ours.num_slots || self.slot_size != ours.slot_size {
            return Err(SessionError::GeometryMismatch);
        }
        Ok(())
    }
}

/// Accept one peer on `path` and exchange intros. Ours goes out first;
/// the validated peer intro comes back with the connected stream.
pub async fn listen(path: &str, ours: IntroMsg) -> Result<(UnixStream, IntroMsg), SessionError> {
    let listener = UnixListener::bind(path)?;
    log::debug!("listening for peer on {}", path);
    let (stream, _) = listener.accept().await?;
    exchange(stream, ours).await
}

/// Connect to a listening peer on `path` and exchange intros.
pub async fn connect(path: &str, ours: IntroMsg) -> Result<(UnixStream, IntroMsg), SessionError> {
    let stream = UnixStream::connect(path).await?;
    log::debug!("connected to peer on {}", path);
    exchange(stream, ours).await
}

async fn exchange(
    mut stream: UnixStream,
    ours: IntroMsg,
) -> Result<(UnixStream, IntroMsg), SessionError> {
    stream.write_all(ours.as_bytes()).await?;

    let mut buf = [0u8; INTRO_SIZE];
    stream.read_exact(&mut buf).await?;
    let theirs = IntroMsg::read_from_bytes(&buf).map_err(|_| SessionError::BadIntro)?;
    theirs.validate_against(&ours)?;

    log::debug!(
        "peer intro accepted: {} slots of {} bytes, peer {} syncs",
        theirs.num_slots,
        theirs.slot_size,
        if theirs.issues_syncs() { "issues" } else { "omits" },
    );
    Ok((stream, theirs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> (ChannelConfig, SyncConfig) {
        (ChannelConfig::new(8, 4096).unwrap(), SyncConfig::default())
    }

    #[test]
    fn test_intro_layout() {
        assert_eq!(core::mem::size_of::<IntroMsg>(), INTRO_SIZE);
        let (channel, sync) = geometry();
        let intro = IntroMsg::new(&channel, &sync, true);
        let bytes = intro.as_bytes();
        assert_eq!(&bytes[..4], &INTRO_MAGIC.to_le_bytes());
        assert_eq!(&bytes[4..8], &INTRO_VERSION.to_le_bytes());
        assert!(intro.issues_syncs());
    }

    #[test]
    fn test_validate_rejects_mismatch() {
        let (channel, sync) = geometry();
        let ours = IntroMsg::new(&channel, &sync, true);

        let mut bad = ours;
        bad.magic = 0;
        assert!(matches!(
            bad.validate_against(&ours),
            Err(SessionError::BadIntro)
        ));

        let mut bad = ours;
        bad.version = 2;
        assert!(matches!(
            bad.validate_against(&ours),
            Err(SessionError::VersionMismatch)
        ));

        let mut bad = ours;
        bad.num_slots = 16;
        assert!(matches!(
            bad.validate_against(&ours),
            Err(SessionError::GeometryMismatch)
        ));
    }

    #[tokio::test]
    async fn test_exchange_over_socket() {
        let dir = std::env::temp_dir().join(format!("memlink-hs-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("intro.sock");
        let path = path.to_str().unwrap().to_owned();
        let _ = std::fs::remove_file(&path);

        let (channel, sync) = geometry();
        let server_intro = IntroMsg::new(&channel, &sync, true);
        let client_intro = IntroMsg::new(&channel, &sync, false);

        let server_path = path.clone();
        let server = tokio::spawn(async move { listen(&server_path, server_intro).await });

        // Give the listener a moment to bind.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let (_stream, theirs) = connect(&path, client_intro).await.unwrap();
        assert_eq!(theirs, server_intro);

        let (_stream, theirs) = server.await.unwrap().unwrap();
        assert_eq!(theirs, client_intro);

        let _ = std::fs::remove_file(&path);
    }
}
