//! Shared-memory slot region (Linux). The listening side creates a
//! file-backed segment at the descriptor's shm path and lays both rings
//! out back to back; the connecting side maps the same file. A freshly
//! extended file reads as zeroes, which is exactly the all-slots-
//! producer-owned state a new session needs.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::ptr;

use crate::channel::{ChannelConfig, CpuToMem, MemToCpu, SlotRing};

use super::SessionError;

/// A mapped shared-memory segment. Unmapped on drop; the backing file is
/// left in place for the session owner to unlink.
pub struct ShmRegion {
    ptr: *mut u8,
    len: usize,
    _file: File,
}

unsafe impl Send for ShmRegion {}
unsafe impl Sync for ShmRegion {}

impl ShmRegion {
    /// Create (or truncate) the backing file and map it. Listening side.
    pub fn create(path: &str, len: usize) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(len as u64)?;
        Self::map(file, len)
    }

    /// Map an existing segment. Connecting side.
    pub fn open(path: &str, len: usize) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        if file.metadata()?.len() < len as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "shm segment smaller than the negotiated geometry",
            ));
        }
        Self::map(file, len)
    }

    fn map(file: File, len: usize) -> io::Result<Self> {
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            ptr: ptr as *mut u8,
            len,
            _file: file,
        })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline(always)]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    /// Total bytes a session's two rings occupy.
    pub fn session_len(config: &ChannelConfig) -> usize {
        config.ring_bytes() * 2
    }

    /// View the segment as the session's two rings, Compute→Memory
    /// first. Each side must still take only its own handles.
    pub fn rings(
        &self,
        config: &ChannelConfig,
    ) -> Result<(SlotRing<CpuToMem>, SlotRing<MemToCpu>), SessionError> {
        if self.len < Self::session_len(config) {
            return Err(SessionError::GeometryMismatch);
        }
        let c2m = unsafe { SlotRing::from_raw(self.ptr, config) };
        let m2c = unsafe { SlotRing::from_raw(self.ptr.add(config.ring_bytes()), config) };
        Ok((c2m, m2c))
    }
}

impl Drop for ShmRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{Message, OutboundMsg};

    fn shm_path(tag: &str) -> String {
        std::env::temp_dir()
            .join(format!("memlink-shm-{}-{}", tag, std::process::id()))
            .to_str()
            .unwrap()
            .to_owned()
    }

    #[test]
    fn test_create_map_and_reopen() {
        let path = shm_path("basic");
        let config = ChannelConfig::new(4, 4096).unwrap();
        let len = ShmRegion::session_len(&config);

        let region = ShmRegion::create(&path, len).unwrap();
        assert_eq!(region.len(), len);

        // Fresh mapping is zeroed: every slot is a producer-owned dummy.
        let (c2m, _m2c) = region.rings(&config).unwrap();
        let mut rx = c2m.receiver();
        assert!(rx.try_recv().is_none());

        let other = ShmRegion::open(&path, len).unwrap();
        drop(other);
        drop(rx);
        drop(region);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_two_mappings_share_slots() {
        let path = shm_path("share");
        let config = ChannelConfig::new(4, 4096).unwrap();
        let len = ShmRegion::session_len(&config);

        let listener = ShmRegion::create(&path, len).unwrap();
        let connector = ShmRegion::open(&path, len).unwrap();

        let (c2m_l, _) = listener.rings(&config).unwrap();
        let (c2m_c, _) = connector.rings(&config).unwrap();

        let mut tx = c2m_c.sender();
        let mut rx = c2m_l.receiver();

        tx.try_send(&OutboundMsg::Sync { timestamp: 42 }).unwrap();
        let slot = rx.try_recv().expect("visible through the other mapping");
        match slot.message().unwrap() {
            Message::Sync { timestamp } => assert_eq!(timestamp, 42),
            other => panic!("expected sync, got {:?}", other),
        }
        drop(slot);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_open_rejects_short_segment() {
        let path = shm_path("short");
        let config = ChannelConfig::new(4, 4096).unwrap();
        let len = ShmRegion::session_len(&config);

        let _region = ShmRegion::create(&path, len / 2).unwrap();
        assert!(ShmRegion::open(&path, len).is_err());
        let _ = std::fs::remove_file(&path);
    }
}
