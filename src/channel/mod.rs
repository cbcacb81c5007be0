//! Ownership-bit slot mailboxes. One ring per direction, exactly one
//! sender and one receiver per ring, zero syscalls on the fast path.
//!
//! A slot belongs to whichever peer the ownership bit in its `own_type`
//! byte names. The producer writes the message body with plain stores,
//! then release-stores the discriminator with ownership flipped to the
//! consumer; that single byte store is the publish barrier. The consumer
//! acquire-loads the byte, reads the body, and release-stores ownership
//! back. No other synchronization exists and none may be added.
//!
//! Ownership polarity is direction-specific. On Compute→Memory a clear
//! bit means the compute side holds the slot; on Memory→Compute a clear
//! bit means the memory side holds it. The two rings are distinct types
//! so a slot of one direction can never be handled with the other's
//! polarity.

#[cfg(feature = "std")]
use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicU8, Ordering};

use crate::wire::{self, Message, OutboundMsg, WireError, OFF_OWN_TYPE, OWN_MASK, RANGE_MSG_SIZE};

/// Channel failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// The next slot is still consumer-owned: backpressure. Retry or
    /// spin; dropping would break address ordering.
    Full,
    /// A bounded wait ran out of polls. Fatal: the peers' view of the
    /// channel state can no longer be reconciled.
    Stalled,
    /// Codec rejection. Fatal: the peers disagree on the wire format.
    Wire(WireError),
    /// Ring geometry outside the protocol's limits.
    Geometry,
}

impl From<WireError> for ChannelError {
    #[inline]
    fn from(e: WireError) -> Self {
        ChannelError::Wire(e)
    }
}

/// Transfer direction of one ring. Implemented only by [`CpuToMem`] and
/// [`MemToCpu`]; the associated constants give the ownership-bit value
/// for each role in that direction.
pub trait Direction: 'static {
    /// Ownership-bit value under which the producing peer may write.
    const PRODUCER_OWNED: u8;
    /// Ownership-bit value under which the consuming peer may read.
    const CONSUMER_OWNED: u8;
}

/// Compute→Memory direction: the compute simulator produces.
#[derive(Debug, Clone, Copy)]
pub struct CpuToMem;

impl CpuToMem {
    /// Slot owned by the compute side.
    pub const OWN_CPU: u8 = 0x00;
    /// Slot owned by the memory side.
    pub const OWN_MEM: u8 = 0x80;
}

impl Direction for CpuToMem {
    const PRODUCER_OWNED: u8 = Self::OWN_CPU;
    const CONSUMER_OWNED: u8 = Self::OWN_MEM;
}

/// Memory→Compute direction: the memory simulator produces. Note the
/// inverted per-peer polarity relative to [`CpuToMem`].
#[derive(Debug, Clone, Copy)]
pub struct MemToCpu;

impl MemToCpu {
    /// Slot owned by the memory side.
    pub const OWN_MEM: u8 = 0x00;
    /// Slot owned by the compute side.
    pub const OWN_CPU: u8 = 0x80;
}

impl Direction for MemToCpu {
    const PRODUCER_OWNED: u8 = Self::OWN_MEM;
    const CONSUMER_OWNED: u8 = Self::OWN_CPU;
}

/// Ring geometry. Not part of the message format; both peers must be
/// handed the same values at session setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    num_slots: usize,
    slot_size: usize,
}

impl ChannelConfig {
    /// A slot must hold the largest fixed message (the address-range
    /// advertisement); packets additionally need room for their payload.
    pub fn new(num_slots: usize, slot_size: usize) -> Result<Self, ChannelError> {
        if num_slots == 0 || slot_size < RANGE_MSG_SIZE {
            return Err(ChannelError::Geometry);
        }
        Ok(Self { num_slots, slot_size })
    }

    #[inline(always)]
    pub const fn num_slots(&self) -> usize {
        self.num_slots
    }

    #[inline(always)]
    pub const fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Bytes one ring occupies.
    #[inline(always)]
    pub const fn ring_bytes(&self) -> usize {
        self.num_slots * self.slot_size
    }

    /// Payload capacity of a packet slot.
    #[inline(always)]
    pub const fn data_capacity(&self) -> usize {
        self.slot_size - wire::PACKET_FIXED_SIZE
    }
}

/// One direction's ring of fixed-size slots.
///
/// The slot memory may be crate-allocated (in-process loopback, tests)
/// or supplied by the session layer (a shared-memory segment). All
/// synchronization happens inside the slots themselves; the ring object
/// is just geometry plus the base pointer.
pub struct SlotRing<D: Direction> {
    mem: *mut u8,
    num_slots: usize,
    slot_size: usize,
    #[cfg(feature = "std")]
    _owned: Option<std::boxed::Box<[UnsafeCell<u8>]>>,
    _dir: PhantomData<D>,
}

unsafe impl<D: Direction> Send for SlotRing<D> {}
unsafe impl<D: Direction> Sync for SlotRing<D> {}

impl<D: Direction> SlotRing<D> {
    /// Allocate a zeroed in-process ring. Zeroed slots read back as
    /// producer-owned dummies, which is the required initial state.
    #[cfg(feature = "std")]
    pub fn allocate(config: &ChannelConfig) -> Self {
        let buf: std::boxed::Box<[UnsafeCell<u8>]> =
            (0..config.ring_bytes()).map(|_| UnsafeCell::new(0)).collect();
        let mem = buf.as_ptr() as *mut u8;
        Self {
            mem,
            num_slots: config.num_slots,
            slot_size: config.slot_size,
            _owned: Some(buf),
            _dir: PhantomData,
        }
    }

    /// Wrap an externally owned memory region (e.g. a mapped shm
    /// segment).
    ///
    /// Caller must ensure `mem` points to `config.ring_bytes()` writable
    /// bytes that outlive the ring and that exactly one ring wraps them.
    pub unsafe fn from_raw(mem: *mut u8, config: &ChannelConfig) -> Self {
        Self {
            mem,
            num_slots: config.num_slots,
            slot_size: config.slot_size,
            #[cfg(feature = "std")]
            _owned: None,
            _dir: PhantomData,
        }
    }

    #[inline(always)]
    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    #[inline(always)]
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// The producing handle. Call once per ring.
    pub fn sender(&self) -> Sender<'_, D> {
        Sender { ring: self, pos: 0 }
    }

    /// The consuming handle. Call once per ring.
    pub fn receiver(&self) -> Receiver<'_, D> {
        Receiver { ring: self, pos: 0 }
    }

    /// Both handles at once, for in-process loopback.
    pub fn split(&self) -> (Sender<'_, D>, Receiver<'_, D>) {
        (self.sender(), self.receiver())
    }

    #[inline(always)]
    fn slot_ptr(&self, idx: usize) -> *mut u8 {
        debug_assert!(idx < self.num_slots);
        unsafe { self.mem.add(idx * self.slot_size) }
    }

    /// The discriminator byte, viewed atomically. This is the only byte
    /// both peers may touch at the same time.
    #[inline(always)]
    fn own_byte(&self, idx: usize) -> &AtomicU8 {
        unsafe { &*(self.slot_ptr(idx).add(OFF_OWN_TYPE) as *const AtomicU8) }
    }

    #[inline(always)]
    fn next(&self, pos: usize) -> usize {
        let next = pos + 1;
        if next == self.num_slots {
            0
        } else {
            next
        }
    }
}

/// Spin-then-yield wait used by the blocking wrappers. The cooperative
/// `try_` operations never wait at all.
#[derive(Debug)]
pub struct Backoff {
    step: u32,
}

const SPIN_LIMIT: u32 = 6;
const STEP_LIMIT: u32 = 12;

impl Backoff {
    #[inline]
    pub const fn new() -> Self {
        Self { step: 0 }
    }

    #[inline]
    pub fn reset(&mut self) {
        self.step = 0;
    }

    #[inline]
    pub fn snooze(&mut self) {
        if self.step <= SPIN_LIMIT {
            for _ in 0..(1u32 << self.step) {
                core::hint::spin_loop();
            }
        } else {
            #[cfg(feature = "std")]
            std::thread::yield_now();
            #[cfg(not(feature = "std"))]
            for _ in 0..(1u32 << SPIN_LIMIT) {
                core::hint::spin_loop();
            }
        }
        if self.step < STEP_LIMIT {
            self.step += 1;
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Producing end of one ring.
pub struct Sender<'a, D: Direction> {
    ring: &'a SlotRing<D>,
    pos: usize,
}

impl<'a, D: Direction> Sender<'a, D> {
    /// True when the next slot is producer-owned.
    #[inline]
    pub fn ready(&self) -> bool {
        self.ring.own_byte(self.pos).load(Ordering::Acquire) & OWN_MASK == D::PRODUCER_OWNED
    }

    /// Encode and publish one message, or report backpressure.
    ///
    /// The payload is written with plain stores while the slot is still
    /// producer-owned; the final release store of the discriminator makes
    /// all of it visible to the consumer at once.
    pub fn try_send(&mut self, msg: &OutboundMsg<'_>) -> Result<(), ChannelError> {
        if !self.ready() {
            return Err(ChannelError::Full);
        }
        // The slice spans the whole slot, but the discriminator byte
        // inside it is never touched through it: the codec skips it and
        // only the atomic stores below write it.
        let slot = unsafe {
            core::slice::from_raw_parts_mut(self.ring.slot_ptr(self.pos), self.ring.slot_size)
        };
        let kind = wire::encode(slot, msg)?;
        self.ring
            .own_byte(self.pos)
            .store(kind | D::CONSUMER_OWNED, Ordering::Release);
        self.pos = self.ring.next(self.pos);
        Ok(())
    }

    /// Spin until the slot frees up. Codec errors still fail fast.
    pub fn send(&mut self, msg: &OutboundMsg<'_>) -> Result<(), ChannelError> {
        let mut backoff = Backoff::new();
        loop {
            match self.try_send(msg) {
                Err(ChannelError::Full) => backoff.snooze(),
                other => return other,
            }
        }
    }

    /// Spin at most `max_polls` times, then fail with
    /// [`ChannelError::Stalled`]. Stalls are fatal, not retryable: a
    /// consumer that stopped draining has already diverged.
    pub fn send_bounded(&mut self, msg: &OutboundMsg<'_>, max_polls: u64) -> Result<(), ChannelError> {
        let mut backoff = Backoff::new();
        for _ in 0..max_polls {
            match self.try_send(msg) {
                Err(ChannelError::Full) => backoff.snooze(),
                other => return other,
            }
        }
        Err(ChannelError::Stalled)
    }
}

/// Consuming end of one ring.
pub struct Receiver<'a, D: Direction> {
    ring: &'a SlotRing<D>,
    pos: usize,
}

impl<'a, D: Direction> Receiver<'a, D> {
    /// True when the next slot has been published to us.
    #[inline]
    pub fn ready(&self) -> bool {
        self.ring.own_byte(self.pos).load(Ordering::Acquire) & OWN_MASK == D::CONSUMER_OWNED
    }

    /// Take the next published slot, if any. The returned guard releases
    /// the slot back to the producer when dropped.
    pub fn try_recv(&mut self) -> Option<RecvSlot<'_, 'a, D>> {
        if self.ready() {
            Some(self.take())
        } else {
            None
        }
    }

    /// Spin until a slot is published.
    pub fn recv(&mut self) -> RecvSlot<'_, 'a, D> {
        let mut backoff = Backoff::new();
        while !self.ready() {
            backoff.snooze();
        }
        self.take()
    }

    /// Spin at most `max_polls` times, then fail with
    /// [`ChannelError::Stalled`].
    pub fn recv_bounded(&mut self, max_polls: u64) -> Result<RecvSlot<'_, 'a, D>, ChannelError> {
        let mut backoff = Backoff::new();
        for _ in 0..max_polls {
            if self.ready() {
                return Ok(self.take());
            }
            backoff.snooze();
        }
        Err(ChannelError::Stalled)
    }

    fn take(&mut self) -> RecvSlot<'_, 'a, D> {
        let idx = self.pos;
        RecvSlot { rx: self, idx }
    }
}

/// A consumer-owned slot. Holding the guard is what "owning the message"
/// means: the bytes stay frozen until the guard drops and the release
/// store hands the slot back to the producer for reuse.
pub struct RecvSlot<'r, 'a, D: Direction> {
    rx: &'r mut Receiver<'a, D>,
    idx: usize,
}

impl<D: Direction> RecvSlot<'_, '_, D> {
    /// Raw slot bytes, discriminator included.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        unsafe {
            core::slice::from_raw_parts(self.rx.ring.slot_ptr(self.idx), self.rx.ring.slot_size)
        }
    }

    /// Decode the slot. A [`WireError`] here is fatal to the session.
    #[inline]
    pub fn message(&self) -> Result<Message<'_>, WireError> {
        wire::decode(self.bytes())
    }

    /// Explicit release; dropping the guard does the same.
    #[inline]
    pub fn release(self) {}
}

impl<D: Direction> Drop for RecvSlot<'_, '_, D> {
    fn drop(&mut self) {
        // Kind bits are cleared too: a released slot reads as a
        // producer-owned dummy, same as freshly zeroed memory.
        self.rx
            .ring
            .own_byte(self.idx)
            .store(D::PRODUCER_OWNED, Ordering::Release);
        self.rx.pos = self.rx.ring.next(self.idx);
    }
}

/// Both rings of a session, allocated in-process. The compute side sends
/// on Compute→Memory and receives on Memory→Compute; the memory side is
/// the mirror image.
#[cfg(feature = "std")]
pub struct ChannelPair {
    c2m: SlotRing<CpuToMem>,
    m2c: SlotRing<MemToCpu>,
}

#[cfg(feature = "std")]
impl ChannelPair {
    pub fn allocate(config: &ChannelConfig) -> Self {
        Self {
            c2m: SlotRing::allocate(config),
            m2c: SlotRing::allocate(config),
        }
    }

    /// Compute-side endpoint handles. Call once.
    pub fn compute_side(&self) -> (Sender<'_, CpuToMem>, Receiver<'_, MemToCpu>) {
        (self.c2m.sender(), self.m2c.receiver())
    }

    /// Memory-side endpoint handles. Call once.
    pub fn memory_side(&self) -> (Sender<'_, MemToCpu>, Receiver<'_, CpuToMem>) {
        (self.m2c.sender(), self.c2m.receiver())
    }
}
