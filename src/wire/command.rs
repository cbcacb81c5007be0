//! Protocol enumerations and flag vocabularies. Numeric values are the
//! contract: both simulators must agree on encodings, not names, so every
//! discriminant is pinned explicitly and the deliberate gaps are kept.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Memory command carried by a packet. Transmitted as a raw `u32`.
///
/// The two-value gap before `MemFenceReq` belonged to deprecated message
/// commands and must stay reserved; reusing those ordinals would silently
/// desynchronize peers built from different vintages of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Command {
    InvalidCmd = 0,
    ReadReq = 1,
    ReadResp = 2,
    ReadRespWithInvalidate = 3,
    WriteReq = 4,
    WriteResp = 5,
    WriteCompleteResp = 6,
    WritebackDirty = 7,
    WritebackClean = 8,
    /// Writes dirty data below without evicting.
    WriteClean = 9,
    CleanEvict = 10,
    SoftPFReq = 11,
    SoftPFExReq = 12,
    HardPFReq = 13,
    SoftPFResp = 14,
    HardPFResp = 15,
    WriteLineReq = 16,
    UpgradeReq = 17,
    /// Weak upgrade for store-conditional.
    SCUpgradeReq = 18,
    UpgradeResp = 19,
    /// Failed SCUpgradeReq in MSHR (never sent).
    SCUpgradeFailReq = 20,
    /// Valid for SCUpgradeReq only.
    UpgradeFailResp = 21,
    ReadExReq = 22,
    ReadExResp = 23,
    ReadCleanReq = 24,
    ReadSharedReq = 25,
    LoadLockedReq = 26,
    StoreCondReq = 27,
    /// Failed StoreCondReq in MSHR (never sent).
    StoreCondFailReq = 28,
    StoreCondResp = 29,
    SwapReq = 30,
    SwapResp = 31,
    // 32 and 33 are retired message commands. Do not reuse.
    MemFenceReq = 34,
    /// Memory synchronization request (e.g. cache invalidate).
    MemSyncReq = 35,
    MemSyncResp = 36,
    MemFenceResp = 37,
    CleanSharedReq = 38,
    CleanSharedResp = 39,
    CleanInvalidReq = 40,
    CleanInvalidResp = 41,
    /// Packet destination field invalid.
    InvalidDestError = 42,
    /// Memory address invalid.
    BadAddressError = 43,
    /// Unable to fulfill a functional read.
    FunctionalReadError = 44,
    /// Unable to fulfill a functional write.
    FunctionalWriteError = 45,
    /// Print state matching address (simulator-only).
    PrintReq = 46,
    /// Request for a cache flush (simulator-only).
    FlushReq = 47,
    InvalidateReq = 48,
    InvalidateResp = 49,
    HTMReq = 50,
    HTMReqResp = 51,
    HTMAbort = 52,
}

impl Command {
    #[inline]
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => Self::InvalidCmd,
            1 => Self::ReadReq,
            2 => Self::ReadResp,
            3 => Self::ReadRespWithInvalidate,
            4 => Self::WriteReq,
            5 => Self::WriteResp,
            6 => Self::WriteCompleteResp,
            7 => Self::WritebackDirty,
            8 => Self::WritebackClean,
            9 => Self::WriteClean,
            10 => Self::CleanEvict,
            11 => Self::SoftPFReq,
            12 => Self::SoftPFExReq,
            13 => Self::HardPFReq,
            14 => Self::SoftPFResp,
            15 => Self::HardPFResp,
            16 => Self::WriteLineReq,
            17 => Self::UpgradeReq,
            18 => Self::SCUpgradeReq,
            19 => Self::UpgradeResp,
            20 => Self::SCUpgradeFailReq,
            21 => Self::UpgradeFailResp,
            22 => Self::ReadExReq,
            23 => Self::ReadExResp,
            24 => Self::ReadCleanReq,
            25 => Self::ReadSharedReq,
            26 => Self::LoadLockedReq,
            27 => Self::StoreCondReq,
            28 => Self::StoreCondFailReq,
            29 => Self::StoreCondResp,
            30 => Self::SwapReq,
            31 => Self::SwapResp,
            34 => Self::MemFenceReq,
            35 => Self::MemSyncReq,
            36 => Self::MemSyncResp,
            37 => Self::MemFenceResp,
            38 => Self::CleanSharedReq,
            39 => Self::CleanSharedResp,
            40 => Self::CleanInvalidReq,
            41 => Self::CleanInvalidResp,
            42 => Self::InvalidDestError,
            43 => Self::BadAddressError,
            44 => Self::FunctionalReadError,
            45 => Self::FunctionalWriteError,
            46 => Self::PrintReq,
            47 => Self::FlushReq,
            48 => Self::InvalidateReq,
            49 => Self::InvalidateResp,
            50 => Self::HTMReq,
            51 => Self::HTMReqResp,
            52 => Self::HTMAbort,
            _ => return None,
        })
    }

    #[inline(always)]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Command property bits, owned and interpreted by the coherence logic.
/// The transport never consults these; the enum exists so both peers share
/// one numbering for the attribute table they keep on their own side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Attribute {
    /// Data flows from responder to requester.
    IsRead = 0,
    /// Data flows from requester to responder.
    IsWrite = 1,
    IsUpgrade = 2,
    IsInvalidate = 3,
    /// Cleans any existing dirty blocks.
    IsClean = 4,
    /// Requires writable copy to complete in-cache.
    NeedsWritable = 5,
    IsRequest = 6,
    IsResponse = 7,
    NeedsResponse = 8,
    IsEviction = 9,
    IsSWPrefetch = 10,
    IsHWPrefetch = 11,
    /// LL or SC access.
    IsLlsc = 12,
    /// There is an associated payload.
    HasData = 13,
    IsError = 14,
    IsPrint = 15,
    IsFlush = 16,
    /// Request originated from a caching agent.
    FromCache = 17,
}

impl Attribute {
    #[inline]
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => Self::IsRead,
            1 => Self::IsWrite,
            2 => Self::IsUpgrade,
            3 => Self::IsInvalidate,
            4 => Self::IsClean,
            5 => Self::NeedsWritable,
            6 => Self::IsRequest,
            7 => Self::IsResponse,
            8 => Self::NeedsResponse,
            9 => Self::IsEviction,
            10 => Self::IsSWPrefetch,
            11 => Self::IsHWPrefetch,
            12 => Self::IsLlsc,
            13 => Self::HasData,
            14 => Self::IsError,
            15 => Self::IsPrint,
            16 => Self::IsFlush,
            17 => Self::FromCache,
            _ => return None,
        })
    }
}

/// Hardware-transactional-memory outcome reported in a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum HtmCacheFailure {
    NoFail = 0,
    /// Failed due to the local cache's replacement policy.
    FailSelf = 1,
    /// Failed due to remote invalidation.
    FailRemote = 2,
    FailOther = 3,
}

impl HtmCacheFailure {
    #[inline]
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => Self::NoFail,
            1 => Self::FailSelf,
            2 => Self::FailRemote,
            3 => Self::FailOther,
            _ => return None,
        })
    }
}

/// Packet-level flag word. Carried unmasked; the constants below are the
/// shared vocabulary, not something the transport acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(transparent)]
pub struct PacketFlags(pub u32);

impl PacketFlags {
    pub const COPY_FLAGS: Self = Self(0x0000_00ff);
    pub const RESPONDER_FLAGS: Self = Self(0x0000_0009);
    pub const HAS_SHARERS: Self = Self(0x0000_0001);
    pub const EXPRESS_SNOOP: Self = Self(0x0000_0002);
    pub const RESPONDER_HAD_WRITABLE: Self = Self(0x0000_0004);
    pub const CACHE_RESPONDING: Self = Self(0x0000_0008);
    pub const WRITE_THROUGH: Self = Self(0x0000_0010);
    pub const SATISFIED: Self = Self(0x0000_0020);
    pub const FAILS_TRANSACTION: Self = Self(0x0000_0040);
    pub const FROM_TRANSACTION: Self = Self(0x0000_0080);
    pub const VALID_ADDR: Self = Self(0x0000_0100);
    pub const VALID_SIZE: Self = Self(0x0000_0200);
    pub const STATIC_DATA: Self = Self(0x0000_1000);
    pub const DYNAMIC_DATA: Self = Self(0x0000_2000);
    pub const SUPPRESS_FUNC_ERROR: Self = Self(0x0000_8000);
    pub const BLOCK_CACHED: Self = Self(0x0001_0000);

    #[inline(always)]
    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    #[inline(always)]
    pub const fn union(self, flag: Self) -> Self {
        Self(self.0 | flag.0)
    }
}

/// Request-level flag word (64-bit: the architectural flags above bit 31
/// do not fit the packet flag word).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(transparent)]
pub struct ReqFlags(pub u64);

impl ReqFlags {
    /// Reserved for architecture-specific code.
    pub const ARCH_BITS: Self = Self(0x0000_00ff);
    pub const INST_FETCH: Self = Self(0x0000_0100);
    pub const PHYSICAL: Self = Self(0x0000_0200);
    pub const UNCACHEABLE: Self = Self(0x0000_0400);
    pub const STRICT_ORDER: Self = Self(0x0000_0800);
    pub const KERNEL: Self = Self(0x0000_1000);
    pub const PRIVILEGED: Self = Self(0x0000_8000);
    pub const CACHE_BLOCK_ZERO: Self = Self(0x0001_0000);
    pub const ACQUIRE: Self = Self(0x0002_0000);
    pub const RELEASE: Self = Self(0x0004_0000);
    pub const NO_ACCESS: Self = Self(0x0008_0000);
    pub const LOCKED_RMW: Self = Self(0x0010_0000);
    pub const LLSC: Self = Self(0x0020_0000);
    pub const MEM_SWAP: Self = Self(0x0040_0000);
    pub const MEM_SWAP_COND: Self = Self(0x0080_0000);
    pub const PREFETCH: Self = Self(0x0100_0000);
    pub const PF_EXCLUSIVE: Self = Self(0x0200_0000);
    pub const EVICT_NEXT: Self = Self(0x0400_0000);
    pub const SECURE: Self = Self(0x1000_0000);
    pub const PT_WALK: Self = Self(0x2000_0000);
    pub const ATOMIC_RETURN_OP: Self = Self(0x4000_0000);
    pub const ATOMIC_NO_RETURN_OP: Self = Self(0x8000_0000);
    pub const INVALIDATE: Self = Self(0x0000_0001_0000_0000);
    pub const CLEAN: Self = Self(0x0000_0002_0000_0000);
    pub const DST_POU: Self = Self(0x0000_0010_0000_0000);
    pub const DST_POC: Self = Self(0x0000_0020_0000_0000);
    pub const DST_BITS: Self = Self(0x0000_0030_0000_0000);
    pub const HTM_START: Self = Self(0x0000_0100_0000_0000);
    pub const HTM_COMMIT: Self = Self(0x0000_0200_0000_0000);
    pub const HTM_CANCEL: Self = Self(0x0000_0400_0000_0000);
    pub const HTM_ABORT: Self = Self(0x0000_0800_0000_0000);
    /// Not cleared when a request object is reused.
    pub const STICKY_FLAGS: Self = Self::INST_FETCH;

    #[inline(always)]
    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    #[inline(always)]
    pub const fn union(self, flag: Self) -> Self {
        Self(self.0 | flag.0)
    }
}

/// Cache-coherence flag word of a request. Two vocabularies share this
/// field (mem-sync operations and memory-space scopes); which one applies
/// is decided by the command, on the consumer's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(transparent)]
pub struct CoherenceFlags(pub u64);

impl CoherenceFlags {
    pub const I_CACHE_INV: Self = Self(0x0000_0001);
    pub const INV_L1: Self = Self(0x0000_0001);
    pub const V_CACHE_INV: Self = Self(0x0000_0002);
    pub const K_CACHE_INV: Self = Self(0x0000_0004);
    pub const GL1_CACHE_INV: Self = Self(0x0000_0008);
    pub const K_CACHE_WB: Self = Self(0x0000_0010);
    pub const FLUSH_L2: Self = Self(0x0000_0020);
    pub const GL2_CACHE_INV: Self = Self(0x0000_0040);
    pub const SLC_BIT: Self = Self(0x0000_0080);
    pub const DLC_BIT: Self = Self(0x0000_0100);
    pub const GLC_BIT: Self = Self(0x0000_0200);
    pub const CACHED: Self = Self(0x0000_0400);
    pub const READ_WRITE: Self = Self(0x0000_0800);
    pub const SHARED: Self = Self(0x0000_1000);

    pub const SCOPE_VALID: Self = Self(0x0000_0001);
    /// Wavefront scope visibility.
    pub const WAVEFRONT_SCOPE: Self = Self(0x0000_0002);
    /// Workgroup scope visibility.
    pub const WORKGROUP_SCOPE: Self = Self(0x0000_0004);
    /// Device (e.g. GPU) scope visibility.
    pub const DEVICE_SCOPE: Self = Self(0x0000_0008);
    /// System (CPU + GPU) scope visibility.
    pub const SYSTEM_SCOPE: Self = Self(0x0000_0010);
    pub const GLOBAL_SEGMENT: Self = Self(0x0000_0020);
    pub const GROUP_SEGMENT: Self = Self(0x0000_0040);
    pub const PRIVATE_SEGMENT: Self = Self(0x0000_0080);
    pub const KERNARG_SEGMENT: Self = Self(0x0000_0100);
    pub const READONLY_SEGMENT: Self = Self(0x0000_0200);
    pub const SPILL_SEGMENT: Self = Self(0x0000_0400);
    pub const ARG_SEGMENT: Self = Self(0x0000_0800);

    #[inline(always)]
    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    #[inline(always)]
    pub const fn union(self, flag: Self) -> Self {
        Self(self.0 | flag.0)
    }
}

/// Per-field validity bitmap of a request. Optional fields (vaddr, pc,
/// sequence number, ...) are populated only when the matching bit is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(transparent)]
pub struct PrivateFlags(pub u16);

impl PrivateFlags {
    pub const VALID_SIZE: Self = Self(0x0001);
    pub const VALID_PADDR: Self = Self(0x0002);
    pub const VALID_VADDR: Self = Self(0x0004);
    pub const VALID_INST_SEQ_NUM: Self = Self(0x0008);
    pub const VALID_PC: Self = Self(0x0010);
    pub const VALID_CONTEXT_ID: Self = Self(0x0020);
    // 0x0040 is unassigned in the original table.
    pub const VALID_EXTRA_DATA: Self = Self(0x0080);
    pub const VALID_STREAM_ID: Self = Self(0x0100);
    pub const VALID_SUBSTREAM_ID: Self = Self(0x0200);
    pub const VALID_HTM_ABORT_CAUSE: Self = Self(0x0400);
    pub const VALID_INST_COUNT: Self = Self(0x0800);
    /// Not cleared when a request object is reused.
    pub const STICKY_PRIVATE_FLAGS: Self = Self::VALID_CONTEXT_ID;

    #[inline(always)]
    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    #[inline(always)]
    pub const fn union(self, flag: Self) -> Self {
        Self(self.0 | flag.0)
    }

    #[inline(always)]
    pub const fn all_valid() -> Self {
        Self(0x0fbf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_ordinals_pinned() {
        assert_eq!(Command::InvalidCmd as u32, 0);
        assert_eq!(Command::ReadReq as u32, 1);
        assert_eq!(Command::WriteReq as u32, 4);
        assert_eq!(Command::CleanEvict as u32, 10);
        assert_eq!(Command::SwapResp as u32, 31);
        // The retired-command gap: SwapResp + 3, not + 1.
        assert_eq!(Command::MemFenceReq as u32, Command::SwapResp as u32 + 3);
        assert_eq!(Command::MemFenceReq as u32, 34);
        assert_eq!(Command::CleanInvalidResp as u32, 41);
        assert_eq!(Command::BadAddressError as u32, 43);
        assert_eq!(Command::HTMAbort as u32, 52);
    }

    #[test]
    fn test_command_gap_rejected() {
        assert_eq!(Command::from_u32(32), None);
        assert_eq!(Command::from_u32(33), None);
        assert_eq!(Command::from_u32(53), None);
        assert_eq!(Command::from_u32(u32::MAX), None);
    }

    #[test]
    fn test_command_roundtrip_all() {
        for v in 0..=52u32 {
            match Command::from_u32(v) {
                Some(cmd) => assert_eq!(cmd as u32, v),
                None => assert!(v == 32 || v == 33),
            }
        }
    }

    #[test]
    fn test_attribute_ordinals_pinned() {
        assert_eq!(Attribute::IsRead as u32, 0);
        assert_eq!(Attribute::NeedsResponse as u32, 8);
        assert_eq!(Attribute::HasData as u32, 13);
        assert_eq!(Attribute::FromCache as u32, 17);
        assert_eq!(Attribute::from_u32(18), None);
    }

    #[test]
    fn test_htm_failure_pinned() {
        assert_eq!(HtmCacheFailure::NoFail as u32, 0);
        assert_eq!(HtmCacheFailure::FailOther as u32, 3);
        assert_eq!(HtmCacheFailure::from_u32(4), None);
    }

    #[test]
    fn test_packet_flags_pinned() {
        assert_eq!(PacketFlags::HAS_SHARERS.0, 0x1);
        assert_eq!(PacketFlags::CACHE_RESPONDING.0, 0x8);
        assert_eq!(PacketFlags::RESPONDER_FLAGS.0, 0x9);
        assert_eq!(PacketFlags::FROM_TRANSACTION.0, 0x80);
        assert_eq!(PacketFlags::VALID_SIZE.0, 0x200);
        assert_eq!(PacketFlags::BLOCK_CACHED.0, 0x10000);
    }

    #[test]
    fn test_req_flags_pinned() {
        assert_eq!(ReqFlags::INST_FETCH.0, 0x100);
        assert_eq!(ReqFlags::UNCACHEABLE.0, 0x400);
        assert_eq!(ReqFlags::ATOMIC_NO_RETURN_OP.0, 0x8000_0000);
        // The wide flags live above bit 31.
        assert_eq!(ReqFlags::INVALIDATE.0, 0x1_0000_0000);
        assert_eq!(ReqFlags::HTM_ABORT.0, 0x800_0000_0000);
        assert_eq!(ReqFlags::DST_BITS.0, ReqFlags::DST_POU.0 | ReqFlags::DST_POC.0);
        assert_eq!(ReqFlags::STICKY_FLAGS, ReqFlags::INST_FETCH);
    }

    #[test]
    fn test_private_flags_pinned() {
        assert_eq!(PrivateFlags::VALID_SIZE.0, 0x1);
        assert_eq!(PrivateFlags::VALID_CONTEXT_ID.0, 0x20);
        assert_eq!(PrivateFlags::VALID_EXTRA_DATA.0, 0x80);
        assert_eq!(PrivateFlags::VALID_INST_COUNT.0, 0x800);
        assert_eq!(PrivateFlags::STICKY_PRIVATE_FLAGS, PrivateFlags::VALID_CONTEXT_ID);
        // 0x40 is the unassigned hole.
        assert!(!PrivateFlags::all_valid().contains(PrivateFlags(0x40)));
    }

    #[test]
    fn test_flag_ops() {
        let f = PacketFlags::HAS_SHARERS.union(PacketFlags::SATISFIED);
        assert!(f.contains(PacketFlags::HAS_SHARERS));
        assert!(f.contains(PacketFlags::SATISFIED));
        assert!(!f.contains(PacketFlags::EXPRESS_SNOOP));
    }
}
