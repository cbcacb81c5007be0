//! Address-range negotiation. Before data traffic starts each peer
//! advertises which physical ranges it answers for and under which proxy
//! role; a later advertisement replaces the whole active set. The format
//! has no delta message, so partial update is unrepresentable.

use arrayvec::ArrayVec;

use crate::clock::Tick;
use crate::wire::{
    RangeMsg, MAX_RANGES, PKT_INT_REQ_PROXY, PKT_INT_RESP_PROXY, PKT_PIO_PROXY,
};

/// Negotiation failure. Surfaced to the caller; the session may retry
/// negotiation with a corrected advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    /// `start > end`.
    InvalidBounds,
    /// Two ranges in one advertisement intersect.
    OverlappingRange,
    /// More than [`MAX_RANGES`] entries.
    TooMany,
    /// Proxy role bits absent or not one-hot.
    BadRole,
}

/// Half-open physical address range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysRange {
    pub start: u64,
    pub end: u64,
}

impl PhysRange {
    #[inline(always)]
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    #[inline(always)]
    pub const fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }

    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    #[inline(always)]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Which port an advertised range set serves. One-hot in `pkt_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProxyRole {
    /// Programmed I/O.
    Pio,
    /// Interrupt request.
    IntReq,
    /// Interrupt response.
    IntResp,
}

impl ProxyRole {
    #[inline]
    pub const fn pkt_type_bit(self) -> u8 {
        match self {
            ProxyRole::Pio => PKT_PIO_PROXY,
            ProxyRole::IntReq => PKT_INT_REQ_PROXY,
            ProxyRole::IntResp => PKT_INT_RESP_PROXY,
        }
    }

    /// Decode the one-hot role bits. More or fewer than one bit set is a
    /// malformed advertisement.
    pub fn from_pkt_type(pkt_type: u8) -> Result<Self, RangeError> {
        match pkt_type & (PKT_PIO_PROXY | PKT_INT_REQ_PROXY | PKT_INT_RESP_PROXY) {
            b if b == PKT_PIO_PROXY => Ok(ProxyRole::Pio),
            b if b == PKT_INT_REQ_PROXY => Ok(ProxyRole::IntReq),
            b if b == PKT_INT_RESP_PROXY => Ok(ProxyRole::IntResp),
            _ => Err(RangeError::BadRole),
        }
    }
}

/// A validated set of non-overlapping ranges under one proxy role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSet {
    role: ProxyRole,
    ranges: ArrayVec<PhysRange, MAX_RANGES>,
}

impl RangeSet {
    pub fn new(role: ProxyRole) -> Self {
        Self {
            role,
            ranges: ArrayVec::new_const(),
        }
    }

    /// Build and validate. Rejects inverted bounds, more than
    /// [`MAX_RANGES`] entries, and any intersection. Empty ranges are
    /// permitted and match no address.
    pub fn from_ranges(role: ProxyRole, ranges: &[PhysRange]) -> Result<Self, RangeError> {
        if ranges.len() > MAX_RANGES {
            return Err(RangeError::TooMany);
        }
        for r in ranges {
            if r.start > r.end {
                return Err(RangeError::InvalidBounds);
            }
        }
        // n <= 150: the quadratic check beats sorting on every count we
        // can ever see.
        for (i, a) in ranges.iter().enumerate() {
            for b in &ranges[i + 1..] {
                if a.overlaps(b) {
                    return Err(RangeError::OverlappingRange);
                }
            }
        }
        let mut set = Self::new(role);
        set.ranges.extend(ranges.iter().copied());
        Ok(set)
    }

    /// Decode and validate an advertisement message.
    pub fn from_msg(msg: &RangeMsg) -> Result<Self, RangeError> {
        let role = ProxyRole::from_pkt_type(msg.pkt_type)?;
        let count = msg.count as usize;
        if count > MAX_RANGES {
            return Err(RangeError::TooMany);
        }
        let mut ranges: ArrayVec<PhysRange, MAX_RANGES> = ArrayVec::new_const();
        for i in 0..count {
            ranges.push(PhysRange::new(msg.starts[i], msg.ends[i]));
        }
        Self::from_ranges(role, &ranges)
    }

    /// Wire form, stamped with the given virtual time.
    pub fn to_msg(&self, timestamp: Tick) -> RangeMsg {
        let mut msg = RangeMsg::new(timestamp);
        msg.pkt_type |= self.role.pkt_type_bit();
        msg.count = self.ranges.len() as u8;
        for (i, r) in self.ranges.iter().enumerate() {
            msg.starts[i] = r.start;
            msg.ends[i] = r.end;
        }
        msg
    }

    #[inline(always)]
    pub fn role(&self) -> ProxyRole {
        self.role
    }

    #[inline(always)]
    pub fn ranges(&self) -> &[PhysRange] {
        &self.ranges
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn responsible_for(&self, addr: u64) -> bool {
        self.ranges.iter().any(|r| r.contains(addr))
    }
}

/// The peer's currently active advertisement. Replacement is all or
/// nothing: a new advertisement is fully validated before it displaces
/// the previous set, so a rejected one leaves the old set in force.
#[derive(Debug, Default)]
pub struct RangeNegotiator {
    active: Option<RangeSet>,
}

impl RangeNegotiator {
    pub const fn new() -> Self {
        Self { active: None }
    }

    /// Apply an incoming advertisement, atomically replacing the active
    /// set.
    pub fn apply(&mut self, msg: &RangeMsg) -> Result<&RangeSet, RangeError> {
        let set = RangeSet::from_msg(msg)?;
        Ok(self.active.insert(set))
    }

    #[inline(always)]
    pub fn active(&self) -> Option<&RangeSet> {
        self.active.as_ref()
    }

    /// Routing query against the active set. `false` until the first
    /// advertisement arrives.
    pub fn responsible_for(&self, addr: u64) -> bool {
        self.active.as_ref().is_some_and(|s| s.responsible_for(addr))
    }
}
