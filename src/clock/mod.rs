//! Virtual-time discipline. Each peer advances its own simulated clock
//! only as far as the other peer's last-heard timestamp plus the
//! lookahead bound allows. The check is cooperative: a stall is a
//! refusal to advance, never a blocked thread.

/// Simulated time. Independent of wall-clock time.
pub type Tick = u64;

/// Sync engine parameters.
///
/// `lookahead` is how far local time may run past the last timestamp
/// received from the peer — for a linked pair of simulators this is the
/// link latency, since nothing the peer sends can take effect sooner.
/// `sync_interval` is the longest stretch of virtual time the peer is
/// left without hearing from us before a beacon goes out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub lookahead: Tick,
    pub sync_interval: Tick,
}

impl SyncConfig {
    pub const DEFAULT_LOOKAHEAD: Tick = 500;
    pub const DEFAULT_SYNC_INTERVAL: Tick = 500;
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lookahead: Self::DEFAULT_LOOKAHEAD,
            sync_interval: Self::DEFAULT_SYNC_INTERVAL,
        }
    }
}

/// Outcome of an advancement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Clock moved (or already stood at) the requested tick.
    Granted(Tick),
    /// Requested tick lies past the horizon; the clock did not move.
    /// `horizon` is the furthest currently permitted tick.
    Stalled { horizon: Tick },
}

/// Per-peer synchronization state.
///
/// Skew invariant: `local_time() - peer_time() <= lookahead` after any
/// sequence of operations, because [`SyncEngine::try_advance`] is the
/// only way local time moves.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    local: Tick,
    peer: Tick,
    lookahead: Tick,
    sync_interval: Tick,
    /// Timestamp of the last message we stamped, beacon or not.
    last_tx: Tick,
    /// Set after a stall-forced beacon; cleared by the next arrival so
    /// a stalled peer sends exactly one beacon per silence.
    stall_beacon_sent: bool,
    stalled: bool,
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            local: 0,
            peer: 0,
            lookahead: config.lookahead,
            sync_interval: config.sync_interval,
            last_tx: 0,
            stall_beacon_sent: false,
            stalled: false,
        }
    }

    #[inline(always)]
    pub fn local_time(&self) -> Tick {
        self.local
    }

    /// Latest timestamp received from the peer. Non-decreasing.
    #[inline(always)]
    pub fn peer_time(&self) -> Tick {
        self.peer
    }

    /// Furthest tick local time may currently reach.
    #[inline(always)]
    pub fn horizon(&self) -> Tick {
        self.peer.saturating_add(self.lookahead)
    }

    /// Fold in a received timestamp. Called for every arrival — packets,
    /// beacons, advertisements, and dummies alike.
    pub fn observe(&mut self, timestamp: Tick) {
        if timestamp > self.peer {
            self.peer = timestamp;
        }
        // Any arrival acknowledges us; a future stall may beacon again.
        self.stall_beacon_sent = false;
        if self.local <= self.horizon() {
            self.stalled = false;
        }
    }

    /// Stamp an outgoing message with the current local time.
    pub fn stamp(&mut self) -> Tick {
        self.last_tx = self.local;
        self.local
    }

    /// Try to move local time to `to`. Never blocks; a stall means the
    /// caller must go service the channel (and likely emit a beacon)
    /// before simulating further.
    pub fn try_advance(&mut self, to: Tick) -> Advance {
        let horizon = self.horizon();
        if to > horizon {
            self.stalled = true;
            return Advance::Stalled { horizon };
        }
        if to > self.local {
            self.local = to;
        }
        self.stalled = false;
        Advance::Granted(self.local)
    }

    /// Whether a sync beacon should go out now: either the peer has not
    /// heard from us for `sync_interval` ticks of local time, or we just
    /// stalled and have not beaconed since the last arrival. Returns the
    /// timestamp to put on the beacon and accounts for it being sent.
    pub fn poll_beacon(&mut self) -> Option<Tick> {
        let forced = self.stalled && !self.stall_beacon_sent;
        let periodic = self.local.saturating_sub(self.last_tx) >= self.sync_interval;
        if !forced && !periodic {
            return None;
        }
        if forced {
            self.stall_beacon_sent = true;
        }
        Some(self.stamp())
    }

    /// True while local time sits at the horizon waiting for the peer.
    #[inline(always)]
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }
}
