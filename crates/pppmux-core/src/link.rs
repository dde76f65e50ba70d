use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pppmux_frame::{LinkFrame, MAX_FRAME_SIZE, MIN_FRAME_SIZE};
use serde::Serialize;

use crate::clock::ActivityStamp;
use crate::error::{MuxError, Result};
use crate::session::SessionId;

/// Handle for one multiplexed channel. The smallest id not currently
/// in use is handed out at creation, so removed ids are reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LinkId(pub(crate) u32);

impl LinkId {
    /// Wrap a raw link id, e.g. one parsed from an operator command.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The transport side beneath a link, if one is wired in.
///
/// Implementations must not block: `send` is only called after `ready`
/// reports capacity, and a sink that fills up signals
/// [`LinkFrame::FlowSignal`] back through `Mux::receive` when it can
/// accept data again.
pub trait LowerSink: Send + Sync {
    /// Can the sink accept one more frame right now?
    fn ready(&self) -> bool;

    /// Hand a frame to the sink.
    fn send(&self, frame: LinkFrame);
}

/// Packet, byte, and error counters for one link.
#[derive(Debug, Default)]
pub struct LinkCounters {
    in_packets: AtomicU64,
    in_bytes: AtomicU64,
    in_errors: AtomicU64,
    out_packets: AtomicU64,
    out_bytes: AtomicU64,
    out_errors: AtomicU64,
}

impl LinkCounters {
    pub fn count_in(&self, bytes: usize) {
        self.in_packets.fetch_add(1, Ordering::Relaxed);
        self.in_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn count_out(&self, bytes: usize) {
        self.out_packets.fetch_add(1, Ordering::Relaxed);
        self.out_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn count_in_error(&self) {
        self.in_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_out_error(&self) {
        self.out_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_out_errors(&self, n: usize) {
        self.out_errors.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LinkStats {
        LinkStats {
            in_packets: self.in_packets.load(Ordering::Relaxed),
            in_bytes: self.in_bytes.load(Ordering::Relaxed),
            in_errors: self.in_errors.load(Ordering::Relaxed),
            out_packets: self.out_packets.load(Ordering::Relaxed),
            out_bytes: self.out_bytes.load(Ordering::Relaxed),
            out_errors: self.out_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a link's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LinkStats {
    pub in_packets: u64,
    pub in_bytes: u64,
    pub in_errors: u64,
    pub out_packets: u64,
    pub out_bytes: u64,
    pub out_errors: u64,
}

/// How long since the link last carried data in each direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleTime {
    pub tx_idle: Duration,
    pub rx_idle: Duration,
}

pub(crate) struct Link {
    pub id: LinkId,
    /// The anchoring control session; always first in `sessions`.
    pub control: SessionId,
    /// Sessions attached to this link, control session first.
    pub sessions: Vec<SessionId>,
    pub mtu: u32,
    pub mru: u32,
    pub lower: Option<Arc<dyn LowerSink>>,
    pub counters: LinkCounters,
    pub last_sent: ActivityStamp,
    pub last_recv: ActivityStamp,
    /// Inbound frames held here when their destination cannot accept
    /// more, preserving arrival order and pushing backpressure onto
    /// the lower endpoint's read side.
    pub staging: Mutex<VecDeque<LinkFrame>>,
    pub staging_depth: usize,
}

impl Link {
    pub fn new(id: LinkId, control: SessionId, now_millis: u64, staging_depth: usize) -> Self {
        Self {
            id,
            control,
            sessions: vec![control],
            mtu: MIN_FRAME_SIZE,
            mru: MIN_FRAME_SIZE,
            lower: None,
            counters: LinkCounters::default(),
            last_sent: ActivityStamp::new(now_millis),
            last_recv: ActivityStamp::new(now_millis),
            staging: Mutex::new(VecDeque::new()),
            staging_depth,
        }
    }

    pub fn lower_attached(&self) -> bool {
        self.lower.is_some()
    }

    pub fn staging_len(&self) -> usize {
        self.staging.lock().expect("staging queue poisoned").len()
    }

    /// Read-side backpressure signal for the lower endpoint.
    pub fn can_accept(&self) -> bool {
        self.staging_len() < self.staging_depth
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("id", &self.id)
            .field("control", &self.control)
            .field("sessions", &self.sessions)
            .field("mtu", &self.mtu)
            .field("mru", &self.mru)
            .field("lower_attached", &self.lower_attached())
            .finish_non_exhaustive()
    }
}

/// Validate and clamp an MTU/MRU setting into the allowed range.
pub(crate) fn clamp_frame_size(n: u32) -> Result<u32> {
    if n == 0 || n > MAX_FRAME_SIZE {
        return Err(MuxError::InvalidArgument("frame size out of range"));
    }
    Ok(n.max(MIN_FRAME_SIZE))
}
