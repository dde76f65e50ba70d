use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use bytes::Bytes;
use pppmux_frame::ProtocolId;
use serde::Serialize;

use crate::link::LinkId;

/// Stable handle for a session; never reused while the process lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SessionId(pub(crate) u64);

impl SessionId {
    /// The raw numeric handle.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a session is for: managing its link, or carrying one protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    Control,
    NetworkProtocol,
}

/// Attach/bind lifecycle position.
///
/// The only legal path is Unattached → Unbound → Idle → Unbound →
/// Unattached; every transition is validated and fails `OutOfState`
/// without side effects otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingState {
    Unattached,
    Unbound,
    Idle,
}

/// Per-session policy for outbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardMode {
    /// Forward toward the link.
    Pass,
    /// Discard silently (counted as an output error).
    Drop,
    /// Hold in the session's outbound queue.
    Queue,
    /// Discard; same accounting as Drop.
    Error,
}

/// An item read back out of a session's inbound queue.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// A data frame. Network-protocol sessions see the payload with
    /// the PPP header stripped; the control session sees whole frames.
    Data(Bytes),
    /// A matched reply to a control request this session issued.
    ControlReply { id: u32, payload: Bytes },
    /// Zero-length end-of-data: the lower endpoint hung up.
    EndOfData,
}

#[derive(Debug)]
pub(crate) struct Session {
    pub id: SessionId,
    pub role: SessionRole,
    pub state: BindingState,
    pub link: Option<LinkId>,
    pub protocol_id: Option<ProtocolId>,
    /// The sap the peer originally asked for, before aliasing.
    pub requested_sap: Option<u16>,
    pub mode: ForwardMode,
    pub privileged: bool,
    pub terminal: bool,
    pub debug_log: bool,
    /// Set when a downstream target could not accept this session's
    /// data; cleared by the next successful drain.
    blocked: AtomicBool,
    /// Outstanding control-request id awaiting a reply from below.
    pub pending_request: Mutex<Option<u32>>,
    /// Wire-ready outbound frames held under Queue mode or flow block.
    pub outbound: Mutex<VecDeque<Bytes>>,
    /// Frames delivered to this session, awaiting `recv`.
    pub inbound: Mutex<VecDeque<Delivery>>,
    pub inbound_depth: usize,
}

impl Session {
    pub fn new(id: SessionId, privileged: bool, inbound_depth: usize) -> Self {
        Self {
            id,
            role: SessionRole::NetworkProtocol,
            state: BindingState::Unattached,
            link: None,
            protocol_id: None,
            requested_sap: None,
            mode: ForwardMode::Drop,
            privileged,
            terminal: false,
            debug_log: false,
            blocked: AtomicBool::new(false),
            pending_request: Mutex::new(None),
            outbound: Mutex::new(VecDeque::new()),
            inbound: Mutex::new(VecDeque::new()),
            inbound_depth,
        }
    }

    pub fn is_control(&self) -> bool {
        self.role == SessionRole::Control
    }

    pub fn blocked(&self) -> bool {
        self.blocked.load(Ordering::Acquire)
    }

    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::Release);
    }

    /// Push a delivery if the queue has room.
    pub fn offer_inbound(&self, item: Delivery) -> bool {
        let mut q = self.inbound.lock().expect("inbound queue poisoned");
        if q.len() >= self.inbound_depth {
            return false;
        }
        q.push_back(item);
        true
    }

    /// Push a delivery unconditionally. Used for end-of-data, which
    /// must reach the control session even under backpressure.
    pub fn force_inbound(&self, item: Delivery) {
        self.inbound
            .lock()
            .expect("inbound queue poisoned")
            .push_back(item);
    }

    /// Discard all queued outbound frames, returning how many were dropped.
    pub fn flush_outbound(&self) -> usize {
        let mut q = self.outbound.lock().expect("outbound queue poisoned");
        let n = q.len();
        q.clear();
        n
    }

    pub fn outbound_depth(&self) -> usize {
        self.outbound.lock().expect("outbound queue poisoned").len()
    }

    pub fn inbound_len(&self) -> usize {
        self.inbound.lock().expect("inbound queue poisoned").len()
    }

    /// Reset per-attachment state so a re-attach is indistinguishable
    /// from a fresh one.
    pub fn reset_attachment(&mut self) {
        self.protocol_id = None;
        self.requested_sap = None;
        self.mode = ForwardMode::Drop;
        self.set_blocked(false);
        self.flush_outbound();
        *self.pending_request.lock().expect("pending request poisoned") = None;
    }
}
