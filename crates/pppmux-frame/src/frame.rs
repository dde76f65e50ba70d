use bytes::Bytes;

/// Direction of an error reported by the lower endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// A receive-side error was detected below the link.
    InboundError,
    /// A transmit-side error was detected below the link.
    OutboundError,
}

/// Everything that moves across the boundary between a link and its
/// lower endpoint.
#[derive(Debug, Clone)]
pub enum LinkFrame {
    /// An ordinary framed packet (PPP header included).
    Data(Bytes),
    /// A control-plane request being passed down to the modules below,
    /// tagged so the reply can be matched back to the issuing session.
    ControlRequest { id: u32, payload: Bytes },
    /// A reply to an earlier [`LinkFrame::ControlRequest`].
    ControlReply { id: u32, payload: Bytes },
    /// An error/status report; consumed by the link, never forwarded.
    StatusSignal(StatusKind),
    /// The lower endpoint can accept data again.
    FlowSignal,
    /// The lower endpoint has hung up.
    TerminationSignal,
}

impl LinkFrame {
    /// Payload size in bytes, for counter accounting.
    pub fn len(&self) -> usize {
        match self {
            LinkFrame::Data(payload) => payload.len(),
            LinkFrame::ControlRequest { payload, .. } => payload.len(),
            LinkFrame::ControlReply { payload, .. } => payload.len(),
            _ => 0,
        }
    }

    /// True when the frame carries no payload bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            LinkFrame::Data(_) => "data",
            LinkFrame::ControlRequest { .. } => "control-request",
            LinkFrame::ControlReply { .. } => "control-reply",
            LinkFrame::StatusSignal(_) => "status",
            LinkFrame::FlowSignal => "flow",
            LinkFrame::TerminationSignal => "termination",
        }
    }
}
