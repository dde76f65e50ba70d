//! The multiplexing and flow-control data path.
//!
//! Outbound: sessions submit payloads which are framed and handed to
//! the link's lower endpoint, looped back to the control session when
//! no lower is attached, or queued under backpressure. Inbound: frames
//! from the lower endpoint are classified and routed to the session
//! bound to their protocol number, staging at the link to preserve
//! order when a receiver is full.
//!
//! Nothing here blocks: a target that cannot accept data causes
//! immediate queuing and return, resolved later by an explicit ready
//! notification (a [`LinkFrame::FlowSignal`] or a `recv` that makes
//! room). Only the shared read side of the topology lock is taken;
//! queues have their own locks.

use bytes::Bytes;
use pppmux_frame::{encode_header, protocol_of, LinkFrame, StatusKind, PPP_HDRLEN};
use tracing::{debug, warn};

use crate::error::{MuxError, Result};
use crate::link::{Link, LinkId};
use crate::mux::Mux;
use crate::registry::Registry;
use crate::session::{BindingState, Delivery, ForwardMode, Session, SessionId, SessionRole};

/// What happened to a submitted outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Handed to the downstream target.
    Sent,
    /// Accepted and queued; it will go out on the next ready edge.
    Queued,
    /// Discarded and accounted as an output error.
    Dropped,
}

/// Classification of a pass-through control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Statistics query; allowed for any attached session.
    Statistics,
    /// Anything else; requires the session's privilege flag.
    Generic,
}

/// Disposition of one inbound delivery attempt.
#[derive(PartialEq)]
enum Disposition {
    Consumed,
    Held,
}

impl Mux {
    /// Submit an outbound frame from a session.
    ///
    /// Network-protocol sessions must be in `Idle` (bound) state and
    /// pass a raw network payload; the PPP header is added from the
    /// bound sap. The control session passes pre-framed packets.
    /// Losses (drop mode, oversize, no link) are reported as
    /// [`SubmitOutcome::Dropped`] and counted, never as errors.
    pub fn submit(&self, session: SessionId, payload: Bytes) -> Result<SubmitOutcome> {
        let reg = self.read();
        let s = reg
            .session(session)
            .ok_or(MuxError::InvalidArgument("unknown session"))?;
        if s.role == SessionRole::NetworkProtocol && s.state != BindingState::Idle {
            return Err(MuxError::OutOfState);
        }
        let Some(link_id) = s.link else {
            debug!(session = session.raw(), "submit with no link, dropped");
            return Ok(SubmitOutcome::Dropped);
        };
        let Some(link) = reg.link(link_id) else {
            warn!(link = link_id.raw(), "submit for removed link, dropped");
            return Ok(SubmitOutcome::Dropped);
        };

        let frame = match s.role {
            SessionRole::NetworkProtocol => {
                let Some(sap) = s.protocol_id else {
                    return Err(MuxError::OutOfState);
                };
                if matches!(s.mode, ForwardMode::Drop | ForwardMode::Error) {
                    if s.debug_log {
                        debug!(session = session.raw(), mode = ?s.mode, "dropping frame");
                    }
                    link.counters.count_out_error();
                    return Ok(SubmitOutcome::Dropped);
                }
                if payload.len() > link.mtu as usize {
                    debug!(
                        session = session.raw(),
                        len = payload.len(),
                        mtu = link.mtu,
                        "oversize frame dropped"
                    );
                    link.counters.count_out_error();
                    return Ok(SubmitOutcome::Dropped);
                }
                encode_header(sap, &payload)
            }
            SessionRole::Control => {
                if payload.len() > link.mtu as usize + PPP_HDRLEN {
                    debug!(
                        session = session.raw(),
                        len = payload.len(),
                        "oversize control frame dropped"
                    );
                    link.counters.count_out_error();
                    return Ok(SubmitOutcome::Dropped);
                }
                payload
            }
        };

        s.outbound
            .lock()
            .expect("outbound queue poisoned")
            .push_back(frame);
        if s.mode == ForwardMode::Queue || s.blocked() {
            return Ok(SubmitOutcome::Queued);
        }
        if self.drain_session(&reg, s, link) {
            Ok(SubmitOutcome::Sent)
        } else {
            Ok(SubmitOutcome::Queued)
        }
    }

    /// Pass a control request down the lower endpoint, recording the
    /// request id so the reply can be routed back to this session.
    ///
    /// Control requests bypass data flow control. A session may have
    /// one request outstanding at a time; `ResourceExhausted` means no
    /// reservation is held and the caller should retry after backoff.
    pub fn submit_control(
        &self,
        session: SessionId,
        id: u32,
        payload: Bytes,
        kind: RequestKind,
    ) -> Result<()> {
        let reg = self.read();
        let s = reg
            .session(session)
            .ok_or(MuxError::InvalidArgument("unknown session"))?;
        let Some(link_id) = s.link else {
            return Err(MuxError::InvalidArgument("session not attached"));
        };
        let link = reg.link(link_id).ok_or(MuxError::NoSuchLink)?;
        let Some(lower) = &link.lower else {
            return Err(MuxError::InvalidArgument("no lower endpoint"));
        };
        match kind {
            RequestKind::Statistics => {
                if s.terminal {
                    return Err(MuxError::InvalidArgument("no modules below this session"));
                }
            }
            RequestKind::Generic => {
                if !s.privileged {
                    warn!(session = session.raw(), id, "control request rejected");
                    return Err(MuxError::PrivilegeDenied);
                }
            }
        }

        let mut pending = s.pending_request.lock().expect("pending request poisoned");
        if pending.is_some() {
            return Err(MuxError::ResourceExhausted);
        }
        *pending = Some(id);
        drop(pending);

        lower.send(LinkFrame::ControlRequest { id, payload });
        Ok(())
    }

    /// Feed one frame arriving from the lower endpoint into the link.
    ///
    /// Frames for a removed link are dropped; close and removal never
    /// wait for in-flight traffic.
    pub fn receive(&self, link_id: LinkId, frame: LinkFrame) {
        let reg = self.read();
        let Some(link) = reg.link(link_id) else {
            warn!(link = link_id.raw(), kind = frame.kind(), "frame for removed link dropped");
            return;
        };

        match frame {
            LinkFrame::StatusSignal(StatusKind::InboundError) => link.counters.count_in_error(),
            LinkFrame::StatusSignal(StatusKind::OutboundError) => link.counters.count_out_error(),
            LinkFrame::FlowSignal => self.drain_link(&reg, link),
            LinkFrame::TerminationSignal => {
                // Never forward the hang-up itself: that would sever the
                // control channel too. A zero-length end-of-data stands
                // in for it.
                if let Some(control) = reg.session(link.control) {
                    control.force_inbound(Delivery::EndOfData);
                    debug!(link = link_id.raw(), "lower hang-up, eof delivered");
                }
            }
            LinkFrame::ControlReply { id, payload } => {
                let target = link.sessions.iter().copied().find(|&sid| {
                    reg.session(sid).is_some_and(|s| {
                        let mut pending =
                            s.pending_request.lock().expect("pending request poisoned");
                        if *pending == Some(id) {
                            *pending = None;
                            true
                        } else {
                            false
                        }
                    })
                });
                match target.and_then(|sid| reg.session(sid)) {
                    Some(s) => {
                        if !s.offer_inbound(Delivery::ControlReply { id, payload }) {
                            // Lost reply; upstream treats it as a timeout.
                            warn!(session = s.id.raw(), id, "control reply lost, receiver full");
                        }
                    }
                    None => warn!(id, "unmatched control reply discarded"),
                }
            }
            LinkFrame::ControlRequest { id, .. } => {
                warn!(link = link_id.raw(), id, "control request from below discarded");
            }
            LinkFrame::Data(bytes) => {
                link.counters.count_in(bytes.len());
                link.last_recv.touch(&self.clock);
                link.staging
                    .lock()
                    .expect("staging queue poisoned")
                    .push_back(LinkFrame::Data(bytes));
                self.drain_staging(&reg, link);
            }
        }
    }

    /// Read the next delivery for a session, if one is waiting.
    ///
    /// Making room re-drains the link's staging queue, and for a
    /// control session on a lower-less link re-enables any senders
    /// blocked on the loopback path.
    pub fn recv(&self, session: SessionId) -> Option<Delivery> {
        let reg = self.read();
        let s = reg.session(session)?;
        let item = s
            .inbound
            .lock()
            .expect("inbound queue poisoned")
            .pop_front();
        if item.is_some() {
            if let Some(link) = s.link.and_then(|id| reg.link(id)) {
                self.drain_staging(&reg, link);
                if s.is_control() && link.lower.is_none() {
                    self.drain_link(&reg, link);
                }
            }
        }
        item
    }

    /// Read-side backpressure: may the lower endpoint deliver more
    /// frames to this link right now?
    pub fn link_can_accept(&self, link: LinkId) -> bool {
        self.read().link(link).is_some_and(Link::can_accept)
    }

    /// Notification that the lower endpoint can accept data again.
    /// Equivalent to receiving a [`LinkFrame::FlowSignal`].
    pub fn lower_ready(&self, link: LinkId) {
        self.kick_link(link);
    }

    /// Re-try every session on the link that has deliverable queued
    /// output. Called after topology changes that open a path.
    pub(crate) fn kick_link(&self, link_id: LinkId) {
        let reg = self.read();
        if let Some(link) = reg.link(link_id) {
            self.drain_link(&reg, link);
        }
    }

    fn drain_link(&self, reg: &Registry, link: &Link) {
        for &sid in &link.sessions {
            let Some(s) = reg.session(sid) else { continue };
            if s.blocked() || (s.outbound_depth() > 0 && s.mode != ForwardMode::Queue) {
                self.drain_session(reg, s, link);
            }
        }
    }

    /// Drain a session's outbound queue in FIFO order. Returns true if
    /// the queue emptied; on a refusal the frame stays at the front and
    /// the session is marked blocked.
    pub(crate) fn drain_session(&self, reg: &Registry, s: &Session, link: &Link) -> bool {
        s.set_blocked(false);
        let mut q = s.outbound.lock().expect("outbound queue poisoned");
        while let Some(frame) = q.pop_front() {
            if !self.try_handoff(reg, link, &frame) {
                q.push_front(frame);
                s.set_blocked(true);
                return false;
            }
        }
        true
    }

    /// Hand one framed packet toward the link's downstream target:
    /// the lower endpoint when attached, the control session's inbound
    /// queue otherwise.
    fn try_handoff(&self, reg: &Registry, link: &Link, frame: &Bytes) -> bool {
        if let Some(lower) = &link.lower {
            if !lower.ready() {
                return false;
            }
            lower.send(LinkFrame::Data(frame.clone()));
        } else {
            let Some(control) = reg.session(link.control) else {
                return false;
            };
            if !control.offer_inbound(Delivery::Data(frame.clone())) {
                return false;
            }
        }
        link.counters.count_out(frame.len());
        link.last_sent.touch(&self.clock);
        true
    }

    /// Deliver staged inbound frames in arrival order, stopping at the
    /// first destination that still cannot accept. A held frame is
    /// always redelivered before anything that arrived after it.
    fn drain_staging(&self, reg: &Registry, link: &Link) {
        let mut staging = link.staging.lock().expect("staging queue poisoned");
        while let Some(front) = staging.front() {
            let LinkFrame::Data(bytes) = front else {
                staging.pop_front();
                continue;
            };
            if self.deliver_inbound(reg, link, bytes) == Disposition::Held {
                break;
            }
            staging.pop_front();
        }
    }

    /// Route one inbound data frame to its destination session.
    fn deliver_inbound(&self, reg: &Registry, link: &Link, bytes: &Bytes) -> Disposition {
        let proto = match protocol_of(bytes) {
            Ok(proto) => proto,
            Err(_) => {
                // Runt frame; account and consume.
                link.counters.count_in_error();
                return Disposition::Consumed;
            }
        };

        if proto.is_network() {
            if let Some(dest) = reg.find_bound(link, proto).and_then(|sid| reg.session(sid)) {
                let payload = bytes.slice(PPP_HDRLEN..);
                if dest.offer_inbound(Delivery::Data(payload)) {
                    return Disposition::Consumed;
                }
                if matches!(dest.mode, ForwardMode::Drop | ForwardMode::Error) {
                    link.counters.count_in_error();
                    return Disposition::Consumed;
                }
                return Disposition::Held;
            }
        }

        // Control-space protocol, or nothing bound to this sap: the
        // control session gets the whole frame.
        let Some(control) = reg.session(link.control) else {
            return Disposition::Consumed;
        };
        if control.offer_inbound(Delivery::Data(bytes.clone())) {
            Disposition::Consumed
        } else {
            Disposition::Held
        }
    }
}
