//! Multiplexer construction, session lifecycle, and the attach/bind
//! state machine.
//!
//! Structural operations (everything in this module) serialize on the
//! topology write lock; the data path in `engine` only ever takes the
//! read side plus per-queue locks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use pppmux_frame::{normalize_sap, ProtocolId};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{MuxError, Result};
use crate::link::{Link, LinkId, LowerSink};
use crate::registry::Registry;
use crate::session::{BindingState, ForwardMode, Session, SessionId, SessionRole};

/// Queue sizing for a multiplexer.
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Deliveries a session's inbound queue holds before the link
    /// starts staging frames for it.
    pub inbound_queue_depth: usize,
    /// Frames a link's staging queue holds before `link_can_accept`
    /// pushes backpressure onto the lower endpoint.
    pub staging_queue_depth: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            inbound_queue_depth: 64,
            staging_queue_depth: 64,
        }
    }
}

/// One process-level multiplexer context: owns every session and link.
pub struct Mux {
    pub(crate) topology: RwLock<Registry>,
    pub(crate) clock: Clock,
    pub(crate) config: MuxConfig,
    next_session: AtomicU64,
}

impl Mux {
    /// Create a multiplexer with default queue depths.
    pub fn new() -> Self {
        Self::with_config(MuxConfig::default())
    }

    /// Create a multiplexer with explicit queue depths.
    pub fn with_config(config: MuxConfig) -> Self {
        Self {
            topology: RwLock::new(Registry::new()),
            clock: Clock::new(),
            config,
            next_session: AtomicU64::new(1),
        }
    }

    pub(crate) fn read(&self) -> std::sync::RwLockReadGuard<'_, Registry> {
        self.topology.read().expect("topology lock poisoned")
    }

    pub(crate) fn write(&self) -> std::sync::RwLockWriteGuard<'_, Registry> {
        self.topology.write().expect("topology lock poisoned")
    }

    /// Open a new session. Privilege is evaluated once, here.
    pub fn open_session(&self, privileged: bool) -> SessionId {
        let id = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        let session = Session::new(id, privileged, self.config.inbound_queue_depth);
        self.write().insert_session(session);
        debug!(session = id.raw(), privileged, "session opened");
        id
    }

    /// Close a session.
    ///
    /// A network-protocol session is detached from its link; closing a
    /// control session tears the whole link down and force-detaches
    /// everything attached to it. Closing an unknown id is a no-op.
    pub fn close_session(&self, id: SessionId) {
        let mut reg = self.write();
        let Some(session) = reg.session(id) else {
            warn!(session = id.raw(), "close of unknown session");
            return;
        };
        let anchored = session.is_control().then_some(session.link).flatten();
        if let Some(link_id) = anchored {
            reg.remove_link(link_id);
            debug!(link = link_id.raw(), "link removed with control session");
        }
        reg.remove_session(id);
        debug!(session = id.raw(), "session closed");
    }

    /// Create a new link anchored on `session`, which becomes its
    /// control session.
    pub fn create_link(&self, session: SessionId) -> Result<LinkId> {
        let mut reg = self.write();
        let s = reg
            .session(session)
            .ok_or(MuxError::InvalidArgument("unknown session"))?;
        if !s.privileged {
            return Err(MuxError::PrivilegeDenied);
        }
        if s.is_control() || s.link.is_some() {
            return Err(MuxError::AlreadyBound);
        }

        let id = reg.allocate_link_id();
        let link = Link::new(
            id,
            session,
            self.clock.now_millis(),
            self.config.staging_queue_depth,
        );
        reg.insert_link(link);

        let s = reg
            .session_mut(session)
            .ok_or(MuxError::InvalidArgument("unknown session"))?;
        s.role = SessionRole::Control;
        s.mode = ForwardMode::Pass;
        s.link = Some(id);
        debug!(session = session.raw(), link = id.raw(), "link created");
        Ok(id)
    }

    /// Attach a session to a link. Valid only from `Unattached`.
    ///
    /// A re-attach restores the session to a freshly-attached state:
    /// no binding, mode back to `Drop`, queues empty.
    pub fn attach(&self, session: SessionId, link: LinkId) -> Result<()> {
        let mut reg = self.write();
        let s = reg
            .session(session)
            .ok_or(MuxError::InvalidArgument("unknown session"))?;
        if s.state != BindingState::Unattached || s.link.is_some() {
            return Err(MuxError::OutOfState);
        }
        if reg.link(link).is_none() {
            return Err(MuxError::NoSuchLink);
        }

        let s = reg
            .session_mut(session)
            .ok_or(MuxError::InvalidArgument("unknown session"))?;
        s.link = Some(link);
        s.state = BindingState::Unbound;
        s.reset_attachment();
        let log = s.debug_log;
        if let Some(l) = reg.link_mut(link) {
            l.sessions.push(session);
        }
        if log {
            debug!(session = session.raw(), link = link.raw(), "attached");
        }
        Ok(())
    }

    /// Detach a session from its link. Valid only from `Unbound`.
    pub fn detach(&self, session: SessionId) -> Result<()> {
        let mut reg = self.write();
        let s = reg
            .session(session)
            .ok_or(MuxError::InvalidArgument("unknown session"))?;
        if s.state != BindingState::Unbound {
            return Err(MuxError::OutOfState);
        }
        let Some(link_id) = s.link else {
            return Err(MuxError::OutOfState);
        };

        if let Some(l) = reg.link_mut(link_id) {
            l.sessions.retain(|&sid| sid != session);
        }
        let s = reg
            .session_mut(session)
            .ok_or(MuxError::InvalidArgument("unknown session"))?;
        s.link = None;
        s.state = BindingState::Unattached;
        s.reset_attachment();
        debug!(session = session.raw(), link = link_id.raw(), "detached");
        Ok(())
    }

    /// Bind a session to a protocol id. Valid only from `Unbound`.
    ///
    /// The requested sap is normalized through the legacy Ethertype
    /// alias and validated; the normalized id is returned and used on
    /// the wire, while the requested value is kept for introspection.
    pub fn bind(&self, session: SessionId, sap: u16) -> Result<ProtocolId> {
        let mut reg = self.write();
        let s = reg
            .session(session)
            .ok_or(MuxError::InvalidArgument("unknown session"))?;
        if s.state != BindingState::Unbound {
            return Err(MuxError::OutOfState);
        }
        let Some(link_id) = s.link else {
            return Err(MuxError::OutOfState);
        };

        let normalized = normalize_sap(sap).map_err(|_| MuxError::InvalidAddress(sap))?;

        let link = reg.link(link_id).ok_or(MuxError::NoSuchLink)?;
        if reg.find_bound(link, normalized).is_some() {
            return Err(MuxError::AddressInUse(normalized.raw()));
        }

        let s = reg
            .session_mut(session)
            .ok_or(MuxError::InvalidArgument("unknown session"))?;
        s.requested_sap = Some(sap);
        s.protocol_id = Some(normalized);
        s.state = BindingState::Idle;
        if s.debug_log {
            debug!(session = session.raw(), sap = %normalized, "bound");
        }
        Ok(normalized)
    }

    /// Release a session's protocol binding. Valid only from `Idle`.
    pub fn unbind(&self, session: SessionId) -> Result<()> {
        let mut reg = self.write();
        let s = reg
            .session_mut(session)
            .ok_or(MuxError::InvalidArgument("unknown session"))?;
        if s.state != BindingState::Idle {
            return Err(MuxError::OutOfState);
        }
        s.protocol_id = None;
        s.requested_sap = None;
        s.state = BindingState::Unbound;
        debug!(session = session.raw(), "unbound");
        Ok(())
    }

    /// Wire a lower endpoint beneath a link.
    ///
    /// Sessions blocked while the link was lower-less are re-tried
    /// immediately against the new sink.
    pub fn attach_lower(&self, link: LinkId, sink: Arc<dyn LowerSink>) -> Result<()> {
        {
            let mut reg = self.write();
            let l = reg.link_mut(link).ok_or(MuxError::NoSuchLink)?;
            if l.lower.is_some() {
                return Err(MuxError::AlreadyBound);
            }
            l.lower = Some(sink);
            let control = l.control;
            if let Some(s) = reg.session_mut(control) {
                // Modules are linked below again.
                s.terminal = false;
            }
        }
        debug!(link = link.raw(), "lower endpoint attached");
        self.kick_link(link);
        Ok(())
    }

    /// Unwire the lower endpoint from a link. Outbound traffic loops
    /// back to the control session until a new one is attached.
    pub fn detach_lower(&self, link: LinkId) -> Result<()> {
        {
            let mut reg = self.write();
            let l = reg.link_mut(link).ok_or(MuxError::NoSuchLink)?;
            l.lower = None;
        }
        debug!(link = link.raw(), "lower endpoint detached");
        self.kick_link(link);
        Ok(())
    }
}

impl Default for Mux {
    fn default() -> Self {
        Self::new()
    }
}
