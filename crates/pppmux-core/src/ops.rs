//! Control-plane operations exposed to the managing process.

use tracing::debug;

use crate::error::{MuxError, Result};
use crate::link::{clamp_frame_size, IdleTime, LinkId, LinkStats};
use crate::mux::Mux;
use crate::session::{ForwardMode, SessionId};

/// Service primitives this connectionless multiplexer does not provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServicePrimitive {
    Connect,
    Disconnect,
    Reset,
    EnableMulticast,
    DisableMulticast,
    PromiscuousOn,
    PromiscuousOff,
    NegotiateQos,
}

impl Mux {
    /// Set a link's MTU, clamped into the allowed frame-size range.
    pub fn set_mtu(&self, link: LinkId, n: u32) -> Result<u32> {
        let clamped = clamp_frame_size(n)?;
        let mut reg = self.write();
        let l = reg.link_mut(link).ok_or(MuxError::NoSuchLink)?;
        l.mtu = clamped;
        debug!(link = link.raw(), mtu = clamped, "mtu set");
        Ok(clamped)
    }

    /// Set a link's MRU, clamped into the allowed frame-size range.
    pub fn set_mru(&self, link: LinkId, n: u32) -> Result<u32> {
        let clamped = clamp_frame_size(n)?;
        let mut reg = self.write();
        let l = reg.link_mut(link).ok_or(MuxError::NoSuchLink)?;
        l.mru = clamped;
        debug!(link = link.raw(), mru = clamped, "mru set");
        Ok(clamped)
    }

    /// Change the forward mode of the session bound to `sap` on `link`.
    ///
    /// Switching to Drop or Error flushes the session's pending
    /// outbound queue (flushed frames count as output errors);
    /// switching to Pass with queued data retries the queue at once.
    pub fn set_forward_mode(&self, link: LinkId, sap: u16, mode: ForwardMode) -> Result<()> {
        {
            let mut reg = self.write();
            let l = reg.link(link).ok_or(MuxError::NoSuchLink)?;
            let target = l
                .sessions
                .iter()
                .copied()
                .find(|&sid| {
                    reg.session(sid)
                        .is_some_and(|s| s.protocol_id.map(|p| p.raw()) == Some(sap))
                })
                .ok_or(MuxError::NoSuchBinding(sap))?;

            let s = reg
                .session_mut(target)
                .ok_or(MuxError::NoSuchBinding(sap))?;
            s.mode = mode;
            let flushed = if matches!(mode, ForwardMode::Drop | ForwardMode::Error) {
                s.flush_outbound()
            } else {
                0
            };
            debug!(
                link = link.raw(),
                session = target.raw(),
                ?mode,
                flushed,
                "forward mode set"
            );
            if flushed > 0 {
                if let Some(l) = reg.link(link) {
                    l.counters.count_out_errors(flushed);
                }
            }
        }
        if mode == ForwardMode::Pass {
            self.kick_link(link);
        }
        Ok(())
    }

    /// How long since the link last sent and last received data.
    pub fn query_idle_time(&self, link: LinkId) -> Result<IdleTime> {
        let reg = self.read();
        let l = reg.link(link).ok_or(MuxError::NoSuchLink)?;
        Ok(IdleTime {
            tx_idle: l.last_sent.idle(&self.clock),
            rx_idle: l.last_recv.idle(&self.clock),
        })
    }

    /// Snapshot of the link's packet/byte/error counters.
    pub fn query_statistics(&self, link: LinkId) -> Result<LinkStats> {
        let reg = self.read();
        let l = reg.link(link).ok_or(MuxError::NoSuchLink)?;
        Ok(l.counters.snapshot())
    }

    /// Record that no further multiplexing layer exists beneath this
    /// session; pass-through statistics requests stop being meaningful.
    pub fn mark_terminal(&self, session: SessionId) -> Result<()> {
        let mut reg = self.write();
        let s = reg
            .session_mut(session)
            .ok_or(MuxError::InvalidArgument("unknown session"))?;
        s.terminal = true;
        Ok(())
    }

    /// Enable or disable per-frame debug logging for a session.
    pub fn set_debug_log(&self, session: SessionId, enabled: bool) -> Result<()> {
        let mut reg = self.write();
        let s = reg
            .session_mut(session)
            .ok_or(MuxError::InvalidArgument("unknown session"))?;
        s.debug_log = enabled;
        debug!(session = session.raw(), enabled, "debug log toggled");
        Ok(())
    }

    /// Connection-oriented, multicast, and QoS primitives are all
    /// rejected: this service is connectionless only.
    pub fn service_request(&self, session: SessionId, primitive: ServicePrimitive) -> Result<()> {
        let reg = self.read();
        reg.session(session)
            .ok_or(MuxError::InvalidArgument("unknown session"))?;
        debug!(session = session.raw(), ?primitive, "unsupported primitive");
        Err(MuxError::Unsupported)
    }
}
