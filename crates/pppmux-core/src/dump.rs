//! Read-only structured introspection of the whole multiplexer.

use serde::Serialize;

use crate::link::LinkStats;
use crate::mux::Mux;
use crate::session::{BindingState, ForwardMode, SessionRole};

/// One session as seen by `debug_dump`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: u64,
    pub role: SessionRole,
    pub state: BindingState,
    pub link: Option<u32>,
    pub protocol_id: Option<u16>,
    pub requested_sap: Option<u16>,
    pub mode: ForwardMode,
    pub privileged: bool,
    pub terminal: bool,
    pub blocked: bool,
    pub debug_log: bool,
    pub outbound_depth: usize,
    pub inbound_depth: usize,
}

/// One link as seen by `debug_dump`.
#[derive(Debug, Clone, Serialize)]
pub struct LinkSnapshot {
    pub id: u32,
    pub control: u64,
    pub sessions: Vec<u64>,
    pub mtu: u32,
    pub mru: u32,
    pub lower_attached: bool,
    pub staging_depth: usize,
    pub stats: LinkStats,
}

/// Everything the multiplexer knows, at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MuxSnapshot {
    pub sessions: Vec<SessionSnapshot>,
    pub links: Vec<LinkSnapshot>,
}

impl Mux {
    /// Snapshot every session and link. Read-only; mutates nothing.
    pub fn debug_dump(&self) -> MuxSnapshot {
        let reg = self.read();

        let mut sessions: Vec<SessionSnapshot> = reg
            .sessions()
            .map(|s| SessionSnapshot {
                id: s.id.raw(),
                role: s.role,
                state: s.state,
                link: s.link.map(|l| l.raw()),
                protocol_id: s.protocol_id.map(|p| p.raw()),
                requested_sap: s.requested_sap,
                mode: s.mode,
                privileged: s.privileged,
                terminal: s.terminal,
                blocked: s.blocked(),
                debug_log: s.debug_log,
                outbound_depth: s.outbound_depth(),
                inbound_depth: s.inbound_len(),
            })
            .collect();
        sessions.sort_by_key(|s| s.id);

        let links: Vec<LinkSnapshot> = reg
            .links()
            .map(|l| LinkSnapshot {
                id: l.id.raw(),
                control: l.control.raw(),
                sessions: l.sessions.iter().map(|s| s.raw()).collect(),
                mtu: l.mtu,
                mru: l.mru,
                lower_attached: l.lower_attached(),
                staging_depth: l.staging_len(),
                stats: l.counters.snapshot(),
            })
            .collect();

        MuxSnapshot { sessions, links }
    }
}
