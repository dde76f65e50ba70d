//! The single owned catalogue of sessions and links.
//!
//! Nothing else inserts or removes entries; all structural mutation
//! happens here under the multiplexer's exclusive topology lock.

use std::collections::{BTreeMap, HashMap};

use pppmux_frame::ProtocolId;
use tracing::debug;

use crate::link::{Link, LinkId};
use crate::session::{BindingState, Session, SessionId};

#[derive(Default)]
pub(crate) struct Registry {
    sessions: HashMap<u64, Session>,
    links: BTreeMap<u32, Link>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id.0)
    }

    pub fn session_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id.0)
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id.0)
    }

    pub fn link_mut(&mut self, id: LinkId) -> Option<&mut Link> {
        self.links.get_mut(&id.0)
    }

    pub fn insert_session(&mut self, session: Session) {
        self.sessions.insert(session.id.0, session);
    }

    /// Remove a session record. If it is attached to a link, unlink it
    /// from that link's session list; the link itself persists.
    pub fn remove_session(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&id.0)?;
        if let Some(link_id) = session.link {
            if let Some(link) = self.links.get_mut(&link_id.0) {
                link.sessions.retain(|&s| s != id);
            }
        }
        Some(session)
    }

    /// The smallest non-negative link id not currently in use.
    pub fn allocate_link_id(&self) -> LinkId {
        let mut candidate = 0u32;
        for &id in self.links.keys() {
            if id != candidate {
                break;
            }
            candidate += 1;
        }
        LinkId(candidate)
    }

    pub fn insert_link(&mut self, link: Link) {
        self.links.insert(link.id.0, link);
    }

    /// Remove a link, force-detaching every attached session.
    ///
    /// Detached sessions are unblocked and their queued outbound data
    /// discarded; with the link gone there is nowhere left to drain to.
    pub fn remove_link(&mut self, id: LinkId) -> Option<Link> {
        let link = self.links.remove(&id.0)?;
        for &sid in &link.sessions {
            if let Some(session) = self.sessions.get_mut(&sid.0) {
                session.link = None;
                session.state = BindingState::Unattached;
                session.reset_attachment();
                debug!(session = sid.raw(), link = id.raw(), "force-detached");
            }
        }
        Some(link)
    }

    /// Find the session on `link` bound to `proto`, if any.
    pub fn find_bound(&self, link: &Link, proto: ProtocolId) -> Option<SessionId> {
        link.sessions
            .iter()
            .copied()
            .find(|&sid| {
                self.sessions
                    .get(&sid.0)
                    .is_some_and(|s| s.protocol_id == Some(proto))
            })
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }
}
