//! PPP frame multiplexer core.
//!
//! One [`Mux`] sits between a lower endpoint (the physical or logical
//! link, abstracted as a [`LowerSink`]) and many upper sessions: one
//! control session per link plus any number of network-protocol
//! sessions, each bound to a protocol number. Inbound frames fan out
//! to the session bound to their protocol id; outbound frames fan back
//! down to the link, or loop back to the control session when no lower
//! endpoint is attached. Backpressure is symmetric and order is strict
//! FIFO per session.
//!
//! Link negotiation (LCP/IPCP) is not done here; a peer control-plane
//! process drives it through the control session.

pub mod clock;
pub mod dump;
pub mod engine;
pub mod error;
pub mod link;
pub mod mux;
pub mod ops;
mod registry;
pub mod session;

pub use dump::{LinkSnapshot, MuxSnapshot, SessionSnapshot};
pub use engine::{RequestKind, SubmitOutcome};
pub use error::{MuxError, Result};
pub use link::{IdleTime, LinkId, LinkStats, LowerSink};
pub use mux::{Mux, MuxConfig};
pub use ops::ServicePrimitive;
pub use session::{BindingState, Delivery, ForwardMode, SessionId, SessionRole};
