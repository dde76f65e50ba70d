//! PPP frame model for the pppmux multiplexer.
//!
//! A frame on the wire carries a 4-byte header:
//! - Address byte `0xff` (all stations)
//! - Control byte `0x03` (unnumbered information)
//! - 2-byte big-endian protocol number
//!
//! Everything arriving from or leaving toward the lower endpoint is one
//! of a small closed set of [`LinkFrame`] variants; protocol-number
//! validation and the legacy Ethertype alias live in [`proto`].

pub mod error;
pub mod frame;
pub mod proto;

pub use error::{FrameError, Result};
pub use frame::{LinkFrame, StatusKind};
pub use proto::{
    encode_header, normalize_sap, protocol_of, ProtocolId, ETHERTYPE_IP, MAX_FRAME_SIZE,
    MIN_FRAME_SIZE, PPP_ALLSTATIONS, PPP_HDRLEN, PPP_IP, PPP_UI,
};
