//! PPP protocol numbers (SAPs) and the frame header.
//!
//! Network-layer protocols occupy `0x21..=0x3fff` with an odd low byte
//! and an even high byte;
//! everything at `0x8000` and above belongs to the control plane (LCP,
//! the NCPs) and is always routed to the control session.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// PPP header: address (1) + control (1) + protocol (2) = 4 bytes.
pub const PPP_HDRLEN: usize = 4;

/// Address byte: all stations.
pub const PPP_ALLSTATIONS: u8 = 0xff;

/// Control byte: unnumbered information.
pub const PPP_UI: u8 = 0x03;

/// Internet Protocol.
pub const PPP_IP: ProtocolId = ProtocolId(0x21);

/// Legacy Ethertype for IP, accepted on bind in place of [`PPP_IP`].
pub const ETHERTYPE_IP: u16 = 0x800;

/// First protocol number in the control space.
pub const CONTROL_SPACE_START: u16 = 0x8000;

/// Floor for MTU/MRU settings (the default PPP MRU).
pub const MIN_FRAME_SIZE: u32 = 1500;

/// Ceiling for MTU/MRU settings.
pub const MAX_FRAME_SIZE: u32 = 65535;

/// A PPP protocol number identifying which network-layer protocol a
/// session carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolId(u16);

impl ProtocolId {
    /// Wrap a raw protocol number without validation.
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// The raw 16-bit protocol number.
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// True for numbers below the control space.
    pub const fn is_network(self) -> bool {
        self.0 < CONTROL_SPACE_START
    }

    /// True if this is a bindable network-layer protocol number:
    /// within `0x21..=0x3fff`, low byte odd, high byte even.
    pub const fn is_valid_network(self) -> bool {
        self.0 >= 0x21 && self.0 <= 0x3fff && (self.0 & 0x101) == 1
    }
}

impl std::fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Normalize a requested bind sap and validate it.
///
/// The legacy Ethertype for IP maps onto the canonical PPP protocol
/// number before validation, so a client asking for `0x800` binds
/// `0x21` on the wire.
pub fn normalize_sap(requested: u16) -> Result<ProtocolId> {
    let raw = if requested == ETHERTYPE_IP {
        PPP_IP.raw()
    } else {
        requested
    };
    let id = ProtocolId(raw);
    if !id.is_valid_network() {
        return Err(FrameError::InvalidProtocol { raw: requested });
    }
    Ok(id)
}

/// Prepend the PPP header for `proto` onto `payload`.
pub fn encode_header(proto: ProtocolId, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(PPP_HDRLEN + payload.len());
    buf.put_u8(PPP_ALLSTATIONS);
    buf.put_u8(PPP_UI);
    buf.put_u16(proto.raw());
    buf.put_slice(payload);
    buf.freeze()
}

/// Extract the protocol number from a framed packet.
pub fn protocol_of(frame: &[u8]) -> Result<ProtocolId> {
    if frame.len() < PPP_HDRLEN {
        return Err(FrameError::TruncatedHeader { len: frame.len() });
    }
    Ok(ProtocolId(u16::from_be_bytes([frame[2], frame[3]])))
}
