/// Errors returned by multiplexer operations.
///
/// Every error is a synchronous return value; a failed structural
/// operation leaves the registry exactly as it was. Data-path losses
/// (drop mode, no destination) are accounted in counters instead.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MuxError {
    /// The operation is not valid in the session's current binding state.
    #[error("operation invalid in current binding state")]
    OutOfState,

    /// The referenced link does not exist.
    #[error("no such link")]
    NoSuchLink,

    /// No session on the link is bound to the given protocol id.
    #[error("no session bound to protocol {0:#06x}")]
    NoSuchBinding(u16),

    /// Another session on the link already holds this protocol id.
    #[error("protocol {0:#06x} already bound on this link")]
    AddressInUse(u16),

    /// The protocol id is not a valid network-layer protocol number.
    #[error("invalid protocol address {0:#06x}")]
    InvalidAddress(u16),

    /// A value is outside its allowed range.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The session lacks the privilege required for this operation.
    #[error("privilege denied")]
    PrivilegeDenied,

    /// Connection-oriented, multicast, and QoS primitives are not
    /// provided by this connectionless service.
    #[error("unsupported primitive")]
    Unsupported,

    /// A control-message buffer could not be reserved; no reservation
    /// is held, retry after backoff.
    #[error("control buffer exhausted, retry later")]
    ResourceExhausted,

    /// The session is already attached or already anchors a link.
    #[error("session already bound")]
    AlreadyBound,
}

pub type Result<T> = std::result::Result<T, MuxError>;
