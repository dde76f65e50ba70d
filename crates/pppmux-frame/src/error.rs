/// Errors that can occur while inspecting or building frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame is shorter than the 4-byte PPP header.
    #[error("truncated frame ({len} bytes, header needs {header})", header = crate::proto::PPP_HDRLEN)]
    TruncatedHeader { len: usize },

    /// The protocol number is not a valid network-layer id.
    #[error("invalid protocol number {raw:#06x}")]
    InvalidProtocol { raw: u16 },
}

pub type Result<T> = std::result::Result<T, FrameError>;
