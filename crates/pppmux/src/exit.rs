use std::fmt;

use pppmux_core::MuxError;

// Exit code constants, sysexits-style.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const STATE_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn mux_error(context: &str, err: MuxError) -> CliError {
    let code = match err {
        MuxError::PrivilegeDenied => PERMISSION_DENIED,
        MuxError::OutOfState | MuxError::AlreadyBound | MuxError::AddressInUse(_) => STATE_ERROR,
        MuxError::InvalidAddress(_) => DATA_INVALID,
        MuxError::InvalidArgument(_) | MuxError::Unsupported => USAGE,
        MuxError::NoSuchLink | MuxError::NoSuchBinding(_) => FAILURE,
        MuxError::ResourceExhausted => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}
