use std::fmt;
use std::io;

use devwire_debug::DebugError;
use devwire_frame::ChannelError;
use devwire_plist::PlistError;
use devwire_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
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

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Connect { ref source, .. }
            if source.kind() == io::ErrorKind::PermissionDenied =>
        {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        TransportError::Connect { .. } | TransportError::PathTooLong { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        TransportError::InvalidName { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        TransportError::Bind { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
    }
}

pub fn plist_error(context: &str, err: PlistError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    match err {
        ChannelError::Io(source) | ChannelError::Write(source) => io_error(context, source),
        ChannelError::Transport(err) => transport_error(context, err),
        ChannelError::Plist(err) => plist_error(context, err),
        ChannelError::MalformedFrame { .. } | ChannelError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        ChannelError::ConnectionClosed
        | ChannelError::Discarded
        | ChannelError::Device { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn debug_error(context: &str, err: DebugError) -> CliError {
    match err {
        DebugError::Transport(err) => transport_error(context, err),
        DebugError::Io(source) | DebugError::Write(source) => io_error(context, source),
        DebugError::Console(source) => io_error(context, source),
        DebugError::InvalidCharacter { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        DebugError::InvalidState { .. } => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}
