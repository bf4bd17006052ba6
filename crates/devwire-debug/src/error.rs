use devwire_transport::TransportError;

use crate::session::SessionState;

/// Errors that can occur in a remote-debug session.
#[derive(Debug, thiserror::Error)]
pub enum DebugError {
    /// A packet payload contains a character outside the checksummable range.
    #[error("invalid packet character U+{code:04X} at position {position}")]
    InvalidCharacter { position: usize, code: u32 },

    /// The operation is not allowed in the session's current state.
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// Writing to the debug stream failed.
    #[error("write failed: {0}")]
    Write(std::io::Error),

    /// Reading from the debug stream failed.
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    /// Writing decoded console output failed.
    #[error("console output failed: {0}")]
    Console(std::io::Error),

    /// Opening the debug service failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, DebugError>;
