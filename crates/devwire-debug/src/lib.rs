//! Remote-debug packet protocol.
//!
//! Packets are framed as `$<payload>#<cc>`, where `cc` is the payload's
//! character-code sum mod 256 in two lowercase hex digits.
//!
//! A [`DebugSession`] launches a process through the fixed handshake in
//! [`launch`], then fans every inbound chunk out to two independent
//! consumers:
//! - the [`SignalWatcher`], which terminates the host when a stop-reply
//!   reports the kill signal
//! - the [`OutputAdapter`], which turns `O` packets into console text
//!
//! Nothing is retried. Handshake packets are written once and not
//! acknowledged.

pub mod error;
pub mod launch;
pub mod output;
pub mod packet;
pub mod scanner;
pub mod session;
pub mod signal;
pub mod tee;

pub use error::{DebugError, Result};
pub use launch::HandshakeStep;
pub use output::OutputAdapter;
pub use packet::{checksum, checksum_utf16, Packet};
pub use scanner::{PacketScanner, RawPacket};
pub use session::{
    DebugConfig, DebugSession, SessionState, Termination, DEBUG_SERVICE, DEFAULT_READ_CHUNK,
};
pub use signal::{KillAction, ProcessExit, SignalWatcher, WatchOutcome, KILLED_EXIT_CODE};
pub use tee::{ChunkSink, Tee};
