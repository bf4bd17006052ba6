//! Length-prefixed property-list messages over a device stream.
//!
//! Every message is one frame:
//! - a 4-byte big-endian payload length
//! - the payload: one property list in the channel's [`Format`]
//!
//! [`MessageChannel`] turns a duplex stream into discrete [`Value`]s. How it
//! reads is picked by [`ReadStrategy`]:
//! - `Exchange`: each receive blocks until exactly one frame has arrived
//! - `Streaming`: inbound chunks of any size feed a [`StreamDecoder`]; one
//!   chunk may complete zero, one or many messages, and a frame that fails
//!   to decode is logged and skipped
//!
//! [`is_complete`] implements the status-dictionary contract used to detect
//! the end of a progress sequence.

pub mod channel;
pub mod codec;
pub mod completion;
pub mod error;
pub mod reader;
pub mod stream;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

pub use channel::{CloseHandle, MessageChannel};
pub use codec::{
    decode_frame, encode_frame, ChannelConfig, ReadStrategy, DEFAULT_MAX_PAYLOAD,
    DEFAULT_READ_CHUNK, HEADER_SIZE,
};
pub use completion::{device_error, is_complete, Progress};
pub use error::{ChannelError, Result};
pub use stream::{ChannelState, StreamDecoder, StreamEvent};

pub use devwire_plist::{Dictionary, Format, Value};

#[cfg(feature = "async")]
pub use async_codec::PlistCodec;
