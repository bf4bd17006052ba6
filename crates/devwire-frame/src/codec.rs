use bytes::{Buf, BufMut, Bytes, BytesMut};
use devwire_plist::Format;

use crate::error::{ChannelError, Result};

/// Frame header: big-endian payload length (4).
pub const HEADER_SIZE: usize = 4;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Default size of a single stream read.
pub const DEFAULT_READ_CHUNK: usize = 8 * 1024;

/// How a channel turns inbound bytes into messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadStrategy {
    /// Block until one complete frame is read; one reply per call.
    #[default]
    Exchange,
    /// Feed each inbound chunk through the streaming state machine.
    Streaming,
}

/// Configuration for a message channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Property-list encoding used for every frame on this channel.
    pub format: Format,
    /// Receive behaviour.
    pub read_strategy: ReadStrategy,
    /// Largest declared payload length accepted before allocating. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Bytes requested per read from the stream. Default: 8 KiB.
    pub read_chunk_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            format: Format::Xml,
            read_strategy: ReadStrategy::Exchange,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_chunk_size: DEFAULT_READ_CHUNK,
        }
    }
}

impl ChannelConfig {
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn with_read_strategy(mut self, read_strategy: ReadStrategy) -> Self {
        self.read_strategy = read_strategy;
        self
    }
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────────────────┐
/// │ Length       │ Payload                  │
/// │ (4B BE)      │ (Length bytes, plist)    │
/// └──────────────┴──────────────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(ChannelError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Decode one frame payload from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let payload_len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
    if payload_len > max_payload {
        return Err(ChannelError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(payload_len).freeze()))
}
