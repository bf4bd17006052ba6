use bytes::BytesMut;
use devwire_plist::{Format, Value};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_frame, ChannelConfig};
use crate::error::ChannelError;
use crate::stream::{ChannelState, FrameMachine, StreamEvent};

/// `tokio_util` codec for property-list frames.
///
/// Decoding follows the streaming read strategy: a frame that fails to
/// decode is logged and skipped, and an oversized frame is drained without
/// being buffered.
#[derive(Debug, Clone)]
pub struct PlistCodec {
    machine: FrameMachine,
    format: Format,
    max_payload_size: usize,
}

impl PlistCodec {
    pub fn new(format: Format) -> Self {
        Self::with_config(&ChannelConfig::default().with_format(format))
    }

    pub fn with_config(config: &ChannelConfig) -> Self {
        Self {
            machine: FrameMachine::new(config.format, config.max_payload_size),
            format: config.format,
            max_payload_size: config.max_payload_size,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.machine.state()
    }
}

impl Decoder for PlistCodec {
    type Item = Value;
    type Error = ChannelError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Value>, ChannelError> {
        loop {
            match self.machine.next_event(src) {
                None => return Ok(None),
                Some(StreamEvent::Message(value)) => return Ok(Some(value)),
                Some(StreamEvent::Malformed(_)) => continue,
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Value>, ChannelError> {
        if let Some(value) = self.decode(src)? {
            return Ok(Some(value));
        }
        if src.is_empty() && self.machine.state() == ChannelState::AwaitingLength {
            Ok(None)
        } else {
            Err(ChannelError::ConnectionClosed)
        }
    }
}

impl Encoder<Value> for PlistCodec {
    type Error = ChannelError;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<(), ChannelError> {
        let payload = devwire_plist::encode(&item, self.format)?;
        if payload.len() > self.max_payload_size {
            return Err(ChannelError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload_size,
            });
        }
        encode_frame(&payload, dst)
    }
}
