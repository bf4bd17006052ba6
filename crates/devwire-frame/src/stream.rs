use bytes::{Buf, BytesMut};
use devwire_plist::{Format, Value};
use tracing::{trace, warn};

use crate::codec::HEADER_SIZE;
use crate::error::ChannelError;

/// Position of the streaming parser within the frame sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Waiting for the 4-byte length prefix.
    AwaitingLength,
    /// Waiting for this many payload bytes.
    AwaitingPayload(usize),
    /// Dropping the payload of an oversized frame; this many bytes remain.
    Skipping(usize),
}

/// Outcome of one completed frame.
#[derive(Debug)]
pub enum StreamEvent {
    Message(Value),
    /// The frame was dropped; the parser resumes at the next frame boundary.
    Malformed(ChannelError),
}

/// The frame state machine, independent of who owns the buffer.
#[derive(Debug, Clone)]
pub(crate) struct FrameMachine {
    state: ChannelState,
    format: Format,
    max_payload_size: usize,
}

impl FrameMachine {
    pub(crate) fn new(format: Format, max_payload_size: usize) -> Self {
        Self {
            state: ChannelState::AwaitingLength,
            format,
            max_payload_size,
        }
    }

    pub(crate) fn state(&self) -> ChannelState {
        self.state
    }

    /// Advance over `buf`, returning the next completed frame's event.
    ///
    /// Returns `None` once `buf` holds too few bytes for the current state.
    pub(crate) fn next_event(&mut self, buf: &mut BytesMut) -> Option<StreamEvent> {
        loop {
            match self.state {
                ChannelState::AwaitingLength => {
                    if buf.len() < HEADER_SIZE {
                        return None;
                    }
                    let len = buf.get_u32() as usize;
                    if len > self.max_payload_size {
                        warn!(
                            len,
                            max = self.max_payload_size,
                            "dropping oversized frame"
                        );
                        self.state = ChannelState::Skipping(len);
                        return Some(StreamEvent::Malformed(ChannelError::PayloadTooLarge {
                            size: len,
                            max: self.max_payload_size,
                        }));
                    }
                    self.state = ChannelState::AwaitingPayload(len);
                }
                ChannelState::AwaitingPayload(len) => {
                    if buf.len() < len {
                        return None;
                    }
                    let payload = buf.split_to(len).freeze();
                    self.state = ChannelState::AwaitingLength;
                    trace!(len, "frame complete");
                    return Some(match devwire_plist::decode(&payload, self.format) {
                        Ok(value) => StreamEvent::Message(value),
                        Err(source) => {
                            warn!(
                                len,
                                format = %self.format,
                                error = %source,
                                "skipping malformed frame"
                            );
                            StreamEvent::Malformed(ChannelError::MalformedFrame { len, source })
                        }
                    });
                }
                ChannelState::Skipping(remaining) => {
                    if buf.is_empty() {
                        return None;
                    }
                    let n = remaining.min(buf.len());
                    buf.advance(n);
                    self.state = match remaining - n {
                        0 => ChannelState::AwaitingLength,
                        left => ChannelState::Skipping(left),
                    };
                }
            }
        }
    }
}

/// Streaming-mode parser: accepts arbitrarily chunked input and yields
/// messages in arrival order.
///
/// The decoder owns its accumulation buffer. It is not `Sync`-safe to share
/// between threads; feed it from one reader.
#[derive(Debug)]
pub struct StreamDecoder {
    machine: FrameMachine,
    buf: BytesMut,
}

impl StreamDecoder {
    pub fn new(format: Format, max_payload_size: usize) -> Self {
        Self {
            machine: FrameMachine::new(format, max_payload_size),
            buf: BytesMut::new(),
        }
    }

    /// Append `chunk` and drain every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(event) = self.machine.next_event(&mut self.buf) {
            events.push(event);
        }
        events
    }

    /// Current parser state.
    pub fn state(&self) -> ChannelState {
        self.machine.state()
    }

    /// Bytes received but not yet part of a completed frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
