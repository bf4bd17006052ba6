use tracing::{debug, warn};

use crate::error::Result;
use crate::scanner::{PacketScanner, RawPacket};
use crate::tee::ChunkSink;

/// Extracts console output from `O` packets.
///
/// A packet is console output when its payload starts with `O` and the
/// second byte is not `K` (which would make it an `OK` reply). The rest of
/// the payload is hex; the decoded bytes run through a UTF-8 decoder that
/// carries incomplete sequences over to the next packet.
#[derive(Debug, Default)]
pub struct OutputAdapter {
    scanner: PacketScanner,
    utf8: Utf8Stream,
    strict_checksums: bool,
    text: String,
}

impl OutputAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop packets whose checksum digits do not match.
    pub fn with_strict_checksums(mut self, strict: bool) -> Self {
        self.strict_checksums = strict;
        self
    }

    /// Scan `chunk` and return the console text it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> String {
        let mut text = String::new();
        for packet in self.scanner.feed(chunk) {
            if self.strict_checksums && !packet.checksum_matches() {
                warn!(
                    checksum = %String::from_utf8_lossy(&packet.checksum),
                    len = packet.payload.len(),
                    "dropping packet with bad checksum"
                );
                continue;
            }
            if let Some(bytes) = console_bytes(&packet) {
                self.utf8.decode(&bytes, &mut text);
            }
        }
        text
    }

    /// Flush bytes still held by the UTF-8 decoder as U+FFFD.
    pub fn finish(&mut self) -> String {
        let mut text = String::new();
        self.utf8.finish(&mut text);
        text
    }

    /// Text accumulated through the [`ChunkSink`] interface.
    pub fn take_text(&mut self) -> String {
        std::mem::take(&mut self.text)
    }
}

impl ChunkSink for OutputAdapter {
    fn accept(&mut self, chunk: &[u8]) -> Result<()> {
        let text = self.feed(chunk);
        self.text.push_str(&text);
        Ok(())
    }
}

fn console_bytes(packet: &RawPacket) -> Option<Vec<u8>> {
    let payload = &packet.payload;
    if payload.first() != Some(&b'O') || payload.get(1) == Some(&b'K') {
        return None;
    }
    let digits = &payload[1..];
    let mut bytes = Vec::with_capacity(digits.len() / 2);
    for pair in digits.chunks(2) {
        let mut byte = [0u8];
        if let Err(err) = hex::decode_to_slice(pair, &mut byte) {
            debug!(
                error = %err,
                kept = bytes.len(),
                digits = digits.len(),
                "O packet hex ends early, keeping decoded prefix"
            );
            break;
        }
        bytes.push(byte[0]);
    }
    Some(bytes)
}

/// UTF-8 decoder that keeps a partial multi-byte sequence between calls.
#[derive(Debug, Default)]
struct Utf8Stream {
    pending: Vec<u8>,
}

impl Utf8Stream {
    fn decode(&mut self, bytes: &[u8], out: &mut String) {
        self.pending.extend_from_slice(bytes);
        let mut consumed = 0;
        loop {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    consumed = self.pending.len();
                    break;
                }
                Err(err) => {
                    let valid_end = consumed + err.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&self.pending[consumed..valid_end]) {
                        out.push_str(valid);
                    }
                    match err.error_len() {
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            consumed = valid_end + invalid;
                        }
                        None => {
                            consumed = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..consumed);
    }

    fn finish(&mut self, out: &mut String) {
        if !self.pending.is_empty() {
            out.push(char::REPLACEMENT_CHARACTER);
            self.pending.clear();
        }
    }
}
