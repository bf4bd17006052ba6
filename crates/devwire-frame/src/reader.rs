use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::codec::HEADER_SIZE;
use crate::error::{ChannelError, Result};

/// Read exactly one frame payload (blocking).
///
/// The header is accumulated across partial reads; the payload buffer grows
/// by at most `chunk_size` per read, so a declared length is never allocated
/// up front. Returns `Err(ChannelError::ConnectionClosed)` when the stream
/// ends before the frame is complete.
pub fn read_frame<R: Read>(reader: &mut R, max_payload: usize, chunk_size: usize) -> Result<Bytes> {
    let mut header = [0u8; HEADER_SIZE];
    fill(reader, &mut header)?;

    let len = u32::from_be_bytes(header) as usize;
    if len > max_payload {
        return Err(ChannelError::PayloadTooLarge {
            size: len,
            max: max_payload,
        });
    }

    let chunk_size = chunk_size.max(1);
    let mut payload = BytesMut::with_capacity(len.min(chunk_size));
    while payload.len() < len {
        let start = payload.len();
        let want = (len - start).min(chunk_size);
        payload.resize(start + want, 0);
        match reader.read(&mut payload[start..]) {
            Ok(0) => return Err(ChannelError::ConnectionClosed),
            Ok(n) => payload.truncate(start + n),
            Err(err) if err.kind() == ErrorKind::Interrupted => payload.truncate(start),
            Err(err) => return Err(ChannelError::Io(err)),
        }
    }

    trace!(len, "read frame");
    Ok(payload.freeze())
}

fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Err(ChannelError::ConnectionClosed),
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(ChannelError::Io(err)),
        }
    }
    Ok(())
}
