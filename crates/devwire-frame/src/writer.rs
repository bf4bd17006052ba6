use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::encode_frame;
use crate::error::{ChannelError, Result};

/// Frame `payload` into `buf` and write it fully, then flush (blocking).
///
/// `buf` is scratch space reused across calls. Any failure from the stream
/// surfaces as [`ChannelError::Write`].
pub fn write_frame<W: Write>(writer: &mut W, buf: &mut BytesMut, payload: &[u8]) -> Result<()> {
    buf.clear();
    encode_frame(payload, buf)?;

    let mut offset = 0usize;
    while offset < buf.len() {
        match writer.write(&buf[offset..]) {
            Ok(0) => {
                return Err(ChannelError::Write(std::io::Error::from(
                    ErrorKind::WriteZero,
                )))
            }
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(ChannelError::Write(err)),
        }
    }

    loop {
        match writer.flush() {
            Ok(()) => break,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(ChannelError::Write(err)),
        }
    }

    trace!(len = payload.len(), "wrote frame");
    Ok(())
}
