use devwire_plist::PlistError;
use devwire_transport::TransportError;

/// Errors that can occur on a message channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The peer closed the stream before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,

    /// One streaming-mode frame could not be decoded; the stream continues.
    #[error("malformed frame ({len} bytes): {source}")]
    MalformedFrame { len: usize, source: PlistError },

    /// The declared payload length exceeds the configured maximum.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Writing to the stream failed; the channel must be recreated.
    #[error("write failed: {0}")]
    Write(std::io::Error),

    /// The channel was discarded after an earlier write failure.
    #[error("channel discarded after write failure")]
    Discarded,

    /// Reading from the stream failed.
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding an outbound value or decoding an exchange-mode reply failed.
    #[error("property list error: {0}")]
    Plist(#[from] PlistError),

    /// Opening the underlying service stream failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The device answered with an `Error` dictionary.
    #[error("device reported {error}: {}", .description.as_deref().unwrap_or("no description"))]
    Device {
        error: String,
        description: Option<String>,
    },
}

pub type Result<T> = std::result::Result<T, ChannelError>;
