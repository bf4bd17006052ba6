//! Property-list codec for device service messages.
//!
//! Device services speak property lists in one of two encodings, fixed per
//! connection:
//! - [`Format::Xml`]: the textual Apple PLIST 1.0 document
//! - [`Format::Binary`]: the `bplist00` container (object table, offset
//!   table, trailer)
//!
//! Both encodings are read and written by the `plist` crate; this crate maps
//! its object model onto [`Value`], whose dictionaries keep insertion order.
//! [`encode`] accepts the values this crate produces on the wire (text,
//! blobs and dictionaries of those). [`decode`] understands the wider set
//! devices send back, including booleans, integers and arrays.

mod bridge;
pub mod error;
pub mod value;

use std::fmt;
use std::io::Cursor;

use plist::stream::{BinaryReader, XmlReader};

pub use bridge::MAX_VALUES_PER_BYTE;
pub use error::{PlistError, Result};
pub use value::{Dictionary, Value};

/// Maximum container nesting accepted by the decoders.
pub const MAX_DEPTH: usize = 512;

/// Leading bytes of every binary property list.
pub const BINARY_MAGIC: &[u8] = b"bplist";

/// Property-list encoding used on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Xml,
    Binary,
}

impl Format {
    /// Guess the format of a serialized document from its leading bytes.
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(BINARY_MAGIC) {
            Format::Binary
        } else {
            Format::Xml
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Xml => f.write_str("xml"),
            Format::Binary => f.write_str("binary"),
        }
    }
}

/// Serialize `value` in the requested format.
pub fn encode(value: &Value, format: Format) -> Result<Vec<u8>> {
    let tree = bridge::to_plist(value)?;
    let mut out = Vec::new();
    let written = match format {
        Format::Xml => tree.to_writer_xml(&mut out),
        Format::Binary => tree.to_writer_binary(&mut out),
    };
    written.map_err(|source| PlistError::Codec { format, source })?;
    Ok(out)
}

/// Parse a serialized property list.
///
/// Decoding stops with an error once the document has produced more than
/// [`MAX_VALUES_PER_BYTE`] values per input byte.
pub fn decode(bytes: &[u8], format: Format) -> Result<Value> {
    let budget = bytes
        .len()
        .saturating_mul(MAX_VALUES_PER_BYTE)
        .saturating_add(16);
    let decoded = match format {
        Format::Xml => bridge::from_events(XmlReader::new(Cursor::new(bytes)), format, budget),
        Format::Binary => {
            bridge::from_events(BinaryReader::new(Cursor::new(bytes)), format, budget)
        }
    };
    if let Err(err) = &decoded {
        tracing::trace!(%format, len = bytes.len(), error = %err, "property list rejected");
    }
    decoded
}
