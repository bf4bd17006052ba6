use crate::Format;

/// Errors produced by the property-list codec.
#[derive(Debug, thiserror::Error)]
pub enum PlistError {
    /// The value (or a value nested in it) cannot be serialized.
    #[error("cannot encode {kind} values")]
    UnsupportedValue { kind: &'static str },

    /// The `plist` reader or writer rejected the document.
    #[error("malformed {format} property list: {source}")]
    Codec {
        format: Format,
        #[source]
        source: plist::Error,
    },

    /// The document parsed but does not describe a supported value tree.
    #[error("malformed {format} property list: {reason}")]
    Format { format: Format, reason: String },
}

impl PlistError {
    pub(crate) fn format(format: Format, reason: impl Into<String>) -> Self {
        PlistError::Format {
            format,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlistError>;
