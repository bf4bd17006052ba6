use devwire_plist::{Dictionary, Value};

use crate::error::ChannelError;

pub(crate) const STATUS: &str = "Status";
pub(crate) const COMPLETE: &str = "Complete";
pub(crate) const PERCENT_COMPLETE: &str = "PercentComplete";
pub(crate) const ERROR: &str = "Error";
pub(crate) const ERROR_DESCRIPTION: &str = "ErrorDescription";

/// True iff `value` is a dictionary with a `Status` field, a `Complete`
/// field equal to `true`, and no `PercentComplete` field.
///
/// A device may send `Complete = true` together with a percentage while a
/// step is still running; only the message without a percentage ends the
/// sequence.
pub fn is_complete(value: &Value) -> bool {
    let Some(dict) = value.as_dictionary() else {
        return false;
    };
    dict.contains_key(STATUS)
        && dict.get(COMPLETE).and_then(Value::as_boolean) == Some(true)
        && !dict.contains_key(PERCENT_COMPLETE)
}

/// The error a status dictionary reports through its `Error` field.
pub fn device_error(dict: &Dictionary) -> Option<ChannelError> {
    let error = dict.get(ERROR)?;
    let error = match error.as_text() {
        Some(text) => text.to_string(),
        None => error.kind().to_string(),
    };
    let description = dict
        .get(ERROR_DESCRIPTION)
        .and_then(Value::as_text)
        .map(str::to_string);
    Some(ChannelError::Device { error, description })
}

/// One status update from a progress sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// The `Status` text, or empty when the device omitted it.
    pub status: String,
    pub percent: Option<i64>,
}

impl Progress {
    pub fn from_dictionary(dict: &Dictionary) -> Self {
        Self {
            status: dict
                .get(STATUS)
                .and_then(Value::as_text)
                .unwrap_or_default()
                .to_string(),
            percent: dict.get(PERCENT_COMPLETE).and_then(Value::as_integer),
        }
    }
}
