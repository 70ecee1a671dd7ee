use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;

/// A JSON-RPC request id kept as the exact bytes the client sent.
///
/// Ids may be numbers, strings or `null`. They are never decoded into a
/// native type, so `123456789012345678901234567890` or `1.0` come back
/// to the client exactly as written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Box<RawValue>);

impl RequestId {
    /// Build an id from raw JSON text, validating that it is a JSON value.
    pub fn from_json(raw: impl Into<String>) -> Result<Self, serde_json::Error> {
        RawValue::from_string(raw.into()).map(RequestId)
    }

    /// The raw JSON text of the id.
    pub fn as_raw(&self) -> &str {
        self.0.get()
    }

    pub fn is_null(&self) -> bool {
        self.as_raw() == "null"
    }
}

impl PartialEq for RequestId {
    fn eq(&self, other: &Self) -> bool {
        self.as_raw() == other.as_raw()
    }
}

impl Eq for RequestId {}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_raw())
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        // Integer text is always a valid JSON value.
        RequestId(RawValue::from_string(n.to_string()).unwrap_or_else(|_| null_raw()))
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        let raw = serde_json::to_string(s)
            .ok()
            .and_then(|text| RawValue::from_string(text).ok())
            .unwrap_or_else(null_raw);
        RequestId(raw)
    }
}

fn null_raw() -> Box<RawValue> {
    RawValue::NULL.to_owned()
}

/// Deserialize a field that is present in the input, keeping an explicit
/// `null` as `Some(null)`. Pair with `#[serde(default)]` so an absent field
/// stays `None`.
pub(crate) fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}
