use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::types::{RequestId, deserialize_present};

/// A JSON-RPC request as received by the server.
///
/// `params` and `id` stay as raw JSON so nothing is lost between the wire
/// and the capability. The version tag is carried as-is and not validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(rename = "jsonrpc", default)]
    pub version: String,
    #[serde(default)]
    pub method: String,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub params: Option<Box<RawValue>>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<RequestId>,
}

impl JsonRpcRequest {
    pub fn new(
        id: Option<RequestId>,
        method: impl Into<String>,
        params: Option<Box<RawValue>>,
    ) -> Self {
        Self {
            version: crate::JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id,
        }
    }

    /// Create a new request with no parameters
    pub fn new_no_params(id: RequestId, method: impl Into<String>) -> Self {
        Self::new(Some(id), method, None)
    }

    /// Create a request whose params are the given JSON text
    pub fn with_raw_params(
        id: RequestId,
        method: impl Into<String>,
        params: &str,
    ) -> Result<Self, serde_json::Error> {
        let params = RawValue::from_string(params.to_string())?;
        Ok(Self::new(Some(id), method, Some(params)))
    }

    /// A request without an id
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    pub fn params(&self) -> Option<&RawValue> {
        self.params.as_deref()
    }
}
