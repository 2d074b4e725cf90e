//! JSON-RPC request envelope.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine, engine::general_purpose::STANDARD};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single RPC call as sent to the device.
///
/// Serialized as `{"method", "requestTimeMils", "terminal_uuid"?, "params"?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub method: String,
    #[serde(rename = "requestTimeMils")]
    pub request_time_millis: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestEnvelope {
    /// Creates an envelope stamped with the current time.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            request_time_millis: now_millis(),
            terminal_uuid: None,
            params: None,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_terminal_uuid(mut self, terminal_uuid: impl Into<String>) -> Self {
        self.terminal_uuid = Some(terminal_uuid.into());
        self
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A fresh client instance id: `base64(MD5(uuid_v4))`.
pub fn generate_terminal_uuid() -> String {
    let id = uuid::Uuid::new_v4();
    STANDARD.encode(Md5::digest(id.as_bytes()))
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
