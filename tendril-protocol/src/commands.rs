//! Remote commands
//!
//! Command names and the typed bodies of their requests and responses.

use alloc::string::String;
use alloc::vec::Vec;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Document;

pub const RESTART: &str = "restart";
pub const SLEEP: &str = "sleep";
pub const STORAGE_LIST: &str = "storage/list";
pub const STORAGE_READ: &str = "storage/read";
pub const STORAGE_WRITE: &str = "storage/write";
pub const STORAGE_REMOVE: &str = "storage/remove";
pub const UPDATE: &str = "update";
pub const PING: &str = "ping";
pub const FUNCTION_CONFIG: &str = "functions/config";

pub const KEY_NOT_FOUND: &str = "Key not found";
pub const REMOVE_FAILED: &str = "Key not found or could not be removed";
pub const WRITE_FAILED: &str = "Could not write key";
pub const NO_URL: &str = "Command contains no URL";
pub const EMPTY_URL: &str = "Command contains empty url";
pub const UNKNOWN_COMMAND: &str = "Unknown command";
pub const INVALID_REQUEST: &str = "Invalid request";

/// Parse a request document into its typed body
pub fn parse_request<T: DeserializeOwned>(request: &Document) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::Object(request.clone()))
}

/// `sleep` request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SleepRequest {
    /// Seconds to sleep; absent means until an external wakeup
    #[serde(default)]
    pub duration: Option<u64>,
}

/// `storage/read` and `storage/remove` request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeyRequest {
    pub key: String,
}

/// `storage/write` request
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WriteRequest {
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

/// `update` request
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    url: Option<Value>,
}

impl UpdateRequest {
    /// The requested URL, when it is given as a string
    pub fn url(&self) -> Option<&str> {
        self.url.as_ref().and_then(Value::as_str)
    }
}

/// `functions/config` request
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionConfigRequest {
    /// Function to reconfigure
    pub name: String,
    #[serde(default)]
    pub config: Document,
}

/// One entry of a `storage/list` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListEntry {
    pub key: String,
}

/// `storage/list` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListResponse {
    pub entries: Vec<ListEntry>,
}

/// `storage/read` response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadResponse {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

/// `storage/write` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteResponse {
    pub key: String,
    pub written: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

/// `storage/remove` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoveResponse {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

/// `update` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<&'static str>,
}

impl UpdateResponse {
    pub fn succeeded() -> Self {
        Self {
            success: Some(true),
            failure: None,
        }
    }

    pub fn failed(reason: &'static str) -> Self {
        Self {
            success: None,
            failure: Some(reason),
        }
    }
}

/// `functions/config` response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionConfigResponse {
    pub name: String,
    /// Configuration now in effect and stored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

/// `ping` response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PongResponse {
    /// Milliseconds since boot
    pub pong: u64,
}

/// Response to a command that could not be handled
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
}
