use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One decoded request from the input stream.
///
/// Only `action` is required; every other field is consumed by the handler
/// the action resolves to. Unrecognized fields are ignored so newer clients
/// can talk to older sessions.
#[derive(Debug, Clone, Deserialize)]
pub struct Command {
    pub action: String,

    pub url: Option<String>,
    pub selector: Option<String>,
    pub value: Option<String>,
    pub path: Option<String>,
    pub js: Option<String>,
    pub key: Option<String>,

    /// Per-command timeout in milliseconds
    pub timeout: Option<u64>,

    /// Fixed wait duration in milliseconds (for `wait`)
    pub ms: Option<u64>,

    #[serde(rename = "maxLength")]
    pub max_length: Option<usize>,

    #[serde(rename = "fullPage")]
    pub full_page: Option<bool>,
}

/// The structured response emitted for one command, one JSON object per line.
///
/// `error` is present exactly when `success` is false. `duration` is stamped
/// by the I/O loop with the wall-clock milliseconds spent handling the line.
#[derive(Debug, Serialize)]
pub struct Outcome {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub duration: u64,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Outcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            duration: 0,
            fields: Map::new(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            duration: 0,
            fields: Map::new(),
        }
    }

    /// Attach an action-specific output field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}
