use crate::error::{Result, ShopSocketError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Notification envelope pushed by the shop server
///
/// Wire shape: `{ "type": string, "data"?: any, "userId"?: string, "timestamp"?: string }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl InboundMessage {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: None,
            user_id: None,
            timestamp: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Parse a text frame into an envelope
    ///
    /// Anything that is not a JSON object carrying a string `type` is rejected.
    pub fn parse(text: &str) -> Result<Self> {
        // derived struct impls also accept a JSON array in field order
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(ShopSocketError::Parse(format!(
                "expected a JSON object, got {}",
                shape(&value)
            )));
        }
        Ok(serde_json::from_value(value)?)
    }
}

fn shape(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
