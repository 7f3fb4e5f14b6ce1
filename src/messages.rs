//! Wire envelope and payload types for the NLS streaming protocol.
//!
//! Every server frame is one JSON document:
//!
//! ```json
//! { "header": { "name": "SentenceEnd", "task_id": "...", "status": 20000000 },
//!   "payload": { "index": 1, "result": "..." } }
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

// ============================================================================
// Envelope
// ============================================================================

/// Why a frame could not become an [`EventDocument`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Not a JSON object.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    /// JSON object without a string `header.name`.
    #[error("missing event name")]
    MissingName,
}

/// Read-only view over one parsed server frame.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDocument {
    name: String,
    task_id: Option<String>,
    header: Map<String, Value>,
    payload: Map<String, Value>,
}

impl EventDocument {
    /// Parses a text frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
        let Value::Object(mut root) = value else {
            return Err(FrameError::InvalidJson("frame is not an object".to_string()));
        };

        let header = match root.remove("header") {
            Some(Value::Object(header)) => header,
            _ => return Err(FrameError::MissingName),
        };
        let name = match header.get("name") {
            Some(Value::String(name)) => name.clone(),
            _ => return Err(FrameError::MissingName),
        };
        let task_id = header
            .get("task_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let payload = match root.remove("payload") {
            Some(Value::Object(payload)) => payload,
            _ => Map::new(),
        };

        Ok(Self {
            name,
            task_id,
            header,
            payload,
        })
    }

    /// Event name from the header.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Correlation id, absent on some dialogue frames.
    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    /// Server status code, read from the header, then the payload.
    pub fn status(&self) -> Option<i64> {
        self.lookup("status").and_then(Value::as_i64)
    }

    /// Server status text, read from the header, then the payload.
    pub fn status_text(&self) -> Option<&str> {
        self.lookup("status_text").and_then(Value::as_str)
    }

    pub fn header(&self) -> &Map<String, Value> {
        &self.header
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Deserializes the payload into a typed view.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.payload.clone()))
    }

    fn lookup(&self, key: &str) -> Option<&Value> {
        self.header.get(key).or_else(|| self.payload.get(key))
    }
}

// ============================================================================
// Transcription payloads
// ============================================================================

/// One word of a sentence result. Only present when word output is enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    pub text: String,
    /// Start offset inside the sentence, in milliseconds.
    pub start_time: i64,
    /// End offset inside the sentence, in milliseconds.
    pub end_time: i64,
}

/// Payload of sentence and result-changed events.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SentencePayload {
    /// Sentence index, starting at 1.
    #[serde(default)]
    pub index: Option<i64>,
    /// Audio processed so far, in milliseconds.
    #[serde(default)]
    pub time: Option<i64>,
    /// Start of the sentence, in milliseconds.
    #[serde(default)]
    pub begin_time: Option<i64>,
    #[serde(default)]
    pub result: Option<String>,
    /// Between 0.0 and 1.0.
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default, deserialize_with = "inline_or_encoded")]
    pub words: Option<Vec<Word>>,
}

// ============================================================================
// Dialogue payloads
// ============================================================================

/// Payload of `DialogResultGenerated`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DialogueResultPayload {
    /// Whether the wake word was accepted.
    #[serde(default)]
    pub accepted: Option<bool>,
    #[serde(default)]
    pub confidence: f64,
    /// Recognized speech.
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub action_context: Option<String>,
    #[serde(default)]
    pub display_text: Option<String>,
    #[serde(default)]
    pub spoken_text: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default, deserialize_with = "inline_or_encoded")]
    pub action_params: Option<Vec<Value>>,
}

/// Accepts either an inline JSON value or the same value encoded as a string.
fn inline_or_encoded<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(encoded)) => serde_json::from_str(&encoded)
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(inline) => serde_json::from_value(inline)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
