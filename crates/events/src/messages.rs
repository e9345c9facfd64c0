use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Why a frame was kept as raw bytes instead of decoded JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawFormat {
    /// Plain payload that was not UTF-8 JSON.
    #[serde(rename = "hex")]
    Hex,
    /// Gzip payload that inflated fine but was not UTF-8 JSON.
    #[serde(rename = "hex (gzip)")]
    HexGzip,
    /// Payload with a gzip header that failed to inflate.
    #[serde(rename = "hex (error)")]
    HexError,
}

impl fmt::Display for RawFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RawFormat::Hex => "hex",
            RawFormat::HexGzip => "hex (gzip)",
            RawFormat::HexError => "hex (error)",
        };
        f.write_str(label)
    }
}

/// The decoded content of one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordBody {
    /// A JSON object decoded from the frame.
    Decoded(Value),
    /// The frame's original bytes, hex encoded.
    Raw { hex: String, format: RawFormat },
}

/// One record accumulated from the position-update topic.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestRecord {
    pub received_at: DateTime<Utc>,
    pub body: RecordBody,
}

impl IngestRecord {
    pub fn new(received_at: DateTime<Utc>, body: RecordBody) -> Self {
        Self { received_at, body }
    }

    /// The decoded JSON object, or `None` for a raw fallback record.
    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            RecordBody::Decoded(value) => Some(value),
            RecordBody::Raw { .. } => None,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self.body, RecordBody::Raw { .. })
    }

    /// Flattens the record into one JSON object tagged with `receivedAt`.
    pub fn to_json(&self) -> Value {
        let received_at = Value::String(self.received_at.to_rfc3339());
        match &self.body {
            RecordBody::Decoded(Value::Object(map)) => {
                let mut map = map.clone();
                map.insert("receivedAt".to_string(), received_at);
                Value::Object(map)
            }
            RecordBody::Decoded(other) => {
                let mut map = Map::new();
                map.insert("receivedAt".to_string(), received_at);
                map.insert("data".to_string(), other.clone());
                Value::Object(map)
            }
            RecordBody::Raw { hex, format } => {
                let mut map = Map::new();
                map.insert("receivedAt".to_string(), received_at);
                map.insert("format".to_string(), Value::String(format.to_string()));
                map.insert("hex".to_string(), Value::String(hex.clone()));
                Value::Object(map)
            }
        }
    }
}
