//! Common data types used across the data_capture subsystem.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One protocol layer of a dissected frame, as exposed by a capture provider.
///
/// Field values are kept as the provider reported them (strings); the frame
/// parser decides which of them it needs and how to interpret them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Lower-case layer name, e.g. `eth`, `ip`, `ipv6`, `tcp`, `udp`, `dns`.
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Layer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// A link-layer unit observed by a capture provider.
///
/// Layers are ordered from the outermost (link) to the innermost protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Acquisition timestamp reported by the provider.
    pub sniff_time: Option<DateTime<Utc>>,
    /// Frame length in bytes, as reported by the provider.
    pub length: Option<String>,
    #[serde(default)]
    pub layers: Vec<Layer>,
}

impl Frame {
    pub fn new(sniff_time: DateTime<Utc>, length: usize) -> Self {
        Self {
            sniff_time: Some(sniff_time),
            length: Some(length.to_string()),
            layers: Vec::new(),
        }
    }

    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name.eq_ignore_ascii_case(name))
    }

    /// Value of `field` in the first layer named `layer`, if both exist.
    pub fn field(&self, layer: &str, field: &str) -> Option<&str> {
        self.layer(layer).and_then(|l| l.field(field))
    }

    /// Name of the innermost layer the provider identified.
    pub fn highest_layer(&self) -> Option<&str> {
        self.layers
            .last()
            .map(|l| l.name.as_str())
            .filter(|n| !n.is_empty())
    }
}

/// Structured representation of one successfully parsed frame.
///
/// Field order matches the column order of the persisted CSV artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Seconds since the session's first successfully parsed frame.
    pub relative_time: f64,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub protocol: String,
    pub length: u64,
    pub source_port: Option<u16>,
    pub destination_port: Option<u16>,
    /// Reserved for downstream classification; always `0` at capture time.
    pub label: u8,
}

impl Record {
    pub const FIELD_NAMES: [&'static str; 8] = [
        "relative_time",
        "source",
        "destination",
        "protocol",
        "length",
        "source_port",
        "destination_port",
        "label",
    ];
}

/// Message delivered to live subscribers for every published record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEvent {
    pub session_id: Uuid,
    #[serde(flatten)]
    pub record: Record,
}
