use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Kind of message source the ingestion pipeline is deployed against.
///
/// Chosen once at process start; every record delivered to a process shares
/// the same envelope format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Sharded streaming log: records carry a base64 payload and an arrival timestamp
    Stream,
    /// Message queue: records carry the payload as plain text
    Queue,
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stream" | "kinesis" => Ok(SourceKind::Stream),
            "queue" | "sqs" => Ok(SourceKind::Queue),
            other => Err(format!(
                "unknown source kind '{}' (expected 'stream' or 'queue')",
                other
            )),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Stream => write!(f, "stream"),
            SourceKind::Queue => write!(f, "queue"),
        }
    }
}

/// Envelope of a record delivered by a sharded stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    #[serde(alias = "kinesis")]
    pub stream: StreamRecordData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRecordData {
    /// Base64-encoded JSON payload
    pub data: String,
    /// Arrival time in fractional seconds since the Unix epoch
    pub approximate_arrival_timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<String>,
}

/// Envelope of a record delivered by a queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// JSON payload as plain text
    pub body: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}
