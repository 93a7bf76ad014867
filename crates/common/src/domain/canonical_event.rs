use std::fmt;

/// Entity identifier taken from a payload field.
///
/// Text and numeric identifiers are distinct keys, so `1` and `"1"` never collapse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Text(String),
    /// Canonical JSON rendering of the number
    Number(String),
}

impl DedupKey {
    pub fn text(key: impl Into<String>) -> Self {
        DedupKey::Text(key.into())
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupKey::Text(key) => write!(f, "{:?}", key),
            DedupKey::Number(key) => write!(f, "{}", key),
        }
    }
}

/// Source-agnostic representation of one ingested telemetry message
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalEvent {
    /// Value of the entity identifier field, used to collapse duplicates within a batch
    pub dedup_key: DedupKey,
    /// Destination columns in payload order
    pub fields: serde_json::Map<String, serde_json::Value>,
    /// Wall-clock capture taken once per invocation, shared by the whole batch
    pub ingestion_timestamp: String,
    /// Arrival time at the source; only stream records carry one
    pub source_timestamp: Option<String>,
}
