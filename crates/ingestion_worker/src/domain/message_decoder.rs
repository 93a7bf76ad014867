use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Local, TimeZone};
use common::domain::{
    CanonicalEvent, DedupKey, DomainError, DomainResult, QueueRecord, SourceKind, StreamRecord,
};
use serde_json::{Map, Value};
use std::fmt::Display;
use tracing::debug;

/// Arrival time of stream records, microsecond precision
pub const SOURCE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Invocation-wide capture, millisecond precision
pub const INGESTION_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub source_kind: SourceKind,
    /// Payload field identifying the entity, e.g. `vehicle_id`
    pub dedup_key_field: String,
}

/// Normalizes raw source records into canonical events
#[derive(Debug, Clone)]
pub struct MessageDecoder {
    config: DecoderConfig,
}

impl MessageDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    pub fn source_kind(&self) -> SourceKind {
        self.config.source_kind
    }

    /// Decode one raw record; arrival times are rendered in local time
    pub fn decode(&self, raw: &[u8], ingestion_timestamp: &str) -> DomainResult<CanonicalEvent> {
        self.decode_in(raw, ingestion_timestamp, &Local)
    }

    /// Decode one raw record, rendering arrival times in `tz`
    pub fn decode_in<Tz>(
        &self,
        raw: &[u8],
        ingestion_timestamp: &str,
        tz: &Tz,
    ) -> DomainResult<CanonicalEvent>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        debug!(
            source_kind = %self.config.source_kind,
            raw = %String::from_utf8_lossy(raw),
            "decoding raw record"
        );

        let (payload, source_timestamp) = match self.config.source_kind {
            SourceKind::Stream => {
                let record: StreamRecord =
                    serde_json::from_slice(raw).map_err(|e| self.invalid_envelope(e))?;
                let payload = STANDARD.decode(record.stream.data.trim()).map_err(|e| {
                    DomainError::InvalidPayload(format!("payload is not valid base64: {}", e))
                })?;
                let arrival =
                    format_arrival_timestamp(record.stream.approximate_arrival_timestamp, tz)?;
                (payload, Some(arrival))
            }
            SourceKind::Queue => {
                let record: QueueRecord =
                    serde_json::from_slice(raw).map_err(|e| self.invalid_envelope(e))?;
                (record.body.into_bytes(), None)
            }
        };

        let fields = parse_payload(&payload)?;
        let dedup_key = extract_dedup_key(&fields, &self.config.dedup_key_field)?;

        debug!(dedup_key = %dedup_key, fields = ?fields, "decoded payload");

        Ok(CanonicalEvent {
            dedup_key,
            fields,
            ingestion_timestamp: ingestion_timestamp.to_string(),
            source_timestamp,
        })
    }

    fn invalid_envelope(&self, err: serde_json::Error) -> DomainError {
        DomainError::InvalidEnvelope {
            source_kind: self.config.source_kind,
            reason: err.to_string(),
        }
    }
}

/// Render the invocation-wide ingestion capture
pub fn format_ingestion_timestamp<Tz>(captured_at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    captured_at.format(INGESTION_TIMESTAMP_FORMAT).to_string()
}

/// Render fractional epoch seconds, rounded to the microsecond.
///
/// Only the fractional part is scaled, since whole epoch values times 1e6 leave
/// too few mantissa bits for sub-microsecond rounding.
pub fn format_arrival_timestamp<Tz>(epoch_seconds: f64, tz: &Tz) -> DomainResult<String>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let invalid = || DomainError::InvalidEnvelope {
        source_kind: SourceKind::Stream,
        reason: format!("invalid arrival timestamp: {}", epoch_seconds),
    };

    if !epoch_seconds.is_finite() || epoch_seconds < 0.0 {
        return Err(invalid());
    }

    let mut seconds = epoch_seconds.trunc() as i64;
    let mut micros = (epoch_seconds.fract() * 1_000_000.0).round() as i64;
    if micros >= 1_000_000 {
        seconds += 1;
        micros -= 1_000_000;
    }
    let nanos = (micros * 1_000) as u32;

    let arrival = tz.timestamp_opt(seconds, nanos).single().ok_or_else(invalid)?;
    Ok(arrival.format(SOURCE_TIMESTAMP_FORMAT).to_string())
}

fn parse_payload(payload: &[u8]) -> DomainResult<Map<String, Value>> {
    match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(DomainError::InvalidPayload(format!(
            "expected a JSON object, found {}",
            json_type_name(&other)
        ))),
        Err(e) => Err(DomainError::InvalidPayload(format!(
            "payload is not valid JSON: {}",
            e
        ))),
    }
}

fn extract_dedup_key(fields: &Map<String, Value>, field: &str) -> DomainResult<DedupKey> {
    match fields.get(field) {
        Some(Value::String(key)) => Ok(DedupKey::Text(key.clone())),
        Some(Value::Number(key)) => Ok(DedupKey::Number(key.to_string())),
        None | Some(Value::Null) => Err(DomainError::MissingDedupKey(field.to_string())),
        Some(other) => Err(DomainError::InvalidPayload(format!(
            "dedup key field {} must be a string or a number, found {}",
            field,
            json_type_name(other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
