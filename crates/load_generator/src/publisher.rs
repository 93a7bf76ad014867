use crate::VehicleTelemetry;
use anyhow::{Context, Result};
use async_nats::jetstream;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use common::domain::{QueueRecord, SourceKind, StreamRecord, StreamRecordData};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Sends synthetic records to the source the ingestion worker consumes
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RecordPublisher: Send + Sync {
    async fn publish(&self, record: &VehicleTelemetry) -> Result<()>;
}

/// Publishes records to JetStream wrapped in the configured source envelope
pub struct NatsRecordPublisher {
    jetstream: jetstream::Context,
    subject: String,
    source_kind: SourceKind,
    partition_key: String,
    sequence: AtomicU64,
}

impl NatsRecordPublisher {
    /// Records go to `{stream}.{partition_key}`
    pub fn new(
        jetstream: jetstream::Context,
        stream: &str,
        source_kind: SourceKind,
        partition_key: String,
    ) -> Self {
        Self {
            jetstream,
            subject: format!("{}.{}", stream, partition_key),
            source_kind,
            partition_key,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Wrap the JSON payload the way the given source delivers it
pub fn encode_envelope(
    source_kind: SourceKind,
    partition_key: &str,
    sequence: u64,
    record: &VehicleTelemetry,
) -> Result<Vec<u8>> {
    let payload = record.to_json().context("Failed to serialize telemetry")?;

    let envelope = match source_kind {
        SourceKind::Stream => serde_json::to_vec(&StreamRecord {
            stream: StreamRecordData {
                data: STANDARD.encode(payload),
                approximate_arrival_timestamp: Utc::now().timestamp_micros() as f64 / 1_000_000.0,
                partition_key: Some(partition_key.to_string()),
                sequence_number: Some(sequence.to_string()),
            },
        }),
        SourceKind::Queue => serde_json::to_vec(&QueueRecord {
            message_id: Some(xid::new().to_string()),
            body: payload,
            attributes: BTreeMap::new(),
        }),
    };

    envelope.context("Failed to serialize record envelope")
}

#[async_trait]
impl RecordPublisher for NatsRecordPublisher {
    async fn publish(&self, record: &VehicleTelemetry) -> Result<()> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let payload = encode_envelope(self.source_kind, &self.partition_key, sequence, record)?;

        debug!(
            subject = %self.subject,
            vehicle_id = %record.vehicle_id,
            size_bytes = payload.len(),
            "Publishing telemetry record"
        );

        let ack = self
            .jetstream
            .publish(self.subject.clone(), payload.into())
            .await
            .context("Failed to publish record to JetStream")?;

        ack.await
            .context("Failed to receive JetStream acknowledgment")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_envelope_carries_base64_payload() {
        let record = VehicleTelemetry::random();
        let raw = encode_envelope(SourceKind::Stream, "vehicle_id", 7, &record).unwrap();

        let envelope: StreamRecord = serde_json::from_slice(&raw).unwrap();
        assert_eq!(envelope.stream.partition_key.as_deref(), Some("vehicle_id"));
        assert_eq!(envelope.stream.sequence_number.as_deref(), Some("7"));
        assert!(envelope.stream.approximate_arrival_timestamp > 1_700_000_000.0);

        let payload = STANDARD.decode(envelope.stream.data).unwrap();
        let decoded: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(decoded["vehicle_id"], serde_json::json!(record.vehicle_id));
    }

    #[test]
    fn test_queue_envelope_carries_plain_body() {
        let record = VehicleTelemetry::random();
        let raw = encode_envelope(SourceKind::Queue, "vehicle_id", 0, &record).unwrap();

        let envelope: QueueRecord = serde_json::from_slice(&raw).unwrap();
        assert!(envelope.message_id.is_some());
        assert_eq!(envelope.body, record.to_json().unwrap());
    }
}
