use crate::domain::{
    dedupe, format_ingestion_timestamp, DestinationTable, InvocationFailure, InvocationOutcome,
    InvocationSummary, MessageDecoder, StatementBuilder, TransactionalWriter,
};
use bytes::Bytes;
use chrono::{DateTime, Local, TimeZone};
use common::domain::{CanonicalEvent, DomainResult, InsertFragment, SecretResolver};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// Processes one delivered batch end to end
///
/// Flow:
/// 1. Capture the ingestion timestamp once for the whole batch
/// 2. Resolve store credentials and validate the destination table
/// 3. Decode every message in delivery order, failing on the first bad one
/// 4. Drop duplicate events within the batch
/// 5. Build one insert per surviving event
/// 6. Write all inserts as one transaction
pub struct IngestionHandler {
    secret_id: String,
    resolver: Arc<dyn SecretResolver>,
    decoder: MessageDecoder,
    builder: StatementBuilder,
    writer: TransactionalWriter,
}

impl IngestionHandler {
    pub fn new(
        secret_id: String,
        resolver: Arc<dyn SecretResolver>,
        decoder: MessageDecoder,
        builder: StatementBuilder,
        writer: TransactionalWriter,
    ) -> Self {
        Self {
            secret_id,
            resolver,
            decoder,
            builder,
            writer,
        }
    }

    pub async fn handle(&self, batch: &[Bytes]) -> InvocationOutcome {
        self.handle_at(batch, &Local::now()).await
    }

    /// Handle a batch using a caller-supplied capture time. Stream arrival
    /// times are rendered in the same time zone as `captured_at`.
    #[instrument(
        name = "ingestion_invocation",
        skip_all,
        fields(batch_size = batch.len(), source_kind = %self.decoder.source_kind())
    )]
    pub async fn handle_at<Tz>(
        &self,
        batch: &[Bytes],
        captured_at: &DateTime<Tz>,
    ) -> InvocationOutcome
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let ingestion_timestamp = format_ingestion_timestamp(captured_at);
        let tz = captured_at.timezone();

        match self.process(batch, &ingestion_timestamp, &tz).await {
            Ok(summary) => {
                info!(
                    received = summary.received,
                    duplicates_dropped = summary.duplicates_dropped,
                    rows_written = summary.rows_written,
                    "batch ingested"
                );
                InvocationOutcome::Committed(summary)
            }
            Err(failure) => {
                error!(kind = %failure.kind, error = %failure.message, "batch ingestion failed");
                InvocationOutcome::Failed(failure)
            }
        }
    }

    async fn process<Tz>(
        &self,
        batch: &[Bytes],
        ingestion_timestamp: &str,
        tz: &Tz,
    ) -> Result<InvocationSummary, InvocationFailure>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let credentials = self
            .resolver
            .get_credentials(&self.secret_id)
            .await
            .map_err(|e| InvocationFailure::from_error(&e, "credential resolution"))?;
        debug!(credentials = ?credentials, "resolved store credentials");

        let table = DestinationTable::parse(&credentials.table)
            .map_err(|e| InvocationFailure::from_error(&e, "destination table"))?;

        let events = self.decode_batch(batch, ingestion_timestamp, tz)?;

        let received = events.len();
        let unique = dedupe(events);
        let summary = InvocationSummary {
            received,
            unique: unique.len(),
            duplicates_dropped: received - unique.len(),
            rows_written: 0,
        };

        if unique.is_empty() {
            debug!("empty batch, nothing to write");
            return Ok(summary);
        }

        let fragments = self
            .build_fragments(&table, &unique)
            .map_err(|e| InvocationFailure::from_error(&e, "statement build"))?;

        let rows_written = self
            .writer
            .write_batch(&credentials, &fragments)
            .await
            .map_err(|e| InvocationFailure::from_error(&e, "batch write"))?;

        Ok(InvocationSummary {
            rows_written,
            ..summary
        })
    }

    fn decode_batch<Tz>(
        &self,
        batch: &[Bytes],
        ingestion_timestamp: &str,
        tz: &Tz,
    ) -> Result<Vec<CanonicalEvent>, InvocationFailure>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        batch
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                self.decoder
                    .decode_in(raw, ingestion_timestamp, tz)
                    .map_err(|e| InvocationFailure::for_message(&e, index))
            })
            .collect()
    }

    fn build_fragments(
        &self,
        table: &DestinationTable,
        events: &[CanonicalEvent],
    ) -> DomainResult<Vec<InsertFragment>> {
        events
            .iter()
            .map(|event| self.builder.build_fragment(table, event))
            .collect()
    }
}
