use crate::domain::{IngestionHandler, InvocationOutcome};
use async_nats::jetstream::Message;
use bytes::Bytes;
use common::domain::FailureKind;
use common::nats::{BatchProcessor, ProcessingResult};
use std::sync::Arc;
use tracing::{debug, warn};

/// Create a BatchProcessor that hands each fetched batch to the ingestion handler as one invocation
pub fn create_raw_record_processor(handler: Arc<IngestionHandler>) -> BatchProcessor {
    Box::new(move |messages: &[Message]| {
        let handler = Arc::clone(&handler);

        // Bytes clones share the buffer, so the batch can outlive the borrowed slice
        let batch: Vec<Bytes> = messages.iter().map(|msg| msg.payload.clone()).collect();

        Box::pin(async move {
            let outcome = handler.handle(&batch).await;
            let response = outcome.response();
            debug!(
                status_code = response.status_code,
                body = %response.body,
                "invocation finished"
            );
            Ok(processing_result_for(&outcome, batch.len()))
        })
    })
}

/// Settle the batch from the invocation outcome.
///
/// Committed batches are acked. A decode failure pins one message that can never
/// succeed, so that message is terminated and the rest are redelivered without it.
/// Any other failure rejects the whole batch for redelivery.
pub fn processing_result_for(outcome: &InvocationOutcome, count: usize) -> ProcessingResult {
    match outcome {
        InvocationOutcome::Committed(_) => ProcessingResult::ack_all(count),
        InvocationOutcome::Failed(failure) => match (failure.kind, failure.message_index) {
            (FailureKind::Decode, Some(index)) if index < count => {
                warn!(
                    kind = %failure.kind,
                    message_index = index,
                    message_count = count,
                    "terminating unprocessable message, redelivering the rest"
                );
                ProcessingResult::term_one_nak_rest(count, index, Some(failure.to_string()))
            }
            _ => {
                warn!(
                    kind = %failure.kind,
                    message_count = count,
                    "rejecting batch for redelivery"
                );
                ProcessingResult::nak_all(count, Some(failure.to_string()))
            }
        },
    }
}
