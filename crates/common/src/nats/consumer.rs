use anyhow::{Context, Result};
use async_nats::jetstream::{self, consumer::PullConsumer, Message};
use futures::{future::BoxFuture, StreamExt};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of processing a batch of messages
/// Provides fine-grained control over which messages to acknowledge vs reject
#[derive(Debug, PartialEq)]
pub struct ProcessingResult {
    /// Messages that were successfully processed and should be acknowledged (Ack)
    pub ack: Vec<usize>,
    /// Messages that failed processing and should be rejected (Nak) with optional error details
    pub nak: Vec<(usize, Option<String>)>,
    /// Messages that can never succeed and must not be redelivered (Term)
    pub term: Vec<(usize, Option<String>)>,
}

impl ProcessingResult {
    /// Create a result where all messages should be acknowledged
    pub fn ack_all(count: usize) -> Self {
        Self {
            ack: (0..count).collect(),
            nak: Vec::new(),
            term: Vec::new(),
        }
    }

    /// Create a result where all messages should be rejected
    pub fn nak_all(count: usize, error: Option<String>) -> Self {
        Self {
            ack: Vec::new(),
            nak: (0..count).map(|i| (i, error.clone())).collect(),
            term: Vec::new(),
        }
    }

    /// Terminate the message at `index` and reject the rest for redelivery
    pub fn term_one_nak_rest(count: usize, index: usize, error: Option<String>) -> Self {
        Self {
            ack: Vec::new(),
            nak: (0..count)
                .filter(|&i| i != index)
                .map(|i| (i, error.clone()))
                .collect(),
            term: (index < count).then_some((index, error)).into_iter().collect(),
        }
    }

    /// Create a result with specific ack/nak indices
    pub fn new(ack: Vec<usize>, nak: Vec<(usize, Option<String>)>) -> Self {
        Self {
            ack,
            nak,
            term: Vec::new(),
        }
    }
}

/// Type alias for the batch processor function
/// Takes a slice of raw NATS messages and returns a ProcessingResult
/// The processor is responsible for deserializing and processing the messages
pub type BatchProcessor =
    Box<dyn Fn(&[Message]) -> BoxFuture<'static, Result<ProcessingResult>> + Send + Sync>;

/// Durable pull consumer settings
#[derive(Debug, Clone)]
pub struct NatsConsumerConfig {
    pub stream_name: String,
    pub consumer_name: String,
    pub subject_filter: String,
    pub batch_size: usize,
    pub max_wait: Duration,
    /// Upper bound on deliveries of one message before the server stops redelivering it
    pub max_deliver: i64,
    /// How long the server waits for an ack before redelivering
    pub ack_wait: Duration,
    /// Delay requested when rejecting a batch
    pub nak_delay: Option<Duration>,
}

/// Generic NATS JetStream consumer that processes batches of messages
/// Each fetched batch is handed to the processor as one unit
pub struct NatsConsumer {
    consumer: PullConsumer,
    config: NatsConsumerConfig,
    processor: BatchProcessor,
}

impl NatsConsumer {
    pub async fn new(
        jetstream: &jetstream::Context,
        config: NatsConsumerConfig,
        processor: BatchProcessor,
    ) -> Result<Self> {
        debug!(
            stream = %config.stream_name,
            consumer = %config.consumer_name,
            subject = %config.subject_filter,
            max_deliver = config.max_deliver,
            "Creating JetStream consumer"
        );

        // Create or get existing durable consumer
        let consumer = jetstream
            .create_consumer_on_stream(
                jetstream::consumer::pull::Config {
                    name: Some(config.consumer_name.clone()),
                    durable_name: Some(config.consumer_name.clone()),
                    filter_subject: config.subject_filter.clone(),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ack_wait: config.ack_wait,
                    max_deliver: config.max_deliver,
                    ..Default::default()
                },
                config.stream_name.as_str(),
            )
            .await
            .context("Failed to create consumer")?;

        info!(
            stream = %config.stream_name,
            consumer = %config.consumer_name,
            "Consumer created successfully"
        );

        Ok(Self {
            consumer,
            config,
            processor,
        })
    }

    pub async fn run(&self, ctx: CancellationToken) -> Result<()> {
        info!(consumer = %self.config.consumer_name, "Starting consumer loop");

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("Received shutdown signal, stopping consumer");
                    break;
                }
                result = self.fetch_and_process_batch() => {
                    if let Err(e) = result {
                        error!(error = %e, "Error processing batch");
                        // Continue processing despite errors
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }

        info!("Consumer stopped gracefully");
        Ok(())
    }

    async fn fetch_and_process_batch(&self) -> Result<()> {
        debug!(
            batch_size = self.config.batch_size,
            max_wait_ms = self.config.max_wait.as_millis(),
            "Fetching message batch"
        );

        let mut messages = self
            .consumer
            .fetch()
            .max_messages(self.config.batch_size)
            .expires(self.config.max_wait)
            .messages()
            .await
            .context("Failed to fetch messages")?;

        let mut raw_messages = Vec::new();

        while let Some(result) = messages.next().await {
            match result {
                Ok(msg) => raw_messages.push(msg),
                Err(e) => {
                    warn!(error = %e, "Error receiving message from batch");
                }
            }
        }

        if raw_messages.is_empty() {
            debug!("No messages in batch");
            return Ok(());
        }

        debug!(message_count = raw_messages.len(), "Received message batch");

        let processing_result = match (self.processor)(&raw_messages).await {
            Ok(result) => result,
            Err(e) => {
                // If the processor returns an error, Nak all messages
                error!(error = %e, "Processor returned error, rejecting all messages");
                ProcessingResult::nak_all(raw_messages.len(), Some(e.to_string()))
            }
        };

        let ack_count = processing_result.ack.len();
        for idx in processing_result.ack {
            match raw_messages.get(idx) {
                Some(msg) => {
                    if let Err(e) = msg.ack().await {
                        error!(error = %e, message_index = idx, "Failed to acknowledge message");
                    }
                }
                None => warn!(
                    message_index = idx,
                    batch_size = raw_messages.len(),
                    "Invalid ack index in ProcessingResult"
                ),
            }
        }

        if ack_count > 0 {
            debug!(ack_count, "Acknowledged messages");
        }

        let nak_count = processing_result.nak.len();
        for (idx, error_msg) in processing_result.nak {
            match raw_messages.get(idx) {
                Some(msg) => {
                    match error_msg {
                        Some(err) => warn!(
                            message_index = idx,
                            subject = %msg.subject,
                            error = %err,
                            "Rejecting message due to processing error"
                        ),
                        None => warn!(
                            message_index = idx,
                            subject = %msg.subject,
                            "Rejecting message"
                        ),
                    }

                    if let Err(e) = msg
                        .ack_with(jetstream::AckKind::Nak(self.config.nak_delay))
                        .await
                    {
                        error!(error = %e, message_index = idx, "Failed to reject message");
                    }
                }
                None => warn!(
                    message_index = idx,
                    batch_size = raw_messages.len(),
                    "Invalid nak index in ProcessingResult"
                ),
            }
        }

        if nak_count > 0 {
            debug!(nak_count, "Rejected messages for redelivery");
        }

        for (idx, error_msg) in processing_result.term {
            match raw_messages.get(idx) {
                Some(msg) => {
                    error!(
                        message_index = idx,
                        subject = %msg.subject,
                        error = error_msg.as_deref().unwrap_or("unprocessable message"),
                        "Terminating message, it will not be redelivered"
                    );

                    if let Err(e) = msg.ack_with(jetstream::AckKind::Term).await {
                        error!(error = %e, message_index = idx, "Failed to terminate message");
                    }
                }
                None => warn!(
                    message_index = idx,
                    batch_size = raw_messages.len(),
                    "Invalid term index in ProcessingResult"
                ),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_all() {
        let result = ProcessingResult::ack_all(3);
        assert_eq!(result.ack, vec![0, 1, 2]);
        assert!(result.nak.is_empty());
    }

    #[test]
    fn test_nak_all_carries_error() {
        let result = ProcessingResult::nak_all(2, Some("write failed".to_string()));
        assert!(result.ack.is_empty());
        assert!(result.term.is_empty());
        assert_eq!(
            result.nak,
            vec![
                (0, Some("write failed".to_string())),
                (1, Some("write failed".to_string())),
            ]
        );
    }

    #[test]
    fn test_term_one_nak_rest() {
        let error = Some("bad payload".to_string());
        let result = ProcessingResult::term_one_nak_rest(3, 1, error.clone());

        assert!(result.ack.is_empty());
        assert_eq!(result.term, vec![(1, error.clone())]);
        assert_eq!(result.nak, vec![(0, error.clone()), (2, error)]);
    }

    #[test]
    fn test_term_index_outside_batch_naks_everything() {
        let result = ProcessingResult::term_one_nak_rest(2, 5, None);

        assert!(result.term.is_empty());
        assert_eq!(result.nak, vec![(0, None), (1, None)]);
    }
}
