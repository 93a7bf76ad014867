use crate::domain::IngestionHandler;
use crate::nats::create_raw_record_processor;
use common::nats::{NatsClient, NatsConsumer, NatsConsumerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct IngestionWorkerConfig {
    pub stream: String,
    pub subject: String,
    pub consumer_name: String,
    pub batch_size: usize,
    pub batch_wait_secs: u64,
    pub max_deliver: i64,
    pub ack_wait_secs: u64,
    pub nak_delay_secs: u64,
}

/// Pulls raw record batches from JetStream and feeds them to the ingestion handler
pub struct IngestionWorker {
    consumer: NatsConsumer,
}

impl IngestionWorker {
    pub async fn new(
        handler: Arc<IngestionHandler>,
        nats_client: &NatsClient,
        config: IngestionWorkerConfig,
    ) -> anyhow::Result<Self> {
        info!("Initializing ingestion worker");

        let processor = create_raw_record_processor(handler);
        let consumer = NatsConsumer::new(
            nats_client.jetstream(),
            NatsConsumerConfig {
                stream_name: config.stream,
                consumer_name: config.consumer_name,
                subject_filter: config.subject,
                batch_size: config.batch_size,
                max_wait: Duration::from_secs(config.batch_wait_secs),
                max_deliver: config.max_deliver,
                ack_wait: Duration::from_secs(config.ack_wait_secs),
                nak_delay: (config.nak_delay_secs > 0)
                    .then(|| Duration::from_secs(config.nak_delay_secs)),
            },
            processor,
        )
        .await?;

        info!("Ingestion worker initialized");

        Ok(Self { consumer })
    }

    pub async fn run(self, ctx: CancellationToken) -> anyhow::Result<()> {
        self.consumer.run(ctx).await
    }
}
