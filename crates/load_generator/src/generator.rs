use crate::{RecordPublisher, VehicleTelemetry};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Configuration for the synthetic telemetry load
#[derive(Debug, Clone)]
pub struct LoadGeneratorConfig {
    /// Pause before each publish
    pub interval: Duration,
    /// Times each record is sent; values above 1 exercise in-batch deduplication
    pub repeat_count: u32,
    /// Stop after this many distinct records; `None` runs until cancelled
    pub max_records: Option<u64>,
}

impl Default for LoadGeneratorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            repeat_count: 1,
            max_records: None,
        }
    }
}

/// Publish random vehicle telemetry until cancelled or the record limit is reached.
///
/// Publish failures are logged and do not stop the loop.
pub async fn run_load_generator(
    ctx: CancellationToken,
    config: LoadGeneratorConfig,
    publisher: Arc<dyn RecordPublisher>,
) -> Result<()> {
    info!(
        interval_ms = config.interval.as_millis(),
        repeat_count = config.repeat_count,
        max_records = ?config.max_records,
        "Load generator started"
    );

    let mut records_sent: u64 = 0;

    'records: while config.max_records.map_or(true, |max| records_sent < max) {
        let record = VehicleTelemetry::random();

        for attempt in 0..config.repeat_count.max(1) {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("Received shutdown signal, stopping load generator");
                    break 'records;
                }
                _ = tokio::time::sleep(config.interval) => {
                    match publisher.publish(&record).await {
                        Ok(()) => debug!(
                            vehicle_id = %record.vehicle_id,
                            attempt,
                            "Published telemetry record"
                        ),
                        Err(e) => error!(
                            vehicle_id = %record.vehicle_id,
                            error = %e,
                            "Failed to publish telemetry record"
                        ),
                    }
                }
            }
        }

        records_sent += 1;
    }

    info!(records_sent, "Load generator stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockRecordPublisher;
    use std::sync::Mutex;

    fn fast_config(repeat_count: u32, max_records: u64) -> LoadGeneratorConfig {
        LoadGeneratorConfig {
            interval: Duration::from_millis(1),
            repeat_count,
            max_records: Some(max_records),
        }
    }

    #[tokio::test]
    async fn test_each_record_is_repeated() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();

        let mut publisher = MockRecordPublisher::new();
        publisher.expect_publish().times(6).returning(move |record| {
            recorded.lock().unwrap().push(record.vehicle_id.clone());
            Ok(())
        });

        run_load_generator(
            CancellationToken::new(),
            fast_config(3, 2),
            Arc::new(publisher),
        )
        .await
        .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], seen[1]);
        assert_eq!(seen[1], seen[2]);
        assert_ne!(seen[2], seen[3]);
        assert_eq!(seen[3], seen[5]);
    }

    #[tokio::test]
    async fn test_publish_failures_do_not_stop_the_loop() {
        let mut publisher = MockRecordPublisher::new();
        publisher
            .expect_publish()
            .times(3)
            .returning(|_| Err(anyhow::anyhow!("no responders")));

        let result = run_load_generator(
            CancellationToken::new(),
            fast_config(1, 3),
            Arc::new(publisher),
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_cancellation_stops_generation() {
        let mut publisher = MockRecordPublisher::new();
        publisher.expect_publish().never();

        let ctx = CancellationToken::new();
        ctx.cancel();

        let config = LoadGeneratorConfig {
            interval: Duration::from_secs(60),
            ..Default::default()
        };
        tokio::time::timeout(
            Duration::from_secs(5),
            run_load_generator(ctx, config, Arc::new(publisher)),
        )
        .await
        .expect("generator should stop once cancelled")
        .unwrap();
    }
}
