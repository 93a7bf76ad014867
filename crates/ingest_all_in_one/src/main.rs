mod config;

use crate::config::{SecretBackend, ServiceConfig};
use common::domain::{SecretResolver, SourceKind};
use common::nats::{NatsClient, NatsKvSecretResolver};
use common::postgres::{PostgresEventStore, PostgresStoreConfig};
use common::secrets::FileSecretResolver;
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig, TelemetryProviders};
use ingest_runner::Runner;
use ingestion_worker::domain::{
    DecoderConfig, IngestionHandler, MessageDecoder, StatementBuilder, StatementBuilderConfig,
    TransactionalWriter,
};
use ingestion_worker::ingestion_worker::{IngestionWorker, IngestionWorkerConfig};
use load_generator::{run_load_generator, LoadGeneratorConfig, NatsRecordPublisher};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    // Initialize configuration and tracing
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {:#}", e);
        std::process::exit(1);
    }

    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        source_kind = %config.source_kind,
        secret_backend = %config.secret_backend,
        "Starting telemetry ingest service"
    );
    debug!("Configuration: {:?}", config);

    let (nats_client, source_kind) = match initialize_shared_dependencies(&config).await {
        Ok(deps) => deps,
        Err(e) => {
            error!("Failed to initialize shared dependencies: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let handler = match build_ingestion_handler(&config, &nats_client, source_kind).await {
        Ok(handler) => Arc::new(handler),
        Err(e) => {
            error!("Failed to initialize ingestion handler: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let worker = match IngestionWorker::new(
        handler,
        &nats_client,
        IngestionWorkerConfig {
            stream: config.nats_stream.clone(),
            subject: config.nats_subject.clone(),
            consumer_name: config.nats_consumer_name.clone(),
            batch_size: config.nats_batch_size,
            batch_wait_secs: config.nats_batch_wait_secs,
            max_deliver: config.nats_max_deliver,
            ack_wait_secs: config.nats_ack_wait_secs,
            nak_delay_secs: config.nats_nak_delay_secs,
        },
    )
    .await
    {
        Ok(worker) => worker,
        Err(e) => {
            error!("Failed to initialize ingestion worker: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let mut runner =
        Runner::new().with_app_process("ingestion_worker", move |ctx| worker.run(ctx));

    if config.load_generator_enabled {
        let publisher = Arc::new(NatsRecordPublisher::new(
            nats_client.jetstream().clone(),
            &config.nats_stream,
            source_kind,
            config.load_generator_partition_key.clone(),
        ));
        let generator_config = LoadGeneratorConfig {
            interval: Duration::from_millis(config.load_generator_interval_ms),
            repeat_count: config.load_generator_repeat_count,
            max_records: (config.load_generator_max_records > 0)
                .then_some(config.load_generator_max_records),
        };
        info!(subject = %publisher.subject(), "Load generator enabled");
        runner = runner.with_app_process("load_generator", move |ctx| {
            run_load_generator(ctx, generator_config, publisher)
        });
    }

    let exit_code = runner
        .with_closer("nats", move || async move {
            info!("Running cleanup tasks...");
            nats_client.close().await
        })
        .with_closer_timeout(Duration::from_secs(10))
        .run()
        .await;

    // Flush pending traces and logs after every closer has logged
    shutdown_telemetry(telemetry_providers);
    std::process::exit(exit_code);
}

async fn initialize_shared_dependencies(
    config: &ServiceConfig,
) -> anyhow::Result<(Arc<NatsClient>, SourceKind)> {
    let source_kind = config.source_kind()?;

    info!("Initializing NATS...");
    let nats_client = Arc::new(
        NatsClient::connect(
            &config.nats_url,
            Duration::from_secs(config.startup_timeout_secs),
        )
        .await?,
    );
    nats_client.ensure_stream(&config.nats_stream).await?;

    Ok((nats_client, source_kind))
}

async fn build_ingestion_handler(
    config: &ServiceConfig,
    nats_client: &NatsClient,
    source_kind: SourceKind,
) -> anyhow::Result<IngestionHandler> {
    let resolver: Arc<dyn SecretResolver> = match config.secret_backend()? {
        SecretBackend::File => {
            info!(dir = %config.secret_dir, "Using file secret resolver");
            Arc::new(FileSecretResolver::new(&config.secret_dir))
        }
        SecretBackend::NatsKv => {
            info!(bucket = %config.secret_kv_bucket, "Using NATS KV secret resolver");
            Arc::new(
                NatsKvSecretResolver::new(nats_client.jetstream(), &config.secret_kv_bucket)
                    .await?,
            )
        }
    };

    let store = Arc::new(PostgresEventStore::new(PostgresStoreConfig {
        default_port: config.postgres_default_port,
        connect_timeout: Duration::from_secs(config.postgres_connect_timeout_secs),
        statement_timeout: Duration::from_secs(config.postgres_statement_timeout_secs),
        ..Default::default()
    }));

    let builder = StatementBuilder::new(StatementBuilderConfig {
        source_timestamp_column: config.source_timestamp_column.clone(),
        ingestion_timestamp_column: config.ingestion_timestamp_column.clone(),
        on_conflict_do_nothing: config.on_conflict_do_nothing,
    })?;

    Ok(IngestionHandler::new(
        config.secret_id.clone(),
        resolver,
        MessageDecoder::new(DecoderConfig {
            source_kind,
            dedup_key_field: config.dedup_key_field.clone(),
        }),
        builder,
        TransactionalWriter::new(store, Duration::from_secs(config.write_timeout_secs)),
    ))
}
