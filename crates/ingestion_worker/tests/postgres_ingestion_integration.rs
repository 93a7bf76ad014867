#![cfg(feature = "integration-tests")]

use bytes::Bytes;
use common::domain::{Credentials, SourceKind};
use common::postgres::{PostgresEventStore, PostgresStoreConfig};
use common::MockSecretResolver;
use ingestion_worker::domain::{
    DecoderConfig, IngestionHandler, InvocationOutcome, InvocationSummary, MessageDecoder,
    StatementBuilder, StatementBuilderConfig, TransactionalWriter,
};
use std::sync::Arc;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use tokio_postgres::NoTls;

async fn setup_test_db() -> (ContainerAsync<Postgres>, Credentials, tokio_postgres::Client) {
    let postgres = Postgres::default().start().await.unwrap();
    let host = postgres.get_host().await.unwrap();
    let port = postgres.get_host_port_ipv4(5432).await.unwrap();

    let dsn = format!(
        "host={} port={} user=postgres password=postgres dbname=postgres",
        host, port
    );
    let (admin, connection) = tokio_postgres::connect(&dsn, NoTls).await.unwrap();
    tokio::spawn(connection);

    admin
        .batch_execute(
            "CREATE TABLE vehicle_telemetry (
                vehicle_id TEXT NOT NULL,
                speed DOUBLE PRECISION NOT NULL,
                passenger_count INTEGER,
                maintenance_status TEXT,
                ingest_ts TIMESTAMP NOT NULL
            )",
        )
        .await
        .unwrap();

    let credentials = Credentials {
        endpoint: format!("{}:{}", host, port),
        username: "postgres".to_string(),
        password: "postgres".to_string(),
        database: "postgres".to_string(),
        table: "vehicle_telemetry".to_string(),
    };

    (postgres, credentials, admin)
}

fn handler(credentials: Credentials) -> IngestionHandler {
    handler_with(credentials, StatementBuilderConfig::default())
}

fn handler_with(credentials: Credentials, builder: StatementBuilderConfig) -> IngestionHandler {
    let mut resolver = MockSecretResolver::new();
    resolver
        .expect_get_credentials()
        .returning(move |_| Ok(credentials.clone()));

    IngestionHandler::new(
        "telemetry-db".to_string(),
        Arc::new(resolver),
        MessageDecoder::new(DecoderConfig {
            source_kind: SourceKind::Queue,
            dedup_key_field: "vehicle_id".to_string(),
        }),
        StatementBuilder::new(builder).unwrap(),
        TransactionalWriter::new(
            Arc::new(PostgresEventStore::new(PostgresStoreConfig::default())),
            Duration::from_secs(10),
        ),
    )
}

fn queue_message(body: serde_json::Value) -> Bytes {
    Bytes::from(serde_json::json!({ "body": body.to_string() }).to_string())
}

async fn row_count(admin: &tokio_postgres::Client) -> i64 {
    admin
        .query_one("SELECT COUNT(*) FROM vehicle_telemetry", &[])
        .await
        .unwrap()
        .get(0)
}

#[tokio::test]
async fn test_batch_lands_with_typed_columns() {
    let (_container, credentials, admin) = setup_test_db().await;
    let handler = handler(credentials);

    let batch = vec![
        queue_message(serde_json::json!({
            "vehicle_id": "V1",
            "speed": 52.95,
            "passenger_count": 4,
            "maintenance_status": "OK"
        })),
        queue_message(serde_json::json!({"vehicle_id": "V2", "speed": 13})),
        queue_message(serde_json::json!({"vehicle_id": "V1", "speed": 77.0})),
    ];

    let outcome = handler.handle(&batch).await;
    assert!(outcome.is_committed(), "{:?}", outcome);
    assert_eq!(row_count(&admin).await, 2);

    let row = admin
        .query_one(
            "SELECT speed, passenger_count FROM vehicle_telemetry WHERE vehicle_id = 'V1'",
            &[],
        )
        .await
        .unwrap();
    let speed: f64 = row.get(0);
    let passengers: Option<i32> = row.get(1);
    assert_eq!(speed, 52.95);
    assert_eq!(passengers, Some(4));
}

#[tokio::test]
async fn test_bad_value_rolls_back_whole_batch() {
    let (_container, credentials, admin) = setup_test_db().await;
    let handler = handler(credentials);

    let batch = vec![
        queue_message(serde_json::json!({"vehicle_id": "V1", "speed": 10.0})),
        queue_message(serde_json::json!({"vehicle_id": "V2", "speed": "fast"})),
    ];

    let outcome = handler.handle(&batch).await;
    assert!(matches!(outcome, InvocationOutcome::Failed(_)));
    assert_eq!(outcome.response().status_code, 503);
    assert_eq!(row_count(&admin).await, 0);
}

#[tokio::test]
async fn test_redelivered_batch_skips_existing_rows() {
    let (_container, credentials, admin) = setup_test_db().await;
    admin
        .batch_execute(
            "ALTER TABLE vehicle_telemetry ADD CONSTRAINT vehicle_telemetry_vehicle_id_key UNIQUE (vehicle_id)",
        )
        .await
        .unwrap();

    let handler = handler_with(
        credentials,
        StatementBuilderConfig {
            on_conflict_do_nothing: true,
            ..StatementBuilderConfig::default()
        },
    );

    let batch = vec![
        queue_message(serde_json::json!({"vehicle_id": "V1", "speed": 10.0})),
        queue_message(serde_json::json!({"vehicle_id": "V2", "speed": 20.0})),
    ];

    let first = handler.handle(&batch).await;
    assert_eq!(
        first,
        InvocationOutcome::Committed(InvocationSummary {
            received: 2,
            unique: 2,
            duplicates_dropped: 0,
            rows_written: 2,
        })
    );

    let redelivered = handler.handle(&batch).await;
    assert!(redelivered.is_committed(), "{:?}", redelivered);
    assert!(matches!(
        redelivered,
        InvocationOutcome::Committed(InvocationSummary { rows_written: 0, .. })
    ));
    assert_eq!(row_count(&admin).await, 2);
}

#[tokio::test]
async fn test_redelivered_batch_without_conflict_clause_fails() {
    let (_container, credentials, admin) = setup_test_db().await;
    admin
        .batch_execute(
            "ALTER TABLE vehicle_telemetry ADD CONSTRAINT vehicle_telemetry_vehicle_id_key UNIQUE (vehicle_id)",
        )
        .await
        .unwrap();

    let handler = handler(credentials);
    let batch = vec![queue_message(
        serde_json::json!({"vehicle_id": "V1", "speed": 10.0}),
    )];

    assert!(handler.handle(&batch).await.is_committed());

    let redelivered = handler.handle(&batch).await;
    assert_eq!(redelivered.response().status_code, 503);
    assert_eq!(row_count(&admin).await, 1);
}
