use crate::domain::{
    Credentials, DomainError, DomainResult, EventStore, EventStoreConnection, InsertFragment,
};
use crate::postgres::PostgresStoreConfig;
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::types::Json;
use tokio_postgres::NoTls;
use tracing::{debug, warn};

/// PostgreSQL destination store; opens one dedicated connection per invocation
#[derive(Debug, Clone, Default)]
pub struct PostgresEventStore {
    config: PostgresStoreConfig,
}

impl PostgresEventStore {
    pub fn new(config: PostgresStoreConfig) -> Self {
        Self { config }
    }

    fn connection_config(&self, credentials: &Credentials) -> DomainResult<tokio_postgres::Config> {
        let (host, port) = credentials.host_and_port(self.config.default_port)?;

        let mut cfg = tokio_postgres::Config::new();
        cfg.host(&host)
            .port(port)
            .user(&credentials.username)
            .password(&credentials.password)
            .dbname(&credentials.database)
            .application_name("telemetry-ingest")
            .connect_timeout(self.config.connect_timeout)
            .options(&format!(
                "-c statement_timeout={}",
                self.config.statement_timeout.as_millis()
            ));
        Ok(cfg)
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn connect(
        &self,
        credentials: &Credentials,
    ) -> DomainResult<Box<dyn EventStoreConnection>> {
        let cfg = self.connection_config(credentials)?;

        debug!(
            endpoint = %credentials.endpoint,
            database = %credentials.database,
            "Opening store connection"
        );

        let (client, connection) = cfg
            .connect(NoTls)
            .await
            .map_err(|e| DomainError::ConnectionFailed(e.into()))?;

        // The connection object drives the socket; it resolves once the client is dropped
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "Store connection terminated with error");
            }
        });

        Ok(Box::new(PostgresEventStoreConnection {
            client: Some(client),
            driver: Some(driver),
            close_timeout: self.config.close_timeout,
        }))
    }
}

pub struct PostgresEventStoreConnection {
    client: Option<tokio_postgres::Client>,
    driver: Option<JoinHandle<()>>,
    close_timeout: std::time::Duration,
}

#[async_trait]
impl EventStoreConnection for PostgresEventStoreConnection {
    async fn execute_atomic(&mut self, fragments: &[InsertFragment]) -> DomainResult<u64> {
        let client = self.client.as_mut().ok_or_else(|| {
            DomainError::ConnectionFailed(anyhow::anyhow!("connection already closed"))
        })?;

        let tx = client
            .transaction()
            .await
            .map_err(|e| DomainError::ConnectionFailed(e.into()))?;

        let mut rows_affected = 0;
        for (index, fragment) in fragments.iter().enumerate() {
            let row = Json(fragment.values());
            let executed = tx.execute(fragment.sql(), &[&row]).await;
            match executed {
                Ok(rows) => rows_affected += rows,
                Err(e) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(error = %rollback_err, "Rollback failed; connection will be discarded");
                    }
                    return Err(DomainError::StatementFailed {
                        index,
                        source: e.into(),
                    });
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::CommitFailed(e.into()))?;

        debug!(
            rows_affected,
            fragment_count = fragments.len(),
            "Transaction committed"
        );
        Ok(rows_affected)
    }

    async fn close(&mut self) -> DomainResult<()> {
        // Dropping the client terminates the session and lets the driver finish
        drop(self.client.take());

        if let Some(mut driver) = self.driver.take() {
            if tokio::time::timeout(self.close_timeout, &mut driver)
                .await
                .is_err()
            {
                warn!(timeout = ?self.close_timeout, "Store connection did not shut down in time");
                driver.abort();
            }
        }

        debug!("Store connection closed");
        Ok(())
    }
}

impl Drop for PostgresEventStoreConnection {
    fn drop(&mut self) {
        // Only reached with a live driver when the invocation future was cancelled
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}
