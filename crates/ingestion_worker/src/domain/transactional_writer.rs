use common::domain::{Credentials, DomainError, DomainResult, EventStore, InsertFragment};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, instrument, warn};

/// Writes a batch of fragments over one dedicated connection, all-or-nothing
pub struct TransactionalWriter {
    store: Arc<dyn EventStore>,
    write_timeout: Duration,
}

impl TransactionalWriter {
    pub fn new(store: Arc<dyn EventStore>, write_timeout: Duration) -> Self {
        Self {
            store,
            write_timeout,
        }
    }

    /// Connect, execute every fragment in one transaction, and commit.
    ///
    /// Connect and execution share a single `write_timeout` deadline. Once a
    /// connection is open it is closed exactly once, whatever the outcome.
    #[instrument(
        name = "write_batch",
        skip(self, credentials, fragments),
        fields(
            endpoint = %credentials.endpoint,
            database = %credentials.database,
            fragments = fragments.len()
        )
    )]
    pub async fn write_batch(
        &self,
        credentials: &Credentials,
        fragments: &[InsertFragment],
    ) -> DomainResult<u64> {
        let deadline = Instant::now() + self.write_timeout;

        let mut connection = timeout_at(deadline, self.store.connect(credentials))
            .await
            .map_err(|_| DomainError::WriteTimeout(self.write_timeout))??;
        debug!("opened store connection");

        let result = timeout_at(deadline, connection.execute_atomic(fragments))
            .await
            .unwrap_or(Err(DomainError::WriteTimeout(self.write_timeout)));

        if let Err(e) = connection.close().await {
            warn!(error = %e, "failed to close store connection");
        }

        match &result {
            Ok(rows) => debug!(rows, "batch committed"),
            Err(e) => warn!(error = %e, "batch rolled back"),
        }

        result
    }
}
