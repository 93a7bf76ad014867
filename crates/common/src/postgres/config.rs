use std::time::Duration;

/// Connection settings for the destination store.
/// Host, credentials and database come from the per-invocation secret.
#[derive(Debug, Clone)]
pub struct PostgresStoreConfig {
    /// Port used when the secret endpoint has none
    pub default_port: u16,
    pub connect_timeout: Duration,
    /// Server-side bound on each statement
    pub statement_timeout: Duration,
    /// Wait for the connection driver task to finish on close
    pub close_timeout: Duration,
}

impl Default for PostgresStoreConfig {
    fn default() -> Self {
        Self {
            default_port: 5432,
            connect_timeout: Duration::from_secs(5),
            statement_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(2),
        }
    }
}
