use crate::domain::{Credentials, DomainResult, InsertFragment};
use async_trait::async_trait;

/// Connection factory for the destination store
/// Infrastructure layer (e.g., postgres) implements this trait
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Open a single dedicated connection using per-invocation credentials
    ///
    /// # Returns
    /// The open connection, or ConnectionFailed
    async fn connect(
        &self,
        credentials: &Credentials,
    ) -> DomainResult<Box<dyn EventStoreConnection>>;
}

/// One open connection to the destination store
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait EventStoreConnection: Send {
    /// Execute all fragments inside one transaction and commit.
    ///
    /// Failure handling: entire batch fails atomically (all-or-nothing). A
    /// failing fragment rolls the transaction back and returns StatementFailed
    /// with its index.
    ///
    /// # Returns
    /// Total rows affected
    async fn execute_atomic(&mut self, fragments: &[InsertFragment]) -> DomainResult<u64>;

    /// Release the connection. Called exactly once per opened connection.
    async fn close(&mut self) -> DomainResult<()>;
}
