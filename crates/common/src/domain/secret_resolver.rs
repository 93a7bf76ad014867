use crate::domain::{Credentials, DomainResult};
use async_trait::async_trait;

/// Trait for resolving destination store credentials from a secret store
///
/// Implementations should:
/// - Return SecretNotFound when no secret exists under the identifier
/// - Return SecretAccessDenied when the secret exists but cannot be read
/// - Validate the document into Credentials (InvalidCredentials otherwise)
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SecretResolver: Send + Sync {
    async fn get_credentials(&self, identifier: &str) -> DomainResult<Credentials>;
}
