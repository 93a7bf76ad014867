use crate::domain::{Credentials, DomainError, DomainResult, SecretResolver};
use anyhow::{Context, Result};
use async_nats::jetstream::{self, kv};
use async_trait::async_trait;
use tracing::debug;

/// Resolves credentials from a NATS JetStream key-value bucket.
/// Each key holds one JSON secret document.
pub struct NatsKvSecretResolver {
    store: kv::Store,
}

impl NatsKvSecretResolver {
    pub async fn new(jetstream: &jetstream::Context, bucket_name: &str) -> Result<Self> {
        debug!(bucket = %bucket_name, "opening secret bucket");

        let store = jetstream
            .get_key_value(bucket_name)
            .await
            .with_context(|| format!("failed to open secret bucket {}", bucket_name))?;

        Ok(Self { store })
    }
}

#[async_trait]
impl SecretResolver for NatsKvSecretResolver {
    async fn get_credentials(&self, identifier: &str) -> DomainResult<Credentials> {
        debug!(secret = %identifier, "resolving credentials from key-value bucket");

        let entry = self.store.get(identifier).await.map_err(|e| {
            DomainError::SecretResolutionFailed {
                identifier: identifier.to_string(),
                source: e.into(),
            }
        })?;

        match entry {
            Some(raw) => Credentials::from_secret_json(identifier, &raw),
            None => Err(DomainError::SecretNotFound(identifier.to_string())),
        }
    }
}
