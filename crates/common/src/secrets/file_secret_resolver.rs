use crate::domain::{Credentials, DomainError, DomainResult, SecretResolver};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

/// Resolves credentials from JSON secret documents in a directory.
///
/// The secret `ingest-credentials` is read from `<dir>/ingest-credentials.json`.
/// Suited to mounted secret volumes.
#[derive(Debug, Clone)]
pub struct FileSecretResolver {
    dir: PathBuf,
}

impl FileSecretResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn secret_path(&self, identifier: &str) -> DomainResult<PathBuf> {
        // Identifiers name a file directly inside the secret directory
        if identifier.is_empty()
            || identifier.contains(['/', '\\'])
            || identifier.starts_with('.')
        {
            return Err(DomainError::SecretNotFound(identifier.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", identifier)))
    }
}

#[async_trait]
impl SecretResolver for FileSecretResolver {
    async fn get_credentials(&self, identifier: &str) -> DomainResult<Credentials> {
        let path = self.secret_path(identifier)?;
        debug!(secret = %identifier, path = %path.display(), "resolving credentials from file");

        let raw = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => DomainError::SecretNotFound(identifier.to_string()),
            ErrorKind::PermissionDenied => DomainError::SecretAccessDenied(identifier.to_string()),
            _ => DomainError::SecretResolutionFailed {
                identifier: identifier.to_string(),
                source: e.into(),
            },
        })?;

        Credentials::from_secret_json(identifier, &raw)
    }
}
