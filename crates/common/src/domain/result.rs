use crate::domain::SourceKind;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Coarse classification of an invocation failure.
///
/// The invoking environment uses it to settle the batch: a `Decode` failure
/// terminates the offending message and redelivers the others, while `Config`
/// and `Write` failures redeliver the whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Config,
    Decode,
    Write,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Config => write!(f, "config"),
            FailureKind::Decode => write!(f, "decode"),
            FailureKind::Write => write!(f, "write"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Secret not found: {0}")]
    SecretNotFound(String),

    #[error("Access denied to secret: {0}")]
    SecretAccessDenied(String),

    #[error("Failed to resolve secret {identifier}: {source}")]
    SecretResolutionFailed {
        identifier: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Invalid destination table: {0}")]
    InvalidDestinationTable(String),

    #[error("Invalid {source_kind} envelope: {reason}")]
    InvalidEnvelope {
        source_kind: SourceKind,
        reason: String,
    },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Missing dedup key field: {0}")]
    MissingDedupKey(String),

    #[error("Invalid column name: {0}")]
    InvalidColumnName(String),

    #[error("Store connection failed: {0}")]
    ConnectionFailed(#[source] anyhow::Error),

    #[error("Insert fragment {index} failed: {source}")]
    StatementFailed {
        index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Commit failed: {0}")]
    CommitFailed(#[source] anyhow::Error),

    #[error("Batch write timed out after {0:?}")]
    WriteTimeout(Duration),
}

impl DomainError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DomainError::SecretNotFound(_)
            | DomainError::SecretAccessDenied(_)
            | DomainError::SecretResolutionFailed { .. }
            | DomainError::InvalidCredentials(_)
            | DomainError::InvalidDestinationTable(_) => FailureKind::Config,
            DomainError::InvalidEnvelope { .. }
            | DomainError::InvalidPayload(_)
            | DomainError::MissingDedupKey(_)
            | DomainError::InvalidColumnName(_) => FailureKind::Decode,
            DomainError::ConnectionFailed(_)
            | DomainError::StatementFailed { .. }
            | DomainError::CommitFailed(_)
            | DomainError::WriteTimeout(_) => FailureKind::Write,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            DomainError::SecretNotFound("ingest-secret".to_string()).kind(),
            FailureKind::Config
        );
        assert_eq!(
            DomainError::MissingDedupKey("vehicle_id".to_string()).kind(),
            FailureKind::Decode
        );
        assert_eq!(
            DomainError::StatementFailed {
                index: 2,
                source: anyhow::anyhow!("syntax error"),
            }
            .kind(),
            FailureKind::Write
        );
        assert_eq!(
            DomainError::WriteTimeout(Duration::from_secs(5)).kind(),
            FailureKind::Write
        );
    }

    #[test]
    fn test_statement_failed_message_names_fragment() {
        let err = DomainError::StatementFailed {
            index: 3,
            source: anyhow::anyhow!("column \"speed\" does not exist"),
        };
        assert_eq!(
            err.to_string(),
            "Insert fragment 3 failed: column \"speed\" does not exist"
        );
    }
}
