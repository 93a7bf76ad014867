use common::domain::{DomainError, FailureKind};
use serde::Serialize;
use std::fmt;

/// Counts reported for a committed invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationSummary {
    pub received: usize,
    pub unique: usize,
    pub duplicates_dropped: usize,
    pub rows_written: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Position in the batch of the message that caused the failure, when one did
    pub message_index: Option<usize>,
}

impl InvocationFailure {
    pub fn from_error(error: &DomainError, context: &str) -> Self {
        Self {
            kind: error.kind(),
            message: format!("{}: {}", context, error),
            message_index: None,
        }
    }

    /// Failure attributed to the message at `index`
    pub fn for_message(error: &DomainError, index: usize) -> Self {
        Self {
            message_index: Some(index),
            ..Self::from_error(error, &format!("message {}", index))
        }
    }
}

impl fmt::Display for InvocationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure: {}", self.kind, self.message)
    }
}

/// Result of one invocation over one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    Committed(InvocationSummary),
    Failed(InvocationFailure),
}

impl InvocationOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, InvocationOutcome::Committed(_))
    }

    /// Status-code style rendering handed back to the invoking environment
    pub fn response(&self) -> InvocationResponse {
        match self {
            InvocationOutcome::Committed(summary) => InvocationResponse {
                status_code: 200,
                body: format!(
                    "{} rows written ({} received, {} duplicates dropped)",
                    summary.rows_written, summary.received, summary.duplicates_dropped
                ),
            },
            InvocationOutcome::Failed(failure) => InvocationResponse {
                status_code: match failure.kind {
                    FailureKind::Config => 500,
                    FailureKind::Decode => 422,
                    FailureKind::Write => 503,
                },
                body: failure.message.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub status_code: u16,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_committed_response() {
        let outcome = InvocationOutcome::Committed(InvocationSummary {
            received: 3,
            unique: 2,
            duplicates_dropped: 1,
            rows_written: 2,
        });

        let response = outcome.response();
        assert!(outcome.is_committed());
        assert_eq!(response.status_code, 200);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({
                "statusCode": 200,
                "body": "2 rows written (3 received, 1 duplicates dropped)"
            })
        );
    }

    #[test]
    fn test_failure_status_codes() {
        let cases = [
            (
                DomainError::SecretNotFound("db-credentials".to_string()),
                500,
            ),
            (DomainError::MissingDedupKey("vehicle_id".to_string()), 422),
            (
                DomainError::ConnectionFailed(anyhow::anyhow!("connection refused")),
                503,
            ),
        ];

        for (error, status_code) in cases {
            let outcome =
                InvocationOutcome::Failed(InvocationFailure::from_error(&error, "invocation"));
            assert!(!outcome.is_committed());
            assert_eq!(outcome.response().status_code, status_code);
        }
    }

    #[test]
    fn test_failure_for_message_records_index() {
        let failure = InvocationFailure::for_message(
            &DomainError::MissingDedupKey("vehicle_id".to_string()),
            4,
        );

        assert_eq!(failure.message_index, Some(4));
        assert_eq!(
            failure.message,
            "message 4: Missing dedup key field: vehicle_id"
        );
        assert_eq!(
            InvocationFailure::from_error(
                &DomainError::WriteTimeout(std::time::Duration::from_secs(1)),
                "batch write"
            )
            .message_index,
            None
        );
    }

    #[test]
    fn test_failure_message_carries_context() {
        let failure = InvocationFailure::from_error(
            &DomainError::InvalidPayload("payload is not valid JSON".to_string()),
            "message 2",
        );

        assert_eq!(failure.kind, FailureKind::Decode);
        assert_eq!(
            failure.message,
            "message 2: Invalid payload: payload is not valid JSON"
        );
        assert_eq!(
            failure.to_string(),
            "decode failure: message 2: Invalid payload: payload is not valid JSON"
        );
    }
}
