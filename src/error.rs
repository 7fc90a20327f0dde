//! Error types for the rating service
//!
//! Domain failures are described by [`WarsError`] and travel through the
//! crate as `anyhow::Error`, so callers that care about the kind downcast.

use crate::types::{EntityId, SubmissionId};

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific rating and voting scenarios
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WarsError {
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Entities not found: {}", .ids.join(", "))]
    NotFound { ids: Vec<EntityId> },

    #[error("Entity already exists: {entity_id}")]
    AlreadyExists { entity_id: EntityId },

    #[error("Not enough contenders for a comparison: {available} available")]
    NotEnoughContenders { available: usize },

    #[error("Concurrent update conflict after {attempts} attempts")]
    Conflict { attempts: u32 },

    #[error("Submission {submission_id} is still being processed")]
    SubmissionInProgress { submission_id: SubmissionId },

    #[error("Rating store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Failed to write entity {entity_id}: {message}{}", partial_suffix(.partial))]
    StoreWriteFailure {
        entity_id: EntityId,
        message: String,
        partial: bool,
    },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

fn partial_suffix(partial: &bool) -> &'static str {
    if *partial {
        " (comparison partially applied)"
    } else {
        ""
    }
}

impl WarsError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Whether the operation may succeed if simply attempted again
    pub fn is_transient(&self) -> bool {
        matches!(self, WarsError::StoreUnavailable { .. })
    }
}

/// Find the [`WarsError`] carried by an `anyhow::Error`, if any
pub fn wars_error(error: &anyhow::Error) -> Option<&WarsError> {
    error.downcast_ref::<WarsError>()
}

/// Whether an `anyhow::Error` wraps a transient store failure
pub fn is_transient(error: &anyhow::Error) -> bool {
    wars_error(error).is_some_and(WarsError::is_transient)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = WarsError::NotFound {
            ids: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "Entities not found: a, b");

        let err = WarsError::StoreWriteFailure {
            entity_id: "b".to_string(),
            message: "timeout".to_string(),
            partial: true,
        };
        assert!(err.to_string().ends_with("(comparison partially applied)"));
    }

    #[test]
    fn test_transient_classification() {
        let transient: anyhow::Error = WarsError::StoreUnavailable {
            message: "connection reset".to_string(),
        }
        .into();
        assert!(is_transient(&transient));

        let logical: anyhow::Error = WarsError::NotFound { ids: vec![] }.into();
        assert!(!is_transient(&logical));

        let foreign = anyhow::anyhow!("something else");
        assert!(!is_transient(&foreign));
        assert!(wars_error(&foreign).is_none());
    }
}
