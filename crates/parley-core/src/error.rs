//! Public error taxonomy of the messaging core.

use serde::Serialize;
use thiserror::Error;

use parley_store::StoreError;

/// Errors surfaced by the messaging core's public operations.
#[derive(Error, Debug)]
pub enum ChatError {
    /// The caller's identity could not be verified.
    #[error("Caller identity could not be verified")]
    Unauthenticated,

    /// The caller is not a participant of the targeted conversation.
    #[error("Caller is not a participant of the conversation")]
    NotParticipant,

    /// Conversation or message absent, or soft-deleted where liveness is
    /// required.
    #[error("Conversation or message not found")]
    NotFound,

    /// Caller error: empty content, malformed ids, invalid participant
    /// sets. Never retried.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The direct-conversation creation race was not resolved within the
    /// configured retry budget. The caller decides whether to re-attempt
    /// the lookup from scratch.
    #[error("Conversation creation race unresolved after {attempts} attempts")]
    ConflictRetryExhausted { attempts: u32 },

    /// Transient infrastructure failure. Reads may be retried by the
    /// caller with backoff; writes are surfaced as-is, never silently
    /// re-sent.
    #[error("Record store unavailable")]
    StoreUnavailable,
}

impl ChatError {
    /// Stable machine-readable code for the external error payload.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::NotParticipant => "not_participant",
            Self::NotFound => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::ConflictRetryExhausted { .. } => "conflict_retry_exhausted",
            Self::StoreUnavailable => "store_unavailable",
        }
    }
}

impl From<StoreError> for ChatError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ChatError::NotFound,
            // Constraint races are handled where they can be resolved (the
            // directory's retry loop); one leaking this far is an
            // infrastructure-level failure from the caller's perspective.
            other => {
                tracing::warn!(error = %other, "store operation failed");
                ChatError::StoreUnavailable
            }
        }
    }
}

/// External error shape: a stable code plus a short message. Internal
/// details (store errors, paths, connection state) are never included.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorPayload {
    pub code: &'static str,
    pub message: String,
}

impl From<&ChatError> for ErrorPayload {
    fn from(e: &ChatError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let errors = [
            ChatError::Unauthenticated,
            ChatError::NotParticipant,
            ChatError::NotFound,
            ChatError::InvalidInput("x".into()),
            ChatError::ConflictRetryExhausted { attempts: 3 },
            ChatError::StoreUnavailable,
        ];
        let codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(
            codes,
            [
                "unauthenticated",
                "not_participant",
                "not_found",
                "invalid_input",
                "conflict_retry_exhausted",
                "store_unavailable",
            ]
        );
    }

    #[test]
    fn store_errors_do_not_leak_detail() {
        let err: ChatError = StoreError::Migration("table users is broken".into()).into();
        let payload = ErrorPayload::from(&err);
        assert_eq!(payload.code, "store_unavailable");
        assert!(!payload.message.contains("users"));
    }

    #[test]
    fn store_not_found_maps_to_not_found() {
        let err: ChatError = StoreError::NotFound.into();
        assert_eq!(err.code(), "not_found");
    }
}
